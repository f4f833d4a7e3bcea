//! # Platform-specific utilities
//!
//! Questo modulo centralizza la logica cross-platform per trovare i tool
//! esterni (ffmpeg). Un tool può essere un nome da cercare nel PATH oppure
//! un path esplicito configurato dall'utente.
//!
//! Per i nomi nel PATH il tool viene eseguito con `-version`; `which`/`where`
//! resta come fallback per i tool che non rispondono a quell'opzione.

use std::path::Path;
use std::sync::OnceLock;
use tracing::debug;

/// Platform-specific command manager
pub struct PlatformCommands {
    which_command: &'static str,
    executable_suffix: &'static str,
}

impl PlatformCommands {
    /// Get the singleton instance
    pub fn instance() -> &'static Self {
        static INSTANCE: OnceLock<PlatformCommands> = OnceLock::new();
        INSTANCE.get_or_init(Self::new)
    }

    fn new() -> Self {
        if cfg!(windows) {
            Self { which_command: "where", executable_suffix: ".exe" }
        } else {
            Self { which_command: "which", executable_suffix: "" }
        }
    }

    /// Get the platform-specific command name (`ffmpeg` -> `ffmpeg.exe` on Windows)
    pub fn get_command(&self, base_name: &str) -> String {
        if Self::is_explicit_path(base_name) || self.executable_suffix.is_empty() || Path::new(base_name).extension().is_some() {
            base_name.to_string()
        } else {
            format!("{}{}", base_name, self.executable_suffix)
        }
    }

    /// Get the command used to check if a program exists
    pub fn which_command(&self) -> &str {
        self.which_command
    }

    /// Check if a command is available, either as an explicit path or on PATH
    pub async fn is_command_available(&self, base_name: &str) -> bool {
        if Self::is_explicit_path(base_name) {
            let exists = Path::new(base_name).is_file();
            debug!("Explicit tool path {} exists: {}", base_name, exists);
            return exists;
        }

        let command_name = self.get_command(base_name);
        if Self::answers_version(&command_name).await {
            return true;
        }

        let result = tokio::process::Command::new(self.which_command)
            .arg(&command_name)
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .status()
            .await;

        match result {
            Ok(status) => status.success(),
            Err(e) => {
                debug!("Cannot run {} to locate {}: {}", self.which_command, command_name, e);
                false
            }
        }
    }

    /// Run `<command> -version` and report whether it exited successfully
    async fn answers_version(command: &str) -> bool {
        let result = tokio::process::Command::new(command)
            .arg("-version")
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .kill_on_drop(true)
            .status()
            .await;

        match result {
            Ok(status) => {
                debug!("{} -version: {}", command, status);
                status.success()
            }
            Err(e) => {
                debug!("Cannot run {}: {}", command, e);
                false
            }
        }
    }

    fn is_explicit_path(name: &str) -> bool {
        name.contains('/') || name.contains('\\')
    }

    /// Get system information for debugging
    pub fn system_info() -> SystemInfo {
        SystemInfo {
            os: std::env::consts::OS,
            arch: std::env::consts::ARCH,
            family: std::env::consts::FAMILY,
        }
    }
}

/// System information structure
#[derive(Debug, Clone)]
pub struct SystemInfo {
    pub os: &'static str,
    pub arch: &'static str,
    pub family: &'static str,
}

impl std::fmt::Display for SystemInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} ({})", self.os, self.arch, self.family)
    }
}
