//! Stop signal shared by the orchestrator and the workers.
//!
//! Il main chiama `stop()` su Ctrl-C; l'orchestratore smette di schedulare
//! nuovi file e i processi ffmpeg in corso vengono terminati.

use std::sync::Arc;
use tokio::sync::watch;

/// Cloneable, level-triggered cancellation flag
#[derive(Debug, Clone)]
pub struct StopSignal {
    sender: Arc<watch::Sender<bool>>,
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl StopSignal {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self { sender: Arc::new(sender) }
    }

    /// Request a stop. Idempotent.
    pub fn stop(&self) {
        self.sender.send_replace(true);
    }

    pub fn is_stopped(&self) -> bool {
        *self.sender.borrow()
    }

    /// Resolves once `stop()` has been called (immediately if it already was).
    pub async fn stopped(&self) {
        let mut receiver = self.sender.subscribe();
        // the sender lives as long as `self`, so this only returns on stop
        let _ = receiver.wait_for(|stopped| *stopped).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_stop_wakes_waiters() {
        let signal = StopSignal::new();
        assert!(!signal.is_stopped());

        let waiter = {
            let signal = signal.clone();
            tokio::spawn(async move { signal.stopped().await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        signal.stop();

        tokio::time::timeout(Duration::from_secs(1), waiter).await.unwrap().unwrap();
        assert!(signal.is_stopped());
    }

    #[tokio::test]
    async fn test_stopped_returns_immediately_after_stop() {
        let signal = StopSignal::new();
        signal.stop();
        tokio::time::timeout(Duration::from_millis(100), signal.stopped()).await.unwrap();
    }
}
