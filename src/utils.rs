//! # Utility Functions Module
//!
//! Helpers for building argument vectors for external tools.

/// Converts an iterable of displayable items into `Vec<String>`.
///
/// Used to assemble transcoder arguments without repeating `.to_string()`.
///
/// # Example
/// ```rust
/// use media_archive_optimizer::utils::to_string_vec;
///
/// let crf = 23;
/// let args = to_string_vec(["-crf", &crf.to_string(), "-preset", "medium"]);
/// assert_eq!(args, vec!["-crf", "23", "-preset", "medium"]);
/// ```
pub fn to_string_vec<T, I>(items: I) -> Vec<String>
where
    T: ToString,
    I: IntoIterator<Item = T>,
{
    items.into_iter().map(|item| item.to_string()).collect()
}

/// Builds a `Vec<String>` from heterogeneous displayable values.
///
/// # Example
/// ```rust
/// use media_archive_optimizer::args;
///
/// let crf = 23;
/// let args = args!["-crf", crf, "-ar", 48000];
/// assert_eq!(args, vec!["-crf", "23", "-ar", "48000"]);
/// ```
#[macro_export]
macro_rules! args {
    [$($item:expr),* $(,)?] => {
        vec![$($item.to_string()),*]
    };
}
