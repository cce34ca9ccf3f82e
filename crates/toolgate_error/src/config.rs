//! Configuration error types.

/// Configuration error with source location.
///
/// Raised when role grants or rate-limit settings are malformed. These fail
/// fast at load or administrative-call time and are never produced on the
/// request path.
#[derive(Debug, Clone, derive_more::Display, derive_more::Error)]
#[display("Configuration Error: {} at line {} in {}", message, line, file)]
pub struct ConfigError {
    /// Error message
    pub message: String,
    /// Line number where the error occurred
    pub line: u32,
    /// File where the error occurred
    pub file: &'static str,
}

impl ConfigError {
    /// Create a new `ConfigError` with the given message at the current location.
    ///
    /// # Examples
    ///
    /// ```
    /// use toolgate_error::ConfigError;
    ///
    /// let err = ConfigError::new("window duration must be positive");
    /// assert!(err.message.contains("window duration"));
    /// ```
    #[track_caller]
    pub fn new(message: impl Into<String>) -> Self {
        let location = std::panic::Location::caller();
        Self {
            message: message.into(),
            line: location.line(),
            file: location.file(),
        }
    }
}
