//! Top-level error wrapper types.

use crate::{AuditError, ConfigError};

/// Foundation error enum for the Toolgate workspace.
///
/// # Examples
///
/// ```
/// use toolgate_error::{ToolgateError, ConfigError};
///
/// let cfg_err = ConfigError::new("bucket capacity must be nonzero");
/// let err: ToolgateError = cfg_err.into();
/// assert!(format!("{}", err).contains("Configuration Error"));
/// ```
#[derive(Debug, derive_more::From, derive_more::Display, derive_more::Error)]
pub enum ToolgateErrorKind {
    /// Configuration error
    #[from(ConfigError)]
    Config(ConfigError),
    /// Audit plumbing error
    #[from(AuditError)]
    Audit(AuditError),
}

/// Toolgate error with kind discrimination.
///
/// # Examples
///
/// ```
/// use toolgate_error::{ToolgateResult, ConfigError};
///
/// fn might_fail() -> ToolgateResult<()> {
///     Err(ConfigError::new("missing role table"))?
/// }
///
/// assert!(might_fail().is_err());
/// ```
#[derive(Debug, derive_more::Display, derive_more::Error)]
#[display("Toolgate Error: {}", _0)]
pub struct ToolgateError(Box<ToolgateErrorKind>);

impl ToolgateError {
    /// Create a new error from a kind.
    pub fn new(kind: ToolgateErrorKind) -> Self {
        Self(Box::new(kind))
    }

    /// Get the error kind.
    pub fn kind(&self) -> &ToolgateErrorKind {
        &self.0
    }
}

// Generic From implementation for any type that converts to ToolgateErrorKind
impl<T> From<T> for ToolgateError
where
    T: Into<ToolgateErrorKind>,
{
    fn from(err: T) -> Self {
        Self::new(err.into())
    }
}

/// Result type for Toolgate operations.
pub type ToolgateResult<T> = std::result::Result<T, ToolgateError>;
