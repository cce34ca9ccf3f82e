//! Error types for the Toolgate security interception layer.
//!
//! This crate provides the foundation error types used throughout the
//! Toolgate workspace.
//!
//! # Error Hierarchy
//!
//! All errors follow the `ErrorKind` + wrapper struct pattern:
//! - `*ErrorKind` enum defines specific error conditions
//! - `*Error` struct wraps the kind with source location tracking
//! - All errors use `#[track_caller]` for automatic location capture
//!
//! Policy denials are deliberately *not* errors: a request being denied is an
//! expected outcome, carried as a violation value by `toolgate_policy`. The
//! types here cover configuration mistakes (fail fast, before any request is
//! served) and internal audit plumbing failures (recovered locally, never
//! surfaced to callers).
//!
//! # Examples
//!
//! ```
//! use toolgate_error::{ConfigError, ToolgateResult};
//!
//! fn load_limits() -> ToolgateResult<()> {
//!     Err(ConfigError::new("refill rate must be positive"))?
//! }
//!
//! assert!(load_limits().is_err());
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod audit;
mod config;
mod error;

pub use audit::{AuditError, AuditErrorKind};
pub use config::ConfigError;
pub use error::{ToolgateError, ToolgateErrorKind, ToolgateResult};
