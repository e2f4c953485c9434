//! Shared error conventions.
//!
//! Every error enum in the crate implements [`ErrorCode`] so log lines and
//! surfaced view errors carry a stable code, and so retry decisions are made
//! in one place per error type.

/// Stable machine-readable code and retry classification for an error.
pub trait ErrorCode: std::fmt::Display {
    fn error_code(&self) -> &'static str;

    fn retryable(&self) -> bool {
        false
    }
}
