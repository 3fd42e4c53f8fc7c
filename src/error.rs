//! Custom error types for the library.
//!
//! This module defines the primary error type, `MountError`, for the whole
//! crate. Using the `thiserror` crate, it provides a centralized and
//! consistent way to handle the different kinds of failures that can occur,
//! from persistence and I/O issues to transport-level problems.
//!
//! ## Error Hierarchy
//!
//! `MountError` is an enum that consolidates the error sources:
//!
//! - **`Configuration`**: Semantic errors in a connection definition that
//!   pass parsing but are logically incorrect. Most configuration problems
//!   are reported as a [`RejectReason`](crate::registry::RejectReason) by
//!   the registry instead; this variant covers the cases that surface
//!   outside validation (e.g. a malformed entry found at start time).
//! - **`Io`**: Wraps standard `std::io::Error`, covering file and socket
//!   I/O issues.
//! - **`Transport`**: Failures while talking to a device: handshake
//!   timeouts, malformed replies, broken links. These are absorbed into a
//!   client's connected flag and never abort the communication pass.
//! - **`Persistence`**: Problems reading or writing the connections file or
//!   the device-model catalog. Callers degrade to an empty registry with a
//!   warning rather than aborting startup.
//! - **`UnsupportedInterface`**: A client was requested for an interface
//!   kind that has no usable bridge in this build (e.g. the vendor
//!   automation kind on a platform without the vendor runtime).
//!
//! By using `#[from]`, `MountError` can be seamlessly created from
//! underlying error types, simplifying error handling with the `?` operator.

use thiserror::Error;

/// Convenience alias for results using the library error type.
pub type AppResult<T> = std::result::Result<T, MountError>;

/// Primary error type for connection management and device communication.
#[derive(Error, Debug)]
pub enum MountError {
    /// Semantic configuration error detected outside registry validation.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// File or socket I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Device communication failure (timeout, malformed reply, broken link).
    #[error("Transport error: {0}")]
    Transport(String),

    /// Connections file or device-model catalog could not be processed.
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Serial support was not compiled in.
    #[error("Serial support not enabled. Rebuild with --features native_serial")]
    SerialFeatureDisabled,

    /// No client implementation exists for the requested interface kind.
    #[error("Interface kind '{0}' is not supported in this build")]
    UnsupportedInterface(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = MountError::Transport("poll timed out".to_string());
        assert_eq!(err.to_string(), "Transport error: poll timed out");
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: MountError = io.into();
        assert!(matches!(err, MountError::Io(_)));
    }
}
