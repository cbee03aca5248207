//! Error types for layerwise

use thiserror::Error;

use crate::common::ConnectionId;
use crate::proxy::CommandId;

/// Main error type for layerwise
///
/// Every variant except `Io` and `Config` is fatal for the connection whose
/// layer raised it.
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Completion for unknown command {0}")]
    UnknownCommand(CommandId),

    #[error("Event for unknown connection {0}")]
    UnknownConnection(ConnectionId),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Invalid proxy mode: {0}")]
    InvalidMode(String),

    #[error("Unsupported feature: {0}")]
    Unsupported(String),
}

/// Result type alias for layerwise
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::Protocol("unexpected event".into());
        assert_eq!(err.to_string(), "Protocol error: unexpected event");

        let err = Error::UnknownCommand(CommandId::from_raw(7));
        assert_eq!(err.to_string(), "Completion for unknown command #7");
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err: Error = io.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
