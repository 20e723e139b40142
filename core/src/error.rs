//! Engine error types.

use thiserror::Error;

use crate::queue::QueueError;
use crate::transport::{ManagedError, RadioError};

/// Errors surfaced by engine commands.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("Engine not initialized")]
    NotInitialized,

    #[error("Operation timed out")]
    Timeout,

    #[error("Connection failure: {0}")]
    ConnectionFailure(String),

    #[error("Event channel closed")]
    ChannelClosed,

    #[error("Scan failure: {0}")]
    ScanFailure(String),

    #[error("Advertise failure: {0}")]
    AdvertiseFailure(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Invalid strategy: {0}")]
    InvalidStrategy(String),
}

impl From<QueueError> for EngineError {
    fn from(err: QueueError) -> Self {
        match err {
            QueueError::Timeout(_) => EngineError::Timeout,
            QueueError::Cancelled => EngineError::ChannelClosed,
            QueueError::Execution(radio) => radio.into(),
        }
    }
}

impl From<RadioError> for EngineError {
    fn from(err: RadioError) -> Self {
        match err {
            RadioError::AdvertiseFailed(msg) | RadioError::ListenFailed(msg) => {
                EngineError::AdvertiseFailure(msg)
            }
            RadioError::ScanFailed(msg) | RadioError::InquiryFailed(msg) => {
                EngineError::ScanFailure(msg)
            }
            RadioError::ConnectFailed(msg) => EngineError::ConnectionFailure(msg),
            RadioError::PermissionDenied(msg) => EngineError::PermissionDenied(msg),
            RadioError::PoweredOff => {
                EngineError::ConnectionFailure("radio powered off".to_string())
            }
            RadioError::ChannelClosed => EngineError::ChannelClosed,
            RadioError::Io(msg) => EngineError::ConnectionFailure(msg),
        }
    }
}

impl From<ManagedError> for EngineError {
    fn from(err: ManagedError) -> Self {
        EngineError::ConnectionFailure(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_error_display() {
        let err = EngineError::InvalidIdentifier("zz".to_string());
        assert_eq!(err.to_string(), "Invalid identifier: zz");
        assert_eq!(
            EngineError::NotInitialized.to_string(),
            "Engine not initialized"
        );
    }

    #[test]
    fn test_queue_error_conversion() {
        assert_eq!(
            EngineError::from(QueueError::Timeout(Duration::from_secs(10))),
            EngineError::Timeout
        );
        assert_eq!(
            EngineError::from(QueueError::Execution(RadioError::ConnectFailed(
                "refused".to_string()
            ))),
            EngineError::ConnectionFailure("refused".to_string())
        );
    }

    #[test]
    fn test_radio_error_conversion() {
        assert_eq!(
            EngineError::from(RadioError::ScanFailed("busy".to_string())),
            EngineError::ScanFailure("busy".to_string())
        );
        assert_eq!(
            EngineError::from(RadioError::PermissionDenied("bluetooth".to_string())),
            EngineError::PermissionDenied("bluetooth".to_string())
        );
    }
}
