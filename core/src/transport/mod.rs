//! Transport layer: managed framework facade and raw radio adapter.
//!
//! Two transports feed one endpoint space: the host's managed peer-discovery
//! framework (a capability the platform implements) and the raw radio
//! (classic socket connections plus low-energy advertise/scan). Call sites
//! never re-derive transport kind; routing is decided once from the endpoint
//! registry.

pub mod managed;
pub mod radio;

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub use managed::{ManagedConnector, ManagedError};
pub use radio::{
    BoxedStream, RadioAdapter, RadioEvent, RadioListener, RadioPlatformBridge, RadioSignal,
    RemoteDevice,
};

/// Transport a peer was discovered on or connected through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransportKind {
    /// The managed peer-discovery framework.
    Managed,
    /// Raw radio, classic socket connection.
    RadioClassic,
    /// Raw radio, low-energy advertising/scanning.
    RadioLowEnergy,
}

impl TransportKind {
    /// Whether this kind is served by the raw radio adapter.
    pub fn is_radio(&self) -> bool {
        !matches!(self, TransportKind::Managed)
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::Managed => write!(f, "managed"),
            TransportKind::RadioClassic => write!(f, "radio-classic"),
            TransportKind::RadioLowEnergy => write!(f, "radio-le"),
        }
    }
}

/// Errors raised by raw radio operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RadioError {
    #[error("Radio powered off")]
    PoweredOff,

    #[error("Advertise registration failed: {0}")]
    AdvertiseFailed(String),

    #[error("Scan registration failed: {0}")]
    ScanFailed(String),

    #[error("Inquiry failed: {0}")]
    InquiryFailed(String),

    #[error("Listen failed: {0}")]
    ListenFailed(String),

    #[error("Connect failed: {0}")]
    ConnectFailed(String),

    #[error("Channel closed")]
    ChannelClosed,

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("I/O error: {0}")]
    Io(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_kind_display() {
        assert_eq!(TransportKind::Managed.to_string(), "managed");
        assert_eq!(TransportKind::RadioClassic.to_string(), "radio-classic");
        assert_eq!(TransportKind::RadioLowEnergy.to_string(), "radio-le");
    }

    #[test]
    fn test_transport_kind_is_radio() {
        assert!(!TransportKind::Managed.is_radio());
        assert!(TransportKind::RadioClassic.is_radio());
        assert!(TransportKind::RadioLowEnergy.is_radio());
    }

    #[test]
    fn test_radio_error_display() {
        let err = RadioError::ConnectFailed("host unreachable".to_string());
        assert!(err.to_string().contains("host unreachable"));
        assert_eq!(RadioError::ChannelClosed.to_string(), "Channel closed");
    }
}
