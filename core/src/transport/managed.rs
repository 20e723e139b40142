//! Managed-transport facade.
//!
//! The managed peer-discovery framework lives on the host side; this crate
//! consumes it as an async capability. Each call reports success or failure;
//! the framework's three callback channels (connection lifecycle, endpoint
//! discovery, payload) are forwarded by the host into the engine's
//! `handle_managed_*` methods and surface on the same event channel as radio
//! events, so callers cannot tell which transport produced a result.

use async_trait::async_trait;
use thiserror::Error;

/// Errors reported by the managed framework.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ManagedError {
    #[error("Managed transport unavailable: {0}")]
    Unavailable(String),

    #[error("Managed operation failed: {0}")]
    Failed(String),
}

/// Capability exposed by the host's managed peer-discovery framework.
#[async_trait]
pub trait ManagedConnector: Send + Sync {
    /// Begin advertising this device under the given display name.
    async fn start_advertising(&self, display_name: &str) -> Result<(), ManagedError>;

    /// Stop advertising. Idempotent.
    async fn stop_advertising(&self) -> Result<(), ManagedError>;

    /// Begin discovering peers for the configured service id.
    async fn start_discovery(&self) -> Result<(), ManagedError>;

    /// Stop discovering. Idempotent.
    async fn stop_discovery(&self) -> Result<(), ManagedError>;

    /// Request an outgoing connection to a discovered endpoint.
    async fn request_connection(
        &self,
        display_name: &str,
        endpoint_id: &str,
    ) -> Result<(), ManagedError>;

    /// Accept an inbound connection request.
    async fn accept_connection(&self, endpoint_id: &str) -> Result<(), ManagedError>;

    /// Reject an inbound connection request.
    async fn reject_connection(&self, endpoint_id: &str) -> Result<(), ManagedError>;

    /// Send a byte payload to a connected endpoint.
    async fn send_payload(&self, endpoint_id: &str, payload: &[u8]) -> Result<(), ManagedError>;

    /// Disconnect one endpoint.
    async fn disconnect_from_endpoint(&self, endpoint_id: &str) -> Result<(), ManagedError>;

    /// Disconnect every endpoint and cancel pending requests.
    async fn stop_all_endpoints(&self) -> Result<(), ManagedError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_managed_error_display() {
        let err = ManagedError::Failed("8012: STATUS_ENDPOINT_UNKNOWN".to_string());
        assert!(err.to_string().contains("STATUS_ENDPOINT_UNKNOWN"));
    }
}
