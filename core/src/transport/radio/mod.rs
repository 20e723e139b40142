//! Raw radio transport.
//!
//! Classic socket listener/connector plus low-energy advertise/scan, built on
//! a platform bridge trait so the hardware-facing half can live in host code
//! (or a mock in tests) while all protocol logic stays here. Every bridge
//! call is funneled through the serialized command queue.
//!
//! - **beacon**: application-marker payload construction, parsing and peer
//!   classification
//! - **advertiser**: advertising state machine with power-loss recovery and
//!   low-energy retry backoff
//! - **scanner**: discovery state machine with duplicate suppression and
//!   classic-inquiry auto-restart
//! - **socket**: per-channel read loop and write path
//! - **adapter**: orchestration over the platform bridge

pub mod adapter;
pub mod advertiser;
pub mod beacon;
pub mod scanner;
pub mod socket;

pub use adapter::{RadioAdapter, RadioEvent};

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use uuid::Uuid;

use super::RadioError;

/// Byte stream of one classic-socket connection.
pub trait RadioStream: AsyncRead + AsyncWrite + Send + Unpin {}
impl<T: AsyncRead + AsyncWrite + Send + Unpin> RadioStream for T {}

/// Owned, type-erased connection stream.
pub type BoxedStream = Box<dyn RadioStream>;

/// Identity of a remote radio device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteDevice {
    /// Radio address; doubles as the endpoint id for radio-discovered peers.
    pub address: String,
    /// Advertised device name, when the radio could resolve one.
    pub name: Option<String>,
}

/// Asynchronous notifications pushed up by the platform radio stack.
#[derive(Debug)]
pub enum RadioSignal {
    /// A low-energy scan hit.
    LeScanResult {
        address: String,
        name: Option<String>,
        manufacturer_data: Option<Vec<u8>>,
        rssi: i16,
    },
    /// A classic inquiry hit.
    InquiryResult { address: String, name: Option<String> },
    /// The classic inquiry round ended (restarted if discovery is desired).
    InquiryFinished,
    /// Radio power state changed.
    PowerChanged { powered: bool },
}

/// Listener half of a classic-socket service registration.
#[async_trait]
pub trait RadioListener: Send {
    /// Block until an inbound connection arrives.
    async fn accept(&mut self) -> Result<(BoxedStream, RemoteDevice), RadioError>;

    /// Close the listening socket, unblocking any pending `accept`.
    async fn close(&mut self) -> Result<(), RadioError>;
}

/// Platform-specific radio API abstraction.
///
/// Implementers provide the actual radio operations for their platform; the
/// adapter never touches hardware directly. All methods may be called only
/// from the command queue worker, which guarantees no two operations overlap.
#[async_trait]
pub trait RadioPlatformBridge: Send + Sync {
    /// Whether the radio is currently powered.
    async fn is_powered(&self) -> Result<bool, RadioError>;

    /// Register a low-energy advertisement carrying the canonical service
    /// UUID and the application-marker payload.
    async fn start_le_advertising(
        &self,
        service_uuid: Uuid,
        marker: Vec<u8>,
    ) -> Result<(), RadioError>;

    /// Deregister the low-energy advertisement. Idempotent.
    async fn stop_le_advertising(&self) -> Result<(), RadioError>;

    /// Start a low-energy scan filtered on the service UUID and marker magic.
    async fn start_le_scan(
        &self,
        service_uuid: Uuid,
        marker_magic: Vec<u8>,
    ) -> Result<(), RadioError>;

    /// Stop the low-energy scan. Idempotent.
    async fn stop_le_scan(&self) -> Result<(), RadioError>;

    /// Start one classic inquiry round.
    async fn start_inquiry(&self) -> Result<(), RadioError>;

    /// Cancel an in-progress classic inquiry. Idempotent.
    async fn cancel_inquiry(&self) -> Result<(), RadioError>;

    /// Open a classic-socket listener bound to the service UUID.
    async fn listen(&self, service_uuid: Uuid) -> Result<Box<dyn RadioListener>, RadioError>;

    /// Open a classic-socket connection to `address`, scoped to the service
    /// UUID.
    async fn connect(&self, address: &str, service_uuid: Uuid) -> Result<BoxedStream, RadioError>;

    /// Subscribe to asynchronous radio notifications (scan results, inquiry
    /// completion, power transitions). Called once per adapter; engine
    /// re-initialization builds a fresh adapter and subscribes again.
    fn subscribe(&self) -> mpsc::UnboundedReceiver<RadioSignal>;
}
