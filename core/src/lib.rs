//! Peerlink core: nearby peer connectivity engine.
//!
//! Unifies two transports behind one command surface and one event stream:
//! the host platform's managed peer-discovery framework and the raw radio
//! (classic sockets plus low-energy advertise/scan). The host supplies the
//! hardware-facing halves as trait objects ([`ManagedConnector`] and
//! [`RadioPlatformBridge`]); everything above them, discovery dedupe,
//! connection sessions, advertising policy and command serialization, lives
//! here.

pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod queue;
pub mod registry;
pub mod service_uuid;
pub mod session;
pub mod transport;

pub use config::{EngineConfig, Strategy};
pub use engine::Engine;
pub use error::EngineError;
pub use events::{ConnectionOutcome, EngineEvent, EventReceiver, EventSender};
pub use queue::{CommandQueue, QueueError};
pub use registry::{Endpoint, Registry};
pub use service_uuid::DEFAULT_SERVICE_UUID;
pub use session::{SessionManager, SessionState};
pub use transport::{
    ManagedConnector, ManagedError, RadioError, RadioPlatformBridge, TransportKind,
};
