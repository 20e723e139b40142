//! Public engine events.
//!
//! One ordered channel carries everything an embedder needs to react to:
//! discovery, connection lifecycle, inbound payloads and transfer progress.
//! Events from both transports are interleaved here in the order the engine
//! observed them.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Terminal result of a connection attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "status")]
pub enum ConnectionOutcome {
    Connected,
    Failed { reason: String },
}

/// Events emitted by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "event")]
pub enum EngineEvent {
    /// A peer speaking this protocol was sighted.
    EndpointFound {
        endpoint_id: String,
        display_name: String,
    },
    /// A previously sighted peer is gone.
    EndpointLost { endpoint_id: String },
    /// An inbound connection awaits accept/reject.
    ConnectionRequested {
        endpoint_id: String,
        display_name: String,
    },
    /// A connection attempt resolved.
    ConnectionResult {
        endpoint_id: String,
        outcome: ConnectionOutcome,
    },
    /// A payload arrived from a connected peer.
    Message {
        endpoint_id: String,
        payload: Vec<u8>,
    },
    /// Transfer progress for an outgoing payload.
    PayloadTransferUpdate {
        endpoint_id: String,
        bytes_transferred: u64,
        total_bytes: u64,
    },
}

impl EngineEvent {
    /// Endpoint this event concerns.
    pub fn endpoint_id(&self) -> &str {
        match self {
            EngineEvent::EndpointFound { endpoint_id, .. }
            | EngineEvent::EndpointLost { endpoint_id }
            | EngineEvent::ConnectionRequested { endpoint_id, .. }
            | EngineEvent::ConnectionResult { endpoint_id, .. }
            | EngineEvent::Message { endpoint_id, .. }
            | EngineEvent::PayloadTransferUpdate { endpoint_id, .. } => endpoint_id,
        }
    }
}

pub type EventSender = mpsc::UnboundedSender<EngineEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<EngineEvent>;

/// Create the engine event channel.
pub fn channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}
