//! Connection engine.
//!
//! The command surface the host bridge drives. Commands arrive as plain
//! method calls; results flow back synchronously or over the single ordered
//! event channel. Every command except `initialize` and `echo` fails with
//! `NotInitialized` until `initialize` has run.
//!
//! The engine fans each user intent out to both transports (the managed
//! framework and the raw radio) and folds their callbacks back into one
//! event stream, so embedders never deal with transport identity. Routing
//! for per-endpoint commands is decided once, from the endpoint registry.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{EngineConfig, Strategy};
use crate::error::EngineError;
use crate::events::{self, ConnectionOutcome, EngineEvent, EventReceiver, EventSender};
use crate::queue::CommandQueue;
use crate::registry::{Endpoint, Registry};
use crate::service_uuid;
use crate::session::{AdvertisingEffect, SessionManager};
use crate::transport::radio::adapter::RadioConfig;
use crate::transport::{
    ManagedConnector, RadioAdapter, RadioEvent, RadioPlatformBridge, TransportKind,
};

/// Transport-unifying connection engine.
pub struct Engine {
    managed: Arc<dyn ManagedConnector>,
    bridge: Arc<dyn RadioPlatformBridge>,
    config: EngineConfig,
    core: RwLock<Option<Arc<EngineCore>>>,
}

struct EngineCore {
    managed: Arc<dyn ManagedConnector>,
    adapter: Arc<RadioAdapter>,
    registry: Registry,
    sessions: SessionManager,
    events_tx: EventSender,
    service_id: String,
    service_uuid: Uuid,
    /// Display name last used to advertise; needed to resume.
    display_name: Mutex<Option<String>>,
}

impl Engine {
    pub fn new(
        managed: Arc<dyn ManagedConnector>,
        bridge: Arc<dyn RadioPlatformBridge>,
        config: EngineConfig,
    ) -> Self {
        Self {
            managed,
            bridge,
            config,
            core: RwLock::new(None),
        }
    }

    /// Bring the engine up for one service. `service_uuid` scopes the raw
    /// radio; when absent or unusable the well-known default is used, with
    /// a debug note rather than an error. Returns the event channel.
    pub fn initialize(
        &self,
        service_id: &str,
        service_uuid: Option<&str>,
    ) -> Result<EventReceiver, EngineError> {
        if service_id.trim().is_empty() {
            return Err(EngineError::InvalidIdentifier(service_id.to_string()));
        }
        let uuid = service_uuid::normalize_or_default(service_uuid);

        let (events_tx, events_rx) = events::channel();
        let queue = CommandQueue::new(self.config.command_timeout);
        let (adapter, radio_rx) = RadioAdapter::new(
            self.bridge.clone(),
            queue,
            RadioConfig {
                service_uuid: uuid,
                platform_tag: self.config.platform_tag,
                read_buffer_size: self.config.read_buffer_size,
                advertise_retry_backoff: self.config.advertise_retry_backoff,
            },
        );

        let core = Arc::new(EngineCore {
            managed: self.managed.clone(),
            adapter,
            registry: Registry::new(),
            sessions: SessionManager::new(self.config.strategy),
            events_tx,
            service_id: service_id.to_string(),
            service_uuid: uuid,
            display_name: Mutex::new(None),
        });
        tokio::spawn(core.clone().run_dispatcher(radio_rx));

        info!(
            "engine initialized for service {} ({})",
            core.service_id, core.service_uuid
        );
        let previous = self.core.write().replace(core);
        if let Some(previous) = previous {
            warn!("engine re-initialized, tearing down previous state");
            tokio::spawn(async move { previous.adapter.shutdown().await });
        }
        Ok(events_rx)
    }

    fn core(&self) -> Result<Arc<EngineCore>, EngineError> {
        self.core.read().clone().ok_or(EngineError::NotInitialized)
    }

    /// Diagnostic round-trip; usable before `initialize`.
    pub fn echo(&self, value: &str) -> String {
        value.to_string()
    }

    pub fn service_uuid(&self) -> Result<Uuid, EngineError> {
        Ok(self.core()?.service_uuid)
    }

    /// Advertise on both transports. Succeeds if either transport comes up.
    pub async fn start_advertising(&self, display_name: &str) -> Result<(), EngineError> {
        let core = self.core()?;
        *core.display_name.lock() = Some(display_name.to_string());
        core.sessions.set_advertising_desired(true);

        let managed = core.managed.start_advertising(display_name).await;
        if let Err(err) = &managed {
            warn!("managed advertising failed: {}", err);
        }
        let radio = core.adapter.start_advertising(display_name).await;
        if let Err(err) = &radio {
            warn!("radio advertising failed: {}", err);
        }
        match (managed, radio) {
            (Err(m), Err(_)) => Err(m.into()),
            _ => Ok(()),
        }
    }

    /// Stop advertising on both transports. Idempotent.
    pub async fn stop_advertising(&self) -> Result<(), EngineError> {
        let core = self.core()?;
        core.sessions.set_advertising_desired(false);
        if let Err(err) = core.managed.stop_advertising().await {
            warn!("managed stop_advertising: {}", err);
        }
        core.adapter.stop_advertising().await?;
        Ok(())
    }

    /// Begin a fresh discovery cycle on both transports. Succeeds if either
    /// transport comes up.
    pub async fn start_discovery(&self) -> Result<(), EngineError> {
        let core = self.core()?;
        core.registry.clear();

        let managed = core.managed.start_discovery().await;
        if let Err(err) = &managed {
            warn!("managed discovery failed: {}", err);
        }
        let radio = core.adapter.start_discovery().await;
        if let Err(err) = &radio {
            warn!("radio discovery failed: {}", err);
        }
        match (managed, radio) {
            (Err(m), Err(_)) => Err(m.into()),
            _ => Ok(()),
        }
    }

    /// Stop discovering on both transports. Idempotent.
    pub async fn stop_discovery(&self) -> Result<(), EngineError> {
        let core = self.core()?;
        if let Err(err) = core.managed.stop_discovery().await {
            warn!("managed stop_discovery: {}", err);
        }
        core.adapter.stop_discovery().await?;
        Ok(())
    }

    /// Open a connection to a discovered endpoint. The terminal result
    /// arrives as a `ConnectionResult` event; an immediate `Err` means the
    /// attempt could not even start.
    pub async fn connect(&self, endpoint_id: &str, display_name: &str) -> Result<(), EngineError> {
        let core = self.core()?;
        let route = core.registry.preferred_route(endpoint_id);
        core.sessions.begin_connecting(endpoint_id, route);
        debug!("connecting to {} via {}", endpoint_id, route);

        if route == TransportKind::Managed {
            if let Err(err) = core
                .managed
                .request_connection(display_name, endpoint_id)
                .await
            {
                core.sessions.mark_failed(endpoint_id);
                return Err(err.into());
            }
        } else {
            core.adapter.connect(endpoint_id);
        }
        Ok(())
    }

    /// Accept a pending inbound connection.
    pub async fn accept_connection(&self, endpoint_id: &str) -> Result<(), EngineError> {
        let core = self.core()?;
        if core.adapter.has_pending(endpoint_id) {
            core.adapter.accept_pending(endpoint_id)?;
            return Ok(());
        }
        if core.registry.managed_seen(endpoint_id) {
            core.managed.accept_connection(endpoint_id).await?;
            return Ok(());
        }
        Err(EngineError::ConnectionFailure(format!(
            "channel not available for {}",
            endpoint_id
        )))
    }

    /// Reject a pending inbound connection, closing its channel.
    pub async fn reject_connection(&self, endpoint_id: &str) -> Result<(), EngineError> {
        let core = self.core()?;
        if core.adapter.has_pending(endpoint_id) {
            core.adapter.reject_pending(endpoint_id)?;
            return Ok(());
        }
        if core.registry.managed_seen(endpoint_id) {
            core.managed.reject_connection(endpoint_id).await?;
            return Ok(());
        }
        Err(EngineError::ConnectionFailure(format!(
            "channel not available for {}",
            endpoint_id
        )))
    }

    /// Disconnect one endpoint, or everything when `endpoint_id` is absent.
    /// Idempotent either way.
    pub async fn disconnect(&self, endpoint_id: Option<&str>) -> Result<(), EngineError> {
        let core = self.core()?;
        match endpoint_id {
            Some(id) => {
                let closed_radio = core.adapter.disconnect(id).await;
                if core.registry.managed_seen(id) {
                    if let Err(err) = core.managed.disconnect_from_endpoint(id).await {
                        warn!("managed disconnect {}: {}", id, err);
                    }
                }
                let effect = core.sessions.mark_disconnected(id);
                core.apply_advertising_effect(effect).await;
                // A locally closed radio channel is silent on the event
                // stream, so report the loss here. The managed framework
                // reports its own disconnects through the host callback.
                if closed_radio {
                    core.emit(EngineEvent::EndpointLost {
                        endpoint_id: id.to_string(),
                    });
                }
            }
            None => {
                let live = core.sessions.disconnect_all();
                core.adapter.disconnect_all().await;
                if let Err(err) = core.managed.stop_all_endpoints().await {
                    warn!("managed stop_all_endpoints: {}", err);
                }
                if !live.is_empty() {
                    core.apply_advertising_effect(AdvertisingEffect::Resume).await;
                }
            }
        }
        Ok(())
    }

    /// Send a byte payload to a connected endpoint, routed to whichever
    /// transport holds the connection.
    pub async fn send_message(&self, endpoint_id: &str, payload: &[u8]) -> Result<(), EngineError> {
        let core = self.core()?;
        if core.adapter.has_channel(endpoint_id) {
            core.adapter.send(endpoint_id, payload).await?;
        } else {
            core.managed.send_payload(endpoint_id, payload).await?;
        }
        Ok(())
    }

    /// Change the connection topology. Affects future transitions only.
    pub fn set_strategy(&self, strategy: Strategy) -> Result<(), EngineError> {
        let core = self.core()?;
        info!("strategy set to {}", strategy);
        core.sessions.set_strategy(strategy);
        Ok(())
    }

    pub fn strategy(&self) -> Result<Strategy, EngineError> {
        Ok(self.core()?.sessions.strategy())
    }

    /// Full teardown: stop advertising and discovery, drop every
    /// connection. The engine stays initialized. Idempotent.
    pub async fn shutdown(&self) -> Result<(), EngineError> {
        let core = self.core()?;
        core.sessions.set_advertising_desired(false);
        core.sessions.disconnect_all();
        if let Err(err) = core.managed.stop_advertising().await {
            warn!("shutdown managed stop_advertising: {}", err);
        }
        if let Err(err) = core.managed.stop_discovery().await {
            warn!("shutdown managed stop_discovery: {}", err);
        }
        if let Err(err) = core.managed.stop_all_endpoints().await {
            warn!("shutdown managed stop_all_endpoints: {}", err);
        }
        core.adapter.shutdown().await;
        core.registry.clear();
        info!("engine shut down");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Managed-framework callbacks, forwarded by the host bridge.
    // ------------------------------------------------------------------

    /// A managed discovery callback reported an endpoint.
    pub fn handle_managed_endpoint_found(
        &self,
        endpoint_id: &str,
        display_name: &str,
    ) -> Result<(), EngineError> {
        let core = self.core()?;
        let newly_seen = core.registry.insert(Endpoint {
            id: endpoint_id.to_string(),
            display_name: display_name.to_string(),
            transport_kind: TransportKind::Managed,
        });
        if newly_seen {
            core.sessions
                .mark_discovered(endpoint_id, TransportKind::Managed);
            core.emit(EngineEvent::EndpointFound {
                endpoint_id: endpoint_id.to_string(),
                display_name: display_name.to_string(),
            });
        }
        Ok(())
    }

    /// A managed discovery callback reported an endpoint gone.
    pub fn handle_managed_endpoint_lost(&self, endpoint_id: &str) -> Result<(), EngineError> {
        let core = self.core()?;
        if core.registry.remove(endpoint_id) {
            core.emit(EngineEvent::EndpointLost {
                endpoint_id: endpoint_id.to_string(),
            });
        }
        Ok(())
    }

    /// The managed framework received an inbound connection request.
    pub fn handle_managed_connection_initiated(
        &self,
        endpoint_id: &str,
        display_name: &str,
    ) -> Result<(), EngineError> {
        let core = self.core()?;
        // Make the endpoint routable even if discovery never saw it.
        core.registry.insert(Endpoint {
            id: endpoint_id.to_string(),
            display_name: display_name.to_string(),
            transport_kind: TransportKind::Managed,
        });
        core.emit(EngineEvent::ConnectionRequested {
            endpoint_id: endpoint_id.to_string(),
            display_name: display_name.to_string(),
        });
        Ok(())
    }

    /// The managed framework resolved a connection attempt.
    pub async fn handle_managed_connection_result(
        &self,
        endpoint_id: &str,
        success: bool,
        reason: Option<&str>,
    ) -> Result<(), EngineError> {
        let core = self.core()?;
        if success {
            let effect = core
                .sessions
                .mark_connected(endpoint_id, TransportKind::Managed);
            core.apply_advertising_effect(effect).await;
            core.emit(EngineEvent::ConnectionResult {
                endpoint_id: endpoint_id.to_string(),
                outcome: ConnectionOutcome::Connected,
            });
        } else {
            core.sessions.mark_failed(endpoint_id);
            core.emit(EngineEvent::ConnectionResult {
                endpoint_id: endpoint_id.to_string(),
                outcome: ConnectionOutcome::Failed {
                    reason: reason.unwrap_or("connection rejected").to_string(),
                },
            });
        }
        Ok(())
    }

    /// The managed framework reported a disconnection.
    pub async fn handle_managed_disconnected(&self, endpoint_id: &str) -> Result<(), EngineError> {
        let core = self.core()?;
        let effect = core.sessions.mark_disconnected(endpoint_id);
        core.apply_advertising_effect(effect).await;
        core.emit(EngineEvent::EndpointLost {
            endpoint_id: endpoint_id.to_string(),
        });
        Ok(())
    }

    /// A payload arrived over the managed framework.
    pub fn handle_managed_payload(
        &self,
        endpoint_id: &str,
        payload: Vec<u8>,
    ) -> Result<(), EngineError> {
        let core = self.core()?;
        core.emit(EngineEvent::Message {
            endpoint_id: endpoint_id.to_string(),
            payload,
        });
        Ok(())
    }

    /// Transfer progress from the managed framework.
    pub fn handle_managed_transfer_update(
        &self,
        endpoint_id: &str,
        bytes_transferred: u64,
        total_bytes: u64,
    ) -> Result<(), EngineError> {
        let core = self.core()?;
        core.emit(EngineEvent::PayloadTransferUpdate {
            endpoint_id: endpoint_id.to_string(),
            bytes_transferred,
            total_bytes,
        });
        Ok(())
    }
}

impl EngineCore {
    fn emit(&self, event: EngineEvent) {
        // A dropped receiver only means nobody is listening anymore.
        let _ = self.events_tx.send(event);
    }

    async fn apply_advertising_effect(self: &Arc<Self>, effect: AdvertisingEffect) {
        match effect {
            AdvertisingEffect::None => {}
            AdvertisingEffect::Pause => {
                debug!("pausing advertising while connected");
                if let Err(err) = self.managed.stop_advertising().await {
                    warn!("managed advertising pause: {}", err);
                }
                if let Err(err) = self.adapter.pause_advertising().await {
                    warn!("radio advertising pause: {}", err);
                }
            }
            AdvertisingEffect::Resume => {
                if !self.adapter.advertising_desired() {
                    return;
                }
                let display_name = self.display_name.lock().clone();
                let Some(display_name) = display_name else {
                    return;
                };
                if let Err(err) = self.managed.start_advertising(&display_name).await {
                    warn!("managed advertising resume: {}", err);
                }
                if let Err(err) = self.adapter.resume_advertising().await {
                    warn!("radio advertising resume: {}", err);
                }
            }
        }
    }

    /// Single consumer of the radio adapter's event stream. Everything the
    /// radio observes funnels through here, in order, into sessions and the
    /// public event channel.
    async fn run_dispatcher(self: Arc<Self>, mut radio_rx: mpsc::UnboundedReceiver<RadioEvent>) {
        while let Some(event) = radio_rx.recv().await {
            match event {
                RadioEvent::EndpointFound {
                    endpoint_id,
                    display_name,
                    kind,
                } => {
                    let newly_seen = self.registry.insert(Endpoint {
                        id: endpoint_id.clone(),
                        display_name: display_name.clone(),
                        transport_kind: kind,
                    });
                    if newly_seen {
                        self.sessions.mark_discovered(&endpoint_id, kind);
                        self.emit(EngineEvent::EndpointFound {
                            endpoint_id,
                            display_name,
                        });
                    }
                }
                RadioEvent::ConnectionRequested {
                    endpoint_id,
                    display_name,
                } => {
                    self.registry.insert(Endpoint {
                        id: endpoint_id.clone(),
                        display_name: display_name.clone(),
                        transport_kind: TransportKind::RadioClassic,
                    });
                    self.emit(EngineEvent::ConnectionRequested {
                        endpoint_id,
                        display_name,
                    });
                }
                RadioEvent::ConnectSucceeded { endpoint_id } => {
                    let effect = self
                        .sessions
                        .mark_connected(&endpoint_id, TransportKind::RadioClassic);
                    self.apply_advertising_effect(effect).await;
                    self.emit(EngineEvent::ConnectionResult {
                        endpoint_id,
                        outcome: ConnectionOutcome::Connected,
                    });
                }
                RadioEvent::ConnectFailed {
                    endpoint_id,
                    reason,
                } => {
                    self.sessions.mark_failed(&endpoint_id);
                    self.emit(EngineEvent::ConnectionResult {
                        endpoint_id,
                        outcome: ConnectionOutcome::Failed { reason },
                    });
                }
                RadioEvent::MessageReceived {
                    endpoint_id,
                    payload,
                } => {
                    self.emit(EngineEvent::Message {
                        endpoint_id,
                        payload,
                    });
                }
                RadioEvent::TransferUpdate { endpoint_id, bytes } => {
                    self.emit(EngineEvent::PayloadTransferUpdate {
                        endpoint_id,
                        bytes_transferred: bytes,
                        total_bytes: bytes,
                    });
                }
                RadioEvent::ChannelClosed { endpoint_id } => {
                    self.adapter.remove_channel(&endpoint_id).await;
                    let effect = self.sessions.mark_disconnected(&endpoint_id);
                    self.apply_advertising_effect(effect).await;
                    self.emit(EngineEvent::EndpointLost { endpoint_id });
                }
            }
        }
        debug!("engine dispatcher stopped");
    }
}
