//! Radio transport adapter.
//!
//! Orchestrates advertising, discovery and connections over the platform
//! bridge. Every bridge call goes through the serialized command queue; the
//! adapter's own maps (pending inbound channels, live channels) are guarded
//! by coarse locks that are never held across an await.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use super::advertiser::{AdvertiseAction, AdvertisingControl};
use super::beacon::{self, MarkerPayload, PeerClass, MARKER_MAGIC};
use super::scanner::DiscoveryControl;
use super::socket::{write_payload, ChannelHandle};
use super::{BoxedStream, RadioListener, RadioPlatformBridge, RadioSignal};
use crate::queue::{CommandQueue, QueueError};
use crate::transport::{RadioError, TransportKind};

/// Internal events from the radio adapter to the engine dispatcher.
#[derive(Debug)]
pub enum RadioEvent {
    /// A same-protocol peer was sighted for the first time this cycle.
    EndpointFound {
        endpoint_id: String,
        display_name: String,
        kind: TransportKind,
    },
    /// An inbound classic-socket connection awaits accept/reject.
    ConnectionRequested {
        endpoint_id: String,
        display_name: String,
    },
    /// An outgoing or accepted connection is live.
    ConnectSucceeded { endpoint_id: String },
    /// An outgoing connection attempt failed.
    ConnectFailed {
        endpoint_id: String,
        reason: String,
    },
    /// A payload chunk arrived on a connected channel.
    MessageReceived {
        endpoint_id: String,
        payload: Vec<u8>,
    },
    /// A write completed in full.
    TransferUpdate { endpoint_id: String, bytes: u64 },
    /// The peer closed the channel or the read loop failed.
    ChannelClosed { endpoint_id: String },
}

/// Radio adapter configuration, derived from the engine config at
/// initialization.
#[derive(Debug, Clone)]
pub struct RadioConfig {
    pub service_uuid: Uuid,
    pub platform_tag: u8,
    pub read_buffer_size: usize,
    pub advertise_retry_backoff: Duration,
}

/// Dual-mode radio transport: classic sockets plus low-energy
/// advertise/scan.
pub struct RadioAdapter {
    bridge: Arc<dyn RadioPlatformBridge>,
    queue: Arc<CommandQueue>,
    config: RadioConfig,
    advertising: Mutex<AdvertisingControl>,
    discovery: Mutex<DiscoveryControl>,
    /// Inbound channels accepted but not yet confirmed by the session layer.
    pending: Mutex<HashMap<String, BoxedStream>>,
    /// Live channels keyed by endpoint id.
    channels: Mutex<HashMap<String, ChannelHandle>>,
    /// Outgoing attempts by endpoint id; a disconnect removes the entry so
    /// a late bridge success is dropped instead of resurrecting a session.
    attempts: Mutex<HashMap<String, u64>>,
    attempt_counter: AtomicU64,
    events_tx: mpsc::UnboundedSender<RadioEvent>,
    listener_close: Mutex<Option<oneshot::Sender<()>>>,
}

impl RadioAdapter {
    /// Build the adapter and start consuming bridge signals. The returned
    /// receiver carries the adapter's internal events for the engine
    /// dispatcher.
    pub fn new(
        bridge: Arc<dyn RadioPlatformBridge>,
        queue: Arc<CommandQueue>,
        config: RadioConfig,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<RadioEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let signals = bridge.subscribe();
        let adapter = Arc::new(Self {
            bridge,
            queue,
            config,
            advertising: Mutex::new(AdvertisingControl::new()),
            discovery: Mutex::new(DiscoveryControl::new()),
            pending: Mutex::new(HashMap::new()),
            channels: Mutex::new(HashMap::new()),
            attempts: Mutex::new(HashMap::new()),
            attempt_counter: AtomicU64::new(0),
            events_tx,
            listener_close: Mutex::new(None),
        });
        tokio::spawn(adapter.clone().run_signals(signals));
        (adapter, events_rx)
    }

    // ------------------------------------------------------------------
    // Advertising
    // ------------------------------------------------------------------

    /// Start advertising under `display_name`: low-energy registration plus
    /// a classic-socket listener bound to the service UUID.
    pub async fn start_advertising(self: &Arc<Self>, display_name: &str) -> Result<(), QueueError> {
        self.advertising.lock().desire(display_name);
        self.register_advertising(display_name).await
    }

    /// Stop advertising and close the listener. Idempotent.
    pub async fn stop_advertising(&self) -> Result<(), QueueError> {
        self.advertising.lock().stop();
        self.close_listener();
        let bridge = self.bridge.clone();
        self.queue
            .enqueue_unit(move || async move { bridge.stop_le_advertising().await })
            .await
    }

    /// Stop broadcasting while a connection is live, keeping the desire so
    /// a later disconnect can resume.
    pub async fn pause_advertising(&self) -> Result<(), QueueError> {
        self.advertising.lock().pause();
        self.close_listener();
        let bridge = self.bridge.clone();
        self.queue
            .enqueue_unit(move || async move { bridge.stop_le_advertising().await })
            .await
    }

    /// Resume advertising after the last session disconnected, if it is
    /// still desired.
    pub async fn resume_advertising(self: &Arc<Self>) -> Result<(), QueueError> {
        let display_name = {
            let control = self.advertising.lock();
            if !control.should_resume() {
                return Ok(());
            }
            control.display_name().unwrap_or("Unknown").to_string()
        };
        info!("resuming advertising as {}", display_name);
        self.register_advertising(&display_name).await
    }

    pub fn is_advertising(&self) -> bool {
        self.advertising.lock().is_advertising()
    }

    pub fn advertising_desired(&self) -> bool {
        self.advertising.lock().is_desired()
    }

    async fn register_advertising(self: &Arc<Self>, display_name: &str) -> Result<(), QueueError> {
        self.ensure_powered().await?;
        let marker = MarkerPayload::new(self.config.platform_tag, display_name).encode();

        let le_result = {
            let bridge = self.bridge.clone();
            let uuid = self.config.service_uuid;
            let marker = marker.clone();
            self.queue
                .enqueue_unit(move || async move { bridge.start_le_advertising(uuid, marker).await })
                .await
        };
        if let Err(err) = &le_result {
            warn!("low-energy advertise registration failed: {}", err);
            self.schedule_le_retry();
        }

        let listen_result = {
            let bridge = self.bridge.clone();
            let uuid = self.config.service_uuid;
            self.queue
                .enqueue(move || async move { bridge.listen(uuid).await })
                .await
        };
        match listen_result {
            Ok(listener) => {
                self.spawn_accept_loop(listener);
                self.advertising.lock().on_started();
                Ok(())
            }
            Err(err) => {
                warn!("classic listener failed: {}", err);
                if le_result.is_ok() {
                    // Low-energy only; peers that need the classic socket
                    // will not reach us, but we are still discoverable.
                    self.advertising.lock().on_started();
                    Ok(())
                } else {
                    Err(err)
                }
            }
        }
    }

    /// Retry the low-energy registration after a fixed backoff while the
    /// advertisement is still desired.
    fn schedule_le_retry(self: &Arc<Self>) {
        let this = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(this.config.advertise_retry_backoff).await;
            let (action, display_name) = {
                let control = this.advertising.lock();
                (
                    control.on_le_failure(),
                    control.display_name().unwrap_or("Unknown").to_string(),
                )
            };
            if action != AdvertiseAction::Restart {
                return;
            }
            info!("retrying low-energy advertise registration");
            let marker = MarkerPayload::new(this.config.platform_tag, &display_name).encode();
            let bridge = this.bridge.clone();
            let uuid = this.config.service_uuid;
            let result = this
                .queue
                .enqueue_unit(move || async move { bridge.start_le_advertising(uuid, marker).await })
                .await;
            if let Err(err) = result {
                warn!("low-energy advertise retry failed: {}", err);
                this.schedule_le_retry();
            }
        });
    }

    fn spawn_accept_loop(self: &Arc<Self>, mut listener: Box<dyn RadioListener>) {
        // Replace any previous listener; closing its loop also closes the
        // old socket.
        self.close_listener();
        let (close_tx, mut close_rx) = oneshot::channel();
        *self.listener_close.lock() = Some(close_tx);

        let this = self.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut close_rx => {
                        if let Err(err) = listener.close().await {
                            debug!("listener close: {}", err);
                        }
                        break;
                    }
                    accepted = listener.accept() => match accepted {
                        Ok((stream, device)) => {
                            let display_name = device
                                .name
                                .unwrap_or_else(|| "Unknown".to_string());
                            info!(
                                "inbound connection from {} ({})",
                                display_name, device.address
                            );
                            this.pending.lock().insert(device.address.clone(), stream);
                            let _ = this.events_tx.send(RadioEvent::ConnectionRequested {
                                endpoint_id: device.address,
                                display_name,
                            });
                        }
                        Err(err) => {
                            debug!("accept loop ended: {}", err);
                            break;
                        }
                    }
                }
            }
        });
    }

    /// Fail fast when the radio is off; desire is kept, so a power-on
    /// signal restores the operation.
    async fn ensure_powered(&self) -> Result<(), QueueError> {
        let bridge = self.bridge.clone();
        let powered = self
            .queue
            .enqueue(move || async move { bridge.is_powered().await })
            .await?;
        if powered {
            Ok(())
        } else {
            Err(QueueError::Execution(RadioError::PoweredOff))
        }
    }

    fn close_listener(&self) {
        if let Some(tx) = self.listener_close.lock().take() {
            let _ = tx.send(());
        }
    }

    // ------------------------------------------------------------------
    // Discovery
    // ------------------------------------------------------------------

    /// Start a fresh discovery cycle: low-energy scan filtered on the
    /// service UUID and marker magic, plus one classic inquiry round.
    pub async fn start_discovery(&self) -> Result<(), QueueError> {
        self.discovery.lock().begin_cycle();
        self.ensure_powered().await?;

        let scan_result = {
            let bridge = self.bridge.clone();
            let uuid = self.config.service_uuid;
            self.queue
                .enqueue_unit(move || async move {
                    bridge.start_le_scan(uuid, MARKER_MAGIC.to_vec()).await
                })
                .await
        };
        if let Err(err) = &scan_result {
            warn!("low-energy scan registration failed: {}", err);
        }

        let inquiry_result = {
            let bridge = self.bridge.clone();
            self.queue
                .enqueue_unit(move || async move { bridge.start_inquiry().await })
                .await
        };
        if let Err(err) = &inquiry_result {
            warn!("classic inquiry failed to start: {}", err);
        }

        if scan_result.is_err() && inquiry_result.is_err() {
            self.discovery.lock().stop();
            return scan_result;
        }
        self.discovery.lock().on_started();
        Ok(())
    }

    /// Stop scanning and cancel any inquiry. Idempotent.
    pub async fn stop_discovery(&self) -> Result<(), QueueError> {
        self.discovery.lock().stop();
        let bridge = self.bridge.clone();
        let scan = self
            .queue
            .enqueue_unit(move || async move { bridge.stop_le_scan().await })
            .await;
        let bridge = self.bridge.clone();
        let inquiry = self
            .queue
            .enqueue_unit(move || async move { bridge.cancel_inquiry().await })
            .await;
        scan.and(inquiry)
    }

    pub fn is_discovering(&self) -> bool {
        self.discovery.lock().is_scanning()
    }

    // ------------------------------------------------------------------
    // Connections
    // ------------------------------------------------------------------

    /// Open an outgoing connection. Resolves via `ConnectSucceeded` /
    /// `ConnectFailed` events rather than blocking the caller.
    pub fn connect(self: &Arc<Self>, endpoint_id: &str) {
        let this = self.clone();
        let address = endpoint_id.to_string();
        let token = self.attempt_counter.fetch_add(1, Ordering::Relaxed) + 1;
        self.attempts.lock().insert(address.clone(), token);
        tokio::spawn(async move {
            // An in-flight inquiry competes with connect for the radio.
            let bridge = this.bridge.clone();
            if let Err(err) = this
                .queue
                .enqueue_unit(move || async move { bridge.cancel_inquiry().await })
                .await
            {
                debug!("cancel inquiry before connect: {}", err);
            }

            let bridge = this.bridge.clone();
            let uuid = this.config.service_uuid;
            let addr = address.clone();
            let connected = this
                .queue
                .enqueue(move || async move { bridge.connect(&addr, uuid).await })
                .await;

            // A disconnect issued while the bridge was still connecting
            // removes the attempt; a result arriving after that is stale.
            let current = {
                let mut attempts = this.attempts.lock();
                if attempts.get(&address) == Some(&token) {
                    attempts.remove(&address);
                    true
                } else {
                    false
                }
            };

            match connected {
                Ok(stream) => {
                    if !current {
                        debug!("dropping stale connection to {}", address);
                        drop(stream);
                        return;
                    }
                    let handle = ChannelHandle::spawn(
                        address.clone(),
                        stream,
                        this.events_tx.clone(),
                        this.config.read_buffer_size,
                    );
                    this.channels.lock().insert(address.clone(), handle);
                    info!("radio connection established to {}", address);
                    let _ = this.events_tx.send(RadioEvent::ConnectSucceeded {
                        endpoint_id: address,
                    });
                }
                Err(err) => {
                    if !current {
                        debug!("stale connect attempt to {} failed: {}", address, err);
                        return;
                    }
                    warn!("radio connect to {} failed: {}", address, err);
                    let _ = this.events_tx.send(RadioEvent::ConnectFailed {
                        endpoint_id: address,
                        reason: err.to_string(),
                    });
                }
            }
        });
    }

    /// Whether an inbound channel awaits accept/reject.
    pub fn has_pending(&self, endpoint_id: &str) -> bool {
        self.pending.lock().contains_key(endpoint_id)
    }

    /// Whether a live channel exists for this endpoint.
    pub fn has_channel(&self, endpoint_id: &str) -> bool {
        self.channels.lock().contains_key(endpoint_id)
    }

    /// Promote a pending inbound channel to a live connection.
    pub fn accept_pending(self: &Arc<Self>, endpoint_id: &str) -> Result<(), RadioError> {
        let stream = self.pending.lock().remove(endpoint_id).ok_or_else(|| {
            RadioError::ConnectFailed(format!("channel not available for {}", endpoint_id))
        })?;
        let handle = ChannelHandle::spawn(
            endpoint_id.to_string(),
            stream,
            self.events_tx.clone(),
            self.config.read_buffer_size,
        );
        self.channels.lock().insert(endpoint_id.to_string(), handle);
        let _ = self.events_tx.send(RadioEvent::ConnectSucceeded {
            endpoint_id: endpoint_id.to_string(),
        });
        Ok(())
    }

    /// Drop a pending inbound channel, closing its socket.
    pub fn reject_pending(&self, endpoint_id: &str) -> Result<(), RadioError> {
        self.pending
            .lock()
            .remove(endpoint_id)
            .map(|_stream| ())
            .ok_or_else(|| {
                RadioError::ConnectFailed(format!("channel not available for {}", endpoint_id))
            })
    }

    /// Queue a write to a connected endpoint.
    pub async fn send(&self, endpoint_id: &str, payload: &[u8]) -> Result<(), QueueError> {
        let writer = self
            .channels
            .lock()
            .get(endpoint_id)
            .map(|handle| handle.writer())
            .ok_or(QueueError::Execution(RadioError::ChannelClosed))?;
        let events = self.events_tx.clone();
        let id = endpoint_id.to_string();
        let payload = payload.to_vec();
        self.queue
            .enqueue_unit(move || async move { write_payload(&id, &writer, &payload, &events).await })
            .await
    }

    /// Tear down one channel (live, pending or still connecting). Returns
    /// whether anything was actually closed; safe to call repeatedly.
    pub async fn disconnect(&self, endpoint_id: &str) -> bool {
        let attempt = self.attempts.lock().remove(endpoint_id);
        let pending = self.pending.lock().remove(endpoint_id);
        let handle = self.channels.lock().remove(endpoint_id);
        let had_any = attempt.is_some() || pending.is_some() || handle.is_some();
        drop(pending);
        if let Some(handle) = handle {
            handle.close().await;
        }
        had_any
    }

    /// Tear down every channel and cancel in-flight connect attempts.
    /// Idempotent.
    pub async fn disconnect_all(&self) {
        self.attempts.lock().clear();
        let pending: Vec<BoxedStream> = {
            let mut map = self.pending.lock();
            map.drain().map(|(_, stream)| stream).collect()
        };
        drop(pending);

        let handles: Vec<ChannelHandle> = {
            let mut map = self.channels.lock();
            map.drain().map(|(_, handle)| handle).collect()
        };
        for handle in handles {
            handle.close().await;
        }
    }

    /// Forget a channel whose read loop already terminated.
    pub async fn remove_channel(&self, endpoint_id: &str) {
        let handle = self.channels.lock().remove(endpoint_id);
        if let Some(handle) = handle {
            handle.close().await;
        }
    }

    /// Full teardown: advertising, discovery and all channels.
    pub async fn shutdown(&self) {
        if let Err(err) = self.stop_advertising().await {
            debug!("shutdown stop_advertising: {}", err);
        }
        if let Err(err) = self.stop_discovery().await {
            debug!("shutdown stop_discovery: {}", err);
        }
        self.disconnect_all().await;
    }

    // ------------------------------------------------------------------
    // Bridge signals
    // ------------------------------------------------------------------

    async fn run_signals(self: Arc<Self>, mut signals: mpsc::UnboundedReceiver<RadioSignal>) {
        while let Some(signal) = signals.recv().await {
            match signal {
                RadioSignal::LeScanResult {
                    address,
                    name,
                    manufacturer_data,
                    rssi,
                } => {
                    self.handle_sighting(
                        address,
                        name,
                        manufacturer_data.as_deref(),
                        TransportKind::RadioLowEnergy,
                        rssi,
                    );
                }
                RadioSignal::InquiryResult { address, name } => {
                    self.handle_sighting(address, name, None, TransportKind::RadioClassic, 0);
                }
                RadioSignal::InquiryFinished => {
                    if self.discovery.lock().should_restart_inquiry() {
                        let bridge = self.bridge.clone();
                        let queue = self.queue.clone();
                        tokio::spawn(async move {
                            if let Err(err) = queue
                                .enqueue_unit(move || async move { bridge.start_inquiry().await })
                                .await
                            {
                                warn!("inquiry restart failed: {}", err);
                            }
                        });
                    }
                }
                RadioSignal::PowerChanged { powered: false } => {
                    warn!("radio powered off");
                    self.advertising.lock().on_power_off();
                    self.discovery.lock().on_power_off();
                }
                RadioSignal::PowerChanged { powered: true } => {
                    info!("radio powered on");
                    self.handle_power_on().await;
                }
            }
        }
        debug!("radio signal loop ended");
    }

    fn handle_sighting(
        &self,
        address: String,
        name: Option<String>,
        manufacturer_data: Option<&[u8]>,
        kind: TransportKind,
        rssi: i16,
    ) {
        if !self.discovery.lock().is_desired() {
            return;
        }
        match beacon::classify(name.as_deref(), manufacturer_data) {
            PeerClass::Peer { display_name } => {
                if self.discovery.lock().observe(&address) {
                    debug!(
                        "peer {} ({}) sighted via {} rssi {}",
                        display_name, address, kind, rssi
                    );
                    let _ = self.events_tx.send(RadioEvent::EndpointFound {
                        endpoint_id: address,
                        display_name,
                        kind,
                    });
                }
            }
            PeerClass::Unrelated => {
                trace!("ignoring unrelated device {}", address);
            }
        }
    }

    async fn handle_power_on(self: &Arc<Self>) {
        let (advertise_action, display_name) = {
            let mut control = self.advertising.lock();
            (
                control.on_power_on(),
                control.display_name().unwrap_or("Unknown").to_string(),
            )
        };
        if advertise_action == AdvertiseAction::Restart {
            if let Err(err) = self.register_advertising(&display_name).await {
                warn!("re-advertise after power-on failed: {}", err);
            }
        }

        let restart_discovery = self.discovery.lock().on_power_on();
        if restart_discovery {
            if let Err(err) = self.start_discovery().await {
                warn!("re-scan after power-on failed: {}", err);
            }
        }
    }
}
