//! Connection session manager.
//!
//! One state machine per endpoint, `Discovered → Connecting → Connected →
//! Disconnected`. Disconnected is terminal; a reconnect starts a fresh
//! session. The manager also owns the advertising-around-connections policy:
//! exclusive topologies pause advertising while any session is connected and
//! resume it when the last one ends.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::Strategy;
use crate::transport::TransportKind;

/// Lifecycle state of one connection session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    Discovered,
    Connecting,
    Connected,
    Disconnected,
}

#[derive(Debug, Clone)]
pub struct Session {
    pub endpoint_id: String,
    pub state: SessionState,
    pub transport_kind: TransportKind,
}

/// What the caller must do to advertising after a state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvertisingEffect {
    None,
    Pause,
    Resume,
}

/// Session map plus the advertising policy derived from the topology.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<RwLock<Inner>>,
}

struct Inner {
    sessions: HashMap<String, Session>,
    strategy: Strategy,
    /// Whether the operator wants to be advertising, independent of pauses.
    advertising_desired: bool,
}

impl SessionManager {
    pub fn new(strategy: Strategy) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner {
                sessions: HashMap::new(),
                strategy,
                advertising_desired: false,
            })),
        }
    }

    pub fn strategy(&self) -> Strategy {
        self.inner.read().strategy
    }

    /// Change topology. Affects future connect/disconnect decisions only.
    pub fn set_strategy(&self, strategy: Strategy) {
        self.inner.write().strategy = strategy;
    }

    pub fn set_advertising_desired(&self, desired: bool) {
        self.inner.write().advertising_desired = desired;
    }

    pub fn state(&self, endpoint_id: &str) -> Option<SessionState> {
        self.inner.read().sessions.get(endpoint_id).map(|s| s.state)
    }

    pub fn connected_count(&self) -> usize {
        self.inner
            .read()
            .sessions
            .values()
            .filter(|s| s.state == SessionState::Connected)
            .count()
    }

    /// Track a freshly discovered endpoint. Never downgrades an existing
    /// session.
    pub fn mark_discovered(&self, endpoint_id: &str, transport_kind: TransportKind) {
        let mut inner = self.inner.write();
        inner
            .sessions
            .entry(endpoint_id.to_string())
            .or_insert_with(|| Session {
                endpoint_id: endpoint_id.to_string(),
                state: SessionState::Discovered,
                transport_kind,
            });
    }

    /// Start (or restart) a session in the Connecting state.
    pub fn begin_connecting(&self, endpoint_id: &str, transport_kind: TransportKind) {
        let mut inner = self.inner.write();
        inner.sessions.insert(
            endpoint_id.to_string(),
            Session {
                endpoint_id: endpoint_id.to_string(),
                state: SessionState::Connecting,
                transport_kind,
            },
        );
    }

    /// Connection established. Returns whether advertising should pause.
    pub fn mark_connected(&self, endpoint_id: &str, transport_kind: TransportKind) -> AdvertisingEffect {
        let mut inner = self.inner.write();
        inner.sessions.insert(
            endpoint_id.to_string(),
            Session {
                endpoint_id: endpoint_id.to_string(),
                state: SessionState::Connected,
                transport_kind,
            },
        );
        if inner.strategy.pauses_advertising() {
            AdvertisingEffect::Pause
        } else {
            AdvertisingEffect::None
        }
    }

    /// Connection attempt failed. Advertising is untouched.
    pub fn mark_failed(&self, endpoint_id: &str) {
        let mut inner = self.inner.write();
        if let Some(session) = inner.sessions.get_mut(endpoint_id) {
            session.state = SessionState::Disconnected;
        }
    }

    /// A connected session ended. Returns whether advertising should resume
    /// (no sessions left connected and the operator still wants to
    /// advertise).
    pub fn mark_disconnected(&self, endpoint_id: &str) -> AdvertisingEffect {
        let mut inner = self.inner.write();
        let was_connected = match inner.sessions.get_mut(endpoint_id) {
            Some(session) => {
                let was = session.state == SessionState::Connected;
                session.state = SessionState::Disconnected;
                was
            }
            None => false,
        };
        if !was_connected {
            return AdvertisingEffect::None;
        }
        let any_connected = inner
            .sessions
            .values()
            .any(|s| s.state == SessionState::Connected);
        if !any_connected && inner.advertising_desired {
            debug!("last session ended, advertising resumes");
            AdvertisingEffect::Resume
        } else {
            AdvertisingEffect::None
        }
    }

    /// End every session. Idempotent; returns the ids that were Connected or
    /// Connecting so their channels can be torn down.
    pub fn disconnect_all(&self) -> Vec<String> {
        let mut inner = self.inner.write();
        let mut live = Vec::new();
        for session in inner.sessions.values_mut() {
            if matches!(
                session.state,
                SessionState::Connected | SessionState::Connecting
            ) {
                live.push(session.endpoint_id.clone());
            }
            session.state = SessionState::Disconnected;
        }
        live
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle() {
        let manager = SessionManager::new(Strategy::Star);
        manager.mark_discovered("a", TransportKind::RadioClassic);
        assert_eq!(manager.state("a"), Some(SessionState::Discovered));

        manager.begin_connecting("a", TransportKind::RadioClassic);
        assert_eq!(manager.state("a"), Some(SessionState::Connecting));

        manager.mark_connected("a", TransportKind::RadioClassic);
        assert_eq!(manager.state("a"), Some(SessionState::Connected));
        assert_eq!(manager.connected_count(), 1);

        manager.mark_disconnected("a");
        assert_eq!(manager.state("a"), Some(SessionState::Disconnected));
        assert_eq!(manager.connected_count(), 0);
    }

    #[test]
    fn test_star_pauses_advertising_on_connect() {
        let manager = SessionManager::new(Strategy::Star);
        manager.set_advertising_desired(true);
        assert_eq!(
            manager.mark_connected("a", TransportKind::Managed),
            AdvertisingEffect::Pause
        );
    }

    #[test]
    fn test_cluster_keeps_advertising_on_connect() {
        let manager = SessionManager::new(Strategy::Cluster);
        manager.set_advertising_desired(true);
        assert_eq!(
            manager.mark_connected("a", TransportKind::Managed),
            AdvertisingEffect::None
        );
    }

    #[test]
    fn test_last_disconnect_resumes_advertising() {
        let manager = SessionManager::new(Strategy::Star);
        manager.set_advertising_desired(true);
        manager.mark_connected("a", TransportKind::Managed);
        manager.mark_connected("b", TransportKind::RadioClassic);

        assert_eq!(manager.mark_disconnected("a"), AdvertisingEffect::None);
        assert_eq!(manager.mark_disconnected("b"), AdvertisingEffect::Resume);
    }

    #[test]
    fn test_no_resume_when_advertising_not_desired() {
        let manager = SessionManager::new(Strategy::Star);
        manager.mark_connected("a", TransportKind::Managed);
        assert_eq!(manager.mark_disconnected("a"), AdvertisingEffect::None);
    }

    #[test]
    fn test_failed_connect_leaves_advertising_alone() {
        let manager = SessionManager::new(Strategy::Star);
        manager.set_advertising_desired(true);
        manager.begin_connecting("a", TransportKind::RadioClassic);
        manager.mark_failed("a");
        assert_eq!(manager.state("a"), Some(SessionState::Disconnected));
        // No Resume was emitted anywhere on this path.
        assert_eq!(manager.mark_disconnected("a"), AdvertisingEffect::None);
    }

    #[test]
    fn test_disconnect_all_idempotent() {
        let manager = SessionManager::new(Strategy::Star);
        manager.mark_connected("a", TransportKind::Managed);
        manager.begin_connecting("b", TransportKind::RadioClassic);

        let mut live = manager.disconnect_all();
        live.sort();
        assert_eq!(live, vec!["a".to_string(), "b".to_string()]);
        assert!(manager.disconnect_all().is_empty());
    }

    #[test]
    fn test_discovery_never_downgrades_a_session() {
        let manager = SessionManager::new(Strategy::Star);
        manager.mark_connected("a", TransportKind::RadioClassic);
        manager.mark_discovered("a", TransportKind::RadioLowEnergy);
        assert_eq!(manager.state("a"), Some(SessionState::Connected));
    }

    #[test]
    fn test_reconnect_starts_fresh_session() {
        let manager = SessionManager::new(Strategy::Star);
        manager.mark_connected("a", TransportKind::RadioClassic);
        manager.mark_disconnected("a");

        manager.begin_connecting("a", TransportKind::RadioClassic);
        assert_eq!(manager.state("a"), Some(SessionState::Connecting));
    }
}
