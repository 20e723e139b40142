//! Endpoint registry.
//!
//! Both transports feed discoveries into one endpoint space keyed by the
//! canonical id (radio address or managed endpoint id). The registry is the
//! single place routing is decided: an endpoint reachable through the
//! managed framework is connected through it even if the radio also saw it.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::transport::TransportKind;

/// A discovered peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub id: String,
    pub display_name: String,
    pub transport_kind: TransportKind,
}

/// Discovered-endpoint map shared between the engine and its dispatcher.
#[derive(Clone, Default)]
pub struct Registry {
    inner: Arc<RwLock<Inner>>,
}

#[derive(Default)]
struct Inner {
    endpoints: HashMap<String, Endpoint>,
    /// Ids the managed framework reported this cycle. Routing prefers the
    /// managed path for these even after a radio sighting overwrites the
    /// endpoint record.
    managed_seen: HashSet<String>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a discovery. Same-id collisions are last-write-wins for the
    /// record itself. Returns true only for the first sighting of an id this
    /// cycle; later sightings are not re-announced.
    pub fn insert(&self, endpoint: Endpoint) -> bool {
        let mut inner = self.inner.write();
        if endpoint.transport_kind == TransportKind::Managed {
            inner.managed_seen.insert(endpoint.id.clone());
        }
        inner
            .endpoints
            .insert(endpoint.id.clone(), endpoint)
            .is_none()
    }

    pub fn get(&self, id: &str) -> Option<Endpoint> {
        self.inner.read().endpoints.get(id).cloned()
    }

    /// Drop a lost endpoint. Returns whether it was known.
    pub fn remove(&self, id: &str) -> bool {
        let mut inner = self.inner.write();
        inner.managed_seen.remove(id);
        inner.endpoints.remove(id).is_some()
    }

    /// Transport to connect through. Managed wins whenever the managed
    /// framework reported the endpoint this cycle; unknown ids default to
    /// managed, since the framework accepts ids it minted without a prior
    /// local discovery record.
    pub fn preferred_route(&self, id: &str) -> TransportKind {
        let inner = self.inner.read();
        if inner.managed_seen.contains(id) {
            return TransportKind::Managed;
        }
        match inner.endpoints.get(id) {
            Some(endpoint) => endpoint.transport_kind,
            None => TransportKind::Managed,
        }
    }

    /// Whether the managed framework reported this id this cycle.
    pub fn managed_seen(&self, id: &str) -> bool {
        self.inner.read().managed_seen.contains(id)
    }

    pub fn len(&self) -> usize {
        self.inner.read().endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().endpoints.is_empty()
    }

    /// Forget everything; called when a fresh discovery cycle starts.
    pub fn clear(&self) {
        let mut inner = self.inner.write();
        inner.endpoints.clear();
        inner.managed_seen.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ep(id: &str, kind: TransportKind) -> Endpoint {
        Endpoint {
            id: id.to_string(),
            display_name: format!("peer-{}", id),
            transport_kind: kind,
        }
    }

    #[test]
    fn test_first_sighting_announced_once() {
        let registry = Registry::new();
        assert!(registry.insert(ep("a", TransportKind::RadioLowEnergy)));
        assert!(!registry.insert(ep("a", TransportKind::RadioClassic)));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_last_write_wins() {
        let registry = Registry::new();
        registry.insert(ep("a", TransportKind::RadioLowEnergy));
        registry.insert(ep("a", TransportKind::RadioClassic));
        assert_eq!(
            registry.get("a").unwrap().transport_kind,
            TransportKind::RadioClassic
        );
    }

    #[test]
    fn test_managed_route_preferred() {
        let registry = Registry::new();
        registry.insert(ep("a", TransportKind::Managed));
        registry.insert(ep("a", TransportKind::RadioClassic));
        assert_eq!(registry.preferred_route("a"), TransportKind::Managed);

        registry.insert(ep("b", TransportKind::RadioClassic));
        assert_eq!(registry.preferred_route("b"), TransportKind::RadioClassic);
    }

    #[test]
    fn test_unknown_id_routes_managed() {
        let registry = Registry::new();
        assert_eq!(registry.preferred_route("nope"), TransportKind::Managed);
    }

    #[test]
    fn test_clear_empties_everything() {
        let registry = Registry::new();
        registry.insert(ep("a", TransportKind::Managed));
        registry.insert(ep("b", TransportKind::RadioLowEnergy));
        registry.clear();
        assert!(registry.is_empty());
        // A cleared endpoint is announceable again.
        assert!(registry.insert(ep("a", TransportKind::RadioLowEnergy)));
        assert_eq!(registry.preferred_route("a"), TransportKind::RadioLowEnergy);
    }

    #[test]
    fn test_remove() {
        let registry = Registry::new();
        registry.insert(ep("a", TransportKind::Managed));
        assert!(registry.remove("a"));
        assert!(!registry.remove("a"));
        assert_eq!(registry.preferred_route("a"), TransportKind::Managed);
    }
}
