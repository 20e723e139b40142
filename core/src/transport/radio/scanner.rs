//! Discovery state machine.
//!
//! Tracks desired versus actual scanning state, suppresses duplicate
//! sightings of the same address within one discovery cycle, and decides
//! when a finished classic inquiry should be restarted.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// Actual discovery state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiscoveryState {
    Idle,
    Scanning,
}

/// Desired/actual discovery bookkeeping plus per-cycle dedupe.
#[derive(Debug, Clone)]
pub struct DiscoveryControl {
    state: DiscoveryState,
    desired: bool,
    /// Addresses already announced this cycle.
    seen: HashSet<String>,
}

impl DiscoveryControl {
    pub fn new() -> Self {
        Self {
            state: DiscoveryState::Idle,
            desired: false,
            seen: HashSet::new(),
        }
    }

    pub fn state(&self) -> DiscoveryState {
        self.state
    }

    pub fn is_scanning(&self) -> bool {
        self.state == DiscoveryState::Scanning
    }

    pub fn is_desired(&self) -> bool {
        self.desired
    }

    /// Begin a fresh discovery cycle; prior sightings age out.
    pub fn begin_cycle(&mut self) {
        self.desired = true;
        self.seen.clear();
    }

    pub fn on_started(&mut self) {
        self.state = DiscoveryState::Scanning;
    }

    pub fn stop(&mut self) {
        self.desired = false;
        self.state = DiscoveryState::Idle;
    }

    /// Record a sighting; returns true only the first time an address is
    /// seen this cycle (later sightings are not re-announced).
    pub fn observe(&mut self, address: &str) -> bool {
        self.seen.insert(address.to_string())
    }

    /// Classic inquiry rounds end on their own; restart while still desired.
    pub fn should_restart_inquiry(&self) -> bool {
        self.desired
    }

    pub fn on_power_off(&mut self) {
        self.state = DiscoveryState::Idle;
    }

    /// Returns true when scanning should be re-registered after power-on.
    pub fn on_power_on(&self) -> bool {
        self.desired
    }
}

impl Default for DiscoveryControl {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state() {
        let control = DiscoveryControl::new();
        assert_eq!(control.state(), DiscoveryState::Idle);
        assert!(!control.is_desired());
    }

    #[test]
    fn test_duplicate_sightings_suppressed() {
        let mut control = DiscoveryControl::new();
        control.begin_cycle();
        assert!(control.observe("aa:bb:cc:dd:ee:ff"));
        assert!(!control.observe("aa:bb:cc:dd:ee:ff"));
        assert!(control.observe("11:22:33:44:55:66"));
    }

    #[test]
    fn test_new_cycle_clears_sightings() {
        let mut control = DiscoveryControl::new();
        control.begin_cycle();
        assert!(control.observe("aa:bb:cc:dd:ee:ff"));

        control.begin_cycle();
        assert!(control.observe("aa:bb:cc:dd:ee:ff"));
    }

    #[test]
    fn test_inquiry_restart_follows_desire() {
        let mut control = DiscoveryControl::new();
        control.begin_cycle();
        control.on_started();
        assert!(control.should_restart_inquiry());

        control.stop();
        assert!(!control.should_restart_inquiry());
    }

    #[test]
    fn test_power_cycle() {
        let mut control = DiscoveryControl::new();
        control.begin_cycle();
        control.on_started();

        control.on_power_off();
        assert_eq!(control.state(), DiscoveryState::Idle);
        assert!(control.on_power_on());

        control.stop();
        assert!(!control.on_power_on());
    }
}
