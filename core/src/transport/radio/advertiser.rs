//! Advertising state machine.
//!
//! Tracks desired versus actual advertising state so the adapter can recover
//! from radio power transitions and low-energy registration failures. The
//! booleans the radio reports are not trusted blindly: on power-on the state
//! is re-derived from what was desired before the outage.

use serde::{Deserialize, Serialize};

/// Actual advertising state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdvertisingState {
    Idle,
    Advertising,
}

/// Decision returned by state-machine inputs that may require adapter work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvertiseAction {
    /// Nothing to do.
    None,
    /// Re-register advertising with the radio.
    Restart,
}

/// Desired/actual advertising bookkeeping.
#[derive(Debug, Clone)]
pub struct AdvertisingControl {
    state: AdvertisingState,
    /// What the operator asked for; survives power loss and pauses.
    desired: bool,
    /// Display name to re-advertise under.
    display_name: Option<String>,
}

impl AdvertisingControl {
    pub fn new() -> Self {
        Self {
            state: AdvertisingState::Idle,
            desired: false,
            display_name: None,
        }
    }

    pub fn state(&self) -> AdvertisingState {
        self.state
    }

    pub fn is_advertising(&self) -> bool {
        self.state == AdvertisingState::Advertising
    }

    pub fn is_desired(&self) -> bool {
        self.desired
    }

    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }

    /// Operator asked to advertise.
    pub fn desire(&mut self, display_name: &str) {
        self.desired = true;
        self.display_name = Some(display_name.to_string());
    }

    /// Operator asked to stop; also called on unrecoverable failure.
    pub fn stop(&mut self) {
        self.desired = false;
        self.state = AdvertisingState::Idle;
    }

    /// Registration with the radio succeeded.
    pub fn on_started(&mut self) {
        self.state = AdvertisingState::Advertising;
    }

    /// Advertising paused while a connection is live; desire is kept so a
    /// later disconnect can resume it.
    pub fn pause(&mut self) {
        self.state = AdvertisingState::Idle;
    }

    /// Whether a paused or interrupted advertisement should be resumed.
    pub fn should_resume(&self) -> bool {
        self.desired && self.state == AdvertisingState::Idle
    }

    /// Radio lost power.
    pub fn on_power_off(&mut self) {
        self.state = AdvertisingState::Idle;
    }

    /// Radio regained power; re-derive actual state from desire.
    pub fn on_power_on(&mut self) -> AdvertiseAction {
        if self.desired {
            AdvertiseAction::Restart
        } else {
            AdvertiseAction::None
        }
    }

    /// Low-energy registration failed; retry only while still desired.
    pub fn on_le_failure(&self) -> AdvertiseAction {
        if self.desired {
            AdvertiseAction::Restart
        } else {
            AdvertiseAction::None
        }
    }
}

impl Default for AdvertisingControl {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state_idle() {
        let control = AdvertisingControl::new();
        assert_eq!(control.state(), AdvertisingState::Idle);
        assert!(!control.is_desired());
        assert!(!control.should_resume());
    }

    #[test]
    fn test_desire_then_start() {
        let mut control = AdvertisingControl::new();
        control.desire("MyDevice");
        assert!(control.is_desired());
        assert_eq!(control.display_name(), Some("MyDevice"));

        control.on_started();
        assert!(control.is_advertising());
        assert!(!control.should_resume());
    }

    #[test]
    fn test_pause_keeps_desire() {
        let mut control = AdvertisingControl::new();
        control.desire("MyDevice");
        control.on_started();

        control.pause();
        assert!(!control.is_advertising());
        assert!(control.is_desired());
        assert!(control.should_resume());
    }

    #[test]
    fn test_stop_clears_desire() {
        let mut control = AdvertisingControl::new();
        control.desire("MyDevice");
        control.on_started();

        control.stop();
        assert!(!control.is_desired());
        assert!(!control.should_resume());
    }

    #[test]
    fn test_power_cycle_restores_desired_state() {
        let mut control = AdvertisingControl::new();
        control.desire("MyDevice");
        control.on_started();

        control.on_power_off();
        assert_eq!(control.state(), AdvertisingState::Idle);
        assert_eq!(control.on_power_on(), AdvertiseAction::Restart);

        control.stop();
        assert_eq!(control.on_power_on(), AdvertiseAction::None);
    }

    #[test]
    fn test_le_failure_retries_only_while_desired() {
        let mut control = AdvertisingControl::new();
        control.desire("MyDevice");
        assert_eq!(control.on_le_failure(), AdvertiseAction::Restart);

        control.stop();
        assert_eq!(control.on_le_failure(), AdvertiseAction::None);
    }
}
