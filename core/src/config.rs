//! Engine configuration.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Connection topology the engine is operating under.
///
/// The strategy drives how advertising behaves around live connections: a
/// hub-and-spoke or one-to-one topology stops broadcasting while connected,
/// a cluster keeps broadcasting so more peers can join.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    /// One hub, many spokes.
    Star,
    /// Many-to-many mesh.
    Cluster,
    /// Exactly two peers.
    PointToPoint,
}

impl Strategy {
    /// Whether advertising pauses while at least one connection is live.
    pub fn pauses_advertising(&self) -> bool {
        !matches!(self, Strategy::Cluster)
    }
}

impl FromStr for Strategy {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "star" => Ok(Strategy::Star),
            "cluster" => Ok(Strategy::Cluster),
            "point-to-point" | "point_to_point" => Ok(Strategy::PointToPoint),
            other => Err(EngineError::InvalidStrategy(other.to_string())),
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::Star => write!(f, "star"),
            Strategy::Cluster => write!(f, "cluster"),
            Strategy::PointToPoint => write!(f, "point-to-point"),
        }
    }
}

/// Tunable engine parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// How long callers wait for a queued radio command.
    pub command_timeout: Duration,
    /// Backoff before retrying a failed low-energy advertise registration.
    pub advertise_retry_backoff: Duration,
    /// Read buffer size for classic-socket channels.
    pub read_buffer_size: usize,
    /// Connection topology.
    pub strategy: Strategy,
    /// Platform tag carried in the advertising marker.
    pub platform_tag: u8,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            command_timeout: Duration::from_secs(10),
            advertise_retry_backoff: Duration::from_secs(5),
            read_buffer_size: 4096,
            strategy: Strategy::Star,
            platform_tag: 0x01,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.command_timeout, Duration::from_secs(10));
        assert_eq!(config.advertise_retry_backoff, Duration::from_secs(5));
        assert_eq!(config.read_buffer_size, 4096);
        assert_eq!(config.strategy, Strategy::Star);
    }

    #[test]
    fn test_strategy_parse() {
        assert_eq!("star".parse::<Strategy>().unwrap(), Strategy::Star);
        assert_eq!("Cluster".parse::<Strategy>().unwrap(), Strategy::Cluster);
        assert_eq!(
            "point-to-point".parse::<Strategy>().unwrap(),
            Strategy::PointToPoint
        );
        assert_eq!(
            "point_to_point".parse::<Strategy>().unwrap(),
            Strategy::PointToPoint
        );
        assert_eq!(
            "ring".parse::<Strategy>(),
            Err(EngineError::InvalidStrategy("ring".to_string()))
        );
    }

    #[test]
    fn test_strategy_advertising_pause() {
        assert!(Strategy::Star.pauses_advertising());
        assert!(Strategy::PointToPoint.pauses_advertising());
        assert!(!Strategy::Cluster.pauses_advertising());
    }

    #[test]
    fn test_strategy_display_roundtrip() {
        for strategy in [Strategy::Star, Strategy::Cluster, Strategy::PointToPoint] {
            assert_eq!(strategy.to_string().parse::<Strategy>().unwrap(), strategy);
        }
    }
}
