//! Client tunables.

use shared::netsim::Preset;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    pub server_url: String,
    pub player_name: String,
    /// Routes outbound traffic through the network simulator when set
    pub preset: Option<Preset>,
    /// Drive the player with random movement instead of staying idle
    pub wander: bool,
    pub frame_rate: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: "ws://127.0.0.1:3001".to_string(),
            player_name: "Player".to_string(),
            preset: None,
            wander: false,
            frame_rate: 60,
        }
    }
}

impl ClientConfig {
    /// Time between two frames. A zero frame rate is treated as 1 fps.
    pub fn frame_duration(&self) -> Duration {
        Duration::from_nanos(1_000_000_000 / u64::from(self.frame_rate.max(1)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.server_url, "ws://127.0.0.1:3001");
        assert_eq!(config.player_name, "Player");
        assert!(config.preset.is_none());
        assert_eq!(config.frame_rate, 60);
    }

    #[test]
    fn test_frame_duration() {
        let config = ClientConfig {
            frame_rate: 50,
            ..ClientConfig::default()
        };
        assert_eq!(config.frame_duration(), Duration::from_millis(20));

        let stalled = ClientConfig {
            frame_rate: 0,
            ..ClientConfig::default()
        };
        assert_eq!(stalled.frame_duration(), Duration::from_secs(1));
    }
}
