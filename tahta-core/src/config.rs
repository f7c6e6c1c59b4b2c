//! Configuration for the streaming session.

use serde::{Deserialize, Serialize};

/// Reconnect policy applied after an unexpected close of an open
/// connection.
///
/// The delay before attempt `n` (1-based) is
/// `min(base_delay_ms * 2^(n-1), max_delay_ms)`. The schedule is
/// deterministic; there is no jitter. First-connect handshake failures are
/// never retried by the session, only post-open drops are.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ReconnectConfig {
    /// Number of attempts before the session closes terminally.
    pub max_attempts: u32,
    /// Delay before the first attempt, in milliseconds.
    pub base_delay_ms: u64,
    /// Upper bound on any single delay, in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 5_000,
            max_delay_ms: 30_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ReconnectConfig;

    #[test]
    fn default_values() {
        let cfg = ReconnectConfig::default();
        assert_eq!(cfg.max_attempts, 5);
        assert_eq!(cfg.base_delay_ms, 5_000);
        assert_eq!(cfg.max_delay_ms, 30_000);
    }

    #[test]
    fn serde_round_trip() {
        let cfg = ReconnectConfig {
            max_attempts: 3,
            base_delay_ms: 100,
            max_delay_ms: 1_000,
        };
        let json = serde_json::to_string(&cfg).unwrap();
        let back: ReconnectConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.max_attempts, 3);
        assert_eq!(back.base_delay_ms, 100);
        assert_eq!(back.max_delay_ms, 1_000);
    }
}
