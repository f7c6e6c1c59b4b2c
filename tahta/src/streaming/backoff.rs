//! Reconnect delay schedule.

use std::time::Duration;

use tahta_core::ReconnectConfig;

/// Delay before reconnect attempt `attempt` (1-based):
/// `min(base * 2^(attempt-1), max)`.
pub fn reconnect_delay(cfg: &ReconnectConfig, attempt: u32) -> Duration {
    let exp = attempt.saturating_sub(1).min(63);
    let factor = 1u64.checked_shl(exp).unwrap_or(u64::MAX);
    let delay_ms = cfg.base_delay_ms.saturating_mul(factor).min(cfg.max_delay_ms);
    Duration::from_millis(delay_ms)
}
