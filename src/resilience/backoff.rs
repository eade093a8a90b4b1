//! Delay between failover passes: exponential with up to 10% jitter.

use rand::Rng;
use std::time::Duration;

/// Delay before pass `round` (pass 0 starts immediately).
pub fn calculate_backoff(round: u32, base_ms: u64, max_ms: u64) -> Duration {
    if round == 0 || base_ms == 0 {
        return Duration::ZERO;
    }

    let factor = 1u64.checked_shl(round - 1).unwrap_or(u64::MAX);
    let delay_ms = base_ms.saturating_mul(factor).min(max_ms);

    let jitter_ms = match delay_ms / 10 {
        0 => 0,
        range => rand::thread_rng().gen_range(0..range),
    };
    Duration::from_millis(delay_ms + jitter_ms)
}
