//! Exponential backoff.

use std::time::Duration;

/// First retry delay used by the admin and probe clients.
pub const DEFAULT_BASE_DELAY_MS: u64 = 200;

/// Backoff ceiling.
pub const DEFAULT_MAX_DELAY_MS: u64 = 2000;

/// Delay to wait after the given (1-based) failed attempt.
///
/// Doubles from `base_ms` and saturates at `max_ms`: 200, 400, 800, 1600,
/// 2000, 2000, ... with the defaults.
pub fn calculate_backoff(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    if attempt == 0 {
        return Duration::from_millis(0);
    }

    let exponential_base = 2u64.saturating_pow(attempt - 1);
    let delay_ms = base_ms.saturating_mul(exponential_base);

    Duration::from_millis(delay_ms.min(max_ms))
}
