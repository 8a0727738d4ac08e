use std::time::Duration;

use rand::prelude::*;
use rand::rngs::StdRng;
use tokio_util::sync::CancellationToken;

use super::config::WaitRange;

/// Think time before a user's next iteration.
///
/// With a range, samples uniformly from `[min, max]` (inclusive, reversed bounds are
/// swapped). Without one, the fixed `delay`.
pub fn user_wait(range: Option<WaitRange>, delay: Duration, rng: &mut StdRng) -> Duration {
    let Some(WaitRange { min_ms, max_ms }) = range else {
        return delay;
    };
    let (lo, hi) = if min_ms <= max_ms {
        (min_ms, max_ms)
    } else {
        (max_ms, min_ms)
    };
    if hi == lo {
        return Duration::from_millis(lo);
    }
    Duration::from_millis(rng.random_range(lo..=hi))
}

/// Sleeps for `delay` unless `cancel` or `stop` fires first.
///
/// Returns `true` only when the full delay elapsed. A zero delay returns `true`
/// immediately.
pub async fn wait_or_stop(
    cancel: &CancellationToken,
    stop: &CancellationToken,
    delay: Duration,
) -> bool {
    if delay.is_zero() {
        return true;
    }
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = stop.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}
