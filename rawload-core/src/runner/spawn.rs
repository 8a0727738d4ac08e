use std::time::Duration;

const MIN_SPAWN_INTERVAL: Duration = Duration::from_millis(1);

/// Users-per-second at which the remaining users are introduced.
///
/// An explicit rate wins. Otherwise a ramp-up spreads `remaining` users over its
/// length. `None` means every remaining user is allowed at once.
pub fn derive_spawn_rate(
    explicit: Option<u64>,
    ramp_up: Option<Duration>,
    remaining: u64,
) -> Option<u64> {
    if explicit.is_some() {
        return explicit;
    }
    let ramp_secs = ramp_up?.as_secs_f64();
    if remaining == 0 || ramp_secs <= 0.0 {
        return None;
    }
    Some(((remaining as f64 / ramp_secs).ceil() as u64).max(1))
}

/// Gap between two spawns at `rate` users per second, never below 1ms.
pub fn spawn_interval(rate: u64) -> Duration {
    if rate == 0 {
        return Duration::ZERO;
    }
    Duration::from_nanos(1_000_000_000 / rate).max(MIN_SPAWN_INTERVAL)
}
