use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Global requests-per-second pacing shared by every virtual user.
///
/// Each [`RateLimiter::reserve`] call claims the next free slot under the lock, so
/// concurrent callers get distinct, evenly spaced slots.
#[derive(Debug)]
pub struct RateLimiter {
    interval: Duration,
    next_allowed: Mutex<Instant>,
}

impl RateLimiter {
    /// Returns `None` when `rps` is zero (no limiting).
    pub fn new(start: Instant, rps: u64) -> Option<Self> {
        if rps == 0 {
            return None;
        }
        let interval = Duration::from_nanos(1_000_000_000 / rps).max(Duration::from_nanos(1));
        Some(Self {
            interval,
            next_allowed: Mutex::new(start),
        })
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Claims the next slot and returns how long the caller must wait for it.
    ///
    /// A caller arriving after its slot passed waits zero; missed slots are not
    /// replayed as a burst.
    pub fn reserve(&self, now: Instant) -> Duration {
        let mut next = self
            .next_allowed
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let wait = next.saturating_duration_since(now);
        if now > *next {
            *next = now;
        }
        *next += self.interval;
        wait
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn zero_rate_disables_limiting() {
        assert!(RateLimiter::new(Instant::now(), 0).is_none());
    }

    #[test]
    fn same_instant_reservations_are_spaced_by_interval() {
        let start = Instant::now();
        let limiter = RateLimiter::new(start, 10).unwrap();
        assert_eq!(limiter.interval(), Duration::from_millis(100));

        assert_eq!(limiter.reserve(start), Duration::ZERO);
        assert_eq!(limiter.reserve(start), Duration::from_millis(100));
        assert_eq!(limiter.reserve(start), Duration::from_millis(200));
    }

    #[test]
    fn late_caller_does_not_owe_a_burst() {
        let start = Instant::now();
        let limiter = RateLimiter::new(start, 10).unwrap();
        assert_eq!(limiter.reserve(start), Duration::ZERO);

        let late = start + Duration::from_secs(5);
        assert_eq!(limiter.reserve(late), Duration::ZERO);
        assert_eq!(limiter.reserve(late), Duration::from_millis(100));
    }

    #[test]
    fn huge_rate_keeps_a_positive_interval() {
        let limiter = RateLimiter::new(Instant::now(), u64::MAX).unwrap();
        assert_eq!(limiter.interval(), Duration::from_nanos(1));
    }

    #[test]
    fn concurrent_reservations_get_distinct_slots() {
        use std::sync::Arc;

        let start = Instant::now();
        let limiter = Arc::new(RateLimiter::new(start, 1_000).unwrap());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = limiter.clone();
                std::thread::spawn(move || {
                    (0..50).map(|_| limiter.reserve(start)).collect::<Vec<_>>()
                })
            })
            .collect();

        let mut waits: Vec<Duration> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        waits.sort();
        waits.dedup();
        assert_eq!(waits.len(), 400);
        assert_eq!(waits.last().copied(), Some(Duration::from_millis(399)));
    }
}
