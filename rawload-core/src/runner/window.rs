use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

const MIN_WINDOW_SECS: u64 = 3;

/// Aggregate over the trailing window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowStats {
    pub sent: u64,
    pub failed: u64,
    pub failure_rate: f64,
    pub rps: f64,
}

#[derive(Debug, Default, Clone, Copy)]
struct Bucket {
    sec: u64,
    sent: u64,
    failed: u64,
}

/// Rolling per-second sent/failed counts over the last `window_secs` seconds.
///
/// Buckets live in a ring indexed by unix second; a bucket still holding an older
/// second is reset when it is next written, so nothing sweeps in the background.
#[derive(Debug)]
pub struct SlidingWindow {
    window_secs: u64,
    buckets: Option<Mutex<Vec<Bucket>>>,
}

fn unix_secs(now: SystemTime) -> u64 {
    now.duration_since(UNIX_EPOCH).map_or(0, |d| d.as_secs())
}

impl SlidingWindow {
    pub fn new(window_secs: u64) -> Self {
        let window_secs = window_secs.max(MIN_WINDOW_SECS);
        // Two spare buckets keep the oldest in-window second from being recycled
        // while the newest one is written.
        let len = (window_secs + 2) as usize;
        Self {
            window_secs,
            buckets: Some(Mutex::new(vec![Bucket::default(); len])),
        }
    }

    /// A tracker that records nothing and never reports stats.
    pub fn disabled() -> Self {
        Self {
            window_secs: 0,
            buckets: None,
        }
    }

    pub fn window_secs(&self) -> u64 {
        self.window_secs
    }

    pub fn record(&self, now: SystemTime, failure: bool) {
        let Some(buckets) = &self.buckets else {
            return;
        };
        let sec = unix_secs(now);
        let mut buckets = buckets.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let idx = (sec % buckets.len() as u64) as usize;
        let bucket = &mut buckets[idx];
        if bucket.sec != sec {
            *bucket = Bucket {
                sec,
                ..Bucket::default()
            };
        }
        bucket.sent += 1;
        if failure {
            bucket.failed += 1;
        }
    }

    /// Sums the seconds in `[now - window + 1, now]`. `None` when nothing was sent.
    pub fn stats(&self, now: SystemTime) -> Option<WindowStats> {
        let buckets = self.buckets.as_ref()?;
        let now_sec = unix_secs(now);
        let oldest = now_sec.saturating_sub(self.window_secs - 1);

        let (sent, failed) = buckets
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .filter(|b| b.sent > 0 && (oldest..=now_sec).contains(&b.sec))
            .fold((0, 0), |(s, f), b| (s + b.sent, f + b.failed));

        if sent == 0 {
            return None;
        }
        Some(WindowStats {
            sent,
            failed,
            failure_rate: failed as f64 / sent as f64,
            rps: sent as f64 / self.window_secs as f64,
        })
    }
}
