use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Run-wide iteration cap and deadline shared by every virtual user.
#[derive(Debug)]
pub struct IterationGate {
    issued: AtomicU64,
    iterations: Option<u64>,
    deadline: Option<Instant>,
}

impl IterationGate {
    pub fn new(iterations: Option<u64>, deadline: Option<Instant>) -> Self {
        Self {
            issued: AtomicU64::new(0),
            iterations,
            deadline,
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn expired_at(&self, now: Instant) -> bool {
        self.deadline.is_some_and(|deadline| now > deadline)
    }

    pub fn expired(&self) -> bool {
        // Hot path: skip the clock read when there is no deadline.
        self.deadline.is_some() && self.expired_at(Instant::now())
    }

    /// Claims one iteration. `false` once the cap is used up.
    pub fn reserve(&self) -> bool {
        let Some(cap) = self.iterations else {
            return true;
        };
        self.issued.fetch_add(1, Ordering::Relaxed) < cap
    }
}
