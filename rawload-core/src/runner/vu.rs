use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant, SystemTime};

use rand::rngs::StdRng;
use rand::prelude::*;
use tokio_util::sync::CancellationToken;

use super::abort::failure_rate_abort;
use super::config::NormalizedConfig;
use super::gate::IterationGate;
use super::limiter::RateLimiter;
use super::request::{PerformRequest, RequestSpec};
use super::response::{CANCELLED_RESPONSE, parse_status_and_timing};
use super::stats::RunStats;
use super::wait::{user_wait, wait_or_stop};
use super::window::SlidingWindow;

/// How long a user above the allowed count sleeps before re-checking.
const PARK_INTERVAL: Duration = Duration::from_millis(200);

/// State shared by the users, the spawn ramp, the controller and the coordinator.
pub(crate) struct RunShared {
    pub request: Arc<RequestSpec>,
    pub performer: Arc<dyn PerformRequest>,
    pub cfg: NormalizedConfig,
    pub started: Instant,
    pub gate: IterationGate,
    pub limiter: Option<RateLimiter>,
    pub window: SlidingWindow,
    pub stats: RunStats,
    /// Users numbered `1..=allowed_users` may issue requests.
    pub allowed_users: AtomicU64,
    pub active_users: AtomicU64,
    pub allow_ramping: AtomicBool,
    /// Caller-driven hard stop.
    pub cancel: CancellationToken,
    /// Engine-driven graceful stop.
    pub stop: CancellationToken,
    aborted: AtomicBool,
    abort_reason: OnceLock<String>,
}

impl RunShared {
    pub fn new(
        request: Arc<RequestSpec>,
        performer: Arc<dyn PerformRequest>,
        cfg: NormalizedConfig,
        started: Instant,
        cancel: CancellationToken,
    ) -> Self {
        let deadline = cfg.duration.map(|d| started + d);
        let window = if cfg.adaptive.enabled {
            SlidingWindow::new(cfg.adaptive.window_secs)
        } else {
            SlidingWindow::disabled()
        };
        Self {
            request,
            performer,
            gate: IterationGate::new(cfg.iterations, deadline),
            limiter: cfg
                .requests_per_second
                .and_then(|rps| RateLimiter::new(started, rps)),
            window,
            stats: RunStats::default(),
            allowed_users: AtomicU64::new(cfg.start_users),
            active_users: AtomicU64::new(0),
            allow_ramping: AtomicBool::new(true),
            cancel,
            stop: CancellationToken::new(),
            aborted: AtomicBool::new(false),
            abort_reason: OnceLock::new(),
            started,
            cfg,
        }
    }

    /// Marks the run aborted and winds it down. The first reason sticks.
    pub fn abort(&self, reason: String) {
        if self.abort_reason.set(reason).is_ok() {
            tracing::warn!(
                reason = self.abort_reason.get().map(String::as_str),
                "load test aborted"
            );
        }
        self.aborted.store(true, Ordering::Release);
        self.stop.cancel();
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::Acquire)
    }

    pub fn abort_reason(&self) -> Option<String> {
        self.abort_reason.get().cloned()
    }

    /// Any reason for a loop to stop issuing work.
    pub fn should_exit(&self) -> bool {
        self.cancel.is_cancelled()
            || self.stop.is_cancelled()
            || self.is_aborted()
            || self.gate.expired()
    }

    pub fn active_users(&self) -> u64 {
        self.active_users.load(Ordering::Relaxed)
    }
}

/// Counts a user as active while held; released on drop.
struct ActiveSlot<'a> {
    active_users: &'a AtomicU64,
    held: bool,
}

impl<'a> ActiveSlot<'a> {
    fn new(active_users: &'a AtomicU64) -> Self {
        Self {
            active_users,
            held: false,
        }
    }

    fn enter(&mut self) {
        if !self.held {
            self.active_users.fetch_add(1, Ordering::Relaxed);
            self.held = true;
        }
    }

    fn leave(&mut self) {
        if self.held {
            self.active_users.fetch_sub(1, Ordering::Relaxed);
            self.held = false;
        }
    }
}

impl Drop for ActiveSlot<'_> {
    fn drop(&mut self) {
        self.leave();
    }
}

/// One virtual user: `user` is 1-based and compared against the allowed count
/// on every iteration, so concurrency follows ramp-up and backoff without
/// respawning tasks.
pub(crate) async fn run_user(shared: Arc<RunShared>, user: u64) {
    let mut rng = StdRng::from_rng(&mut rand::rng());
    let mut slot = ActiveSlot::new(&shared.active_users);

    loop {
        if shared.should_exit() {
            return;
        }

        if user > shared.allowed_users.load(Ordering::Relaxed) {
            slot.leave();
            if !wait_or_stop(&shared.cancel, &shared.stop, PARK_INTERVAL).await {
                return;
            }
            continue;
        }
        slot.enter();

        if !shared.gate.reserve() {
            return;
        }

        if let Some(limiter) = &shared.limiter {
            let wait = limiter.reserve(Instant::now());
            wait_or_stop(&shared.cancel, &shared.stop, wait).await;
        }
        if shared.cancel.is_cancelled() || shared.stop.is_cancelled() || shared.is_aborted() {
            return;
        }

        let record = shared
            .performer
            .perform(shared.cancel.clone(), shared.request.clone())
            .await;
        if record == CANCELLED_RESPONSE {
            return;
        }

        let (status, timing_ms) = parse_status_and_timing(&record);
        let elapsed_ms =
            timing_ms.unwrap_or_else(|| shared.started.elapsed().as_millis() as u64);
        let failure = shared.stats.record(status, elapsed_ms);
        shared.window.record(SystemTime::now(), failure);
        tracing::trace!(user, status, elapsed_ms, failure, "request completed");

        if !shared.is_aborted()
            && let Some(reason) = failure_rate_abort(
                shared.stats.total(),
                shared.stats.failed(),
                shared.cfg.failure_threshold,
            )
        {
            shared.abort(reason);
        }
        if shared.is_aborted() {
            return;
        }

        let wait = user_wait(shared.cfg.wait_range, shared.cfg.delay, &mut rng);
        if wait.is_zero() {
            // Instant performers would otherwise never hand the worker back.
            tokio::task::yield_now().await;
        } else if !wait_or_stop(&shared.cancel, &shared.stop, wait).await {
            return;
        }
    }
}
