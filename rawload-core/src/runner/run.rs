use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tokio_util::task::AbortOnDropHandle;

use super::adaptive::{AdaptiveController, AdaptiveSummary, StepInput};
use super::config::NormalizedConfig;
use super::progress::{EventFn, ProgressUpdate, RunEvent, RunKind};
use super::request::{PerformRequest, RequestSpec};
use super::spawn::{derive_spawn_rate, spawn_interval};
use super::stats::Results;
use super::vu::{RunShared, run_user};
use super::wait::wait_or_stop;

const PROGRESS_INTERVAL: Duration = Duration::from_millis(200);
const CONTROL_INTERVAL: Duration = Duration::from_millis(500);

fn epoch_ms(at: SystemTime) -> u64 {
    at.duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis() as u64)
}

/// Unwraps a finished helper task, re-raising its panic on this task.
fn join_or_resume<T>(joined: Result<T, tokio::task::JoinError>) -> Option<T> {
    match joined {
        Ok(value) => Some(value),
        Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
        Err(_) => None,
    }
}

/// Drives one load test to completion and reports it through `events`.
///
/// Emits a progress event every 200ms, a final `done` progress, then
/// [`RunEvent::Done`]. The returned [`Results`] are the same snapshot the done
/// event carries. Firing `cancel` ends the run early with `cancelled = true`
/// (unless it was already aborted).
///
/// Panics inside a virtual user propagate to the caller.
pub async fn run_load_test(
    request_id: String,
    request: RequestSpec,
    cfg: NormalizedConfig,
    performer: Arc<dyn PerformRequest>,
    events: EventFn,
    cancel: CancellationToken,
) -> Results {
    let started = Instant::now();
    let start_time_ms = epoch_ms(SystemTime::now());
    let planned_duration_ms = cfg.duration.map(|d| d.as_millis() as u64);

    tracing::info!(
        request_id = %request_id,
        method = %request.method,
        url = %request.url,
        start_users = cfg.start_users,
        max_users = cfg.max_users,
        iterations = ?cfg.iterations,
        duration = ?cfg.duration,
        rps = ?cfg.requests_per_second,
        adaptive = cfg.adaptive.enabled,
        "load test started"
    );

    let shared = Arc::new(RunShared::new(
        Arc::new(request),
        performer,
        cfg,
        started,
        cancel,
    ));

    let mut users = JoinSet::new();
    for user in 1..=shared.cfg.max_users {
        users.spawn(run_user(shared.clone(), user));
    }
    let ramp = AbortOnDropHandle::new(tokio::spawn(spawn_ramp(shared.clone())));
    let controller = AbortOnDropHandle::new(tokio::spawn(control_loop(shared.clone())));

    let progress = |done: bool| {
        RunEvent::Progress(ProgressUpdate {
            request_id: request_id.clone(),
            kind: RunKind::Load,
            started_at: start_time_ms,
            planned_duration_ms,
            active_users: shared.active_users(),
            max_users: shared.cfg.max_users,
            total_sent: shared.stats.total(),
            successful: shared.stats.successful(),
            failed: shared.stats.failed(),
            done,
            cancelled: shared.cancel.is_cancelled(),
            aborted: shared.is_aborted(),
            abort_reason: shared.abort_reason(),
        })
    };

    let mut ticker =
        tokio::time::interval_at(tokio::time::Instant::now() + PROGRESS_INTERVAL, PROGRESS_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            joined = users.join_next() => match joined {
                Some(joined) => {
                    join_or_resume(joined);
                }
                None => break,
            },
            _ = ticker.tick() => (events)(progress(false)),
        }
    }

    // Every user is gone; release the ramp and the controller.
    shared.stop.cancel();
    join_or_resume(ramp.await);
    let adaptive = join_or_resume(controller.await)
        .unwrap_or_else(|| AdaptiveSummary::new(shared.cfg.adaptive.enabled));

    (events)(progress(true));

    let aborted = shared.is_aborted();
    let results = Results {
        total_requests: shared.stats.total(),
        successful_requests: shared.stats.successful(),
        failed_requests: shared.stats.failed(),
        failure_status_counts: shared.stats.failure_statuses(),
        response_times_ms: shared.stats.response_times_ms(),
        start_time_ms,
        end_time_ms: epoch_ms(SystemTime::now()),
        cancelled: shared.cancel.is_cancelled() && !aborted,
        aborted,
        abort_reason: shared.abort_reason(),
        planned_duration_ms,
        adaptive,
    };

    tracing::info!(
        request_id = %request_id,
        total = results.total_requests,
        failed = results.failed_requests,
        cancelled = results.cancelled,
        aborted = results.aborted,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "load test finished"
    );

    (events)(RunEvent::Done {
        request_id,
        results: results.clone(),
    });
    results
}

/// Raises the allowed-user count from `start_users` toward `max_users`.
async fn spawn_ramp(shared: Arc<RunShared>) {
    let cfg = &shared.cfg;
    let remaining = cfg.max_users.saturating_sub(cfg.start_users);
    if remaining == 0 {
        return;
    }

    let Some(rate) = derive_spawn_rate(cfg.spawn_rate, cfg.ramp_up, remaining) else {
        shared.allowed_users.store(cfg.max_users, Ordering::Relaxed);
        return;
    };
    let interval = spawn_interval(rate);
    tracing::debug!(rate, ?interval, remaining, "spawn ramp started");

    for _ in 0..remaining {
        if shared.should_exit() || !shared.allow_ramping.load(Ordering::Relaxed) {
            return;
        }
        let max_users = cfg.max_users;
        let _ = shared
            .allowed_users
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |cur| {
                (cur < max_users).then_some(cur + 1)
            });
        if !wait_or_stop(&shared.cancel, &shared.stop, interval).await {
            return;
        }
    }
}

/// Ticks the adaptive controller and applies its decisions. Returns the final
/// summary once the run winds down.
async fn control_loop(shared: Arc<RunShared>) -> AdaptiveSummary {
    let cfg = &shared.cfg;
    let mut summary = AdaptiveSummary::new(cfg.adaptive.enabled);
    if !cfg.adaptive.enabled {
        return summary;
    }

    let mut controller = AdaptiveController::new(
        &cfg.adaptive,
        cfg.max_users,
        shared.started,
        shared.gate.deadline(),
    );
    let mut tick =
        tokio::time::interval_at(tokio::time::Instant::now() + CONTROL_INTERVAL, CONTROL_INTERVAL);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shared.cancel.cancelled() => break,
            _ = shared.stop.cancelled() => break,
            _ = tick.tick() => {}
        }
        if shared.is_aborted() || shared.gate.expired() {
            break;
        }

        let outcome = controller.step(
            StepInput {
                now: Instant::now(),
                allowed_users: shared.allowed_users.load(Ordering::Relaxed),
                window: shared.window.stats(SystemTime::now()),
            },
            &mut summary,
        );
        if outcome.disable_ramping {
            shared.allow_ramping.store(false, Ordering::Relaxed);
        }
        if let Some(users) = outcome.set_allowed_users {
            shared.allowed_users.store(users, Ordering::Relaxed);
        }
        if let Some(reason) = outcome.abort {
            shared.abort(reason);
        }
        if outcome.stop {
            shared.stop.cancel();
            break;
        }
    }
    summary
}
