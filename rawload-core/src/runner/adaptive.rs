use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use super::config::AdaptiveConfig;
use super::window::WindowStats;

/// Window samples required before the controller reacts at all.
const MIN_WINDOW_SAMPLES: u64 = 20;

pub const EXHAUSTED_REASON: &str = "Adaptive backoff exhausted";

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Phase {
    Disabled,
    Ramping,
    BackingOff,
    Stable,
    Exhausted,
}

/// What the adaptive controller observed over a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdaptiveSummary {
    pub enabled: bool,
    pub phase: Phase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stabilized: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peak_users: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stable_users: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_to_first_failure_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backoff_steps: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peak_window_failure_rate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stable_window_failure_rate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peak_window_rps: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stable_window_rps: Option<f64>,
}

impl AdaptiveSummary {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            phase: if enabled {
                Phase::Ramping
            } else {
                Phase::Disabled
            },
            stabilized: None,
            peak_users: None,
            stable_users: None,
            time_to_first_failure_ms: None,
            backoff_steps: None,
            peak_window_failure_rate: None,
            stable_window_failure_rate: None,
            peak_window_rps: None,
            stable_window_rps: None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct StepInput {
    pub now: Instant,
    pub allowed_users: u64,
    pub window: Option<WindowStats>,
}

/// Actions requested by one controller step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepOutcome {
    pub disable_ramping: bool,
    pub set_allowed_users: Option<u64>,
    /// Wind the run down gracefully.
    pub stop: bool,
    pub abort: Option<String>,
}

/// Failure-driven concurrency control loop.
///
/// Ramps until the window failure rate first exceeds the threshold, then backs off
/// by `backoff_step_users` at most once per cooldown until the rate has stayed
/// healthy for `stable_secs`.
#[derive(Debug)]
pub struct AdaptiveController {
    started_at: Instant,
    stop_at: Option<Instant>,
    max_users: u64,
    failure_rate: f64,
    stable_for: Duration,
    cooldown: Duration,
    backoff_step_users: u64,

    saw_instability: bool,
    stable_since: Option<Instant>,
    last_adjust: Option<Instant>,
    backoff_steps: u64,
}

impl AdaptiveController {
    pub fn new(
        cfg: &AdaptiveConfig,
        max_users: u64,
        started_at: Instant,
        stop_at: Option<Instant>,
    ) -> Self {
        Self {
            started_at,
            stop_at,
            max_users,
            failure_rate: cfg.failure_rate,
            stable_for: Duration::from_secs(cfg.stable_secs),
            cooldown: cfg.cooldown,
            backoff_step_users: cfg.backoff_step_users.max(1),
            saw_instability: false,
            stable_since: None,
            last_adjust: None,
            backoff_steps: 0,
        }
    }

    pub fn step(&mut self, input: StepInput, summary: &mut AdaptiveSummary) -> StepOutcome {
        if self.stop_at.is_some_and(|stop_at| input.now > stop_at) {
            return StepOutcome::default();
        }
        let Some(window) = input.window.filter(|w| w.sent >= MIN_WINDOW_SAMPLES) else {
            return StepOutcome::default();
        };
        let unhealthy = window.failure_rate > self.failure_rate;

        if !self.saw_instability {
            if unhealthy {
                return self.first_instability(input, window, summary);
            }
            if input.allowed_users >= self.max_users {
                if self.held_stable(input.now) {
                    summary.stabilized = Some(true);
                    summary.phase = Phase::Stable;
                    summary.peak_users = Some(self.max_users);
                    summary.stable_users = Some(self.max_users);
                    summary.backoff_steps = Some(0);
                    summary.peak_window_failure_rate = Some(window.failure_rate);
                    summary.stable_window_failure_rate = Some(window.failure_rate);
                    summary.peak_window_rps = Some(window.rps);
                    summary.stable_window_rps = Some(window.rps);
                    return self.stabilized(self.max_users);
                }
            } else {
                // No partial credit while still ramping.
                self.stable_since = None;
            }
            return StepOutcome::default();
        }

        if unhealthy {
            return self.back_off(input, summary);
        }

        if self.held_stable(input.now) {
            summary.stabilized = Some(true);
            summary.phase = Phase::Stable;
            summary.stable_users = Some(input.allowed_users);
            summary.stable_window_failure_rate = Some(window.failure_rate);
            summary.stable_window_rps = Some(window.rps);
            return self.stabilized(input.allowed_users);
        }
        StepOutcome::default()
    }

    fn first_instability(
        &mut self,
        input: StepInput,
        window: WindowStats,
        summary: &mut AdaptiveSummary,
    ) -> StepOutcome {
        self.saw_instability = true;
        self.stable_since = None;
        self.last_adjust = Some(input.now);

        let ttff = input.now.saturating_duration_since(self.started_at);
        summary.phase = Phase::BackingOff;
        summary.peak_users = Some(input.allowed_users);
        summary.time_to_first_failure_ms = Some(ttff.as_millis() as u64);
        summary.peak_window_failure_rate = Some(window.failure_rate);
        summary.peak_window_rps = Some(window.rps);

        tracing::info!(
            peak_users = input.allowed_users,
            window_failure_rate = window.failure_rate,
            threshold = self.failure_rate,
            "adaptive: instability detected, ramping disabled"
        );

        StepOutcome {
            disable_ramping: true,
            ..StepOutcome::default()
        }
    }

    fn back_off(&mut self, input: StepInput, summary: &mut AdaptiveSummary) -> StepOutcome {
        self.stable_since = None;
        if self
            .last_adjust
            .is_some_and(|at| input.now.saturating_duration_since(at) < self.cooldown)
        {
            return StepOutcome::default();
        }

        let prev = input.allowed_users;
        let next = prev.saturating_sub(self.backoff_step_users).max(1);
        if next < prev {
            self.backoff_steps += 1;
        }
        summary.phase = Phase::BackingOff;
        summary.backoff_steps = Some(self.backoff_steps);
        self.last_adjust = Some(input.now);

        if next <= 1 {
            summary.phase = Phase::Exhausted;
            tracing::warn!(
                backoff_steps = self.backoff_steps,
                "adaptive: backoff exhausted"
            );
            return StepOutcome {
                set_allowed_users: Some(next),
                stop: true,
                abort: Some(EXHAUSTED_REASON.to_string()),
                ..StepOutcome::default()
            };
        }

        tracing::info!(from = prev, to = next, "adaptive: backing off");
        StepOutcome {
            set_allowed_users: Some(next),
            ..StepOutcome::default()
        }
    }

    /// Starts or continues the stability timer; true once it has run long enough.
    fn held_stable(&mut self, now: Instant) -> bool {
        let since = *self.stable_since.get_or_insert(now);
        now.saturating_duration_since(since) >= self.stable_for
    }

    fn stabilized(&self, users: u64) -> StepOutcome {
        // With a fixed duration the plateau is held until the deadline.
        let stop = self.stop_at.is_none();
        tracing::info!(users, stop, "adaptive: stabilized");
        StepOutcome {
            disable_ramping: true,
            stop,
            ..StepOutcome::default()
        }
    }
}
