mod abort;
mod adaptive;
mod config;
mod duration;
mod engine;
mod error;
mod gate;
mod limiter;
mod progress;
mod request;
mod response;
mod run;
mod spawn;
mod stats;
mod vu;
mod wait;
mod window;

pub use abort::{MIN_ABORT_SAMPLES, failure_rate_abort};
pub use adaptive::{AdaptiveController, AdaptiveSummary, Phase, StepInput, StepOutcome};
pub use config::{
    AdaptiveBlock, AdaptiveConfig, AdaptiveInput, Config, LooseValue, NormalizedConfig,
    WaitRange,
};
pub use duration::parse_duration_ms;
pub use engine::{LoadTestEngine, RunHandle};
pub use error::{Error, Result};
pub use gate::IterationGate;
pub use limiter::RateLimiter;
pub use progress::{EventFn, ProgressUpdate, RunEvent, RunKind};
pub use request::{PerformFuture, PerformRequest, RequestSpec};
pub use response::{CANCELLED_RESPONSE, parse_status_and_timing};
pub use run::run_load_test;
pub use spawn::{derive_spawn_rate, spawn_interval};
pub use stats::{LatencySummary, Results, RunStats};
pub use wait::{user_wait, wait_or_stop};
pub use window::{SlidingWindow, WindowStats};
