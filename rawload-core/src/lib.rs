#[cfg(feature = "http")]
mod http;

pub mod runner;

#[cfg(feature = "http")]
pub use http::HttpPerformer;
pub use runner::{
    AdaptiveSummary, EventFn, LoadTestEngine, Phase, ProgressUpdate, Results, RunEvent, RunHandle,
    RunKind,
};
