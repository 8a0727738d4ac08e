use serde::{Deserialize, Serialize};

use super::stats::Results;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RunKind {
    Load,
}

/// Periodic snapshot of a running load test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressUpdate {
    pub request_id: String,
    #[serde(rename = "type")]
    pub kind: RunKind,
    /// Unix epoch milliseconds.
    pub started_at: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub planned_duration_ms: Option<u64>,
    pub active_users: u64,
    pub max_users: u64,
    pub total_sent: u64,
    pub successful: u64,
    pub failed: u64,
    pub done: bool,
    pub cancelled: bool,
    pub aborted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abort_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all_fields = "camelCase")]
pub enum RunEvent {
    #[serde(rename = "loadtest:progress")]
    Progress(ProgressUpdate),
    #[serde(rename = "loadtest:done")]
    Done { request_id: String, results: Results },
    #[serde(rename = "loadtest:error")]
    Error { request_id: String, message: String },
}

impl RunEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Progress(_) => "loadtest:progress",
            Self::Done { .. } => "loadtest:done",
            Self::Error { .. } => "loadtest:error",
        }
    }

    pub fn request_id(&self) -> &str {
        match self {
            Self::Progress(p) => &p.request_id,
            Self::Done { request_id, .. } | Self::Error { request_id, .. } => request_id,
        }
    }
}

pub type EventFn = std::sync::Arc<dyn Fn(RunEvent) + Send + Sync + 'static>;
