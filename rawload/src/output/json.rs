use serde::Serialize;
use std::io::Write as _;
use std::sync::Arc;

use rawload_core::runner::NormalizedConfig;
use rawload_core::{EventFn, Results, RunEvent};

use super::OutputFormatter;

/// Streams every [`RunEvent`] to stdout as one JSON line; the done event
/// doubles as the summary.
pub(crate) struct JsonOutput;

impl OutputFormatter for JsonOutput {
    fn print_header(&self, _request_id: &str, _method: &str, _url: &str, _plan: &NormalizedConfig) {}

    fn events(&self) -> EventFn {
        Arc::new(|event: RunEvent| emit_json_line(&event))
    }

    fn print_summary(&self, _results: &Results) -> anyhow::Result<()> {
        Ok(())
    }
}

fn emit_json_line<T: Serialize>(line: &T) {
    let mut out = std::io::stdout().lock();
    if serde_json::to_writer(&mut out, line).is_ok() {
        let _ = writeln!(out);
        let _ = out.flush();
    }
}

#[cfg(test)]
mod tests {
    use rawload_core::{AdaptiveSummary, ProgressUpdate, RunKind};
    use serde_json::Value;
    use std::collections::BTreeMap;

    use super::*;

    #[test]
    fn progress_line_is_tagged() {
        let event = RunEvent::Progress(ProgressUpdate {
            request_id: "r".to_string(),
            kind: RunKind::Load,
            started_at: 1,
            planned_duration_ms: None,
            active_users: 2,
            max_users: 4,
            total_sent: 10,
            successful: 9,
            failed: 1,
            done: false,
            cancelled: false,
            aborted: false,
            abort_reason: None,
        });

        let v: Value = match serde_json::to_value(&event) {
            Ok(v) => v,
            Err(err) => panic!("to_value failed: {err}"),
        };
        assert_eq!(v.get("event").and_then(Value::as_str), Some("loadtest:progress"));
        assert_eq!(v.get("type").and_then(Value::as_str), Some("load"));
        assert_eq!(v.get("totalSent").and_then(Value::as_u64), Some(10));
        assert!(v.get("plannedDurationMs").is_none());
    }

    #[test]
    fn done_line_carries_results() {
        let event = RunEvent::Done {
            request_id: "r".to_string(),
            results: Results {
                total_requests: 3,
                successful_requests: 2,
                failed_requests: 1,
                failure_status_counts: BTreeMap::from([("500".to_string(), 1)]),
                response_times_ms: vec![1, 2, 3],
                start_time_ms: 10,
                end_time_ms: 20,
                cancelled: false,
                aborted: false,
                abort_reason: None,
                planned_duration_ms: None,
                adaptive: AdaptiveSummary::new(false),
            },
        };

        let v: Value = match serde_json::to_value(&event) {
            Ok(v) => v,
            Err(err) => panic!("to_value failed: {err}"),
        };
        assert_eq!(v.get("event").and_then(Value::as_str), Some("loadtest:done"));
        assert_eq!(v.pointer("/results/failedRequests").and_then(Value::as_u64), Some(1));
        assert_eq!(
            v.pointer("/results/failureStatusCounts/500").and_then(Value::as_u64),
            Some(1)
        );
        assert_eq!(v.pointer("/results/adaptive/phase").and_then(Value::as_str), Some("disabled"));
    }
}
