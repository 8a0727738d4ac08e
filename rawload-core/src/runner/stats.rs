use hdrhistogram::Histogram;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use super::adaptive::AdaptiveSummary;

/// Live request accounting shared by all virtual users of a run.
#[derive(Debug, Default)]
pub struct RunStats {
    total: AtomicU64,
    successful: AtomicU64,
    failed: AtomicU64,
    /// Failed requests keyed by status code; `"0"` for non-HTTP failures.
    failure_statuses: Mutex<BTreeMap<String, u64>>,
    /// In completion order.
    response_times_ms: Mutex<Vec<u64>>,
}

/// A non-HTTP outcome (status 0) or any 4xx/5xx counts as a failure.
pub fn is_failure(status: u16) -> bool {
    status == 0 || status >= 400
}

impl RunStats {
    /// Records one completed request. Returns whether it counted as a failure.
    pub fn record(&self, status: u16, elapsed_ms: u64) -> bool {
        self.total.fetch_add(1, Ordering::Relaxed);
        self.response_times_ms
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(elapsed_ms);

        let failure = is_failure(status);
        if failure {
            self.failed.fetch_add(1, Ordering::Relaxed);
            *self
                .failure_statuses
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .entry(status.to_string())
                .or_insert(0) += 1;
        } else {
            self.successful.fetch_add(1, Ordering::Relaxed);
        }
        failure
    }

    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    pub fn successful(&self) -> u64 {
        self.successful.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn failure_statuses(&self) -> BTreeMap<String, u64> {
        self.failure_statuses
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn response_times_ms(&self) -> Vec<u64> {
        self.response_times_ms
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

/// Final, immutable outcome of one load test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Results {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub failure_status_counts: BTreeMap<String, u64>,
    #[serde(rename = "responseTimes")]
    pub response_times_ms: Vec<u64>,
    /// Unix epoch milliseconds.
    #[serde(rename = "startTime")]
    pub start_time_ms: u64,
    #[serde(rename = "endTime")]
    pub end_time_ms: u64,
    pub cancelled: bool,
    pub aborted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abort_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub planned_duration_ms: Option<u64>,
    pub adaptive: AdaptiveSummary,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatencySummary {
    pub min_ms: u64,
    pub mean_ms: f64,
    pub p50_ms: u64,
    pub p90_ms: u64,
    pub p95_ms: u64,
    pub p99_ms: u64,
    pub max_ms: u64,
}

impl Results {
    pub fn elapsed(&self) -> Duration {
        Duration::from_millis(self.end_time_ms.saturating_sub(self.start_time_ms))
    }

    pub fn requests_per_second(&self) -> f64 {
        let secs = self.elapsed().as_secs_f64();
        if secs > 0.0 {
            self.total_requests as f64 / secs
        } else {
            0.0
        }
    }

    /// Percentiles over `response_times_ms`; `None` when nothing completed.
    pub fn latency_summary(&self) -> Option<LatencySummary> {
        if self.response_times_ms.is_empty() {
            return None;
        }
        let mut h = Histogram::<u64>::new(3).ok()?;
        for &ms in &self.response_times_ms {
            h.saturating_record(ms);
        }

        Some(LatencySummary {
            min_ms: h.min(),
            mean_ms: h.mean(),
            p50_ms: h.value_at_quantile(0.50),
            p90_ms: h.value_at_quantile(0.90),
            p95_ms: h.value_at_quantile(0.95),
            p99_ms: h.value_at_quantile(0.99),
            max_ms: h.max(),
        })
    }
}
