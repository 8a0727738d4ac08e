/// Cumulative sample count below which the failure-rate breaker stays quiet.
pub const MIN_ABORT_SAMPLES: u64 = 20;

/// Decides whether the cumulative failure ratio has crossed `threshold`.
///
/// Returns the abort reason, or `None` to keep running.
pub fn failure_rate_abort(total: u64, failed: u64, threshold: Option<f64>) -> Option<String> {
    let threshold = threshold?;
    if total < MIN_ABORT_SAMPLES {
        return None;
    }

    let rate = failed as f64 / total as f64;
    (rate >= threshold).then(|| {
        format!(
            "Failure rate {:.1}% exceeded threshold {:.1}%",
            rate * 100.0,
            threshold * 100.0
        )
    })
}
