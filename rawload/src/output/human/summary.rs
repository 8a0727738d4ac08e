use std::fmt::Write as _;

use rawload_core::{Phase, Results};

use super::format::{format_duration, format_ms, format_pct, format_rate};

pub(crate) fn render(results: &Results) -> String {
    let mut out = String::new();

    out.push_str("summary\n");
    writeln!(
        &mut out,
        "  requests: {} (ok {}, failed {})",
        results.total_requests, results.successful_requests, results.failed_requests
    )
    .ok();

    if !results.failure_status_counts.is_empty() {
        out.push_str("  failures by status:\n");
        let mut counts: Vec<_> = results.failure_status_counts.iter().collect();
        counts.sort_by(|(a_status, a_count), (b_status, b_count)| {
            b_count.cmp(a_count).then_with(|| a_status.cmp(b_status))
        });
        for (status, count) in counts {
            let label = if status == "0" { "error" } else { status.as_str() };
            writeln!(&mut out, "    {label}: {count}").ok();
        }
    }

    match results.latency_summary() {
        Some(l) => {
            writeln!(
                &mut out,
                "  latency = p50={} p90={} p95={} p99={} mean={}ms max={} (n={})",
                format_ms(l.p50_ms),
                format_ms(l.p90_ms),
                format_ms(l.p95_ms),
                format_ms(l.p99_ms),
                format_rate(l.mean_ms),
                format_ms(l.max_ms),
                results.response_times_ms.len()
            )
            .ok();
        }
        None => out.push_str("  latency: n/a\n"),
    }

    writeln!(
        &mut out,
        "  elapsed: {} rps={}",
        format_duration(results.elapsed()),
        format_rate(results.requests_per_second())
    )
    .ok();

    render_adaptive(results, &mut out);

    if results.aborted {
        writeln!(
            &mut out,
            "aborted: {}",
            results.abort_reason.as_deref().unwrap_or("unknown reason")
        )
        .ok();
    } else if results.cancelled {
        out.push_str("cancelled\n");
    }

    out
}

fn render_adaptive(results: &Results, out: &mut String) {
    let a = &results.adaptive;
    if !a.enabled {
        return;
    }

    let opt = |v: Option<u64>| v.map_or_else(|| "-".to_string(), |v| v.to_string());
    let pct = |v: Option<f64>| v.map_or_else(|| "-".to_string(), format_pct);

    out.push_str("adaptive\n");
    writeln!(out, "  phase: {}", a.phase).ok();
    writeln!(
        out,
        "  users: peak={} stable={} backoff_steps={}",
        opt(a.peak_users),
        opt(a.stable_users),
        opt(a.backoff_steps)
    )
    .ok();
    if let Some(ms) = a.time_to_first_failure_ms {
        writeln!(out, "  first_instability_after: {}", format_ms(ms)).ok();
    }
    writeln!(
        out,
        "  window_failure_rate: peak={} stable={}",
        pct(a.peak_window_failure_rate),
        pct(a.stable_window_failure_rate)
    )
    .ok();
    if a.phase == Phase::Stable {
        writeln!(
            out,
            "  stable_window_rps: {}",
            a.stable_window_rps.map_or_else(|| "-".to_string(), format_rate)
        )
        .ok();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rawload_core::AdaptiveSummary;
    use std::collections::BTreeMap;

    fn results() -> Results {
        Results {
            total_requests: 4,
            successful_requests: 1,
            failed_requests: 3,
            failure_status_counts: BTreeMap::from([
                ("0".to_string(), 1),
                ("503".to_string(), 2),
            ]),
            response_times_ms: vec![10, 20, 30, 40],
            start_time_ms: 1_000,
            end_time_ms: 3_000,
            cancelled: false,
            aborted: true,
            abort_reason: Some("Failure rate 75.0% exceeded threshold 5.0%".to_string()),
            planned_duration_ms: None,
            adaptive: AdaptiveSummary::new(false),
        }
    }

    #[test]
    fn summary_lists_failures_most_frequent_first() {
        let out = render(&results());
        assert!(out.contains("  requests: 4 (ok 1, failed 3)\n"), "{out}");
        let s503 = out.find("    503: 2").unwrap_or(usize::MAX);
        let err = out.find("    error: 1").unwrap_or(usize::MAX);
        assert!(s503 < err, "{out}");
        assert!(out.contains("  elapsed: 2s rps=2.0\n"), "{out}");
        assert!(out.contains("aborted: Failure rate 75.0% exceeded threshold 5.0%"), "{out}");
        assert!(!out.contains("adaptive"), "{out}");
    }

    #[test]
    fn adaptive_section_when_enabled() {
        let mut r = results();
        r.aborted = false;
        r.abort_reason = None;
        r.cancelled = true;
        r.adaptive = AdaptiveSummary {
            phase: Phase::Exhausted,
            peak_users: Some(12),
            backoff_steps: Some(5),
            time_to_first_failure_ms: Some(4_000),
            peak_window_failure_rate: Some(0.2),
            ..AdaptiveSummary::new(true)
        };

        let out = render(&r);
        assert!(out.contains("adaptive\n  phase: exhausted\n"), "{out}");
        assert!(out.contains("  users: peak=12 stable=- backoff_steps=5\n"), "{out}");
        assert!(out.contains("  first_instability_after: 4s\n"), "{out}");
        assert!(out.contains("  window_failure_rate: peak=20.0% stable=-\n"), "{out}");
        assert!(out.ends_with("cancelled\n"), "{out}");
    }

    #[test]
    fn empty_run_has_no_latency() {
        let mut r = results();
        r.response_times_ms.clear();
        assert!(render(&r).contains("  latency: n/a\n"));
    }
}
