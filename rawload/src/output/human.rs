use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

mod format;
mod progress;
mod summary;

use format::{format_duration, format_users};
use progress::HumanProgress;
use summary::render;

use rawload_core::runner::NormalizedConfig;
use rawload_core::{EventFn, ProgressUpdate, Results, RunEvent};

use super::OutputFormatter;

pub(crate) struct HumanReadableOutput {
    progress: Arc<HumanProgress>,
}

impl HumanReadableOutput {
    pub(crate) fn new() -> Self {
        Self {
            progress: Arc::new(HumanProgress::new()),
        }
    }
}

fn elapsed_since(started_at_ms: u64) -> Duration {
    let now_ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis() as u64);
    Duration::from_millis(now_ms.saturating_sub(started_at_ms))
}

fn progress_message(u: &ProgressUpdate, elapsed: Duration) -> String {
    let mut msg = format!(
        "users={}/{} sent={} ok={} failed={} elapsed={}",
        u.active_users,
        u.max_users,
        u.total_sent,
        u.successful,
        u.failed,
        format_duration(elapsed)
    );
    if u.aborted {
        msg.push_str(" aborting");
    } else if u.cancelled {
        msg.push_str(" cancelling");
    }
    msg
}

impl OutputFormatter for HumanReadableOutput {
    fn print_header(&self, request_id: &str, method: &str, url: &str, plan: &NormalizedConfig) {
        println!("target: {} {url}", method.trim().to_ascii_uppercase());
        println!("request_id: {request_id}");

        let mut line = format!(
            "plan: users={}",
            format_users(plan.start_users, plan.max_users)
        );
        if let Some(n) = plan.iterations {
            line.push_str(&format!(" iterations={n}"));
        }
        if let Some(d) = plan.duration {
            line.push_str(&format!(" duration={}", format_duration(d)));
        }
        if let Some(rps) = plan.requests_per_second {
            line.push_str(&format!(" rps={rps}"));
        }
        if let Some(t) = plan.failure_threshold {
            line.push_str(&format!(" abort_at={:.1}%", t * 100.0));
        }
        if plan.adaptive.enabled {
            line.push_str(&format!(
                " adaptive(failure_rate={:.1}% window={}s)",
                plan.adaptive.failure_rate * 100.0,
                plan.adaptive.window_secs
            ));
        }
        println!("{line}");
        println!();
    }

    fn events(&self) -> EventFn {
        let progress = self.progress.clone();
        Arc::new(move |event: RunEvent| {
            if let RunEvent::Progress(u) = event {
                if u.done {
                    return;
                }
                let elapsed = elapsed_since(u.started_at);
                let planned = u.planned_duration_ms.map(Duration::from_millis);
                progress.update(planned, elapsed, progress_message(&u, elapsed));
            }
        })
    }

    fn print_summary(&self, results: &Results) -> anyhow::Result<()> {
        self.progress.finish();
        print!("{}", render(results));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rawload_core::RunKind;

    #[test]
    fn progress_message_shows_counts_and_state() {
        let mut u = ProgressUpdate {
            request_id: "r".to_string(),
            kind: RunKind::Load,
            started_at: 0,
            planned_duration_ms: None,
            active_users: 3,
            max_users: 8,
            total_sent: 120,
            successful: 118,
            failed: 2,
            done: false,
            cancelled: false,
            aborted: false,
            abort_reason: None,
        };
        assert_eq!(
            progress_message(&u, Duration::from_millis(1500)),
            "users=3/8 sent=120 ok=118 failed=2 elapsed=2s"
        );

        u.aborted = true;
        assert!(progress_message(&u, Duration::ZERO).ends_with(" aborting"));
    }
}
