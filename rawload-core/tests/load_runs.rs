use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::Context as _;
use rawload_core::runner::{CANCELLED_RESPONSE, Error, PerformRequest, RequestSpec};
use rawload_core::{EventFn, LoadTestEngine, Phase, RunEvent};
use tokio_util::sync::CancellationToken;

fn record(status: u16, total_ms: u64) -> String {
    format!("Status: {status} X\nHeaders: {{\"timing\":{{\"total\":{total_ms}}}}}\nBody: ")
}

fn collector() -> (EventFn, Arc<Mutex<Vec<RunEvent>>>) {
    let seen: Arc<Mutex<Vec<RunEvent>>> = Arc::default();
    let sink = seen.clone();
    let events: EventFn = Arc::new(move |event| {
        sink.lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(event);
    });
    (events, seen)
}

fn snapshot(seen: &Mutex<Vec<RunEvent>>) -> Vec<RunEvent> {
    seen.lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .clone()
}

/// Always answers `200` with a fixed timing after a short pause.
fn ok_performer(pause: Duration) -> impl PerformRequest {
    move |_cancel: CancellationToken, _req: Arc<RequestSpec>| async move {
        tokio::time::sleep(pause).await;
        record(200, 7)
    }
}

#[tokio::test]
async fn fixed_iterations_single_user() -> anyhow::Result<()> {
    let (events, seen) = collector();
    let engine = LoadTestEngine::new(ok_performer(Duration::ZERO), events);

    let results = engine
        .start_load_test("lt-1", "GET", "http://localhost/", "{}", "", r#"{"iterations":5}"#)?
        .wait()
        .await
        .context("run completed")?;

    anyhow::ensure!(results.total_requests == 5, "total {}", results.total_requests);
    anyhow::ensure!(results.successful_requests == 5);
    anyhow::ensure!(results.failed_requests == 0);
    anyhow::ensure!(results.failure_status_counts.is_empty());
    anyhow::ensure!(results.response_times_ms == vec![7; 5]);
    anyhow::ensure!(!results.cancelled && !results.aborted);
    anyhow::ensure!(results.abort_reason.is_none());
    anyhow::ensure!(results.planned_duration_ms.is_none());
    anyhow::ensure!(!results.adaptive.enabled);
    anyhow::ensure!(results.end_time_ms >= results.start_time_ms);

    let seen = snapshot(&seen);
    let Some(RunEvent::Done { request_id, results: done }) = seen.last() else {
        anyhow::bail!("last event is not done: {seen:?}");
    };
    anyhow::ensure!(request_id == "lt-1");
    anyhow::ensure!(*done == results);

    // The final progress snapshot precedes the done event.
    let Some(RunEvent::Progress(last)) = seen.iter().rev().nth(1) else {
        anyhow::bail!("missing final progress: {seen:?}");
    };
    anyhow::ensure!(last.done);
    anyhow::ensure!(last.total_sent == 5);
    anyhow::ensure!(seen.iter().all(|e| e.request_id() == "lt-1"));
    Ok(())
}

#[tokio::test]
async fn iteration_cap_is_shared_by_all_users() -> anyhow::Result<()> {
    let (events, _seen) = collector();
    let engine = LoadTestEngine::new(ok_performer(Duration::from_millis(2)), events);

    let results = engine
        .start_load_test(
            "lt-cap",
            "GET",
            "http://localhost/",
            "",
            "",
            r#"{"iterations":"40","users":8}"#,
        )?
        .wait()
        .await
        .context("run completed")?;

    anyhow::ensure!(results.total_requests == 40, "total {}", results.total_requests);
    anyhow::ensure!(results.response_times_ms.len() == 40);
    Ok(())
}

#[tokio::test]
async fn failure_threshold_aborts_run() -> anyhow::Result<()> {
    let (events, seen) = collector();
    let hits = Arc::new(AtomicU64::new(0));
    let performer = {
        let hits = hits.clone();
        move |_cancel: CancellationToken, _req: Arc<RequestSpec>| {
            let n = hits.fetch_add(1, Ordering::Relaxed) + 1;
            async move { if n % 2 == 0 { record(503, 3) } else { record(200, 3) } }
        }
    };
    let engine = LoadTestEngine::new(performer, events);

    let results = engine
        .start_load_test(
            "lt-abort",
            "GET",
            "http://localhost/",
            "{}",
            "",
            r#"{"iterations":1000,"failureRateThreshold":"5%"}"#,
        )?
        .wait()
        .await
        .context("run completed")?;

    anyhow::ensure!(results.aborted);
    anyhow::ensure!(!results.cancelled);
    // Nothing is judged before enough samples exist.
    anyhow::ensure!(results.total_requests >= 20, "total {}", results.total_requests);
    anyhow::ensure!(results.total_requests < 1000);
    let reason = results.abort_reason.clone().context("abort reason")?;
    anyhow::ensure!(reason.contains("exceeded threshold 5.0%"), "reason: {reason}");
    anyhow::ensure!(results.failure_status_counts.get("503").is_some_and(|n| *n > 0));

    let seen = snapshot(&seen);
    let done_progress = seen.iter().rev().find_map(|e| match e {
        RunEvent::Progress(p) if p.done => Some(p.clone()),
        _ => None,
    });
    let done_progress = done_progress.context("final progress")?;
    anyhow::ensure!(done_progress.aborted);
    anyhow::ensure!(done_progress.abort_reason.as_deref() == Some(reason.as_str()));
    Ok(())
}

#[tokio::test]
async fn one_failure_in_twenty_hits_five_percent_threshold() -> anyhow::Result<()> {
    let (events, _seen) = collector();
    let hits = Arc::new(AtomicU64::new(0));
    let performer = {
        let hits = hits.clone();
        move |_cancel: CancellationToken, _req: Arc<RequestSpec>| {
            let n = hits.fetch_add(1, Ordering::Relaxed) + 1;
            async move { if n % 20 == 0 { record(500, 4) } else { record(200, 4) } }
        }
    };
    let engine = LoadTestEngine::new(performer, events);

    let results = engine
        .start_load_test(
            "lt-boundary",
            "GET",
            "http://localhost/",
            "{}",
            "",
            r#"{"iterations":100,"failureRateThreshold":0.05}"#,
        )?
        .wait()
        .await
        .context("run completed")?;

    anyhow::ensure!(results.aborted);
    anyhow::ensure!(results.total_requests == 20, "total {}", results.total_requests);
    anyhow::ensure!(results.failed_requests == 1);
    anyhow::ensure!(
        results.abort_reason.as_deref() == Some("Failure rate 5.0% exceeded threshold 5.0%"),
        "reason: {:?}",
        results.abort_reason
    );
    Ok(())
}

#[tokio::test]
async fn spawn_rate_ramps_users_up_to_max() -> anyhow::Result<()> {
    let (events, seen) = collector();
    let engine = LoadTestEngine::new(ok_performer(Duration::from_millis(5)), events);

    let results = engine
        .start_load_test(
            "lt-ramp",
            "GET",
            "http://localhost/",
            "{}",
            "",
            r#"{"duration":"1500ms","startUsers":1,"maxUsers":4,"spawnRate":4}"#,
        )?
        .wait()
        .await
        .context("run completed")?;
    anyhow::ensure!(!results.cancelled && !results.aborted);

    let active: Vec<u64> = snapshot(&seen)
        .iter()
        .filter_map(|e| match e {
            RunEvent::Progress(p) if !p.done => Some(p.active_users),
            _ => None,
        })
        .collect();
    // Users above the allowed count stay parked until the ramp reaches them.
    anyhow::ensure!(active.first().is_some_and(|n| *n < 4), "active {active:?}");
    anyhow::ensure!(active.iter().all(|n| *n <= 4), "active {active:?}");
    let full = active
        .iter()
        .position(|n| *n == 4)
        .with_context(|| format!("never reached 4 users: {active:?}"))?;
    anyhow::ensure!(active[..=full].windows(2).all(|w| w[0] <= w[1]), "active {active:?}");
    Ok(())
}

#[tokio::test]
async fn adaptive_stabilization_ends_iteration_run() -> anyhow::Result<()> {
    let (events, _seen) = collector();
    let engine = LoadTestEngine::new(ok_performer(Duration::from_millis(2)), events);

    let started = Instant::now();
    let results = engine
        .start_load_test(
            "lt-stable",
            "GET",
            "http://localhost/",
            "{}",
            "",
            r#"{"iterations":1000000,"users":2,"adaptive":{"stable":1,"window":3}}"#,
        )?
        .wait()
        .await
        .context("run completed")?;

    anyhow::ensure!(started.elapsed() < Duration::from_secs(10));
    anyhow::ensure!(!results.cancelled && !results.aborted);
    anyhow::ensure!(results.total_requests < 1_000_000);

    let adaptive = &results.adaptive;
    anyhow::ensure!(adaptive.phase == Phase::Stable, "phase {}", adaptive.phase);
    anyhow::ensure!(adaptive.stabilized == Some(true));
    anyhow::ensure!(adaptive.stable_users == Some(2));
    Ok(())
}

#[tokio::test]
async fn cancel_request_stops_duration_run() -> anyhow::Result<()> {
    let (events, seen) = collector();
    let engine = LoadTestEngine::new(ok_performer(Duration::from_millis(5)), events);

    let started = Instant::now();
    let handle = engine.start_load_test(
        "lt-cancel",
        "GET",
        "http://localhost/",
        "{}",
        "",
        r#"{"duration":"30s","users":4}"#,
    )?;
    tokio::time::sleep(Duration::from_millis(300)).await;
    anyhow::ensure!(engine.cancel_request(" lt-cancel "));

    let results = handle.wait().await.context("run completed")?;
    anyhow::ensure!(started.elapsed() < Duration::from_secs(5));
    anyhow::ensure!(results.cancelled);
    anyhow::ensure!(!results.aborted);
    anyhow::ensure!(results.total_requests > 0);
    anyhow::ensure!(results.planned_duration_ms == Some(30_000));
    anyhow::ensure!(!engine.is_running("lt-cancel"));

    // At least one periodic progress event went out before the cancel.
    let seen = snapshot(&seen);
    anyhow::ensure!(
        seen.iter()
            .any(|e| matches!(e, RunEvent::Progress(p) if !p.done && p.active_users > 0)),
        "no live progress: {seen:?}"
    );
    Ok(())
}

#[tokio::test]
async fn in_flight_request_sees_cancellation() -> anyhow::Result<()> {
    let (events, _seen) = collector();
    let performer = |cancel: CancellationToken, _req: Arc<RequestSpec>| async move {
        tokio::select! {
            () = cancel.cancelled() => CANCELLED_RESPONSE.to_string(),
            () = tokio::time::sleep(Duration::from_secs(60)) => record(200, 1),
        }
    };
    let engine = LoadTestEngine::new(performer, events);

    let handle = engine.start_load_test(
        "lt-hang",
        "GET",
        "http://localhost/",
        "{}",
        "",
        r#"{"iterations":3}"#,
    )?;
    tokio::time::sleep(Duration::from_millis(50)).await;
    engine.cancel_request("lt-hang");

    let results = tokio::time::timeout(Duration::from_secs(5), handle.wait())
        .await
        .context("run wound down")?
        .context("run completed")?;
    anyhow::ensure!(results.cancelled);
    // Abandoned requests are not counted.
    anyhow::ensure!(results.total_requests == 0);
    Ok(())
}

#[tokio::test]
async fn duration_run_ends_on_its_own() -> anyhow::Result<()> {
    let (events, _seen) = collector();
    let engine = LoadTestEngine::new(ok_performer(Duration::from_millis(5)), events);

    let started = Instant::now();
    let results = engine
        .start_load_test(
            "lt-duration",
            "GET",
            "http://localhost/",
            "{}",
            "",
            r#"{"duration":"600ms","users":2,"delay":"10ms"}"#,
        )?
        .wait()
        .await
        .context("run completed")?;

    let took = started.elapsed();
    anyhow::ensure!(took >= Duration::from_millis(600), "took {took:?}");
    anyhow::ensure!(took < Duration::from_secs(3), "took {took:?}");
    anyhow::ensure!(!results.cancelled && !results.aborted);
    anyhow::ensure!(results.total_requests > 0);
    anyhow::ensure!(results.planned_duration_ms == Some(600));
    Ok(())
}

#[tokio::test]
async fn requests_per_second_caps_throughput() -> anyhow::Result<()> {
    let (events, _seen) = collector();
    let engine = LoadTestEngine::new(ok_performer(Duration::ZERO), events);

    let started = Instant::now();
    let results = engine
        .start_load_test(
            "lt-rps",
            "GET",
            "http://localhost/",
            "{}",
            "",
            r#"{"iterations":11,"users":4,"requestsPerSecond":20}"#,
        )?
        .wait()
        .await
        .context("run completed")?;

    // 11 slots at 50ms spacing: the last one is released at +500ms.
    let took = started.elapsed();
    anyhow::ensure!(results.total_requests == 11);
    anyhow::ensure!(took >= Duration::from_millis(450), "took {took:?}");
    Ok(())
}

#[tokio::test]
async fn adaptive_backoff_exhausts_under_constant_failure() -> anyhow::Result<()> {
    let (events, _seen) = collector();
    let performer = |_cancel: CancellationToken, _req: Arc<RequestSpec>| async {
        tokio::time::sleep(Duration::from_millis(2)).await;
        record(500, 2)
    };
    let engine = LoadTestEngine::new(performer, events);

    let started = Instant::now();
    let results = engine
        .start_load_test(
            "lt-adaptive",
            "GET",
            "http://localhost/",
            "{}",
            "",
            r#"{"duration":"30s","users":3,"adaptive":{"failureRate":"10%","cooldown":1}}"#,
        )?
        .wait()
        .await
        .context("run completed")?;

    anyhow::ensure!(started.elapsed() < Duration::from_secs(10));
    anyhow::ensure!(results.aborted);
    anyhow::ensure!(!results.cancelled);
    anyhow::ensure!(results.abort_reason.as_deref() == Some("Adaptive backoff exhausted"));

    let adaptive = &results.adaptive;
    anyhow::ensure!(adaptive.enabled);
    anyhow::ensure!(adaptive.phase == Phase::Exhausted, "phase {}", adaptive.phase);
    anyhow::ensure!(adaptive.peak_users == Some(3));
    anyhow::ensure!(adaptive.backoff_steps == Some(1));
    anyhow::ensure!(adaptive.time_to_first_failure_ms.is_some());
    anyhow::ensure!(adaptive.peak_window_failure_rate == Some(1.0));
    Ok(())
}

#[tokio::test]
async fn invalid_input_is_rejected_before_start() -> anyhow::Result<()> {
    let (events, seen) = collector();
    let engine = LoadTestEngine::new(ok_performer(Duration::ZERO), events);

    anyhow::ensure!(matches!(
        engine.start_load_test("", "GET", "http://x/", "{}", "", "{}"),
        Err(Error::MissingRequestId)
    ));
    anyhow::ensure!(matches!(
        engine.start_load_test("a", "", "http://x/", "{}", "", "{}"),
        Err(Error::MissingMethodOrUrl)
    ));
    anyhow::ensure!(matches!(
        engine.start_load_test("a", "GET", "http://x/", "{}", "", "not json"),
        Err(Error::InvalidConfig(_))
    ));
    anyhow::ensure!(snapshot(&seen).is_empty());
    Ok(())
}

#[tokio::test]
async fn done_event_serializes_with_wire_names() -> anyhow::Result<()> {
    let (events, seen) = collector();
    let engine = LoadTestEngine::new(ok_performer(Duration::ZERO), events);
    engine
        .start_load_test("lt-wire", "GET", "http://localhost/", "{}", "", r#"{"iterations":2}"#)?
        .wait()
        .await
        .context("run completed")?;

    let seen = snapshot(&seen);
    let done = seen.last().context("done event")?;
    let json = serde_json::to_value(done)?;
    anyhow::ensure!(json["event"] == "loadtest:done", "{json}");
    anyhow::ensure!(json["requestId"] == "lt-wire", "{json}");
    anyhow::ensure!(json["results"]["totalRequests"] == 2, "{json}");
    anyhow::ensure!(json["results"]["responseTimes"].as_array().map(Vec::len) == Some(2));
    anyhow::ensure!(json["results"]["adaptive"]["enabled"] == false, "{json}");
    anyhow::ensure!(json["results"].get("abortReason").is_none(), "{json}");
    Ok(())
}
