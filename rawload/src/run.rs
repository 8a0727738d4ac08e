use anyhow::Context as _;
use serde_json::{Map, Value};
use std::path::Path;
use std::time::Duration;

use rawload_core::runner::NormalizedConfig;
use rawload_core::{HttpPerformer, LoadTestEngine};

use crate::cli::RunArgs;
use crate::exit_codes::ExitCode;
use crate::output;
use crate::run_error::RunError;

pub async fn run(args: RunArgs) -> Result<ExitCode, RunError> {
    let body = read_body(&args).await.map_err(RunError::InvalidInput)?;
    let config = config_document(&args).await.map_err(RunError::InvalidInput)?;
    let config_json = config.to_string();
    let headers_json = headers_json(&args.headers).to_string();

    let plan = NormalizedConfig::from_json(&config_json)
        .context("invalid load test config")
        .map_err(RunError::InvalidInput)?;

    let request_id = args
        .request_id
        .clone()
        .unwrap_or_else(|| format!("rawload-{}", std::process::id()));

    let out = output::formatter(args.output);
    let engine = LoadTestEngine::new(HttpPerformer::default(), out.events());
    out.print_header(&request_id, &args.method, &args.url, &plan);

    let handle = engine
        .start_load_test(
            &request_id,
            &args.method,
            &args.url,
            &headers_json,
            &body,
            &config_json,
        )
        .context("failed to start load test")
        .map_err(RunError::InvalidInput)?;

    let interrupt = {
        let engine = engine.clone();
        let request_id = request_id.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!(request_id = %request_id, "interrupted, cancelling");
                engine.cancel_request(&request_id);
            }
        })
    };

    let results = handle.wait().await;
    interrupt.abort();

    let results = results
        .context("load test faulted before producing results")
        .map_err(RunError::RuntimeError)?;

    out.print_summary(&results).map_err(RunError::RuntimeError)?;

    Ok(ExitCode::from_results(&results))
}

async fn read_body(args: &RunArgs) -> anyhow::Result<String> {
    match (&args.body, &args.body_file) {
        (Some(body), _) => Ok(body.clone()),
        (None, Some(path)) => read_file(path, "body").await,
        (None, None) => Ok(String::new()),
    }
}

async fn read_file(path: &Path, what: &str) -> anyhow::Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read {what} file: {}", path.display()))
}

/// The config document the engine sees: `--config`/`--config-file` with the
/// individual flags layered on top.
async fn config_document(args: &RunArgs) -> anyhow::Result<Value> {
    let raw = match (&args.config, &args.config_file) {
        (Some(raw), _) => raw.clone(),
        (None, Some(path)) => read_file(path, "config").await?,
        (None, None) => String::new(),
    };

    let mut doc = if raw.trim().is_empty() {
        Map::new()
    } else {
        match serde_json::from_str::<Value>(&raw).context("config is not valid JSON")? {
            Value::Object(map) => map,
            other => anyhow::bail!("config must be a JSON object (got {other})"),
        }
    };

    apply_overrides(&mut doc, args);
    Ok(Value::Object(doc))
}

fn duration_value(d: Duration) -> Value {
    Value::String(format!("{}ms", d.as_millis()))
}

fn apply_overrides(doc: &mut Map<String, Value>, args: &RunArgs) {
    let mut set = |key: &str, value: Option<Value>| {
        if let Some(value) = value {
            doc.insert(key.to_string(), value);
        }
    };

    set("iterations", args.iterations.map(Value::from));
    set("duration", args.duration.map(duration_value));
    // `--users` fills whichever bound is not given explicitly.
    set("startUsers", args.start_users.or(args.users).map(Value::from));
    set("maxUsers", args.max_users.or(args.users).map(Value::from));
    set("spawnRate", args.spawn_rate.map(Value::from));
    set("rampUp", args.ramp_up.map(duration_value));
    set("requestsPerSecond", args.rps.map(Value::from));
    set("failureRateThreshold", args.failure_threshold.map(Value::from));
    set("timeout", args.timeout.map(duration_value));
    if args.adaptive {
        set("adaptive", Some(Value::Bool(true)));
    }
}

fn headers_json(headers: &[(String, String)]) -> Value {
    Value::Object(
        headers
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect(),
    )
}
