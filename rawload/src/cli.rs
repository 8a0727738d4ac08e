use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

fn parse_duration(input: &str) -> Result<Duration, String> {
    let s = input.trim();
    if s.is_empty() {
        return Err("duration cannot be empty (expected e.g. 10s, 250ms, 1m)".to_string());
    }
    humantime::parse_duration(s)
        .map_err(|err| format!("invalid duration '{s}': {err} (expected e.g. 10s, 250ms, 1m)"))
}

fn parse_header(input: &str) -> Result<(String, String), String> {
    let (name, value) = input
        .split_once(':')
        .ok_or_else(|| format!("invalid header '{input}' (expected NAME:VALUE)"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("invalid header '{input}' (empty name)"));
    }
    Ok((name.to_string(), value.trim().to_string()))
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum OutputFormat {
    /// Progress bar plus a human-readable summary.
    HumanReadable,
    /// Emit every run event as a JSON line (NDJSON) to stdout.
    Json,
}

#[derive(Debug, Parser)]
#[command(
    name = "rawload",
    author,
    version,
    about = "Load test a single HTTP endpoint",
    long_about = "rawload repeats one HTTP request from a pool of virtual users and reports what happened.\n\nThe run is described by a JSON config document (iterations, duration, users, ramp-up, rate limit, failure threshold, adaptive concurrency). Individual flags override keys of that document.",
    after_help = "Examples:\n  rawload run --url http://localhost:8080/ --iterations 100 --users 4\n  rawload run --url http://localhost:8080/ --duration 30s --max-users 50 --spawn-rate 5\n  rawload run --url http://localhost:8080/ --config '{\"duration\":\"1m\",\"adaptive\":true,\"maxUsers\":200}'\n  rawload run --url http://localhost:8080/api -X POST -H 'x-api-key: k' --body '{\"a\":1}' --output json"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a load test against one URL
    Run(RunArgs),
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Target URL (http:// or https://)
    #[arg(long)]
    pub url: String,

    /// HTTP method
    #[arg(short = 'X', long, default_value = "GET")]
    pub method: String,

    /// Request header (repeatable, NAME:VALUE)
    #[arg(short = 'H', long = "header", value_name = "NAME:VALUE", value_parser = parse_header)]
    pub headers: Vec<(String, String)>,

    /// Request body
    #[arg(long, conflicts_with = "body_file")]
    pub body: Option<String>,

    /// Read the request body from a file
    #[arg(long, value_name = "PATH")]
    pub body_file: Option<PathBuf>,

    /// Load test config as a JSON document
    #[arg(long, value_name = "JSON", conflicts_with = "config_file")]
    pub config: Option<String>,

    /// Read the load test config from a JSON file
    #[arg(long, value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    /// Total number of requests
    #[arg(long)]
    pub iterations: Option<u64>,

    /// Run for this long (e.g. 10s, 250ms, 1m)
    #[arg(long, value_parser = parse_duration)]
    pub duration: Option<Duration>,

    /// Concurrent users (start and max)
    #[arg(long)]
    pub users: Option<u64>,

    /// Users at start
    #[arg(long)]
    pub start_users: Option<u64>,

    /// Upper bound on concurrent users
    #[arg(long)]
    pub max_users: Option<u64>,

    /// Users added per second while ramping
    #[arg(long)]
    pub spawn_rate: Option<u64>,

    /// Ramp from start to max users over this long
    #[arg(long, value_parser = parse_duration)]
    pub ramp_up: Option<Duration>,

    /// Global request rate cap
    #[arg(long)]
    pub rps: Option<u64>,

    /// Abort once the failure ratio reaches this value (0.05 or 5 both mean 5%)
    #[arg(long)]
    pub failure_threshold: Option<f64>,

    /// Enable adaptive concurrency control
    #[arg(long)]
    pub adaptive: bool,

    /// Per-request timeout
    #[arg(long, value_parser = parse_duration)]
    pub timeout: Option<Duration>,

    /// Identifier reported with every event (defaults to a generated one)
    #[arg(long, env = "RAWLOAD_REQUEST_ID")]
    pub request_id: Option<String>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::HumanReadable)]
    pub output: OutputFormat,
}
