use std::time::Duration;

use serde::Deserialize;

use super::duration::{parse_duration_ms, parse_duration_secs};
use super::error::Result;

const DEFAULT_ITERATIONS: u64 = 10;
const DEFAULT_ADAPTIVE_FAILURE_RATE: f64 = 0.01;
const DEFAULT_ADAPTIVE_WINDOW_SECS: u64 = 15;
const DEFAULT_ADAPTIVE_STABLE_SECS: u64 = 20;
const DEFAULT_ADAPTIVE_COOLDOWN_SECS: u64 = 5;
const DEFAULT_BACKOFF_STEP_USERS: i64 = 2;

/// A JSON scalar as clients actually send it: numbers may arrive as strings and
/// flags as numbers.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum LooseValue {
    Bool(bool),
    Number(f64),
    Text(String),
    Other(serde_json::Value),
}

impl LooseValue {
    /// Positive whole count, truncating fractions.
    fn as_count(&self) -> Option<u64> {
        let n = match self {
            Self::Number(n) => *n,
            Self::Text(s) => s.trim().parse::<f64>().ok()?,
            _ => return None,
        };
        (n.is_finite() && n >= 1.0).then_some(n.trunc() as u64)
    }

    fn as_duration_ms(&self) -> u64 {
        match self {
            Self::Text(s) => parse_duration_ms(s),
            Self::Number(n) if n.is_finite() && *n > 0.0 => n.round() as u64,
            _ => 0,
        }
    }

    /// Failure ratio in `0..=1`. Suffix-less values above 1 are read as
    /// percentages; `"N%"` is always a percentage.
    fn as_fraction(&self) -> Option<f64> {
        let ratio = match self {
            Self::Number(n) => *n,
            Self::Text(s) => {
                let s = s.trim();
                match s.strip_suffix('%') {
                    Some(pct) => {
                        let pct = pct.trim().parse::<f64>().ok()?;
                        if !pct.is_finite() || pct.is_sign_negative() {
                            return None;
                        }
                        return Some((pct / 100.0).clamp(0.0, 1.0));
                    }
                    None => s.parse::<f64>().ok()?,
                }
            }
            _ => return None,
        };
        if !ratio.is_finite() || ratio < 0.0 {
            return None;
        }
        let ratio = if ratio > 1.0 { ratio / 100.0 } else { ratio };
        Some(ratio.clamp(0.0, 1.0))
    }

    fn as_flag(&self) -> bool {
        match self {
            Self::Bool(b) => *b,
            Self::Number(n) => *n != 0.0,
            Self::Text(s) => matches!(
                s.trim().to_ascii_lowercase().as_str(),
                "true" | "1" | "yes" | "y" | "on"
            ),
            Self::Other(_) => false,
        }
    }

    /// Whole seconds; numbers and bare numeric strings are seconds already.
    fn as_secs(&self) -> Option<u64> {
        let secs = match self {
            Self::Number(n) if n.is_finite() && *n > 0.0 => n.trunc() as u64,
            Self::Text(s) => parse_duration_secs(s),
            _ => 0,
        };
        (secs > 0).then_some(secs)
    }

    fn as_int(&self) -> Option<i64> {
        match self {
            Self::Number(n) if n.is_finite() => Some(n.trunc() as i64),
            Self::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

/// Object form of the `adaptive` field.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AdaptiveBlock {
    pub enabled: Option<LooseValue>,
    pub failure_rate: Option<LooseValue>,
    pub window: Option<LooseValue>,
    pub stable: Option<LooseValue>,
    pub cooldown: Option<LooseValue>,
    pub backoff_step: Option<LooseValue>,
}

/// The `adaptive` field: an object opts in with settings, anything else is a flag.
#[derive(Debug, Clone, PartialEq)]
pub enum AdaptiveInput {
    Block(AdaptiveBlock),
    Flag(LooseValue),
}

impl<'de> Deserialize<'de> for AdaptiveInput {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = serde_json::Value::deserialize(deserializer)?;
        if value.is_object() {
            serde_json::from_value(value)
                .map(Self::Block)
                .map_err(serde::de::Error::custom)
        } else {
            serde_json::from_value(value)
                .map(Self::Flag)
                .map_err(serde::de::Error::custom)
        }
    }
}

impl AdaptiveInput {
    fn block(&self) -> Option<&AdaptiveBlock> {
        match self {
            Self::Block(block) => Some(block),
            Self::Flag(_) => None,
        }
    }

    fn enabled(&self) -> bool {
        match self {
            // An object without `enabled` still opts in.
            Self::Block(block) => block.enabled.as_ref().is_none_or(LooseValue::as_flag),
            Self::Flag(flag) => flag.as_flag(),
        }
    }
}

/// Raw load test configuration. Every field is optional and loosely typed.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub iterations: Option<LooseValue>,
    pub duration: Option<LooseValue>,

    pub concurrent: Option<LooseValue>,
    pub users: Option<LooseValue>,
    pub concurrency: Option<LooseValue>,
    pub start: Option<LooseValue>,
    pub start_users: Option<LooseValue>,
    pub max: Option<LooseValue>,
    pub max_users: Option<LooseValue>,

    pub spawn_rate: Option<LooseValue>,
    pub ramp_up: Option<LooseValue>,
    pub delay: Option<LooseValue>,
    pub wait_min: Option<LooseValue>,
    pub wait_max: Option<LooseValue>,
    pub requests_per_second: Option<LooseValue>,
    pub failure_rate_threshold: Option<LooseValue>,
    /// Per-request timeout handed to the performer.
    pub timeout: Option<LooseValue>,

    pub adaptive: Option<AdaptiveInput>,
    pub adaptive_failure_rate: Option<LooseValue>,
    pub adaptive_window: Option<LooseValue>,
    pub adaptive_stable: Option<LooseValue>,
    pub adaptive_cooldown: Option<LooseValue>,
    pub adaptive_backoff_step: Option<LooseValue>,
}

/// Inclusive think-time range in milliseconds, as configured (not yet ordered).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitRange {
    pub min_ms: u64,
    pub max_ms: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AdaptiveConfig {
    pub enabled: bool,
    /// Window failure ratio (`0..=1`) above which the controller backs off.
    pub failure_rate: f64,
    pub window_secs: u64,
    pub stable_secs: u64,
    pub cooldown: Duration,
    pub backoff_step_users: u64,
}

/// Fully resolved configuration for one run.
///
/// Invariants: `1 <= start_users <= max_users`, and at least one of
/// `iterations`/`duration` is set.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedConfig {
    pub iterations: Option<u64>,
    pub duration: Option<Duration>,
    pub start_users: u64,
    pub max_users: u64,
    pub spawn_rate: Option<u64>,
    pub ramp_up: Option<Duration>,
    pub delay: Duration,
    pub wait_range: Option<WaitRange>,
    pub requests_per_second: Option<u64>,
    pub failure_threshold: Option<f64>,
    pub request_timeout: Option<Duration>,
    pub adaptive: AdaptiveConfig,
}

fn first_count(candidates: &[&Option<LooseValue>]) -> Option<u64> {
    candidates
        .iter()
        .find_map(|v| v.as_ref().and_then(LooseValue::as_count))
}

fn positive_ms(value: &Option<LooseValue>) -> Option<Duration> {
    value
        .as_ref()
        .map(LooseValue::as_duration_ms)
        .filter(|ms| *ms > 0)
        .map(Duration::from_millis)
}

fn ms_or_zero(value: &Option<LooseValue>) -> u64 {
    value.as_ref().map_or(0, LooseValue::as_duration_ms)
}

// Flat `adaptive*` fields win over the object form.
fn pick_adaptive(
    flat: &Option<LooseValue>,
    block: Option<&AdaptiveBlock>,
    nested: fn(&AdaptiveBlock) -> &Option<LooseValue>,
) -> Option<LooseValue> {
    flat.clone().or_else(|| block.and_then(|b| nested(b).clone()))
}

impl Config {
    /// Parses a JSON config document. Blank input is an empty config.
    pub fn from_json(raw: &str) -> Result<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_json::from_str(raw)?)
    }

    /// Resolves aliases and defaults. Never fails: unusable values fall back
    /// to their defaults.
    pub fn normalize(&self) -> NormalizedConfig {
        let max_users = first_count(&[
            &self.max_users,
            &self.max,
            &self.concurrent,
            &self.users,
            &self.concurrency,
        ])
        .unwrap_or(1);
        let start_users = first_count(&[
            &self.start_users,
            &self.start,
            &self.concurrent,
            &self.users,
            &self.concurrency,
        ])
        .unwrap_or(1)
        .min(max_users);

        let duration = positive_ms(&self.duration);
        let mut iterations = self.iterations.as_ref().and_then(LooseValue::as_count);
        if iterations.is_none() && duration.is_none() {
            iterations = Some(DEFAULT_ITERATIONS);
        }

        let wait_min = ms_or_zero(&self.wait_min);
        let wait_max = ms_or_zero(&self.wait_max);
        let wait_range = (wait_min > 0 || wait_max > 0).then_some(WaitRange {
            min_ms: wait_min,
            max_ms: wait_max,
        });

        NormalizedConfig {
            iterations,
            duration,
            start_users,
            max_users,
            spawn_rate: self.spawn_rate.as_ref().and_then(LooseValue::as_count),
            ramp_up: positive_ms(&self.ramp_up),
            delay: Duration::from_millis(ms_or_zero(&self.delay)),
            wait_range,
            requests_per_second: self
                .requests_per_second
                .as_ref()
                .and_then(LooseValue::as_count),
            failure_threshold: self
                .failure_rate_threshold
                .as_ref()
                .and_then(LooseValue::as_fraction)
                .filter(|ratio| *ratio > 0.0),
            request_timeout: positive_ms(&self.timeout),
            adaptive: self.normalize_adaptive(),
        }
    }

    fn normalize_adaptive(&self) -> AdaptiveConfig {
        let block = self.adaptive.as_ref().and_then(AdaptiveInput::block);
        let pick = |flat: &Option<LooseValue>, nested: fn(&AdaptiveBlock) -> &Option<LooseValue>| {
            pick_adaptive(flat, block, nested)
        };

        let enabled = self.adaptive.as_ref().is_some_and(AdaptiveInput::enabled);

        let mut failure_rate = pick(&self.adaptive_failure_rate, |b| &b.failure_rate)
            .as_ref()
            .and_then(LooseValue::as_fraction)
            .unwrap_or(0.0);
        if enabled && failure_rate <= 0.0 {
            failure_rate = DEFAULT_ADAPTIVE_FAILURE_RATE;
        }

        let secs = |value: Option<LooseValue>, fallback: u64| {
            value.as_ref().and_then(LooseValue::as_secs).unwrap_or(fallback)
        };

        let backoff_step_users = pick(&self.adaptive_backoff_step, |b| &b.backoff_step)
            .as_ref()
            .and_then(LooseValue::as_int)
            .unwrap_or(DEFAULT_BACKOFF_STEP_USERS)
            .max(1) as u64;

        AdaptiveConfig {
            enabled,
            failure_rate,
            window_secs: secs(
                pick(&self.adaptive_window, |b| &b.window),
                DEFAULT_ADAPTIVE_WINDOW_SECS,
            ),
            stable_secs: secs(
                pick(&self.adaptive_stable, |b| &b.stable),
                DEFAULT_ADAPTIVE_STABLE_SECS,
            ),
            cooldown: Duration::from_secs(secs(
                pick(&self.adaptive_cooldown, |b| &b.cooldown),
                DEFAULT_ADAPTIVE_COOLDOWN_SECS,
            )),
            backoff_step_users,
        }
    }
}

impl NormalizedConfig {
    /// Parses and normalizes a JSON config document in one go.
    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(Config::from_json(raw)?.normalize())
    }
}
