use std::time::Duration;

/// Single rounded component in one of: us, ms, s.
pub(crate) fn format_duration(d: Duration) -> String {
    let total_ns = d.as_nanos();

    const NS_PER_US: u128 = 1_000;
    const NS_PER_MS: u128 = 1_000_000;
    const NS_PER_S: u128 = 1_000_000_000;

    fn round_div(value: u128, unit: u128) -> u128 {
        // Ties round up.
        (value + (unit / 2)) / unit
    }

    if total_ns >= NS_PER_S {
        return format!("{}s", round_div(total_ns, NS_PER_S));
    }
    if total_ns >= NS_PER_MS {
        return format!("{}ms", round_div(total_ns, NS_PER_MS));
    }
    format!("{}us", round_div(total_ns, NS_PER_US))
}

pub(crate) fn format_ms(ms: u64) -> String {
    if ms == 0 {
        return "0ms".to_string();
    }
    format_duration(Duration::from_millis(ms))
}

pub(crate) fn format_rate(v: f64) -> String {
    if v.is_finite() {
        format!("{v:.1}")
    } else {
        "0".to_string()
    }
}

pub(crate) fn format_pct(ratio: f64) -> String {
    if ratio.is_finite() {
        format!("{:.1}%", ratio * 100.0)
    } else {
        "n/a".to_string()
    }
}

pub(crate) fn format_users(start: u64, max: u64) -> String {
    if start == max {
        max.to_string()
    } else {
        format!("{start}..{max}")
    }
}
