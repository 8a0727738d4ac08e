/// Response text that marks a request abandoned because its run was cancelled.
pub const CANCELLED_RESPONSE: &str = "__CANCELLED__";

const STATUS_PREFIX: &str = "Status: ";
const HEADERS_MARKER: &str = "\nHeaders: ";
const BODY_MARKER: &str = "\nBody: ";

/// Extracts the HTTP status and `timing.total` (ms) from a textual response record.
///
/// The status is 0 when the record has no parseable status line (transport errors).
/// Timing is `None` when missing or non-positive.
pub fn parse_status_and_timing(record: &str) -> (u16, Option<u64>) {
    let status = record
        .strip_prefix(STATUS_PREFIX)
        .and_then(|rest| rest.lines().next())
        .and_then(|line| line.split_whitespace().next())
        .and_then(|code| code.parse::<u16>().ok())
        .unwrap_or(0);

    (status, parse_timing(record))
}

fn parse_timing(record: &str) -> Option<u64> {
    let headers_at = record.find(HEADERS_MARKER)?;
    let body_at = record.find(BODY_MARKER)?;
    if body_at <= headers_at {
        return None;
    }

    let meta = record[headers_at + HEADERS_MARKER.len()..body_at].trim();
    let meta: serde_json::Value = serde_json::from_str(meta).ok()?;
    let total = meta.get("timing")?.get("total")?.as_f64()?;
    (total.is_finite() && total >= 1.0).then(|| total.round() as u64)
}
