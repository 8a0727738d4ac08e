const NANOS_PER_MS: i128 = 1_000_000;

/// Scale of a unit suffix in nanoseconds.
fn unit_nanos(unit: &str) -> Option<i128> {
    Some(match unit {
        "ns" => 1,
        "us" | "\u{b5}s" | "\u{3bc}s" => 1_000,
        "ms" => 1_000_000,
        "s" => 1_000_000_000,
        "m" => 60 * 1_000_000_000,
        "h" => 3_600 * 1_000_000_000,
        _ => return None,
    })
}

/// Parses a signed, unit-suffixed duration such as `"1h30m"`, `"1.5s"` or `"-250ms"`.
///
/// Returns nanoseconds. A bare `"0"` is accepted without a unit; any other number needs one.
pub(crate) fn parse_signed_nanos(raw: &str) -> Option<i128> {
    let (negative, mut rest) = match raw.as_bytes().first() {
        Some(b'-') => (true, &raw[1..]),
        Some(b'+') => (false, &raw[1..]),
        _ => (false, raw),
    };

    if rest == "0" {
        return Some(0);
    }
    if rest.is_empty() {
        return None;
    }

    let mut total: i128 = 0;
    while !rest.is_empty() {
        let int_len = rest.bytes().take_while(u8::is_ascii_digit).count();
        let (int_digits, tail) = rest.split_at(int_len);

        let (frac_digits, tail) = match tail.strip_prefix('.') {
            Some(after_dot) => {
                let frac_len = after_dot.bytes().take_while(u8::is_ascii_digit).count();
                after_dot.split_at(frac_len)
            }
            None => ("", tail),
        };
        if int_digits.is_empty() && frac_digits.is_empty() {
            return None;
        }

        let unit_len = tail
            .char_indices()
            .find(|(_, c)| c.is_ascii_digit() || *c == '.')
            .map_or(tail.len(), |(idx, _)| idx);
        let (unit, tail) = tail.split_at(unit_len);
        let scale = unit_nanos(unit)?;

        let whole: i128 = if int_digits.is_empty() {
            0
        } else {
            int_digits.parse().ok()?
        };
        total = total.checked_add(whole.checked_mul(scale)?)?;

        // Digits past nanosecond precision cannot change the result.
        let frac_digits = &frac_digits[..frac_digits.len().min(18)];
        if !frac_digits.is_empty() {
            let frac: i128 = frac_digits.parse().ok()?;
            let denom = 10_i128.pow(frac_digits.len() as u32);
            total = total.checked_add(frac * scale / denom)?;
        }

        rest = tail;
    }

    Some(if negative { -total } else { total })
}

fn is_bare_number(raw: &str) -> bool {
    !raw.is_empty() && raw.chars().all(|c| c.is_ascii_digit() || c == '.')
}

/// Parses a loosely formatted duration into whole milliseconds.
///
/// A bare number (`"1500"`, `"2.5"`) is milliseconds. Anything else must be a
/// unit-suffixed duration. Blank, malformed or negative input yields 0.
pub fn parse_duration_ms(raw: &str) -> u64 {
    let raw = raw.trim();
    if raw.is_empty() {
        return 0;
    }

    if is_bare_number(raw) {
        return match raw.parse::<f64>() {
            Ok(ms) if ms.is_finite() && ms >= 0.0 => ms.round() as u64,
            _ => 0,
        };
    }

    match parse_signed_nanos(raw) {
        Some(nanos) if nanos > 0 => u64::try_from(nanos / NANOS_PER_MS).unwrap_or(u64::MAX),
        _ => 0,
    }
}

/// Parses a loosely formatted duration into whole seconds, rounding to nearest.
///
/// Unlike [`parse_duration_ms`], a bare number is already seconds here.
pub(crate) fn parse_duration_secs(raw: &str) -> u64 {
    let raw = raw.trim();
    if is_bare_number(raw) {
        return match raw.parse::<f64>() {
            Ok(secs) if secs.is_finite() && secs >= 0.0 => secs as u64,
            _ => 0,
        };
    }
    (parse_duration_ms(raw) as f64 / 1000.0).round() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_numbers_are_milliseconds() {
        assert_eq!(parse_duration_ms("1500"), 1500);
        assert_eq!(parse_duration_ms(" 2.6 "), 3);
        assert_eq!(parse_duration_ms("1.2.3"), 0);
    }

    #[test]
    fn unit_suffixed_durations() {
        assert_eq!(parse_duration_ms("30s"), 30_000);
        assert_eq!(parse_duration_ms("1.5s"), 1_500);
        assert_eq!(parse_duration_ms(".5s"), 500);
        assert_eq!(parse_duration_ms("250ms"), 250);
        assert_eq!(parse_duration_ms("1h30m"), 5_400_000);
        assert_eq!(parse_duration_ms("1m0.25s"), 60_250);
        assert_eq!(parse_duration_ms("2500us"), 2);
        assert_eq!(parse_duration_ms("2500\u{b5}s"), 2);
        assert_eq!(parse_duration_ms("999999ns"), 0);
    }

    #[test]
    fn rejects_negative_and_malformed() {
        assert_eq!(parse_duration_ms(""), 0);
        assert_eq!(parse_duration_ms("-1s"), 0);
        assert_eq!(parse_duration_ms("10"), 10);
        assert_eq!(parse_duration_ms("10x"), 0);
        assert_eq!(parse_duration_ms("s"), 0);
        assert_eq!(parse_duration_ms("1s2"), 0);
        assert_eq!(parse_duration_ms("abc"), 0);
    }

    #[test]
    fn signed_nanos_handles_sign_and_zero() {
        assert_eq!(parse_signed_nanos("0"), Some(0));
        assert_eq!(parse_signed_nanos("-0"), Some(0));
        assert_eq!(parse_signed_nanos("+1ms"), Some(1_000_000));
        assert_eq!(parse_signed_nanos("-1.5h"), Some(-5_400_000_000_000));
        assert_eq!(parse_signed_nanos("-"), None);
        assert_eq!(parse_signed_nanos("5"), None);
    }

    #[test]
    fn seconds_accept_bare_numbers_and_durations() {
        assert_eq!(parse_duration_secs("15"), 15);
        assert_eq!(parse_duration_secs("2.9"), 2);
        assert_eq!(parse_duration_secs("1m"), 60);
        assert_eq!(parse_duration_secs("1500ms"), 2);
        assert_eq!(parse_duration_secs("400ms"), 0);
        assert_eq!(parse_duration_secs("nope"), 0);
    }
}
