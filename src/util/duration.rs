use std::time::Duration;
use thiserror::Error;

/// Errors from [`parse_duration`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DurationError {
    #[error("Invalid duration {0:?}")]
    Invalid(String),
    #[error("Missing unit in duration {0:?}")]
    MissingUnit(String),
    #[error("Unknown unit {unit:?} in duration {input:?}")]
    UnknownUnit { unit: String, input: String },
    #[error("Duration {0:?} is too large")]
    Overflow(String),
    #[error("Negative duration {0:?}")]
    Negative(String),
}

/// Largest representable duration, in nanoseconds (about 292 years).
const MAX_NANOS: u64 = i64::MAX as u64;

fn unit_nanos(unit: &str) -> Option<u64> {
    match unit {
        "ns" => Some(1),
        "us" | "\u{b5}s" | "\u{3bc}s" => Some(1_000),
        "ms" => Some(1_000_000),
        "s" => Some(1_000_000_000),
        "m" => Some(60 * 1_000_000_000),
        "h" => Some(60 * 60 * 1_000_000_000),
        _ => None,
    }
}

/// Parse a duration string such as `"1m"`, `"1h30m"`, `"1.5s"` or `"300ms"`.
///
/// Grammar: an optional sign followed by one or more `<number><unit>` terms,
/// where the number may carry a decimal fraction and the unit is one of
/// `ns`, `us` (or `µs`), `ms`, `s`, `m`, `h`. A bare `"0"` is also accepted.
/// Negative non-zero values are rejected since [`Duration`] is unsigned.
///
/// ```
/// use gator::util::parse_duration;
/// use std::time::Duration;
///
/// assert_eq!(parse_duration("1m30s").unwrap(), Duration::from_secs(90));
/// assert_eq!(parse_duration("1.5h").unwrap(), Duration::from_secs(5400));
/// assert!(parse_duration("5").is_err());
/// ```
pub fn parse_duration(input: &str) -> Result<Duration, DurationError> {
    let invalid = || DurationError::Invalid(input.to_string());
    let overflow = || DurationError::Overflow(input.to_string());

    let (negative, mut rest) = match input.as_bytes().first() {
        Some(b'-') => (true, &input[1..]),
        Some(b'+') => (false, &input[1..]),
        _ => (false, input),
    };

    if rest == "0" {
        return Ok(Duration::ZERO);
    }
    if rest.is_empty() {
        return Err(invalid());
    }

    let mut total: u64 = 0;
    while !rest.is_empty() {
        let int_len = rest.bytes().take_while(u8::is_ascii_digit).count();
        let (int_digits, mut after) = rest.split_at(int_len);

        let mut whole: u64 = 0;
        for digit in int_digits.bytes() {
            whole = whole
                .checked_mul(10)
                .and_then(|v| v.checked_add(u64::from(digit - b'0')))
                .filter(|v| *v <= MAX_NANOS)
                .ok_or_else(overflow)?;
        }

        // Digits past what fits are dropped; they cannot change the result
        let mut fraction: u64 = 0;
        let mut scale: f64 = 1.0;
        let mut frac_len = 0;
        if let Some(stripped) = after.strip_prefix('.') {
            frac_len = stripped.bytes().take_while(u8::is_ascii_digit).count();
            let (frac_digits, tail) = stripped.split_at(frac_len);
            let mut saturated = false;
            for digit in frac_digits.bytes() {
                if saturated {
                    continue;
                }
                match fraction
                    .checked_mul(10)
                    .and_then(|v| v.checked_add(u64::from(digit - b'0')))
                    .filter(|v| *v <= MAX_NANOS)
                {
                    Some(next) => {
                        fraction = next;
                        scale *= 10.0;
                    }
                    None => saturated = true,
                }
            }
            after = tail;
        }

        if int_len == 0 && frac_len == 0 {
            return Err(invalid());
        }

        let unit_len = after
            .find(|c: char| c == '.' || c.is_ascii_digit())
            .unwrap_or(after.len());
        if unit_len == 0 {
            return Err(DurationError::MissingUnit(input.to_string()));
        }
        let (unit, tail) = after.split_at(unit_len);
        let per_unit = unit_nanos(unit).ok_or_else(|| DurationError::UnknownUnit {
            unit: unit.to_string(),
            input: input.to_string(),
        })?;

        let mut term = whole
            .checked_mul(per_unit)
            .filter(|v| *v <= MAX_NANOS)
            .ok_or_else(overflow)?;
        if fraction > 0 {
            term = term
                .checked_add((fraction as f64 * (per_unit as f64 / scale)) as u64)
                .filter(|v| *v <= MAX_NANOS)
                .ok_or_else(overflow)?;
        }
        total = total
            .checked_add(term)
            .filter(|v| *v <= MAX_NANOS)
            .ok_or_else(overflow)?;

        rest = tail;
    }

    if negative && total > 0 {
        return Err(DurationError::Negative(input.to_string()));
    }
    Ok(Duration::from_nanos(total))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    #[test]
    fn test_single_units() {
        assert_eq!(parse_duration("300ns").unwrap(), Duration::from_nanos(300));
        assert_eq!(parse_duration("15us").unwrap(), Duration::from_micros(15));
        assert_eq!(parse_duration("15µs").unwrap(), Duration::from_micros(15));
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("1m").unwrap(), Duration::from_secs(60));
        assert_eq!(parse_duration("2h").unwrap(), Duration::from_secs(7200));
    }

    #[test]
    fn test_sequences_and_fractions() {
        assert_eq!(parse_duration("1h30m").unwrap(), Duration::from_secs(5400));
        assert_eq!(parse_duration("1m0.5s").unwrap(), Duration::from_millis(60_500));
        assert_eq!(parse_duration("1.5s").unwrap(), Duration::from_millis(1500));
        assert_eq!(parse_duration(".5s").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("1.s").unwrap(), Duration::from_secs(1));
        assert_eq!(parse_duration("+10s").unwrap(), Duration::from_secs(10));
    }

    #[test]
    fn test_zero_forms() {
        assert_eq!(parse_duration("0").unwrap(), Duration::ZERO);
        assert_eq!(parse_duration("0s").unwrap(), Duration::ZERO);
        assert_eq!(parse_duration("-0s").unwrap(), Duration::ZERO);
    }

    #[test]
    fn test_rejections() {
        assert_eq!(parse_duration(""), Err(DurationError::Invalid(String::new())));
        assert!(matches!(parse_duration("."), Err(DurationError::Invalid(_))));
        assert!(matches!(parse_duration("-"), Err(DurationError::Invalid(_))));
        assert!(matches!(parse_duration("s"), Err(DurationError::Invalid(_))));
        assert!(matches!(parse_duration("5"), Err(DurationError::MissingUnit(_))));
        assert!(matches!(parse_duration("1m5"), Err(DurationError::MissingUnit(_))));
        assert!(matches!(
            parse_duration("3d"),
            Err(DurationError::UnknownUnit { ref unit, .. }) if unit == "d"
        ));
        assert!(matches!(parse_duration("1 m"), Err(DurationError::UnknownUnit { .. })));
        assert!(matches!(parse_duration("-1m"), Err(DurationError::Negative(_))));
        assert!(matches!(
            parse_duration("9999999999999999999h"),
            Err(DurationError::Overflow(_))
        ));
        assert!(matches!(parse_duration("3000000h"), Err(DurationError::Overflow(_))));
    }

    proptest! {
        #[test]
        fn prop_hms_sequences_parse_exactly(h in 0u64..1000, m in 0u64..60, s in 0u64..60) {
            let parsed = parse_duration(&format!("{h}h{m}m{s}s")).unwrap();
            prop_assert_eq!(parsed, Duration::from_secs(h * 3600 + m * 60 + s));
        }

        #[test]
        fn prop_never_panics(input in "\\PC{0,24}") {
            let _ = parse_duration(&input);
        }
    }
}
