//! Publish-date normalization.
//!
//! Feeds in the wild use several date layouts. Each parser below handles one
//! and they are tried in a fixed order; the first success wins. Anything that
//! matches none of them (including the empty string) yields `None`: the item
//! is still ingested, just without a publish time.

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};

type DateParser = fn(&str) -> Option<DateTime<Utc>>;

/// Parsers in priority order
const PARSERS: [(&str, DateParser); 5] = [
    ("rfc1123z", parse_rfc1123_numeric_zone),
    ("rfc1123", parse_rfc1123_named_zone),
    ("rfc822", parse_rfc822),
    ("rfc3339", parse_rfc3339),
    ("iso8601z", parse_iso8601_zulu),
];

/// Convert a raw publish-date string into a UTC timestamp.
///
/// Returns `None` when the string is empty or no known layout matches.
/// Never fails.
///
/// # Examples
///
/// ```
/// use gator::feed::normalize_published;
///
/// assert!(normalize_published("Mon, 02 Jan 2006 15:04:05 -0700").is_some());
/// assert!(normalize_published("").is_none());
/// assert!(normalize_published("yesterday-ish").is_none());
/// ```
pub fn normalize_published(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    PARSERS.iter().find_map(|(name, parse)| {
        let parsed = parse(raw);
        if parsed.is_some() {
            tracing::trace!(layout = *name, raw = %raw, "Parsed publish date");
        }
        parsed
    })
}

/// `Mon, 02 Jan 2006 15:04:05 -0700`
fn parse_rfc1123_numeric_zone(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_str(s, "%a, %d %b %Y %H:%M:%S %z")
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// `Mon, 02 Jan 2006 15:04:05 MST`
fn parse_rfc1123_named_zone(s: &str) -> Option<DateTime<Utc>> {
    let (stamp, zone) = s.rsplit_once(' ')?;
    let naive = NaiveDateTime::parse_from_str(stamp, "%a, %d %b %Y %H:%M:%S").ok()?;
    with_named_zone(naive, zone)
}

/// `02 Jan 06 15:04 MST`
fn parse_rfc822(s: &str) -> Option<DateTime<Utc>> {
    let (stamp, zone) = s.rsplit_once(' ')?;
    let naive = NaiveDateTime::parse_from_str(stamp, "%d %b %y %H:%M").ok()?;
    with_named_zone(naive, zone)
}

/// `2006-01-02T15:04:05+07:00`, `2006-01-02T15:04:05Z`
fn parse_rfc3339(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// `2006-01-02T15:04:05Z`, read as UTC.
///
/// Some generators append a redundant offset after the `Z`
/// (`2006-01-02T15:04:05Z07:00`, `...Z+00:00`). The `Z` wins and the residue
/// is ignored as long as it is shaped like an offset.
fn parse_iso8601_zulu(s: &str) -> Option<DateTime<Utc>> {
    let (stamp, residue) = s.split_once('Z')?;
    if !residue.is_empty() && !is_offset_residue(residue) {
        return None;
    }
    let naive = NaiveDateTime::parse_from_str(stamp, "%Y-%m-%dT%H:%M:%S%.f").ok()?;
    Some(Utc.from_utc_datetime(&naive))
}

/// `[+-]HH:MM` or `HH:MM`
fn is_offset_residue(s: &str) -> bool {
    let digits = s.strip_prefix(|c: char| c == '+' || c == '-').unwrap_or(s);
    let bytes = digits.as_bytes();
    bytes.len() == 5
        && bytes[2] == b':'
        && bytes
            .iter()
            .enumerate()
            .all(|(i, b)| i == 2 || b.is_ascii_digit())
}

fn with_named_zone(naive: NaiveDateTime, zone: &str) -> Option<DateTime<Utc>> {
    let offset = named_zone_offset(zone)?;
    offset
        .from_local_datetime(&naive)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Offsets for the zone names RFC 822 defines. Any other all-letter
/// abbreviation is accepted and read as UTC, since its offset cannot be known.
fn named_zone_offset(zone: &str) -> Option<FixedOffset> {
    const HOUR: i32 = 3600;
    let hours = match zone {
        "UT" | "UTC" | "GMT" | "Z" => 0,
        "EST" => -5,
        "EDT" => -4,
        "CST" => -6,
        "CDT" => -5,
        "MST" => -7,
        "MDT" => -6,
        "PST" => -8,
        "PDT" => -7,
        other if (2..=5).contains(&other.len()) && other.chars().all(|c| c.is_ascii_uppercase()) => 0,
        _ => return None,
    };
    FixedOffset::east_opt(hours * HOUR)
}
