//! Notice date normalization.
//!
//! The notice table prints dates in the Japanese era calendar
//! (`令和7年1月15日`), sometimes with full-width digits or stray spaces.
//! Everything is normalized to midnight of the notice date in one fixed
//! offset, so repeated runs over the same page produce the same feed.

use std::sync::OnceLock;

use chrono::{DateTime, FixedOffset, NaiveDate, Offset, TimeZone, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;

use crate::error::DateParseError;
use crate::types::DateSource;

/// Imperial eras the normalizer understands, with the offset that turns an
/// era year into a Gregorian year.
const ERAS: &[(&str, char, i32)] = &[
    ("令和", 'R', 2018),
    ("平成", 'H', 1988),
    ("昭和", 'S', 1925),
];

/// What to do with date text that matches no known layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateFallback {
    /// Drop the row. Keeps feeds stable across runs.
    #[default]
    Skip,
    /// Use the processing time. The item's date drifts if the page is reprocessed.
    Now,
}

impl std::str::FromStr for DateFallback {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "skip" => Ok(Self::Skip),
            "now" => Ok(Self::Now),
            other => Err(format!("unknown date fallback {other:?} (expected skip or now)")),
        }
    }
}

/// The fixed offset every timestamp is expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimestampZone {
    /// Japan Standard Time, +09:00.
    #[default]
    Jst,
    Utc,
}

impl TimestampZone {
    pub fn offset(self) -> FixedOffset {
        match self {
            TimestampZone::Jst => FixedOffset::east_opt(9 * 3600).unwrap_or(Utc.fix()),
            TimestampZone::Utc => Utc.fix(),
        }
    }
}

fn era_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(令和|平成|昭和)\s*(元|\d{1,2})\s*年\s*(\d{1,2})\s*月\s*(\d{1,2})\s*日?")
            .expect("era regex is valid")
    })
}

fn era_initial_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b([RHS])\s*(\d{1,2})\s*[./]\s*(\d{1,2})\s*[./]\s*(\d{1,2})\b")
            .expect("era initial regex is valid")
    })
}

fn ymd_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(\d{4})\s*[年/.\-]\s*(\d{1,2})\s*[月/.\-]\s*(\d{1,2})\s*日?")
            .expect("ymd regex is valid")
    })
}

fn dmy_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b(\d{1,2})/(\d{1,2})/(\d{4})\b").expect("dmy regex is valid")
    })
}

/// NFKC-fold the text: full-width digits and spaces become ASCII, and the
/// single-glyph era sign `㋿` expands to `令和`.
pub fn normalize_text(text: &str) -> String {
    text.nfkc()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Parse notice date text into midnight of that date in `zone`.
///
/// Tries the era layouts first, then timestamps with an explicit offset,
/// then generic calendar layouts.
pub fn parse_date(
    text: &str,
    zone: TimestampZone,
) -> Result<(DateTime<FixedOffset>, DateSource), DateParseError> {
    let normalized = normalize_text(text);

    if let Some((year, month, day)) = match_era(&normalized) {
        return midnight(year, month, day, zone).map(|dt| (dt, DateSource::Era));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(&normalized) {
        return Ok((dt.with_timezone(&zone.offset()), DateSource::Calendar));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(&normalized) {
        return Ok((dt.with_timezone(&zone.offset()), DateSource::Calendar));
    }
    if let Some((year, month, day)) = match_calendar(&normalized) {
        return midnight(year, month, day, zone).map(|dt| (dt, DateSource::Calendar));
    }

    Err(DateParseError::Unrecognized(text.trim().to_string()))
}

/// Parse with the deployment's fallback policy applied.
///
/// Under [`DateFallback::Now`] this never fails: unrecognized text and
/// impossible calendar dates both yield `now` converted to `zone`. Under
/// [`DateFallback::Skip`] the parse error is returned so the caller can drop
/// the row.
pub fn normalize_date(
    text: &str,
    policy: DateFallback,
    zone: TimestampZone,
    now: DateTime<FixedOffset>,
) -> Result<(DateTime<FixedOffset>, DateSource), DateParseError> {
    match parse_date(text, zone) {
        Ok(parsed) => Ok(parsed),
        Err(_) if policy == DateFallback::Now => {
            Ok((now.with_timezone(&zone.offset()), DateSource::Fallback))
        }
        Err(e) => Err(e),
    }
}

fn match_era(text: &str) -> Option<(i32, u32, u32)> {
    if let Some(caps) = era_regex().captures(text) {
        let offset = ERAS.iter().find(|(name, _, _)| *name == &caps[1])?.2;
        let era_year = match &caps[2] {
            "元" => 1,
            digits => digits.parse::<i32>().ok()?,
        };
        return Some((offset + era_year, caps[3].parse().ok()?, caps[4].parse().ok()?));
    }

    let caps = era_initial_regex().captures(text)?;
    let initial = caps[1].chars().next()?.to_ascii_uppercase();
    let offset = ERAS.iter().find(|(_, c, _)| *c == initial)?.2;
    Some((
        offset + caps[2].parse::<i32>().ok()?,
        caps[3].parse().ok()?,
        caps[4].parse().ok()?,
    ))
}

fn match_calendar(text: &str) -> Option<(i32, u32, u32)> {
    if let Some(caps) = ymd_regex().captures(text) {
        return Some((caps[1].parse().ok()?, caps[2].parse().ok()?, caps[3].parse().ok()?));
    }
    // Day-first, as the notice pages are never US-formatted.
    let caps = dmy_regex().captures(text)?;
    Some((caps[3].parse().ok()?, caps[2].parse().ok()?, caps[1].parse().ok()?))
}

fn midnight(
    year: i32,
    month: u32,
    day: u32,
    zone: TimestampZone,
) -> Result<DateTime<FixedOffset>, DateParseError> {
    let invalid = || DateParseError::InvalidDate { year, month, day };
    let naive = NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .ok_or_else(invalid)?;
    zone.offset()
        .from_local_datetime(&naive)
        .single()
        .ok_or_else(invalid)
}
