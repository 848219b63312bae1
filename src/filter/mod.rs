//! Relative-age filter mini-language.
//!
//! Filters are written as `FIELD:SIGN:MINUTES` strings, e.g. `FC:+120`
//! ("created at least 120 minutes ago") or `LM:-30` ("modified within the
//! last 30 minutes"). A filter is parsed once at validation time and is
//! immutable afterwards.

use crate::scan::CandidateFile;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Largest accepted magnitude: ten years, in minutes.
pub const MAX_THRESHOLD_MINUTES: i64 = 5_256_000;

/// Errors produced while parsing a filter expression.
///
/// "Not a number" and "out of range" are distinct so configuration errors can
/// say precisely what was wrong with the offending value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterParseError {
    #[error("missing ':' separator in filter '{0}'")]
    MissingSeparator(String),
    #[error("unknown date field '{0}' (expected LA, LM or FC)")]
    UnknownField(String),
    #[error("filter '{0}' must carry an explicit '+' or '-' sign")]
    MissingSign(String),
    #[error("'{0}' is not a number of minutes")]
    NotANumber(String),
    #[error("a zero-minute threshold matches nothing; use a nonzero value")]
    ZeroThreshold,
    #[error("threshold {0} exceeds the maximum of {MAX_THRESHOLD_MINUTES} minutes")]
    OutOfRange(i64),
}

/// Which file timestamp the filter inspects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DateField {
    /// `LA`: last-accessed timestamp
    LastAccessed,
    /// `LM`: last-modified timestamp
    LastModified,
    /// `FC`: creation timestamp
    Created,
}

impl DateField {
    /// Parse the two-letter field code.
    pub fn from_code(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "LA" => Some(DateField::LastAccessed),
            "LM" => Some(DateField::LastModified),
            "FC" => Some(DateField::Created),
            _ => None,
        }
    }

    /// The canonical two-letter code for this field.
    pub fn code(&self) -> &'static str {
        match self {
            DateField::LastAccessed => "LA",
            DateField::LastModified => "LM",
            DateField::Created => "FC",
        }
    }

    /// Pull this field's timestamp from a candidate.
    pub fn timestamp(&self, candidate: &CandidateFile) -> Option<DateTime<Utc>> {
        match self {
            DateField::LastAccessed => candidate.accessed,
            DateField::LastModified => candidate.modified,
            DateField::Created => candidate.created,
        }
    }
}

/// A parsed, validated age filter.
///
/// The sign of `threshold_minutes` encodes direction: positive means the file
/// must be at least that old ("older-than"), negative means it must be no
/// older than the magnitude ("within-last"). The magnitude is never zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DateFilter {
    pub field: DateField,
    pub threshold_minutes: i64,
}

impl DateFilter {
    /// Parse a raw filter string.
    ///
    /// Empty or whitespace-only input is `Ok(None)`: "no filter configured",
    /// which callers must treat as always-match. That is deliberately not a
    /// parse error.
    pub fn parse(raw: &str) -> Result<Option<DateFilter>, FilterParseError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Ok(None);
        }

        let (field_str, rest) = raw
            .split_once(':')
            .ok_or_else(|| FilterParseError::MissingSeparator(raw.to_string()))?;

        let field = DateField::from_code(field_str.trim())
            .ok_or_else(|| FilterParseError::UnknownField(field_str.trim().to_string()))?;

        let rest = rest.trim();
        let mut chars = rest.chars();
        let sign = match chars.next() {
            Some('+') => 1i64,
            Some('-') => -1i64,
            _ => return Err(FilterParseError::MissingSign(raw.to_string())),
        };

        let digits = chars.as_str();
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(FilterParseError::NotANumber(rest.to_string()));
        }
        let magnitude: i64 = digits
            .parse()
            .map_err(|_| FilterParseError::NotANumber(rest.to_string()))?;

        if magnitude == 0 {
            return Err(FilterParseError::ZeroThreshold);
        }
        if magnitude > MAX_THRESHOLD_MINUTES {
            return Err(FilterParseError::OutOfRange(magnitude));
        }

        Ok(Some(DateFilter {
            field,
            threshold_minutes: sign * magnitude,
        }))
    }

    /// Whether the filter demands a minimum age (`+N`).
    pub fn is_older_than(&self) -> bool {
        self.threshold_minutes > 0
    }

    /// Evaluate the filter against a candidate at time `now`.
    ///
    /// `age_minutes` may be negative when the timestamp lies in the future
    /// (clock skew); a future file never satisfies an older-than filter and
    /// does satisfy a within-last filter whose magnitude covers it. A missing
    /// timestamp never matches.
    pub fn matches(&self, candidate: &CandidateFile, now: DateTime<Utc>) -> bool {
        let Some(stamp) = self.field.timestamp(candidate) else {
            return false;
        };
        let age_minutes = (now - stamp).num_minutes();

        if self.is_older_than() {
            age_minutes >= self.threshold_minutes
        } else {
            // Boundary is inclusive on both directions.
            age_minutes <= -self.threshold_minutes
        }
    }
}

impl fmt::Display for DateFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.threshold_minutes >= 0 { '+' } else { '-' };
        write!(f, "{}:{}{}", self.field.code(), sign, self.threshold_minutes.abs())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::path::PathBuf;

    fn candidate_created_minutes_ago(now: DateTime<Utc>, minutes: i64) -> CandidateFile {
        let stamp = now - Duration::minutes(minutes);
        CandidateFile {
            path: PathBuf::from("/watch/log.txt"),
            file_name: "log.txt".to_string(),
            extension: Some("txt".to_string()),
            size: 42,
            created: Some(stamp),
            modified: Some(stamp),
            accessed: Some(stamp),
        }
    }

    #[test]
    fn test_parse_older_than() {
        let filter = DateFilter::parse("FC:+120").unwrap().unwrap();
        assert_eq!(filter.field, DateField::Created);
        assert_eq!(filter.threshold_minutes, 120);
        assert!(filter.is_older_than());
    }

    #[test]
    fn test_parse_within_last() {
        let filter = DateFilter::parse("lm:-30").unwrap().unwrap();
        assert_eq!(filter.field, DateField::LastModified);
        assert_eq!(filter.threshold_minutes, -30);
        assert!(!filter.is_older_than());
    }

    #[test]
    fn test_empty_is_no_filter_not_an_error() {
        assert_eq!(DateFilter::parse("").unwrap(), None);
        assert_eq!(DateFilter::parse("   ").unwrap(), None);
    }

    #[test]
    fn test_zero_rejected() {
        assert_eq!(
            DateFilter::parse("FC:+0"),
            Err(FilterParseError::ZeroThreshold)
        );
        assert_eq!(
            DateFilter::parse("FC:-0"),
            Err(FilterParseError::ZeroThreshold)
        );
    }

    #[test]
    fn test_range_boundary() {
        let ok = DateFilter::parse("LA:+5256000").unwrap().unwrap();
        assert_eq!(ok.threshold_minutes, 5_256_000);

        assert_eq!(
            DateFilter::parse("LA:+5256001"),
            Err(FilterParseError::OutOfRange(5_256_001))
        );
    }

    #[test]
    fn test_malformed_inputs() {
        assert!(matches!(
            DateFilter::parse("FC+120"),
            Err(FilterParseError::MissingSeparator(_))
        ));
        assert!(matches!(
            DateFilter::parse("XX:+120"),
            Err(FilterParseError::UnknownField(_))
        ));
        assert!(matches!(
            DateFilter::parse("FC:120"),
            Err(FilterParseError::MissingSign(_))
        ));
        assert!(matches!(
            DateFilter::parse("FC:+12x"),
            Err(FilterParseError::NotANumber(_))
        ));
        assert!(matches!(
            DateFilter::parse("FC:+"),
            Err(FilterParseError::NotANumber(_))
        ));
    }

    #[test]
    fn test_round_trip() {
        for raw in ["FC:+120", "LM:-30", "LA:+5256000", "FC:-1"] {
            let filter = DateFilter::parse(raw).unwrap().unwrap();
            let rendered = filter.to_string();
            assert_eq!(rendered, raw);
            let reparsed = DateFilter::parse(&rendered).unwrap().unwrap();
            assert_eq!(reparsed, filter);
        }
    }

    #[test]
    fn test_older_than_evaluation() {
        let now = Utc::now();
        let candidate = candidate_created_minutes_ago(now, 180);

        let pass = DateFilter::parse("FC:+120").unwrap().unwrap();
        assert!(pass.matches(&candidate, now));

        let fail = DateFilter::parse("FC:+200").unwrap().unwrap();
        assert!(!fail.matches(&candidate, now));
    }

    #[test]
    fn test_boundary_is_inclusive_both_ways() {
        let now = Utc::now();
        let candidate = candidate_created_minutes_ago(now, 120);

        let older = DateFilter::parse("FC:+120").unwrap().unwrap();
        let within = DateFilter::parse("FC:-120").unwrap().unwrap();
        assert!(older.matches(&candidate, now));
        assert!(within.matches(&candidate, now));
    }

    #[test]
    fn test_future_timestamp_semantics() {
        let now = Utc::now();
        // Created "minus 60 minutes ago", i.e. 60 minutes in the future.
        let candidate = candidate_created_minutes_ago(now, -60);

        let older = DateFilter::parse("FC:+1").unwrap().unwrap();
        assert!(!older.matches(&candidate, now));

        let within = DateFilter::parse("FC:-120").unwrap().unwrap();
        assert!(within.matches(&candidate, now));
    }

    #[test]
    fn test_missing_timestamp_never_matches() {
        let now = Utc::now();
        let mut candidate = candidate_created_minutes_ago(now, 180);
        candidate.created = None;

        let filter = DateFilter::parse("FC:+120").unwrap().unwrap();
        assert!(!filter.matches(&candidate, now));
    }
}
