//! Configuration document, error taxonomy, and validation.
//!
//! Raw rules arrive as nil-able records straight from the deserializer;
//! nothing is trusted until `ConfigValidator` promotes them into a
//! `RuleSet`. Numeric-ish fields are kept as raw JSON values so error
//! messages can distinguish "not a number" from "out of range".
//!
//! ## Modules
//! - `canonical` - path identity for cycle detection (aliases, symlinks)
//! - `validator` - the whole-configuration validation pass

pub mod canonical;
pub mod validator;

pub use canonical::{AliasResolver, CanonicalPaths, NoAliasResolver, TableAliasResolver};
pub use validator::{ConfigValidator, ValidationReport};

use crate::filter::FilterParseError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Maximum rule name length, in characters.
pub const MAX_NAME_LEN: usize = 64;
/// Scan interval bounds, milliseconds (1 second to 24 hours).
pub const MIN_SCAN_INTERVAL_MILLIS: i64 = 1_000;
pub const MAX_SCAN_INTERVAL_MILLIS: i64 = 86_400_000;
/// Interval applied when the field is omitted.
pub const DEFAULT_SCAN_INTERVAL_MILLIS: u64 = 60_000;

/// One rule as deserialized, before validation. Every field is optional so
/// the validator can report precise per-field errors instead of failing the
/// whole document on the first missing value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawRule {
    pub name: Option<String>,
    pub source_folder: Option<String>,
    pub destination_folder: Option<String>,
    /// Extension tokens; the single token `*` declares a catch-all rule
    pub extensions: Option<Vec<String>>,
    /// `FIELD:SIGN:MINUTES` filter expression
    pub date_filter: Option<String>,
    /// Legacy single-field date criteria; mutually exclusive with each
    /// other and with `dateFilter`
    pub created_minutes: Option<serde_json::Value>,
    pub modified_minutes: Option<serde_json::Value>,
    pub accessed_minutes: Option<serde_json::Value>,
    /// Raw so "abc" and 50 both reach the validator intact
    pub scan_interval_millis: Option<serde_json::Value>,
    pub on_collision: Option<String>,
    pub active: Option<bool>,
}

/// The whole configuration document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConfigDocument {
    pub rules: Vec<RawRule>,
}

/// Structural failures that prevent validation from even starting.
#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("configuration is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Read and deserialize a configuration file. Unparsable input is the one
/// truly fail-fast case; everything else is accumulated by the validator.
pub fn load_document(path: &Path) -> Result<ConfigDocument, ConfigLoadError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigLoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(serde_json::from_str(&text)?)
}

/// What exactly was wrong with a field.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigErrorKind {
    #[error("required field is missing")]
    Missing,
    #[error("name may only contain letters, digits and spaces: '{0}'")]
    NameFormat(String),
    #[error("name exceeds {MAX_NAME_LEN} characters")]
    NameTooLong,
    #[error("duplicate rule name (also used by rule #{0})")]
    DuplicateName(usize),
    #[error("path must be absolute: '{0}'")]
    RelativePath(String),
    #[error("path contains wildcard characters: '{0}'")]
    WildcardInPath(String),
    #[error("reserved device name '{0}' in path component")]
    ReservedName(String),
    #[error("invalid extension token '{0}'")]
    InvalidExtension(String),
    #[error("the catch-all sentinel '*' cannot be combined with other extensions")]
    MixedCatchAll,
    #[error("extension '{ext}' is already claimed by rule '{other}' on the same source folder")]
    DuplicateExtension { ext: String, other: String },
    #[error("source folder already has an active catch-all rule ('{0}')")]
    SecondCatchAll(String),
    #[error("a catch-all rule must declare a date filter")]
    CatchAllNeedsFilter,
    #[error("'{0}' is not a number")]
    NotANumber(String),
    #[error("{value} is outside the allowed range {min}..={max}")]
    OutOfRange { value: i64, min: i64, max: i64 },
    #[error("unknown collision policy '{0}' (expected 'skip' or 'overwrite')")]
    InvalidCollisionPolicy(String),
    #[error(transparent)]
    Filter(FilterParseError),
    #[error("at most one date criterion may be set per rule")]
    MultipleDateCriteria,
    #[error("destination folder equals the rule's own source")]
    DestinationEqualsSource,
    #[error("destination folder is the source of rule '{0}'")]
    DestinationFeedsRule(String),
    #[error("rules form a move cycle: {}", .0.join(" -> "))]
    MoveCycle(Vec<String>),
    #[error("no active rule has an accessible source folder")]
    NoWorkableRule,
}

/// A rule-attributable configuration error.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{rule}, field '{field}': {kind}")]
pub struct ConfigError {
    /// Rule name when known, otherwise a positional label like `rule #3`
    pub rule: String,
    pub field: &'static str,
    pub kind: ConfigErrorKind,
}

/// Non-fatal findings surfaced alongside a valid (or invalid) report.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigWarning {
    /// Two textual paths resolved to the same physical location.
    AliasedPaths {
        raw: PathBuf,
        first_seen_as: PathBuf,
    },
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigWarning::AliasedPaths { raw, first_seen_as } => write!(
                f,
                "'{}' is an alias of '{}'; both resolve to the same folder",
                raw.display(),
                first_seen_as.display()
            ),
        }
    }
}
