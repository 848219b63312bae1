//! Validated rule records.
//!
//! A `RuleSpec` only ever exists post-validation; raw configuration records
//! live in `crate::config` and are promoted here by the validator.

use crate::filter::DateFilter;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// What to do when the destination already contains the file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollisionPolicy {
    /// Leave both files alone; the transfer reports a skip
    Skip,
    /// Replace the destination file
    Overwrite,
}

impl CollisionPolicy {
    /// Parse the configuration token.
    pub fn from_token(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "skip" => Some(CollisionPolicy::Skip),
            "overwrite" => Some(CollisionPolicy::Overwrite),
            _ => None,
        }
    }
}

/// The extensions a rule is responsible for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ExtensionSet {
    /// The `*` sentinel: any extension not claimed by a specific rule
    CatchAll,
    /// Ordered, de-duplicated, normalized (lowercase, no dot) extensions
    Specific(Vec<String>),
}

impl ExtensionSet {
    /// Normalize a single extension token: trim, strip a leading dot,
    /// lowercase. Returns `None` for an empty result.
    pub fn normalize_token(token: &str) -> Option<String> {
        let token = token.trim().trim_start_matches('.').to_ascii_lowercase();
        if token.is_empty() {
            None
        } else {
            Some(token)
        }
    }

    pub fn is_catch_all(&self) -> bool {
        matches!(self, ExtensionSet::CatchAll)
    }

    /// Membership test for an already-lowercased extension.
    pub fn contains(&self, ext: &str) -> bool {
        match self {
            ExtensionSet::CatchAll => true,
            ExtensionSet::Specific(list) => list.iter().any(|e| e == ext),
        }
    }
}

/// One validated relocation rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleSpec {
    /// Human label, unique across the configuration
    pub name: String,
    /// Absolute folder the rule scans
    pub source: PathBuf,
    /// Absolute folder accepted files are moved into
    pub destination: PathBuf,
    /// Extensions the rule owns, or the catch-all sentinel
    pub extensions: ExtensionSet,
    /// Optional age predicate; `None` means always match
    pub date_filter: Option<DateFilter>,
    /// Milliseconds between scans of this rule's source folder
    pub scan_interval_millis: u64,
    /// Collision policy for the move primitive
    pub on_collision: CollisionPolicy,
    /// Inactive rules are validated but never scheduled
    pub active: bool,
}

impl RuleSpec {
    /// The scan cadence as a `Duration`.
    pub fn scan_interval(&self) -> Duration {
        Duration::from_millis(self.scan_interval_millis)
    }

    pub fn is_catch_all(&self) -> bool {
        self.extensions.is_catch_all()
    }
}
