//! Ordered, immutable collections of validated rules.

use super::spec::RuleSpec;
use serde::{Deserialize, Serialize};

/// A validated, ordered rule collection.
///
/// Specific-extension rules come first in their declared order, catch-all
/// rules last, so a plain forward iteration is also the priority order. A
/// `RuleSet` is built once per configuration load, shared behind an `Arc`,
/// and replaced wholesale on reload; it is never mutated in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleSet {
    rules: Vec<RuleSpec>,
}

impl RuleSet {
    /// Build a set from validated rules, moving catch-all rules to the end
    /// while preserving declared order within each group.
    pub fn build(rules: Vec<RuleSpec>) -> Self {
        let (catch_all, specific): (Vec<_>, Vec<_>) =
            rules.into_iter().partition(|r| r.is_catch_all());

        let mut ordered = specific;
        ordered.extend(catch_all);
        Self { rules: ordered }
    }

    /// The validated-empty state used when configuration validation fails:
    /// nothing is scheduled, nothing matches.
    pub fn disabled() -> Self {
        Self { rules: Vec::new() }
    }

    /// All rules in priority order.
    pub fn iter(&self) -> impl Iterator<Item = &RuleSpec> {
        self.rules.iter()
    }

    /// The rules the scheduler should run.
    pub fn active_rules(&self) -> impl Iterator<Item = &RuleSpec> {
        self.rules.iter().filter(|r| r.active)
    }

    /// Look a rule up by its unique name.
    pub fn by_name(&self, name: &str) -> Option<&RuleSpec> {
        self.rules.iter().find(|r| r.name == name)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
