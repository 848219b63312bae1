//! Single-owner rule resolution.
//!
//! For a given eligible file at most one rule is allowed to act. Specific
//! rules claim their extensions outright; catch-all rules only ever see
//! extensions no specific rule claims, so a file whose owning rule's date
//! filter fails is simply left alone this scan rather than falling through.

use crate::rules::{RuleSet, RuleSpec};
use crate::scan::CandidateFile;
use chrono::{DateTime, Utc};

/// Resolve the single rule responsible for `candidate`, if any.
///
/// Rules are consulted in the set's fixed priority order (specific before
/// catch-all). A rule is only considered when it is active and its source
/// folder is the candidate's parent folder. `None` means the file is left
/// untouched this scan; that is not an error.
pub fn match_rule<'a>(
    candidate: &CandidateFile,
    rule_set: &'a RuleSet,
    now: DateTime<Utc>,
) -> Option<&'a RuleSpec> {
    let parent = candidate.path.parent()?;
    let extension = candidate.extension.as_deref().unwrap_or("");

    // Specific pass: the validator guarantees at most one active specific
    // rule per (source, extension), so the first extension hit owns the file.
    for rule in rule_set.iter() {
        if !rule.active || rule.is_catch_all() || rule.source != parent {
            continue;
        }
        if rule.extensions.contains(extension) {
            return filter_passes(rule, candidate, now).then_some(rule);
        }
    }

    // Catch-all pass: only reached when no specific rule claims the
    // extension at all.
    for rule in rule_set.iter() {
        if !rule.active || !rule.is_catch_all() || rule.source != parent {
            continue;
        }
        if filter_passes(rule, candidate, now) {
            return Some(rule);
        }
    }

    None
}

fn filter_passes(rule: &RuleSpec, candidate: &CandidateFile, now: DateTime<Utc>) -> bool {
    match &rule.date_filter {
        Some(filter) => filter.matches(candidate, now),
        None => true,
    }
}
