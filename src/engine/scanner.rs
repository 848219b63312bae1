//! A single scan pass over one rule's source folder.
//!
//! Per candidate the order is fixed: blacklist, in-flight claim, eligibility
//! gate, rule match, ledger begin, move, ledger outcome. Any unexpected
//! per-file failure is logged and the pass continues with the next
//! candidate; one bad file never aborts a scan.

use crate::events::{Event, EventKind, NotificationSink, Severity};
use crate::fsops::{FileMover, MoveOutcome};
use crate::ledger::{LedgerError, TransferLedger, TransferStatus};
use crate::rules::{match_rule, CollisionPolicy, RuleSet, RuleSpec};
use crate::scan::{CandidateFile, Eligibility, EligibilityGate};
use chrono::Utc;
use tokio::sync::watch;
use walkdir::WalkDir;

/// Counters reported after one pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ScanOutcome {
    pub considered: usize,
    pub moved: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Scan `rule`'s source folder once.
///
/// `stop` is the cooperative cancellation checkpoint, consulted between
/// files only; a ledger transition in progress always completes.
pub fn scan_rule(
    rule: &RuleSpec,
    rule_set: &RuleSet,
    ledger: &TransferLedger,
    mover: &dyn FileMover,
    sink: &dyn NotificationSink,
    stop: Option<&watch::Receiver<bool>>,
) -> ScanOutcome {
    let mut outcome = ScanOutcome::default();

    let entries = WalkDir::new(&rule.source)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file());

    for entry in entries {
        if stop.map(|rx| *rx.borrow()).unwrap_or(false) {
            tracing::debug!(rule = %rule.name, "scan cancelled between files");
            break;
        }

        outcome.considered += 1;
        let path = entry.path();

        // Cheapest exclusion first: blacklisted files never pay for a probe.
        if ledger.is_blacklisted(path) {
            outcome.skipped += 1;
            continue;
        }
        if ledger.is_in_flight(path) {
            outcome.skipped += 1;
            continue;
        }

        let eligibility = EligibilityGate::check(path);
        if let Eligibility::Ineligible(reason) = eligibility {
            sink.emit(Event::new(
                Severity::Debug,
                EventKind::EligibilityDecision {
                    path: path.to_path_buf(),
                    eligible: false,
                    reason: Some(reason),
                },
            ));
            outcome.skipped += 1;
            continue;
        }
        sink.emit(Event::new(
            Severity::Debug,
            EventKind::EligibilityDecision {
                path: path.to_path_buf(),
                eligible: true,
                reason: None,
            },
        ));

        let candidate = match CandidateFile::from_path(path) {
            Ok(c) => c,
            Err(e) => {
                // Equivalent to Inaccessible: transient, try again next scan.
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to read candidate metadata; skipping"
                );
                outcome.skipped += 1;
                continue;
            }
        };

        let now = Utc::now();
        let owner = match_rule(&candidate, rule_set, now);

        let relevant_to_this_rule = owner.map_or(true, |o| o.name == rule.name);
        if let (Some(filter), true) = (&rule.date_filter, relevant_to_this_rule) {
            if extension_claimed_by(rule, &candidate) {
                sink.emit(Event::new(
                    Severity::Debug,
                    EventKind::FilterDecision {
                        path: candidate.path.clone(),
                        rule: rule.name.clone(),
                        filter: filter.to_string(),
                        matched: filter.matches(&candidate, now),
                    },
                ));
            }
        }

        sink.emit(Event::new(
            Severity::Debug,
            EventKind::MatchDecision {
                path: candidate.path.clone(),
                rule: owner.map(|r| r.name.clone()),
            },
        ));

        // Only the owning rule's own scan acts; if another rule owns the
        // file, that rule's scan will pick it up.
        let Some(owner) = owner else {
            outcome.skipped += 1;
            continue;
        };
        if owner.name != rule.name {
            outcome.skipped += 1;
            continue;
        }

        let record = match ledger.begin(&candidate.path, &rule.name, candidate.size) {
            Ok(record) => record,
            Err(LedgerError::Persistence { file, source }) => {
                // Accountability invariant: no durable record, no move.
                sink.emit(Event::new(
                    Severity::Error,
                    EventKind::LedgerTransition {
                        path: file,
                        rule: rule.name.clone(),
                        status: TransferStatus::Failed,
                        attempt_count: 0,
                        error: Some(source.to_string()),
                    },
                ));
                outcome.failed += 1;
                continue;
            }
            Err(_) => {
                outcome.skipped += 1;
                continue;
            }
        };

        sink.emit(Event::new(
            Severity::Debug,
            EventKind::LedgerTransition {
                path: record.file_key.clone(),
                rule: rule.name.clone(),
                status: TransferStatus::InProgress,
                attempt_count: record.attempt_count,
                error: None,
            },
        ));

        let overwrite = rule.on_collision == CollisionPolicy::Overwrite;
        match mover.move_file(&candidate.path, &rule.destination, overwrite) {
            Ok(move_outcome) => {
                let attempt_count = record.attempt_count;
                let path = record.file_key.clone();
                ledger.succeed(record);
                if matches!(move_outcome, MoveOutcome::SkippedExisting(_)) {
                    tracing::info!(
                        path = %path.display(),
                        rule = %rule.name,
                        "destination already exists; collision policy skipped the move"
                    );
                }
                sink.emit(Event::new(
                    Severity::Info,
                    EventKind::LedgerTransition {
                        path,
                        rule: rule.name.clone(),
                        status: TransferStatus::Success,
                        attempt_count,
                        error: None,
                    },
                ));
                outcome.moved += 1;
            }
            Err(e) => {
                let attempt_count = record.attempt_count + 1;
                let path = record.file_key.clone();
                let message = e.to_string();
                let status = ledger.fail(record, &message);
                let severity = match status {
                    TransferStatus::Blacklisted => Severity::Error,
                    _ => Severity::Warn,
                };
                sink.emit(Event::new(
                    severity,
                    EventKind::LedgerTransition {
                        path,
                        rule: rule.name.clone(),
                        status,
                        attempt_count,
                        error: Some(message),
                    },
                ));
                outcome.failed += 1;
            }
        }
    }

    outcome
}

/// Whether `rule` is the one whose extension set claims the candidate.
fn extension_claimed_by(rule: &RuleSpec, candidate: &CandidateFile) -> bool {
    let extension = candidate.extension.as_deref().unwrap_or("");
    rule.extensions.contains(extension)
}
