//! Scan scheduling and snapshot management.
//!
//! Each active rule owns an independent periodic timer; scans for different
//! rules run concurrently with each other and with configuration reloads.
//! The rule set is an immutable snapshot swapped atomically on reload, so a
//! running scan never observes a half-updated rule.
//!
//! ## Modules
//! - `scanner` - one pass over one rule's source folder

pub mod scanner;

pub use scanner::{scan_rule, ScanOutcome};

use crate::events::NotificationSink;
use crate::fsops::FileMover;
use crate::ledger::TransferLedger;
use crate::rules::RuleSet;
use std::sync::{Arc, RwLock};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

/// The running core: rule snapshot, shared ledger, collaborators.
pub struct Engine {
    rule_set: RwLock<Arc<RuleSet>>,
    ledger: Arc<TransferLedger>,
    mover: Arc<dyn FileMover>,
    sink: Arc<dyn NotificationSink>,
    shutdown_tx: watch::Sender<bool>,
    reload_tx: watch::Sender<u64>,
}

impl Engine {
    pub fn new(
        rule_set: RuleSet,
        ledger: Arc<TransferLedger>,
        mover: Arc<dyn FileMover>,
        sink: Arc<dyn NotificationSink>,
    ) -> Arc<Self> {
        let (shutdown_tx, _) = watch::channel(false);
        let (reload_tx, _) = watch::channel(0);
        Arc::new(Self {
            rule_set: RwLock::new(Arc::new(rule_set)),
            ledger,
            mover,
            sink,
            shutdown_tx,
            reload_tx,
        })
    }

    /// The current immutable rule snapshot.
    pub fn snapshot(&self) -> Arc<RuleSet> {
        self.rule_set
            .read()
            .map(|guard| guard.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    pub fn ledger(&self) -> &TransferLedger {
        &self.ledger
    }

    /// Swap in a freshly validated rule set. In-flight scans finish against
    /// the snapshot they started with; the scheduler re-reads on the next
    /// tick and respawns its rule tasks.
    pub fn reload(&self, rule_set: RuleSet) {
        match self.rule_set.write() {
            Ok(mut guard) => *guard = Arc::new(rule_set),
            Err(poisoned) => *poisoned.into_inner() = Arc::new(rule_set),
        }
        self.reload_tx.send_modify(|generation| *generation += 1);
        tracing::info!("rule set reloaded");
    }

    /// Ask the scheduler and all rule tasks to stop at their next
    /// between-files checkpoint.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// One synchronous pass over every active rule. Used by tests and the
    /// one-shot CLI mode; the daemon path is [`Engine::run`].
    pub fn scan_once(&self) -> ScanOutcome {
        let snapshot = self.snapshot();
        let mut total = ScanOutcome::default();
        for rule in snapshot.active_rules() {
            let outcome = scanner::scan_rule(
                rule,
                &snapshot,
                &self.ledger,
                self.mover.as_ref(),
                self.sink.as_ref(),
                None,
            );
            total.considered += outcome.considered;
            total.moved += outcome.moved;
            total.skipped += outcome.skipped;
            total.failed += outcome.failed;
        }
        total
    }

    /// Run until [`Engine::shutdown`]: spawn one timer task per active
    /// rule, respawning the set whenever the configuration is reloaded.
    pub async fn run(self: Arc<Self>) {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let mut reload_rx = self.reload_tx.subscribe();

        loop {
            let snapshot = self.snapshot();
            let (stop_tx, _) = watch::channel(false);

            let mut handles = Vec::new();
            for rule in snapshot.active_rules() {
                handles.push(tokio::spawn(rule_loop(
                    self.clone(),
                    rule.name.clone(),
                    rule.scan_interval(),
                    stop_tx.subscribe(),
                )));
            }
            tracing::info!(rules = handles.len(), "scan scheduler started");

            let shutting_down = tokio::select! {
                _ = shutdown_rx.changed() => true,
                _ = reload_rx.changed() => false,
            };

            let _ = stop_tx.send(true);
            for handle in handles {
                let _ = handle.await;
            }

            if shutting_down {
                tracing::info!("scan scheduler stopped");
                return;
            }
        }
    }
}

/// Periodic scan driver for one rule, by name so a reload that drops the
/// rule ends the task naturally.
async fn rule_loop(
    engine: Arc<Engine>,
    rule_name: String,
    interval: std::time::Duration,
    mut stop: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = stop.changed() => return,
            _ = ticker.tick() => {}
        }

        let snapshot = engine.snapshot();
        let Some(rule) = snapshot.by_name(&rule_name).cloned() else {
            return;
        };
        if !rule.active {
            return;
        }

        // The pass does blocking filesystem work; keep it off the runtime's
        // async workers.
        let engine_for_scan = engine.clone();
        let stop_for_scan = stop.clone();
        let scan = tokio::task::spawn_blocking(move || {
            scanner::scan_rule(
                &rule,
                &snapshot,
                &engine_for_scan.ledger,
                engine_for_scan.mover.as_ref(),
                engine_for_scan.sink.as_ref(),
                Some(&stop_for_scan),
            )
        })
        .await;

        match scan {
            Ok(outcome) => {
                if outcome.considered > 0 {
                    tracing::debug!(
                        rule = %rule_name,
                        considered = outcome.considered,
                        moved = outcome.moved,
                        skipped = outcome.skipped,
                        failed = outcome.failed,
                        "scan pass complete"
                    );
                }
            }
            Err(e) => {
                tracing::error!(rule = %rule_name, error = %e, "scan task panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigDocument, ConfigValidator, RawRule};
    use crate::events::{EventKind, MemorySink};
    use crate::fsops::{AtomicMover, RecordingMover};
    use crate::ledger::{MemoryLedgerStore, TransferStatus};
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn validated_rule_set(source: &Path, dest: &Path, filter: Option<&str>) -> RuleSet {
        let raw = RawRule {
            name: Some("Text files".to_string()),
            source_folder: Some(source.to_string_lossy().to_string()),
            destination_folder: Some(dest.to_string_lossy().to_string()),
            extensions: Some(vec!["txt".to_string()]),
            date_filter: filter.map(String::from),
            ..RawRule::default()
        };
        let report = ConfigValidator::new().validate(&ConfigDocument { rules: vec![raw] });
        assert!(report.is_valid(), "{:?}", report.errors);
        report.rule_set
    }

    fn engine_with(
        rule_set: RuleSet,
        store: Arc<MemoryLedgerStore>,
        mover: Arc<dyn FileMover>,
    ) -> (Arc<Engine>, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        let ledger = Arc::new(TransferLedger::new(store));
        let engine = Engine::new(rule_set, ledger, mover, sink.clone());
        (engine, sink)
    }

    #[test]
    fn test_scan_moves_matching_file() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("in");
        let dest = temp.path().join("out");
        fs::create_dir_all(&source).unwrap();
        fs::write(source.join("notes.txt"), b"hello").unwrap();
        fs::write(source.join("image.png"), b"png").unwrap();

        let rule_set = validated_rule_set(&source, &dest, None);
        let store = Arc::new(MemoryLedgerStore::new());
        let (engine, _sink) = engine_with(rule_set, store.clone(), Arc::new(AtomicMover));

        let outcome = engine.scan_once();
        assert_eq!(outcome.moved, 1);
        assert!(dest.join("notes.txt").exists());
        // The .png matched no rule and stays put.
        assert!(source.join("image.png").exists());
        assert_eq!(store.begin_count(), 1);
    }

    #[test]
    fn test_empty_file_is_never_matched() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("in");
        let dest = temp.path().join("out");
        fs::create_dir_all(&source).unwrap();
        fs::write(source.join("report.txt"), b"").unwrap();

        let rule_set = validated_rule_set(&source, &dest, None);
        let store = Arc::new(MemoryLedgerStore::new());
        let (engine, sink) = engine_with(rule_set, store.clone(), Arc::new(AtomicMover));

        let outcome = engine.scan_once();
        assert_eq!(outcome.moved, 0);
        assert!(source.join("report.txt").exists());
        assert_eq!(store.begin_count(), 0);
        assert!(sink.events().iter().any(|e| matches!(
            &e.kind,
            EventKind::EligibilityDecision { eligible: false, .. }
        )));
    }

    #[test]
    fn test_persistence_failure_blocks_the_move() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("in");
        let dest = temp.path().join("out");
        fs::create_dir_all(&source).unwrap();
        fs::write(source.join("notes.txt"), b"hello").unwrap();

        let rule_set = validated_rule_set(&source, &dest, None);
        let store = Arc::new(MemoryLedgerStore::failing());
        let mover = Arc::new(RecordingMover::new());
        let (engine, sink) = engine_with(rule_set, store, mover.clone());

        let outcome = engine.scan_once();
        assert_eq!(outcome.failed, 1);
        // Accountability: the move primitive was never invoked.
        assert_eq!(mover.call_count(), 0);
        assert!(source.join("notes.txt").exists());
        assert!(sink.events().iter().any(|e| matches!(
            &e.kind,
            EventKind::LedgerTransition { status: TransferStatus::Failed, .. }
        )));
    }

    #[test]
    fn test_retries_then_blacklist_on_fifth_failure() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("in");
        let dest = temp.path().join("out");
        fs::create_dir_all(&source).unwrap();
        let file = source.join("stuck.txt");
        fs::write(&file, b"payload").unwrap();

        let rule_set = validated_rule_set(&source, &dest, None);
        let store = Arc::new(MemoryLedgerStore::new());
        let mover = Arc::new(RecordingMover::failing_times(10));
        let (engine, sink) = engine_with(rule_set, store, mover.clone());

        for scan in 1..=5 {
            let outcome = engine.scan_once();
            assert_eq!(outcome.failed, 1, "scan {scan}");
        }
        assert!(engine.ledger().is_blacklisted(&file));

        // Blacklisted: later scans skip the file before any probe or move.
        let outcome = engine.scan_once();
        assert_eq!(outcome.failed, 0);
        assert_eq!(mover.call_count(), 5);

        assert!(sink.events().iter().any(|e| matches!(
            &e.kind,
            EventKind::LedgerTransition { status: TransferStatus::Blacklisted, attempt_count: 5, .. }
        )));
    }

    #[test]
    fn test_date_filter_gates_the_move() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("in");
        let dest = temp.path().join("out");
        fs::create_dir_all(&source).unwrap();
        let file = source.join("old.txt");
        fs::write(&file, b"payload").unwrap();

        // Freshly created: an older-than-120-minutes rule must not fire.
        let rule_set = validated_rule_set(&source, &dest, Some("FC:+120"));
        let store = Arc::new(MemoryLedgerStore::new());
        let (engine, sink) = engine_with(rule_set, store.clone(), Arc::new(AtomicMover));

        let outcome = engine.scan_once();
        assert_eq!(outcome.moved, 0);
        assert!(file.exists());
        assert_eq!(store.begin_count(), 0);
        assert!(sink.events().iter().any(|e| matches!(
            &e.kind,
            EventKind::FilterDecision { matched: false, .. }
        )));
    }

    #[test]
    fn test_aged_file_passes_the_filter_and_moves() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("in");
        let dest = temp.path().join("out");
        fs::create_dir_all(&source).unwrap();
        let file = source.join("stale.txt");
        fs::write(&file, b"payload").unwrap();
        let mtime = std::time::SystemTime::now() - std::time::Duration::from_secs(3 * 60 * 60);
        filetime::set_file_mtime(&file, filetime::FileTime::from_system_time(mtime)).unwrap();

        let rule_set = validated_rule_set(&source, &dest, Some("LM:+120"));
        let store = Arc::new(MemoryLedgerStore::new());
        let (engine, _sink) = engine_with(rule_set, store, Arc::new(AtomicMover));

        let outcome = engine.scan_once();
        assert_eq!(outcome.moved, 1);
        assert!(dest.join("stale.txt").exists());
    }

    #[test]
    fn test_reload_swaps_the_snapshot() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("in");
        let dest = temp.path().join("out");
        fs::create_dir_all(&source).unwrap();

        let rule_set = validated_rule_set(&source, &dest, None);
        let store = Arc::new(MemoryLedgerStore::new());
        let (engine, _sink) = engine_with(rule_set, store, Arc::new(AtomicMover));

        let before = engine.snapshot();
        assert_eq!(before.len(), 1);

        engine.reload(RuleSet::disabled());
        let after = engine.snapshot();
        assert!(after.is_empty());
        // The old snapshot is untouched; in-flight scans keep using it.
        assert_eq!(before.len(), 1);
    }

    #[tokio::test]
    async fn test_run_scans_periodically_and_shuts_down() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("in");
        let dest = temp.path().join("out");
        fs::create_dir_all(&source).unwrap();
        fs::write(source.join("notes.txt"), b"hello").unwrap();

        let rule_set = validated_rule_set(&source, &dest, None);
        let store = Arc::new(MemoryLedgerStore::new());
        let (engine, _sink) = engine_with(rule_set, store, Arc::new(AtomicMover));

        let runner = tokio::spawn(engine.clone().run());

        // The first tick fires immediately; poll briefly for the move.
        for _ in 0..50 {
            if dest.join("notes.txt").exists() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        assert!(dest.join("notes.txt").exists());

        engine.shutdown();
        runner.await.unwrap();
    }
}
