//! The observable state root.
//!
//! The aggregate state tree lives behind a copy-on-write `Arc`: readers take
//! cheap snapshots, writers get exclusive access to the live tree. Writes made
//! through the mutation protocol go through [`StateCell::commit`]; everything
//! else goes through [`StateCell::write`]. Whether a write is a commit is
//! decided while the write lock is held, so concurrent commits never affect
//! how a direct write is judged. In strict mode a direct write that changes
//! the tree is reported. The check is advisory: the write has already
//! happened.

use arbor_core::diagnostic::{Diagnostic, DiagnosticLog};
use parking_lot::RwLock;
use serde_json::Value;
use std::sync::Arc;

pub(crate) struct StateCell {
    root: RwLock<Arc<Value>>,
    strict: bool,
}

impl StateCell {
    pub(crate) fn new(initial: Value, strict: bool) -> Self {
        Self {
            root: RwLock::new(Arc::new(initial)),
            strict,
        }
    }

    pub(crate) fn snapshot(&self) -> Arc<Value> {
        self.root.read().clone()
    }

    /// Write to the live tree as part of a commit. Never reported.
    pub(crate) fn commit<R>(&self, f: impl FnOnce(&mut Value) -> R) -> R {
        let mut root = self.root.write();
        f(Arc::make_mut(&mut root))
    }

    /// Write to the live tree outside the mutation protocol. Strict mode
    /// compares the tree before and after.
    pub(crate) fn write<R>(
        &self,
        diagnostics: &DiagnosticLog,
        f: impl FnOnce(&mut Value) -> R,
    ) -> R {
        let mut root = self.root.write();
        let before = self.strict.then(|| Arc::clone(&root));
        let result = f(Arc::make_mut(&mut root));

        if let Some(before) = before {
            if *before != **root {
                diagnostics.report(Diagnostic::StrictViolation);
            }
        }
        result
    }

    /// Swap the whole tree as a commit.
    pub(crate) fn replace(&self, next: Value) {
        *self.root.write() = Arc::new(next);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::thread;

    #[test]
    fn test_snapshot_is_isolated_from_later_writes() {
        let cell = StateCell::new(json!({ "x": 1 }), false);
        let before = cell.snapshot();

        cell.commit(|root| root["x"] = json!(2));

        assert_eq!(before["x"], 1);
        assert_eq!(cell.snapshot()["x"], 2);
    }

    #[test]
    fn test_strict_reports_direct_writes_only() {
        let cell = StateCell::new(json!({ "x": 1 }), true);
        let log = DiagnosticLog::default();

        cell.write(&log, |root| root["x"] = json!(2));
        assert_eq!(log.take(), vec![Diagnostic::StrictViolation]);

        cell.commit(|root| root["x"] = json!(3));
        cell.replace(json!({ "x": 4 }));
        assert!(log.take().is_empty());
    }

    #[test]
    fn test_strict_ignores_writes_without_change() {
        let cell = StateCell::new(json!({ "x": 1 }), true);
        let log = DiagnosticLog::default();
        cell.write(&log, |root| root["x"] = json!(1));
        assert!(log.take().is_empty());
    }

    #[test]
    fn test_commit_without_readers_writes_in_place() {
        let cell = StateCell::new(json!({ "x": 1 }), true);
        let before = Arc::as_ptr(&cell.snapshot());

        cell.commit(|root| root["x"] = json!(2));

        assert_eq!(Arc::as_ptr(&cell.snapshot()), before);
    }

    #[test]
    fn test_concurrent_commits_do_not_mask_direct_writes() {
        let cell = Arc::new(StateCell::new(json!({ "n": 0, "m": 0 }), true));
        let log = Arc::new(DiagnosticLog::new(1024));

        let committers: Vec<_> = (0..4)
            .map(|_| {
                let cell = cell.clone();
                thread::spawn(move || {
                    for _ in 0..2_000 {
                        cell.commit(|root| {
                            root["n"] = json!(root["n"].as_i64().unwrap_or(0) + 1);
                        });
                    }
                })
            })
            .collect();

        for i in 1..=200 {
            cell.write(&log, |root| root["m"] = json!(i));
        }
        for committer in committers {
            committer.join().unwrap();
        }

        assert_eq!(cell.snapshot()["n"], 8_000);
        assert_eq!(log.take().len(), 200);

        cell.write(&log, |root| root["m"] = json!(-1));
        assert_eq!(log.take(), vec![Diagnostic::StrictViolation]);
    }
}
