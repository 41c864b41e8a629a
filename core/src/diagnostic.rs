//! Non-fatal diagnostics.
//!
//! Conditions that are reported but never abort the operation that raised
//! them: unknown types, duplicate registrations, strict-mode violations and
//! the like. Every diagnostic is logged through `tracing` when reported and
//! retained in a bounded [`DiagnosticLog`] so callers can inspect it later.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriberPhase {
    Before,
    After,
}

impl fmt::Display for SubscriberPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubscriberPhase::Before => f.write_str("before"),
            SubscriberPhase::After => f.write_str("after"),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum Diagnostic {
    #[error("unknown mutation type: {kind}")]
    UnknownMutation { kind: String },

    #[error("unknown action type: {kind}")]
    UnknownAction { kind: String },

    #[error("unknown local mutation type: {local}, global type: {global}")]
    UnknownLocalMutation { local: String, global: String },

    #[error("unknown local action type: {local}, global type: {global}")]
    UnknownLocalAction { local: String, global: String },

    #[error("duplicate getter key: {kind}")]
    DuplicateGetter { kind: String },

    #[error("duplicate namespace {namespace} for the namespaced module {path}")]
    DuplicateNamespace { namespace: String, path: String },

    #[error("trying to add a new module '{key}' on hot reloading at \"{path}\", manual reload is needed")]
    HotUpdateNewModule { path: String, key: String },

    #[error("state field \"{key}\" was overridden by a module with the same name at \"{path}\"")]
    StateFieldOverridden { key: String, path: String },

    #[error("error in {phase} action subscribers for {kind}: {message}")]
    SubscriberFailed {
        phase: SubscriberPhase,
        kind: String,
        message: String,
    },

    #[error("mutation type: {kind}. Silent option has been removed")]
    SilentOptionRemoved { kind: String },

    #[error("do not mutate store state outside mutation handlers")]
    StrictViolation,

    #[error("cannot unregister module \"{path}\": it was not registered at runtime")]
    UnregisterStaticModule { path: String },

    #[error("getter \"{kind}\" depends on itself")]
    GetterCycle { kind: String },

    #[error("mutation type: {kind}. State of module \"{path}\" is not mounted; handler skipped")]
    UnmountedModuleState { kind: String, path: String },
}

impl Diagnostic {
    /// Whether this diagnostic reports misuse (logged at error level) rather
    /// than a suspicious but tolerated configuration (warn level).
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            Diagnostic::UnknownMutation { .. }
                | Diagnostic::UnknownAction { .. }
                | Diagnostic::UnknownLocalMutation { .. }
                | Diagnostic::UnknownLocalAction { .. }
                | Diagnostic::DuplicateGetter { .. }
                | Diagnostic::DuplicateNamespace { .. }
                | Diagnostic::SubscriberFailed { .. }
                | Diagnostic::StrictViolation
                | Diagnostic::GetterCycle { .. }
        )
    }

    pub fn emit(&self) {
        if self.is_error() {
            tracing::error!(diagnostic = ?self, "[arbor] {}", self);
        } else {
            tracing::warn!(diagnostic = ?self, "[arbor] {}", self);
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticEntry {
    pub at: DateTime<Utc>,
    pub diagnostic: Diagnostic,
}

/// Bounded ring of reported diagnostics. The oldest entry is evicted once
/// `capacity` is reached.
#[derive(Debug)]
pub struct DiagnosticLog {
    entries: Mutex<VecDeque<DiagnosticEntry>>,
    capacity: usize,
}

impl DiagnosticLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity.min(64))),
            capacity,
        }
    }

    pub fn report(&self, diagnostic: Diagnostic) {
        diagnostic.emit();
        if self.capacity == 0 {
            return;
        }
        let mut entries = self.entries.lock();
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(DiagnosticEntry {
            at: Utc::now(),
            diagnostic,
        });
    }

    pub fn entries(&self) -> Vec<DiagnosticEntry> {
        self.entries.lock().iter().cloned().collect()
    }

    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.entries
            .lock()
            .iter()
            .map(|entry| entry.diagnostic.clone())
            .collect()
    }

    /// Drain every retained diagnostic.
    pub fn take(&self) -> Vec<Diagnostic> {
        self.entries
            .lock()
            .drain(..)
            .map(|entry| entry.diagnostic)
            .collect()
    }
}

impl Default for DiagnosticLog {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_evicts_oldest() {
        let log = DiagnosticLog::new(2);
        log.report(Diagnostic::UnknownMutation { kind: "a".into() });
        log.report(Diagnostic::UnknownMutation { kind: "b".into() });
        log.report(Diagnostic::UnknownMutation { kind: "c".into() });

        assert_eq!(
            log.diagnostics(),
            vec![
                Diagnostic::UnknownMutation { kind: "b".into() },
                Diagnostic::UnknownMutation { kind: "c".into() },
            ]
        );
    }

    #[test]
    fn test_take_drains() {
        let log = DiagnosticLog::default();
        log.report(Diagnostic::StrictViolation);
        assert_eq!(log.take(), vec![Diagnostic::StrictViolation]);
        assert!(log.take().is_empty());
    }

    #[test]
    fn test_message_format() {
        let diagnostic = Diagnostic::UnknownLocalAction {
            local: "fetch".into(),
            global: "cart/fetch".into(),
        };
        assert_eq!(
            diagnostic.to_string(),
            "unknown local action type: fetch, global type: cart/fetch"
        );
    }

    #[test]
    fn test_serializes_with_code_tag() {
        let json = serde_json::to_value(Diagnostic::StrictViolation).unwrap();
        assert_eq!(json["code"], "strict_violation");
    }
}
