//! Getter projection.
//!
//! A [`Projection`] owns the getter table of one installation. Getters are
//! evaluated lazily and memoized together with the reads they performed
//! (see [`arbor_core::reactive`]); a memo is reused while every recorded
//! read still returns the same value. Each structural change builds a new
//! projection and the superseded one is torn down on the next scheduler
//! tick.

use crate::registry::WrappedGetter;
use crate::store::StoreInner;
use arbor_core::diagnostic::{Diagnostic, DiagnosticLog};
use arbor_core::path::nested_state;
use arbor_core::reactive::{Dependency, GetterReader, StateReader, Tracker};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, ThreadId};

struct Memo {
    value: Value,
    dependencies: Vec<Dependency>,
}

#[derive(Default)]
pub(crate) struct Projection {
    getters: HashMap<String, WrappedGetter>,
    memos: Mutex<HashMap<String, Arc<Memo>>>,
    /// namespace -> (local name -> qualified type), built on first use.
    local_views: Mutex<HashMap<String, Arc<HashMap<String, String>>>>,
    /// Getters currently being resolved, per thread.
    resolving: Mutex<Vec<(ThreadId, String)>>,
    torn_down: AtomicBool,
}

impl Projection {
    pub(crate) fn new(getters: HashMap<String, WrappedGetter>) -> Self {
        Self {
            getters,
            ..Self::default()
        }
    }

    pub(crate) fn contains(&self, kind: &str) -> bool {
        self.getters.contains_key(kind)
    }

    pub(crate) fn kinds(&self) -> Vec<String> {
        let mut kinds: Vec<String> = self.getters.keys().cloned().collect();
        kinds.sort();
        kinds
    }

    /// Local-name view of the getters under `namespace`.
    pub(crate) fn local_view(&self, namespace: &str) -> Arc<HashMap<String, String>> {
        let mut views = self.local_views.lock();
        if let Some(view) = views.get(namespace) {
            return view.clone();
        }
        let view: HashMap<String, String> = self
            .getters
            .keys()
            .filter_map(|kind| {
                let local = kind.strip_prefix(namespace)?;
                Some((local.to_string(), kind.clone()))
            })
            .collect();
        let view = Arc::new(view);
        views.insert(namespace.to_string(), view.clone());
        view
    }

    /// Qualified type for `name` as seen from `namespace`.
    pub(crate) fn resolve_local(&self, namespace: &str, name: &str) -> Option<String> {
        if namespace.is_empty() {
            return self.contains(name).then(|| name.to_string());
        }
        self.local_view(namespace).get(name).cloned()
    }

    /// Value of the getter `kind` against `state`, memoized.
    ///
    /// A getter that is re-entered while it is being resolved on the same
    /// thread yields `null` and reports [`Diagnostic::GetterCycle`].
    pub(crate) fn get(
        &self,
        kind: &str,
        state: &Arc<Value>,
        diagnostics: &DiagnosticLog,
    ) -> Option<Value> {
        let getter = self.getters.get(kind)?;

        let entry = (thread::current().id(), kind.to_string());
        {
            let mut resolving = self.resolving.lock();
            if resolving.contains(&entry) {
                drop(resolving);
                diagnostics.report(Diagnostic::GetterCycle {
                    kind: kind.to_string(),
                });
                return Some(Value::Null);
            }
            resolving.push(entry.clone());
        }
        let _resolving = Resolving {
            projection: self,
            entry,
        };

        let memo = self.memos.lock().get(kind).cloned();
        if let Some(memo) = memo {
            if self.still_valid(&memo, state, diagnostics) {
                return Some(memo.value.clone());
            }
        }

        let tracker = Tracker::new();
        let value = self.evaluate(getter, state, &tracker, diagnostics);
        if !self.is_torn_down() {
            let memo = Memo {
                value: value.clone(),
                dependencies: tracker.into_dependencies(),
            };
            self.memos.lock().insert(kind.to_string(), Arc::new(memo));
        }
        Some(value)
    }

    fn still_valid(&self, memo: &Memo, state: &Arc<Value>, diagnostics: &DiagnosticLog) -> bool {
        memo.dependencies.iter().all(|dependency| match dependency {
            Dependency::State { .. } => dependency.state_holds(state),
            Dependency::Getter { kind, value } => {
                self.get(kind, state, diagnostics).as_ref() == Some(value)
            }
        })
    }

    fn evaluate(
        &self,
        getter: &WrappedGetter,
        state: &Arc<Value>,
        tracker: &Tracker,
        diagnostics: &DiagnosticLog,
    ) -> Value {
        let local_state = StateReader::tracked(
            nested_state(state, &getter.path),
            getter.path.to_pointer(),
            tracker,
        );
        let root_state = StateReader::tracked(Some(state.as_ref()), "", tracker);

        let read = |kind: String| {
            let value = self.get(&kind, state, diagnostics)?;
            tracker.record(Dependency::Getter {
                kind,
                value: value.clone(),
            });
            Some(value)
        };
        let resolve_local = |name: &str| read(self.resolve_local(&getter.namespace, name)?);
        let resolve_root = |name: &str| read(name.to_string());
        let local_getters = GetterReader::new(&resolve_local);
        let root_getters = GetterReader::new(&resolve_root);

        (getter.handler)(&local_state, &local_getters, &root_state, &root_getters)
    }

    /// Drop every memo; later reads evaluate uncached.
    pub(crate) fn teardown(&self) {
        self.torn_down.store(true, Ordering::SeqCst);
        self.memos.lock().clear();
        self.local_views.lock().clear();
    }

    pub(crate) fn is_torn_down(&self) -> bool {
        self.torn_down.load(Ordering::SeqCst)
    }
}

struct Resolving<'a> {
    projection: &'a Projection,
    entry: (ThreadId, String),
}

impl Drop for Resolving<'_> {
    fn drop(&mut self) {
        let mut resolving = self.projection.resolving.lock();
        if let Some(at) = resolving.iter().rposition(|e| *e == self.entry) {
            resolving.remove(at);
        }
    }
}

/// Read-only getter access, scoped to a namespace.
///
/// The root view (empty namespace) addresses getters by fully qualified
/// type; a namespaced view addresses them by local name. Values are computed
/// against the state at the time of the call.
#[derive(Clone)]
pub struct Getters {
    store: Weak<StoreInner>,
    namespace: String,
}

impl Getters {
    pub(crate) fn new(store: Weak<StoreInner>, namespace: String) -> Self {
        Self { store, namespace }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        let store = self.store.upgrade()?;
        if self.namespace.is_empty() {
            store.read_getter(name)
        } else {
            store.read_local_getter(&self.namespace, name)
        }
    }

    /// Names visible through this view, sorted.
    pub fn keys(&self) -> Vec<String> {
        let Some(store) = self.store.upgrade() else {
            return Vec::new();
        };
        let projection = store.projection();
        if self.namespace.is_empty() {
            return projection.kinds();
        }
        let mut keys: Vec<String> = projection
            .local_view(&self.namespace)
            .keys()
            .cloned()
            .collect();
        keys.sort();
        keys
    }
}

impl std::fmt::Debug for Getters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Getters")
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_core::path::ModulePath;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    fn counted(
        namespace: &str,
        path: ModulePath,
        calls: Arc<AtomicUsize>,
        body: impl for<'a> Fn(&StateReader<'a>, &GetterReader<'a>) -> Value + Send + Sync + 'static,
    ) -> WrappedGetter {
        WrappedGetter {
            namespace: namespace.to_string(),
            path,
            handler: Arc::new(move |state, getters, _, _| {
                calls.fetch_add(1, Ordering::SeqCst);
                body(state, getters)
            }),
        }
    }

    #[test]
    fn test_memo_reused_until_dependency_changes() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut getters = HashMap::new();
        getters.insert(
            "a/double".to_string(),
            counted("a/", ModulePath::from("a"), calls.clone(), |state, _| {
                json!(state.get("x").as_i64().unwrap_or(0) * 2)
            }),
        );
        let projection = Projection::new(getters);
        let log = DiagnosticLog::default();

        let state = Arc::new(json!({ "a": { "x": 2 }, "b": 1 }));
        assert_eq!(projection.get("a/double", &state, &log), Some(json!(4)));
        assert_eq!(projection.get("a/double", &state, &log), Some(json!(4)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // unrelated branch changed
        let state = Arc::new(json!({ "a": { "x": 2 }, "b": 5 }));
        assert_eq!(projection.get("a/double", &state, &log), Some(json!(4)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let state = Arc::new(json!({ "a": { "x": 3 }, "b": 5 }));
        assert_eq!(projection.get("a/double", &state, &log), Some(json!(6)));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_getter_dependency_invalidates_dependent() {
        let outer_calls = Arc::new(AtomicUsize::new(0));
        let mut getters = HashMap::new();
        getters.insert(
            "a/double".to_string(),
            counted("a/", ModulePath::from("a"), Arc::default(), |state, _| {
                json!(state.get("x").as_i64().unwrap_or(0) * 2)
            }),
        );
        getters.insert(
            "a/quad".to_string(),
            counted("a/", ModulePath::from("a"), outer_calls.clone(), |_, getters| {
                json!(getters.get("double").as_i64().unwrap_or(0) * 2)
            }),
        );
        let projection = Projection::new(getters);
        let log = DiagnosticLog::default();

        let state = Arc::new(json!({ "a": { "x": 1 } }));
        assert_eq!(projection.get("a/quad", &state, &log), Some(json!(4)));
        assert_eq!(projection.get("a/quad", &state, &log), Some(json!(4)));
        assert_eq!(outer_calls.load(Ordering::SeqCst), 1);

        let state = Arc::new(json!({ "a": { "x": 5 } }));
        assert_eq!(projection.get("a/quad", &state, &log), Some(json!(20)));
        assert_eq!(outer_calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_cycle_yields_null_and_reports() {
        let mut getters = HashMap::new();
        getters.insert(
            "loop".to_string(),
            counted("", ModulePath::root(), Arc::default(), |_, getters| {
                getters.get("loop")
            }),
        );
        let projection = Projection::new(getters);
        let log = DiagnosticLog::default();

        let state = Arc::new(json!({}));
        assert_eq!(projection.get("loop", &state, &log), Some(Value::Null));
        assert!(log.take().contains(&Diagnostic::GetterCycle { kind: "loop".into() }));
    }

    #[test]
    fn test_unknown_getter_is_none() {
        let projection = Projection::default();
        let log = DiagnosticLog::default();
        assert_eq!(projection.get("nope", &Arc::new(json!({})), &log), None);
    }

    #[test]
    fn test_local_view_strips_namespace() {
        let mut getters = HashMap::new();
        for kind in ["a/x", "a/b/y", "c/z"] {
            getters.insert(
                kind.to_string(),
                counted("", ModulePath::root(), Arc::default(), |_, _| Value::Null),
            );
        }
        let projection = Projection::new(getters);

        assert_eq!(projection.resolve_local("a/", "x").as_deref(), Some("a/x"));
        assert_eq!(projection.resolve_local("a/", "b/y").as_deref(), Some("a/b/y"));
        assert_eq!(projection.resolve_local("a/", "z"), None);
        assert_eq!(projection.resolve_local("", "c/z").as_deref(), Some("c/z"));
    }

    #[test]
    fn test_teardown_stops_memoizing() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut getters = HashMap::new();
        getters.insert(
            "g".to_string(),
            counted("", ModulePath::root(), calls.clone(), |_, _| json!(1)),
        );
        let projection = Projection::new(getters);
        let log = DiagnosticLog::default();
        let state = Arc::new(json!({}));

        projection.teardown();
        projection.get("g", &state, &log);
        projection.get("g", &state, &log);
        assert!(projection.is_torn_down());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
