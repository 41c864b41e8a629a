//! Handler registries.
//!
//! Flat maps from fully qualified type to handlers, produced by the
//! installer from the module tree and replaced wholesale on every structural
//! change. Mutations and actions accumulate (several modules may register
//! the same qualified type); getters are unique per type.

use crate::context::LocalContext;
use arbor_core::diagnostic::{Diagnostic, DiagnosticLog};
use arbor_core::module::{ActionFn, GetterFn, MutationFn};
use arbor_core::path::ModulePath;
use std::collections::HashMap;

#[derive(Clone)]
pub(crate) struct WrappedMutation {
    /// Where the declaring module's state is mounted.
    pub(crate) path: ModulePath,
    pub(crate) handler: MutationFn,
}

#[derive(Clone)]
pub(crate) struct WrappedAction {
    pub(crate) context: LocalContext,
    pub(crate) handler: ActionFn,
}

#[derive(Clone)]
pub(crate) struct WrappedGetter {
    pub(crate) namespace: String,
    pub(crate) path: ModulePath,
    pub(crate) handler: GetterFn,
}

#[derive(Default)]
pub(crate) struct Registry {
    pub(crate) mutations: HashMap<String, Vec<WrappedMutation>>,
    pub(crate) actions: HashMap<String, Vec<WrappedAction>>,
    pub(crate) getters: HashMap<String, WrappedGetter>,
    /// Namespace of every namespaced module -> its path.
    pub(crate) namespaces: HashMap<String, ModulePath>,
    /// Local context of every installed module.
    pub(crate) contexts: HashMap<ModulePath, LocalContext>,
}

impl Registry {
    pub(crate) fn register_mutation(&mut self, kind: String, mutation: WrappedMutation) {
        self.mutations.entry(kind).or_default().push(mutation);
    }

    pub(crate) fn register_action(&mut self, kind: String, action: WrappedAction) {
        self.actions.entry(kind).or_default().push(action);
    }

    /// The first registration of a type wins; later ones are dropped and diagnosed.
    pub(crate) fn register_getter(
        &mut self,
        kind: String,
        getter: WrappedGetter,
        diagnostics: &DiagnosticLog,
    ) {
        if self.getters.contains_key(&kind) {
            diagnostics.report(Diagnostic::DuplicateGetter { kind });
            return;
        }
        self.getters.insert(kind, getter);
    }

    /// Record a namespaced module. A namespace claimed twice is diagnosed and
    /// then remapped to the later module.
    pub(crate) fn register_namespace(
        &mut self,
        namespace: String,
        path: &ModulePath,
        diagnostics: &DiagnosticLog,
    ) {
        if self.namespaces.contains_key(&namespace) {
            diagnostics.report(Diagnostic::DuplicateNamespace {
                namespace: namespace.clone(),
                path: path.to_string(),
            });
        }
        self.namespaces.insert(namespace, path.clone());
    }

    pub(crate) fn context_for_namespace(&self, namespace: &str) -> Option<&LocalContext> {
        let path = self.namespaces.get(namespace)?;
        self.contexts.get(path)
    }

    pub(crate) fn mutation_types(&self) -> Vec<String> {
        sorted_keys(self.mutations.keys())
    }

    pub(crate) fn action_types(&self) -> Vec<String> {
        sorted_keys(self.actions.keys())
    }
}

fn sorted_keys<'a>(keys: impl Iterator<Item = &'a String>) -> Vec<String> {
    let mut keys: Vec<String> = keys.cloned().collect();
    keys.sort();
    keys
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use std::sync::Arc;

    fn getter(namespace: &str) -> WrappedGetter {
        WrappedGetter {
            namespace: namespace.to_string(),
            path: ModulePath::root(),
            handler: Arc::new(|_, _, _, _| Value::Null),
        }
    }

    #[test]
    fn test_duplicate_getter_keeps_first() {
        let log = DiagnosticLog::default();
        let mut registry = Registry::default();
        registry.register_getter("a/g".into(), getter("a/"), &log);
        registry.register_getter("a/g".into(), getter("other/"), &log);

        assert_eq!(registry.getters["a/g"].namespace, "a/");
        assert_eq!(
            log.take(),
            vec![Diagnostic::DuplicateGetter { kind: "a/g".into() }]
        );
    }

    #[test]
    fn test_mutations_accumulate_in_order() {
        let mut registry = Registry::default();
        for key in ["x", "y"] {
            registry.register_mutation(
                "inc".into(),
                WrappedMutation {
                    path: ModulePath::from(key),
                    handler: Arc::new(|_, _| {}),
                },
            );
        }
        let paths: Vec<_> = registry.mutations["inc"]
            .iter()
            .map(|m| m.path.to_string())
            .collect();
        assert_eq!(paths, vec!["x", "y"]);
    }

    #[test]
    fn test_duplicate_namespace_is_reported() {
        let log = DiagnosticLog::default();
        let mut registry = Registry::default();
        registry.register_namespace("a/".into(), &ModulePath::from("a"), &log);
        registry.register_namespace("a/".into(), &ModulePath::from(["b", "a"]), &log);

        assert_eq!(registry.namespaces["a/"], ModulePath::from(["b", "a"]));
        assert_eq!(log.take().len(), 1);
    }
}
