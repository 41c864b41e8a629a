//! Module installation.
//!
//! Walks the module tree and produces a fresh [`Registry`]: every mutation,
//! action and getter registered under its namespace-qualified type, a local
//! context per module, and the namespace map. Nodes selected by the
//! [`Mount`] policy also have their initial state written into the parent's
//! state under the node's key.

use crate::context::LocalContext;
use crate::registry::{Registry, WrappedAction, WrappedGetter, WrappedMutation};
use crate::state::StateCell;
use crate::store::StoreInner;
use arbor_core::diagnostic::{Diagnostic, DiagnosticLog};
use arbor_core::path::{ModulePath, nested_state_mut};
use arbor_core::tree::{ModuleNode, ModuleTree};
use std::sync::Weak;

/// Which nodes get their state mounted during an installation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Mount {
    /// Store construction: every node.
    All,
    /// A freshly registered module and its descendants.
    Subtree(ModulePath),
    /// Hot update, unregistration, registration preserving state.
    Nothing,
}

impl Mount {
    fn covers(&self, path: &ModulePath) -> bool {
        match self {
            Mount::All => true,
            Mount::Subtree(root) => path.starts_with(root),
            Mount::Nothing => false,
        }
    }
}

pub(crate) struct Installer<'a> {
    pub(crate) store: Weak<StoreInner>,
    pub(crate) state: &'a StateCell,
    pub(crate) diagnostics: &'a DiagnosticLog,
}

impl Installer<'_> {
    pub(crate) fn install(&self, tree: &ModuleTree, mount: &Mount) -> Registry {
        let mut registry = Registry::default();
        tree.walk(|path, node| {
            // walk only yields paths that exist
            let Ok(namespace) = tree.namespace(path) else {
                return;
            };
            self.install_module(&mut registry, path, node, namespace, mount);
        });
        tracing::debug!(
            mutations = registry.mutations.len(),
            actions = registry.actions.len(),
            getters = registry.getters.len(),
            "installed module tree"
        );
        registry
    }

    fn install_module(
        &self,
        registry: &mut Registry,
        path: &ModulePath,
        node: &ModuleNode,
        namespace: String,
        mount: &Mount,
    ) {
        if node.is_namespaced() {
            registry.register_namespace(namespace.clone(), path, self.diagnostics);
        }

        if !path.is_root() && mount.covers(path) {
            self.mount_state(path, node);
        }

        let context = LocalContext::new(self.store.clone(), namespace.clone(), path.clone());
        registry.contexts.insert(path.clone(), context.clone());

        for (key, handler) in node.mutations().iter() {
            registry.register_mutation(
                format!("{namespace}{key}"),
                WrappedMutation {
                    path: path.clone(),
                    handler: handler.clone(),
                },
            );
        }

        for (key, decl) in node.actions().iter() {
            let kind = if decl.root {
                key.to_string()
            } else {
                format!("{namespace}{key}")
            };
            registry.register_action(
                kind,
                WrappedAction {
                    context: context.clone(),
                    handler: decl.handler.clone(),
                },
            );
        }

        for (key, handler) in node.getters().iter() {
            registry.register_getter(
                format!("{namespace}{key}"),
                WrappedGetter {
                    namespace: namespace.clone(),
                    path: path.clone(),
                    handler: handler.clone(),
                },
                self.diagnostics,
            );
        }
    }

    /// Write the node's initial state into its parent, as a commit.
    fn mount_state(&self, path: &ModulePath, node: &ModuleNode) {
        let (Some(parent), Some(key)) = (path.parent(), path.key()) else {
            return;
        };
        let module_state = node.state().clone();
        let diagnostics = self.diagnostics;

        self.state.commit(|root| {
            let Some(fields) = nested_state_mut(root, &parent).and_then(|v| v.as_object_mut())
            else {
                tracing::warn!(path = %path, "parent state is not an object; module state not mounted");
                return;
            };
            if fields.contains_key(key) {
                diagnostics.report(Diagnostic::StateFieldOverridden {
                    key: key.to_string(),
                    path: parent.segments().join("."),
                });
            }
            fields.insert(key.to_string(), module_state);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_core::module::RawModule;
    use serde_json::{Value, json};

    fn tree() -> ModuleTree {
        let inner = RawModule::new()
            .namespaced(true)
            .state(json!({ "y": 0 }))
            .mutation("set", |_, _| {})
            .getter("g", |_, _, _, _| Value::Null);
        let plain = RawModule::new()
            .state(json!({ "z": 0 }))
            .mutation("touch", |_, _| {})
            .module("inner", inner);
        let a = RawModule::new()
            .namespaced(true)
            .state(json!({ "x": 1 }))
            .mutation("inc", |_, _| {})
            .root_action("global", |_, _| async { Ok(Value::Null) })
            .module("plain", plain);
        ModuleTree::new(&RawModule::new().state(json!({})).module("a", a))
    }

    fn install(tree: &ModuleTree, state: &StateCell, log: &DiagnosticLog, mount: Mount) -> Registry {
        Installer {
            store: Weak::new(),
            state,
            diagnostics: log,
        }
        .install(tree, &mount)
    }

    #[test]
    fn test_types_concatenate_namespaces() {
        let tree = tree();
        let state = StateCell::new(json!({}), false);
        let log = DiagnosticLog::default();
        let registry = install(&tree, &state, &log, Mount::All);

        assert_eq!(
            registry.mutation_types(),
            vec!["a/inc", "a/inner/set", "a/touch"]
        );
        assert_eq!(registry.action_types(), vec!["global"]);
        assert!(registry.getters.contains_key("a/inner/g"));
        assert_eq!(
            registry.namespaces["a/inner/"],
            ModulePath::from(["a", "plain", "inner"])
        );
    }

    #[test]
    fn test_mount_all_builds_state_tree() {
        let tree = tree();
        let state = StateCell::new(json!({}), true);
        let log = DiagnosticLog::default();
        install(&tree, &state, &log, Mount::All);

        assert_eq!(
            *state.snapshot(),
            json!({ "a": { "x": 1, "plain": { "z": 0, "inner": { "y": 0 } } } })
        );
        assert!(log.take().is_empty());
    }

    #[test]
    fn test_mount_nothing_leaves_state() {
        let tree = tree();
        let state = StateCell::new(json!({ "kept": true }), false);
        let log = DiagnosticLog::default();
        install(&tree, &state, &log, Mount::Nothing);
        assert_eq!(*state.snapshot(), json!({ "kept": true }));
    }

    #[test]
    fn test_overridden_field_is_reported() {
        let tree = tree();
        let state = StateCell::new(json!({ "a": "taken" }), false);
        let log = DiagnosticLog::default();
        install(&tree, &state, &log, Mount::All);

        assert_eq!(state.snapshot()["a"]["x"], 1);
        assert_eq!(
            log.take(),
            vec![Diagnostic::StateFieldOverridden {
                key: "a".into(),
                path: String::new(),
            }]
        );
    }

    #[test]
    fn test_subtree_covers_descendants_only() {
        let mount = Mount::Subtree(ModulePath::from("a"));
        assert!(mount.covers(&ModulePath::from(["a", "plain"])));
        assert!(!mount.covers(&ModulePath::from("b")));
    }
}
