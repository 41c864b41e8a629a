//! # ModuleTree: Registered Module Hierarchy
//!
//! The tree mirrors the nesting of [`RawModule`] declarations. Each
//! [`ModuleNode`] keeps the handler tables currently in force for one module,
//! its initial state and its children, keyed and ordered as declared.
//!
//! Namespaces are derived from the tree, never stored: a module's namespace
//! is the concatenation of `key/` over every namespaced module on its path.

use crate::diagnostic::Diagnostic;
use crate::error::StoreError;
use crate::module::{ActionDecl, GetterFn, HandlerTable, MutationFn, RawModule};
use crate::path::ModulePath;
use serde_json::Value;

/// Separator appended after each namespaced key.
pub const NAMESPACE_SEPARATOR: char = '/';

pub struct ModuleNode {
    namespaced: bool,
    /// `true` for nodes added after construction; only these may be removed.
    runtime: bool,
    state: Value,
    mutations: HandlerTable<MutationFn>,
    actions: HandlerTable<ActionDecl>,
    getters: HandlerTable<GetterFn>,
    children: Vec<(String, ModuleNode)>,
}

impl ModuleNode {
    /// Build a node, and recursively its declared children, from `raw`.
    pub fn new(raw: &RawModule, runtime: bool) -> Self {
        let children = raw
            .modules
            .iter()
            .map(|(key, child)| (key.to_string(), ModuleNode::new(child, runtime)))
            .collect();

        Self {
            namespaced: raw.namespaced,
            runtime,
            state: raw.initial_state(),
            mutations: raw.mutations.clone().unwrap_or_default(),
            actions: raw.actions.clone().unwrap_or_default(),
            getters: raw.getters.clone().unwrap_or_default(),
            children,
        }
    }

    pub fn is_namespaced(&self) -> bool {
        self.namespaced
    }

    pub fn is_runtime(&self) -> bool {
        self.runtime
    }

    /// State the node was constructed with. The live value is in the store's state tree.
    pub fn state(&self) -> &Value {
        &self.state
    }

    pub fn mutations(&self) -> &HandlerTable<MutationFn> {
        &self.mutations
    }

    pub fn actions(&self) -> &HandlerTable<ActionDecl> {
        &self.actions
    }

    pub fn getters(&self) -> &HandlerTable<GetterFn> {
        &self.getters
    }

    pub fn child(&self, key: &str) -> Option<&ModuleNode> {
        self.children
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, node)| node)
    }

    pub fn child_mut(&mut self, key: &str) -> Option<&mut ModuleNode> {
        self.children
            .iter_mut()
            .find(|(k, _)| k == key)
            .map(|(_, node)| node)
    }

    pub fn children(&self) -> impl Iterator<Item = (&str, &ModuleNode)> {
        self.children.iter().map(|(key, node)| (key.as_str(), node))
    }

    /// Attach `node` under `key`, replacing any existing child with that key.
    pub fn add_child(&mut self, key: impl Into<String>, node: ModuleNode) {
        let key = key.into();
        match self.children.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = node,
            None => self.children.push((key, node)),
        }
    }

    pub fn remove_child(&mut self, key: &str) -> Option<ModuleNode> {
        let index = self.children.iter().position(|(k, _)| k == key)?;
        Some(self.children.remove(index).1)
    }

    /// Replace the namespaced flag and every handler table `raw` declares.
    /// Children and state are left untouched.
    pub fn update(&mut self, raw: &RawModule) {
        self.namespaced = raw.namespaced;
        if let Some(mutations) = &raw.mutations {
            self.mutations = mutations.clone();
        }
        if let Some(actions) = &raw.actions {
            self.actions = actions.clone();
        }
        if let Some(getters) = &raw.getters {
            self.getters = getters.clone();
        }
    }
}

impl std::fmt::Debug for ModuleNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleNode")
            .field("namespaced", &self.namespaced)
            .field("runtime", &self.runtime)
            .field("mutations", &self.mutations.keys().collect::<Vec<_>>())
            .field("actions", &self.actions.keys().collect::<Vec<_>>())
            .field("getters", &self.getters.keys().collect::<Vec<_>>())
            .field("children", &self.children)
            .finish()
    }
}

#[derive(Debug)]
pub struct ModuleTree {
    root: ModuleNode,
}

impl ModuleTree {
    /// Build the tree from the root declaration. Every node is static (`runtime = false`).
    pub fn new(raw_root: &RawModule) -> Self {
        Self {
            root: ModuleNode::new(raw_root, false),
        }
    }

    pub fn root(&self) -> &ModuleNode {
        &self.root
    }

    pub fn get(&self, path: &ModulePath) -> Result<&ModuleNode, StoreError> {
        path.segments()
            .iter()
            .try_fold(&self.root, |node, key| node.child(key))
            .ok_or_else(|| not_found(path))
    }

    pub fn get_mut(&mut self, path: &ModulePath) -> Result<&mut ModuleNode, StoreError> {
        let mut node = &mut self.root;
        for key in path.segments() {
            node = node.child_mut(key).ok_or_else(|| not_found(path))?;
        }
        Ok(node)
    }

    pub fn contains(&self, path: &ModulePath) -> bool {
        self.get(path).is_ok()
    }

    /// Namespace of the module at `path`, e.g. `"cart/items/"`.
    pub fn namespace(&self, path: &ModulePath) -> Result<String, StoreError> {
        let mut node = &self.root;
        let mut namespace = String::new();
        for key in path.segments() {
            node = node.child(key).ok_or_else(|| not_found(path))?;
            if node.namespaced {
                namespace.push_str(key);
                namespace.push(NAMESPACE_SEPARATOR);
            }
        }
        Ok(namespace)
    }

    /// Register `raw` (and its declared children) at `path`.
    ///
    /// An empty path replaces the root. Otherwise the parent must exist; an
    /// existing child under the same key is replaced.
    pub fn register(
        &mut self,
        path: &ModulePath,
        raw: &RawModule,
        runtime: bool,
    ) -> Result<(), StoreError> {
        let node = ModuleNode::new(raw, runtime);
        match (path.parent(), path.key()) {
            (Some(parent), Some(key)) => {
                self.get_mut(&parent)?.add_child(key, node);
            }
            _ => self.root = node,
        }
        Ok(())
    }

    /// Detach the module at `path`.
    ///
    /// Returns `Ok(false)`, leaving the tree unchanged, when the module was
    /// part of the initial construction.
    pub fn unregister(&mut self, path: &ModulePath) -> Result<bool, StoreError> {
        let (Some(parent_path), Some(key)) = (path.parent(), path.key()) else {
            return Ok(false);
        };
        let parent = self.get_mut(&parent_path)?;
        let runtime = parent.child(key).ok_or_else(|| not_found(path))?.runtime;
        if !runtime {
            return Ok(false);
        }
        parent.remove_child(key);
        Ok(true)
    }

    /// Hot-swap handler declarations across the existing tree.
    ///
    /// Matches `raw_root` against the current tree by key. A declared child
    /// with no counterpart in the tree cannot be added this way: a
    /// [`Diagnostic::HotUpdateNewModule`] is returned and its remaining
    /// siblings are left as they were.
    pub fn update(&mut self, raw_root: &RawModule) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();
        update_node(&ModulePath::root(), &mut self.root, raw_root, &mut diagnostics);
        diagnostics
    }

    /// Depth-first, pre-order walk in declaration order.
    pub fn walk<F>(&self, mut visit: F)
    where
        F: FnMut(&ModulePath, &ModuleNode),
    {
        fn walk_node<F>(path: &ModulePath, node: &ModuleNode, visit: &mut F)
        where
            F: FnMut(&ModulePath, &ModuleNode),
        {
            visit(path, node);
            for (key, child) in node.children() {
                walk_node(&path.child(key), child, visit);
            }
        }
        walk_node(&ModulePath::root(), &self.root, &mut visit);
    }
}

fn update_node(
    path: &ModulePath,
    target: &mut ModuleNode,
    raw: &RawModule,
    diagnostics: &mut Vec<Diagnostic>,
) {
    target.update(raw);

    for (key, raw_child) in raw.modules.iter() {
        let child_path = path.child(key);
        let Some(child) = target.child_mut(key) else {
            diagnostics.push(Diagnostic::HotUpdateNewModule {
                path: path.to_string(),
                key: key.to_string(),
            });
            return;
        };
        update_node(&child_path, child, raw_child, diagnostics);
    }
}

fn not_found(path: &ModulePath) -> StoreError {
    StoreError::PathNotFound {
        path: path.to_string(),
    }
}
