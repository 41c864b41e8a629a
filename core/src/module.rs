//! Raw module declarations.
//!
//! A [`RawModule`] is what users author: initial state, mutation, action and
//! getter handlers, and nested child declarations. It is turned into a
//! [`ModuleNode`](crate::tree::ModuleNode) when registered.
//!
//! ```rust,ignore
//! let counter = RawModule::new()
//!     .namespaced(true)
//!     .state(json!({ "x": 1 }))
//!     .mutation("inc", |state, _| state["x"] = json!(state["x"].as_i64().unwrap_or(0) + 1))
//!     .getter("double", |state, _, _, _| json!(state.get("x").as_i64().unwrap_or(0) * 2));
//!
//! let root = RawModule::new().module("a", counter);
//! ```

use crate::context::{ActionContext, BoxFuture};
use crate::error::ActionError;
use crate::reactive::{GetterReader, StateReader};
use serde_json::{Map, Value};
use std::future::Future;
use std::sync::Arc;

/// `(local_state, payload)`. Runs synchronously inside a commit.
pub type MutationFn = Arc<dyn Fn(&mut Value, &Value) + Send + Sync>;

pub type ActionFuture = BoxFuture<'static, Result<Value, ActionError>>;

pub type ActionFn = Arc<dyn Fn(ActionContext, Value) -> ActionFuture + Send + Sync>;

/// `(local_state, local_getters, root_state, root_getters)`. Must be pure.
pub type GetterFn = Arc<
    dyn for<'a> Fn(&StateReader<'a>, &GetterReader<'a>, &StateReader<'a>, &GetterReader<'a>) -> Value
        + Send
        + Sync,
>;

/// Declared initial state.
#[derive(Clone)]
pub enum StateDecl {
    Value(Value),
    /// Called once per node construction, so a declaration registered
    /// repeatedly starts from fresh state each time.
    Factory(Arc<dyn Fn() -> Value + Send + Sync>),
}

impl StateDecl {
    pub fn resolve(&self) -> Value {
        match self {
            StateDecl::Value(value) => value.clone(),
            StateDecl::Factory(factory) => factory(),
        }
    }
}

#[derive(Clone)]
pub struct ActionDecl {
    /// Register under the bare key even inside a namespaced module.
    pub root: bool,
    pub handler: ActionFn,
}

/// Insertion-ordered `name -> handler` table. Re-declaring a name replaces
/// the handler in place.
#[derive(Clone)]
pub struct HandlerTable<T>(Vec<(String, T)>);

impl<T> HandlerTable<T> {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn insert(&mut self, name: impl Into<String>, handler: T) {
        let name = name.into();
        match self.0.iter_mut().find(|(key, _)| *key == name) {
            Some(slot) => slot.1 = handler,
            None => self.0.push((name, handler)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&T> {
        self.0.iter().find(|(key, _)| key == name).map(|(_, h)| h)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &T)> {
        self.0.iter().map(|(key, handler)| (key.as_str(), handler))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(key, _)| key.as_str())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<T> Default for HandlerTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// A module declaration.
///
/// Handler tables are optional: `None` means "not declared", which matters
/// for hot updates, where only declared tables replace the current ones.
#[derive(Clone, Default)]
pub struct RawModule {
    pub namespaced: bool,
    pub state: Option<StateDecl>,
    pub mutations: Option<HandlerTable<MutationFn>>,
    pub actions: Option<HandlerTable<ActionDecl>>,
    pub getters: Option<HandlerTable<GetterFn>>,
    pub modules: HandlerTable<RawModule>,
}

impl RawModule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn namespaced(mut self, namespaced: bool) -> Self {
        self.namespaced = namespaced;
        self
    }

    pub fn state(mut self, state: Value) -> Self {
        self.state = Some(StateDecl::Value(state));
        self
    }

    pub fn state_fn<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        self.state = Some(StateDecl::Factory(Arc::new(factory)));
        self
    }

    pub fn mutation<F>(mut self, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&mut Value, &Value) + Send + Sync + 'static,
    {
        self.mutations
            .get_or_insert_with(HandlerTable::new)
            .insert(name, Arc::new(handler) as MutationFn);
        self
    }

    /// Declare an asynchronous action.
    pub fn action<F, Fut>(self, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(ActionContext, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, ActionError>> + Send + 'static,
    {
        self.push_action(name, false, wrap_async(handler))
    }

    /// Declare an action registered under its bare name regardless of namespace.
    pub fn root_action<F, Fut>(self, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(ActionContext, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, ActionError>> + Send + 'static,
    {
        self.push_action(name, true, wrap_async(handler))
    }

    /// Declare an action whose handler completes synchronously. Its result is
    /// wrapped into an already-resolved future.
    pub fn action_sync<F>(self, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(ActionContext, Value) -> Result<Value, ActionError> + Send + Sync + 'static,
    {
        let handler: ActionFn = Arc::new(move |ctx: ActionContext, payload: Value| {
            let result = handler(ctx, payload);
            Box::pin(std::future::ready(result)) as ActionFuture
        });
        self.push_action(name, false, handler)
    }

    fn push_action(mut self, name: impl Into<String>, root: bool, handler: ActionFn) -> Self {
        self.actions
            .get_or_insert_with(HandlerTable::new)
            .insert(name, ActionDecl { root, handler });
        self
    }

    pub fn getter<F>(mut self, name: impl Into<String>, handler: F) -> Self
    where
        F: for<'a> Fn(&StateReader<'a>, &GetterReader<'a>, &StateReader<'a>, &GetterReader<'a>) -> Value
            + Send
            + Sync
            + 'static,
    {
        self.getters
            .get_or_insert_with(HandlerTable::new)
            .insert(name, Arc::new(handler) as GetterFn);
        self
    }

    pub fn module(mut self, key: impl Into<String>, child: RawModule) -> Self {
        self.modules.insert(key, child);
        self
    }

    /// Initial state for a new node: the declared state, or an empty object.
    pub fn initial_state(&self) -> Value {
        self.state
            .as_ref()
            .map(StateDecl::resolve)
            .unwrap_or_else(|| Value::Object(Map::new()))
    }
}

fn wrap_async<F, Fut>(handler: F) -> ActionFn
where
    F: Fn(ActionContext, Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, ActionError>> + Send + 'static,
{
    Arc::new(move |ctx: ActionContext, payload: Value| {
        Box::pin(handler(ctx, payload)) as ActionFuture
    })
}

impl std::fmt::Debug for RawModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawModule")
            .field("namespaced", &self.namespaced)
            .field("mutations", &declared_keys(self.mutations.as_ref()))
            .field("actions", &declared_keys(self.actions.as_ref()))
            .field("getters", &declared_keys(self.getters.as_ref()))
            .field("modules", &self.modules.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn declared_keys<T>(table: Option<&HandlerTable<T>>) -> Vec<&str> {
    table.map(|t| t.keys().collect()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicI64, Ordering};

    #[test]
    fn test_builder_keeps_declaration_order() {
        let raw = RawModule::new()
            .mutation("b", |_, _| {})
            .mutation("a", |_, _| {})
            .mutation("b", |_, _| {});
        let keys: Vec<_> = raw.mutations.as_ref().unwrap().keys().collect();
        assert_eq!(keys, vec!["b", "a"]);
    }

    #[test]
    fn test_undeclared_tables_stay_none() {
        let raw = RawModule::new().getter("g", |_, _, _, _| Value::Null);
        assert!(raw.mutations.is_none());
        assert!(raw.actions.is_none());
        assert_eq!(raw.getters.as_ref().map(HandlerTable::len), Some(1));
    }

    #[test]
    fn test_state_factory_runs_per_resolve() {
        let calls = Arc::new(AtomicI64::new(0));
        let counter = calls.clone();
        let raw = RawModule::new().state_fn(move || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            json!({ "n": n })
        });

        assert_eq!(raw.initial_state(), json!({ "n": 0 }));
        assert_eq!(raw.initial_state(), json!({ "n": 1 }));
    }

    #[test]
    fn test_missing_state_defaults_to_object() {
        assert_eq!(RawModule::new().initial_state(), json!({}));
    }

    #[test]
    fn test_root_action_flag() {
        let raw = RawModule::new()
            .root_action("global", |_, _| async { Ok(Value::Null) })
            .action("local", |_, _| async { Ok(Value::Null) });
        let actions = raw.actions.as_ref().unwrap();
        assert!(actions.get("global").unwrap().root);
        assert!(!actions.get("local").unwrap().root);
    }
}
