//! Handler-facing view of a module.
//!
//! Action handlers receive an [`ActionContext`]: commit, dispatch, state and
//! getters scoped to the module that declared the action, plus root-level
//! state and getters. The store runtime supplies the scoping by implementing
//! [`Scope`].

use crate::error::StoreError;
use crate::event::{CallType, CommitOptions, DispatchOptions};
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Type alias for async boxed futures returned by dispatch.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Namespace-scoped store operations for one module.
pub trait Scope: Send + Sync + 'static {
    fn commit(&self, call: CallType, payload: Value, options: CommitOptions) -> Result<(), StoreError>;

    fn dispatch(
        &self,
        call: CallType,
        payload: Value,
        options: DispatchOptions,
    ) -> BoxFuture<'static, Result<Value, StoreError>>;

    /// The module's own state, re-read from the live tree.
    fn state(&self) -> Value;

    /// A getter by local (un-namespaced) name.
    fn getter(&self, name: &str) -> Option<Value>;

    fn root_state(&self) -> Arc<Value>;

    /// A getter by fully qualified type.
    fn root_getter(&self, name: &str) -> Option<Value>;
}

/// First argument of every action handler.
#[derive(Clone)]
pub struct ActionContext {
    scope: Arc<dyn Scope>,
}

impl ActionContext {
    pub fn new(scope: Arc<dyn Scope>) -> Self {
        Self { scope }
    }

    pub fn commit(&self, call: impl Into<CallType>, payload: Value) -> Result<(), StoreError> {
        self.scope
            .commit(call.into(), payload, CommitOptions::default())
    }

    pub fn commit_with(
        &self,
        call: impl Into<CallType>,
        payload: Value,
        options: CommitOptions,
    ) -> Result<(), StoreError> {
        self.scope.commit(call.into(), payload, options)
    }

    pub fn dispatch(
        &self,
        call: impl Into<CallType>,
        payload: Value,
    ) -> BoxFuture<'static, Result<Value, StoreError>> {
        self.scope
            .dispatch(call.into(), payload, DispatchOptions::default())
    }

    pub fn dispatch_with(
        &self,
        call: impl Into<CallType>,
        payload: Value,
        options: DispatchOptions,
    ) -> BoxFuture<'static, Result<Value, StoreError>> {
        self.scope.dispatch(call.into(), payload, options)
    }

    pub fn state(&self) -> Value {
        self.scope.state()
    }

    pub fn getter(&self, name: &str) -> Option<Value> {
        self.scope.getter(name)
    }

    pub fn root_state(&self) -> Arc<Value> {
        self.scope.root_state()
    }

    pub fn root_getter(&self, name: &str) -> Option<Value> {
        self.scope.root_getter(name)
    }
}

impl std::fmt::Debug for ActionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionContext").finish_non_exhaustive()
    }
}
