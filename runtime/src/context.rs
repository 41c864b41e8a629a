//! Module-local store view.
//!
//! A [`LocalContext`] is built for every installed module. Within a
//! namespaced module, commit and dispatch prefix the type with the module's
//! namespace unless the root option is set; state is re-read from the live
//! tree on every access and getters resolve local names. Modules without a
//! namespace get a context that forwards to the store unchanged.

use crate::projection::Getters;
use crate::store::{Store, StoreInner};
use arbor_core::context::{BoxFuture, Scope};
use arbor_core::diagnostic::Diagnostic;
use arbor_core::error::StoreError;
use arbor_core::event::{CallType, CommitOptions, DispatchOptions};
use arbor_core::path::{ModulePath, nested_state};
use futures_util::future;
use serde_json::Value;
use std::sync::{Arc, Weak};

#[derive(Clone)]
pub struct LocalContext {
    store: Weak<StoreInner>,
    namespace: String,
    path: ModulePath,
}

impl LocalContext {
    pub(crate) fn new(store: Weak<StoreInner>, namespace: String, path: ModulePath) -> Self {
        Self {
            store,
            namespace,
            path,
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn path(&self) -> &ModulePath {
        &self.path
    }

    fn store(&self) -> Result<Store, StoreError> {
        self.store
            .upgrade()
            .map(Store::from_inner)
            .ok_or(StoreError::StoreDropped)
    }

    pub fn commit(&self, call: impl Into<CallType>, payload: Value) -> Result<(), StoreError> {
        self.commit_with(call, payload, CommitOptions::default())
    }

    pub fn commit_with(
        &self,
        call: impl Into<CallType>,
        payload: Value,
        options: CommitOptions,
    ) -> Result<(), StoreError> {
        let store = self.store()?;
        if self.namespace.is_empty() {
            return store.commit_with(call, payload, options);
        }

        let mut record = call.into().normalize(payload)?;
        if !options.root {
            let global = format!("{}{}", self.namespace, record.kind);
            if !store.inner().registry().mutations.contains_key(&global) {
                store.inner().report(Diagnostic::UnknownLocalMutation {
                    local: record.kind,
                    global,
                });
                return Ok(());
            }
            record.kind = global;
        }
        store.commit_with(CallType::Named(record.kind), record.payload, options)
    }

    pub fn dispatch(
        &self,
        call: impl Into<CallType>,
        payload: Value,
    ) -> BoxFuture<'static, Result<Value, StoreError>> {
        self.dispatch_with(call, payload, DispatchOptions::default())
    }

    pub fn dispatch_with(
        &self,
        call: impl Into<CallType>,
        payload: Value,
        options: DispatchOptions,
    ) -> BoxFuture<'static, Result<Value, StoreError>> {
        let store = match self.store() {
            Ok(store) => store,
            Err(err) => return Box::pin(future::ready(Err(err))),
        };
        if self.namespace.is_empty() {
            return store.dispatch(call, payload);
        }

        let mut record = match call.into().normalize(payload) {
            Ok(record) => record,
            Err(err) => return Box::pin(future::ready(Err(err))),
        };
        if !options.root {
            let global = format!("{}{}", self.namespace, record.kind);
            if !store.inner().registry().actions.contains_key(&global) {
                store.inner().report(Diagnostic::UnknownLocalAction {
                    local: record.kind,
                    global,
                });
                return Box::pin(future::ready(Ok(Value::Null)));
            }
            record.kind = global;
        }
        store.dispatch(CallType::Named(record.kind), record.payload)
    }

    /// The module's state as currently mounted. `null` once the module is gone.
    pub fn state(&self) -> Value {
        let Some(store) = self.store.upgrade() else {
            return Value::Null;
        };
        let root = store.state.snapshot();
        nested_state(&root, &self.path)
            .cloned()
            .unwrap_or(Value::Null)
    }

    /// Getters visible from this module, addressed by local name.
    pub fn getters(&self) -> Getters {
        Getters::new(self.store.clone(), self.namespace.clone())
    }
}

impl Scope for LocalContext {
    fn commit(&self, call: CallType, payload: Value, options: CommitOptions) -> Result<(), StoreError> {
        self.commit_with(call, payload, options)
    }

    fn dispatch(
        &self,
        call: CallType,
        payload: Value,
        options: DispatchOptions,
    ) -> BoxFuture<'static, Result<Value, StoreError>> {
        self.dispatch_with(call, payload, options)
    }

    fn state(&self) -> Value {
        LocalContext::state(self)
    }

    fn getter(&self, name: &str) -> Option<Value> {
        self.getters().get(name)
    }

    fn root_state(&self) -> Arc<Value> {
        match self.store.upgrade() {
            Some(store) => store.state.snapshot(),
            None => Arc::new(Value::Null),
        }
    }

    fn root_getter(&self, name: &str) -> Option<Value> {
        self.store.upgrade()?.read_getter(name)
    }
}

impl std::fmt::Debug for LocalContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalContext")
            .field("namespace", &self.namespace)
            .field("path", &self.path)
            .finish()
    }
}
