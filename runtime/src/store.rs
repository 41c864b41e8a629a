//! The store.
//!
//! [`Store`] owns the module tree, the state root, the handler registries
//! and the getter projection. Every structural change (module registration,
//! unregistration, hot update) reinstalls the whole tree into fresh
//! registries and swaps in a new projection; the superseded projection is
//! torn down by the configured [`Scheduler`].
//!
//! Mutation handlers run with the state write lock held and must not call
//! back into the store. Action handlers, subscribers and watchers run with
//! no lock held.

use crate::bus::{ActionSubscriber, MutationSubscriber, SubscriberList, Unsubscribe};
use crate::context::LocalContext;
use crate::devtools::{DevtoolBridge, devtool_plugin};
use crate::installer::{Installer, Mount};
use crate::projection::{Getters, Projection};
use crate::registry::{Registry, WrappedAction};
use crate::scheduler::{Scheduler, TokioScheduler};
use crate::state::StateCell;
use crate::watch::{WatchOptions, Watcher};
use arbor_core::config::StoreConfig;
use arbor_core::context::{ActionContext, BoxFuture};
use arbor_core::diagnostic::{Diagnostic, DiagnosticEntry, DiagnosticLog, SubscriberPhase};
use arbor_core::error::StoreError;
use arbor_core::event::{ActionRecord, CallType, CommitOptions, MutationRecord};
use arbor_core::module::{ActionFuture, RawModule};
use arbor_core::path::{ModulePath, nested_state_mut};
use arbor_core::tree::ModuleTree;
use futures_util::TryFutureExt;
use futures_util::future::{self, try_join_all};
use parking_lot::RwLock;
use serde_json::Value;
use std::sync::Arc;
use tracing::Instrument;
use uuid::Uuid;

/// Runs once against the freshly built store.
pub type Plugin = Box<dyn FnOnce(&Store) + Send>;

/// Construction options for [`Store::new`].
pub struct StoreOptions {
    root: RawModule,
    config: StoreConfig,
    plugins: Vec<Plugin>,
    devtools: Option<Arc<dyn DevtoolBridge>>,
    scheduler: Arc<dyn Scheduler>,
}

impl StoreOptions {
    pub fn new(root: RawModule) -> Self {
        Self {
            root,
            config: StoreConfig::default(),
            plugins: Vec::new(),
            devtools: None,
            scheduler: Arc::new(TokioScheduler),
        }
    }

    pub fn config(mut self, config: StoreConfig) -> Self {
        self.config = config;
        self
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.config.strict = strict;
        self
    }

    pub fn plugin<F>(mut self, plugin: F) -> Self
    where
        F: FnOnce(&Store) + Send + 'static,
    {
        self.plugins.push(Box::new(plugin));
        self
    }

    /// Bridge attached at construction unless the config disables devtools.
    pub fn devtools(mut self, bridge: Arc<dyn DevtoolBridge>) -> Self {
        self.devtools = Some(bridge);
        self
    }

    pub fn scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.scheduler = scheduler;
        self
    }
}

impl std::fmt::Debug for StoreOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreOptions")
            .field("root", &self.root)
            .field("config", &self.config)
            .field("plugins", &self.plugins.len())
            .field("devtools", &self.devtools.is_some())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegisterOptions {
    /// Keep the current state; the module's declared state is not mounted.
    pub preserve_state: bool,
}

impl RegisterOptions {
    pub fn preserve_state() -> Self {
        Self {
            preserve_state: true,
        }
    }
}

pub(crate) struct StoreInner {
    id: Uuid,
    config: StoreConfig,
    pub(crate) state: StateCell,
    modules: RwLock<ModuleTree>,
    registry: RwLock<Arc<Registry>>,
    projection: RwLock<Arc<Projection>>,
    subscribers: Arc<SubscriberList<MutationSubscriber>>,
    action_subscribers: Arc<SubscriberList<ActionSubscriber>>,
    watchers: Arc<SubscriberList<Watcher>>,
    diagnostics: DiagnosticLog,
    devtools: RwLock<Option<Arc<dyn DevtoolBridge>>>,
    scheduler: Arc<dyn Scheduler>,
}

impl StoreInner {
    pub(crate) fn registry(&self) -> Arc<Registry> {
        self.registry.read().clone()
    }

    pub(crate) fn projection(&self) -> Arc<Projection> {
        self.projection.read().clone()
    }

    pub(crate) fn report(&self, diagnostic: Diagnostic) {
        self.diagnostics.report(diagnostic);
    }

    pub(crate) fn read_getter(&self, kind: &str) -> Option<Value> {
        let projection = self.projection();
        let state = self.state.snapshot();
        projection.get(kind, &state, &self.diagnostics)
    }

    pub(crate) fn read_local_getter(&self, namespace: &str, name: &str) -> Option<Value> {
        let projection = self.projection();
        let kind = projection.resolve_local(namespace, name)?;
        let state = self.state.snapshot();
        projection.get(&kind, &state, &self.diagnostics)
    }

    pub(crate) fn attach_devtools(&self, bridge: Arc<dyn DevtoolBridge>) {
        *self.devtools.write() = Some(bridge);
    }

    fn devtools(&self) -> Option<Arc<dyn DevtoolBridge>> {
        self.devtools.read().clone()
    }
}

/// A handle to a store. Clones share the same store.
#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

impl Store {
    pub fn new(options: StoreOptions) -> Self {
        let StoreOptions {
            root,
            config,
            plugins,
            devtools,
            scheduler,
        } = options;

        let tree = ModuleTree::new(&root);
        let initial = tree.root().state().clone();
        let inner = Arc::new(StoreInner {
            id: Uuid::new_v4(),
            state: StateCell::new(initial, config.strict),
            modules: RwLock::new(tree),
            registry: RwLock::new(Arc::default()),
            projection: RwLock::new(Arc::default()),
            subscribers: SubscriberList::new(),
            action_subscribers: SubscriberList::new(),
            watchers: SubscriberList::new(),
            diagnostics: DiagnosticLog::new(config.diagnostics_capacity),
            devtools: RwLock::new(None),
            scheduler,
            config,
        });

        let store = Store { inner };
        store.reinstall(Mount::All);
        tracing::debug!(
            store = %store.id(),
            strict = store.is_strict(),
            "store created"
        );

        for plugin in plugins {
            plugin(&store);
        }
        if store.inner.config.devtools {
            if let Some(bridge) = devtools {
                devtool_plugin(&store, bridge);
            }
        }
        store
    }

    pub(crate) fn from_inner(inner: Arc<StoreInner>) -> Self {
        Self { inner }
    }

    pub(crate) fn inner(&self) -> &Arc<StoreInner> {
        &self.inner
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    pub fn is_strict(&self) -> bool {
        self.inner.config.strict
    }

    /// Snapshot of the whole state tree.
    pub fn state(&self) -> Arc<Value> {
        self.inner.state.snapshot()
    }

    /// Root getter view, addressed by fully qualified type.
    pub fn getters(&self) -> Getters {
        Getters::new(Arc::downgrade(&self.inner), String::new())
    }

    pub fn getter(&self, kind: &str) -> Option<Value> {
        self.inner.read_getter(kind)
    }

    // --- commit ---

    pub fn commit(&self, call: impl Into<CallType>, payload: Value) -> Result<(), StoreError> {
        self.commit_with(call, payload, CommitOptions::default())
    }

    /// Run every mutation handler registered for the type, then notify
    /// subscribers with the post-commit state.
    ///
    /// An unknown type is diagnosed and ignored. A malformed object-style
    /// call is an error.
    pub fn commit_with(
        &self,
        call: impl Into<CallType>,
        payload: Value,
        options: CommitOptions,
    ) -> Result<(), StoreError> {
        let record = call.into().normalize(payload)?;
        let _span = tracing::debug_span!("Commit", arbor.mutation = %record.kind).entered();

        let registry = self.inner.registry();
        let Some(handlers) = registry.mutations.get(&record.kind) else {
            self.inner.report(Diagnostic::UnknownMutation { kind: record.kind });
            return Ok(());
        };

        let inner = &self.inner;
        inner.state.commit(|root| {
            for entry in handlers {
                match nested_state_mut(root, &entry.path) {
                    Some(local) => (entry.handler)(local, &record.payload),
                    None => inner.report(Diagnostic::UnmountedModuleState {
                        kind: record.kind.clone(),
                        path: entry.path.to_string(),
                    }),
                }
            }
        });
        drop(registry);

        let state = inner.state.snapshot();
        for subscriber in inner.subscribers.snapshot() {
            subscriber(&record, &state);
        }

        if options.silent {
            inner.report(Diagnostic::SilentOptionRemoved { kind: record.kind });
        }
        self.notify_watchers();
        Ok(())
    }

    // --- dispatch ---

    /// Dispatch an action.
    ///
    /// `before` subscribers and the handlers are invoked before this returns;
    /// the returned future resolves with the handler's result. With several
    /// handlers registered for the type they run concurrently and resolve to
    /// an array of their results in registration order, or to the first
    /// rejection. `after` subscribers run on success only.
    pub fn dispatch(
        &self,
        call: impl Into<CallType>,
        payload: Value,
    ) -> BoxFuture<'static, Result<Value, StoreError>> {
        let record = match call.into().normalize(payload) {
            Ok(record) => record,
            Err(err) => return Box::pin(future::ready(Err(err))),
        };

        let registry = self.inner.registry();
        let Some(handlers) = registry.actions.get(&record.kind) else {
            self.inner.report(Diagnostic::UnknownAction { kind: record.kind });
            return Box::pin(future::ready(Ok(Value::Null)));
        };

        self.run_action_hooks(&record, SubscriberPhase::Before);

        let mut pending: Vec<ActionFuture> = handlers
            .iter()
            .map(|entry| self.invoke_action(entry, record.payload.clone()))
            .collect();
        drop(registry);

        let joined: ActionFuture = if pending.len() == 1 {
            pending.swap_remove(0)
        } else {
            Box::pin(try_join_all(pending).map_ok(Value::Array))
        };

        let store = self.clone();
        let span = tracing::debug_span!("Dispatch", arbor.action = %record.kind);
        Box::pin(
            async move {
                let result = joined.await?;
                store.run_action_hooks(&record, SubscriberPhase::After);
                Ok::<Value, StoreError>(result)
            }
            .instrument(span),
        )
    }

    fn invoke_action(&self, entry: &WrappedAction, payload: Value) -> ActionFuture {
        let context = ActionContext::new(Arc::new(entry.context.clone()));
        let running = (entry.handler)(context, payload);
        match self.inner.devtools() {
            Some(bridge) => Box::pin(async move { running.await.inspect_err(|err| bridge.error(err)) }),
            None => running,
        }
    }

    /// Run one phase of action subscribers. The first failing hook is
    /// diagnosed and ends the phase; the action itself is unaffected.
    fn run_action_hooks(&self, record: &ActionRecord, phase: SubscriberPhase) {
        let subscribers = self.inner.action_subscribers.snapshot();
        if subscribers.is_empty() {
            return;
        }
        let state = self.inner.state.snapshot();
        for subscriber in subscribers {
            let hook = match phase {
                SubscriberPhase::Before => subscriber.before.as_ref(),
                SubscriberPhase::After => subscriber.after.as_ref(),
            };
            let Some(hook) = hook else {
                continue;
            };
            if let Err(err) = hook(record, &state) {
                self.inner.report(Diagnostic::SubscriberFailed {
                    phase,
                    kind: record.kind.clone(),
                    message: format!("{err:#}"),
                });
                break;
            }
        }
    }

    // --- subscriptions ---

    /// Called after every commit with the mutation and the post-commit state.
    pub fn subscribe<F>(&self, subscriber: F) -> Unsubscribe
    where
        F: Fn(&MutationRecord, &Value) + Send + Sync + 'static,
    {
        self.inner.subscribers.subscribe(Arc::new(subscriber))
    }

    /// Subscribe a shared callback. Subscribing the same `Arc` twice is a no-op.
    pub fn subscribe_shared(&self, subscriber: Arc<MutationSubscriber>) -> Unsubscribe {
        self.inner.subscribers.subscribe(subscriber)
    }

    /// A bare function subscribes as a `before` hook.
    ///
    /// Subscribing a subscriber whose hooks are already subscribed (a clone,
    /// for instance) is a no-op.
    pub fn subscribe_action(&self, subscriber: impl Into<ActionSubscriber>) -> Unsubscribe {
        self.inner
            .action_subscribers
            .subscribe_by(Arc::new(subscriber.into()), |a, b| a.same_hooks(b))
    }

    pub fn watch<S, C>(&self, selector: S, callback: C, options: WatchOptions) -> Unsubscribe
    where
        S: Fn(&Value, &Getters) -> Value + Send + Sync + 'static,
        C: Fn(&Value, &Value) + Send + Sync + 'static,
    {
        let watcher = Watcher::new(
            Box::new(selector),
            Box::new(callback),
            &self.state(),
            &self.getters(),
            options,
        );
        self.inner.watchers.subscribe(Arc::new(watcher))
    }

    fn notify_watchers(&self) {
        let watchers = self.inner.watchers.snapshot();
        if watchers.is_empty() {
            return;
        }
        let getters = self.getters();
        for watcher in watchers {
            // a callback may have committed
            let state = self.inner.state.snapshot();
            watcher.check(&state, &getters);
        }
    }

    // --- state ---

    /// Swap the whole state tree. Counts as a commit for strict mode.
    pub fn replace_state(&self, state: Value) {
        let inner = &self.inner;
        inner.state.replace(state);
        self.notify_watchers();
    }

    /// Write to the state tree directly, bypassing mutations. Strict mode
    /// reports any change made this way.
    pub fn with_state_mut<R>(&self, f: impl FnOnce(&mut Value) -> R) -> R {
        let result = self.inner.state.write(&self.inner.diagnostics, f);
        self.notify_watchers();
        result
    }

    // --- modules ---

    pub fn register_module(
        &self,
        path: impl Into<ModulePath>,
        module: RawModule,
    ) -> Result<(), StoreError> {
        self.register_module_with(path, module, RegisterOptions::default())
    }

    /// Add a module below an existing one and reinstall. The module's state
    /// is mounted under its key unless `preserve_state` is set.
    pub fn register_module_with(
        &self,
        path: impl Into<ModulePath>,
        module: RawModule,
        options: RegisterOptions,
    ) -> Result<(), StoreError> {
        let path = path.into();
        if path.is_root() {
            return Err(StoreError::RootRegistration);
        }
        self.inner.modules.write().register(&path, &module, true)?;

        tracing::debug!(path = %path, preserve_state = options.preserve_state, "module registered");
        let mount = if options.preserve_state {
            Mount::Nothing
        } else {
            Mount::Subtree(path)
        };
        self.reinstall(mount);
        Ok(())
    }

    /// Remove a module registered at runtime, together with its state.
    ///
    /// Modules from the initial construction stay in place; the attempt is
    /// diagnosed.
    pub fn unregister_module(&self, path: impl Into<ModulePath>) -> Result<(), StoreError> {
        let path = path.into();
        if !self.inner.modules.write().unregister(&path)? {
            self.inner.report(Diagnostic::UnregisterStaticModule {
                path: path.to_string(),
            });
            return Ok(());
        }

        let inner = &self.inner;
        if let (Some(parent), Some(key)) = (path.parent(), path.key()) {
            inner.state.commit(|root| {
                if let Some(fields) = nested_state_mut(root, &parent).and_then(|v| v.as_object_mut()) {
                    fields.remove(key);
                }
            });
        }

        tracing::debug!(path = %path, "module unregistered");
        self.reinstall(Mount::Nothing);
        Ok(())
    }

    pub fn has_module(&self, path: impl Into<ModulePath>) -> bool {
        self.inner.modules.read().contains(&path.into())
    }

    /// Swap handler declarations in place; state is kept.
    pub fn hot_update(&self, root: RawModule) {
        let diagnostics = self.inner.modules.write().update(&root);
        for diagnostic in diagnostics {
            self.inner.report(diagnostic);
        }
        self.reinstall(Mount::Nothing);
    }

    fn reinstall(&self, mount: Mount) {
        let registry = {
            let tree = self.inner.modules.read();
            Installer {
                store: Arc::downgrade(&self.inner),
                state: &self.inner.state,
                diagnostics: &self.inner.diagnostics,
            }
            .install(&tree, &mount)
        };

        let projection = Arc::new(Projection::new(registry.getters.clone()));
        *self.inner.registry.write() = Arc::new(registry);
        let previous = std::mem::replace(&mut *self.inner.projection.write(), projection);
        self.inner
            .scheduler
            .defer(Box::new(move || previous.teardown()));

        self.notify_watchers();
    }

    /// Local view of the module registered under `namespace` (`""` for the root).
    pub fn module_context(&self, namespace: &str) -> Option<LocalContext> {
        let registry = self.inner.registry();
        if namespace.is_empty() {
            return registry.contexts.get(&ModulePath::root()).cloned();
        }
        registry.context_for_namespace(namespace).cloned()
    }

    // --- introspection ---

    pub fn mutation_types(&self) -> Vec<String> {
        self.inner.registry().mutation_types()
    }

    pub fn action_types(&self) -> Vec<String> {
        self.inner.registry().action_types()
    }

    pub fn diagnostics(&self) -> Vec<DiagnosticEntry> {
        self.inner.diagnostics.entries()
    }

    pub fn take_diagnostics(&self) -> Vec<Diagnostic> {
        self.inner.diagnostics.take()
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("id", &self.inner.id)
            .field("strict", &self.inner.config.strict)
            .field("subscribers", &self.inner.subscribers.len())
            .field("action_subscribers", &self.inner.action_subscribers.len())
            .field("watchers", &self.inner.watchers.len())
            .field("modules", &*self.inner.modules.read())
            .finish()
    }
}
