//! Devtools bridge.
//!
//! A [`DevtoolBridge`] receives the store's state at installation, every
//! committed mutation with the post-commit state, and every rejected action
//! handler. It may travel back in time by replacing the whole state through
//! the [`TravelHandle`] it is given at initialization.
//!
//! [`ChannelBridge`] publishes the same events on a tokio broadcast channel
//! for an out-of-process inspector to consume.

use crate::store::{Store, StoreInner};
use arbor_core::error::{ActionError, StoreError};
use arbor_core::event::MutationRecord;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use std::sync::{Arc, Weak};
use tokio::sync::broadcast;
use uuid::Uuid;

pub trait DevtoolBridge: Send + Sync + 'static {
    fn init(&self, handle: TravelHandle, state: &Value);

    fn mutation(&self, mutation: &MutationRecord, state: &Value);

    fn error(&self, error: &ActionError);
}

/// Weak handle back to the store, for time travel.
#[derive(Clone)]
pub struct TravelHandle {
    store: Weak<StoreInner>,
    store_id: Uuid,
}

impl TravelHandle {
    pub fn store_id(&self) -> Uuid {
        self.store_id
    }

    /// Replace the store's whole state, as [`Store::replace_state`] does.
    pub fn travel_to_state(&self, state: Value) -> Result<(), StoreError> {
        let store = self.store.upgrade().ok_or(StoreError::StoreDropped)?;
        Store::from_inner(store).replace_state(state);
        Ok(())
    }
}

impl std::fmt::Debug for TravelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TravelHandle")
            .field("store_id", &self.store_id)
            .finish()
    }
}

/// Connect `bridge` to `store`: emit `init`, forward every committed
/// mutation, and tap rejected action handlers.
pub fn devtool_plugin(store: &Store, bridge: Arc<dyn DevtoolBridge>) {
    store.inner().attach_devtools(bridge.clone());

    let handle = TravelHandle {
        store: Arc::downgrade(store.inner()),
        store_id: store.id(),
    };
    bridge.init(handle, &store.state());

    let forward = bridge;
    // lives as long as the store
    let _subscription = store.subscribe(move |mutation, state| forward.mutation(mutation, state));
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DevtoolEvent {
    Init { store: Uuid, state: Value },
    Mutation { mutation: MutationRecord, state: Value },
    Error { message: String },
}

/// Bridge that broadcasts [`DevtoolEvent`]s.
///
/// Events sent while nobody listens are dropped.
pub struct ChannelBridge {
    sender: broadcast::Sender<DevtoolEvent>,
    handle: Mutex<Option<TravelHandle>>,
}

impl ChannelBridge {
    pub fn new(capacity: usize) -> Arc<Self> {
        let (sender, _receiver) = broadcast::channel(capacity.max(1));
        Arc::new(Self {
            sender,
            handle: Mutex::new(None),
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DevtoolEvent> {
        self.sender.subscribe()
    }

    /// Time travel on behalf of a connected inspector.
    pub fn travel_to_state(&self, state: Value) -> Result<(), StoreError> {
        let handle = self.handle.lock().clone().ok_or(StoreError::StoreDropped)?;
        handle.travel_to_state(state)
    }

    fn publish(&self, event: DevtoolEvent) {
        if self.sender.send(event).is_err() {
            tracing::trace!("no devtools listener");
        }
    }
}

impl DevtoolBridge for ChannelBridge {
    fn init(&self, handle: TravelHandle, state: &Value) {
        let store = handle.store_id();
        *self.handle.lock() = Some(handle);
        self.publish(DevtoolEvent::Init {
            store,
            state: state.clone(),
        });
    }

    fn mutation(&self, mutation: &MutationRecord, state: &Value) {
        self.publish(DevtoolEvent::Mutation {
            mutation: mutation.clone(),
            state: state.clone(),
        });
    }

    fn error(&self, error: &ActionError) {
        self.publish(DevtoolEvent::Error {
            message: format!("{error:#}"),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StoreOptions;
    use arbor_core::module::RawModule;
    use serde_json::json;

    fn root() -> RawModule {
        RawModule::new()
            .state(json!({ "n": 0 }))
            .mutation("inc", |state, _| {
                state["n"] = json!(state["n"].as_i64().unwrap_or(0) + 1);
            })
            .action("fail", |_, _| async { Err(ActionError::msg("boom")) })
    }

    #[tokio::test]
    async fn test_bridge_sees_init_mutations_and_errors() {
        let bridge = ChannelBridge::new(16);
        let mut events = bridge.subscribe();
        let store = Store::new(StoreOptions::new(root()).devtools(bridge.clone()));

        store.commit("inc", Value::Null).unwrap();
        assert!(store.dispatch("fail", Value::Null).await.is_err());

        assert_eq!(
            events.recv().await.unwrap(),
            DevtoolEvent::Init {
                store: store.id(),
                state: json!({ "n": 0 }),
            }
        );
        match events.recv().await.unwrap() {
            DevtoolEvent::Mutation { mutation, state } => {
                assert_eq!(mutation.kind, "inc");
                assert_eq!(state, json!({ "n": 1 }));
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(
            events.recv().await.unwrap(),
            DevtoolEvent::Error {
                message: "boom".into()
            }
        );
    }

    #[test]
    fn test_travel_replaces_state() {
        let bridge = ChannelBridge::new(4);
        let store = Store::new(StoreOptions::new(root()).devtools(bridge.clone()));

        bridge.travel_to_state(json!({ "n": 42 })).unwrap();
        assert_eq!(store.state()["n"], 42);
    }

    #[test]
    fn test_disabled_devtools_skip_bridge() {
        let bridge = ChannelBridge::new(4);
        let mut events = bridge.subscribe();
        let options = StoreOptions::new(root())
            .config(arbor_core::StoreConfig::default().devtools(false))
            .devtools(bridge.clone());
        let _store = Store::new(options);

        assert!(events.try_recv().is_err());
        assert!(bridge.travel_to_state(json!({})).is_err());
    }
}
