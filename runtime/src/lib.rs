//! Arbor runtime: the [`Store`] and everything it runs on.

pub mod bus;
pub mod context;
pub mod devtools;
mod installer;
pub mod projection;
mod registry;
pub mod scheduler;
mod state;
pub mod store;
pub mod watch;

pub mod prelude {
    pub use crate::bus::{ActionSubscriber, Unsubscribe};
    pub use crate::context::LocalContext;
    pub use crate::projection::Getters;
    pub use crate::store::{RegisterOptions, Store, StoreOptions};
    pub use crate::watch::WatchOptions;
}

pub use bus::{ActionHook, ActionSubscriber, MutationSubscriber, Unsubscribe};
pub use context::LocalContext;
pub use devtools::{ChannelBridge, DevtoolBridge, DevtoolEvent, TravelHandle, devtool_plugin};
pub use projection::Getters;
pub use scheduler::{ImmediateScheduler, Scheduler, Task, TokioScheduler};
pub use store::{Plugin, RegisterOptions, Store, StoreOptions};
pub use watch::{Selector, WatchCallback, WatchOptions};
