//! Arbor facade crate.
//!
//! Re-exports the core declarations and the store runtime with a single entry
//! point. Declare modules with [`RawModule`], build a [`Store`] from
//! [`StoreOptions`], then commit mutations, dispatch actions and read getters.

pub use arbor_core as core;
pub use arbor_runtime as runtime;

pub use arbor_core::{
    ActionContext, ActionError, CommitOptions, Diagnostic, DispatchOptions, ModulePath, RawModule,
    StoreConfig, StoreError,
};
pub use arbor_core::telemetry::{init_stdout_tracing, try_init_stdout_tracing};
pub use arbor_runtime::{
    ActionSubscriber, ChannelBridge, DevtoolBridge, Getters, LocalContext, RegisterOptions, Store,
    StoreOptions, Unsubscribe, WatchOptions,
};

pub mod prelude {
    pub use arbor_core::prelude::*;
    pub use arbor_runtime::prelude::*;
}
