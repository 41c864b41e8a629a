//! Arbor core: the module tree, module declarations and the reactive
//! primitives the store runtime is built on.

pub mod config;
pub mod context;
pub mod diagnostic;
pub mod error;
pub mod event;
pub mod module;
pub mod path;
pub mod reactive;
pub mod telemetry;
pub mod tree;

pub use config::StoreConfig;
pub use context::{ActionContext, BoxFuture, Scope};
pub use diagnostic::{Diagnostic, DiagnosticEntry, DiagnosticLog, SubscriberPhase};
pub use error::{ActionError, ConfigError, StoreError};
pub use event::{ActionRecord, CallType, CommitOptions, DispatchOptions, MutationRecord, Record};
pub use module::{ActionDecl, ActionFn, GetterFn, MutationFn, RawModule, StateDecl};
pub use path::ModulePath;
pub use reactive::{Dependency, GetterReader, StateReader, Tracker};
pub use tree::{ModuleNode, ModuleTree};

pub mod prelude {
    pub use crate::config::StoreConfig;
    pub use crate::context::ActionContext;
    pub use crate::diagnostic::Diagnostic;
    pub use crate::error::{ActionError, StoreError};
    pub use crate::event::{CommitOptions, DispatchOptions, Record};
    pub use crate::module::RawModule;
    pub use crate::path::ModulePath;
    pub use crate::reactive::{GetterReader, StateReader};
}
