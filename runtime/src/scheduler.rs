//! Deferred work.
//!
//! A superseded getter projection is torn down only after the current
//! scheduling tick, so synchronous readers still holding it finish
//! undisturbed. The store asks a [`Scheduler`] to run the teardown.

pub type Task = Box<dyn FnOnce() + Send + 'static>;

pub trait Scheduler: Send + Sync + 'static {
    /// Run `task` after the current tick.
    fn defer(&self, task: Task);
}

/// Defers onto the ambient tokio runtime, after one `yield_now`.
///
/// Outside a runtime the task runs immediately.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioScheduler;

impl Scheduler for TokioScheduler {
    fn defer(&self, task: Task) {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    tokio::task::yield_now().await;
                    task();
                });
            }
            Err(_) => task(),
        }
    }
}

/// Runs every task inline.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImmediateScheduler;

impl Scheduler for ImmediateScheduler {
    fn defer(&self, task: Task) {
        task();
    }
}
