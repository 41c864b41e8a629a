//! Bus - Ordered Subscriber Lists
//!
//! The store keeps three subscriber lists: mutation subscribers, action
//! subscribers (`before`/`after` hooks) and watchers. All share the same
//! discipline:
//!
//! - an entry is appended once; subscribing the same `Arc` again is a no-op
//! - notification iterates a snapshot taken before the first callback runs,
//!   so callbacks may subscribe or unsubscribe freely without skipping or
//!   double-invoking anyone in the current pass

use arbor_core::event::{ActionRecord, MutationRecord};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::{Arc, Weak};

pub type MutationSubscriber = dyn Fn(&MutationRecord, &Value) + Send + Sync;

/// Action hook. An `Err` is logged by the store and never reaches the dispatcher.
pub type ActionHook = Arc<dyn Fn(&ActionRecord, &Value) -> anyhow::Result<()> + Send + Sync>;

/// Action subscriber with optional `before` and `after` hooks.
#[derive(Clone, Default)]
pub struct ActionSubscriber {
    pub before: Option<ActionHook>,
    pub after: Option<ActionHook>,
}

impl ActionSubscriber {
    pub fn before<F>(hook: F) -> Self
    where
        F: Fn(&ActionRecord, &Value) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self {
            before: Some(Arc::new(hook)),
            after: None,
        }
    }

    pub fn after<F>(hook: F) -> Self
    where
        F: Fn(&ActionRecord, &Value) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self {
            before: None,
            after: Some(Arc::new(hook)),
        }
    }

    pub fn with_before<F>(mut self, hook: F) -> Self
    where
        F: Fn(&ActionRecord, &Value) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.before = Some(Arc::new(hook));
        self
    }

    pub fn with_after<F>(mut self, hook: F) -> Self
    where
        F: Fn(&ActionRecord, &Value) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.after = Some(Arc::new(hook));
        self
    }
}

impl ActionSubscriber {
    /// Whether both subscribers carry the same hook allocations.
    pub fn same_hooks(&self, other: &ActionSubscriber) -> bool {
        same_hook(&self.before, &other.before) && same_hook(&self.after, &other.after)
    }
}

fn same_hook(a: &Option<ActionHook>, b: &Option<ActionHook>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => same_entry(a, b),
        (None, None) => true,
        _ => false,
    }
}

/// A bare function subscribes as a `before` hook.
impl<F> From<F> for ActionSubscriber
where
    F: Fn(&ActionRecord, &Value) -> anyhow::Result<()> + Send + Sync + 'static,
{
    fn from(hook: F) -> Self {
        ActionSubscriber::before(hook)
    }
}

/// Handle returned by every subscribe call.
///
/// Dropping it keeps the subscription alive; call [`Unsubscribe::unsubscribe`]
/// to remove the entry. Removing an entry that is already gone is a no-op.
#[must_use = "dropping the handle keeps the subscription; call `unsubscribe()` to remove it"]
pub struct Unsubscribe(Box<dyn FnOnce() + Send + Sync>);

impl Unsubscribe {
    pub(crate) fn new(remove: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self(Box::new(remove))
    }

    pub fn unsubscribe(self) {
        (self.0)()
    }
}

impl std::fmt::Debug for Unsubscribe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Unsubscribe")
    }
}

/// Ordered, snapshot-iterated subscriber list.
pub(crate) struct SubscriberList<T: ?Sized> {
    entries: Mutex<Vec<Arc<T>>>,
}

impl<T: ?Sized + Send + Sync + 'static> SubscriberList<T> {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            entries: Mutex::new(Vec::new()),
        })
    }

    /// Append `entry` unless the same allocation is already subscribed.
    pub(crate) fn subscribe(self: &Arc<Self>, entry: Arc<T>) -> Unsubscribe {
        self.subscribe_by(entry, same_entry)
    }

    /// Append `entry` unless an entry `same` as it is already subscribed.
    /// The returned handle removes whichever entry ended up in the list.
    pub(crate) fn subscribe_by(
        self: &Arc<Self>,
        entry: Arc<T>,
        same: fn(&Arc<T>, &Arc<T>) -> bool,
    ) -> Unsubscribe {
        let stored = {
            let mut entries = self.entries.lock();
            match entries.iter().find(|e| same(e, &entry)) {
                Some(existing) => existing.clone(),
                None => {
                    entries.push(entry.clone());
                    entry
                }
            }
        };

        let list: Weak<Self> = Arc::downgrade(self);
        Unsubscribe::new(move || {
            if let Some(list) = list.upgrade() {
                list.entries.lock().retain(|e| !same_entry(e, &stored));
            }
        })
    }

    pub(crate) fn snapshot(&self) -> Vec<Arc<T>> {
        self.entries.lock().clone()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.lock().len()
    }
}

fn same_entry<T: ?Sized>(a: &Arc<T>, b: &Arc<T>) -> bool {
    // Compare data pointers only; vtable pointers of the same closure may differ.
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}
