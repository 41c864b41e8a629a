//! Reactive watchers.
//!
//! A watcher pairs a selector over `(state, getters)` with a callback. The
//! store re-runs every selector synchronously after each state change
//! (commit, state replacement, reinstallation) and invokes the callback only
//! when the selected value differs from the previous one. Values are compared
//! structurally, so changes deep inside the selection are seen.

use crate::projection::Getters;
use parking_lot::Mutex;
use serde_json::Value;

pub type Selector = dyn Fn(&Value, &Getters) -> Value + Send + Sync;
pub type WatchCallback = dyn Fn(&Value, &Value) + Send + Sync;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatchOptions {
    /// Invoke the callback once at registration with `(current, null)`.
    pub immediate: bool,
}

impl WatchOptions {
    pub fn immediate() -> Self {
        Self { immediate: true }
    }
}

pub(crate) struct Watcher {
    selector: Box<Selector>,
    callback: Box<WatchCallback>,
    last: Mutex<Value>,
}

impl Watcher {
    pub(crate) fn new(
        selector: Box<Selector>,
        callback: Box<WatchCallback>,
        state: &Value,
        getters: &Getters,
        options: WatchOptions,
    ) -> Self {
        let initial = selector(state, getters);
        if options.immediate {
            callback(&initial, &Value::Null);
        }
        Self {
            selector,
            callback,
            last: Mutex::new(initial),
        }
    }

    /// Re-run the selector; fire the callback if the selection changed.
    pub(crate) fn check(&self, state: &Value, getters: &Getters) {
        let next = (self.selector)(state, getters);
        let previous = {
            let mut last = self.last.lock();
            if *last == next {
                return;
            }
            std::mem::replace(&mut *last, next.clone())
        };
        (self.callback)(&next, &previous);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::{Arc, Weak};

    fn detached() -> Getters {
        Getters::new(Weak::new(), String::new())
    }

    #[test]
    fn test_fires_only_on_change() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let watcher = Watcher::new(
            Box::new(|state, _| state["n"].clone()),
            Box::new(move |new, old| sink.lock().push((new.clone(), old.clone()))),
            &json!({ "n": 1 }),
            &detached(),
            WatchOptions::default(),
        );

        watcher.check(&json!({ "n": 1, "other": true }), &detached());
        watcher.check(&json!({ "n": 2 }), &detached());

        assert_eq!(*seen.lock(), vec![(json!(2), json!(1))]);
    }

    #[test]
    fn test_immediate_fires_at_registration() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let _watcher = Watcher::new(
            Box::new(|state, _| state["n"].clone()),
            Box::new(move |new, old| sink.lock().push((new.clone(), old.clone()))),
            &json!({ "n": 7 }),
            &detached(),
            WatchOptions::immediate(),
        );
        assert_eq!(*seen.lock(), vec![(json!(7), Value::Null)]);
    }
}
