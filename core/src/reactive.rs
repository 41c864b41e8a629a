//! Dependency-tracked reads over the state tree.
//!
//! Getters never see the raw state tree. They read it through a
//! [`StateReader`], which records every value it hands out together with
//! the JSON pointer it came from. A memoized getter stays valid for as long
//! as every recorded read would still return the same value; the first
//! differing read invalidates it. Getter-to-getter reads are recorded the
//! same way through [`GetterReader`].

use crate::path::escape_pointer_token;
use parking_lot::Mutex;
use serde_json::Value;

/// One read performed during a getter evaluation.
#[derive(Debug, Clone, PartialEq)]
pub enum Dependency {
    /// A state read. `value` is `None` when nothing was mounted at `pointer`.
    State {
        pointer: String,
        value: Option<Value>,
    },
    /// A read of another getter, by fully qualified type.
    Getter { kind: String, value: Value },
}

impl Dependency {
    /// Whether a state dependency still holds against `root`.
    ///
    /// Getter dependencies cannot be checked here; they always report `true`
    /// and must be revalidated by the owner of the getter registry.
    pub fn state_holds(&self, root: &Value) -> bool {
        match self {
            Dependency::State { pointer, value } => root.pointer(pointer) == value.as_ref(),
            Dependency::Getter { .. } => true,
        }
    }
}

/// Collects the dependencies of a single evaluation.
#[derive(Debug, Default)]
pub struct Tracker {
    deps: Mutex<Vec<Dependency>>,
}

impl Tracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, dependency: Dependency) {
        let mut deps = self.deps.lock();
        if !deps.contains(&dependency) {
            deps.push(dependency);
        }
    }

    pub fn into_dependencies(self) -> Vec<Dependency> {
        self.deps.into_inner()
    }
}

/// Read-only, dependency-recording view of a subtree of the state.
///
/// Navigation (`get`, `index`) records nothing; extracting a value
/// (`as_i64`, `value`, `len`, ...) records the value at the current pointer.
#[derive(Clone)]
pub struct StateReader<'a> {
    value: Option<&'a Value>,
    pointer: String,
    tracker: Option<&'a Tracker>,
}

impl<'a> StateReader<'a> {
    /// Reader that records into `tracker`. `pointer` locates `value` in the root tree.
    pub fn tracked(value: Option<&'a Value>, pointer: impl Into<String>, tracker: &'a Tracker) -> Self {
        Self {
            value,
            pointer: pointer.into(),
            tracker: Some(tracker),
        }
    }

    pub fn untracked(value: &'a Value) -> Self {
        Self {
            value: Some(value),
            pointer: String::new(),
            tracker: None,
        }
    }

    pub fn pointer(&self) -> &str {
        &self.pointer
    }

    pub fn get(&self, key: &str) -> StateReader<'a> {
        StateReader {
            value: self.value.and_then(|v| v.get(key)),
            pointer: format!("{}/{}", self.pointer, escape_pointer_token(key)),
            tracker: self.tracker,
        }
    }

    pub fn index(&self, index: usize) -> StateReader<'a> {
        StateReader {
            value: self.value.and_then(|v| v.get(index)),
            pointer: format!("{}/{}", self.pointer, index),
            tracker: self.tracker,
        }
    }

    fn touch(&self) -> Option<&'a Value> {
        if let Some(tracker) = self.tracker {
            tracker.record(Dependency::State {
                pointer: self.pointer.clone(),
                value: self.value.cloned(),
            });
        }
        self.value
    }

    /// Whole subtree at this position. Any change beneath it invalidates the reader's owner.
    pub fn value(&self) -> Option<&'a Value> {
        self.touch()
    }

    pub fn to_value(&self) -> Value {
        self.touch().cloned().unwrap_or(Value::Null)
    }

    pub fn exists(&self) -> bool {
        self.touch().is_some()
    }

    pub fn is_null(&self) -> bool {
        matches!(self.touch(), None | Some(Value::Null))
    }

    pub fn as_i64(&self) -> Option<i64> {
        self.touch().and_then(Value::as_i64)
    }

    pub fn as_u64(&self) -> Option<u64> {
        self.touch().and_then(Value::as_u64)
    }

    pub fn as_f64(&self) -> Option<f64> {
        self.touch().and_then(Value::as_f64)
    }

    pub fn as_bool(&self) -> Option<bool> {
        self.touch().and_then(Value::as_bool)
    }

    pub fn as_str(&self) -> Option<&'a str> {
        self.touch().and_then(Value::as_str)
    }

    /// Element count of an array or object, 0 otherwise.
    pub fn len(&self) -> usize {
        match self.touch() {
            Some(Value::Array(items)) => items.len(),
            Some(Value::Object(fields)) => fields.len(),
            _ => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Readers over the elements of an array. The array's length becomes a dependency.
    pub fn items(&self) -> Vec<StateReader<'a>> {
        match self.touch() {
            Some(Value::Array(items)) => (0..items.len()).map(|i| self.index(i)).collect(),
            _ => Vec::new(),
        }
    }

    /// Field names of an object, in declaration order.
    pub fn keys(&self) -> Vec<&'a str> {
        match self.touch() {
            Some(Value::Object(fields)) => fields.keys().map(String::as_str).collect(),
            _ => Vec::new(),
        }
    }
}

/// Getter lookup handed to getter functions.
///
/// Resolution (namespace scoping, memoization, dependency recording) is
/// supplied by the getter projection that built the reader.
pub struct GetterReader<'a> {
    resolve: &'a (dyn Fn(&str) -> Option<Value> + 'a),
}

impl<'a> GetterReader<'a> {
    pub fn new(resolve: &'a (dyn Fn(&str) -> Option<Value> + 'a)) -> Self {
        Self { resolve }
    }

    pub fn try_get(&self, name: &str) -> Option<Value> {
        (self.resolve)(name)
    }

    /// Value of the named getter, `null` if no such getter is visible.
    pub fn get(&self, name: &str) -> Value {
        self.try_get(name).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_reads_are_recorded_with_pointer() {
        let state = json!({ "a": { "x": 1, "y": 2 } });
        let tracker = Tracker::new();
        let reader = StateReader::tracked(Some(&state), "", &tracker);

        assert_eq!(reader.get("a").get("x").as_i64(), Some(1));
        assert_eq!(
            tracker.into_dependencies(),
            vec![Dependency::State {
                pointer: "/a/x".into(),
                value: Some(json!(1)),
            }]
        );
    }

    #[test]
    fn test_dependency_detects_change() {
        let before = json!({ "a": { "x": 1, "y": 2 } });
        let tracker = Tracker::new();
        StateReader::tracked(Some(&before), "", &tracker)
            .get("a")
            .get("x")
            .as_i64();
        let deps = tracker.into_dependencies();

        let unrelated = json!({ "a": { "x": 1, "y": 5 } });
        assert!(deps.iter().all(|d| d.state_holds(&unrelated)));

        let changed = json!({ "a": { "x": 3, "y": 2 } });
        assert!(!deps.iter().all(|d| d.state_holds(&changed)));
    }

    #[test]
    fn test_missing_field_becomes_dependency() {
        let before = json!({});
        let tracker = Tracker::new();
        let reader = StateReader::tracked(Some(&before), "", &tracker);
        assert!(!reader.get("late").exists());

        let deps = tracker.into_dependencies();
        assert!(deps[0].state_holds(&json!({})));
        assert!(!deps[0].state_holds(&json!({ "late": 1 })));
    }

    #[test]
    fn test_items_depend_on_array_shape() {
        let before = json!({ "todos": [{ "done": true }] });
        let tracker = Tracker::new();
        let reader = StateReader::tracked(Some(&before), "", &tracker);
        let done = reader
            .get("todos")
            .items()
            .iter()
            .filter(|t| t.get("done").as_bool() == Some(true))
            .count();
        assert_eq!(done, 1);

        let deps = tracker.into_dependencies();
        let grown = json!({ "todos": [{ "done": true }, { "done": true }] });
        assert!(!deps.iter().all(|d| d.state_holds(&grown)));
    }

    #[test]
    fn test_getter_reader_defaults_to_null() {
        let resolve = |name: &str| (name == "double").then(|| json!(4));
        let getters = GetterReader::new(&resolve);
        assert_eq!(getters.get("double"), json!(4));
        assert_eq!(getters.get("missing"), Value::Null);
    }
}
