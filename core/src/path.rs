//! Module paths.
//!
//! A `ModulePath` is the ordered sequence of keys leading from the root module
//! to a nested module. The same path addresses the module's node in the
//! [`ModuleTree`](crate::tree::ModuleTree) and its mounted state in the
//! aggregate state tree.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModulePath(Vec<String>);

impl ModulePath {
    /// The empty path, addressing the root module.
    pub fn root() -> Self {
        Self(Vec::new())
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// Last segment: the key the module is mounted under in its parent.
    pub fn key(&self) -> Option<&str> {
        self.0.last().map(String::as_str)
    }

    /// Path of the parent module, `None` for the root.
    pub fn parent(&self) -> Option<ModulePath> {
        if self.0.is_empty() {
            return None;
        }
        Some(Self(self.0[..self.0.len() - 1].to_vec()))
    }

    pub fn child(&self, key: &str) -> ModulePath {
        let mut segments = self.0.clone();
        segments.push(key.to_string());
        Self(segments)
    }

    /// Whether `self` equals `prefix` or lies underneath it.
    pub fn starts_with(&self, prefix: &ModulePath) -> bool {
        self.0.starts_with(&prefix.0)
    }

    /// JSON pointer (RFC 6901) to this module's state inside the aggregate state tree.
    pub fn to_pointer(&self) -> String {
        self.0.iter().fold(String::new(), |mut acc, key| {
            acc.push('/');
            acc.push_str(&escape_pointer_token(key));
            acc
        })
    }
}

impl fmt::Display for ModulePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("/"))
    }
}

impl From<&str> for ModulePath {
    fn from(key: &str) -> Self {
        Self(vec![key.to_string()])
    }
}

impl From<String> for ModulePath {
    fn from(key: String) -> Self {
        Self(vec![key])
    }
}

impl From<Vec<String>> for ModulePath {
    fn from(segments: Vec<String>) -> Self {
        Self(segments)
    }
}

impl From<Vec<&str>> for ModulePath {
    fn from(segments: Vec<&str>) -> Self {
        Self(segments.into_iter().map(str::to_string).collect())
    }
}

impl From<&[&str]> for ModulePath {
    fn from(segments: &[&str]) -> Self {
        Self(segments.iter().map(|s| s.to_string()).collect())
    }
}

impl<const N: usize> From<[&str; N]> for ModulePath {
    fn from(segments: [&str; N]) -> Self {
        Self(segments.iter().map(|s| s.to_string()).collect())
    }
}

impl From<&ModulePath> for ModulePath {
    fn from(path: &ModulePath) -> Self {
        path.clone()
    }
}

/// Escape a single reference token for use in a JSON pointer.
pub fn escape_pointer_token(token: &str) -> String {
    token.replace('~', "~0").replace('/', "~1")
}

/// Walk `path` from `root`, returning the nested state mounted there.
pub fn nested_state<'a>(root: &'a Value, path: &ModulePath) -> Option<&'a Value> {
    path.segments()
        .iter()
        .try_fold(root, |state, key| state.get(key.as_str()))
}

/// Mutable counterpart of [`nested_state`].
pub fn nested_state_mut<'a>(root: &'a mut Value, path: &ModulePath) -> Option<&'a mut Value> {
    path.segments()
        .iter()
        .try_fold(root, |state, key| state.get_mut(key.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parent_and_key() {
        let path = ModulePath::from(["a", "b", "c"]);
        assert_eq!(path.key(), Some("c"));
        assert_eq!(path.parent(), Some(ModulePath::from(["a", "b"])));
        assert_eq!(ModulePath::root().parent(), None);
        assert_eq!(path.to_string(), "a/b/c");
    }

    #[test]
    fn test_pointer_escapes_separators() {
        let path = ModulePath::from(["a/b", "c~d"]);
        assert_eq!(path.to_pointer(), "/a~1b/c~0d");

        let state = json!({ "a/b": { "c~d": 3 } });
        assert_eq!(state.pointer(&path.to_pointer()), Some(&json!(3)));
    }

    #[test]
    fn test_nested_state_walks_keys() {
        let mut state = json!({ "cart": { "items": { "count": 2 } } });
        let path = ModulePath::from(["cart", "items"]);

        assert_eq!(nested_state(&state, &path), Some(&json!({ "count": 2 })));
        assert!(nested_state(&state, &ModulePath::from(["missing"])).is_none());

        if let Some(items) = nested_state_mut(&mut state, &path) {
            items["count"] = json!(3);
        }
        assert_eq!(state["cart"]["items"]["count"], 3);
    }

    #[test]
    fn test_starts_with() {
        let path = ModulePath::from(["a", "b"]);
        assert!(path.starts_with(&ModulePath::from("a")));
        assert!(path.starts_with(&ModulePath::root()));
        assert!(!path.starts_with(&ModulePath::from("b")));
    }
}
