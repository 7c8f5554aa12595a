//! Namespaced key-value store scoped to one interaction
//!
//! Host callbacks registered through `getContext`/`onEnd` share state through
//! this store. Keys always live under a namespace so independent plugins
//! cannot clobber each other.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Namespace used when the host does not name one
pub const DEFAULT_NAMESPACE: &str = "default";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextStore {
    namespaces: BTreeMap<String, BTreeMap<String, Value>>,
}

impl ContextStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, namespace: &str, key: &str) -> Option<&Value> {
        self.namespaces.get(namespace).and_then(|ns| ns.get(key))
    }

    /// Set a value, returning the previous one
    pub fn set(
        &mut self,
        namespace: impl Into<String>,
        key: impl Into<String>,
        value: Value,
    ) -> Option<Value> {
        self.namespaces
            .entry(namespace.into())
            .or_default()
            .insert(key.into(), value)
    }

    pub fn remove(&mut self, namespace: &str, key: &str) -> Option<Value> {
        let ns = self.namespaces.get_mut(namespace)?;
        let removed = ns.remove(key);
        if ns.is_empty() {
            self.namespaces.remove(namespace);
        }
        removed
    }

    /// All entries of one namespace
    pub fn namespace(&self, namespace: &str) -> Option<&BTreeMap<String, Value>> {
        self.namespaces.get(namespace)
    }

    pub fn namespaces(&self) -> impl Iterator<Item = &str> {
        self.namespaces.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.namespaces.is_empty()
    }
}
