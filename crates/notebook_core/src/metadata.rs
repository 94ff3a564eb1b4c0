//! Namespaced metadata storage and cursors.
//!
//! # Responsibility
//! - Hold free-form metadata as serialized JSON text per namespace.
//! - Hand out cursors bound to a single namespace; cursor writes notify the
//!   owner with the namespace name only.
//!
//! # Invariants
//! - Stored values are never shared: every read parses a fresh copy.
//! - A write whose serialization equals the stored text is a no-op.
//! - Namespaces colliding with typed fields never reach the store.

use crate::error::{ModelError, ModelResult};
use log::warn;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::cell::RefCell;
use std::collections::BTreeMap;

/// Namespace → serialized JSON store owned by one model.
#[derive(Debug, Default)]
pub struct MetadataStore {
    entries: RefCell<BTreeMap<String, String>>,
}

impl MetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Namespace names in sorted order.
    pub fn names(&self) -> Vec<String> {
        self.entries.borrow().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    /// Binds a cursor to `name`. Callers check reserved names first.
    pub fn cursor<'a>(
        &'a self,
        name: impl Into<String>,
        on_change: impl Fn(&str) + 'a,
    ) -> MetadataCursor<'a> {
        MetadataCursor {
            name: name.into(),
            store: self,
            on_change: Box::new(on_change),
        }
    }

    /// Deserialized copy of every namespace.
    pub fn to_json_map(&self) -> Map<String, Value> {
        self.entries
            .borrow()
            .iter()
            .map(|(name, raw)| (name.clone(), parse_stored(name, raw)))
            .collect()
    }

    /// Copies namespaces of `other` into this store, silently, skipping
    /// `reserved` keys.
    pub fn copy_from(&self, other: &MetadataStore, reserved: &[&str]) {
        let source = other.entries.borrow().clone();
        self.entries.borrow_mut().extend(
            source
                .into_iter()
                .filter(|(name, _)| !reserved.contains(&name.as_str())),
        );
    }

    /// Loads namespaces from a JSON object, skipping `reserved` keys.
    pub fn load_json_map(&self, map: &Map<String, Value>, reserved: &[&str]) {
        let mut entries = self.entries.borrow_mut();
        for (name, value) in map {
            if reserved.contains(&name.as_str()) {
                continue;
            }
            entries.insert(name.clone(), value.to_string());
        }
    }

    pub fn clear(&self) {
        self.entries.borrow_mut().clear();
    }

    fn read(&self, name: &str) -> Option<String> {
        self.entries.borrow().get(name).cloned()
    }

    // The borrow is released before the caller fires its change callback.
    fn write(&self, name: &str, serialized: String) -> bool {
        let mut entries = self.entries.borrow_mut();
        if entries.get(name) == Some(&serialized) {
            return false;
        }
        entries.insert(name.to_string(), serialized);
        true
    }

    fn delete(&self, name: &str) -> bool {
        self.entries.borrow_mut().remove(name).is_some()
    }
}

/// Capability to read and write one metadata namespace.
pub struct MetadataCursor<'a> {
    name: String,
    store: &'a MetadataStore,
    on_change: Box<dyn Fn(&str) + 'a>,
}

impl MetadataCursor<'_> {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fresh copy of the stored value, or `Value::Null` when absent.
    pub fn get_value(&self) -> Value {
        self.store
            .read(&self.name)
            .map(|raw| parse_stored(&self.name, &raw))
            .unwrap_or(Value::Null)
    }

    /// Typed read; `Ok(None)` when the namespace is absent.
    pub fn get_as<T: DeserializeOwned>(&self) -> ModelResult<Option<T>> {
        match self.store.read(&self.name) {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// Stores `value` and notifies when its serialization changed.
    pub fn set_value(&self, value: &Value) -> bool {
        let changed = self.store.write(&self.name, value.to_string());
        if changed {
            (self.on_change)(&self.name);
        }
        changed
    }

    /// Typed write through the same change detection as `set_value`.
    pub fn set_as<T: Serialize>(&self, value: &T) -> ModelResult<bool> {
        let value = serde_json::to_value(value)?;
        Ok(self.set_value(&value))
    }

    /// Deletes the namespace, notifying when it existed.
    pub fn remove(&self) -> bool {
        let removed = self.store.delete(&self.name);
        if removed {
            (self.on_change)(&self.name);
        }
        removed
    }
}

/// Rejects namespaces that collide with a typed field.
pub fn ensure_namespace_allowed(name: &str, reserved: &[&str]) -> ModelResult<()> {
    if reserved.contains(&name) {
        return Err(ModelError::ReservedMetadataKey(name.to_string()));
    }
    Ok(())
}

fn parse_stored(name: &str, raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|err| {
        warn!("event=metadata_parse module=metadata status=error namespace={name} error={err}");
        Value::Null
    })
}

#[cfg(test)]
mod tests {
    use super::{ensure_namespace_allowed, MetadataStore};
    use crate::error::ModelError;
    use serde_json::{json, Value};
    use std::cell::RefCell;

    #[test]
    fn absent_namespace_reads_null() {
        let store = MetadataStore::new();
        let cursor = store.cursor("myext", |_| {});
        assert_eq!(cursor.get_value(), Value::Null);
        assert_eq!(cursor.get_as::<u32>().expect("absent is ok"), None);
    }

    #[test]
    fn write_notifies_with_namespace_only_on_change() {
        let store = MetadataStore::new();
        let fired = RefCell::new(Vec::new());
        let cursor = store.cursor("myext", |name| fired.borrow_mut().push(name.to_string()));

        assert!(cursor.set_value(&json!({"a": [1, 2]})));
        assert!(!cursor.set_value(&json!({"a": [1, 2]})));
        assert!(cursor.set_value(&Value::Null));
        assert_eq!(*fired.borrow(), vec!["myext".to_string(), "myext".to_string()]);
        assert_eq!(cursor.get_value(), Value::Null);
        assert_eq!(store.names(), vec!["myext".to_string()]);
    }

    #[test]
    fn reads_are_independent_copies() {
        let store = MetadataStore::new();
        let cursor = store.cursor("ns", |_| {});
        let mut original = json!({"k": "v"});
        cursor.set_value(&original);
        original["k"] = json!("mutated");

        let mut first = cursor.get_value();
        first["k"] = json!("changed");
        assert_eq!(cursor.get_value(), json!({"k": "v"}));
    }

    #[test]
    fn typed_helpers_and_remove() {
        let store = MetadataStore::new();
        let cursor = store.cursor("counts", |_| {});
        assert!(cursor.set_as(&vec![1_u32, 2, 3]).expect("serializable"));
        assert_eq!(
            cursor.get_as::<Vec<u32>>().expect("decodes"),
            Some(vec![1, 2, 3])
        );
        assert!(matches!(
            cursor.get_as::<String>(),
            Err(ModelError::Serialization(_))
        ));
        assert!(cursor.remove());
        assert!(!cursor.remove());
        assert!(store.is_empty());
    }

    #[test]
    fn reserved_namespace_is_rejected_by_name() {
        let err = ensure_namespace_allowed("tags", &["tags", "trusted"]).expect_err("reserved");
        assert_eq!(err, ModelError::ReservedMetadataKey("tags".to_string()));
        ensure_namespace_allowed("myext", &["tags"]).expect("free namespace");
    }

    #[test]
    fn load_skips_reserved_keys() {
        let store = MetadataStore::new();
        let map = json!({"tags": ["a"], "jupyter": {"source_hidden": true}});
        store.load_json_map(map.as_object().expect("object"), &["tags"]);
        assert_eq!(store.names(), vec!["jupyter".to_string()]);
        assert_eq!(
            store.to_json_map().get("jupyter"),
            Some(&json!({"source_hidden": true}))
        );
    }
}
