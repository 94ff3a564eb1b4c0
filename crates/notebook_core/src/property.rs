//! Observable property descriptors.
//!
//! # Responsibility
//! - Declare one descriptor per (owner type, attribute) and keep the values
//!   in an owner-keyed table instead of struct fields.
//! - Emit a `ChangedArgs` record through the bound signal on every effective
//!   change.
//!
//! # Invariants
//! - A set that compares equal to the current value stores nothing and
//!   emits nothing.
//! - Change records always carry both the previous and the new value.
//! - Unset attributes read as the descriptor default.

use crate::signal::{Identified, ObjectId, Signal};
use log::warn;
use serde::Serialize;
use serde_json::Value;
use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;

/// Change record emitted by property setters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangedArgs {
    pub name: &'static str,
    pub old_value: Value,
    pub new_value: Value,
}

/// Shared descriptor for one observable attribute.
pub struct Property<O, V> {
    name: &'static str,
    create: fn() -> V,
    compare: Option<fn(&V, &V) -> bool>,
    changed: Option<Signal<O, ChangedArgs>>,
}

impl<O, V> Property<O, V> {
    pub const fn new(name: &'static str, create: fn() -> V) -> Self {
        Self {
            name,
            create,
            compare: None,
            changed: None,
        }
    }

    /// Replaces `PartialEq` as the change-detection rule.
    pub const fn compare(self, compare: fn(&V, &V) -> bool) -> Self {
        Self {
            compare: Some(compare),
            ..self
        }
    }

    /// Binds the channel that receives change records.
    pub const fn notify(self, changed: Signal<O, ChangedArgs>) -> Self {
        Self {
            changed: Some(changed),
            ..self
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl<O, V> Property<O, V>
where
    O: Identified + 'static,
    V: Clone + PartialEq + Serialize + 'static,
{
    /// Current value for `owner`, or the default when unset.
    pub fn get(&self, owner: &O) -> V {
        let key = (owner.object_id(), self.name);
        with_values(|values| {
            values
                .get(&key)
                .and_then(|value| value.downcast_ref::<V>())
                .cloned()
        })
        .flatten()
        .unwrap_or_else(self.create)
    }

    /// Stores `value` for `owner` and notifies when it differs.
    ///
    /// Returns whether the stored value changed.
    pub fn set(&self, owner: &O, value: V) -> bool {
        let old_value = self.get(owner);
        if self.is_equal(&old_value, &value) {
            return false;
        }

        let args = ChangedArgs {
            name: self.name,
            old_value: to_json(self.name, &old_value),
            new_value: to_json(self.name, &value),
        };
        let key = (owner.object_id(), self.name);
        let replaced = with_values(|values| values.insert(key, Box::new(value) as Box<dyn Any>));
        drop(replaced);

        if let Some(changed) = &self.changed {
            changed.emit(owner, &args);
        }
        true
    }

    fn is_equal(&self, left: &V, right: &V) -> bool {
        match self.compare {
            Some(compare) => compare(left, right),
            None => left == right,
        }
    }
}

/// Releases every stored property value of `owner`.
pub fn clear_property_data(owner: ObjectId) {
    let removed = with_values(|values| {
        let keys: Vec<_> = values
            .keys()
            .filter(|(id, _)| *id == owner)
            .copied()
            .collect();
        keys.into_iter()
            .filter_map(|key| values.remove(&key))
            .collect::<Vec<_>>()
    });
    drop(removed);
}

/// Number of stored attribute values for `owner`.
pub fn stored_property_count(owner: ObjectId) -> usize {
    with_values(|values| values.keys().filter(|(id, _)| *id == owner).count()).unwrap_or(0)
}

type ValueTable = HashMap<(ObjectId, &'static str), Box<dyn Any>>;

thread_local! {
    static VALUES: RefCell<ValueTable> = RefCell::new(HashMap::new());
}

fn with_values<R>(f: impl FnOnce(&mut ValueTable) -> R) -> Option<R> {
    VALUES.try_with(|values| f(&mut values.borrow_mut())).ok()
}

fn to_json<V: Serialize>(name: &str, value: &V) -> Value {
    serde_json::to_value(value).unwrap_or_else(|err| {
        warn!("event=property_serialize module=property status=error name={name} error={err}");
        Value::Null
    })
}
