//! Per-tree key/value memory.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::components::EntityId;
use crate::math::Point3;

/// A value stored on a [`Blackboard`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BlackboardValue {
    /// Flag.
    Bool(bool),
    /// Integer.
    Int(i64),
    /// Real number.
    Float(f64),
    /// Free text.
    Text(String),
    /// World position.
    Point(Point3),
    /// Entity reference.
    Entity(EntityId),
}

impl From<bool> for BlackboardValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for BlackboardValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for BlackboardValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for BlackboardValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<Point3> for BlackboardValue {
    fn from(value: Point3) -> Self {
        Self::Point(value)
    }
}

/// Untyped map with typed accessors. Accessors return `None` on a type mismatch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Blackboard {
    values: BTreeMap<String, BlackboardValue>,
}

impl Blackboard {
    /// Empty blackboard.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a value, replacing any previous one.
    pub fn set(&mut self, key: &str, value: impl Into<BlackboardValue>) {
        self.values.insert(key.to_string(), value.into());
    }

    /// Store an entity reference.
    pub fn set_entity(&mut self, key: &str, entity: EntityId) {
        self.values
            .insert(key.to_string(), BlackboardValue::Entity(entity));
    }

    /// Raw value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&BlackboardValue> {
        self.values.get(key)
    }

    /// Remove a key, returning its value.
    pub fn remove(&mut self, key: &str) -> Option<BlackboardValue> {
        self.values.remove(key)
    }

    /// Whether `key` holds anything.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Bool value.
    #[must_use]
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self.get(key)? {
            BlackboardValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Integer value.
    #[must_use]
    pub fn get_int(&self, key: &str) -> Option<i64> {
        match self.get(key)? {
            BlackboardValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Float value; integers are widened.
    #[must_use]
    pub fn get_float(&self, key: &str) -> Option<f64> {
        match self.get(key)? {
            BlackboardValue::Float(v) => Some(*v),
            BlackboardValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Text value.
    #[must_use]
    pub fn get_text(&self, key: &str) -> Option<&str> {
        match self.get(key)? {
            BlackboardValue::Text(v) => Some(v),
            _ => None,
        }
    }

    /// Point value.
    #[must_use]
    pub fn get_point(&self, key: &str) -> Option<Point3> {
        match self.get(key)? {
            BlackboardValue::Point(v) => Some(*v),
            _ => None,
        }
    }

    /// Entity value.
    #[must_use]
    pub fn get_entity(&self, key: &str) -> Option<EntityId> {
        match self.get(key)? {
            BlackboardValue::Entity(v) => Some(*v),
            _ => None,
        }
    }

    /// Number of keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// No keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
