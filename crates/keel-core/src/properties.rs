//! Typed property bag threaded through contexts, identity and signing.

use std::any::Any;
use std::collections::HashMap;
use std::fmt::{Debug, Formatter};
use std::marker::PhantomData;
use std::sync::Arc;

/// Typed key into [`Properties`].
pub struct PropertyKey<T> {
    name: &'static str,
    marker: PhantomData<fn() -> T>,
}

impl<T> PropertyKey<T> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            marker: PhantomData,
        }
    }

    pub const fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> Debug for PropertyKey<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("PropertyKey").field(&self.name).finish()
    }
}

/// Immutable-by-convention map of typed values.
///
/// Cloning is cheap; values are shared. Contexts replace the bag rather than
/// mutating one another's copies.
#[derive(Clone, Default)]
pub struct Properties {
    values: HashMap<&'static str, Arc<dyn Any + Send + Sync>>,
}

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get<T: Any + Send + Sync>(&self, key: &PropertyKey<T>) -> Option<&T> {
        self.values
            .get(key.name)
            .and_then(|value| value.downcast_ref::<T>())
    }

    pub fn insert<T: Any + Send + Sync>(&mut self, key: &PropertyKey<T>, value: T) {
        self.values.insert(key.name, Arc::new(value));
    }

    pub fn with<T: Any + Send + Sync>(mut self, key: &PropertyKey<T>, value: T) -> Self {
        self.insert(key, value);
        self
    }

    pub fn remove<T: Any + Send + Sync>(&mut self, key: &PropertyKey<T>) {
        self.values.remove(key.name);
    }

    pub fn contains<T>(&self, key: &PropertyKey<T>) -> bool {
        self.values.contains_key(key.name)
    }

    /// Copies every value of `other` into `self`, overwriting on conflicts.
    pub fn merge(&mut self, other: &Properties) {
        for (name, value) in &other.values {
            self.values.insert(*name, Arc::clone(value));
        }
    }

    pub fn merged(&self, other: &Properties) -> Properties {
        let mut merged = self.clone();
        merged.merge(other);
        merged
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl Debug for Properties {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&&str> = self.values.keys().collect();
        names.sort();
        f.debug_set().entries(names).finish()
    }
}
