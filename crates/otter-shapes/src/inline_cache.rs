//! Monomorphic property cache
//!
//! Caches the property found for one key on one shape. A lookup hits when
//! the object is on exactly that shape and the shape's `valid` assumption
//! still holds; the location can then be accessed without searching the
//! property map.

use crate::error::ShapeResult;
use crate::object::DynamicObject;
use crate::property::{Property, PropertyKey};
use crate::shape::Shape;
use crate::value::Value;
use std::sync::Arc;

/// Shape-guarded cache for accesses to one property key
#[derive(Debug)]
pub struct PropertyCache {
    key: PropertyKey,
    entry: Option<(Arc<Shape>, Property)>,
    hits: u64,
    misses: u64,
}

impl PropertyCache {
    /// Create an empty cache for `key`
    pub fn new(key: impl Into<PropertyKey>) -> Self {
        Self {
            key: key.into(),
            entry: None,
            hits: 0,
            misses: 0,
        }
    }

    /// Cached key
    pub fn key(&self) -> &PropertyKey {
        &self.key
    }

    /// Read the property of `obj`
    pub fn get(&mut self, obj: &DynamicObject) -> Option<Value> {
        let cached = self
            .lookup(obj.shape())
            .map(|property| property.location().get(obj.storage()));
        if cached.is_some() {
            self.hits += 1;
            return cached;
        }
        self.misses += 1;
        let property = obj.shape().property(&self.key)?.clone();
        let value = property.location().get(obj.storage());
        self.remember(obj.shape(), property);
        Some(value)
    }

    /// Write the property of `obj`.
    ///
    /// Hits only when the cached location accepts `value`; every other case
    /// goes through [`DynamicObject::put`].
    pub fn put(&mut self, obj: &mut DynamicObject, value: Value) -> ShapeResult<()> {
        let cached = self
            .lookup(obj.shape())
            .filter(|property| {
                let location = property.location();
                !location.is_value() && location.can_store(&value)
            })
            .cloned();
        if let Some(property) = cached {
            self.hits += 1;
            return property.set(obj.storage_mut(), value);
        }
        self.misses += 1;
        obj.put(self.key.clone(), value)?;
        if let Some(property) = obj.shape().property(&self.key) {
            self.remember(obj.shape(), property.clone());
        }
        Ok(())
    }

    /// True if the cache currently serves `shape`
    pub fn is_cached_for(&self, shape: &Arc<Shape>) -> bool {
        self.lookup(shape).is_some()
    }

    /// Drop the cached entry
    pub fn invalidate(&mut self) {
        self.entry = None;
    }

    /// Number of cache hits
    pub fn hits(&self) -> u64 {
        self.hits
    }

    /// Number of cache misses
    pub fn misses(&self) -> u64 {
        self.misses
    }

    fn lookup(&self, shape: &Arc<Shape>) -> Option<&Property> {
        match &self.entry {
            Some((cached, property)) if Arc::ptr_eq(cached, shape) && cached.is_valid() => {
                Some(property)
            }
            _ => None,
        }
    }

    /// Cache `property` unless `shape` is already obsolete
    fn remember(&mut self, shape: &Arc<Shape>, property: Property) {
        self.entry = shape.is_valid().then(|| (Arc::clone(shape), property));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::ShapeTree;

    #[test]
    fn test_hit_after_first_access() {
        let tree = Arc::new(ShapeTree::new());
        let mut obj = DynamicObject::new(&tree);
        obj.put("x", Value::Int(1)).unwrap();

        let mut cache = PropertyCache::new("x");
        assert_eq!(cache.get(&obj), Some(Value::Int(1)));
        assert_eq!(cache.get(&obj), Some(Value::Int(1)));
        assert_eq!((cache.hits(), cache.misses()), (1, 1));
        assert!(cache.is_cached_for(obj.shape()));
    }

    #[test]
    fn test_missing_key() {
        let tree = Arc::new(ShapeTree::new());
        let obj = DynamicObject::new(&tree);
        let mut cache = PropertyCache::new("x");
        assert_eq!(cache.get(&obj), None);
        assert!(!cache.is_cached_for(obj.shape()));
    }

    #[test]
    fn test_put_through_cache() {
        let tree = Arc::new(ShapeTree::new());
        let mut obj = DynamicObject::new(&tree);
        let mut cache = PropertyCache::new("x");
        cache.put(&mut obj, Value::Int(1)).unwrap();
        assert!(obj.property("x").unwrap().is_assumed_final());
        cache.put(&mut obj, Value::Int(2)).unwrap();
        assert_eq!(cache.hits(), 1);
        assert_eq!(obj.get("x"), Some(Value::Int(2)));
        assert!(!obj.property("x").unwrap().is_assumed_final());
    }

    #[test]
    fn test_obsolete_shape_misses() {
        let tree = Arc::new(ShapeTree::new());
        let mut a = DynamicObject::new(&tree);
        a.put("x", Value::Int(1)).unwrap();
        let mut b = DynamicObject::new(&tree);
        b.put("x", Value::Int(1)).unwrap();
        assert!(Arc::ptr_eq(a.shape(), b.shape()));

        let mut cache = PropertyCache::new("x");
        cache.get(&b);
        assert!(cache.is_cached_for(b.shape()));

        // Generalizing through `a` makes the shared shape obsolete
        a.put("x", Value::string("s")).unwrap();
        assert!(!cache.is_cached_for(b.shape()));
        assert_eq!(cache.get(&b), Some(Value::Int(1)));
        assert_eq!(cache.misses(), 2);
        assert!(!cache.is_cached_for(b.shape()));
    }
}
