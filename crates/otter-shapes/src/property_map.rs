//! Persistent property list
//!
//! A [`PropertyMap`] is an immutable cons list with the most recently added
//! property at the head. Adding is O(1) and shares the whole tail with the
//! parent shape's map; removing or replacing a property rebuilds only the
//! nodes above it.

use crate::property::{Property, PropertyKey};
use smallvec::SmallVec;
use std::fmt;
use std::sync::Arc;

struct Node {
    parent: PropertyMap,
    last: Property,
    len: usize,
}

/// Immutable, structurally shared list of properties
#[derive(Clone, Default)]
pub struct PropertyMap(Option<Arc<Node>>);

impl PropertyMap {
    /// The empty map
    pub fn new() -> Self {
        Self(None)
    }

    /// Number of entries, including hidden and shadowed ones
    #[inline]
    pub fn len(&self) -> usize {
        self.0.as_ref().map_or(0, |node| node.len)
    }

    /// True if the map has no entries
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_none()
    }

    /// Most recently added property
    pub fn last_property(&self) -> Option<&Property> {
        self.0.as_ref().map(|node| &node.last)
    }

    /// Map as it was before the last property was added
    pub fn parent(&self) -> Option<&PropertyMap> {
        self.0.as_ref().map(|node| &node.parent)
    }

    /// Newest entry for `key`
    pub fn get(&self, key: &PropertyKey) -> Option<&Property> {
        self.iter_rev().find(|p| p.key() == key)
    }

    /// True if any entry has `key`
    pub fn contains_key(&self, key: &PropertyKey) -> bool {
        self.get(key).is_some()
    }

    /// True if exactly `property` is an entry
    pub fn contains(&self, property: &Property) -> bool {
        self.iter_rev().any(|p| p == property)
    }

    /// The map whose last property is `property`
    pub fn owning_map(&self, property: &Property) -> Option<&PropertyMap> {
        let mut map = self;
        while let Some(node) = &map.0 {
            if &node.last == property {
                return Some(map);
            }
            map = &node.parent;
        }
        None
    }

    /// New map with `property` appended
    pub fn put_copy(&self, property: Property) -> PropertyMap {
        debug_assert!(
            !self.contains(&property),
            "property {property} already present"
        );
        debug_assert!(
            property.is_shadow() || !self.contains_key(property.key()),
            "duplicate key {}",
            property.key()
        );
        PropertyMap(Some(Arc::new(Node {
            parent: self.clone(),
            len: self.len() + 1,
            last: property,
        })))
    }

    /// New map without `property`; later entries keep their order
    pub fn remove_copy(&self, property: &Property) -> Option<PropertyMap> {
        self.splice(property, None)
    }

    /// New map with `old` swapped for `new` at the same position
    pub fn replace_copy(&self, old: &Property, new: Property) -> Option<PropertyMap> {
        self.splice(old, Some(new))
    }

    fn splice(&self, target: &Property, replacement: Option<Property>) -> Option<PropertyMap> {
        let mut above: SmallVec<[&Property; 8]> = SmallVec::new();
        let mut map = self;
        loop {
            let node = map.0.as_ref()?;
            if &node.last == target {
                break;
            }
            above.push(&node.last);
            map = &node.parent;
        }

        let mut result = map.parent()?.clone();
        if let Some(new) = replacement {
            result = result.put_copy(new);
        }
        for property in above.into_iter().rev() {
            result = result.put_copy(property.clone());
        }
        Some(result)
    }

    /// Entries, newest first
    pub fn iter_rev(&self) -> IterRev<'_> {
        IterRev { map: self }
    }

    /// Entries in insertion order
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Property> {
        let mut entries: Vec<&Property> = Vec::with_capacity(self.len());
        entries.extend(self.iter_rev());
        entries.into_iter().rev()
    }

    /// Enumerable properties in insertion order.
    ///
    /// Hidden entries are skipped. A shadow entry takes the position of the
    /// declared property it redefines.
    pub fn visible_properties(&self) -> Vec<&Property> {
        self.iter()
            .filter(|p| !p.is_hidden() && !p.is_shadow())
            .filter_map(|p| self.get(p.key()))
            .filter(|p| !p.is_hidden())
            .collect()
    }

    /// Enumerable keys in insertion order
    pub fn keys(&self) -> Vec<PropertyKey> {
        self.visible_properties()
            .into_iter()
            .map(|p| p.key().clone())
            .collect()
    }
}

/// Newest-first iterator over a [`PropertyMap`]
pub struct IterRev<'a> {
    map: &'a PropertyMap,
}

impl<'a> Iterator for IterRev<'a> {
    type Item = &'a Property;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.map.0.as_ref()?;
        self.map = &node.parent;
        Some(&node.last)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.map.len(), Some(self.map.len()))
    }
}

impl ExactSizeIterator for IterRev<'_> {}

impl fmt::Debug for PropertyMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.iter().map(|p| p.to_string()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::{Location, Slot};
    use crate::property::PropertyFlags;
    use crate::value::Value;

    fn int(key: &str, slot: u32) -> Property {
        Property::new(key, Location::Int(Slot::Field(slot)), PropertyFlags::NONE)
    }

    fn keys(map: &PropertyMap) -> Vec<String> {
        map.keys().iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_put_and_get() {
        let map = PropertyMap::new().put_copy(int("a", 0)).put_copy(int("b", 1));
        assert_eq!(map.len(), 2);
        assert_eq!(map.last_property(), Some(&int("b", 1)));
        assert_eq!(map.get(&"a".into()), Some(&int("a", 0)));
        assert!(map.get(&"c".into()).is_none());
        assert_eq!(keys(&map), ["a", "b"]);
    }

    #[test]
    fn test_remove_replays_later_entries() {
        let map = PropertyMap::new()
            .put_copy(int("a", 0))
            .put_copy(int("b", 1))
            .put_copy(int("c", 2));
        let removed = map.remove_copy(&int("b", 1)).unwrap();
        assert_eq!(keys(&removed), ["a", "c"]);
        assert_eq!(removed.len(), 2);
        // The original map is untouched
        assert_eq!(keys(&map), ["a", "b", "c"]);
        assert!(map.remove_copy(&int("b", 7)).is_none());
    }

    #[test]
    fn test_replace_keeps_position() {
        let map = PropertyMap::new().put_copy(int("a", 0)).put_copy(int("b", 1));
        let replaced = map.replace_copy(&int("a", 0), int("a", 5)).unwrap();
        let order: Vec<_> = replaced.iter().cloned().collect();
        assert_eq!(order, [int("a", 5), int("b", 1)]);
    }

    #[test]
    fn test_owning_map() {
        let first = PropertyMap::new().put_copy(int("a", 0));
        let map = first.put_copy(int("b", 1));
        let owner = map.owning_map(&int("a", 0)).unwrap();
        assert_eq!(owner.len(), 1);
        assert!(map.owning_map(&int("z", 0)).is_none());
    }

    #[test]
    fn test_shadow_takes_declared_position() {
        let declared = Property::new(
            "a",
            Location::Declared(Value::Undefined),
            PropertyFlags::NONE,
        );
        let shadow = Property::new("a", Location::Int(Slot::Field(0)), PropertyFlags::SHADOW);
        let map = PropertyMap::new()
            .put_copy(declared)
            .put_copy(int("b", 1))
            .put_copy(shadow.clone());

        let visible = map.visible_properties();
        assert_eq!(visible.len(), 2);
        assert_eq!(visible[0], &shadow);
        assert_eq!(keys(&map), ["a", "b"]);
    }

    #[test]
    fn test_hidden_not_enumerated() {
        let hidden = Property::new("h", Location::Int(Slot::Field(1)), PropertyFlags::HIDDEN);
        let map = PropertyMap::new().put_copy(int("a", 0)).put_copy(hidden);
        assert_eq!(keys(&map), ["a"]);
        assert!(map.contains_key(&"h".into()));
    }

    #[test]
    fn test_debug_lists_properties_in_order() {
        let map = PropertyMap::new().put_copy(int("a", 0)).put_copy(int("b", 1));
        assert_eq!(format!("{map:?}"), r#"["a:int@0", "b:int@1"]"#);
    }
}
