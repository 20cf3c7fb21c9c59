//! Structural edits between shapes
//!
//! A [`Transition`] describes one edit and doubles as the key of a shape's
//! transition cache, so equality and hashing are structural.

use crate::property::Property;
use crate::shape::ObjectKind;
use std::fmt;

/// One structural edit
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Transition {
    /// Append a property
    AddProperty(Property),
    /// Drop a property (replayed)
    RemoveProperty(Property),
    /// Swap a property for another with the same key
    ReplaceProperty {
        /// Property being replaced
        before: Property,
        /// Replacement
        after: Property,
        /// Applied in place on the originating shape instead of replayed
        direct: bool,
    },
    /// Change the object kind
    ChangeKind(ObjectKind),
    /// Reserve the primitive overflow array
    ReserveOverflowArray,
}

impl Transition {
    /// True if the edit produces an immediate child of the originating shape
    pub fn is_direct(&self) -> bool {
        match self {
            Self::AddProperty(_) | Self::ChangeKind(_) | Self::ReserveOverflowArray => true,
            Self::ReplaceProperty { direct, .. } => *direct,
            Self::RemoveProperty(_) => false,
        }
    }

    /// Property the edit is about, if any
    pub fn property(&self) -> Option<&Property> {
        match self {
            Self::AddProperty(p) | Self::RemoveProperty(p) => Some(p),
            Self::ReplaceProperty { after, .. } => Some(after),
            Self::ChangeKind(_) | Self::ReserveOverflowArray => None,
        }
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AddProperty(p) => write!(f, "add({p})"),
            Self::RemoveProperty(p) => write!(f, "remove({p})"),
            Self::ReplaceProperty {
                before,
                after,
                direct,
            } => {
                let tag = if *direct { "direct" } else { "indirect" };
                write!(f, "replace[{tag}]({before} -> {after})")
            }
            Self::ChangeKind(kind) => write!(f, "kind({})", kind.0),
            Self::ReserveOverflowArray => f.write_str("reserve-array"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::{Location, Slot};
    use crate::property::PropertyFlags;
    use rustc_hash::FxHashMap;

    fn prop(slot: u32) -> Property {
        Property::new("x", Location::Int(Slot::Field(slot)), PropertyFlags::NONE)
    }

    #[test]
    fn test_direct_classification() {
        assert!(Transition::AddProperty(prop(0)).is_direct());
        assert!(Transition::ReserveOverflowArray.is_direct());
        assert!(!Transition::RemoveProperty(prop(0)).is_direct());
        let replace = |direct| Transition::ReplaceProperty {
            before: prop(0),
            after: prop(1),
            direct,
        };
        assert!(replace(true).is_direct());
        assert!(!replace(false).is_direct());
    }

    #[test]
    fn test_structural_cache_key() {
        let mut cache = FxHashMap::default();
        cache.insert(Transition::AddProperty(prop(0)), 1);
        assert_eq!(cache.get(&Transition::AddProperty(prop(0))), Some(&1));
        assert!(!cache.contains_key(&Transition::AddProperty(prop(1))));
        assert!(!cache.contains_key(&Transition::RemoveProperty(prop(0))));
    }
}
