//! Hidden classes (shapes)
//!
//! A [`Shape`] is the immutable layout descriptor shared by every object
//! that went through the same sequence of structural edits. Shapes live in a
//! [`ShapeTree`](crate::tree::ShapeTree) arena and refer to each other by
//! [`ShapeId`]: `parent` points up the chain and the transition cache points
//! down to the children.
//!
//! Once published, only two things about a shape ever change: its transition
//! cache gains entries, and its `valid`/`leaf` assumptions may be invalidated.

use crate::allocator::capacity_for;
use crate::assumption::Assumption;
use crate::property::{Property, PropertyKey};
use crate::property_map::PropertyMap;
use crate::transition::Transition;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::OnceLock;

/// Stable handle of a shape inside its tree
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShapeId(u32);

impl ShapeId {
    pub(crate) const fn new(index: u32) -> Self {
        Self(index)
    }

    /// Arena index
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ShapeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Runtime-defined object kind carried by a shape
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct ObjectKind(pub u32);

impl ObjectKind {
    /// Plain objects
    pub const ORDINARY: Self = Self(0);
}

/// Logical slot usage of a shape.
///
/// Part of shape identity. Physical array capacity is derived from it with
/// [`capacity_for`] and is not.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct LayoutCounts {
    /// Inline object fields in use
    pub object_fields: u32,
    /// Object overflow array slots in use
    pub object_array_len: u32,
    /// Inline primitive fields in use
    pub primitive_fields: u32,
    /// Primitive overflow array slots in use
    pub primitive_array_len: u32,
    /// Primitive overflow array reserved
    pub has_primitive_array: bool,
}

impl LayoutCounts {
    /// Physical object array capacity
    pub fn object_array_capacity(&self) -> usize {
        capacity_for(self.object_array_len as usize)
    }

    /// Physical primitive array capacity, if reserved
    pub fn primitive_array_capacity(&self) -> Option<usize> {
        self.has_primitive_array
            .then(|| capacity_for(self.primitive_array_len as usize))
    }

    /// True if no counter of `self` exceeds the one in `other`
    pub fn fits_within(&self, other: &LayoutCounts) -> bool {
        self.object_fields <= other.object_fields
            && self.object_array_len <= other.object_array_len
            && self.primitive_fields <= other.primitive_fields
            && self.primitive_array_len <= other.primitive_array_len
            && (!self.has_primitive_array || other.has_primitive_array)
    }
}

/// Immutable layout descriptor
pub struct Shape {
    id: ShapeId,
    root: ShapeId,
    parent: Option<ShapeId>,
    transition_from_parent: Option<Transition>,
    property_map: PropertyMap,
    layout: LayoutCounts,
    kind: ObjectKind,
    depth: u32,
    transitions: RwLock<FxHashMap<Transition, ShapeId>>,
    valid: Assumption,
    leaf: Assumption,
    successor: OnceLock<ShapeId>,
}

impl Shape {
    pub(crate) fn root(id: ShapeId, kind: ObjectKind) -> Self {
        Self::build(id, id, None, None, PropertyMap::new(), LayoutCounts::default(), kind, 0)
    }

    pub(crate) fn child(
        id: ShapeId,
        parent: &Shape,
        transition: Transition,
        property_map: PropertyMap,
        layout: LayoutCounts,
        kind: ObjectKind,
    ) -> Self {
        Self::build(
            id,
            parent.root,
            Some(parent.id),
            Some(transition),
            property_map,
            layout,
            kind,
            parent.depth + 1,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn build(
        id: ShapeId,
        root: ShapeId,
        parent: Option<ShapeId>,
        transition_from_parent: Option<Transition>,
        property_map: PropertyMap,
        layout: LayoutCounts,
        kind: ObjectKind,
        depth: u32,
    ) -> Self {
        Self {
            id,
            root,
            parent,
            transition_from_parent,
            property_map,
            layout,
            kind,
            depth,
            transitions: RwLock::new(FxHashMap::default()),
            valid: Assumption::new("valid shape"),
            leaf: Assumption::new("leaf shape"),
            successor: OnceLock::new(),
        }
    }

    /// Arena handle
    #[inline]
    pub fn id(&self) -> ShapeId {
        self.id
    }

    /// Root of this shape's lineage
    pub fn root_id(&self) -> ShapeId {
        self.root
    }

    /// True for root shapes
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// Parent shape handle
    pub fn parent(&self) -> Option<ShapeId> {
        self.parent
    }

    /// Edit that produced this shape from its parent
    pub fn transition_from_parent(&self) -> Option<&Transition> {
        self.transition_from_parent.as_ref()
    }

    /// Every property, including hidden and shadowed ones
    pub fn property_map(&self) -> &PropertyMap {
        &self.property_map
    }

    /// Slot usage
    #[inline]
    pub fn layout(&self) -> &LayoutCounts {
        &self.layout
    }

    /// Object kind
    pub fn kind(&self) -> ObjectKind {
        self.kind
    }

    /// Distance from the root
    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Current property for `key`; a shadow wins over its declared entry
    #[inline]
    pub fn property(&self, key: &PropertyKey) -> Option<&Property> {
        self.property_map.get(key)
    }

    /// Enumerable properties in insertion order
    pub fn properties(&self) -> Vec<&Property> {
        self.property_map.visible_properties()
    }

    /// Enumerable keys in insertion order
    pub fn keys(&self) -> Vec<PropertyKey> {
        self.property_map.keys()
    }

    /// Number of property map entries
    pub fn property_count(&self) -> usize {
        self.property_map.len()
    }

    /// True if any property needs per-object storage
    pub fn has_instance_properties(&self) -> bool {
        self.property_map.iter_rev().any(|p| !p.location().is_value())
    }

    /// Not yet superseded by a generalized shape
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.valid.is_valid()
    }

    /// No transition recorded yet
    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.leaf.is_valid()
    }

    /// Assumption invalidated when the shape becomes obsolete
    pub fn valid_assumption(&self) -> &Assumption {
        &self.valid
    }

    /// Assumption invalidated by the first recorded transition
    pub fn leaf_assumption(&self) -> &Assumption {
        &self.leaf
    }

    /// Replacement recorded when this shape became obsolete
    pub fn successor(&self) -> Option<ShapeId> {
        self.successor.get().copied()
    }

    /// Cached target of `transition`
    pub fn query_transition(&self, transition: &Transition) -> Option<ShapeId> {
        self.transitions.read().get(transition).copied()
    }

    /// Number of cached transitions
    pub fn transition_count(&self) -> usize {
        self.transitions.read().len()
    }

    pub(crate) fn transitions(&self) -> &RwLock<FxHashMap<Transition, ShapeId>> {
        &self.transitions
    }

    /// Record the replacement of an obsolete shape; first writer wins
    pub(crate) fn set_successor(&self, successor: ShapeId) -> bool {
        self.successor.set(successor).is_ok()
    }
}

impl fmt::Debug for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Shape")
            .field("id", &self.id)
            .field("depth", &self.depth)
            .field("kind", &self.kind)
            .field("properties", &self.property_map)
            .field("layout", &self.layout)
            .field("valid", &self.is_valid())
            .field("leaf", &self.is_leaf())
            .finish()
    }
}
