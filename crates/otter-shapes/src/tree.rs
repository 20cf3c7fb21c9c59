//! Shape arena and transition engine
//!
//! Every shape-producing operation goes through the transition cache of the
//! shape it starts from, so two objects that perform the same edit on the
//! same shape end up on the identical `Arc<Shape>`.
//!
//! Direct edits (add, kind change, array reservation, same-slot replace)
//! create an immediate child. Removing or relocating a property instead
//! rewinds the parent chain to the shape that added it, rebuilds from there
//! and replays every later edit; the result is cached on the originating
//! shape as an indirect transition.
//!
//! Lock order: a shape's transition cache, then the arena.

use crate::allocator::Allocator;
use crate::config::ShapeConfig;
use crate::error::{ShapeError, ShapeResult};
use crate::location::{Generalization, LocationKind};
use crate::property::{Property, PropertyFlags, PropertyKey};
use crate::property_map::PropertyMap;
use crate::shape::{LayoutCounts, ObjectKind, Shape, ShapeId};
use crate::stats::ShapeObserver;
use crate::transition::Transition;
use crate::value::Value;
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Arena owning every shape of one or more lineages
pub struct ShapeTree {
    config: ShapeConfig,
    shapes: RwLock<Vec<Arc<Shape>>>,
    root: Arc<Shape>,
    observer: Option<Arc<dyn ShapeObserver>>,
}

impl Default for ShapeTree {
    fn default() -> Self {
        Self::new()
    }
}

impl ShapeTree {
    /// Create a tree with the default config
    pub fn new() -> Self {
        Self::with_config(ShapeConfig::default())
    }

    /// Create a tree with a custom config
    pub fn with_config(config: ShapeConfig) -> Self {
        Self::build(config, None)
    }

    /// Create a tree that reports events to `observer`
    pub fn with_observer(config: ShapeConfig, observer: Arc<dyn ShapeObserver>) -> Self {
        Self::build(config, Some(observer))
    }

    fn build(config: ShapeConfig, observer: Option<Arc<dyn ShapeObserver>>) -> Self {
        let root = Arc::new(Shape::root(ShapeId::new(0), ObjectKind::ORDINARY));
        if let Some(observer) = &observer {
            observer.shape_created(&root);
        }
        Self {
            config,
            shapes: RwLock::new(vec![Arc::clone(&root)]),
            root,
            observer,
        }
    }

    /// Tree configuration
    pub fn config(&self) -> &ShapeConfig {
        &self.config
    }

    /// Empty shape of ordinary objects
    pub fn root(&self) -> Arc<Shape> {
        Arc::clone(&self.root)
    }

    /// Start an independent lineage with its own empty root
    pub fn new_root(&self, kind: ObjectKind) -> Arc<Shape> {
        let shape = self.allocate(|id| Shape::root(id, kind));
        self.created(&shape);
        shape
    }

    /// Look up a shape by handle
    pub fn get(&self, id: ShapeId) -> Option<Arc<Shape>> {
        self.shapes.read().get(id.index()).cloned()
    }

    /// True if `shape` was created by this tree
    pub fn owns(&self, shape: &Shape) -> bool {
        self.shapes
            .read()
            .get(shape.id().index())
            .is_some_and(|owned| std::ptr::eq(owned.as_ref(), shape))
    }

    /// Every shape in creation order
    pub fn shapes(&self) -> Vec<Arc<Shape>> {
        self.shapes.read().clone()
    }

    /// Number of shapes ever created
    pub fn len(&self) -> usize {
        self.shapes.read().len()
    }

    /// Always false: a tree owns at least its default root
    pub fn is_empty(&self) -> bool {
        false
    }

    // ---------------------------------------------------------------------
    // Direct transitions
    // ---------------------------------------------------------------------

    /// Add `property` as-is.
    ///
    /// Fails with `DuplicateProperty` if the key is already present, unless
    /// `property` is a shadow over a declared property.
    pub fn add_property(&self, shape: &Arc<Shape>, property: Property) -> ShapeResult<Arc<Shape>> {
        if let Some(existing) = shape.property(property.key()) {
            if !(property.is_shadow() && existing.location().is_declared()) {
                return Err(ShapeError::duplicate(property.key().to_string()));
            }
        }
        Ok(self.add_unchecked(shape, property))
    }

    /// Add a property for `key` with the preferred location for `value`.
    ///
    /// Reserves the primitive overflow array first if the value needs a
    /// primitive slot and the inline ones are exhausted. A key that is only
    /// declared gets a shadow property.
    pub fn define_property(
        &self,
        shape: &Arc<Shape>,
        key: impl Into<PropertyKey>,
        value: &Value,
        flags: PropertyFlags,
    ) -> ShapeResult<Arc<Shape>> {
        let key = key.into();
        let flags = new_property_flags(shape, &key, flags)?;
        let kind = LocationKind::for_value(value, &self.config);

        let mut shape = Arc::clone(shape);
        if Allocator::new(&self.config, *shape.layout()).needs_primitive_array(kind) {
            shape = self.reserve_primitive_array(&shape);
        }
        let location = Allocator::new(&self.config, *shape.layout()).add_location(kind);
        self.add_property(&shape, Property::new(key, location, flags))
    }

    /// Add a property whose value is fixed in the shape
    pub fn define_constant(
        &self,
        shape: &Arc<Shape>,
        key: impl Into<PropertyKey>,
        value: Value,
        flags: PropertyFlags,
    ) -> ShapeResult<Arc<Shape>> {
        let key = key.into();
        let flags = new_property_flags(shape, &key, flags)?;
        let location = Allocator::new(&self.config, *shape.layout()).constant_location(value);
        self.add_property(shape, Property::new(key, location, flags))
    }

    /// Add a declared property that reads as `default` until first assigned
    pub fn define_declared(
        &self,
        shape: &Arc<Shape>,
        key: impl Into<PropertyKey>,
        default: Value,
        flags: PropertyFlags,
    ) -> ShapeResult<Arc<Shape>> {
        let key = key.into();
        if shape.property(&key).is_some() {
            return Err(ShapeError::duplicate(key.to_string()));
        }
        let location = Allocator::new(&self.config, *shape.layout()).declared_location(default);
        self.add_property(shape, Property::new(key, location, flags))
    }

    /// Reserve the primitive overflow array; no-op if already reserved
    pub fn reserve_primitive_array(&self, shape: &Arc<Shape>) -> Arc<Shape> {
        if shape.layout().has_primitive_array {
            return Arc::clone(shape);
        }
        self.direct_transition(shape, Transition::ReserveOverflowArray, || {
            let mut allocator = Allocator::new(&self.config, *shape.layout());
            allocator.reserve_primitive_array();
            (shape.property_map().clone(), allocator.layout(), shape.kind())
        })
    }

    /// Change the object kind; no-op if unchanged
    pub fn change_kind(&self, shape: &Arc<Shape>, kind: ObjectKind) -> Arc<Shape> {
        if shape.kind() == kind {
            return Arc::clone(shape);
        }
        self.direct_transition(shape, Transition::ChangeKind(kind), || {
            (shape.property_map().clone(), *shape.layout(), kind)
        })
    }

    /// Swap `before` for `after` as an immediate child of `shape`.
    ///
    /// Meant for edits that keep the storage slots (flag changes, retyping a
    /// dual location, dropping a type guard). Returns `None` if `before` is
    /// not part of `shape`.
    pub fn replace_property_direct(
        &self,
        shape: &Arc<Shape>,
        before: &Property,
        after: Property,
    ) -> Option<Arc<Shape>> {
        if !shape.property_map().contains(before) {
            return None;
        }
        if *before == after {
            return Some(Arc::clone(shape));
        }
        let transition = Transition::ReplaceProperty {
            before: before.clone(),
            after: after.clone(),
            direct: true,
        };
        Some(self.direct_transition(shape, transition, || {
            let mut allocator = Allocator::new(&self.config, *shape.layout());
            allocator.add_existing(after.location());
            let map = shape
                .property_map()
                .replace_copy(before, after)
                .unwrap_or_else(|| shape.property_map().clone());
            (map, allocator.layout(), shape.kind())
        }))
    }

    /// Change the flags of `property`, keeping its location.
    ///
    /// The shadow bit of a shadow property is preserved.
    pub fn set_property_flags(
        &self,
        shape: &Arc<Shape>,
        property: &Property,
        flags: PropertyFlags,
    ) -> Option<Arc<Shape>> {
        let flags = if property.is_shadow() {
            flags | PropertyFlags::SHADOW
        } else {
            flags
        };
        self.replace_property_direct(shape, property, property.copy_with_flags(flags))
    }

    // ---------------------------------------------------------------------
    // Indirect transitions
    // ---------------------------------------------------------------------

    /// Remove `property`, replaying every edit made after it was added.
    ///
    /// A declared property and the shadow redefining it go together: removing
    /// either one removes both. Returns `None` if `property` is not part of
    /// `shape`.
    pub fn remove_property(&self, shape: &Arc<Shape>, property: &Property) -> Option<Arc<Shape>> {
        let result = self.remove_single(shape, property)?;
        let key = property.key();
        let counterpart = if property.is_shadow() {
            result
                .property_map()
                .iter_rev()
                .find(|p| p.key() == key && p.location().is_declared())
        } else if property.location().is_declared() {
            result.property(key).filter(|p| p.is_shadow())
        } else {
            None
        };
        match counterpart.cloned() {
            Some(counterpart) => self.remove_single(&result, &counterpart).or(Some(result)),
            None => Some(result),
        }
    }

    fn remove_single(&self, shape: &Arc<Shape>, property: &Property) -> Option<Arc<Shape>> {
        if !shape.property_map().contains(property) {
            return None;
        }
        let transition = Transition::RemoveProperty(property.clone());
        if let Some(hit) = self.cached(shape, &transition) {
            return Some(hit);
        }

        let (base, pending) = self.rewind(shape, property)?;
        let result = self.replay(base, &pending);
        debug!(
            shape = %shape.id(),
            result = %result.id(),
            replayed = pending.len(),
            "removed property {}",
            property.key()
        );
        Some(self.indirect_transition(shape, transition, result))
    }

    /// Replace `before` with `after` at its original position, moving it to a
    /// freshly allocated slot and replaying every later edit.
    ///
    /// Returns `None` if `before` is not part of `shape`.
    pub fn replace_property(
        &self,
        shape: &Arc<Shape>,
        before: &Property,
        after: &Property,
    ) -> Option<Arc<Shape>> {
        if !shape.property_map().contains(before) {
            return None;
        }
        if before == after {
            return Some(Arc::clone(shape));
        }
        let transition = Transition::ReplaceProperty {
            before: before.clone(),
            after: after.clone(),
            direct: false,
        };
        if let Some(hit) = self.cached(shape, &transition) {
            return Some(hit);
        }

        let (base, pending) = self.rewind(shape, before)?;
        let first = self.append_property(&base, after);
        let result = self.replay(first, &pending);
        debug!(
            shape = %shape.id(),
            result = %result.id(),
            replayed = pending.len(),
            "replaced {before} with {after}"
        );
        Some(self.indirect_transition(shape, transition, result))
    }

    /// Apply `transition` to `shape`.
    ///
    /// With `append`, added properties are moved onto fresh slots of `shape`
    /// and direct replacements are rebased onto the current copy of the
    /// property; this is how edits are replayed onto a rebuilt chain.
    pub fn apply_transition(
        &self,
        shape: &Arc<Shape>,
        transition: &Transition,
        append: bool,
    ) -> ShapeResult<Arc<Shape>> {
        let missing = |property: &Property| ShapeError::missing(property.key().to_string());
        match transition {
            Transition::AddProperty(property) if append => {
                Ok(self.append_property(shape, property))
            }
            Transition::AddProperty(property) => self.add_property(shape, property.clone()),
            Transition::RemoveProperty(property) => self
                .remove_property(shape, property)
                .ok_or_else(|| missing(property)),
            Transition::ReplaceProperty {
                before,
                after,
                direct: true,
            } if append => self
                .rebase_replace(shape, before, after)
                .ok_or_else(|| missing(before)),
            Transition::ReplaceProperty {
                before,
                after,
                direct: true,
            } => self
                .replace_property_direct(shape, before, after.clone())
                .ok_or_else(|| missing(before)),
            Transition::ReplaceProperty {
                before,
                after,
                direct: false,
            } => self
                .replace_property(shape, before, after)
                .ok_or_else(|| missing(before)),
            Transition::ChangeKind(kind) => Ok(self.change_kind(shape, *kind)),
            Transition::ReserveOverflowArray => Ok(self.reserve_primitive_array(shape)),
        }
    }

    // ---------------------------------------------------------------------
    // Generalization
    // ---------------------------------------------------------------------

    /// Widen `property` so that it can hold `value`.
    ///
    /// The returned shape replaces `shape`: `shape` is marked obsolete and
    /// forwards to it. Relocating an unrelocatable property fails with
    /// `FinalLocation`.
    pub fn generalize_property(
        &self,
        shape: &Arc<Shape>,
        property: &Property,
        value: &Value,
    ) -> ShapeResult<Arc<Shape>> {
        let missing = || ShapeError::missing(property.key().to_string());
        let (after, result) = match property.location().generalize_for(value, &self.config) {
            Generalization::InPlace(location) => {
                let after = property.with_location(location);
                let result = self
                    .replace_property_direct(shape, property, after.clone())
                    .ok_or_else(missing)?;
                (after, result)
            }
            Generalization::Relocate(_) if !property.is_relocatable() => {
                return Err(ShapeError::final_location(property.to_string()));
            }
            Generalization::Relocate(kind) => {
                let mut allocator = Allocator::new(&self.config, *shape.layout());
                let after = property.relocate(allocator.add_location(kind));
                let result = self
                    .replace_property(shape, property, &after)
                    .ok_or_else(missing)?;
                (after, result)
            }
        };

        debug!(
            shape = %shape.id(),
            result = %result.id(),
            found = %value.value_type(),
            "generalized {property} to {after}"
        );
        self.notify(|observer| observer.property_generalized(shape, property, &after));
        self.mark_obsolete(shape, &result);
        Ok(result)
    }

    /// Follow obsolete-shape forwarding to the newest valid shape
    pub fn update_shape(&self, shape: &Arc<Shape>) -> Arc<Shape> {
        let mut current = Arc::clone(shape);
        while !current.is_valid() {
            match current.successor().and_then(|next| self.get(next)) {
                Some(next) => current = next,
                None => break,
            }
        }
        current
    }

    // ---------------------------------------------------------------------
    // Lineage queries
    // ---------------------------------------------------------------------

    /// Deepest shape that is an ancestor of (or equal to) both shapes.
    ///
    /// Fails with `ForeignShape` if either shape belongs to another tree.
    pub fn common_ancestor(&self, a: &Arc<Shape>, b: &Arc<Shape>) -> ShapeResult<Arc<Shape>> {
        for shape in [a, b] {
            if !self.owns(shape) {
                return Err(ShapeError::ForeignShape(shape.id()));
            }
        }
        if a.root_id() != b.root_id() {
            return Err(ShapeError::UnrelatedShapes(a.id(), b.id()));
        }
        let mut a = Arc::clone(a);
        let mut b = Arc::clone(b);
        while a.depth() > b.depth() {
            a = self.parent_or_self(&a);
        }
        while b.depth() > a.depth() {
            b = self.parent_or_self(&b);
        }
        while a.id() != b.id() && !a.is_root() {
            a = self.parent_or_self(&a);
            b = self.parent_or_self(&b);
        }
        Ok(a)
    }

    /// True if both shapes belong to this tree and share a root
    pub fn is_related(&self, a: &Shape, b: &Shape) -> bool {
        a.root_id() == b.root_id() && self.owns(a) && self.owns(b)
    }

    // ---------------------------------------------------------------------
    // Internals
    // ---------------------------------------------------------------------

    fn add_unchecked(&self, shape: &Arc<Shape>, property: Property) -> Arc<Shape> {
        let transition = Transition::AddProperty(property.clone());
        self.direct_transition(shape, transition, || {
            let mut allocator = Allocator::new(&self.config, *shape.layout());
            allocator.add_existing(property.location());
            (
                shape.property_map().put_copy(property),
                allocator.layout(),
                shape.kind(),
            )
        })
    }

    /// Add `property` moved onto the next free slots of `shape`
    fn append_property(&self, shape: &Arc<Shape>, property: &Property) -> Arc<Shape> {
        let mut allocator = Allocator::new(&self.config, *shape.layout());
        let moved = property.relocate(allocator.move_location(property.location()));
        self.add_unchecked(shape, moved)
    }

    /// Replay a direct replace onto the current copy of its property
    fn rebase_replace(
        &self,
        shape: &Arc<Shape>,
        before: &Property,
        after: &Property,
    ) -> Option<Arc<Shape>> {
        let current = shape
            .property_map()
            .iter_rev()
            .find(|p| p.is_same(before))?
            .clone();
        let after = after.with_location(after.location().with_slots_of(current.location()));
        self.replace_property_direct(shape, &current, after)
    }

    /// Walk up from `shape` to the shape that added `property`.
    ///
    /// Returns that shape's parent and the edits made after the add, oldest
    /// first. Direct replacements of `property` itself are folded away.
    fn rewind(&self, shape: &Arc<Shape>, property: &Property) -> Option<(Arc<Shape>, Vec<Transition>)> {
        let mut target = property.clone();
        let mut pending = Vec::new();
        let mut current = Arc::clone(shape);
        loop {
            let parent = self.get(current.parent()?)?;
            match current.transition_from_parent()? {
                Transition::AddProperty(added) if *added == target => {
                    pending.reverse();
                    return Some((parent, pending));
                }
                Transition::ReplaceProperty { before, after, .. } if *after == target => {
                    target = before.clone();
                }
                other => pending.push(other.clone()),
            }
            current = parent;
        }
    }

    fn replay(&self, base: Arc<Shape>, pending: &[Transition]) -> Arc<Shape> {
        pending.iter().fold(base, |shape, transition| {
            match self.apply_transition(&shape, transition, true) {
                Ok(next) => next,
                Err(err) => {
                    warn!(shape = %shape.id(), %transition, %err, "replay skipped transition");
                    shape
                }
            }
        })
    }

    fn direct_transition(
        &self,
        from: &Arc<Shape>,
        transition: Transition,
        build: impl FnOnce() -> (PropertyMap, LayoutCounts, ObjectKind),
    ) -> Arc<Shape> {
        if let Some(hit) = self.cached(from, &transition) {
            return hit;
        }

        let mut transitions = from.transitions().write();
        // Double-check under the write lock
        if let Some(&id) = transitions.get(&transition) {
            drop(transitions);
            // A miss here means `from` belongs to another arena
            return self
                .cache_hit(from, &transition, id)
                .unwrap_or_else(|| Arc::clone(from));
        }

        let (property_map, layout, kind) = build();
        let child = self.allocate(|id| {
            Shape::child(id, from, transition.clone(), property_map, layout, kind)
        });
        let leaf_invalidated = from.leaf_assumption().invalidate();
        transitions.insert(transition.clone(), child.id());
        drop(transitions);

        self.created(&child);
        self.recorded(from, &transition, &child, leaf_invalidated);
        child
    }

    /// Record an indirect result; an entry recorded concurrently wins
    fn indirect_transition(
        &self,
        from: &Arc<Shape>,
        transition: Transition,
        result: Arc<Shape>,
    ) -> Arc<Shape> {
        let mut transitions = from.transitions().write();
        if let Some(existing) = transitions.get(&transition).and_then(|&id| self.get(id)) {
            return existing;
        }
        let leaf_invalidated = from.leaf_assumption().invalidate();
        transitions.insert(transition.clone(), result.id());
        drop(transitions);

        self.recorded(from, &transition, &result, leaf_invalidated);
        result
    }

    fn cached(&self, from: &Shape, transition: &Transition) -> Option<Arc<Shape>> {
        let id = from.query_transition(transition)?;
        self.cache_hit(from, transition, id)
    }

    /// `None` if `id` is not part of this arena
    fn cache_hit(&self, from: &Shape, transition: &Transition, id: ShapeId) -> Option<Arc<Shape>> {
        let target = self.get(id)?;
        trace!(shape = %from.id(), target = %id, %transition, "transition cache hit");
        self.notify(|observer| observer.transition_hit(from, transition));
        Some(target)
    }

    fn recorded(&self, from: &Shape, transition: &Transition, to: &Shape, leaf_invalidated: bool) {
        trace!(shape = %from.id(), target = %to.id(), %transition, "transition cache miss");
        if leaf_invalidated {
            debug!(shape = %from.id(), "leaf assumption invalidated");
        }
        self.notify(|observer| observer.transition_added(from, transition, to));
    }

    fn created(&self, shape: &Shape) {
        trace!(shape = %shape.id(), depth = shape.depth(), layout = ?shape.layout(), "shape created");
        self.notify(|observer| observer.shape_created(shape));
    }

    fn mark_obsolete(&self, shape: &Shape, successor: &Shape) {
        if shape.id() == successor.id() {
            return;
        }
        shape.set_successor(successor.id());
        if shape.valid_assumption().invalidate() {
            debug!(shape = %shape.id(), successor = %successor.id(), "shape obsolete");
            self.notify(|observer| observer.shape_invalidated(shape));
        }
    }

    fn allocate(&self, build: impl FnOnce(ShapeId) -> Shape) -> Arc<Shape> {
        let mut shapes = self.shapes.write();
        let shape = Arc::new(build(ShapeId::new(shapes.len() as u32)));
        shapes.push(Arc::clone(&shape));
        shape
    }

    fn parent_or_self(&self, shape: &Arc<Shape>) -> Arc<Shape> {
        shape
            .parent()
            .and_then(|parent| self.get(parent))
            .unwrap_or_else(|| Arc::clone(shape))
    }

    #[inline]
    fn notify(&self, event: impl FnOnce(&dyn ShapeObserver)) {
        if let Some(observer) = &self.observer {
            event(observer.as_ref());
        }
    }
}

/// Flags for a new property on `key`: shadowing a declared property, or
/// rejecting a duplicate
fn new_property_flags(
    shape: &Shape,
    key: &PropertyKey,
    flags: PropertyFlags,
) -> ShapeResult<PropertyFlags> {
    match shape.property(key) {
        None => Ok(flags),
        Some(existing) if existing.location().is_declared() => Ok(flags | PropertyFlags::SHADOW),
        Some(_) => Err(ShapeError::duplicate(key.to_string())),
    }
}

impl fmt::Debug for ShapeTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShapeTree")
            .field("config", &self.config)
            .field("shapes", &self.len())
            .field("observer", &self.observer.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::{Location, Slot};
    use crate::stats::ShapeStats;

    fn define(tree: &ShapeTree, shape: &Arc<Shape>, key: &str, value: Value) -> Arc<Shape> {
        tree.define_property(shape, key, &value, PropertyFlags::NONE)
            .unwrap()
    }

    fn prop<'a>(shape: &'a Shape, key: &str) -> &'a Property {
        shape.property(&key.into()).unwrap()
    }

    #[test]
    fn test_add_is_cached() {
        let tree = ShapeTree::new();
        let root = tree.root();
        let a = define(&tree, &root, "x", Value::Int(1));
        let b = define(&tree, &root, "x", Value::Int(2));
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(root.transition_count(), 1);
        assert!(!root.is_leaf());
        assert!(a.is_leaf());
    }

    #[test]
    fn test_duplicate_rejected() {
        let tree = ShapeTree::new();
        let s1 = define(&tree, &tree.root(), "x", Value::Int(1));
        let err = tree
            .define_property(&s1, "x", &Value::Int(1), PropertyFlags::NONE)
            .unwrap_err();
        assert!(matches!(err, ShapeError::DuplicateProperty(_)));
    }

    #[test]
    fn test_rewind_skips_replaced_property() {
        let tree = ShapeTree::new();
        let s1 = define(&tree, &tree.root(), "x", Value::Int(1));
        let s2 = define(&tree, &s1, "y", Value::Int(2));
        let x = prop(&s2, "x").clone();
        let s3 = tree
            .set_property_flags(&s2, &x, PropertyFlags::user(4))
            .unwrap();

        let flagged = prop(&s3, "x").clone();
        let (base, pending) = tree.rewind(&s3, &flagged).unwrap();
        assert!(Arc::ptr_eq(&base, &tree.root()));
        assert_eq!(pending.len(), 1);
        assert!(matches!(&pending[0], Transition::AddProperty(p) if p.key() == &"y".into()));
    }

    #[test]
    fn test_remove_recorded_as_indirect() {
        let tree = ShapeTree::new();
        let s1 = define(&tree, &tree.root(), "x", Value::Int(1));
        let s2 = define(&tree, &s1, "y", Value::Int(2));
        let x = prop(&s2, "x").clone();

        let removed = tree.remove_property(&s2, &x).unwrap();
        assert_eq!(removed.keys(), vec![PropertyKey::from("y")]);
        assert_eq!(
            s2.query_transition(&Transition::RemoveProperty(x.clone())),
            Some(removed.id())
        );
        assert!(!s2.is_leaf());
        // y moved into the slot x vacated
        assert_eq!(prop(&removed, "y").location(), &Location::Int(Slot::Field(0)));
        assert!(Arc::ptr_eq(&removed, &tree.remove_property(&s2, &x).unwrap()));
    }

    #[test]
    fn test_replay_keeps_kind_change() {
        let tree = ShapeTree::new();
        let s1 = define(&tree, &tree.root(), "x", Value::Int(1));
        let s2 = tree.change_kind(&s1, ObjectKind(7));
        let s3 = define(&tree, &s2, "y", Value::Int(2));
        let x = prop(&s3, "x").clone();

        let removed = tree.remove_property(&s3, &x).unwrap();
        assert_eq!(removed.kind(), ObjectKind(7));
        assert_eq!(removed.depth(), 2);
    }

    #[test]
    fn test_generalize_marks_obsolete() {
        let tree = ShapeTree::new();
        let s1 = define(&tree, &tree.root(), "x", Value::Int(1));
        let x = prop(&s1, "x").clone();

        let generalized = tree
            .generalize_property(&s1, &x, &Value::Double(1.5))
            .unwrap();
        assert!(matches!(
            prop(&generalized, "x").location(),
            Location::Double { .. }
        ));
        assert!(!s1.is_valid());
        assert_eq!(s1.successor(), Some(generalized.id()));
        assert!(Arc::ptr_eq(&tree.update_shape(&s1), &generalized));
    }

    #[test]
    fn test_generalize_unrelocatable_fails() {
        let tree = ShapeTree::new();
        let root = tree.root();
        let pinned = Property::unrelocatable(
            "x",
            Location::Constant(Value::Int(1)),
            PropertyFlags::NONE,
        );
        let s1 = tree.add_property(&root, pinned.clone()).unwrap();
        let err = tree
            .generalize_property(&s1, &pinned, &Value::Int(2))
            .unwrap_err();
        assert!(matches!(err, ShapeError::FinalLocation(_)));
        assert!(s1.is_valid());
    }

    #[test]
    fn test_primitive_array_reserved_on_demand() {
        let tree = ShapeTree::with_config(ShapeConfig::array_only());
        let s1 = define(&tree, &tree.root(), "x", Value::Int(1));
        assert!(s1.layout().has_primitive_array);
        assert_eq!(s1.depth(), 2);
        assert_eq!(prop(&s1, "x").location(), &Location::Int(Slot::Array(0)));
        assert!(matches!(
            s1.transition_from_parent(),
            Some(Transition::AddProperty(_))
        ));
    }

    #[test]
    fn test_observer_counts() {
        let stats = Arc::new(ShapeStats::new());
        let tree = ShapeTree::with_observer(ShapeConfig::default(), stats.clone());
        let root = tree.root();
        define(&tree, &root, "x", Value::Int(1));
        define(&tree, &root, "x", Value::Int(1));

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.shapes_created, 2);
        assert_eq!(snapshot.direct_transitions, 1);
        assert_eq!(snapshot.transition_hits, 1);
    }
}
