//! Dynamic objects
//!
//! A [`DynamicObject`] pairs a shape with the slot storage it describes.
//! Every shape change goes through [`DynamicObject::set_shape`], which resizes
//! the storage and moves the values of relocated properties.
//!
//! Reads never migrate: an obsolete shape still describes the storage
//! correctly. Mutating operations first follow the obsolete-shape forwarding
//! so that the object catches up with generalizations made through other
//! objects.

use crate::error::{ShapeError, ShapeResult};
use crate::location::Location;
use crate::property::{Property, PropertyFlags, PropertyKey};
use crate::shape::{ObjectKind, Shape};
use crate::storage::ObjectStorage;
use crate::tree::ShapeTree;
use crate::value::Value;
use parking_lot::RwLock;
use smallvec::SmallVec;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

/// Shared, lockable handle to a dynamic object
pub type ObjectRef = Arc<RwLock<DynamicObject>>;

/// Options for [`DynamicObject::put_with_flags`]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PutFlags {
    /// Flags for a newly added property
    pub property_flags: PropertyFlags,
    /// Only assign existing properties
    pub set_existing: bool,
    /// Also apply `property_flags` to an existing property
    pub update_flags: bool,
    /// Add new properties with a constant location
    pub constant: bool,
    /// Add new properties as declared, holding the value as default
    pub declare: bool,
}

impl PutFlags {
    /// Options adding new properties with `flags`
    pub fn with_flags(flags: PropertyFlags) -> Self {
        Self {
            property_flags: flags,
            ..Self::default()
        }
    }
}

/// Object whose layout is described by a shared shape
pub struct DynamicObject {
    tree: Arc<ShapeTree>,
    shape: Arc<Shape>,
    storage: ObjectStorage,
}

impl DynamicObject {
    /// Create an empty ordinary object
    pub fn new(tree: &Arc<ShapeTree>) -> Self {
        Self::with_shape(tree, tree.root())
    }

    /// Create an object with `shape`; instance properties read as their
    /// storage defaults until assigned
    pub fn with_shape(tree: &Arc<ShapeTree>, shape: Arc<Shape>) -> Self {
        let storage = ObjectStorage::for_layout(shape.layout());
        Self {
            tree: Arc::clone(tree),
            shape,
            storage,
        }
    }

    /// Wrap in a shared handle
    pub fn into_ref(self) -> ObjectRef {
        Arc::new(RwLock::new(self))
    }

    /// Current shape
    #[inline]
    pub fn shape(&self) -> &Arc<Shape> {
        &self.shape
    }

    /// Owning tree
    pub fn tree(&self) -> &Arc<ShapeTree> {
        &self.tree
    }

    /// Raw slot storage
    pub fn storage(&self) -> &ObjectStorage {
        &self.storage
    }

    pub(crate) fn storage_mut(&mut self) -> &mut ObjectStorage {
        &mut self.storage
    }

    /// Object kind
    pub fn kind(&self) -> ObjectKind {
        self.shape.kind()
    }

    /// Change the object kind
    pub fn set_kind(&mut self, kind: ObjectKind) {
        self.update_shape();
        let shape = self.tree.change_kind(&self.shape, kind);
        self.set_shape(shape);
    }

    // ---------------------------------------------------------------------
    // Reads
    // ---------------------------------------------------------------------

    /// Current value of `key`
    pub fn get(&self, key: impl Into<PropertyKey>) -> Option<Value> {
        let key = key.into();
        self.shape
            .property(&key)
            .map(|property| property.location().get(&self.storage))
    }

    /// Current value of `key`, or `default` if absent
    pub fn get_or_default(&self, key: impl Into<PropertyKey>, default: Value) -> Value {
        self.get(key).unwrap_or(default)
    }

    /// True if `key` is present (hidden properties included)
    pub fn contains_key(&self, key: impl Into<PropertyKey>) -> bool {
        self.shape.property(&key.into()).is_some()
    }

    /// Current property for `key`
    pub fn property(&self, key: impl Into<PropertyKey>) -> Option<Property> {
        self.shape.property(&key.into()).cloned()
    }

    /// Enumerable keys in insertion order
    pub fn keys(&self) -> Vec<PropertyKey> {
        self.shape.keys()
    }

    /// Enumerable properties in insertion order
    pub fn properties(&self) -> Vec<Property> {
        self.shape.properties().into_iter().cloned().collect()
    }

    // ---------------------------------------------------------------------
    // Writes
    // ---------------------------------------------------------------------

    /// Set `key`, adding the property if needed
    pub fn put(&mut self, key: impl Into<PropertyKey>, value: Value) -> ShapeResult<()> {
        self.put_with_flags(key, value, PutFlags::default()).map(|_| ())
    }

    /// Set `key` only if it is already present; returns whether it was
    pub fn put_if_present(&mut self, key: impl Into<PropertyKey>, value: Value) -> ShapeResult<bool> {
        let flags = PutFlags {
            set_existing: true,
            ..PutFlags::default()
        };
        self.put_with_flags(key, value, flags)
    }

    /// Add `key` with a constant location holding `value`
    pub fn put_constant(
        &mut self,
        key: impl Into<PropertyKey>,
        value: Value,
        flags: PropertyFlags,
    ) -> ShapeResult<()> {
        let flags = PutFlags {
            constant: true,
            ..PutFlags::with_flags(flags)
        };
        self.put_with_flags(key, value, flags).map(|_| ())
    }

    /// Declare `key` with a placeholder `default`; no-op if already present
    pub fn declare(
        &mut self,
        key: impl Into<PropertyKey>,
        default: Value,
        flags: PropertyFlags,
    ) -> ShapeResult<()> {
        let flags = PutFlags {
            declare: true,
            ..PutFlags::with_flags(flags)
        };
        self.put_with_flags(key, default, flags).map(|_| ())
    }

    /// Set `key` according to `flags`.
    ///
    /// Returns false if nothing was written (`set_existing` on an absent key,
    /// or `declare` on a present one).
    pub fn put_with_flags(
        &mut self,
        key: impl Into<PropertyKey>,
        value: Value,
        flags: PutFlags,
    ) -> ShapeResult<bool> {
        let key = key.into();
        self.update_shape();

        let Some(mut existing) = self.shape.property(&key).cloned() else {
            if flags.set_existing {
                return Ok(false);
            }
            self.define(key, value, flags)?;
            return Ok(true);
        };

        if flags.declare {
            return Ok(false);
        }
        if existing.location().is_declared() {
            // First real assignment of a declared property
            let shape = self
                .tree
                .define_property(&self.shape, key.clone(), &value, flags.property_flags)?;
            self.set_shape(shape);
            return self.write(&key, value, true).map(|_| true);
        }
        let unshadowed = |bits: PropertyFlags| bits.without(PropertyFlags::SHADOW);
        if flags.update_flags && unshadowed(existing.flags()) != unshadowed(flags.property_flags) {
            if let Some(shape) =
                self.tree
                    .set_property_flags(&self.shape, &existing, flags.property_flags)
            {
                self.set_shape(shape);
                existing = self.current(&key)?;
            }
        }
        self.write_property(&existing, value, false).map(|_| true)
    }

    /// Change the flags of `key`; returns false if absent
    pub fn set_property_flags(&mut self, key: impl Into<PropertyKey>, flags: PropertyFlags) -> bool {
        let key = key.into();
        self.update_shape();
        let Some(property) = self.shape.property(&key).cloned() else {
            return false;
        };
        match self.tree.set_property_flags(&self.shape, &property, flags) {
            Some(shape) => {
                self.set_shape(shape);
                true
            }
            None => false,
        }
    }

    /// Remove `key`; returns false if absent.
    ///
    /// Removing a shadow property also removes the declared property it
    /// redefines.
    pub fn remove_key(&mut self, key: impl Into<PropertyKey>) -> bool {
        let key = key.into();
        self.update_shape();
        let Some(property) = self.shape.property(&key).cloned() else {
            return false;
        };
        let Some(shape) = self.tree.remove_property(&self.shape, &property) else {
            return false;
        };
        self.set_shape(shape);
        true
    }

    /// Catch up with obsolete-shape forwarding; returns true if the shape changed
    pub fn update_shape(&mut self) -> bool {
        if self.shape.is_valid() {
            return false;
        }
        let newest = self.tree.update_shape(&self.shape);
        if Arc::ptr_eq(&newest, &self.shape) {
            return false;
        }
        self.set_shape(newest);
        true
    }

    /// Reset to `shape`, discarding every stored value.
    ///
    /// Only shapes of the same tree without instance properties are
    /// accepted, since the new storage starts out zeroed. Returns false if
    /// the object is already on `shape`.
    pub fn reset_shape(&mut self, shape: Arc<Shape>) -> ShapeResult<bool> {
        if !self.tree.owns(&shape) {
            return Err(ShapeError::ForeignShape(shape.id()));
        }
        if shape.has_instance_properties() {
            return Err(ShapeError::InstanceProperties(shape.id()));
        }
        if Arc::ptr_eq(&shape, &self.shape) {
            return Ok(false);
        }
        self.storage = ObjectStorage::for_layout(shape.layout());
        self.shape = shape;
        Ok(true)
    }

    /// Switch to `shape` and migrate storage.
    ///
    /// Values of properties whose location changed are read from the old
    /// locations before the storage is resized, then written to the new ones.
    /// Object slots no longer used by any property are cleared.
    pub fn set_shape(&mut self, shape: Arc<Shape>) {
        let shape = self.tree.update_shape(&shape);
        if Arc::ptr_eq(&shape, &self.shape) {
            return;
        }
        let old = std::mem::replace(&mut self.shape, shape);

        let mut moves: SmallVec<[(Location, Value); 4]> = SmallVec::new();
        for property in self.shape.property_map().iter_rev() {
            if property.location().is_value() {
                continue;
            }
            let previous = old
                .property_map()
                .iter_rev()
                .find(|p| p.key() == property.key() && p.is_shadow() == property.is_shadow());
            if let Some(previous) = previous {
                if previous.location() != property.location() {
                    moves.push((
                        property.location().clone(),
                        previous.location().get(&self.storage),
                    ));
                }
            }
        }

        let vacated: SmallVec<[_; 4]> = old
            .property_map()
            .iter_rev()
            .filter_map(|p| p.location().object_slot())
            .filter(|slot| {
                !self
                    .shape
                    .property_map()
                    .iter_rev()
                    .any(|p| p.location().object_slot() == Some(*slot))
            })
            .collect();

        self.storage.resize(self.shape.layout());
        for (location, value) in moves {
            if let Err(err) = location.set(&mut self.storage, value) {
                warn!(shape = %self.shape.id(), %location, %err, "value lost during migration");
            }
        }
        let layout = *self.shape.layout();
        for slot in vacated {
            let in_bounds = if slot.is_field() {
                slot.index() < layout.object_fields
            } else {
                slot.index() < layout.object_array_len
            };
            if in_bounds {
                self.storage.write_object(slot, Value::Undefined);
            }
        }
    }

    fn define(&mut self, key: PropertyKey, value: Value, flags: PutFlags) -> ShapeResult<()> {
        let pflags = flags.property_flags;
        if flags.declare || flags.constant {
            let shape = if flags.declare {
                self.tree
                    .define_declared(&self.shape, key.clone(), value.clone(), pflags)?
            } else {
                self.tree
                    .define_constant(&self.shape, key.clone(), value.clone(), pflags)?
            };
            self.set_shape(shape);
            // The cached shape may have been generalized through another
            // object; the value then needs a real slot
            if self.current(&key)?.location().is_value() {
                return Ok(());
            }
        } else {
            let shape = self.tree.define_property(&self.shape, key.clone(), &value, pflags)?;
            self.set_shape(shape);
        }
        self.write(&key, value, true)
    }

    fn current(&self, key: &PropertyKey) -> ShapeResult<Property> {
        self.shape
            .property(key)
            .cloned()
            .ok_or_else(|| ShapeError::missing(key.to_string()))
    }

    fn write(&mut self, key: &PropertyKey, value: Value, init: bool) -> ShapeResult<()> {
        let property = self.current(key)?;
        self.write_property(&property, value, init)
    }

    /// Write through `property`, generalizing it if the value does not fit.
    ///
    /// Only assignments to an existing property (`init == false`) count
    /// against its final-value assumption.
    fn write_property(&mut self, property: &Property, value: Value, init: bool) -> ShapeResult<()> {
        let store = |property: &Property, storage: &mut ObjectStorage, value: Value| {
            if init {
                property.location().set(storage, value)
            } else {
                property.set(storage, value)
            }
        };
        match store(property, &mut self.storage, value.clone()) {
            Ok(()) => Ok(()),
            Err(ShapeError::FinalLocation(what)) if !property.is_relocatable() => {
                Err(ShapeError::FinalLocation(what))
            }
            Err(err) if err.is_recoverable() => {
                let shape = self
                    .tree
                    .generalize_property(&self.shape, property, &value)?;
                self.set_shape(shape);
                let property = self.current(property.key())?;
                store(&property, &mut self.storage, value)
            }
            Err(err) => Err(err),
        }
    }
}

impl fmt::Debug for DynamicObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for property in self.shape.properties() {
            map.entry(
                &format_args!("{}", property.key()),
                &property.location().get(&self.storage),
            );
        }
        map.finish()
    }
}
