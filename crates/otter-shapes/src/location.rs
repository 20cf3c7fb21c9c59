//! Storage locations
//!
//! A [`Location`] says where a property value lives inside an object's
//! [`ObjectStorage`] and how it is encoded. Locations are immutable: changing
//! the representation of a property always means building a new location and
//! therefore a new property and a new shape.
//!
//! ```text
//! Constant / Declared   no storage, value lives in the location itself
//! Int / Long / Double   one primitive slot (inline field or primitive array)
//! Boolean
//! Object                one object slot, optionally guarded by a value type
//! Dual                  one primitive slot + one object slot, read according
//!                       to the currently bound representation
//! ```

use crate::config::ShapeConfig;
use crate::error::{ShapeError, ShapeResult};
use crate::storage::ObjectStorage;
use crate::value::{Value, ValueType};
use std::fmt;

/// A physical slot: inline field or overflow-array element
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Slot {
    /// Inline field index
    Field(u32),
    /// Overflow array index
    Array(u32),
}

impl Slot {
    /// Index within its category
    pub fn index(self) -> u32 {
        match self {
            Self::Field(i) | Self::Array(i) => i,
        }
    }

    /// True for inline fields
    pub fn is_field(self) -> bool {
        matches!(self, Self::Field(_))
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Field(i) => write!(f, "@{i}"),
            Self::Array(i) => write!(f, "[{i}]"),
        }
    }
}

/// Representation currently bound to a dual location
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DualType {
    /// Stored as i32 bits in the primitive slot
    Int,
    /// Stored as i64 bits in the primitive slot
    Long,
    /// Stored as f64 bits in the primitive slot
    Double,
    /// Stored as 0/1 in the primitive slot
    Boolean,
    /// Stored in the object slot
    Object,
}

impl DualType {
    fn for_value(value: &Value) -> Self {
        match value {
            Value::Int(_) => Self::Int,
            Value::Long(_) => Self::Long,
            Value::Double(_) => Self::Double,
            Value::Boolean(_) => Self::Boolean,
            _ => Self::Object,
        }
    }

    /// Widened representations also accept ints
    fn accepts(self, value: &Value) -> bool {
        match self {
            Self::Int => matches!(value, Value::Int(_)),
            Self::Long => matches!(value, Value::Long(_) | Value::Int(_)),
            Self::Double => matches!(value, Value::Double(_) | Value::Int(_)),
            Self::Boolean => matches!(value, Value::Boolean(_)),
            Self::Object => true,
        }
    }

    /// Narrowest representation holding both the current values and `value`
    fn widen(self, value: &Value, config: &ShapeConfig) -> Self {
        match (self, value) {
            (Self::Int, Value::Double(_)) if config.allow_int_to_double => Self::Double,
            (Self::Int, Value::Long(_)) if config.allow_int_to_long => Self::Long,
            _ => Self::Object,
        }
    }
}

/// Allocation request: the kind of location to create
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LocationKind {
    /// Int primitive
    Int,
    /// Long primitive
    Long {
        /// Accept int values
        allow_int: bool,
    },
    /// Double primitive
    Double {
        /// Accept int values
        allow_int: bool,
    },
    /// Boolean primitive
    Boolean,
    /// Object slot
    Object {
        /// Optional type guard
        guard: Option<ValueType>,
    },
    /// Primitive + object slot pair
    Dual(DualType),
}

impl LocationKind {
    /// Preferred kind for storing `value`
    pub fn for_value(value: &Value, config: &ShapeConfig) -> Self {
        if config.use_dual_locations && value.is_primitive() {
            return Self::Dual(DualType::for_value(value));
        }
        match value {
            Value::Int(_) => Self::Int,
            Value::Long(_) => Self::Long {
                allow_int: config.allow_int_to_long,
            },
            Value::Double(_) => Self::Double {
                allow_int: config.allow_int_to_double,
            },
            Value::Boolean(_) => Self::Boolean,
            Value::Undefined | Value::Null => Self::Object { guard: None },
            other => Self::Object {
                guard: config.type_guard_objects.then(|| other.value_type()),
            },
        }
    }

    /// Narrowest kind holding both `old` and `new`
    pub fn for_values(old: &Value, new: &Value, config: &ShapeConfig) -> Self {
        let kind = Self::for_value(new, config);
        if kind.accepts(old) {
            return kind;
        }
        let kind = Self::for_value(old, config);
        if kind.accepts(new) {
            return kind;
        }
        Self::Object { guard: None }
    }

    /// Check whether a location of this kind can store `value`
    pub fn accepts(self, value: &Value) -> bool {
        match self {
            Self::Int => matches!(value, Value::Int(_)),
            Self::Long { allow_int } => {
                matches!(value, Value::Long(_)) || (allow_int && matches!(value, Value::Int(_)))
            }
            Self::Double { allow_int } => {
                matches!(value, Value::Double(_)) || (allow_int && matches!(value, Value::Int(_)))
            }
            Self::Boolean => matches!(value, Value::Boolean(_)),
            Self::Object { guard } => guard.is_none_or(|ty| ty == value.value_type()),
            Self::Dual(ty) => ty.accepts(value),
        }
    }

    /// True if the kind needs a primitive slot
    pub fn needs_primitive(self) -> bool {
        !matches!(self, Self::Object { .. })
    }
}

/// Slots consumed by one location, per category (0 or 1 each)
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SlotCounts {
    /// Inline object fields
    pub object_fields: u32,
    /// Inline primitive fields
    pub primitive_fields: u32,
    /// Object overflow array slots
    pub object_array: u32,
    /// Primitive overflow array slots
    pub primitive_array: u32,
}

/// Outcome of widening a location for a value it cannot hold
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Generalization {
    /// Same slots, new representation: applied as a direct replace
    InPlace(Location),
    /// Needs a new slot of this kind: applied by replaying the shape chain
    Relocate(LocationKind),
}

/// Where and how a property value is stored
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Location {
    /// Fixed value, no storage
    Constant(Value),
    /// Placeholder value until the first real assignment
    Declared(Value),
    /// i32 in a primitive slot
    Int(Slot),
    /// i64 in a primitive slot
    Long {
        /// Primitive slot
        slot: Slot,
        /// Accept int values
        allow_int: bool,
    },
    /// f64 in a primitive slot
    Double {
        /// Primitive slot
        slot: Slot,
        /// Accept int values
        allow_int: bool,
    },
    /// bool in a primitive slot
    Boolean(Slot),
    /// Any value in an object slot
    Object {
        /// Object slot
        slot: Slot,
        /// Only values of this type fit
        guard: Option<ValueType>,
    },
    /// Primitive or boxed value, per the bound representation
    Dual {
        /// Primitive slot
        primitive: Slot,
        /// Object slot
        object: Slot,
        /// Live representation
        ty: DualType,
    },
}

impl Location {
    /// Short kind name used in diagnostics
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Constant(_) => "constant",
            Self::Declared(_) => "declared",
            Self::Int(_) => "int",
            Self::Long { .. } => "long",
            Self::Double { .. } => "double",
            Self::Boolean(_) => "boolean",
            Self::Object { .. } => "object",
            Self::Dual { .. } => "dual",
        }
    }

    /// Allocation kind, or `None` for value locations
    pub fn kind(&self) -> Option<LocationKind> {
        Some(match self {
            Self::Constant(_) | Self::Declared(_) => return None,
            Self::Int(_) => LocationKind::Int,
            Self::Long { allow_int, .. } => LocationKind::Long {
                allow_int: *allow_int,
            },
            Self::Double { allow_int, .. } => LocationKind::Double {
                allow_int: *allow_int,
            },
            Self::Boolean(_) => LocationKind::Boolean,
            Self::Object { guard, .. } => LocationKind::Object { guard: *guard },
            Self::Dual { ty, .. } => LocationKind::Dual(*ty),
        })
    }

    /// True for constant locations
    pub fn is_constant(&self) -> bool {
        matches!(self, Self::Constant(_))
    }

    /// True for declared locations
    pub fn is_declared(&self) -> bool {
        matches!(self, Self::Declared(_))
    }

    /// True for locations without storage
    pub fn is_value(&self) -> bool {
        matches!(self, Self::Constant(_) | Self::Declared(_))
    }

    /// Primitive slot, if any
    pub fn primitive_slot(&self) -> Option<Slot> {
        match self {
            Self::Int(slot) | Self::Boolean(slot) => Some(*slot),
            Self::Long { slot, .. } | Self::Double { slot, .. } => Some(*slot),
            Self::Dual { primitive, .. } => Some(*primitive),
            _ => None,
        }
    }

    /// Object slot, if any
    pub fn object_slot(&self) -> Option<Slot> {
        match self {
            Self::Object { slot, .. } => Some(*slot),
            Self::Dual { object, .. } => Some(*object),
            _ => None,
        }
    }

    /// True if both locations occupy exactly the same slots
    pub fn same_slots(&self, other: &Location) -> bool {
        !self.is_value()
            && self.primitive_slot() == other.primitive_slot()
            && self.object_slot() == other.object_slot()
    }

    /// Slots consumed by this location
    pub fn slot_counts(&self) -> SlotCounts {
        let mut counts = SlotCounts::default();
        match self.primitive_slot() {
            Some(Slot::Field(_)) => counts.primitive_fields = 1,
            Some(Slot::Array(_)) => counts.primitive_array = 1,
            None => {}
        }
        match self.object_slot() {
            Some(Slot::Field(_)) => counts.object_fields = 1,
            Some(Slot::Array(_)) => counts.object_array = 1,
            None => {}
        }
        counts
    }

    /// Check whether `value` can be written without generalizing
    pub fn can_store(&self, value: &Value) -> bool {
        match self {
            Self::Constant(v) | Self::Declared(v) => v == value,
            Self::Int(_) => matches!(value, Value::Int(_)),
            Self::Long { allow_int, .. } => {
                matches!(value, Value::Long(_)) || (*allow_int && matches!(value, Value::Int(_)))
            }
            Self::Double { allow_int, .. } => {
                matches!(value, Value::Double(_))
                    || (*allow_int && matches!(value, Value::Int(_)))
            }
            Self::Boolean(_) => matches!(value, Value::Boolean(_)),
            Self::Object { guard, .. } => guard.is_none_or(|ty| ty == value.value_type()),
            Self::Dual { ty, .. } => ty.accepts(value),
        }
    }

    /// Read the value from `storage`
    pub fn get(&self, storage: &ObjectStorage) -> Value {
        match self {
            Self::Constant(v) | Self::Declared(v) => v.clone(),
            Self::Int(slot) => Value::Int(storage.read_primitive(*slot) as u32 as i32),
            Self::Long { slot, .. } => Value::Long(storage.read_primitive(*slot) as i64),
            Self::Double { slot, .. } => Value::Double(f64::from_bits(storage.read_primitive(*slot))),
            Self::Boolean(slot) => Value::Boolean(storage.read_primitive(*slot) != 0),
            Self::Object { slot, .. } => storage.read_object(*slot).clone(),
            Self::Dual {
                primitive,
                object,
                ty,
            } => {
                let bits = storage.read_primitive(*primitive);
                match ty {
                    DualType::Int => Value::Int(bits as u32 as i32),
                    DualType::Long => Value::Long(bits as i64),
                    DualType::Double => Value::Double(f64::from_bits(bits)),
                    DualType::Boolean => Value::Boolean(bits != 0),
                    DualType::Object => storage.read_object(*object).clone(),
                }
            }
        }
    }

    /// Write `value` to `storage`.
    ///
    /// Constant and declared locations reject every write with
    /// `FinalLocation` unless the value is already the one they hold; typed
    /// locations reject mismatching values with `IncompatibleLocation`.
    pub fn set(&self, storage: &mut ObjectStorage, value: Value) -> ShapeResult<()> {
        if !self.can_store(&value) || self.is_declared() {
            return Err(if self.is_value() {
                ShapeError::final_location(self.to_string())
            } else {
                ShapeError::incompatible(self.kind_name(), value.value_type())
            });
        }
        match self {
            Self::Constant(_) | Self::Declared(_) => {}
            Self::Object { slot, .. } => storage.write_object(*slot, value),
            Self::Dual {
                object,
                ty: DualType::Object,
                ..
            } => storage.write_object(*object, value),
            Self::Int(slot)
            | Self::Boolean(slot)
            | Self::Long { slot, .. }
            | Self::Double { slot, .. }
            | Self::Dual {
                primitive: slot, ..
            } => storage.write_primitive(*slot, self.encode(&value)),
        }
        Ok(())
    }

    /// Raw bits for a value accepted by this primitive location
    fn encode(&self, value: &Value) -> u64 {
        let as_double = matches!(
            self,
            Self::Double { .. }
                | Self::Dual {
                    ty: DualType::Double,
                    ..
                }
        );
        let as_long = matches!(
            self,
            Self::Long { .. }
                | Self::Dual {
                    ty: DualType::Long,
                    ..
                }
        );
        match value {
            Value::Int(i) if as_double => f64::from(*i).to_bits(),
            Value::Int(i) if as_long => i64::from(*i) as u64,
            Value::Int(i) => *i as u32 as u64,
            Value::Long(l) => *l as u64,
            Value::Double(d) => d.to_bits(),
            Value::Boolean(b) => u64::from(*b),
            _ => 0,
        }
    }

    /// Widen this location so that it can also hold `value`.
    ///
    /// Constant and declared locations relocate to a kind that also holds
    /// their own value, so objects still on the old shape keep it when they
    /// migrate.
    pub fn generalize_for(&self, value: &Value, config: &ShapeConfig) -> Generalization {
        match self {
            Self::Dual {
                primitive,
                object,
                ty,
            } => Generalization::InPlace(Self::Dual {
                primitive: *primitive,
                object: *object,
                ty: ty.widen(value, config),
            }),
            Self::Object { slot, .. } => Generalization::InPlace(Self::Object {
                slot: *slot,
                guard: None,
            }),
            Self::Int(_) => Generalization::Relocate(match value {
                Value::Double(_) if config.allow_int_to_double => {
                    LocationKind::Double { allow_int: true }
                }
                Value::Long(_) if config.allow_int_to_long => LocationKind::Long { allow_int: true },
                _ => LocationKind::Object { guard: None },
            }),
            Self::Long { .. } | Self::Double { .. } | Self::Boolean(_) => {
                Generalization::Relocate(LocationKind::Object { guard: None })
            }
            Self::Constant(v) | Self::Declared(v) => {
                Generalization::Relocate(LocationKind::for_values(v, value, config))
            }
        }
    }

    /// This location's representation moved onto `other`'s slots.
    ///
    /// Used when replaying an in-place edit after the property was relocated.
    /// Falls back to `other` when the slot categories differ.
    pub fn with_slots_of(&self, other: &Location) -> Location {
        let primitive = other.primitive_slot();
        let object = other.object_slot();
        let moved = match self {
            Self::Constant(_) | Self::Declared(_) => Some(self.clone()),
            Self::Int(_) => primitive.map(Self::Int),
            Self::Boolean(_) => primitive.map(Self::Boolean),
            Self::Long { allow_int, .. } => primitive.map(|slot| Self::Long {
                slot,
                allow_int: *allow_int,
            }),
            Self::Double { allow_int, .. } => primitive.map(|slot| Self::Double {
                slot,
                allow_int: *allow_int,
            }),
            Self::Object { guard, .. } => match (primitive, object) {
                (None, Some(slot)) => Some(Self::Object {
                    slot,
                    guard: *guard,
                }),
                _ => None,
            },
            Self::Dual { ty, .. } => primitive.zip(object).map(|(primitive, object)| Self::Dual {
                primitive,
                object,
                ty: *ty,
            }),
        };
        moved.unwrap_or_else(|| other.clone())
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Constant(v) => write!(f, "={v:?}"),
            Self::Declared(v) => write!(f, "declared={v:?}"),
            Self::Object {
                slot,
                guard: Some(ty),
            } => write!(f, "object<{ty}>{slot}"),
            Self::Dual {
                primitive,
                object,
                ty,
            } => write!(f, "dual<{ty:?}>{primitive}{object}"),
            other => {
                let slot = other.primitive_slot().or(other.object_slot());
                match slot {
                    Some(slot) => write!(f, "{}{slot}", other.kind_name()),
                    None => f.write_str(other.kind_name()),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape::LayoutCounts;

    fn storage() -> ObjectStorage {
        ObjectStorage::for_layout(&LayoutCounts {
            object_fields: 2,
            primitive_fields: 2,
            ..LayoutCounts::default()
        })
    }

    #[test]
    fn test_int_location_round_trip() {
        let mut store = storage();
        let location = Location::Int(Slot::Field(1));
        location.set(&mut store, Value::Int(-7)).unwrap();
        assert_eq!(location.get(&store), Value::Int(-7));
        assert_eq!(location.slot_counts().primitive_fields, 1);
        assert_eq!(location.slot_counts().object_fields, 0);
    }

    #[test]
    fn test_int_location_rejects_string() {
        let mut store = storage();
        let location = Location::Int(Slot::Field(0));
        let err = location.set(&mut store, Value::string("s")).unwrap_err();
        assert!(matches!(
            err,
            ShapeError::IncompatibleLocation {
                location: "int",
                found: ValueType::String
            }
        ));
    }

    #[test]
    fn test_double_accepts_int_when_allowed() {
        let mut store = storage();
        let location = Location::Double {
            slot: Slot::Field(0),
            allow_int: true,
        };
        location.set(&mut store, Value::Int(3)).unwrap();
        assert_eq!(location.get(&store), Value::Double(3.0));

        let strict = Location::Double {
            slot: Slot::Field(0),
            allow_int: false,
        };
        assert!(!strict.can_store(&Value::Int(3)));
    }

    #[test]
    fn test_constant_location_is_final() {
        let mut store = storage();
        let location = Location::Constant(Value::Int(1));
        assert!(location.set(&mut store, Value::Int(1)).is_ok());
        let err = location.set(&mut store, Value::Int(2)).unwrap_err();
        assert!(matches!(err, ShapeError::FinalLocation(_)));
        assert_eq!(location.slot_counts(), SlotCounts::default());
    }

    #[test]
    fn test_declared_location_rejects_all_writes() {
        let mut store = storage();
        let location = Location::Declared(Value::Undefined);
        assert_eq!(location.get(&store), Value::Undefined);
        assert!(matches!(
            location.set(&mut store, Value::Undefined),
            Err(ShapeError::FinalLocation(_))
        ));
    }

    #[test]
    fn test_guarded_object_location() {
        let location = Location::Object {
            slot: Slot::Field(0),
            guard: Some(ValueType::String),
        };
        assert!(location.can_store(&Value::string("a")));
        assert!(!location.can_store(&Value::Int(1)));
        assert_eq!(
            location.generalize_for(&Value::Int(1), &ShapeConfig::default()),
            Generalization::InPlace(Location::Object {
                slot: Slot::Field(0),
                guard: None
            })
        );
    }

    #[test]
    fn test_dual_location_representations() {
        let mut store = storage();
        let int_dual = Location::Dual {
            primitive: Slot::Field(0),
            object: Slot::Field(0),
            ty: DualType::Int,
        };
        int_dual.set(&mut store, Value::Int(5)).unwrap();
        assert_eq!(int_dual.get(&store), Value::Int(5));
        assert!(!int_dual.can_store(&Value::string("x")));

        let Generalization::InPlace(object_dual) =
            int_dual.generalize_for(&Value::string("x"), &ShapeConfig::default())
        else {
            panic!("dual locations generalize in place");
        };
        assert!(object_dual.same_slots(&int_dual));
        object_dual.set(&mut store, Value::string("x")).unwrap();
        assert_eq!(object_dual.get(&store), Value::string("x"));

        let counts = int_dual.slot_counts();
        assert_eq!((counts.primitive_fields, counts.object_fields), (1, 1));
    }

    #[test]
    fn test_int_generalization_targets() {
        let config = ShapeConfig::default();
        let location = Location::Int(Slot::Field(0));
        assert_eq!(
            location.generalize_for(&Value::Double(1.5), &config),
            Generalization::Relocate(LocationKind::Double { allow_int: true })
        );
        assert_eq!(
            location.generalize_for(&Value::string("s"), &config),
            Generalization::Relocate(LocationKind::Object { guard: None })
        );
    }

    #[test]
    fn test_constant_generalization_keeps_old_value() {
        let config = ShapeConfig::default();
        let boolean = Location::Constant(Value::Boolean(true));
        assert_eq!(
            boolean.generalize_for(&Value::Double(0.5), &config),
            Generalization::Relocate(LocationKind::Object { guard: None })
        );

        let int = Location::Constant(Value::Int(1));
        assert_eq!(
            int.generalize_for(&Value::Double(0.5), &config),
            Generalization::Relocate(LocationKind::Double { allow_int: true })
        );
        assert_eq!(
            int.generalize_for(&Value::Int(2), &config),
            Generalization::Relocate(LocationKind::Int)
        );

        let dual = ShapeConfig {
            use_dual_locations: true,
            ..ShapeConfig::default()
        };
        assert_eq!(
            Location::Declared(Value::Double(1.5)).generalize_for(&Value::Int(2), &dual),
            Generalization::Relocate(LocationKind::Dual(DualType::Double))
        );
    }

    #[test]
    fn test_with_slots_of() {
        let guarded = Location::Object {
            slot: Slot::Field(3),
            guard: None,
        };
        let moved = guarded.with_slots_of(&Location::Object {
            slot: Slot::Field(1),
            guard: Some(ValueType::String),
        });
        assert_eq!(
            moved,
            Location::Object {
                slot: Slot::Field(1),
                guard: None
            }
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(Location::Int(Slot::Field(2)).to_string(), "int@2");
        assert_eq!(
            Location::Object {
                slot: Slot::Array(1),
                guard: None
            }
            .to_string(),
            "object[1]"
        );
        assert_eq!(Location::Constant(Value::Int(1)).to_string(), "=1");
    }
}
