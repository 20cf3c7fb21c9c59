//! Slot allocation for new locations
//!
//! An [`Allocator`] is a throwaway cursor seeded from a shape's
//! [`LayoutCounts`]. It hands out the next free slot of each category and is
//! dropped once the next shape has been built; it never touches a published
//! shape.

use crate::config::ShapeConfig;
use crate::location::{Location, LocationKind, Slot};
use crate::shape::LayoutCounts;
use crate::value::Value;

/// Physical overflow-array capacity for `size` logical slots.
///
/// Exact below 4, multiples of 8 below 32, multiples of 16 above.
pub fn capacity_for(size: usize) -> usize {
    if size < 4 {
        size
    } else if size < 32 {
        size.next_multiple_of(8)
    } else {
        size.next_multiple_of(16)
    }
}

/// Layout cursor used while building one shape
#[derive(Debug)]
pub struct Allocator<'a> {
    config: &'a ShapeConfig,
    layout: LayoutCounts,
}

impl<'a> Allocator<'a> {
    /// Start allocating after the slots already used by `layout`
    pub fn new(config: &'a ShapeConfig, layout: LayoutCounts) -> Self {
        Self { config, layout }
    }

    /// Layout including every slot handed out so far
    pub fn layout(&self) -> LayoutCounts {
        self.layout
    }

    /// Allocate a location of `kind`.
    ///
    /// Primitive kinds fall back to an unguarded object slot (boxing) when no
    /// primitive slot is available.
    pub fn add_location(&mut self, kind: LocationKind) -> Location {
        match kind {
            LocationKind::Object { guard } => Location::Object {
                slot: self.object_slot(),
                guard,
            },
            LocationKind::Dual(ty) => match self.primitive_slot() {
                Some(primitive) => Location::Dual {
                    primitive,
                    object: self.object_slot(),
                    ty,
                },
                None => self.boxed(),
            },
            LocationKind::Int => self.primitive_slot().map_or_else(|| self.boxed(), Location::Int),
            LocationKind::Boolean => self
                .primitive_slot()
                .map_or_else(|| self.boxed(), Location::Boolean),
            LocationKind::Long { allow_int } => self
                .primitive_slot()
                .map_or_else(|| self.boxed(), |slot| Location::Long { slot, allow_int }),
            LocationKind::Double { allow_int } => self
                .primitive_slot()
                .map_or_else(|| self.boxed(), |slot| Location::Double { slot, allow_int }),
        }
    }

    /// Allocate the preferred location for `value`
    pub fn location_for_value(&mut self, value: &Value) -> Location {
        self.add_location(LocationKind::for_value(value, self.config))
    }

    /// Location holding a fixed value
    pub fn constant_location(&self, value: Value) -> Location {
        Location::Constant(value)
    }

    /// Location holding a placeholder until the first assignment
    pub fn declared_location(&self, value: Value) -> Location {
        Location::Declared(value)
    }

    /// Allocate an equivalent location for a property moving onto this layout
    pub fn move_location(&mut self, old: &Location) -> Location {
        match old.kind() {
            Some(kind) => self.add_location(kind),
            None => old.clone(),
        }
    }

    /// Account for a location allocated elsewhere so later slots do not collide
    pub fn add_existing(&mut self, location: &Location) {
        match location.primitive_slot() {
            Some(Slot::Field(i)) => {
                self.layout.primitive_fields = self.layout.primitive_fields.max(i + 1)
            }
            Some(Slot::Array(i)) => {
                self.layout.has_primitive_array = true;
                self.layout.primitive_array_len = self.layout.primitive_array_len.max(i + 1);
            }
            None => {}
        }
        match location.object_slot() {
            Some(Slot::Field(i)) => self.layout.object_fields = self.layout.object_fields.max(i + 1),
            Some(Slot::Array(i)) => {
                self.layout.object_array_len = self.layout.object_array_len.max(i + 1)
            }
            None => {}
        }
    }

    /// True if storing a `kind` value needs the primitive array reserved first
    pub fn needs_primitive_array(&self, kind: LocationKind) -> bool {
        kind.needs_primitive()
            && self.config.allow_primitive_array
            && !self.layout.has_primitive_array
            && self.layout.primitive_fields >= self.config.inline_primitive_fields
    }

    /// Mark the primitive overflow array as present
    pub fn reserve_primitive_array(&mut self) {
        self.layout.has_primitive_array = true;
    }

    fn boxed(&mut self) -> Location {
        Location::Object {
            slot: self.object_slot(),
            guard: None,
        }
    }

    fn object_slot(&mut self) -> Slot {
        if self.layout.object_fields < self.config.inline_object_fields {
            self.layout.object_fields += 1;
            Slot::Field(self.layout.object_fields - 1)
        } else {
            self.layout.object_array_len += 1;
            Slot::Array(self.layout.object_array_len - 1)
        }
    }

    fn primitive_slot(&mut self) -> Option<Slot> {
        if self.layout.primitive_fields < self.config.inline_primitive_fields {
            self.layout.primitive_fields += 1;
            Some(Slot::Field(self.layout.primitive_fields - 1))
        } else if self.layout.has_primitive_array {
            self.layout.primitive_array_len += 1;
            Some(Slot::Array(self.layout.primitive_array_len - 1))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ValueType;

    #[test]
    fn test_capacity_policy() {
        assert_eq!(capacity_for(0), 0);
        assert_eq!(capacity_for(3), 3);
        assert_eq!(capacity_for(4), 8);
        assert_eq!(capacity_for(9), 16);
        assert_eq!(capacity_for(31), 32);
        assert_eq!(capacity_for(32), 32);
        assert_eq!(capacity_for(33), 48);
    }

    #[test]
    fn test_fields_then_array() {
        let config = ShapeConfig {
            inline_object_fields: 1,
            ..Default::default()
        };
        let mut allocator = Allocator::new(&config, LayoutCounts::default());
        let first = allocator.location_for_value(&Value::string("a"));
        let second = allocator.location_for_value(&Value::string("b"));
        assert_eq!(
            first,
            Location::Object {
                slot: Slot::Field(0),
                guard: Some(ValueType::String)
            }
        );
        assert_eq!(second.object_slot(), Some(Slot::Array(0)));
        assert_eq!(allocator.layout().object_fields, 1);
        assert_eq!(allocator.layout().object_array_len, 1);
    }

    #[test]
    fn test_primitive_boxed_without_array() {
        let config = ShapeConfig {
            inline_primitive_fields: 0,
            allow_primitive_array: false,
            ..Default::default()
        };
        let mut allocator = Allocator::new(&config, LayoutCounts::default());
        assert!(!allocator.needs_primitive_array(LocationKind::Int));
        let location = allocator.location_for_value(&Value::Int(1));
        assert_eq!(
            location,
            Location::Object {
                slot: Slot::Field(0),
                guard: None
            }
        );
    }

    #[test]
    fn test_primitive_array_after_reservation() {
        let config = ShapeConfig::array_only();
        let mut allocator = Allocator::new(&config, LayoutCounts::default());
        assert!(allocator.needs_primitive_array(LocationKind::Int));
        allocator.reserve_primitive_array();
        assert!(!allocator.needs_primitive_array(LocationKind::Int));
        assert_eq!(
            allocator.location_for_value(&Value::Int(1)),
            Location::Int(Slot::Array(0))
        );
        assert_eq!(allocator.layout().primitive_array_len, 1);
    }

    #[test]
    fn test_move_and_existing() {
        let config = ShapeConfig::default();
        let mut allocator = Allocator::new(&config, LayoutCounts::default());
        let moved = allocator.move_location(&Location::Int(Slot::Field(3)));
        assert_eq!(moved, Location::Int(Slot::Field(0)));

        allocator.add_existing(&Location::Object {
            slot: Slot::Field(2),
            guard: None,
        });
        assert_eq!(allocator.layout().object_fields, 3);
        let constant = Location::Constant(Value::Int(1));
        assert_eq!(allocator.move_location(&constant), constant);
    }
}
