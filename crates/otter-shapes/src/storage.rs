//! Raw per-object slot storage
//!
//! Inline fields are sized exactly to the shape layout. Overflow arrays are
//! sized with [`capacity_for`] so that small layout changes reuse the
//! existing allocation.

use crate::allocator::capacity_for;
use crate::location::Slot;
use crate::shape::LayoutCounts;
use crate::value::Value;

/// Slot vectors backing one dynamic object
#[derive(Debug, Default, Clone)]
pub struct ObjectStorage {
    object_fields: Vec<Value>,
    object_array: Vec<Value>,
    primitive_fields: Vec<u64>,
    primitive_array: Option<Vec<u64>>,
}

impl ObjectStorage {
    /// Create empty storage
    pub fn new() -> Self {
        Self::default()
    }

    /// Create storage large enough for `layout`
    pub fn for_layout(layout: &LayoutCounts) -> Self {
        let mut storage = Self::new();
        storage.resize(layout);
        storage
    }

    /// Grow or trim every slot vector to match `layout`
    pub fn resize(&mut self, layout: &LayoutCounts) {
        self.object_fields
            .resize(layout.object_fields as usize, Value::Undefined);
        self.primitive_fields
            .resize(layout.primitive_fields as usize, 0);
        resize_array(&mut self.object_array, layout.object_array_len as usize, Value::Undefined);

        if layout.has_primitive_array {
            let array = self.primitive_array.get_or_insert_with(Vec::new);
            resize_array(array, layout.primitive_array_len as usize, 0);
        } else {
            self.primitive_array = None;
        }
    }

    /// True if every slot required by `layout` is physically present
    pub fn fits(&self, layout: &LayoutCounts) -> bool {
        self.object_fields.len() >= layout.object_fields as usize
            && self.primitive_fields.len() >= layout.primitive_fields as usize
            && self.object_array.len() >= layout.object_array_len as usize
            && match &self.primitive_array {
                Some(array) => array.len() >= layout.primitive_array_len as usize,
                None => !layout.has_primitive_array && layout.primitive_array_len == 0,
            }
    }

    /// Read an object slot
    #[inline]
    pub fn read_object(&self, slot: Slot) -> &Value {
        match slot {
            Slot::Field(i) => &self.object_fields[i as usize],
            Slot::Array(i) => &self.object_array[i as usize],
        }
    }

    /// Write an object slot
    #[inline]
    pub fn write_object(&mut self, slot: Slot, value: Value) {
        match slot {
            Slot::Field(i) => self.object_fields[i as usize] = value,
            Slot::Array(i) => self.object_array[i as usize] = value,
        }
    }

    /// Read a primitive slot as raw bits
    #[inline]
    pub fn read_primitive(&self, slot: Slot) -> u64 {
        match slot {
            Slot::Field(i) => self.primitive_fields[i as usize],
            Slot::Array(i) => self.primitive_array_ref()[i as usize],
        }
    }

    /// Write raw bits to a primitive slot
    #[inline]
    pub fn write_primitive(&mut self, slot: Slot, bits: u64) {
        match slot {
            Slot::Field(i) => self.primitive_fields[i as usize] = bits,
            Slot::Array(i) => self.primitive_array_mut()[i as usize] = bits,
        }
    }

    /// Number of inline object slots
    pub fn object_field_count(&self) -> usize {
        self.object_fields.len()
    }

    /// Number of inline primitive slots
    pub fn primitive_field_count(&self) -> usize {
        self.primitive_fields.len()
    }

    /// Physical capacity of the object overflow array
    pub fn object_array_capacity(&self) -> usize {
        self.object_array.len()
    }

    /// Physical capacity of the primitive overflow array, if reserved
    pub fn primitive_array_capacity(&self) -> Option<usize> {
        self.primitive_array.as_ref().map(Vec::len)
    }

    fn primitive_array_ref(&self) -> &[u64] {
        self.primitive_array.as_deref().unwrap_or(&[])
    }

    fn primitive_array_mut(&mut self) -> &mut [u64] {
        self.primitive_array.as_deref_mut().unwrap_or(&mut [])
    }
}

/// Reallocate an overflow array only when the rounded capacity changes
fn resize_array<T: Clone>(array: &mut Vec<T>, len: usize, fill: T) {
    let capacity = capacity_for(len);
    if array.len() != capacity {
        array.resize(capacity, fill);
        array.shrink_to_fit();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout(object_fields: u32, object_array_len: u32) -> LayoutCounts {
        LayoutCounts {
            object_fields,
            object_array_len,
            ..LayoutCounts::default()
        }
    }

    #[test]
    fn test_resize_exact_fields_rounded_arrays() {
        let mut storage = ObjectStorage::new();
        storage.resize(&layout(2, 5));
        assert_eq!(storage.object_field_count(), 2);
        assert_eq!(storage.object_array_capacity(), 8);
        assert!(storage.fits(&layout(2, 5)));

        // Growing within the rounded capacity keeps the array
        storage.resize(&layout(2, 7));
        assert_eq!(storage.object_array_capacity(), 8);

        storage.resize(&layout(1, 0));
        assert_eq!(storage.object_field_count(), 1);
        assert_eq!(storage.object_array_capacity(), 0);
    }

    #[test]
    fn test_primitive_array_reservation() {
        let mut storage = ObjectStorage::new();
        let mut counts = LayoutCounts {
            has_primitive_array: true,
            primitive_array_len: 2,
            ..LayoutCounts::default()
        };
        storage.resize(&counts);
        assert_eq!(storage.primitive_array_capacity(), Some(2));

        storage.write_primitive(Slot::Array(1), 42);
        assert_eq!(storage.read_primitive(Slot::Array(1)), 42);

        counts.has_primitive_array = false;
        counts.primitive_array_len = 0;
        storage.resize(&counts);
        assert_eq!(storage.primitive_array_capacity(), None);
    }

    #[test]
    fn test_object_slots() {
        let mut storage = ObjectStorage::for_layout(&layout(1, 1));
        storage.write_object(Slot::Field(0), Value::Int(1));
        storage.write_object(Slot::Array(0), Value::string("a"));
        assert_eq!(storage.read_object(Slot::Field(0)), &Value::Int(1));
        assert_eq!(storage.read_object(Slot::Array(0)), &Value::string("a"));
    }
}
