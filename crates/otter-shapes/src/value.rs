//! Property values stored in dynamic objects
//!
//! Values take part in transition keys (constant and declared locations carry
//! one), so equality and hashing are structural: doubles compare by bit
//! pattern and objects by identity.

use crate::object::ObjectRef;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// A value held by a dynamic object
#[derive(Clone, Default)]
pub enum Value {
    /// Undefined
    #[default]
    Undefined,
    /// Null
    Null,
    /// Boolean
    Boolean(bool),
    /// 32-bit integer
    Int(i32),
    /// 64-bit integer
    Long(i64),
    /// IEEE 754 double
    Double(f64),
    /// Immutable string
    String(Arc<str>),
    /// Reference to another dynamic object
    Object(ObjectRef),
}

/// Runtime type of a value, used for location type guards
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ValueType {
    /// `Value::Undefined`
    Undefined,
    /// `Value::Null`
    Null,
    /// `Value::Boolean`
    Boolean,
    /// `Value::Int`
    Int,
    /// `Value::Long`
    Long,
    /// `Value::Double`
    Double,
    /// `Value::String`
    String,
    /// `Value::Object`
    Object,
}

impl Value {
    /// Create a string value
    pub fn string(s: &str) -> Self {
        Self::String(Arc::from(s))
    }

    /// Runtime type of this value
    pub fn value_type(&self) -> ValueType {
        match self {
            Self::Undefined => ValueType::Undefined,
            Self::Null => ValueType::Null,
            Self::Boolean(_) => ValueType::Boolean,
            Self::Int(_) => ValueType::Int,
            Self::Long(_) => ValueType::Long,
            Self::Double(_) => ValueType::Double,
            Self::String(_) => ValueType::String,
            Self::Object(_) => ValueType::Object,
        }
    }

    /// True for undefined and null
    pub fn is_nullish(&self) -> bool {
        matches!(self, Self::Undefined | Self::Null)
    }

    /// True for values with an unboxed primitive representation
    pub fn is_primitive(&self) -> bool {
        self.value_type().is_primitive()
    }

    /// Get as i32
    pub fn as_int(&self) -> Option<i32> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Get as f64
    pub fn as_double(&self) -> Option<f64> {
        match self {
            Self::Double(d) => Some(*d),
            _ => None,
        }
    }

    /// Get as str
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get the referenced object
    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Self::Object(obj) => Some(obj),
            _ => None,
        }
    }
}

impl ValueType {
    /// True for types stored in primitive slots
    pub fn is_primitive(self) -> bool {
        matches!(self, Self::Boolean | Self::Int | Self::Long | Self::Double)
    }

    /// Lowercase type name
    pub fn name(self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Null => "null",
            Self::Boolean => "boolean",
            Self::Int => "int",
            Self::Long => "long",
            Self::Double => "double",
            Self::String => "string",
            Self::Object => "object",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Undefined, Self::Undefined) | (Self::Null, Self::Null) => true,
            (Self::Boolean(a), Self::Boolean(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Long(a), Self::Long(b)) => a == b,
            (Self::Double(a), Self::Double(b)) => a.to_bits() == b.to_bits(),
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Self::Undefined | Self::Null => {}
            Self::Boolean(b) => b.hash(state),
            Self::Int(i) => i.hash(state),
            Self::Long(l) => l.hash(state),
            Self::Double(d) => d.to_bits().hash(state),
            Self::String(s) => s.hash(state),
            Self::Object(obj) => (Arc::as_ptr(obj) as *const () as usize).hash(state),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Undefined => f.write_str("undefined"),
            Self::Null => f.write_str("null"),
            Self::Boolean(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Long(l) => write!(f, "{l}L"),
            Self::Double(d) => write!(f, "{d:?}"),
            Self::String(s) => write!(f, "{s:?}"),
            Self::Object(obj) => write!(f, "[object {:p}]", Arc::as_ptr(obj)),
        }
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Self::Int(i)
    }
}

impl From<i64> for Value {
    fn from(l: i64) -> Self {
        Self::Long(l)
    }
}

impl From<f64> for Value {
    fn from(d: f64) -> Self {
        Self::Double(d)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Boolean(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::string(s)
    }
}

impl From<ObjectRef> for Value {
    fn from(obj: ObjectRef) -> Self {
        Self::Object(obj)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustc_hash::FxHashSet;

    #[test]
    fn test_double_equality_by_bits() {
        assert_eq!(Value::Double(f64::NAN), Value::Double(f64::NAN));
        assert_ne!(Value::Double(0.0), Value::Double(-0.0));
        assert_ne!(Value::Int(1), Value::Long(1));
    }

    #[test]
    fn test_value_hash_consistent() {
        let mut set = FxHashSet::default();
        set.insert(Value::string("a"));
        set.insert(Value::string("a"));
        set.insert(Value::Double(1.5));
        set.insert(Value::Double(1.5));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_value_type() {
        assert_eq!(Value::from(1).value_type(), ValueType::Int);
        assert_eq!(Value::from("s").value_type(), ValueType::String);
        assert!(Value::from(true).is_primitive());
        assert!(!Value::Null.is_primitive());
        assert!(Value::Undefined.is_nullish());
    }
}
