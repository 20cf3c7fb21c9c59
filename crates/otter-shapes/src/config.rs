//! Shape tree configuration

use serde::{Deserialize, Serialize};

use crate::error::ShapeResult;

/// Layout and location-selection settings shared by every shape of a tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ShapeConfig {
    /// Inline object fields per object (default: 4)
    pub inline_object_fields: u32,
    /// Inline primitive fields per object (default: 4)
    pub inline_primitive_fields: u32,
    /// Spill primitives into a primitive overflow array instead of boxing
    /// them once inline primitive fields are exhausted (default: true)
    pub allow_primitive_array: bool,
    /// Use dual locations for primitive values (default: false)
    pub use_dual_locations: bool,
    /// Guard object locations by the type of their first value (default: true)
    pub type_guard_objects: bool,
    /// Double locations accept ints (default: true)
    pub allow_int_to_double: bool,
    /// Long locations accept ints (default: true)
    pub allow_int_to_long: bool,
}

impl Default for ShapeConfig {
    fn default() -> Self {
        Self {
            inline_object_fields: 4,
            inline_primitive_fields: 4,
            allow_primitive_array: true,
            use_dual_locations: false,
            type_guard_objects: true,
            allow_int_to_double: true,
            allow_int_to_long: true,
        }
    }
}

impl ShapeConfig {
    /// Create a config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a (possibly partial) JSON config; missing fields keep defaults
    pub fn from_json(json: &str) -> ShapeResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Config that stores every primitive in a dual location
    pub fn dual() -> Self {
        Self {
            use_dual_locations: true,
            ..Default::default()
        }
    }

    /// Config without inline fields: every slot lives in an overflow array
    pub fn array_only() -> Self {
        Self {
            inline_object_fields: 0,
            inline_primitive_fields: 0,
            ..Default::default()
        }
    }
}
