//! Shape system error types

use crate::shape::ShapeId;
use crate::value::ValueType;
use thiserror::Error;

/// Errors raised by locations, shapes and object storage
#[derive(Debug, Error)]
pub enum ShapeError {
    /// Value does not fit a typed location.
    ///
    /// Recovered by generalizing the property; never escapes `DynamicObject::put`.
    #[error("IncompatibleLocation: {location} location cannot store a {found} value")]
    IncompatibleLocation {
        /// Location kind that rejected the value
        location: &'static str,
        /// Type of the rejected value
        found: ValueType,
    },

    /// Write to a final or constant location
    #[error("FinalLocation: cannot redefine {0}")]
    FinalLocation(String),

    /// Property with the same key is already visible
    #[error("DuplicateProperty: {0} is already defined")]
    DuplicateProperty(String),

    /// Property is not part of the shape
    #[error("MissingProperty: {0} is not defined")]
    MissingProperty(String),

    /// Shapes do not share a root
    #[error("UnrelatedShapes: {0} and {1} have different roots")]
    UnrelatedShapes(ShapeId, ShapeId),

    /// Shape stores values per object and cannot be reset to
    #[error("InstanceProperties: {0} has instance properties")]
    InstanceProperties(ShapeId),

    /// Foreign shape passed to a tree
    #[error("ForeignShape: {0} belongs to another tree")]
    ForeignShape(ShapeId),

    /// Configuration could not be parsed
    #[error("InvalidConfig: {0}")]
    InvalidConfig(#[from] serde_json::Error),
}

/// Result type for shape operations
pub type ShapeResult<T> = Result<T, ShapeError>;

impl ShapeError {
    /// Create an incompatible location error
    pub fn incompatible(location: &'static str, found: ValueType) -> Self {
        Self::IncompatibleLocation { location, found }
    }

    /// Create a final location error
    pub fn final_location(what: impl Into<String>) -> Self {
        Self::FinalLocation(what.into())
    }

    /// Create a duplicate property error
    pub fn duplicate(key: impl Into<String>) -> Self {
        Self::DuplicateProperty(key.into())
    }

    /// Create a missing property error
    pub fn missing(key: impl Into<String>) -> Self {
        Self::MissingProperty(key.into())
    }

    /// True if the object layer can recover by moving to another shape
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::IncompatibleLocation { .. } | Self::FinalLocation(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ShapeError::incompatible("int", ValueType::String);
        assert_eq!(
            err.to_string(),
            "IncompatibleLocation: int location cannot store a string value"
        );

        let err = ShapeError::duplicate("x");
        assert_eq!(err.to_string(), "DuplicateProperty: x is already defined");
    }

    #[test]
    fn test_recoverable() {
        assert!(ShapeError::incompatible("int", ValueType::Double).is_recoverable());
        assert!(ShapeError::final_location("=1").is_recoverable());
        assert!(!ShapeError::duplicate("x").is_recoverable());
        assert!(!ShapeError::UnrelatedShapes(ShapeId::new(0), ShapeId::new(1)).is_recoverable());
        assert!(!ShapeError::InstanceProperties(ShapeId::new(2)).is_recoverable());
    }
}
