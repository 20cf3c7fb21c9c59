//! Properties: a key bound to a location plus flags

use crate::assumption::Assumption;
use crate::error::ShapeResult;
use crate::location::Location;
use crate::storage::ObjectStorage;
use crate::value::Value;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::BitOr;
use std::sync::Arc;

/// Property key (string, symbol or integer index)
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PropertyKey {
    /// String property key
    String(Arc<str>),
    /// Symbol property key
    Symbol(u64),
    /// Integer index
    Index(u32),
}

impl PropertyKey {
    /// Create a string property key
    pub fn string(s: &str) -> Self {
        Self::String(Arc::from(s))
    }

    /// Create a symbol property key
    pub fn symbol(id: u64) -> Self {
        Self::Symbol(id)
    }

    /// Create an index property key
    pub fn index(i: u32) -> Self {
        Self::Index(i)
    }
}

impl From<&str> for PropertyKey {
    fn from(s: &str) -> Self {
        Self::string(s)
    }
}

impl From<u32> for PropertyKey {
    fn from(i: u32) -> Self {
        Self::Index(i)
    }
}

impl fmt::Display for PropertyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => f.write_str(s),
            Self::Symbol(id) => write!(f, "Symbol({id})"),
            Self::Index(i) => write!(f, "{i}"),
        }
    }
}

/// Property flags.
///
/// The low bits are opaque to the shape system and belong to the embedder;
/// the two top bits are reserved.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct PropertyFlags(u32);

impl PropertyFlags {
    /// No flags
    pub const NONE: Self = Self(0);
    /// Excluded from key enumeration
    pub const HIDDEN: Self = Self(1 << 30);
    /// Redefinition of a declared property
    pub const SHADOW: Self = Self(1 << 31);

    const RESERVED: u32 = Self::HIDDEN.0 | Self::SHADOW.0;

    /// Embedder-defined flags; reserved bits are dropped
    pub const fn user(bits: u32) -> Self {
        Self(bits & !Self::RESERVED)
    }

    /// Raw bits
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Embedder bits only
    pub const fn user_bits(self) -> u32 {
        self.0 & !Self::RESERVED
    }

    /// Check whether every bit of `other` is set
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Flags with `other` removed
    pub const fn without(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }
}

impl BitOr for PropertyFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// A property of a shape.
///
/// Equality is structural (key, location, flags, relocatability). Use
/// [`Property::is_same`] to compare properties across a relocation.
///
/// A property stored in the object carries a final-value assumption. It is
/// shared by every copy that keeps the same location and replaced whenever
/// the location changes, so it belongs to the location rather than to one
/// shape.
#[derive(Clone, Debug)]
pub struct Property {
    key: PropertyKey,
    location: Location,
    flags: PropertyFlags,
    relocatable: bool,
    final_assumption: Option<Arc<Assumption>>,
}

fn final_assumption_for(location: &Location) -> Option<Arc<Assumption>> {
    (!location.is_value()).then(|| Arc::new(Assumption::new("final location")))
}

impl Property {
    /// Create a relocatable property
    pub fn new(key: impl Into<PropertyKey>, location: Location, flags: PropertyFlags) -> Self {
        Self {
            key: key.into(),
            final_assumption: final_assumption_for(&location),
            location,
            flags,
            relocatable: true,
        }
    }

    /// Create a property pinned to its location
    pub fn unrelocatable(
        key: impl Into<PropertyKey>,
        location: Location,
        flags: PropertyFlags,
    ) -> Self {
        Self {
            relocatable: false,
            ..Self::new(key, location, flags)
        }
    }

    /// Property key
    pub fn key(&self) -> &PropertyKey {
        &self.key
    }

    /// Storage location
    pub fn location(&self) -> &Location {
        &self.location
    }

    /// Flags
    pub fn flags(&self) -> PropertyFlags {
        self.flags
    }

    /// True unless pinned to its location
    pub fn is_relocatable(&self) -> bool {
        self.relocatable
    }

    /// Excluded from enumeration
    pub fn is_hidden(&self) -> bool {
        self.flags.contains(PropertyFlags::HIDDEN)
    }

    /// Redefinition of a declared property
    pub fn is_shadow(&self) -> bool {
        self.flags.contains(PropertyFlags::SHADOW)
    }

    /// Holds while every write through this location stored the value that
    /// was already there; constant and declared locations are always final
    pub fn is_assumed_final(&self) -> bool {
        self.final_assumption
            .as_ref()
            .is_none_or(|assumption| assumption.is_valid())
    }

    /// Final-value assumption of an instance location
    pub fn final_assumption(&self) -> Option<&Arc<Assumption>> {
        self.final_assumption.as_ref()
    }

    /// Write `value` through the location.
    ///
    /// A write that changes what the location reads back invalidates the
    /// final-value assumption. Initializing writes go through
    /// [`Location::set`] directly.
    pub fn set(&self, storage: &mut ObjectStorage, value: Value) -> ShapeResult<()> {
        let Some(assumption) = self.final_assumption.as_deref().filter(|a| a.is_valid()) else {
            return self.location.set(storage, value);
        };
        let before = self.location.get(storage);
        self.location.set(storage, value)?;
        if self.location.get(storage) != before {
            assumption.invalidate();
        }
        Ok(())
    }

    /// Same key and flags, regardless of location
    pub fn is_same(&self, other: &Property) -> bool {
        self.key == other.key && self.flags == other.flags
    }

    /// Copy bound to `location`; no-op for unrelocatable properties
    pub fn relocate(&self, location: Location) -> Property {
        if !self.relocatable || self.location == location {
            return self.clone();
        }
        Property {
            final_assumption: final_assumption_for(&location),
            location,
            ..self.clone()
        }
    }

    /// Copy with different flags
    pub fn copy_with_flags(&self, flags: PropertyFlags) -> Property {
        Property {
            flags,
            ..self.clone()
        }
    }

    /// Copy bound to `location`, even if unrelocatable.
    ///
    /// Used for in-place representation changes that keep the slots.
    pub(crate) fn with_location(&self, location: Location) -> Property {
        Property {
            final_assumption: final_assumption_for(&location),
            location,
            ..self.clone()
        }
    }
}

impl PartialEq for Property {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
            && self.location == other.location
            && self.flags == other.flags
            && self.relocatable == other.relocatable
    }
}

impl Eq for Property {}

impl Hash for Property {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
        self.location.hash(state);
        self.flags.hash(state);
        self.relocatable.hash(state);
    }
}

impl fmt::Display for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.key, self.location)?;
        if self.flags != PropertyFlags::NONE {
            write!(f, "%{:#x}", self.flags.bits())?;
        }
        Ok(())
    }
}
