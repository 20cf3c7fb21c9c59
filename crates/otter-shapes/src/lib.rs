//! # Otter Shapes
//!
//! Hidden classes for dynamic objects: canonical, immutable layout
//! descriptors shared by every object that went through the same edits.
//!
//! ## Design Principles
//!
//! - **Canonical**: every edit goes through the transition cache of the shape
//!   it starts from, so equal edit sequences yield the identical `Arc<Shape>`
//! - **Arena-owned**: shapes live in a [`ShapeTree`] and link to each other
//!   through [`ShapeId`] handles
//! - **Typed storage**: [`Location`]s place primitives in unboxed slots and
//!   widen on demand
//! - **Speculation-friendly**: each shape exposes `valid` and `leaf`
//!   [`Assumption`]s that only ever go from valid to invalid
//!
//! ```text
//! root ──add x:int──▶ S1 ──add y:object──▶ S2
//!                      │                    │
//!                      └──────◀ remove x ───┘ (replayed: y moves to slot 0)
//! ```

#![warn(clippy::all)]
#![warn(missing_docs)]

pub mod allocator;
pub mod assumption;
pub mod config;
pub mod error;
pub mod inline_cache;
pub mod location;
pub mod object;
pub mod property;
pub mod property_map;
pub mod shape;
pub mod stats;
pub mod storage;
pub mod transition;
pub mod tree;
pub mod value;

pub use allocator::{Allocator, capacity_for};
pub use assumption::Assumption;
pub use config::ShapeConfig;
pub use error::{ShapeError, ShapeResult};
pub use inline_cache::PropertyCache;
pub use location::{DualType, Generalization, Location, LocationKind, Slot, SlotCounts};
pub use object::{DynamicObject, ObjectRef, PutFlags};
pub use property::{Property, PropertyFlags, PropertyKey};
pub use property_map::PropertyMap;
pub use shape::{LayoutCounts, ObjectKind, Shape, ShapeId};
pub use stats::{ShapeObserver, ShapeStats, ShapeStatsSnapshot};
pub use storage::ObjectStorage;
pub use transition::Transition;
pub use tree::ShapeTree;
pub use value::{Value, ValueType};
