//! Shape tree statistics
//!
//! [`ShapeObserver`] is the hook a [`ShapeTree`](crate::tree::ShapeTree)
//! reports to. [`ShapeStats`] implements it with atomic counters.

use crate::property::Property;
use crate::shape::Shape;
use crate::transition::Transition;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Receives shape tree events. Every hook defaults to a no-op.
pub trait ShapeObserver: Send + Sync {
    /// A shape was allocated
    fn shape_created(&self, _shape: &Shape) {}

    /// A transition was served from the cache of `_from`
    fn transition_hit(&self, _from: &Shape, _transition: &Transition) {}

    /// A new cache entry was recorded on `_from`
    fn transition_added(&self, _from: &Shape, _transition: &Transition, _to: &Shape) {}

    /// A property was widened on `_shape`
    fn property_generalized(&self, _shape: &Shape, _before: &Property, _after: &Property) {}

    /// `_shape` became obsolete
    fn shape_invalidated(&self, _shape: &Shape) {}
}

/// Atomic counters for shape tree events
#[derive(Debug, Default)]
pub struct ShapeStats {
    /// Shapes allocated
    pub shapes_created: AtomicU64,
    /// Transition cache hits
    pub transition_hits: AtomicU64,
    /// Direct cache entries recorded
    pub direct_transitions: AtomicU64,
    /// Indirect (replayed) cache entries recorded
    pub indirect_transitions: AtomicU64,
    /// Property generalizations
    pub generalizations: AtomicU64,
    /// Shapes made obsolete
    pub invalidations: AtomicU64,
}

/// Snapshot of shape stats (for reporting)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ShapeStatsSnapshot {
    /// Shapes allocated
    pub shapes_created: u64,
    /// Transition cache hits
    pub transition_hits: u64,
    /// Direct cache entries recorded
    pub direct_transitions: u64,
    /// Indirect cache entries recorded
    pub indirect_transitions: u64,
    /// Property generalizations
    pub generalizations: u64,
    /// Shapes made obsolete
    pub invalidations: u64,
}

impl ShapeStats {
    /// Create zeroed counters
    pub fn new() -> Self {
        Self::default()
    }

    /// Get snapshot of current stats
    pub fn snapshot(&self) -> ShapeStatsSnapshot {
        ShapeStatsSnapshot {
            shapes_created: self.shapes_created.load(Ordering::Relaxed),
            transition_hits: self.transition_hits.load(Ordering::Relaxed),
            direct_transitions: self.direct_transitions.load(Ordering::Relaxed),
            indirect_transitions: self.indirect_transitions.load(Ordering::Relaxed),
            generalizations: self.generalizations.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
        }
    }

    /// Reset all counters
    pub fn reset(&self) {
        self.shapes_created.store(0, Ordering::Relaxed);
        self.transition_hits.store(0, Ordering::Relaxed);
        self.direct_transitions.store(0, Ordering::Relaxed);
        self.indirect_transitions.store(0, Ordering::Relaxed);
        self.generalizations.store(0, Ordering::Relaxed);
        self.invalidations.store(0, Ordering::Relaxed);
    }
}

impl ShapeObserver for ShapeStats {
    #[inline]
    fn shape_created(&self, _shape: &Shape) {
        self.shapes_created.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    fn transition_hit(&self, _from: &Shape, _transition: &Transition) {
        self.transition_hits.fetch_add(1, Ordering::Relaxed);
    }

    fn transition_added(&self, _from: &Shape, transition: &Transition, _to: &Shape) {
        let counter = if transition.is_direct() {
            &self.direct_transitions
        } else {
            &self.indirect_transitions
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn property_generalized(&self, _shape: &Shape, _before: &Property, _after: &Property) {
        self.generalizations.fetch_add(1, Ordering::Relaxed);
    }

    fn shape_invalidated(&self, _shape: &Shape) {
        self.invalidations.fetch_add(1, Ordering::Relaxed);
    }
}
