//! Invalidate-once assumptions
//!
//! Speculating code reads `is_valid()` every time it relies on the assumption;
//! it never caches the boolean.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

/// A flag that starts valid and can only ever become invalid
pub struct Assumption {
    name: &'static str,
    valid: AtomicBool,
}

impl Assumption {
    /// Create a valid assumption
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            valid: AtomicBool::new(true),
        }
    }

    /// Name used in diagnostics
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Check whether the assumption still holds
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }

    /// Invalidate the assumption.
    ///
    /// Returns true if this call performed the invalidation.
    pub fn invalidate(&self) -> bool {
        self.valid.swap(false, Ordering::AcqRel)
    }
}

impl fmt::Debug for Assumption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Assumption({}{})",
            self.name,
            if self.is_valid() { "" } else { ", invalid" }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalidate_once() {
        let assumption = Assumption::new("leaf");
        assert!(assumption.is_valid());
        assert!(assumption.invalidate());
        assert!(!assumption.is_valid());
        assert!(!assumption.invalidate());
        assert!(!assumption.is_valid());
    }
}
