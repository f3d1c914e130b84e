//! Low-memory guard for bulk fetches.

use crate::error::{Error, Result};

/// Reports free heap.
pub trait MemoryProbe: Send + Sync {
    /// Free bytes, or `None` if unknown.
    fn free_bytes(&self) -> Option<usize>;
}

impl<F> MemoryProbe for F
where
    F: Fn() -> Option<usize> + Send + Sync,
{
    fn free_bytes(&self) -> Option<usize> {
        self()
    }
}

/// Stops bulk work before free memory drops under a floor.
///
/// With no probe installed every check passes.
#[derive(Default)]
pub struct MemoryGuard {
    probe: Option<Box<dyn MemoryProbe>>,
    min_free: usize,
}

impl std::fmt::Debug for MemoryGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryGuard")
            .field("probe", &self.probe.is_some())
            .field("min_free", &self.min_free)
            .finish()
    }
}

impl MemoryGuard {
    /// Creates a guard.
    #[must_use]
    pub fn new(probe: impl MemoryProbe + 'static, min_free: usize) -> Self {
        Self {
            probe: Some(Box::new(probe)),
            min_free,
        }
    }

    /// A guard that never trips.
    #[must_use]
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Checks the floor.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfMemory`] when the probe reports less than the
    /// floor.
    pub fn check(&self) -> Result<()> {
        match self.probe.as_ref().and_then(|p| p.free_bytes()) {
            Some(available) if available < self.min_free => Err(Error::OutOfMemory {
                available,
                required: self.min_free,
            }),
            _ => Ok(()),
        }
    }

    /// Returns true if [`MemoryGuard::check`] would pass.
    #[must_use]
    pub fn has_headroom(&self) -> bool {
        self.check().is_ok()
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_trips_under_floor() {
        let guard = MemoryGuard::new(|| Some(1_000), 4_096);
        assert!(matches!(
            guard.check(),
            Err(Error::OutOfMemory { available: 1_000, required: 4_096 })
        ));
        assert!(MemoryGuard::new(|| Some(8_192), 4_096).has_headroom());
        assert!(MemoryGuard::new(|| None, 4_096).has_headroom());
        assert!(MemoryGuard::disabled().has_headroom());
    }
}
