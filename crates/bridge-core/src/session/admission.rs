//! Admission control
//!
//! Bounds the number of concurrent sessions. Capacity is re-evaluated on
//! every new-session request rather than reserved in advance; the caller
//! must pair `has_capacity` with registration inside one critical section
//! to avoid over-admission.

use super::SessionRegistry;
use crate::error::BridgeError;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Policy bounding concurrent sessions
pub struct AdmissionController {
    limit: AtomicUsize,
}

impl AdmissionController {
    /// Create a controller with the given limit
    ///
    /// Fails with `InvalidLimit` unless `limit >= 1`; invalid values are
    /// rejected, never clamped.
    pub fn new(limit: usize) -> Result<Self, BridgeError> {
        if limit == 0 {
            return Err(BridgeError::InvalidLimit(limit));
        }
        Ok(Self {
            limit: AtomicUsize::new(limit),
        })
    }

    /// Current limit
    pub fn limit(&self) -> usize {
        self.limit.load(Ordering::Acquire)
    }

    /// Replace the limit at runtime
    pub fn set_limit(&self, limit: usize) -> Result<(), BridgeError> {
        if limit == 0 {
            return Err(BridgeError::InvalidLimit(limit));
        }
        self.limit.store(limit, Ordering::Release);
        Ok(())
    }

    /// Check whether another session may be admitted
    pub fn has_capacity<S>(&self, registry: &SessionRegistry<S>) -> bool {
        registry.size() < self.limit()
    }
}

impl std::fmt::Debug for AdmissionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdmissionController")
            .field("limit", &self.limit())
            .finish()
    }
}
