//! Session domain - identity, lifecycle state, registry, admission

mod admission;
mod registry;
mod token;

pub use admission::AdmissionController;
pub use registry::SessionRegistry;
pub use token::{RandomIdGenerator, SessionIdGenerator, SessionToken};

/// Lifecycle state of a bridged session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Duplex connection requested, not yet confirmed open
    Pending,
    /// Duplex connection confirmed, relay active
    Open,
    /// Terminal; the session is no longer in the registry
    Closed,
}

impl SessionState {
    /// Check whether the session still counts against the admission limit
    #[must_use]
    pub fn is_live(self) -> bool {
        matches!(self, Self::Pending | Self::Open)
    }
}
