//! Session lifecycle signal
//!
//! The pipeline emits `Invalidated` when a renewal fails and the session has
//! been cleared. Front-ends subscribe and route the user back to login.

/// Event published on the pipeline's broadcast channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Re-authentication is required
    Invalidated { reason: String },
}

/// Buffered events per subscriber before the oldest are dropped
pub(crate) const EVENT_CAPACITY: usize = 16;
