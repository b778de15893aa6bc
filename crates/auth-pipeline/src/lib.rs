//! Authenticated request pipeline for the rental API
//!
//! Every credentialed request carries the session's bearer token. When the
//! API answers 401, the pipeline renews the token exactly once no matter how
//! many requests failed concurrently, replays the failed requests with the
//! new token in the order they failed, and if renewal fails, rejects them
//! all, clears the session and publishes `SessionEvent::Invalidated`.
//!
//! Request lifecycle:
//! 1. `Pipeline::send` decorates the request with the current access token
//! 2. The transport sends it; any non-401 outcome is returned as is
//! 3. On 401, `RefreshCoordinator` makes the request the renewal driver, or
//!    parks it in the `RetryQueue` behind the renewal already in flight
//! 4. The driver settles itself and every parked request, in arrival order

pub mod coordinator;
pub mod decorator;
pub mod error;
pub mod events;
mod metrics;
pub mod pipeline;
pub mod queue;

#[cfg(test)]
mod testing;

pub use coordinator::{Phase, RefreshCoordinator};
pub use error::{Error, Result};
pub use events::SessionEvent;
pub use pipeline::Pipeline;
pub use queue::{Drain, PendingRequest, RetryQueue};
