//! Error types for the authenticated request pipeline

use transport::TransportError;

/// Errors surfaced to callers of `Pipeline::send`.
///
/// `Clone` so one renewal outcome can be fanned out to every parked request.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// The access token was rejected again after a successful renewal.
    #[error("unauthorized: access token rejected after renewal")]
    Unauthorized,

    /// The renewal endpoint rejected the renewal token or was unreachable.
    /// The session has been cleared.
    #[error("credential renewal failed: {0}")]
    RenewalFailed(String),

    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Caller bug, e.g. parking a request while no renewal is in progress.
    #[error("contract violation: {0}")]
    Contract(String),

    /// The renewal driver went away before this request was settled.
    #[error("cancelled: {0}")]
    Cancelled(String),

    #[error("session error: {0}")]
    Session(#[from] session::Error),
}

/// Result alias for pipeline operations.
pub type Result<T> = std::result::Result<T, Error>;
