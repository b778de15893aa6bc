//! Error types for rental API calls

/// Errors returned by `RentalApi`.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Pipeline(#[from] auth_pipeline::Error),

    #[error("API returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("failed to decode response: {0}")]
    Decode(String),
}

impl ApiError {
    /// The session is gone and the user has to log in again.
    pub fn requires_login(&self) -> bool {
        matches!(
            self,
            Self::Pipeline(auth_pipeline::Error::RenewalFailed(_) | auth_pipeline::Error::Unauthorized)
        )
    }
}

/// Result alias for rental API calls.
pub type Result<T> = std::result::Result<T, ApiError>;
