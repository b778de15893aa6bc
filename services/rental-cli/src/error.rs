//! Service-specific error types

use thiserror::Error;

/// Errors from resolving what the user asked for, before any API call.
///
/// API and session failures are reported through `anyhow` with the
/// underlying `rental_api::ApiError` as source.
#[derive(Error, Debug)]
pub enum Error {
    #[error("no account email: pass --email or set [account] email in the config")]
    MissingAccount,

    #[error("no password: set RENTAL_PASSWORD or [account] password_file")]
    MissingPassword,
}

/// Result alias using service Error
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_messages_say_how_to_fix() {
        assert!(Error::MissingAccount.to_string().contains("--email"));
        assert!(Error::MissingPassword.to_string().contains("RENTAL_PASSWORD"));
    }
}
