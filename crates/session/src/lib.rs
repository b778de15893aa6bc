//! Session credentials for the rental API client
//!
//! Holds the credential pair (access + renewal token) and performs the two
//! calls that produce one: password login and token renewal. This crate
//! knows nothing about request replay; the auth pipeline builds on it.
//!
//! Credential flow:
//! 1. `token::login()` exchanges email/password for a `TokenResponse`
//! 2. The pair is stored via `CredentialStore::set()`
//! 3. On a 401, the pipeline calls `token::renew()` with the renewal token
//! 4. The new access token is saved via `CredentialStore::apply_renewal()`
//! 5. If renewal fails, `CredentialStore::clear()` ends the session

pub mod constants;
pub mod credentials;
pub mod error;
pub mod token;

pub use constants::*;
pub use credentials::{Credential, CredentialStore};
pub use error::{Error, Result};
pub use token::{TokenResponse, login, renew};
