//! Rental API authentication endpoints
//!
//! Paths are relative to the configured API base URL. All of them are
//! public: they are called without an access credential.

/// Password login, returns an access token and optionally a renewal token
pub const LOGIN_PATH: &str = "/login";

/// User login, credentials as query parameters; always issues a renewal token
pub const USER_LOGIN_PATH: &str = "/users/login";

/// Renewal endpoint, trades a renewal token for a fresh access token
pub const REFRESH_PATH: &str = "/refresh";

/// Account creation
pub const SIGNUP_PATH: &str = "/users/";

/// Health check
pub const HEALTH_PATH: &str = "/";

/// Token type attached to the `Authorization` header
pub const BEARER: &str = "Bearer";
