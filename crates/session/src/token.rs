//! Login and token renewal
//!
//! Handles the token-producing interactions with the rental API:
//! 1. Password login (`POST /login`), falling back to `POST /users/login`
//!    when the first answer carries no renewal token
//! 2. Token renewal (`POST /refresh`)
//!
//! Both are public calls: they go straight to the transport without the
//! access credential and never trigger renewal themselves.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use transport::{ApiRequest, ApiResponse, Transport};

use crate::constants::{LOGIN_PATH, REFRESH_PATH, USER_LOGIN_PATH};
use crate::error::{Error, Result};

/// Response from the login and renewal endpoints.
#[derive(Debug, Deserialize, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default = "bearer")]
    pub token_type: String,
    /// Present on login when the server issues a renewal token, and on
    /// renewal when the server rotates it
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub user: serde_json::Value,
}

fn bearer() -> String {
    "bearer".into()
}

/// Exchange email and password for a credential pair.
///
/// `POST /login` issues only an access token on some deployments. When its
/// answer has no renewal token, the user login endpoint is asked for a full
/// pair with the same credentials. If that second call fails, the access
/// token from the first is returned on its own and the session will not be
/// renewable.
pub async fn login(transport: &dyn Transport, email: &str, password: &str) -> Result<TokenResponse> {
    let request = ApiRequest::post(LOGIN_PATH)
        .json(serde_json::json!({ "email": email, "password": password }))
        .public();
    let token = exchange(transport, &request, "login").await?;
    if token.refresh_token.is_some() {
        return Ok(token);
    }

    debug!("login issued no renewal token, trying user login");
    let request = ApiRequest::post(USER_LOGIN_PATH)
        .query(&[("email", email), ("password", password)])
        .public();
    match exchange(transport, &request, "user login").await {
        Ok(paired) if paired.refresh_token.is_some() => Ok(paired),
        Ok(_) => {
            warn!("no renewal token issued; the session cannot be renewed");
            Ok(token)
        }
        Err(error) => {
            warn!(%error, "user login failed; the session cannot be renewed");
            Ok(token)
        }
    }
}

async fn exchange(transport: &dyn Transport, request: &ApiRequest, call: &str) -> Result<TokenResponse> {
    let response = transport
        .transmit(request)
        .await
        .map_err(|e| Error::Http(format!("{call} request failed: {e}")))?;

    if response.is_unauthorized() {
        return Err(Error::InvalidCredentials(format!(
            "{call} rejected: {}",
            detail(&response)
        )));
    }
    decode(response, call)
}

/// Trade a renewal token for a fresh access token.
///
/// 401/403 means the renewal token is expired, revoked or malformed. Every
/// other failure is reported as `TokenExchange` or `Http`; the caller treats
/// all of them as a failed renewal.
pub async fn renew(transport: &dyn Transport, renewal: &str) -> Result<TokenResponse> {
    let request = ApiRequest::post(REFRESH_PATH)
        .json(serde_json::json!({ "refresh_token": renewal }))
        .public();

    let response = transport
        .transmit(&request)
        .await
        .map_err(|e| Error::Http(format!("token renewal request failed: {e}")))?;

    if response.status == 401 || response.status == 403 {
        return Err(Error::InvalidCredentials(format!(
            "renewal token rejected ({}): {}",
            response.status,
            detail(&response)
        )));
    }
    decode(response, "renewal")
}

fn decode(response: ApiResponse, call: &str) -> Result<TokenResponse> {
    if !response.is_success() {
        return Err(Error::TokenExchange(format!(
            "{call} returned {}: {}",
            response.status,
            detail(&response)
        )));
    }
    response
        .json::<TokenResponse>()
        .map_err(|e| Error::TokenExchange(format!("invalid {call} response: {e}")))
}

/// The server's `detail` message, or the raw body.
fn detail(response: &ApiResponse) -> String {
    response
        .json::<serde_json::Value>()
        .ok()
        .and_then(|v| v.get("detail").and_then(|d| d.as_str()).map(str::to_owned))
        .unwrap_or_else(|| response.text())
}
