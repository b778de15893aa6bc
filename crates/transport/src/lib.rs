//! Transport boundary for the rental API client
//!
//! Defines the `Transport` trait that decouples the authenticated request
//! pipeline from the HTTP client. `HttpTransport` sends requests with reqwest;
//! tests substitute an in-process implementation of the same trait.
//!
//! A transport reports two kinds of outcome and they must stay distinct:
//! a received response (any status, including 401) is `Ok(ApiResponse)`,
//! while a failure to obtain a response at all is `Err(TransportError)`.
//! Only the former can ever trigger credential renewal.

pub mod http;

pub use http::HttpTransport;

use bytes::Bytes;
use reqwest::Method;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::de::DeserializeOwned;
use std::future::Future;
use std::pin::Pin;

/// Whether a request carries the session credential.
///
/// Chosen by the caller when the request is built. `Public` requests (login,
/// signup, health check) bypass the decorator and refresh logic entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Credentialed,
    Public,
}

/// An outbound request, relative to the API base URL.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    /// Path including any query string, e.g. `/books/?skip=0&limit=100`
    pub path: String,
    pub headers: HeaderMap,
    pub body: Option<serde_json::Value>,
    pub access: Access,
}

impl ApiRequest {
    /// Credentialed request with no body.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: HeaderMap::new(),
            body: None,
            access: Access::Credentialed,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Attach a JSON body.
    pub fn json(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Append URL-encoded query parameters to the path.
    pub fn query(mut self, pairs: &[(&str, &str)]) -> Self {
        let encoded = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(pairs)
            .finish();
        let separator = if self.path.contains('?') { '&' } else { '?' };
        self.path = format!("{}{separator}{encoded}", self.path);
        self
    }

    /// Mark the request as not requiring a credential.
    pub fn public(mut self) -> Self {
        self.access = Access::Public;
        self
    }

    pub fn is_public(&self) -> bool {
        self.access == Access::Public
    }

    /// The `Authorization` header value, if any.
    pub fn authorization(&self) -> Option<&HeaderValue> {
        self.headers.get(reqwest::header::AUTHORIZATION)
    }
}

/// A received response. Any status code counts as received.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ApiResponse {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    /// Response with a JSON body.
    pub fn json_body(status: u16, body: &serde_json::Value) -> Self {
        Self::new(status, body.to_string())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// The access credential was rejected.
    pub fn is_unauthorized(&self) -> bool {
        self.status == 401
    }

    pub fn json<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_slice(&self.body)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Failure to obtain any response from the remote API.
///
/// Payloads are strings so the error can be cloned to every caller that
/// shares an outcome.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// Result alias for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;

/// Sends one request and returns the received response.
///
/// Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility
/// (`Arc<dyn Transport>`).
pub trait Transport: Send + Sync {
    fn transmit<'a>(
        &'a self,
        request: &'a ApiRequest,
    ) -> Pin<Box<dyn Future<Output = Result<ApiResponse>> + Send + 'a>>;
}
