//! reqwest-backed transport
//!
//! Joins the configured base URL with each request path, applies a fixed
//! per-request timeout and sends the JSON body if present. The response is
//! read fully into memory; every status code is returned as a response.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tracing::{debug, instrument};

use crate::{ApiRequest, ApiResponse, Result, Transport, TransportError};

/// Transport sending requests to one API base URL.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            timeout,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolute URL for a request path.
    pub fn url_for(&self, path: &str) -> String {
        let base = self.base_url.trim_end_matches('/');
        if path.starts_with('/') {
            format!("{base}{path}")
        } else {
            format!("{base}/{path}")
        }
    }

    #[instrument(skip_all, fields(method = %request.method, path = %request.path))]
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse> {
        let url = self.url_for(&request.path);

        let mut builder = self
            .client
            .request(request.method.clone(), &url)
            .headers(request.headers.clone())
            .timeout(self.timeout);
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| classify(&e, request))?;
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(|e| classify(&e, request))?;

        debug!(status, bytes = body.len(), "received response");
        Ok(ApiResponse {
            status,
            headers,
            body,
        })
    }
}

impl Transport for HttpTransport {
    fn transmit<'a>(
        &'a self,
        request: &'a ApiRequest,
    ) -> Pin<Box<dyn Future<Output = Result<ApiResponse>> + Send + 'a>> {
        Box::pin(self.send(request))
    }
}

fn classify(error: &reqwest::Error, request: &ApiRequest) -> TransportError {
    let target = format!("{} {}", request.method, request.path);
    if error.is_timeout() {
        TransportError::Timeout(target)
    } else if error.is_builder() {
        TransportError::InvalidRequest(format!("{target}: {error}"))
    } else {
        TransportError::Network(format!("{target}: {error}"))
    }
}
