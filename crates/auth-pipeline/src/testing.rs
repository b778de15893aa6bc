//! In-process rental API for pipeline tests
//!
//! Accepts exactly one access token at a time. `/refresh` follows a scripted
//! renewal behavior and can be held closed until the test has parked every
//! follower it needs. `/login` hands out the accepted token alone and
//! `/users/login` pairs it with renewal token `R1`.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use reqwest::Method;
use session::{Credential, CredentialStore, LOGIN_PATH, REFRESH_PATH, USER_LOGIN_PATH};
use tokio::sync::Semaphore;
use transport::{ApiRequest, ApiResponse, Transport, TransportError};

use crate::Pipeline;

const OPEN: usize = 1024;

#[derive(Debug, Clone)]
pub(crate) enum Renewal {
    Grant {
        access: String,
        renewal: Option<String>,
    },
    Reject,
    Unreachable,
}

#[derive(Debug, Clone)]
pub(crate) struct Call {
    pub method: Method,
    pub path: String,
    pub authorization: Option<String>,
    pub body: Option<serde_json::Value>,
}

pub(crate) struct MockApi {
    valid: Mutex<String>,
    renewal: Mutex<Renewal>,
    gate: Semaphore,
    renewals: AtomicUsize,
    calls: Mutex<Vec<Call>>,
    delays: Mutex<HashMap<String, Duration>>,
    rejected: Mutex<HashSet<String>>,
    broken: Mutex<HashSet<String>>,
}

impl MockApi {
    /// API accepting `valid`; renewal grants `A2` unless scripted otherwise.
    pub fn new(valid: &str) -> Arc<Self> {
        Self::build(valid, OPEN)
    }

    /// API whose renewal endpoint waits for `open_renewal()`.
    pub fn gated(valid: &str) -> Arc<Self> {
        Self::build(valid, 0)
    }

    fn build(valid: &str, permits: usize) -> Arc<Self> {
        Arc::new(Self {
            valid: Mutex::new(valid.into()),
            renewal: Mutex::new(Renewal::Grant {
                access: "A2".into(),
                renewal: None,
            }),
            gate: Semaphore::new(permits),
            renewals: AtomicUsize::new(0),
            calls: Mutex::new(Vec::new()),
            delays: Mutex::new(HashMap::new()),
            rejected: Mutex::new(HashSet::new()),
            broken: Mutex::new(HashSet::new()),
        })
    }

    pub fn open_renewal(&self) {
        self.gate.add_permits(OPEN);
    }

    pub fn script_renewal(&self, renewal: Renewal) {
        *self.renewal.lock().unwrap() = renewal;
    }

    /// Delay successful responses on `path`.
    pub fn delay(&self, path: &str, delay: Duration) {
        self.delays.lock().unwrap().insert(path.into(), delay);
    }

    /// Answer 401 on `path` whatever the token.
    pub fn reject_always(&self, path: &str) {
        self.rejected.lock().unwrap().insert(path.into());
    }

    /// Fail `path` at the network level.
    pub fn break_path(&self, path: &str) {
        self.broken.lock().unwrap().insert(path.into());
    }

    pub fn renewal_calls(&self) -> usize {
        self.renewals.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// Resource calls (not renewals) made with `token`, as (method, path).
    pub fn calls_with(&self, token: &str) -> Vec<(String, String)> {
        let header = format!("Bearer {token}");
        self.calls()
            .into_iter()
            .filter(|c| c.path != REFRESH_PATH && c.authorization.as_deref() == Some(&header))
            .map(|c| (c.method.to_string(), c.path))
            .collect()
    }

    async fn refresh(&self) -> transport::Result<ApiResponse> {
        self.renewals.fetch_add(1, Ordering::SeqCst);
        let _permit = self
            .gate
            .acquire()
            .await
            .map_err(|_| TransportError::Network("gate closed".into()))?;

        let behavior = self.renewal.lock().unwrap().clone();
        match behavior {
            Renewal::Grant { access, renewal } => {
                *self.valid.lock().unwrap() = access.clone();
                Ok(ApiResponse::json_body(
                    200,
                    &serde_json::json!({
                        "access_token": access,
                        "token_type": "bearer",
                        "refresh_token": renewal,
                        "user": {"email": "ada@example.com"},
                    }),
                ))
            }
            Renewal::Reject => Ok(ApiResponse::json_body(
                401,
                &serde_json::json!({"detail": "Invalid refresh token"}),
            )),
            Renewal::Unreachable => Err(TransportError::Network("connection refused".into())),
        }
    }

    fn login(&self, paired: bool) -> ApiResponse {
        let access = self.valid.lock().unwrap().clone();
        let mut body = serde_json::json!({
            "access_token": access,
            "token_type": "bearer",
            "user": {"id": 1, "email": "ada@example.com"},
        });
        if paired {
            body["refresh_token"] = "R1".into();
        }
        ApiResponse::json_body(200, &body)
    }

    async fn resource(&self, request: &ApiRequest, authorization: Option<String>) -> transport::Result<ApiResponse> {
        if self.broken.lock().unwrap().contains(&request.path) {
            return Err(TransportError::Network(format!("{} unreachable", request.path)));
        }

        let expected = format!("Bearer {}", self.valid.lock().unwrap());
        let rejected = self.rejected.lock().unwrap().contains(&request.path);
        if rejected || authorization.as_deref() != Some(expected.as_str()) {
            return Ok(ApiResponse::json_body(
                401,
                &serde_json::json!({"detail": "Could not validate credentials"}),
            ));
        }

        let delay = self.delays.lock().unwrap().get(&request.path).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(ApiResponse::json_body(
            200,
            &serde_json::json!({"method": request.method.as_str(), "path": request.path}),
        ))
    }
}

impl Transport for MockApi {
    fn transmit<'a>(
        &'a self,
        request: &'a ApiRequest,
    ) -> Pin<Box<dyn Future<Output = transport::Result<ApiResponse>> + Send + 'a>> {
        Box::pin(async move {
            let authorization = request
                .authorization()
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned);
            self.calls.lock().unwrap().push(Call {
                method: request.method.clone(),
                path: request.path.clone(),
                authorization: authorization.clone(),
                body: request.body.clone(),
            });

            let path = request.path.split('?').next().unwrap_or_default();
            match path {
                REFRESH_PATH => self.refresh().await,
                LOGIN_PATH => Ok(self.login(false)),
                USER_LOGIN_PATH => Ok(self.login(true)),
                _ => self.resource(request, authorization).await,
            }
        })
    }
}

/// Pipeline over `api` with the given session already stored.
pub(crate) async fn pipeline_with(
    api: &Arc<MockApi>,
    access: Option<&str>,
    renewal: Option<&str>,
) -> Arc<Pipeline> {
    let store = Arc::new(CredentialStore::in_memory());
    if let Some(access) = access {
        store
            .set(Credential::new(access, renewal.map(str::to_owned)))
            .await
            .unwrap();
    }
    Arc::new(Pipeline::new(api.clone(), store))
}

/// Yield until `n` requests are parked behind the renewal.
pub(crate) async fn wait_for_parked(pipeline: &Pipeline, n: usize) {
    for _ in 0..10_000 {
        if pipeline.coordinator().parked() >= n {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!(
        "expected {n} parked requests, found {}",
        pipeline.coordinator().parked()
    );
}

/// Spawn `pipeline.send(request)` as its own task.
pub(crate) fn spawn_send(
    pipeline: &Arc<Pipeline>,
    request: ApiRequest,
) -> tokio::task::JoinHandle<crate::Result<ApiResponse>> {
    let pipeline = pipeline.clone();
    tokio::spawn(async move { pipeline.send(request).await })
}
