//! Composition root: decorate, transmit, inspect, recover

use std::sync::Arc;

use session::{Credential, CredentialStore};
use tokio::sync::broadcast;
use tracing::{debug, info, instrument};
use transport::{ApiRequest, ApiResponse, Transport};
use uuid::Uuid;

use crate::coordinator::RefreshCoordinator;
use crate::decorator;
use crate::error::Result;
use crate::events::{EVENT_CAPACITY, SessionEvent};

/// Client-side session pipeline.
///
/// One instance per session. Cheap to share behind an `Arc`; all methods
/// take `&self`.
pub struct Pipeline {
    transport: Arc<dyn Transport>,
    store: Arc<CredentialStore>,
    coordinator: RefreshCoordinator,
    events: broadcast::Sender<SessionEvent>,
}

impl Pipeline {
    pub fn new(transport: Arc<dyn Transport>, store: Arc<CredentialStore>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let coordinator = RefreshCoordinator::new(store.clone(), transport.clone(), events.clone());
        Self {
            transport,
            store,
            coordinator,
            events,
        }
    }

    /// Send a request.
    ///
    /// Public requests go straight to the transport. Credentialed requests
    /// carry the current access token; a 401 hands the request to the
    /// refresh coordinator. Every other status is returned as a response,
    /// and transport errors are returned unchanged.
    #[instrument(
        skip_all,
        fields(
            request_id = %format!("req_{}", Uuid::new_v4().as_simple()),
            method = %request.method,
            path = %request.path
        )
    )]
    pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
        if request.is_public() {
            return Ok(self.transport.transmit(&request).await?);
        }

        let decorated = decorator::decorate(&self.store, request.clone());
        let response = self.transport.transmit(&decorated.request).await?;
        if !response.is_unauthorized() {
            debug!(status = response.status, "received response");
            return Ok(response);
        }

        self.coordinator.recover(request, decorated.access).await
    }

    /// Log in with email and password and store the resulting session.
    ///
    /// Returns the profile the server sent with the tokens, if any.
    pub async fn login(&self, email: &str, password: &str) -> Result<Option<serde_json::Value>> {
        let response = session::login(self.transport.as_ref(), email, password).await?;
        let credential = Credential::from(response);
        let profile = credential.profile.clone();
        self.store.set(credential).await?;
        info!(renewable = self.store.renewal_token().is_some(), "logged in");
        Ok(profile)
    }

    /// End the session locally.
    pub async fn logout(&self) -> Result<()> {
        self.store.clear().await?;
        info!("logged out");
        Ok(())
    }

    /// Receive `SessionEvent`s published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn credential_store(&self) -> &Arc<CredentialStore> {
        &self.store
    }

    pub fn coordinator(&self) -> &RefreshCoordinator {
        &self.coordinator
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use crate::testing::{MockApi, pipeline_with, spawn_send, wait_for_parked};
    use transport::TransportError;

    fn pair(method: &str, path: &str) -> (String, String) {
        (method.to_string(), path.to_string())
    }

    #[tokio::test]
    async fn valid_token_is_attached_and_response_returned() {
        let api = MockApi::new("A1");
        let pipeline = pipeline_with(&api, Some("A1"), Some("R1")).await;

        let response = pipeline.send(ApiRequest::get("/books/")).await.unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(api.calls_with("A1"), vec![pair("GET", "/books/")]);
        assert_eq!(api.renewal_calls(), 0);
    }

    #[tokio::test]
    async fn expired_tokens_renew_once_and_replay_in_order() {
        let api = MockApi::gated("A2");
        let pipeline = pipeline_with(&api, Some("A1"), Some("R1")).await;

        let books = spawn_send(&pipeline, ApiRequest::get("/books"));
        let rentals = spawn_send(&pipeline, ApiRequest::get("/rentals"));
        let returned = spawn_send(&pipeline, ApiRequest::put("/rentals/7/return"));
        wait_for_parked(&pipeline, 2).await;
        assert_eq!(api.renewal_calls(), 1);

        api.open_renewal();
        for (handle, path) in [
            (books, "/books"),
            (rentals, "/rentals"),
            (returned, "/rentals/7/return"),
        ] {
            let response = handle.await.unwrap().unwrap();
            assert_eq!(response.status, 200);
            let body: serde_json::Value = response.json().unwrap();
            assert_eq!(body["path"], path);
        }

        assert_eq!(api.renewal_calls(), 1);
        assert_eq!(
            api.calls_with("A2"),
            vec![
                pair("GET", "/books"),
                pair("GET", "/rentals"),
                pair("PUT", "/rentals/7/return"),
            ]
        );
        assert_eq!(
            pipeline.credential_store().access_token().as_deref(),
            Some("A2")
        );
    }

    #[tokio::test]
    async fn public_requests_bypass_credentials_and_renewal() {
        let api = MockApi::new("A2");
        let pipeline = pipeline_with(&api, Some("A1"), Some("R1")).await;

        let response = pipeline
            .send(ApiRequest::get("/").public())
            .await
            .unwrap();
        // The mock rejects anything without a valid token; the 401 is returned as is
        assert_eq!(response.status, 401);
        assert_eq!(api.renewal_calls(), 0);
        assert!(api.calls()[0].authorization.is_none());
        assert_eq!(
            pipeline.credential_store().access_token().as_deref(),
            Some("A1")
        );
    }

    #[tokio::test]
    async fn transport_errors_propagate_without_renewal() {
        let api = MockApi::new("A1");
        api.break_path("/books/");
        let pipeline = pipeline_with(&api, Some("A1"), Some("R1")).await;

        let outcome = pipeline.send(ApiRequest::get("/books/")).await;
        assert!(
            matches!(outcome, Err(Error::Transport(TransportError::Network(_)))),
            "got {outcome:?}"
        );
        assert_eq!(api.renewal_calls(), 0);
    }

    #[tokio::test]
    async fn logged_out_request_fails_renewal_and_signals() {
        let api = MockApi::new("A1");
        let pipeline = pipeline_with(&api, None, None).await;
        let mut events = pipeline.subscribe();

        let outcome = pipeline.send(ApiRequest::get("/me")).await;
        assert!(matches!(outcome, Err(Error::RenewalFailed(_))), "got {outcome:?}");
        assert!(api.calls()[0].authorization.is_none());
        assert_eq!(api.renewal_calls(), 0);
        assert_eq!(
            events.try_recv().unwrap(),
            SessionEvent::Invalidated {
                reason: "credential renewal failed: no renewal token in session".into()
            }
        );
    }

    #[tokio::test]
    async fn requests_after_renewal_use_new_token_directly() {
        let api = MockApi::new("A2");
        let pipeline = pipeline_with(&api, Some("A1"), Some("R1")).await;

        pipeline.send(ApiRequest::get("/me")).await.unwrap();
        pipeline.send(ApiRequest::get("/books/")).await.unwrap();

        assert_eq!(api.renewal_calls(), 1);
        assert_eq!(
            api.calls_with("A2"),
            vec![pair("GET", "/me"), pair("GET", "/books/")]
        );
    }

    #[tokio::test]
    async fn login_stores_renewable_session() {
        let api = MockApi::new("A1");
        let pipeline = pipeline_with(&api, None, None).await;

        let profile = pipeline.login("ada@example.com", "pw").await.unwrap();
        assert_eq!(profile.unwrap()["id"], 1);
        let stored = pipeline.credential_store().get().unwrap();
        assert_eq!(stored.access, "A1");
        assert_eq!(stored.renewal.as_deref(), Some("R1"));

        let paths: Vec<String> = api.calls().into_iter().map(|c| c.path).collect();
        assert_eq!(
            paths,
            vec!["/login", "/users/login?email=ada%40example.com&password=pw"]
        );
    }

    #[tokio::test]
    async fn login_that_cannot_be_persisted_leaves_no_session() {
        let api = MockApi::new("A1");
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        let store = Arc::new(CredentialStore::load(path.clone()).await.unwrap());
        std::fs::remove_file(&path).unwrap();
        std::fs::create_dir(&path).unwrap();
        std::fs::write(path.join("occupied"), "").unwrap();
        let pipeline = Pipeline::new(api.clone(), store);

        let outcome = pipeline.login("ada@example.com", "pw").await;
        assert!(matches!(outcome, Err(Error::Session(_))), "got {outcome:?}");
        assert!(!pipeline.credential_store().is_authenticated());

        // Nothing was stored, so a credentialed request is not sent with A1
        pipeline.send(ApiRequest::get("/me")).await.unwrap_err();
        assert!(api.calls_with("A1").is_empty());
    }

    #[tokio::test]
    async fn logout_clears_session() {
        let api = MockApi::new("A1");
        let pipeline = pipeline_with(&api, Some("A1"), Some("R1")).await;

        pipeline.logout().await.unwrap();
        assert!(pipeline.credential_store().get().is_none());
    }
}
