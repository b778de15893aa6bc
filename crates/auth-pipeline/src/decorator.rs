//! Attach the session's access token to outbound requests

use reqwest::header::{AUTHORIZATION, HeaderValue};
use session::{BEARER, CredentialStore};
use tracing::warn;
use transport::ApiRequest;

/// A request ready to transmit, plus the access token it carries.
///
/// `access` lets the coordinator tell a token that has since been replaced
/// from one that genuinely needs renewal.
#[derive(Debug)]
pub struct Decorated {
    pub request: ApiRequest,
    pub access: Option<String>,
}

/// Decorate with the store's current access token.
///
/// Reads the store on every call. Without a session the request passes
/// through unmodified.
pub fn decorate(store: &CredentialStore, request: ApiRequest) -> Decorated {
    match store.access_token() {
        Some(token) => authorize(request, token),
        None => Decorated {
            request,
            access: None,
        },
    }
}

/// Set `Authorization: Bearer <token>`, replacing any existing value.
pub fn authorize(mut request: ApiRequest, token: String) -> Decorated {
    match HeaderValue::from_str(&format!("{BEARER} {token}")) {
        Ok(mut value) => {
            value.set_sensitive(true);
            request.headers.insert(AUTHORIZATION, value);
        }
        Err(e) => {
            warn!(path = %request.path, error = %e, "access token is not a valid header value, sending without it");
        }
    }
    Decorated {
        request,
        access: Some(token),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use session::Credential;

    fn bearer(decorated: &Decorated) -> Option<&str> {
        decorated
            .request
            .authorization()
            .and_then(|v| v.to_str().ok())
    }

    #[tokio::test]
    async fn attaches_current_token() {
        let store = CredentialStore::in_memory();
        store.set(Credential::new("A1", Some("R1".into()))).await.unwrap();

        let decorated = decorate(&store, ApiRequest::get("/books/"));
        assert_eq!(bearer(&decorated), Some("Bearer A1"));
        assert_eq!(decorated.access.as_deref(), Some("A1"));
        assert!(decorated.request.authorization().unwrap().is_sensitive());
    }

    #[tokio::test]
    async fn rereads_store_on_every_call() {
        let store = CredentialStore::in_memory();
        store.set(Credential::new("A1", Some("R1".into()))).await.unwrap();
        let first = decorate(&store, ApiRequest::get("/books/"));

        store.apply_renewal("A2".into(), None).await.unwrap();
        let second = decorate(&store, ApiRequest::get("/books/"));

        assert_eq!(bearer(&first), Some("Bearer A1"));
        assert_eq!(bearer(&second), Some("Bearer A2"));
    }

    #[test]
    fn passes_through_without_session() {
        let store = CredentialStore::in_memory();
        let decorated = decorate(&store, ApiRequest::get("/books/"));
        assert!(decorated.request.authorization().is_none());
        assert!(decorated.access.is_none());
    }

    #[test]
    fn replaces_stale_authorization_header() {
        let stale = authorize(ApiRequest::get("/me"), "A1".into()).request;
        let fresh = authorize(stale, "A2".into());
        assert_eq!(bearer(&fresh), Some("Bearer A2"));
        assert_eq!(
            fresh
                .request
                .headers
                .get_all(AUTHORIZATION)
                .iter()
                .count(),
            1
        );
    }

    #[test]
    fn unencodable_token_is_skipped_but_remembered() {
        let decorated = authorize(ApiRequest::get("/me"), "bad\ntoken".into());
        assert!(decorated.request.authorization().is_none());
        assert_eq!(decorated.access.as_deref(), Some("bad\ntoken"));
    }
}
