//! Rental API calls over the authenticated pipeline

use std::sync::Arc;

use auth_pipeline::Pipeline;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;
use transport::{ApiRequest, ApiResponse};

use crate::error::{ApiError, Result};
use crate::types::{
    Book, BookCreate, BookUpdate, HealthStatus, Rental, RentalCreate, User, UserCreate, UserUpdate,
};

/// Page size the server uses when none is given.
pub const DEFAULT_LIMIT: u32 = 100;

/// Typed rental API client. Cloning shares the pipeline and its session.
#[derive(Clone)]
pub struct RentalApi {
    pipeline: Arc<Pipeline>,
}

impl RentalApi {
    pub fn new(pipeline: Arc<Pipeline>) -> Self {
        Self { pipeline }
    }

    pub fn pipeline(&self) -> &Arc<Pipeline> {
        &self.pipeline
    }

    // Health

    pub async fn health(&self) -> Result<HealthStatus> {
        self.fetch(ApiRequest::get(session::HEALTH_PATH).public()).await
    }

    // Auth

    /// Log in and keep the session. Returns the profile sent with the tokens.
    pub async fn login(&self, email: &str, password: &str) -> Result<Option<serde_json::Value>> {
        Ok(self.pipeline.login(email, password).await?)
    }

    pub async fn logout(&self) -> Result<()> {
        Ok(self.pipeline.logout().await?)
    }

    pub async fn current_user(&self) -> Result<User> {
        self.fetch(ApiRequest::get("/me")).await
    }

    // Users

    /// Register a new account. Does not log in.
    pub async fn sign_up(&self, user: &UserCreate) -> Result<User> {
        let request = ApiRequest::post(session::SIGNUP_PATH).json(to_body(user)?).public();
        self.fetch(request).await
    }

    pub async fn users(&self, skip: u32, limit: u32) -> Result<Vec<User>> {
        self.fetch(ApiRequest::get(paged("/users/", skip, limit))).await
    }

    pub async fn user(&self, id: i64) -> Result<User> {
        self.fetch(ApiRequest::get(format!("/users/{id}"))).await
    }

    pub async fn update_user(&self, id: i64, update: &UserUpdate) -> Result<User> {
        let request = ApiRequest::put(format!("/users/{id}")).json(to_body(update)?);
        self.fetch(request).await
    }

    pub async fn delete_user(&self, id: i64) -> Result<()> {
        self.execute(ApiRequest::delete(format!("/users/{id}"))).await
    }

    pub async fn user_rentals(&self, user_id: i64, skip: u32, limit: u32) -> Result<Vec<Rental>> {
        let path = paged(&format!("/users/{user_id}/rentals"), skip, limit);
        self.fetch(ApiRequest::get(path)).await
    }

    // Books

    pub async fn books(&self, skip: u32, limit: u32) -> Result<Vec<Book>> {
        self.fetch(ApiRequest::get(paged("/books/", skip, limit))).await
    }

    pub async fn book(&self, id: i64) -> Result<Book> {
        self.fetch(ApiRequest::get(format!("/books/{id}"))).await
    }

    pub async fn create_book(&self, book: &BookCreate) -> Result<Book> {
        self.fetch(ApiRequest::post("/books/").json(to_body(book)?)).await
    }

    pub async fn update_book(&self, id: i64, update: &BookUpdate) -> Result<Book> {
        let request = ApiRequest::put(format!("/books/{id}")).json(to_body(update)?);
        self.fetch(request).await
    }

    pub async fn delete_book(&self, id: i64) -> Result<()> {
        self.execute(ApiRequest::delete(format!("/books/{id}"))).await
    }

    // Rentals

    pub async fn rentals(&self, skip: u32, limit: u32) -> Result<Vec<Rental>> {
        self.fetch(ApiRequest::get(paged("/rentals/", skip, limit))).await
    }

    pub async fn rental(&self, id: i64) -> Result<Rental> {
        self.fetch(ApiRequest::get(format!("/rentals/{id}"))).await
    }

    pub async fn create_rental(&self, rental: &RentalCreate) -> Result<Rental> {
        self.fetch(ApiRequest::post("/rentals/").json(to_body(rental)?)).await
    }

    pub async fn return_book(&self, rental_id: i64) -> Result<Rental> {
        self.fetch(ApiRequest::put(format!("/rentals/{rental_id}/return"))).await
    }

    pub async fn overdue_rentals(&self) -> Result<Vec<Rental>> {
        self.fetch(ApiRequest::get("/rentals/overdue")).await
    }

    /// Send and decode a JSON body.
    async fn fetch<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T> {
        let path = request.path.clone();
        let response = self.send(request).await?;
        response
            .json()
            .map_err(|e| ApiError::Decode(format!("{path}: {e}")))
    }

    /// Send and discard the body.
    async fn execute(&self, request: ApiRequest) -> Result<()> {
        self.send(request).await.map(drop)
    }

    async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
        let response = self.pipeline.send(request).await?;
        if !response.is_success() {
            let message = detail(&response);
            debug!(status = response.status, message = %message, "API call rejected");
            return Err(ApiError::Status {
                status: response.status,
                message,
            });
        }
        Ok(response)
    }
}

fn paged(path: &str, skip: u32, limit: u32) -> String {
    format!("{path}?skip={skip}&limit={limit}")
}

fn to_body<T: Serialize>(value: &T) -> Result<serde_json::Value> {
    serde_json::to_value(value).map_err(|e| ApiError::Decode(format!("request body: {e}")))
}

/// The server's `detail` field, or the raw body when there is none.
///
/// Validation failures carry a list of problems instead of a string; those
/// are kept as compact JSON.
fn detail(response: &ApiResponse) -> String {
    match response.json::<serde_json::Value>() {
        Ok(body) => match body.get("detail") {
            Some(serde_json::Value::String(message)) => message.clone(),
            Some(other) => other.to_string(),
            None => response.text(),
        },
        Err(_) => response.text(),
    }
}
