//! Request client for the postboard REST API.
//!
//! ARCHITECTURE
//! ============
//! `ApiClient::send` performs one attempt, and on a 401 for a credentialed
//! call asks the session (through `AuthHandler`) for a fresh credential and
//! retries exactly once. The client reads the credential store but never
//! writes it; teardown is delegated back to the session.
//!
//! ERROR HANDLING
//! ==============
//! Transport failures surface as `ApiError::Network` unchanged. Non-success
//! responses are parsed (JSON when declared, text otherwise) and classified
//! by status. A 401 on the retried attempt never triggers a second refresh.
//! A refresh that fails for any reason other than a 401 surfaces that
//! failure unchanged and leaves the session intact.

use std::sync::{Arc, Weak};

use reqwest::header::CONTENT_TYPE;
use reqwest::multipart::{Form, Part};
use reqwest::{Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::config::{ClientConfig, CredentialMode};
use crate::credential::{Credential, CredentialStore};
use crate::error::{ApiError, ConfigError};
use crate::types::ImageFile;

/// Session-side hooks the client calls on authorization failure.
#[async_trait::async_trait]
pub trait AuthHandler: Send + Sync {
    /// Obtain a new credential. Must not route through the retry path itself.
    ///
    /// An `Unauthenticated` error means the session cannot be renewed; any
    /// other error is transient and leaves the session in place.
    async fn refresh(&self) -> Result<(), ApiError>;

    /// Drop credential and identity after an irrecoverable 401.
    fn teardown(&self);
}

/// Request payload. Multipart parts are kept as data so a retry can rebuild
/// an identical form.
#[derive(Debug, Clone)]
pub enum RequestBody {
    /// Serialized to JSON.
    Json(Value),
    /// Sent verbatim with a JSON content type.
    Text(String),
    /// One file part per entry, all under the same field name.
    Multipart { field: String, files: Vec<ImageFile> },
}

impl RequestBody {
    /// Serialize any `Serialize` value into a JSON body.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Decode` if the value cannot be represented as JSON.
    pub fn json<T: Serialize>(value: &T) -> Result<Self, ApiError> {
        Ok(Self::Json(serde_json::to_value(value)?))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestOptions {
    /// Attach the stored credential.
    pub authenticated: bool,
    /// Attempt one refresh-and-retry on 401.
    pub allow_refresh: bool,
}

impl RequestOptions {
    /// Credentialed call with the refresh-and-retry path enabled.
    pub const AUTHENTICATED: Self = Self { authenticated: true, allow_refresh: true };
    /// No credential, no refresh (login, signup, refresh itself).
    pub const ANONYMOUS: Self = Self { authenticated: false, allow_refresh: false };

    #[must_use]
    pub const fn without_refresh(self) -> Self {
        Self { allow_refresh: false, ..self }
    }
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self::AUTHENTICATED
    }
}

// =============================================================================
// CLIENT
// =============================================================================

pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    mode: CredentialMode,
    store: Arc<dyn CredentialStore>,
    auth: Option<Weak<dyn AuthHandler>>,
}

impl ApiClient {
    /// Build a client with its own cookie jar. No auth handler is attached,
    /// so a 401 surfaces immediately until `with_auth_handler` is called.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client fails to build.
    pub fn new(config: &ClientConfig, store: Arc<dyn CredentialStore>) -> Result<Self, ConfigError> {
        let http = reqwest::Client::builder()
            .cookie_store(true)
            .build()
            .map_err(|e| ConfigError::HttpClientBuild(e.to_string()))?;
        Ok(Self {
            http,
            base_url: crate::config::normalize_base_url(&config.base_url),
            mode: config.credential_mode,
            store,
            auth: None,
        })
    }

    #[must_use]
    pub fn with_auth_handler(mut self, handler: Weak<dyn AuthHandler>) -> Self {
        self.auth = Some(handler);
        self
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    #[must_use]
    pub fn credential_mode(&self) -> CredentialMode {
        self.mode
    }

    fn url(&self, path: &str) -> String {
        join_url(&self.base_url, path)
    }

    fn auth_handler(&self) -> Option<Arc<dyn AuthHandler>> {
        self.auth.as_ref().and_then(Weak::upgrade)
    }

    /// Issue a request, refreshing and retrying once on 401 when allowed.
    ///
    /// # Errors
    ///
    /// See the module docs for the failure taxonomy.
    pub async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<RequestBody>,
        options: RequestOptions,
    ) -> Result<Value, ApiError> {
        let url = self.url(path);
        let response = self.attempt(&method, &url, body.as_ref(), options).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return read_response(&method, path, response).await;
        }

        let data = read_error_payload(response).await;
        if !options.authenticated {
            return Err(ApiError::from_status(401, data));
        }

        let handler = self.auth_handler();
        let Some(handler) = handler.filter(|_| options.allow_refresh) else {
            tracing::warn!(%method, path, "401 without refresh; session torn down");
            if let Some(handler) = self.auth_handler() {
                handler.teardown();
            }
            return Err(ApiError::from_status(401, data));
        };

        tracing::info!(%method, path, "401 received; refreshing credential");
        if let Err(e) = handler.refresh().await {
            if e.is_unauthenticated() {
                tracing::warn!(%method, path, "credential refresh rejected");
                handler.teardown();
                return Err(ApiError::session_expired());
            }
            tracing::warn!(%method, path, error = %e, "credential refresh failed; session kept");
            return Err(e);
        }

        let retried = self.attempt(&method, &url, body.as_ref(), options).await?;
        let result = read_response(&method, path, retried).await;
        if matches!(&result, Err(e) if e.is_unauthenticated()) {
            tracing::warn!(%method, path, "401 after refresh; session torn down");
            handler.teardown();
        }
        result
    }

    async fn attempt(
        &self,
        method: &Method,
        url: &str,
        body: Option<&RequestBody>,
        options: RequestOptions,
    ) -> Result<reqwest::Response, ApiError> {
        let mut request = self.http.request(method.clone(), url);

        if options.authenticated {
            match self.store.credential() {
                Some(Credential::Bearer(token)) => request = request.bearer_auth(token),
                Some(Credential::Cookie) => {}
                None if self.mode == CredentialMode::Bearer => {
                    tracing::debug!(url, "no bearer token stored for credentialed request");
                }
                None => {}
            }
        }

        request = match body {
            None => request,
            Some(RequestBody::Json(value)) => request.json(value),
            Some(RequestBody::Text(text)) => request.header(CONTENT_TYPE, "application/json").body(text.clone()),
            Some(RequestBody::Multipart { field, files }) => request.multipart(build_form(field, files)?),
        };

        tracing::debug!(%method, url, authenticated = options.authenticated, "api request");
        Ok(request.send().await?)
    }

    // =========================================================================
    // VERBS
    // =========================================================================

    /// # Errors
    ///
    /// See [`ApiClient::send`].
    pub async fn get(&self, path: &str) -> Result<Value, ApiError> {
        self.send(Method::GET, path, None, RequestOptions::AUTHENTICATED).await
    }

    /// # Errors
    ///
    /// See [`ApiClient::send`].
    pub async fn post(&self, path: &str, body: Option<RequestBody>) -> Result<Value, ApiError> {
        self.send(Method::POST, path, body, RequestOptions::AUTHENTICATED).await
    }

    /// # Errors
    ///
    /// See [`ApiClient::send`].
    pub async fn put(&self, path: &str, body: Option<RequestBody>) -> Result<Value, ApiError> {
        self.send(Method::PUT, path, body, RequestOptions::AUTHENTICATED).await
    }

    /// # Errors
    ///
    /// See [`ApiClient::send`].
    pub async fn patch(&self, path: &str, body: Option<RequestBody>) -> Result<Value, ApiError> {
        self.send(Method::PATCH, path, body, RequestOptions::AUTHENTICATED).await
    }

    /// # Errors
    ///
    /// See [`ApiClient::send`].
    pub async fn delete(&self, path: &str) -> Result<Value, ApiError> {
        self.send(Method::DELETE, path, None, RequestOptions::AUTHENTICATED).await
    }

    /// Multipart `POST` with one part per file under `field`.
    ///
    /// # Errors
    ///
    /// See [`ApiClient::send`].
    pub async fn upload(&self, path: &str, field: &str, files: Vec<ImageFile>) -> Result<Value, ApiError> {
        let body = RequestBody::Multipart { field: field.to_owned(), files };
        self.send(Method::POST, path, Some(body), RequestOptions::AUTHENTICATED).await
    }
}

// =============================================================================
// HELPERS
// =============================================================================

pub(crate) fn join_url(base: &str, path: &str) -> String {
    if path.is_empty() || path.starts_with('/') {
        format!("{base}{path}")
    } else {
        format!("{base}/{path}")
    }
}

/// Decode a JSON value returned by `send` into a typed response.
pub(crate) fn decode<T: DeserializeOwned>(value: Value) -> Result<T, ApiError> {
    Ok(serde_json::from_value(value)?)
}

fn build_form(field: &str, files: &[ImageFile]) -> Result<Form, ApiError> {
    let mut form = Form::new();
    for file in files {
        let part = Part::bytes(file.bytes.clone())
            .file_name(file.file_name.clone())
            .mime_str(&file.content_type)?;
        form = form.part(field.to_owned(), part);
    }
    Ok(form)
}

fn declares_json(response: &reqwest::Response) -> bool {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|ct| ct.contains("application/json"))
}

pub(crate) fn parse_payload(is_json: bool, text: String) -> Result<Value, ApiError> {
    if !is_json {
        return Ok(Value::String(text));
    }
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    Ok(serde_json::from_str(&text)?)
}

async fn read_error_payload(response: reqwest::Response) -> Value {
    let is_json = declares_json(&response);
    match response.text().await {
        Ok(text) => parse_payload(is_json, text.clone()).unwrap_or(Value::String(text)),
        Err(_) => Value::Null,
    }
}

async fn read_response(method: &Method, path: &str, response: reqwest::Response) -> Result<Value, ApiError> {
    let status = response.status();
    if status.is_success() {
        let is_json = declares_json(&response);
        let text = response.text().await?;
        return parse_payload(is_json, text);
    }

    let data = read_error_payload(response).await;
    tracing::warn!(%method, path, status = status.as_u16(), "api request failed");
    Err(ApiError::from_status(status.as_u16(), data))
}

#[cfg(test)]
#[path = "api_test.rs"]
mod tests;
