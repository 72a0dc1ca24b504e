//! `/comments` endpoints.

use serde_json::Value;

use crate::api::{ApiClient, RequestBody};
use crate::error::ApiError;
use crate::types::CommentDraft;

pub struct CommentService<'a> {
    api: &'a ApiClient,
}

impl<'a> CommentService<'a> {
    #[must_use]
    pub fn new(api: &'a ApiClient) -> Self {
        Self { api }
    }

    /// # Errors
    ///
    /// Propagates any request failure.
    pub async fn list(&self, post_id: i64) -> Result<Value, ApiError> {
        self.api.get(&format!("/comments/post/{post_id}")).await
    }

    /// # Errors
    ///
    /// Propagates any request failure.
    pub async fn create(&self, post_id: i64, body: &str) -> Result<Value, ApiError> {
        let payload = RequestBody::json(&CommentDraft { body })?;
        self.api.post(&format!("/comments/post/{post_id}"), Some(payload)).await
    }

    /// # Errors
    ///
    /// Propagates any request failure.
    pub async fn update(&self, comment_id: i64, body: &str) -> Result<Value, ApiError> {
        let payload = RequestBody::json(&CommentDraft { body })?;
        self.api.put(&format!("/comments/{comment_id}"), Some(payload)).await
    }

    /// # Errors
    ///
    /// Propagates any request failure.
    pub async fn delete(&self, comment_id: i64) -> Result<Value, ApiError> {
        self.api.delete(&format!("/comments/{comment_id}")).await
    }
}
