//! `/posts` endpoints.

use serde_json::Value;

use crate::api::{ApiClient, RequestBody};
use crate::error::ApiError;
use crate::types::PostDraft;

pub const DEFAULT_PAGE_SIZE: u32 = 10;

pub struct PostService<'a> {
    api: &'a ApiClient,
}

impl<'a> PostService<'a> {
    #[must_use]
    pub fn new(api: &'a ApiClient) -> Self {
        Self { api }
    }

    /// # Errors
    ///
    /// Propagates any request failure.
    pub async fn list(&self, page: u32, size: u32) -> Result<Value, ApiError> {
        self.api.get(&list_path(page, size)).await
    }

    /// # Errors
    ///
    /// Propagates any request failure.
    pub async fn get(&self, post_id: i64) -> Result<Value, ApiError> {
        self.api.get(&post_path(post_id)).await
    }

    /// # Errors
    ///
    /// Propagates any request failure.
    pub async fn create(&self, draft: &PostDraft) -> Result<Value, ApiError> {
        self.api.post("/posts", Some(RequestBody::json(draft)?)).await
    }

    /// # Errors
    ///
    /// Propagates any request failure.
    pub async fn update(&self, post_id: i64, draft: &PostDraft) -> Result<Value, ApiError> {
        self.api.put(&post_path(post_id), Some(RequestBody::json(draft)?)).await
    }

    /// # Errors
    ///
    /// Propagates any request failure.
    pub async fn delete(&self, post_id: i64) -> Result<Value, ApiError> {
        self.api.delete(&post_path(post_id)).await
    }

    /// # Errors
    ///
    /// Propagates any request failure.
    pub async fn like(&self, post_id: i64) -> Result<Value, ApiError> {
        self.api.post(&format!("/posts/{post_id}/like"), None).await
    }
}

pub(crate) fn list_path(page: u32, size: u32) -> String {
    format!("/posts?page={page}&size={size}")
}

fn post_path(post_id: i64) -> String {
    format!("/posts/{post_id}")
}
