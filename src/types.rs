//! Wire types shared by the session and the resource services.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

// =============================================================================
// IDENTITY
// =============================================================================

/// Cached profile of the authenticated user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    #[serde(alias = "userId")]
    pub id: i64,
    #[serde(default)]
    pub email: String,
    pub nickname: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_image_url: Option<String>,
}

impl Identity {
    /// Profile image URL, ignoring blank values the API sometimes returns.
    #[must_use]
    pub fn avatar_url(&self) -> Option<&str> {
        self.profile_image_url.as_deref().map(str::trim).filter(|url| !url.is_empty())
    }
}

// =============================================================================
// AUTH
// =============================================================================

#[derive(Debug, Clone, Serialize)]
pub(crate) struct LoginRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

/// `POST /auth/login` response. User fields are optional; when missing the
/// session fetches `/users/me` instead.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct LoginResponse {
    pub access_token: Option<String>,
    pub user_id: Option<i64>,
    pub email: Option<String>,
    pub nickname: Option<String>,
    pub profile_image_url: Option<String>,
}

impl LoginResponse {
    pub fn identity(&self) -> Option<Identity> {
        Some(Identity {
            id: self.user_id?,
            email: self.email.clone().unwrap_or_default(),
            nickname: self.nickname.clone()?,
            profile_image_url: self.profile_image_url.clone(),
        })
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupRequest {
    pub email: String,
    pub password: String,
    pub nickname: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_image_url: Option<String>,
}

/// Result handed back to signup forms.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SignupOutcome {
    pub status: u16,
    pub message: String,
    pub data: Value,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RefreshResponse {
    pub access_token: Option<String>,
}

// =============================================================================
// RESOURCES
// =============================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostDraft {
    pub title: String,
    pub body: String,
    pub image_urls: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct CommentDraft<'a> {
    pub body: &'a str,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ProfileUpdate<'a> {
    pub nickname: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_image_url: Option<&'a str>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PasswordChange<'a> {
    pub new_password: &'a str,
    pub confirm_password: &'a str,
}

/// `POST /images` response.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ImageUpload {
    pub urls: Vec<String>,
}

/// One file destined for a multipart upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageFile {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl ImageFile {
    /// Read a file from disk, inferring its content type from the extension.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error if the file cannot be read.
    pub async fn from_path(path: &Path) -> std::io::Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("upload")
            .to_owned();
        Ok(Self { content_type: content_type_for(path).to_owned(), file_name, bytes })
    }
}

pub(crate) fn content_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
#[path = "types_test.rs"]
mod tests;
