//! Multipart image uploads to `/images`.

use crate::api::{ApiClient, decode};
use crate::error::ApiError;
use crate::types::{ImageFile, ImageUpload};

const UPLOAD_PATH: &str = "/images";
const UPLOAD_FIELD: &str = "images";

pub struct ImageService<'a> {
    api: &'a ApiClient,
}

impl<'a> ImageService<'a> {
    #[must_use]
    pub fn new(api: &'a ApiClient) -> Self {
        Self { api }
    }

    /// Upload `files` in one request, one `images` part per file.
    ///
    /// # Errors
    ///
    /// Propagates request failures; `ApiError::Decode` if the response has no `urls`.
    pub async fn upload(&self, files: Vec<ImageFile>) -> Result<ImageUpload, ApiError> {
        let count = files.len();
        let value = self.api.upload(UPLOAD_PATH, UPLOAD_FIELD, files).await?;
        let upload: ImageUpload = decode(value)?;
        tracing::debug!(files = count, urls = upload.urls.len(), "images uploaded");
        Ok(upload)
    }
}
