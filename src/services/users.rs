//! `/users/me` endpoints.

use serde_json::Value;

use crate::api::{ApiClient, RequestBody, decode};
use crate::error::ApiError;
use crate::session::IDENTITY_PATH;
use crate::types::{Identity, ImageFile, PasswordChange, ProfileUpdate};

use super::images::ImageService;

pub struct UserService<'a> {
    api: &'a ApiClient,
}

impl<'a> UserService<'a> {
    #[must_use]
    pub fn new(api: &'a ApiClient) -> Self {
        Self { api }
    }

    /// # Errors
    ///
    /// Propagates request failures; `ApiError::Decode` on an unexpected shape.
    pub async fn profile(&self) -> Result<Identity, ApiError> {
        decode(self.api.get(IDENTITY_PATH).await?)
    }

    /// Change the nickname, uploading `image` first when given and sending
    /// its URL as the new profile image.
    ///
    /// # Errors
    ///
    /// Propagates upload or update failures; `ApiError::Decode` if the upload
    /// returned no URL.
    pub async fn update_profile(&self, nickname: &str, image: Option<ImageFile>) -> Result<Value, ApiError> {
        let profile_image_url = match image {
            Some(file) => {
                let upload = ImageService::new(self.api).upload(vec![file]).await?;
                let url = upload
                    .urls
                    .into_iter()
                    .next()
                    .ok_or_else(|| ApiError::Decode("image upload returned no urls".to_owned()))?;
                Some(url)
            }
            None => None,
        };

        let body = RequestBody::json(&ProfileUpdate { nickname, profile_image_url: profile_image_url.as_deref() })?;
        self.api.patch(IDENTITY_PATH, Some(body)).await
    }

    /// # Errors
    ///
    /// Propagates any request failure.
    pub async fn deactivate(&self) -> Result<Value, ApiError> {
        self.api.patch("/users/me/deactivate", None).await
    }

    /// # Errors
    ///
    /// Propagates any request failure.
    pub async fn change_password(&self, new_password: &str, confirm_password: &str) -> Result<Value, ApiError> {
        let body = RequestBody::json(&PasswordChange { new_password, confirm_password })?;
        self.api.patch("/users/me/password", Some(body)).await
    }
}
