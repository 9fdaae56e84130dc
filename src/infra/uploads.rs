//! Multipart upload client for the file storage endpoint.

use std::time::Duration;

use async_trait::async_trait;
use pressroom_api_types::UploadResponse;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Url};
use tracing::debug;

use crate::application::images::{ImageUploader, ProcessedImage};
use crate::client::ServiceError;
use crate::config::Settings;

use super::error::InfraError;

const SOURCE: &str = "infra::uploads";

/// Sends processed images as `multipart/form-data` with `file` and `folder`
/// fields and reads back the public URL.
#[derive(Clone, Debug)]
pub struct HttpImageUploader {
    client: Client,
    endpoint: Url,
    api_key: Option<String>,
}

impl HttpImageUploader {
    pub fn new(
        endpoint: Url,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, InfraError> {
        let client = Client::builder()
            .user_agent(super::rest::RestDataService::user_agent())
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            endpoint,
            api_key,
        })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, InfraError> {
        let endpoint = settings.uploads.endpoint.clone().ok_or_else(|| {
            InfraError::configuration("uploads.endpoint is required to upload images")
        })?;
        Self::new(
            endpoint,
            settings.service.api_key.clone(),
            settings.service.timeout,
        )
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl ImageUploader for HttpImageUploader {
    async fn upload(
        &self,
        image: &ProcessedImage,
        folder: &str,
    ) -> Result<UploadResponse, ServiceError> {
        let part = Part::bytes(image.bytes.to_vec())
            .file_name(image.filename.clone())
            .mime_str(image.format.content_type())
            .map_err(|err| ServiceError::invalid_request(err.to_string()))?;
        let form = Form::new()
            .part("file", part)
            .text("folder", folder.to_string());

        let mut request = self.client.post(self.endpoint.clone()).multipart(form);
        if let Some(key) = &self.api_key {
            request = request.header("apikey", key).bearer_auth(key);
        }

        let response = request.send().await.map_err(|err| {
            if err.is_timeout() {
                ServiceError::timeout(err.to_string())
            } else {
                ServiceError::network(err.to_string())
            }
        })?;
        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|err| ServiceError::network(err.to_string()))?;

        if !status.is_success() {
            let text = String::from_utf8_lossy(&bytes).into_owned();
            return Err(ServiceError::status(status.as_u16(), None, text));
        }

        let uploaded: UploadResponse = serde_json::from_slice(&bytes)
            .map_err(|err| ServiceError::decode(format!("upload response: {err}")))?;
        debug!(
            target = SOURCE,
            filename = image.filename.as_str(),
            folder,
            url = uploaded.url.as_str(),
            "upload stored"
        );
        Ok(uploaded)
    }
}
