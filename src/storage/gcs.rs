use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{info, warn};

use super::{
    content_type_for, generate_image_name, validate_name, ImageUploader, UploadError, IMAGE_PREFIX,
};

const UPLOAD_ENDPOINT: &str = "https://storage.googleapis.com/upload/storage/v1/b";
const PUBLIC_HOST: &str = "https://storage.googleapis.com";

#[derive(Debug, Deserialize)]
struct GcsErrorEnvelope {
    error: Option<GcsError>,
}

#[derive(Debug, Deserialize)]
struct GcsError {
    message: Option<String>,
}

/// Google Cloud Storage media upload. Objects are written with the
/// `publicRead` ACL so the returned URL works without credentials.
pub struct GcsUploader {
    client: Client,
    bucket: String,
    access_token: String,
}

impl GcsUploader {
    pub fn new(bucket: String, access_token: String) -> Result<Self, UploadError> {
        let client = Client::builder().timeout(Duration::from_secs(60)).build()?;
        Ok(Self {
            client,
            bucket,
            access_token,
        })
    }

    fn public_url(&self, object: &str) -> String {
        format!("{}/{}/{}", PUBLIC_HOST, self.bucket, object)
    }
}

#[async_trait]
impl ImageUploader for GcsUploader {
    async fn upload(&self, bytes: Vec<u8>, filename: Option<String>) -> Result<String, UploadError> {
        let filename = filename.unwrap_or_else(generate_image_name);
        validate_name(&filename)?;
        let object = format!("{}/{}", IMAGE_PREFIX, filename);
        let size = bytes.len();

        let response = self
            .client
            .post(format!("{}/{}/o", UPLOAD_ENDPOINT, self.bucket))
            .query(&[
                ("uploadType", "media"),
                ("name", object.as_str()),
                ("predefinedAcl", "publicRead"),
            ])
            .bearer_auth(&self.access_token)
            .header("content-type", content_type_for(&filename))
            .body(bytes)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<GcsErrorEnvelope>(&body)
                .ok()
                .and_then(|e| e.error)
                .and_then(|e| e.message)
                .unwrap_or(body);
            warn!("Upload of {} failed with {}", object, status);
            return Err(UploadError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        info!("Uploaded {} ({} bytes) to bucket {}", object, size, self.bucket);
        Ok(self.public_url(&object))
    }
}
