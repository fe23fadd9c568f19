use async_trait::async_trait;
use std::path::PathBuf;
use tracing::info;

use super::{generate_image_name, validate_name, ImageUploader, UploadError, IMAGE_PREFIX};

/// Writes images under `<root>/images/` and serves them from
/// `<public_base_url>/images/`.
pub struct LocalUploader {
    root: PathBuf,
    public_base_url: String,
}

impl LocalUploader {
    pub fn new(root: PathBuf, public_base_url: String) -> Self {
        Self {
            root,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl ImageUploader for LocalUploader {
    async fn upload(&self, bytes: Vec<u8>, filename: Option<String>) -> Result<String, UploadError> {
        let filename = filename.unwrap_or_else(generate_image_name);
        validate_name(&filename)?;

        let dir = self.root.join(IMAGE_PREFIX);
        tokio::fs::create_dir_all(&dir).await?;
        let path = dir.join(&filename);
        tokio::fs::write(&path, &bytes).await?;
        info!("Stored {} bytes at {}", bytes.len(), path.display());

        Ok(format!("{}/{}/{}", self.public_base_url, IMAGE_PREFIX, filename))
    }
}
