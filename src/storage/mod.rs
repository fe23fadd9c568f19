mod gcs;
mod local;

pub use gcs::GcsUploader;
pub use local::LocalUploader;

use async_trait::async_trait;
use std::path::Path;
use uuid::Uuid;

/// Prefix every uploaded object is stored under.
pub const IMAGE_PREFIX: &str = "images";

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Upload request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Storage rejected upload ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Invalid object name: {0}")]
    InvalidName(String),
}

/// Object storage that makes uploaded images publicly fetchable.
#[async_trait]
pub trait ImageUploader: Send + Sync {
    /// Stores `bytes` under `filename` (a fresh `<uuid>.png` when `None`)
    /// and returns its public URL.
    async fn upload(&self, bytes: Vec<u8>, filename: Option<String>) -> Result<String, UploadError>;
}

pub fn generate_image_name() -> String {
    format!("{}.png", Uuid::new_v4())
}

pub fn content_type_for(filename: &str) -> &'static str {
    mime_guess::from_path(filename)
        .first_raw()
        .unwrap_or("application/octet-stream")
}

/// Accepts plain file names only.
pub(crate) fn validate_name(filename: &str) -> Result<(), UploadError> {
    if filename.is_empty() || filename.contains("..") || filename.contains('/') || filename.contains('\\') {
        return Err(UploadError::InvalidName(filename.to_string()));
    }
    Ok(())
}

pub fn ensure_dirs(upload_folder: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(upload_folder.join(IMAGE_PREFIX))
}
