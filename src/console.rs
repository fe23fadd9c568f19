//! Teacher-side review of pending pictures.
//!
//! Actions address rows by sheet position and take no locks: two teachers
//! acting on the same row race, and the last cell write wins.

use tracing::{info, warn};

use crate::agents::{GeneratedImage, ModerationProfile, Pipeline, PipelineError};
use crate::db::{RowPosition, StoreError, StoredSubmission, SubmissionRepository};

#[derive(Debug, thiserror::Error)]
pub enum ConsoleError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Image regeneration failed: {0}")]
    Regeneration(#[from] PipelineError),
}

pub async fn list_pending(
    repo: &SubmissionRepository,
    code: &str,
) -> Result<Vec<StoredSubmission>, StoreError> {
    if code.trim().is_empty() {
        return Ok(Vec::new());
    }
    repo.list_pending(code).await
}

/// Releases a picture to its student. Approving twice is harmless.
pub async fn approve(repo: &SubmissionRepository, position: RowPosition) -> Result<(), ConsoleError> {
    // resolve first so a bad position fails without writing
    repo.get(position).await?;
    repo.set_approved(position, true).await?;
    info!("Approved row {}", position);
    Ok(())
}

/// Renders a fresh picture from the row's literal description and sends
/// it back for approval. The row is only written after the new image is
/// uploaded; a store failure between the cell writes leaves the row
/// partially updated.
pub async fn regenerate(
    repo: &SubmissionRepository,
    pipeline: &Pipeline,
    profile: &ModerationProfile,
    position: RowPosition,
) -> Result<StoredSubmission, ConsoleError> {
    let row = repo.get(position).await?;

    let GeneratedImage { prompt, image_url } = pipeline
        .regenerate(&row.submission.description, profile)
        .await
        .map_err(|e| {
            warn!("Regeneration of row {} failed: {}", position, e);
            e
        })?;

    repo.replace_image(position, &prompt, &image_url).await?;
    info!("Regenerated row {}: {}", position, image_url);

    let mut submission = row.submission;
    submission.generated_prompt = prompt;
    submission.image_url = image_url;
    submission.approved = false;
    Ok(StoredSubmission { position, submission })
}
