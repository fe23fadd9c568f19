mod memory;
mod models;
mod postgres;
mod sheets;

pub use memory::MemoryStore;
pub use models::*;
pub use postgres::PgRecordStore;
pub use sheets::SheetsStore;

use async_trait::async_trait;
use chrono::{DateTime, Local};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::sync::Arc;

pub type DbPool = Arc<PgPool>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Record store rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Row {0} does not exist")]
    RowOutOfRange(usize),

    #[error("Column {0} does not exist")]
    UnknownColumn(usize),
}

/// Raw sheet access. Coordinates are 1-based with the header in row 1;
/// adapters carry no knowledge of what the columns mean.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// All data rows in store order, header excluded.
    async fn get_all_rows(&self) -> Result<Vec<Vec<String>>, StoreError>;

    async fn append_row(&self, row: Vec<String>) -> Result<(), StoreError>;

    async fn update_cell(&self, row: usize, col: usize, value: &str) -> Result<(), StoreError>;
}

pub async fn create_pool(database_url: &str) -> Result<DbPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await?;

    Ok(Arc::new(pool))
}

pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Submission-level view over a [`RecordStore`].
///
/// Every read fetches the full row set. Writes address rows by position
/// with no locking, so concurrent teacher actions on one row are
/// last-write-wins per cell, and a row shifting between read and write
/// is not detected.
#[derive(Clone)]
pub struct SubmissionRepository {
    store: Arc<dyn RecordStore>,
}

impl SubmissionRepository {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    pub async fn all(&self) -> Result<Vec<StoredSubmission>, StoreError> {
        let rows = self.store.get_all_rows().await?;
        Ok(rows
            .iter()
            .enumerate()
            .map(|(i, cells)| StoredSubmission {
                position: RowPosition::from_data_index(i),
                submission: Submission::from_cells(cells),
            })
            .collect())
    }

    #[cfg(test)]
    pub async fn count(&self) -> Result<usize, StoreError> {
        Ok(self.store.get_all_rows().await?.len())
    }

    pub async fn append(&self, submission: &Submission) -> Result<(), StoreError> {
        self.store.append_row(submission.to_cells()).await
    }

    /// Most recent row matching `key`, scanning from the end of the sheet.
    /// A repeated description always resolves to its newest copy, even when
    /// the session is waiting on an older one.
    pub async fn find_latest(
        &self,
        key: &SubmissionKey,
    ) -> Result<Option<StoredSubmission>, StoreError> {
        Ok(self
            .all()
            .await?
            .into_iter()
            .rev()
            .find(|row| row.submission.matches(key)))
    }

    pub async fn list_pending(&self, code: &str) -> Result<Vec<StoredSubmission>, StoreError> {
        Ok(self
            .all()
            .await?
            .into_iter()
            .filter(|row| row.submission.code == code && !row.submission.approved)
            .collect())
    }

    pub async fn get(&self, position: RowPosition) -> Result<StoredSubmission, StoreError> {
        let index = position
            .data_index()
            .ok_or(StoreError::RowOutOfRange(position.0))?;
        self.all()
            .await?
            .into_iter()
            .nth(index)
            .ok_or(StoreError::RowOutOfRange(position.0))
    }

    pub async fn set_approved(&self, position: RowPosition, approved: bool) -> Result<(), StoreError> {
        self.store
            .update_cell(position.0, COL_APPROVED, format_flag(approved))
            .await
    }

    /// Overwrites the generated content of a row and sends it back for
    /// approval. The three cell writes are not atomic.
    pub async fn replace_image(
        &self,
        position: RowPosition,
        generated_prompt: &str,
        image_url: &str,
    ) -> Result<(), StoreError> {
        self.store
            .update_cell(position.0, COL_GENERATED_PROMPT, generated_prompt)
            .await?;
        self.store
            .update_cell(position.0, COL_IMAGE_URL, image_url)
            .await?;
        self.set_approved(position, false).await
    }
}

pub fn now() -> DateTime<Local> {
    Local::now()
}
