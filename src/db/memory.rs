use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{RecordStore, StoreError, COLUMNS};

/// Process-local sheet, header row included. Used for demos and tests.
pub struct MemoryStore {
    rows: RwLock<Vec<Vec<String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        let header = COLUMNS.iter().map(|c| c.to_string()).collect();
        Self {
            rows: RwLock::new(vec![header]),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn get_all_rows(&self) -> Result<Vec<Vec<String>>, StoreError> {
        Ok(self.rows.read().await.iter().skip(1).cloned().collect())
    }

    async fn append_row(&self, row: Vec<String>) -> Result<(), StoreError> {
        self.rows.write().await.push(row);
        Ok(())
    }

    async fn update_cell(&self, row: usize, col: usize, value: &str) -> Result<(), StoreError> {
        if col == 0 || col > COLUMNS.len() {
            return Err(StoreError::UnknownColumn(col));
        }
        let mut rows = self.rows.write().await;
        // header is not addressable
        let target = match row.checked_sub(1) {
            Some(i) if i >= 1 => rows.get_mut(i).ok_or(StoreError::RowOutOfRange(row))?,
            _ => return Err(StoreError::RowOutOfRange(row)),
        };
        if target.len() < col {
            target.resize(col, String::new());
        }
        target[col - 1] = value.to_string();
        Ok(())
    }
}
