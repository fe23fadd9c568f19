use async_trait::async_trait;

use super::{DbPool, RecordStore, StoreError, COLUMNS};

type RowTuple = (String, String, String, String, String, String, String);

/// Sheet rows kept in the `submission_rows` table. Insertion order stands in
/// for sheet order, and the header row is implied rather than stored.
pub struct PgRecordStore {
    pool: DbPool,
}

impl PgRecordStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RecordStore for PgRecordStore {
    async fn get_all_rows(&self) -> Result<Vec<Vec<String>>, StoreError> {
        let rows = sqlx::query_as::<_, RowTuple>(
            r#"
            SELECT code, student_name, description, generated_prompt, image_url, approved, created_at
            FROM submission_rows
            ORDER BY row_id
            "#,
        )
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(rows
            .into_iter()
            .map(|(a, b, c, d, e, f, g)| vec![a, b, c, d, e, f, g])
            .collect())
    }

    async fn append_row(&self, mut row: Vec<String>) -> Result<(), StoreError> {
        row.resize(COLUMNS.len(), String::new());
        let mut query = sqlx::query::<sqlx::Postgres>(
            r#"
            INSERT INTO submission_rows (code, student_name, description, generated_prompt, image_url, approved, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        );
        for cell in row {
            query = query.bind(cell);
        }
        query.execute(self.pool.as_ref()).await?;
        Ok(())
    }

    async fn update_cell(&self, row: usize, col: usize, value: &str) -> Result<(), StoreError> {
        let column = col
            .checked_sub(1)
            .and_then(|i| COLUMNS.get(i))
            .ok_or(StoreError::UnknownColumn(col))?;
        let offset = row
            .checked_sub(2)
            .ok_or(StoreError::RowOutOfRange(row))? as i64;

        // column names come from the fixed COLUMNS list, never from input
        let sql = format!(
            "UPDATE submission_rows SET {column} = $1 \
             WHERE row_id = (SELECT row_id FROM submission_rows ORDER BY row_id OFFSET $2 LIMIT 1)"
        );
        let result = sqlx::query::<sqlx::Postgres>(&sql)
            .bind(value)
            .bind(offset)
            .execute(self.pool.as_ref())
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::RowOutOfRange(row));
        }
        Ok(())
    }
}
