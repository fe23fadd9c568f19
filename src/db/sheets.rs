use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

use super::{RecordStore, StoreError, COLUMNS};

const SHEETS_API: &str = "https://sheets.googleapis.com/v4/spreadsheets/";

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<String>>,
}

#[derive(Debug, Serialize)]
struct ValueInput<'a> {
    values: Vec<Vec<&'a str>>,
}

#[derive(Debug, Deserialize)]
struct GoogleErrorEnvelope {
    error: Option<GoogleError>,
}

#[derive(Debug, Deserialize)]
struct GoogleError {
    message: Option<String>,
}

/// Google Sheets values API. The first worksheet row is the header; data
/// starts at row 2, matching the sheet coordinates of [`RecordStore`].
pub struct SheetsStore {
    client: Client,
    spreadsheet_id: String,
    sheet_name: String,
    access_token: String,
}

impl SheetsStore {
    pub fn new(
        spreadsheet_id: String,
        sheet_name: String,
        access_token: String,
    ) -> Result<Self, StoreError> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self {
            client,
            spreadsheet_id,
            sheet_name,
            access_token,
        })
    }

    fn values_url(&self, range: &str, suffix: &str) -> Result<Url, StoreError> {
        let mut url = Url::parse(SHEETS_API).map_err(|e| StoreError::Rejected {
            status: 0,
            message: e.to_string(),
        })?;
        url.path_segments_mut()
            .map_err(|_| StoreError::Rejected {
                status: 0,
                message: "invalid Sheets base URL".to_string(),
            })?
            .pop_if_empty()
            .push(&self.spreadsheet_id)
            .push("values")
            .push(&format!("{range}{suffix}"));
        Ok(url)
    }

    fn full_range(&self) -> String {
        format!("{}!A:{}", self.sheet_name, column_letter(COLUMNS.len()))
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, StoreError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<GoogleErrorEnvelope>(&body)
            .ok()
            .and_then(|e| e.error)
            .and_then(|e| e.message)
            .unwrap_or(body);
        warn!("Sheets request failed with {}: {}", status, message);
        Err(StoreError::Rejected {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl RecordStore for SheetsStore {
    async fn get_all_rows(&self) -> Result<Vec<Vec<String>>, StoreError> {
        let url = self.values_url(&self.full_range(), "")?;
        let response = self
            .client
            .get(url)
            .bearer_auth(&self.access_token)
            .send()
            .await?;
        let range: ValueRange = Self::check(response).await?.json().await?;
        Ok(range.values.into_iter().skip(1).collect())
    }

    async fn append_row(&self, row: Vec<String>) -> Result<(), StoreError> {
        let url = self.values_url(&self.full_range(), ":append")?;
        let body = ValueInput {
            values: vec![row.iter().map(String::as_str).collect()],
        };
        let response = self
            .client
            .post(url)
            .query(&[("valueInputOption", "RAW"), ("insertDataOption", "INSERT_ROWS")])
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn update_cell(&self, row: usize, col: usize, value: &str) -> Result<(), StoreError> {
        if col == 0 || col > COLUMNS.len() {
            return Err(StoreError::UnknownColumn(col));
        }
        if row < 2 {
            return Err(StoreError::RowOutOfRange(row));
        }
        let range = format!("{}!{}{}", self.sheet_name, column_letter(col), row);
        let url = self.values_url(&range, "")?;
        let body = ValueInput {
            values: vec![vec![value]],
        };
        let response = self
            .client
            .put(url)
            .query(&[("valueInputOption", "RAW")])
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }
}

/// A1 column letter for a 1-based column index.
fn column_letter(col: usize) -> String {
    let mut n = col;
    let mut letters = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push((b'A' + rem as u8) as char);
        n = (n - 1) / 26;
    }
    letters.iter().rev().collect()
}
