use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// Column order of the shared submissions sheet.
pub const COLUMNS: [&str; 7] = [
    "code",
    "student_name",
    "description",
    "generated_prompt",
    "image_url",
    "approved",
    "created_at",
];

pub const COL_GENERATED_PROMPT: usize = 4;
pub const COL_IMAGE_URL: usize = 5;
pub const COL_APPROVED: usize = 6;

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// 1-based sheet row of a submission. The header occupies row 1, so the
/// first data row lives at position 2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RowPosition(pub usize);

impl RowPosition {
    pub fn from_data_index(index: usize) -> Self {
        Self(index + 2)
    }

    pub fn data_index(self) -> Option<usize> {
        self.0.checked_sub(2)
    }
}

impl std::fmt::Display for RowPosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Logical lookup key a student session polls with. Not unique: a student
/// repeating the same description produces colliding keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionKey {
    pub code: String,
    pub student_name: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    pub code: String,
    pub student_name: String,
    pub description: String,
    pub generated_prompt: String,
    pub image_url: String,
    pub approved: bool,
    pub created_at: String,
}

impl Submission {
    pub fn new_pending(
        key: SubmissionKey,
        generated_prompt: String,
        image_url: String,
        created_at: DateTime<Local>,
    ) -> Self {
        Self {
            code: key.code,
            student_name: key.student_name,
            description: key.description,
            generated_prompt,
            image_url,
            approved: false,
            created_at: created_at.format(TIMESTAMP_FORMAT).to_string(),
        }
    }

    /// Builds a submission from raw sheet cells. Stores drop trailing empty
    /// cells, so missing columns read as empty strings.
    pub fn from_cells(cells: &[String]) -> Self {
        let cell = |i: usize| cells.get(i).cloned().unwrap_or_default();
        Self {
            code: cell(0),
            student_name: cell(1),
            description: cell(2),
            generated_prompt: cell(3),
            image_url: cell(4),
            approved: parse_flag(&cell(5)),
            created_at: cell(6),
        }
    }

    pub fn to_cells(&self) -> Vec<String> {
        vec![
            self.code.clone(),
            self.student_name.clone(),
            self.description.clone(),
            self.generated_prompt.clone(),
            self.image_url.clone(),
            format_flag(self.approved).to_string(),
            self.created_at.clone(),
        ]
    }

    #[cfg(test)]
    pub fn key(&self) -> SubmissionKey {
        SubmissionKey {
            code: self.code.clone(),
            student_name: self.student_name.clone(),
            description: self.description.clone(),
        }
    }

    pub fn matches(&self, key: &SubmissionKey) -> bool {
        self.code == key.code
            && self.student_name == key.student_name
            && self.description == key.description
    }
}

/// A submission together with the sheet row it was read from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredSubmission {
    pub position: RowPosition,
    #[serde(flatten)]
    pub submission: Submission,
}

pub fn parse_flag(raw: &str) -> bool {
    raw.trim().eq_ignore_ascii_case("TRUE")
}

pub fn format_flag(flag: bool) -> &'static str {
    if flag {
        "TRUE"
    } else {
        "FALSE"
    }
}
