//! Student-side submission state machine.
//!
//! A session is `Idle` until a complete submission succeeds, then `Waiting`
//! until a poll finds its row approved. Everything a session remembers lives
//! in [`SessionContext`]; the record store only ever sees appended rows.

mod poller;
mod registry;

pub use poller::{spawn_poller, PollSchedule};
pub use registry::{SessionHandle, SessionRegistry};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::agents::{ModerationProfile, Pipeline};
use crate::db::{self, StoreError, Submission, SubmissionKey, SubmissionRepository};

pub const GREETING: &str = "Hello! Tell me about the picture you want to draw. \
You can keep changing your description to change the picture.";
pub const WAITING_MESSAGE: &str = "Your teacher is checking the picture.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Idle,
    Waiting,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "role", content = "content", rename_all = "lowercase")]
pub enum ConversationEntry {
    Student(String),
    Assistant(String),
    Image(String),
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubmitRequest {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub student_name: String,
    #[serde(default)]
    pub description: String,
}

impl SubmitRequest {
    fn into_key(self) -> Option<SubmissionKey> {
        let complete = [&self.code, &self.student_name, &self.description]
            .iter()
            .all(|field| !field.trim().is_empty());
        complete.then(|| SubmissionKey {
            code: self.code,
            student_name: self.student_name,
            description: self.description,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum SubmitOutcome {
    /// A required field was blank; nothing happened.
    Ignored,
    Waiting,
    Failed { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum PollOutcome {
    Idle,
    Waiting,
    Approved { image_url: String },
}

#[derive(Debug, Clone)]
pub struct SessionContext {
    state: SessionState,
    history: Vec<String>,
    conversation: Vec<ConversationEntry>,
    pending: Option<SubmissionKey>,
}

impl SessionContext {
    pub fn new() -> Self {
        Self {
            state: SessionState::Idle,
            history: Vec::new(),
            conversation: vec![ConversationEntry::Assistant(GREETING.to_string())],
            pending: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Every description submitted in this session, oldest first.
    #[cfg(test)]
    pub fn history(&self) -> &[String] {
        &self.history
    }

    pub fn conversation(&self) -> &[ConversationEntry] {
        &self.conversation
    }

    #[cfg(test)]
    pub fn pending(&self) -> Option<&SubmissionKey> {
        self.pending.as_ref()
    }

    /// Runs a new description through the pipeline and records it as a
    /// pending row. A submission made while already waiting replaces the
    /// row being waited on.
    pub async fn submit(
        &mut self,
        request: SubmitRequest,
        pipeline: &Pipeline,
        profile: &ModerationProfile,
        repo: &SubmissionRepository,
    ) -> SubmitOutcome {
        let Some(key) = request.into_key() else {
            return SubmitOutcome::Ignored;
        };

        self.history.push(key.description.clone());
        self.conversation
            .push(ConversationEntry::Student(key.description.clone()));
        self.state = SessionState::Waiting;

        match self.generate_and_record(&key, pipeline, profile, repo).await {
            Ok(()) => {
                info!(
                    "Submission from {} ({}) awaiting approval",
                    key.student_name, key.code
                );
                self.conversation
                    .push(ConversationEntry::Assistant(WAITING_MESSAGE.to_string()));
                self.pending = Some(key);
                SubmitOutcome::Waiting
            }
            Err(message) => {
                warn!("Submission from {} failed: {}", key.student_name, message);
                self.state = SessionState::Idle;
                self.pending = None;
                self.conversation
                    .push(ConversationEntry::Assistant(format!("Something went wrong: {}", message)));
                SubmitOutcome::Failed { message }
            }
        }
    }

    async fn generate_and_record(
        &self,
        key: &SubmissionKey,
        pipeline: &Pipeline,
        profile: &ModerationProfile,
        repo: &SubmissionRepository,
    ) -> Result<(), String> {
        let image = pipeline
            .generate(&self.history, profile)
            .await
            .map_err(|e| e.to_string())?;
        let row = Submission::new_pending(key.clone(), image.prompt, image.image_url, db::now());
        repo.append(&row).await.map_err(|e| e.to_string())
    }

    /// Checks whether the awaited row has been approved. Safe to call any
    /// number of times; it only reads the store, and mutates the session
    /// solely on the approval transition.
    pub async fn poll(&mut self, repo: &SubmissionRepository) -> Result<PollOutcome, StoreError> {
        let Some(key) = self.pending.as_ref().filter(|_| self.state == SessionState::Waiting) else {
            return Ok(PollOutcome::Idle);
        };

        // a missing row reads as still pending
        let Some(row) = repo.find_latest(key).await? else {
            return Ok(PollOutcome::Waiting);
        };
        if !row.submission.approved {
            return Ok(PollOutcome::Waiting);
        }

        let image_url = row.submission.image_url;
        info!("Row {} approved for {}", row.position, key.student_name);
        self.conversation
            .push(ConversationEntry::Image(image_url.clone()));
        self.state = SessionState::Idle;
        self.pending = None;
        Ok(PollOutcome::Approved { image_url })
    }
}

impl Default for SessionContext {
    fn default() -> Self {
        Self::new()
    }
}
