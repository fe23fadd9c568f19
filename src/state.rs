use crate::agents::{ModerationProfile, Pipeline};
use crate::db::SubmissionRepository;
use crate::session::{PollSchedule, SessionRegistry};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub repo: SubmissionRepository,
    pub pipeline: Arc<Pipeline>,
    pub profile: Arc<ModerationProfile>,
    pub sessions: Arc<SessionRegistry>,
    pub schedule: PollSchedule,
}
