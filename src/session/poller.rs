use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{PollOutcome, SessionRegistry, SessionState};
use crate::config::{clamp_poll_secs, DEFAULT_POLL_SECS};
use crate::db::SubmissionRepository;

/// How often a waiting session re-checks the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSchedule {
    interval: Duration,
}

impl PollSchedule {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval: Duration::from_secs(clamp_poll_secs(interval.as_secs())),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn retry_after_secs(&self) -> u64 {
        self.interval.as_secs()
    }
}

impl Default for PollSchedule {
    fn default() -> Self {
        Self::new(Duration::from_secs(DEFAULT_POLL_SECS))
    }
}

/// Re-polls a waiting session on a fixed interval until it is approved,
/// leaves the waiting state, or goes unseen for the registry's idle TTL. The
/// first check runs immediately. Ticks that land within one interval of a
/// client poll are skipped. Aborting the handle cancels polling; the pending
/// row stays in the store.
pub fn spawn_poller(
    registry: Arc<SessionRegistry>,
    id: Uuid,
    repo: SubmissionRepository,
    schedule: PollSchedule,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(schedule.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let Some(activity) = registry.activity(&id).await else {
                debug!("Session {} is gone, poller exiting", id);
                break;
            };

            if activity.last_seen.elapsed() > registry.idle_ttl() {
                if registry.expire(&id).await {
                    info!("Session {} went idle while waiting, evicted", id);
                }
                break;
            }
            let client_polled = activity
                .last_client_poll
                .is_some_and(|at| at.elapsed() < schedule.interval());
            if client_polled {
                continue;
            }

            let mut context = activity.context.lock().await;
            if context.state() != SessionState::Waiting {
                debug!("Session {} no longer waiting, poller exiting", id);
                break;
            }
            match context.poll(&repo).await {
                Ok(PollOutcome::Approved { image_url }) => {
                    info!("Approval observed for session {}: {}", id, image_url);
                    break;
                }
                Ok(_) => {}
                Err(e) => warn!("Approval poll for session {} failed, will retry: {}", id, e),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::ModerationProfile;
    use crate::db::{MemoryStore, RowPosition};
    use crate::session::SubmitRequest;
    use crate::testing::{
        pipeline_with, CountingStore, FakeRewriter, FakeSynthesizer, FakeUploader,
    };

    #[test]
    fn test_schedule_is_clamped() {
        assert_eq!(PollSchedule::new(Duration::ZERO).interval(), Duration::from_secs(1));
        assert_eq!(PollSchedule::default().retry_after_secs(), 10);
        assert_eq!(
            PollSchedule::new(Duration::from_secs(600)).interval(),
            Duration::from_secs(60)
        );
    }

    async fn submitted(registry: &SessionRegistry, repo: &SubmissionRepository) -> Uuid {
        let pipeline = pipeline_with(
            Arc::new(FakeRewriter::new()),
            Arc::new(FakeSynthesizer::bytes()),
            Arc::new(FakeUploader::new()),
        );
        let (id, handle) = registry.create().await;
        handle
            .lock()
            .await
            .submit(
                SubmitRequest {
                    code: "fox".into(),
                    student_name: "Mina".into(),
                    description: "a dog".into(),
                },
                &pipeline,
                &ModerationProfile::elementary(),
                repo,
            )
            .await;
        id
    }

    #[tokio::test]
    async fn test_poller_exits_once_approval_is_seen() {
        let registry = Arc::new(SessionRegistry::new(Duration::from_secs(600)));
        let repo = SubmissionRepository::new(Arc::new(MemoryStore::new()));
        let id = submitted(&registry, &repo).await;
        repo.set_approved(RowPosition(2), true).await.unwrap();

        let handle = spawn_poller(registry.clone(), id, repo, PollSchedule::default());
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("poller should finish on the first tick")
            .unwrap();

        let session = registry.get(&id).await.unwrap();
        assert_eq!(session.lock().await.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn test_poller_exits_for_idle_session() {
        let registry = Arc::new(SessionRegistry::new(Duration::from_secs(600)));
        let store = Arc::new(CountingStore::new());
        let repo = SubmissionRepository::new(store.clone());
        let (id, _) = registry.create().await;

        let handle = spawn_poller(registry, id, repo, PollSchedule::default());
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("idle session should stop the poller")
            .unwrap();

        assert_eq!(store.reads(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_waiting_session_is_evicted() {
        let registry = Arc::new(SessionRegistry::new(Duration::from_secs(30)));
        let store = Arc::new(CountingStore::new());
        let repo = SubmissionRepository::new(store.clone());
        let id = submitted(&registry, &repo).await;
        let reads_after_submit = store.reads();

        let handle = spawn_poller(
            registry.clone(),
            id,
            repo,
            PollSchedule::new(Duration::from_secs(1)),
        );
        tokio::time::timeout(Duration::from_secs(40), handle)
            .await
            .expect("abandoned session should stop the poller")
            .unwrap();

        assert_eq!(registry.len().await, 0);
        let reads = store.reads();
        assert!(reads > reads_after_submit);

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(store.reads(), reads);
    }

    #[tokio::test(start_paused = true)]
    async fn test_client_polls_replace_background_reads() {
        let registry = Arc::new(SessionRegistry::new(Duration::from_secs(600)));
        let store = Arc::new(CountingStore::new());
        let repo = SubmissionRepository::new(store.clone());
        let id = submitted(&registry, &repo).await;
        let schedule = PollSchedule::new(Duration::from_secs(10));

        let handle = spawn_poller(registry.clone(), id, repo, schedule);
        tokio::time::sleep(Duration::from_millis(1)).await;
        let reads = store.reads();
        assert!(reads > 0);

        for _ in 0..5 {
            registry.record_client_poll(&id).await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        }

        assert_eq!(store.reads(), reads);
        handle.abort();
    }
}
