use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use uuid::Uuid;

use super::SessionContext;

pub type SessionHandle = Arc<Mutex<SessionContext>>;

struct SessionEntry {
    context: SessionHandle,
    poller: Option<JoinHandle<()>>,
    last_seen: Instant,
    last_client_poll: Option<Instant>,
}

impl SessionEntry {
    fn is_expired(&self, idle_ttl: Duration) -> bool {
        self.last_seen.elapsed() > idle_ttl
    }
}

/// What a background poller needs to know about its session on each tick.
pub struct SessionActivity {
    pub context: SessionHandle,
    pub last_seen: Instant,
    pub last_client_poll: Option<Instant>,
}

/// Live student sessions, keyed by an opaque id handed to the browser.
///
/// Sessions nobody has touched for `idle_ttl` are evicted, either by their
/// own poller or by the sweep that runs whenever a session is created.
pub struct SessionRegistry {
    sessions: Mutex<HashMap<Uuid, SessionEntry>>,
    idle_ttl: Duration,
}

impl SessionRegistry {
    pub fn new(idle_ttl: Duration) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            idle_ttl,
        }
    }

    pub fn idle_ttl(&self) -> Duration {
        self.idle_ttl
    }

    pub async fn create(&self) -> (Uuid, SessionHandle) {
        let id = Uuid::new_v4();
        let context = Arc::new(Mutex::new(SessionContext::new()));
        let mut sessions = self.sessions.lock().await;

        let idle_ttl = self.idle_ttl;
        sessions.retain(|expired_id, entry| {
            if !entry.is_expired(idle_ttl) {
                return true;
            }
            if let Some(poller) = entry.poller.take() {
                poller.abort();
            }
            tracing::info!("Evicted idle session {}", expired_id);
            false
        });

        sessions.insert(
            id,
            SessionEntry {
                context: context.clone(),
                poller: None,
                last_seen: Instant::now(),
                last_client_poll: None,
            },
        );
        (id, context)
    }

    /// Looks a session up and marks it as seen.
    pub async fn get(&self, id: &Uuid) -> Option<SessionHandle> {
        let mut sessions = self.sessions.lock().await;
        let entry = sessions.get_mut(id)?;
        entry.last_seen = Instant::now();
        Some(entry.context.clone())
    }

    /// Like [`get`](Self::get), and also tells the background poller that the
    /// client just checked the store itself.
    pub async fn record_client_poll(&self, id: &Uuid) -> Option<SessionHandle> {
        let mut sessions = self.sessions.lock().await;
        let entry = sessions.get_mut(id)?;
        let now = Instant::now();
        entry.last_seen = now;
        entry.last_client_poll = Some(now);
        Some(entry.context.clone())
    }

    /// Reads a session's timestamps without counting as a visit.
    pub async fn activity(&self, id: &Uuid) -> Option<SessionActivity> {
        self.sessions
            .lock()
            .await
            .get(id)
            .map(|entry| SessionActivity {
                context: entry.context.clone(),
                last_seen: entry.last_seen,
                last_client_poll: entry.last_client_poll,
            })
    }

    /// Installs the background poller for a session, cancelling any previous
    /// one. Returns false (and aborts `poller`) if the session is gone.
    pub async fn attach_poller(&self, id: &Uuid, poller: JoinHandle<()>) -> bool {
        let mut sessions = self.sessions.lock().await;
        match sessions.get_mut(id) {
            Some(entry) => {
                if let Some(previous) = entry.poller.replace(poller) {
                    previous.abort();
                }
                true
            }
            None => {
                poller.abort();
                false
            }
        }
    }

    /// Drops a session that has gone idle. Called from the session's own
    /// poller, so the poller handle is detached rather than aborted.
    pub async fn expire(&self, id: &Uuid) -> bool {
        let mut sessions = self.sessions.lock().await;
        match sessions.get(id) {
            Some(entry) if entry.is_expired(self.idle_ttl) => {
                sessions.remove(id);
                true
            }
            _ => false,
        }
    }

    /// Ends a session. Its pending row, if any, is left in the store.
    pub async fn remove(&self, id: &Uuid) -> bool {
        match self.sessions.lock().await.remove(id) {
            Some(entry) => {
                if let Some(poller) = entry.poller {
                    poller.abort();
                }
                true
            }
            None => false,
        }
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }
}
