use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use storefront::{Session, SessionId, Storefront};
use tokio::sync::{Mutex, RwLock};

/// One interaction per session at a time: each session sits behind its own lock
pub type SessionHandle = Arc<Mutex<Session>>;

/// Sessions untouched for this long are dropped
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30 * 60);

struct SessionEntry {
    handle: SessionHandle,
    last_seen: Instant,
}

pub struct AppState {
    pub storefront: Storefront,
    sessions: RwLock<HashMap<SessionId, SessionEntry>>,
    idle_timeout: Duration,
}

impl AppState {
    pub fn new(storefront: Storefront) -> Self {
        Self {
            storefront,
            sessions: RwLock::new(HashMap::new()),
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        }
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    pub async fn create_session(&self) -> SessionHandle {
        let session = Session::new();
        let id = session.id.clone();
        let handle = Arc::new(Mutex::new(session));
        let mut sessions = self.sessions.write().await;
        let expired = Self::evict_idle(&mut sessions, self.idle_timeout);
        sessions.insert(
            id.clone(),
            SessionEntry {
                handle: Arc::clone(&handle),
                last_seen: Instant::now(),
            },
        );
        tracing::info!(session = %id, active = sessions.len(), expired, "Session started");
        handle
    }

    /// Looks up a live session and marks it as used
    pub async fn session(&self, id: &str) -> Option<SessionHandle> {
        let mut sessions = self.sessions.write().await;
        let entry = sessions.get_mut(id)?;
        if entry.last_seen.elapsed() > self.idle_timeout {
            sessions.remove(id);
            tracing::debug!(session = %id, "Session expired");
            return None;
        }
        entry.last_seen = Instant::now();
        Some(Arc::clone(&entry.handle))
    }

    pub async fn end_session(&self, id: &str) -> bool {
        let removed = self.sessions.write().await.remove(id).is_some();
        if removed {
            tracing::info!(session = %id, "Session ended");
        }
        removed
    }

    /// Drops every idle session, returning how many went
    pub async fn sweep_idle(&self) -> usize {
        let mut sessions = self.sessions.write().await;
        Self::evict_idle(&mut sessions, self.idle_timeout)
    }

    pub async fn active_sessions(&self) -> usize {
        self.sessions.read().await.len()
    }

    fn evict_idle(
        sessions: &mut HashMap<SessionId, SessionEntry>,
        idle_timeout: Duration,
    ) -> usize {
        let before = sessions.len();
        sessions.retain(|_, entry| entry.last_seen.elapsed() <= idle_timeout);
        before - sessions.len()
    }
}
