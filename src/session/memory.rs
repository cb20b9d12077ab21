//! In-process session store.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

use super::{Session, Store, clamp_expiration};
use crate::error::Error;

const MIN_SWEEP_PERIOD: Duration = Duration::from_millis(1);

type Sessions = RwLock<HashMap<String, Arc<MemorySession>>>;

struct MemorySession {
    id: String,
    data: Mutex<HashMap<String, serde_json::Value>>,
    expires_at: Mutex<Instant>,
}

impl MemorySession {
    fn is_live(&self, now: Instant) -> bool {
        now < *self.expires_at.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn extend(&self, ttl: Duration) {
        *self.expires_at.lock().unwrap_or_else(PoisonError::into_inner) = Instant::now() + ttl;
    }
}

#[async_trait]
impl Session for MemorySession {
    fn id(&self) -> &str {
        &self.id
    }

    async fn get(&self, key: &str) -> Result<serde_json::Value, Error> {
        self.data
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
            .ok_or_else(|| Error::SessionKeyNotFound(key.to_owned()))
    }

    async fn set(&self, key: &str, value: serde_json::Value) -> Result<(), Error> {
        self.data
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_owned(), value);
        Ok(())
    }
}

/// Sessions held in a process-local map.
///
/// Membership is guarded by a reader/writer lock; each session's values by
/// their own mutex. Expired sessions are invisible to [`Store::get`] straight
/// away and dropped from memory by [`MemoryStore::sweep`], which
/// [`MemoryStore::spawn_sweeper`] runs periodically.
pub struct MemoryStore {
    sessions: Arc<Sessions>,
    expiration: Duration,
}

impl MemoryStore {
    /// `expiration` is clamped to 1 min – 24 h; zero means 30 min.
    pub fn new(expiration: Duration) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            expiration: clamp_expiration(expiration),
        }
    }

    pub fn expiration(&self) -> Duration {
        self.expiration
    }

    /// Number of entries held, expired or not.
    pub fn len(&self) -> usize {
        self.sessions.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every expired session and returns how many were removed.
    pub fn sweep(&self) -> usize {
        sweep(&self.sessions)
    }

    /// Runs [`sweep`](Self::sweep) every `every` on the current tokio runtime.
    ///
    /// The task stops on its own once the store is dropped. Periods below one
    /// millisecond, zero included, run at one millisecond.
    pub fn spawn_sweeper(&self, every: Duration) -> JoinHandle<()> {
        let every = every.max(MIN_SWEEP_PERIOD);
        let sessions: Weak<Sessions> = Arc::downgrade(&self.sessions);
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(every);
            tick.tick().await;
            loop {
                tick.tick().await;
                let Some(sessions) = sessions.upgrade() else { break };
                sweep(&sessions);
            }
        })
    }

    fn live(&self, id: &str) -> Result<Arc<MemorySession>, Error> {
        let sessions = self.sessions.read().unwrap_or_else(PoisonError::into_inner);
        match sessions.get(id) {
            Some(s) if s.is_live(Instant::now()) => Ok(Arc::clone(s)),
            _ => Err(Error::NoSession),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(Duration::ZERO)
    }
}

fn sweep(sessions: &Sessions) -> usize {
    let now = Instant::now();
    let mut sessions = sessions.write().unwrap_or_else(PoisonError::into_inner);
    let before = sessions.len();
    sessions.retain(|_, s| s.is_live(now));
    let removed = before - sessions.len();
    if removed > 0 {
        debug!(removed, remaining = sessions.len(), "expired sessions swept");
    }
    removed
}

#[async_trait]
impl Store for MemoryStore {
    async fn generate(&self, id: &str) -> Result<Arc<dyn Session>, Error> {
        let session = Arc::new(MemorySession {
            id: id.to_owned(),
            data: Mutex::new(HashMap::new()),
            expires_at: Mutex::new(Instant::now() + self.expiration),
        });
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.to_owned(), Arc::clone(&session));
        Ok(session)
    }

    async fn get(&self, id: &str) -> Result<Arc<dyn Session>, Error> {
        let session: Arc<dyn Session> = self.live(id)?;
        Ok(session)
    }

    async fn refresh(&self, id: &str) -> Result<(), Error> {
        self.live(id)?.extend(self.expiration);
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<(), Error> {
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id);
        Ok(())
    }
}
