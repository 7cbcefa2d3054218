//! In-memory per-contact session counters.
//!
//! Question and reply counts are deliberately not persisted: they bound
//! usage within a process lifetime, and a restart resetting them is
//! acceptable.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tracing::debug;

#[derive(Debug, Default)]
struct Session {
    question_count: u32,
    ai_reply_count: u32,
    last_seen: Option<Instant>,
}

/// Shared session table keyed by contact number.
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Session>>,
    idle_timeout: Duration,
}

impl SessionStore {
    pub fn new(idle_timeout: Duration) -> Arc<Self> {
        Arc::new(Self {
            sessions: RwLock::new(HashMap::new()),
            idle_timeout,
        })
    }

    /// Count a question for this contact and return the new total.
    pub async fn record_question(&self, key: &str) -> u32 {
        let mut sessions = self.sessions.write().await;
        let session = sessions.entry(key.to_string()).or_default();
        session.question_count += 1;
        session.last_seen = Some(Instant::now());
        session.question_count
    }

    /// Count an answered reply and return the new total. Drives the
    /// navigation-footer cadence.
    pub async fn record_ai_reply(&self, key: &str) -> u32 {
        let mut sessions = self.sessions.write().await;
        let session = sessions.entry(key.to_string()).or_default();
        session.ai_reply_count += 1;
        session.last_seen = Some(Instant::now());
        session.ai_reply_count
    }

    /// Drop sessions idle past the timeout. Returns how many were removed.
    pub async fn prune_idle(&self) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, session| match session.last_seen {
            Some(seen) => seen.elapsed() < self.idle_timeout,
            None => false,
        });
        before - sessions.len()
    }
}

/// Background task that prunes idle sessions on an interval.
pub fn spawn_prune_task(
    store: Arc<SessionStore>,
    every: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            let pruned = store.prune_idle().await;
            if pruned > 0 {
                debug!(pruned, "Idle sessions pruned");
            }
        }
    })
}
