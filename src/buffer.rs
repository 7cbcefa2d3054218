//! Debounced buffer for multi-message questions.
//!
//! Contacts type questions across several WhatsApp messages and signal the
//! end with a question mark. Fragments accumulate here per contact; every
//! new fragment re-arms a single-shot reminder that nudges the contact if
//! the closing "?" never arrives. The buffer is in-memory only; pending
//! fragments do not survive a restart.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::engine::texts;
use crate::gateway::Outbound;

type Key = (String, String);

/// Reminder task handle; dropping it aborts the pending reminder.
struct ReminderTimer {
    handle: JoinHandle<()>,
}

impl Drop for ReminderTimer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

struct Entry {
    fragments: Vec<String>,
    #[allow(dead_code)]
    reminder: ReminderTimer,
}

/// Per-contact fragment buffer keyed by (instance, number).
pub struct QuestionBuffer {
    entries: Mutex<HashMap<Key, Entry>>,
    outbound: Arc<dyn Outbound>,
    reminder_after: Duration,
}

impl QuestionBuffer {
    pub fn new(outbound: Arc<dyn Outbound>, reminder_after: Duration) -> Arc<Self> {
        Arc::new(Self {
            entries: Mutex::new(HashMap::new()),
            outbound,
            reminder_after,
        })
    }

    /// Append a fragment and re-arm the contact's reminder.
    pub async fn push(&self, instance: &str, number: &str, fragment: &str) {
        let fragment = fragment.trim();
        if fragment.is_empty() {
            return;
        }

        let timer = self.spawn_reminder(instance.to_string(), number.to_string());
        let key = (instance.to_string(), number.to_string());
        let mut entries = self.entries.lock().await;
        match entries.get_mut(&key) {
            Some(entry) => {
                entry.fragments.push(fragment.to_string());
                // Replacing the timer aborts the previous one.
                entry.reminder = timer;
            }
            None => {
                entries.insert(
                    key,
                    Entry {
                        fragments: vec![fragment.to_string()],
                        reminder: timer,
                    },
                );
            }
        }
    }

    /// Take all buffered fragments plus the closing message, joined in
    /// arrival order. Cancels the reminder.
    pub async fn consume(&self, instance: &str, number: &str, last: &str) -> String {
        let key = (instance.to_string(), number.to_string());
        let entry = self.entries.lock().await.remove(&key);
        match entry {
            Some(entry) => {
                let mut parts = entry.fragments;
                let last = last.trim();
                if !last.is_empty() {
                    parts.push(last.to_string());
                }
                parts.join(" ")
            }
            None => last.trim().to_string(),
        }
    }

    /// Drop any buffered fragments and their reminder. Returns whether
    /// anything was buffered.
    pub async fn cancel(&self, instance: &str, number: &str) -> bool {
        let key = (instance.to_string(), number.to_string());
        self.entries.lock().await.remove(&key).is_some()
    }

    fn spawn_reminder(&self, instance: String, number: String) -> ReminderTimer {
        let outbound = self.outbound.clone();
        let delay = self.reminder_after;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = outbound
                .send_text(&instance, &number, texts::BUFFER_REMINDER)
                .await
            {
                warn!(number = %number, "Failed to send buffer reminder: {e}");
            }
        });
        ReminderTimer { handle }
    }
}
