//! Durable delayed-action queue.
//!
//! Steps are plain rows with a due time; a poller drains whatever is due.
//! Because rows live in the store, scheduled sequences survive restarts.
//! Delivery is at-most-once: a step is deleted after its dispatch attempt
//! whether or not the send succeeded, so a flaky gateway can drop a step
//! but never replay one.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::backend::FaqBackend;
use crate::config::FunnelConfig;
use crate::engine::contact::{Contact, ConversationStage, StateCommand};
use crate::engine::texts;
use crate::error::Result;
use crate::gateway::Outbound;
use crate::store::Store;

/// What a due step does when dispatched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepPayload {
    /// Send a text message.
    Text { text: String },
    /// Resolve a stored asset to a signed URL and send it as audio.
    Audio { asset: String },
    /// Release a paused conversation back to the bot.
    Resume,
}

/// Step family, used to cancel a whole sequence per contact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Welcome,
    Resume,
}

impl std::fmt::Display for StepKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StepKind::Welcome => "welcome",
            StepKind::Resume => "resume",
        };
        write!(f, "{s}")
    }
}

/// A single scheduled row.
#[derive(Debug, Clone)]
pub struct ScheduledStep {
    pub id: Uuid,
    pub wa_number: String,
    pub instance: String,
    pub kind: StepKind,
    /// Order within a sequence; ties on `due_at` dispatch by `seq`.
    pub seq: u32,
    pub due_at: DateTime<Utc>,
    pub payload: StepPayload,
}

/// Schedules and drains delayed steps.
pub struct DelayedQueue {
    store: Arc<dyn Store>,
    outbound: Arc<dyn Outbound>,
    backend: Arc<dyn FaqBackend>,
    config: FunnelConfig,
}

impl DelayedQueue {
    pub fn new(
        store: Arc<dyn Store>,
        outbound: Arc<dyn Outbound>,
        backend: Arc<dyn FaqBackend>,
        config: FunnelConfig,
    ) -> Self {
        Self {
            store,
            outbound,
            backend,
            config,
        }
    }

    /// Queue the welcome drip for a new contact.
    pub async fn schedule_welcome(&self, contact: &Contact, now: DateTime<Utc>) -> Result<()> {
        let payloads = [
            StepPayload::Text {
                text: texts::WELCOME_STEP_1.to_string(),
            },
            StepPayload::Text {
                text: texts::WELCOME_STEP_2.to_string(),
            },
            StepPayload::Audio {
                asset: texts::WELCOME_AUDIO_ASSET.to_string(),
            },
            StepPayload::Text {
                text: texts::WELCOME_STEP_4.to_string(),
            },
        ];

        let steps: Vec<ScheduledStep> = payloads
            .into_iter()
            .zip(self.config.step_offsets.iter())
            .enumerate()
            .map(|(i, (payload, offset))| ScheduledStep {
                id: Uuid::new_v4(),
                wa_number: contact.wa_number.clone(),
                instance: contact.instance.clone(),
                kind: StepKind::Welcome,
                seq: i as u32 + 1,
                due_at: now + chrono::Duration::seconds(offset.as_secs() as i64),
                payload,
            })
            .collect();

        self.store.insert_steps(&steps).await?;
        debug!(number = %contact.wa_number, steps = steps.len(), "Welcome sequence scheduled");
        Ok(())
    }

    /// Cancel undelivered welcome steps, e.g. when the contact engages
    /// before the drip finishes.
    pub async fn cancel_welcome(&self, wa_number: &str) -> Result<usize> {
        let removed = self
            .store
            .delete_steps_for_contact(wa_number, StepKind::Welcome)
            .await?;
        if removed > 0 {
            debug!(number = wa_number, removed, "Welcome steps cancelled");
        }
        Ok(removed)
    }

    /// Schedule the automatic release of a paused conversation.
    /// Re-scheduling replaces any earlier resume row.
    pub async fn schedule_resume(&self, contact: &Contact, now: DateTime<Utc>) -> Result<()> {
        self.store
            .delete_steps_for_contact(&contact.wa_number, StepKind::Resume)
            .await?;

        let step = ScheduledStep {
            id: Uuid::new_v4(),
            wa_number: contact.wa_number.clone(),
            instance: contact.instance.clone(),
            kind: StepKind::Resume,
            seq: 1,
            due_at: now
                + chrono::Duration::seconds(self.config.handoff_resume_after.as_secs() as i64),
            payload: StepPayload::Resume,
        };
        self.store.insert_steps(&[step]).await?;
        debug!(number = %contact.wa_number, "Handoff resume scheduled");
        Ok(())
    }

    /// Drop a pending resume row, used when the operator releases early.
    pub async fn cancel_resume(&self, wa_number: &str) -> Result<usize> {
        self.store
            .delete_steps_for_contact(wa_number, StepKind::Resume)
            .await
            .map_err(Into::into)
    }

    /// Process everything due at `now`, oldest first. Returns the number
    /// of rows consumed.
    pub async fn drain_once(&self, now: DateTime<Utc>) -> usize {
        let due = match self.store.due_steps(now, self.config.drain_batch).await {
            Ok(steps) => steps,
            Err(e) => {
                error!("Failed to load due steps: {e}");
                return 0;
            }
        };

        let mut processed = 0;
        for step in due {
            if let Err(e) = self.dispatch(&step).await {
                warn!(step = %step.id, number = %step.wa_number, "Step dispatch failed: {e}");
            }
            if let Err(e) = self.store.delete_step(step.id).await {
                error!(step = %step.id, "Failed to delete consumed step: {e}");
            }
            processed += 1;
        }
        processed
    }

    async fn dispatch(&self, step: &ScheduledStep) -> Result<()> {
        match &step.payload {
            StepPayload::Text { text } => {
                self.outbound
                    .send_text(&step.instance, &step.wa_number, text)
                    .await?;
            }
            StepPayload::Audio { asset } => {
                match self.backend.signed_media_url(asset).await? {
                    Some(url) => {
                        self.outbound
                            .send_audio(&step.instance, &step.wa_number, &url)
                            .await?;
                    }
                    None => {
                        warn!(asset, "Audio asset has no signed URL, skipping step");
                    }
                }
            }
            StepPayload::Resume => {
                self.resume_contact(&step.wa_number).await?;
            }
        }
        Ok(())
    }

    /// Hand a paused conversation back to the bot, silently. No-op when
    /// the operator already released it.
    async fn resume_contact(&self, wa_number: &str) -> Result<()> {
        let Some(contact) = self.store.find_contact(wa_number).await? else {
            warn!(number = wa_number, "Resume step for unknown contact");
            return Ok(());
        };
        if !contact.stage.is_paused() && !contact.wants_human {
            return Ok(());
        }
        self.store
            .apply_commands(
                wa_number,
                &[
                    StateCommand::SetHandoffFlag(false),
                    StateCommand::SetStage(ConversationStage::AwaitingChoice),
                ],
            )
            .await?;
        debug!(number = wa_number, "Paused conversation resumed");
        Ok(())
    }
}

/// Background poller that drains the queue on an interval.
pub fn spawn_poller(
    queue: Arc<DelayedQueue>,
    every: std::time::Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            let processed = queue.drain_once(Utc::now()).await;
            if processed > 0 {
                debug!(processed, "Queue drain pass complete");
            }
        }
    })
}
