//! Unified `Store` trait — single async interface for all persistence.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::engine::contact::{Contact, ConversationStage, StateCommand};
use crate::error::StoreError;
use crate::queue::{ScheduledStep, StepKind};

/// Locally mirrored FAQ entry. Canonical content lives in the companion
/// app; this row carries only what the matcher needs.
#[derive(Debug, Clone)]
pub struct FaqEntry {
    pub id: i64,
    pub question: String,
    /// Pending entries await a human answer and participate only in
    /// duplicate detection, never in matching.
    pub pending: bool,
    pub embedding: Option<Vec<f32>>,
}

/// Fields required to create a contact.
#[derive(Debug, Clone)]
pub struct NewContact {
    pub wa_number: String,
    pub first_name: Option<String>,
    pub instance: String,
    pub stage: ConversationStage,
}

/// Backend-agnostic store covering contacts, the FAQ mirror, and the
/// delayed-step queue. Implementations migrate their schema at
/// construction time.
#[async_trait]
pub trait Store: Send + Sync {
    // ── Contacts ────────────────────────────────────────────────────

    /// Look up a contact by number. When duplicate rows exist the most
    /// recent one wins.
    async fn find_contact(&self, wa_number: &str) -> Result<Option<Contact>, StoreError>;

    /// Look up a contact by row id.
    async fn find_contact_by_id(&self, id: i64) -> Result<Option<Contact>, StoreError>;

    /// Insert a new contact and return the stored row.
    async fn create_contact(&self, new: &NewContact) -> Result<Contact, StoreError>;

    /// Apply a batch of state commands to the contact's current row.
    async fn apply_commands(
        &self,
        wa_number: &str,
        commands: &[StateCommand],
    ) -> Result<(), StoreError>;

    // ── FAQ mirror ──────────────────────────────────────────────────

    /// Insert or update an entry's question text and pending flag. Any
    /// stored embedding is kept; callers refresh it separately.
    async fn upsert_faq_entry(
        &self,
        id: i64,
        question: &str,
        pending: bool,
    ) -> Result<(), StoreError>;

    /// All entries with the given pending flag, ascending by id.
    async fn faq_entries(&self, pending: bool) -> Result<Vec<FaqEntry>, StoreError>;

    /// Persist an entry's embedding vector.
    async fn save_faq_embedding(&self, id: i64, embedding: &[f32]) -> Result<(), StoreError>;

    // ── Delayed steps ───────────────────────────────────────────────

    /// Insert scheduled steps.
    async fn insert_steps(&self, steps: &[ScheduledStep]) -> Result<(), StoreError>;

    /// Steps due at or before `now`, oldest first, capped at `limit`.
    async fn due_steps(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<ScheduledStep>, StoreError>;

    /// Delete a single step by id.
    async fn delete_step(&self, id: Uuid) -> Result<(), StoreError>;

    /// Delete every step of `kind` for a contact. Returns rows removed.
    async fn delete_steps_for_contact(
        &self,
        wa_number: &str,
        kind: StepKind,
    ) -> Result<usize, StoreError>;
}
