//! Semantic FAQ matching and pending-question dedup.
//!
//! Questions are normalized, embedded, and compared against the local FAQ
//! mirror by cosine similarity. Answered entries are matched against
//! `match_threshold`; when nothing clears it, pending entries are checked
//! against the stricter `duplicate_threshold` so the triage inbox does not
//! fill with rephrasings of the same question.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::backend::FaqBackend;
use crate::engine::contact::Contact;
use crate::engine::texts;
use crate::error::Result;
use crate::llm::LanguageModel;
use crate::normalize::collapse_whitespace;
use crate::similarity::cosine_similarity;
use crate::store::{FaqEntry, Store};

/// What the matcher decided for one question.
#[derive(Debug, Clone, PartialEq)]
pub enum FaqOutcome {
    /// An answered entry matched; `reply` is ready to send.
    Answered {
        entry_id: i64,
        question: String,
        reply: String,
    },
    /// No match; the question was registered for human triage.
    PendingCreated,
    /// The question duplicates an entry already awaiting triage.
    DuplicatePending,
    /// The model is configured but failed; the contact should retry.
    Unavailable,
}

pub struct FaqMatcher {
    store: Arc<dyn Store>,
    backend: Arc<dyn FaqBackend>,
    model: Arc<dyn LanguageModel>,
    match_threshold: f32,
    duplicate_threshold: f32,
}

impl FaqMatcher {
    pub fn new(
        store: Arc<dyn Store>,
        backend: Arc<dyn FaqBackend>,
        model: Arc<dyn LanguageModel>,
        match_threshold: f32,
        duplicate_threshold: f32,
    ) -> Self {
        Self {
            store,
            backend,
            model,
            match_threshold,
            duplicate_threshold,
        }
    }

    /// Run the full pipeline for one question.
    pub async fn match_question(&self, contact: &Contact, raw: &str) -> Result<FaqOutcome> {
        let question = self.normalize_question(raw).await;

        let answered = self.store.faq_entries(false).await?;
        if answered.is_empty() || !self.model.is_enabled() {
            return self.escalate(contact, &question, None).await;
        }

        let Some(question_vector) = self.model.embed(&question).await else {
            return Ok(FaqOutcome::Unavailable);
        };

        if let Some((entry, score)) = self.best_match(&answered, &question_vector).await {
            if score >= self.match_threshold {
                debug!(entry = entry.id, score, "FAQ match");
                match self.backend.fetch_content(entry.id).await {
                    Ok(Some(content)) if !content.answers.is_empty() => {
                        let backend = self.backend.clone();
                        let entry_id = entry.id;
                        tokio::spawn(async move {
                            if let Err(e) = backend.increment_usage(entry_id).await {
                                warn!(entry = entry_id, "Failed to bump FAQ usage: {e}");
                            }
                        });
                        return Ok(FaqOutcome::Answered {
                            entry_id: entry.id,
                            question: content.question,
                            reply: texts::format_answer(&content.answers),
                        });
                    }
                    Ok(_) => {
                        warn!(entry = entry.id, "Matched FAQ entry has no content upstream");
                    }
                    Err(e) => {
                        warn!(entry = entry.id, "Failed to fetch FAQ content: {e}");
                    }
                }
            }
        }

        let pending = self.store.faq_entries(true).await?;
        if let Some((entry, score)) = self.best_match(&pending, &question_vector).await {
            if score >= self.duplicate_threshold {
                debug!(entry = entry.id, score, "Question duplicates a pending entry");
                return Ok(FaqOutcome::DuplicatePending);
            }
        }

        self.escalate(contact, &question, Some(question_vector)).await
    }

    /// Collapse whitespace and, when the model is available, rewrite the
    /// raw text into a standalone question. A failed or empty rewrite
    /// falls back to the collapsed original.
    async fn normalize_question(&self, raw: &str) -> String {
        let collapsed = collapse_whitespace(raw);
        if let Some(rewritten) = self.model.rewrite(&collapsed).await {
            let rewritten = collapse_whitespace(&rewritten);
            if !rewritten.is_empty() {
                return rewritten;
            }
        }
        collapsed
    }

    /// Highest-scoring entry. Entries without a stored embedding are
    /// embedded on the spot and persisted, so the mirror heals itself.
    /// Ties keep the first (lowest-id) entry.
    async fn best_match<'a>(
        &self,
        entries: &'a [FaqEntry],
        question_vector: &[f32],
    ) -> Option<(&'a FaqEntry, f32)> {
        let mut best: Option<(&FaqEntry, f32)> = None;
        for entry in entries {
            let vector = match &entry.embedding {
                Some(vector) => vector.clone(),
                None => match self.model.embed(&entry.question).await {
                    Some(vector) => {
                        if let Err(e) = self.store.save_faq_embedding(entry.id, &vector).await {
                            warn!(entry = entry.id, "Failed to persist backfilled embedding: {e}");
                        }
                        vector
                    }
                    None => continue,
                },
            };

            let score = cosine_similarity(question_vector, &vector);
            let better = match &best {
                None => true,
                Some((_, best_score)) => score > *best_score,
            };
            if better {
                best = Some((entry, score));
            }
        }
        best
    }

    /// Register the question for human triage and mirror it locally as a
    /// pending entry.
    async fn escalate(
        &self,
        contact: &Contact,
        question: &str,
        question_vector: Option<Vec<f32>>,
    ) -> Result<FaqOutcome> {
        let entry_id = self
            .backend
            .create_pending(&contact.wa_number, contact.id, question)
            .await?;

        if let Err(e) = self.store.upsert_faq_entry(entry_id, question, true).await {
            warn!(entry = entry_id, "Failed to mirror pending entry: {e}");
        }

        // Persist the embedding off the hot path; a missed write heals on
        // the next lookup.
        let store = self.store.clone();
        let model = self.model.clone();
        let question = question.to_string();
        tokio::spawn(async move {
            let vector = match question_vector {
                Some(vector) => Some(vector),
                None => model.embed(&question).await,
            };
            if let Some(vector) = vector {
                if let Err(e) = store.save_faq_embedding(entry_id, &vector).await {
                    warn!(entry = entry_id, "Failed to persist pending embedding: {e}");
                }
            }
        });

        debug!(entry = entry_id, "Pending question registered");
        Ok(FaqOutcome::PendingCreated)
    }
}
