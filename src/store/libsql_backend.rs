//! libSQL backend — async `Store` trait implementation.
//!
//! Supports local file and in-memory databases. A single connection is
//! reused for all operations; `libsql::Connection` is `Send + Sync` and
//! safe for concurrent async use.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::engine::contact::{Contact, ConversationStage, DocStage, SimulatorState, StateCommand};
use crate::error::StoreError;
use crate::queue::{ScheduledStep, StepKind, StepPayload};
use crate::store::migrations;
use crate::store::traits::{FaqEntry, NewContact, Store};

/// libSQL store backend.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| StoreError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| StoreError::Pool(format!("Failed to create connection: {e}")))?;

        migrations::run_migrations(&conn).await?;
        info!(path = %path.display(), "Database opened");
        Ok(Self {
            db: Arc::new(db),
            conn,
        })
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, StoreError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| StoreError::Pool(format!("Failed to create in-memory database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| StoreError::Pool(format!("Failed to create connection: {e}")))?;

        migrations::run_migrations(&conn).await?;
        Ok(Self {
            db: Arc::new(db),
            conn,
        })
    }

    /// Get the connection.
    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    // Try RFC 3339 first (our canonical write format)
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    // Try SQLite datetime() output with fractional seconds
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    // Try SQLite datetime() output without fractional seconds
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

/// Parse a stage string from the DB.
fn str_to_stage(s: &str) -> ConversationStage {
    match s {
        "welcome_sequence" => ConversationStage::WelcomeSequence,
        "answering_questions" => ConversationStage::AnsweringQuestions,
        "document_collection" => ConversationStage::DocumentCollection,
        "with_human" => ConversationStage::WithHuman,
        _ => ConversationStage::AwaitingChoice,
    }
}

fn str_to_doc_stage(s: &str) -> Option<DocStage> {
    match s {
        "awaiting_docs" => Some(DocStage::AwaitingDocs),
        "docs_received" => Some(DocStage::DocsReceived),
        _ => None,
    }
}

fn str_to_kind(s: &str) -> StepKind {
    match s {
        "resume" => StepKind::Resume,
        _ => StepKind::Welcome,
    }
}

/// Convert `Option<&str>` to libsql Value.
fn opt_text(s: Option<&str>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s.to_string()),
        None => libsql::Value::Null,
    }
}

/// Convert `Option<String>` to libsql Value.
fn opt_text_owned(s: Option<String>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s),
        None => libsql::Value::Null,
    }
}

const CONTACT_COLUMNS: &str =
    "id, wa_number, first_name, instance, stage, doc_stage, wants_human, sim_state, \
     created_at, updated_at";

/// Map a libsql Row to a Contact.
///
/// Column order matches CONTACT_COLUMNS:
/// 0:id, 1:wa_number, 2:first_name, 3:instance, 4:stage, 5:doc_stage,
/// 6:wants_human, 7:sim_state, 8:created_at, 9:updated_at
fn row_to_contact(row: &libsql::Row) -> Result<Contact, libsql::Error> {
    let stage_str: String = row.get(4)?;
    let doc_stage_str: Option<String> = row.get(5).ok();
    let sim_str: Option<String> = row.get(7).ok();
    let created_str: String = row.get(8)?;
    let updated_str: String = row.get(9)?;

    let simulator: Option<SimulatorState> = sim_str
        .filter(|s| !s.is_empty())
        .and_then(|s| match serde_json::from_str(&s) {
            Ok(state) => Some(state),
            Err(e) => {
                warn!("Discarding unreadable simulator state: {e}");
                None
            }
        });

    Ok(Contact {
        id: row.get(0)?,
        wa_number: row.get(1)?,
        first_name: row.get(2).ok(),
        instance: row.get(3)?,
        stage: str_to_stage(&stage_str),
        doc_stage: doc_stage_str.as_deref().and_then(str_to_doc_stage),
        wants_human: row.get::<i64>(6).unwrap_or(0) != 0,
        simulator,
        created_at: parse_datetime(&created_str),
        updated_at: parse_datetime(&updated_str),
    })
}

/// Map a libsql Row to a FaqEntry. An unreadable embedding is dropped so
/// the matcher can lazily rebuild it.
fn row_to_faq_entry(row: &libsql::Row) -> Result<FaqEntry, libsql::Error> {
    let embedding_str: Option<String> = row.get(3).ok();
    let embedding: Option<Vec<f32>> = embedding_str
        .filter(|s| !s.is_empty())
        .and_then(|s| match serde_json::from_str(&s) {
            Ok(vector) => Some(vector),
            Err(e) => {
                warn!("Discarding unreadable embedding: {e}");
                None
            }
        });

    Ok(FaqEntry {
        id: row.get(0)?,
        question: row.get(1)?,
        pending: row.get::<i64>(2)? != 0,
        embedding,
    })
}

const STEP_COLUMNS: &str = "id, wa_number, instance, kind, seq, due_at, payload";

/// Map a libsql Row to a ScheduledStep.
///
/// Column order matches STEP_COLUMNS:
/// 0:id, 1:wa_number, 2:instance, 3:kind, 4:seq, 5:due_at, 6:payload
fn row_to_step(row: &libsql::Row) -> Result<ScheduledStep, StoreError> {
    let id_str: String = row
        .get(0)
        .map_err(|e| StoreError::Query(format!("step.id: {e}")))?;
    let id = Uuid::parse_str(&id_str)
        .map_err(|e| StoreError::Query(format!("step.id parse: {e}")))?;

    let kind_str: String = row
        .get(3)
        .map_err(|e| StoreError::Query(format!("step.kind: {e}")))?;
    let seq: i64 = row
        .get(4)
        .map_err(|e| StoreError::Query(format!("step.seq: {e}")))?;
    let due_str: String = row
        .get(5)
        .map_err(|e| StoreError::Query(format!("step.due_at: {e}")))?;
    let payload_str: String = row
        .get(6)
        .map_err(|e| StoreError::Query(format!("step.payload: {e}")))?;
    let payload: StepPayload = serde_json::from_str(&payload_str)
        .map_err(|e| StoreError::Serialization(format!("step payload: {e}")))?;

    Ok(ScheduledStep {
        id,
        wa_number: row
            .get(1)
            .map_err(|e| StoreError::Query(format!("step.wa_number: {e}")))?,
        instance: row
            .get(2)
            .map_err(|e| StoreError::Query(format!("step.instance: {e}")))?,
        kind: str_to_kind(&kind_str),
        seq: seq as u32,
        due_at: parse_datetime(&due_str),
        payload,
    })
}

// ── Trait implementation ────────────────────────────────────────────

#[async_trait]
impl Store for LibSqlBackend {
    // ── Contacts ────────────────────────────────────────────────────

    async fn find_contact(&self, wa_number: &str) -> Result<Option<Contact>, StoreError> {
        let conn = self.conn();
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {CONTACT_COLUMNS} FROM contacts WHERE wa_number = ?1 \
                     ORDER BY id DESC LIMIT 1"
                ),
                params![wa_number],
            )
            .await
            .map_err(|e| StoreError::Query(format!("find_contact: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let contact = row_to_contact(&row)
                    .map_err(|e| StoreError::Query(format!("find_contact row parse: {e}")))?;
                Ok(Some(contact))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(StoreError::Query(format!("find_contact: {e}"))),
        }
    }

    async fn find_contact_by_id(&self, id: i64) -> Result<Option<Contact>, StoreError> {
        let conn = self.conn();
        let mut rows = conn
            .query(
                &format!("SELECT {CONTACT_COLUMNS} FROM contacts WHERE id = ?1"),
                params![id],
            )
            .await
            .map_err(|e| StoreError::Query(format!("find_contact_by_id: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let contact = row_to_contact(&row).map_err(|e| {
                    StoreError::Query(format!("find_contact_by_id row parse: {e}"))
                })?;
                Ok(Some(contact))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(StoreError::Query(format!("find_contact_by_id: {e}"))),
        }
    }

    async fn create_contact(&self, new: &NewContact) -> Result<Contact, StoreError> {
        let conn = self.conn();
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO contacts (wa_number, first_name, instance, stage, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                new.wa_number.clone(),
                opt_text(new.first_name.as_deref()),
                new.instance.clone(),
                new.stage.to_string(),
                now.clone(),
                now,
            ],
        )
        .await
        .map_err(|e| StoreError::Query(format!("create_contact: {e}")))?;

        debug!(number = %new.wa_number, stage = %new.stage, "Contact created");

        self.find_contact(&new.wa_number)
            .await?
            .ok_or_else(|| StoreError::NotFound {
                entity: "contact".to_string(),
                key: new.wa_number.clone(),
            })
    }

    async fn apply_commands(
        &self,
        wa_number: &str,
        commands: &[StateCommand],
    ) -> Result<(), StoreError> {
        let conn = self.conn();
        let now = Utc::now().to_rfc3339();

        // Each command updates one column on the contact's newest row.
        for command in commands {
            let (sql, value) = match command {
                StateCommand::SetStage(stage) => (
                    "UPDATE contacts SET stage = ?1, updated_at = ?3 WHERE id = \
                     (SELECT id FROM contacts WHERE wa_number = ?2 ORDER BY id DESC LIMIT 1)",
                    libsql::Value::Text(stage.to_string()),
                ),
                StateCommand::SetDocStage(doc_stage) => (
                    "UPDATE contacts SET doc_stage = ?1, updated_at = ?3 WHERE id = \
                     (SELECT id FROM contacts WHERE wa_number = ?2 ORDER BY id DESC LIMIT 1)",
                    opt_text_owned(doc_stage.map(|d| d.to_string())),
                ),
                StateCommand::SetHandoffFlag(flag) => (
                    "UPDATE contacts SET wants_human = ?1, updated_at = ?3 WHERE id = \
                     (SELECT id FROM contacts WHERE wa_number = ?2 ORDER BY id DESC LIMIT 1)",
                    libsql::Value::Integer(i64::from(*flag)),
                ),
                StateCommand::SetSimulator(simulator) => {
                    let json = match simulator {
                        Some(state) => Some(serde_json::to_string(state).map_err(|e| {
                            StoreError::Serialization(format!("simulator state: {e}"))
                        })?),
                        None => None,
                    };
                    (
                        "UPDATE contacts SET sim_state = ?1, updated_at = ?3 WHERE id = \
                         (SELECT id FROM contacts WHERE wa_number = ?2 ORDER BY id DESC LIMIT 1)",
                        opt_text_owned(json),
                    )
                }
            };

            conn.execute(sql, params![value, wa_number, now.clone()])
                .await
                .map_err(|e| StoreError::Query(format!("apply_commands: {e}")))?;
        }
        Ok(())
    }

    // ── FAQ mirror ──────────────────────────────────────────────────

    async fn upsert_faq_entry(
        &self,
        id: i64,
        question: &str,
        pending: bool,
    ) -> Result<(), StoreError> {
        let conn = self.conn();
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO faq_entries (id, question, pending, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?4) \
             ON CONFLICT(id) DO UPDATE SET \
                question = excluded.question, \
                pending = excluded.pending, \
                updated_at = excluded.updated_at",
            params![id, question, i64::from(pending), now],
        )
        .await
        .map_err(|e| StoreError::Query(format!("upsert_faq_entry: {e}")))?;

        debug!(entry = id, pending, "FAQ entry upserted");
        Ok(())
    }

    async fn faq_entries(&self, pending: bool) -> Result<Vec<FaqEntry>, StoreError> {
        let conn = self.conn();
        let mut rows = conn
            .query(
                "SELECT id, question, pending, embedding FROM faq_entries \
                 WHERE pending = ?1 ORDER BY id ASC",
                params![i64::from(pending)],
            )
            .await
            .map_err(|e| StoreError::Query(format!("faq_entries: {e}")))?;

        let mut entries = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            match row_to_faq_entry(&row) {
                Ok(entry) => entries.push(entry),
                Err(e) => warn!("Skipping unreadable FAQ row: {e}"),
            }
        }
        Ok(entries)
    }

    async fn save_faq_embedding(&self, id: i64, embedding: &[f32]) -> Result<(), StoreError> {
        let conn = self.conn();
        let json = serde_json::to_string(embedding)
            .map_err(|e| StoreError::Serialization(format!("embedding: {e}")))?;
        conn.execute(
            "UPDATE faq_entries SET embedding = ?1, updated_at = ?2 WHERE id = ?3",
            params![json, Utc::now().to_rfc3339(), id],
        )
        .await
        .map_err(|e| StoreError::Query(format!("save_faq_embedding: {e}")))?;
        Ok(())
    }

    // ── Delayed steps ───────────────────────────────────────────────

    async fn insert_steps(&self, steps: &[ScheduledStep]) -> Result<(), StoreError> {
        let conn = self.conn();
        let now = Utc::now().to_rfc3339();

        for step in steps {
            let payload = serde_json::to_string(&step.payload)
                .map_err(|e| StoreError::Serialization(format!("step payload: {e}")))?;
            conn.execute(
                "INSERT INTO scheduled_steps \
                 (id, wa_number, instance, kind, seq, due_at, payload, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    step.id.to_string(),
                    step.wa_number.clone(),
                    step.instance.clone(),
                    step.kind.to_string(),
                    step.seq as i64,
                    step.due_at.to_rfc3339(),
                    payload,
                    now.clone(),
                ],
            )
            .await
            .map_err(|e| StoreError::Query(format!("insert_steps: {e}")))?;
        }
        Ok(())
    }

    async fn due_steps(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<ScheduledStep>, StoreError> {
        let conn = self.conn();
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {STEP_COLUMNS} FROM scheduled_steps WHERE due_at <= ?1 \
                     ORDER BY due_at ASC, seq ASC LIMIT ?2"
                ),
                params![now.to_rfc3339(), limit as i64],
            )
            .await
            .map_err(|e| StoreError::Query(format!("due_steps: {e}")))?;

        let mut steps = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            match row_to_step(&row) {
                Ok(step) => steps.push(step),
                Err(e) => warn!("Skipping unreadable step row: {e}"),
            }
        }
        Ok(steps)
    }

    async fn delete_step(&self, id: Uuid) -> Result<(), StoreError> {
        let conn = self.conn();
        conn.execute(
            "DELETE FROM scheduled_steps WHERE id = ?1",
            params![id.to_string()],
        )
        .await
        .map_err(|e| StoreError::Query(format!("delete_step: {e}")))?;
        Ok(())
    }

    async fn delete_steps_for_contact(
        &self,
        wa_number: &str,
        kind: StepKind,
    ) -> Result<usize, StoreError> {
        let conn = self.conn();
        let affected = conn
            .execute(
                "DELETE FROM scheduled_steps WHERE wa_number = ?1 AND kind = ?2",
                params![wa_number, kind.to_string()],
            )
            .await
            .map_err(|e| StoreError::Query(format!("delete_steps_for_contact: {e}")))?;
        Ok(affected as usize)
    }
}
