//! End-to-end funnel tests.
//!
//! Each test wires the real engine, store (in-memory libsql), queue and
//! buffer, with the WhatsApp gateway, companion app, and language model
//! stubbed. Events enter through `Engine::handle_event`, exactly as the
//! webhook dispatches them.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::{Duration as ChronoDuration, Utc};
use secrecy::SecretString;
use tokio::sync::Mutex;
use tower::ServiceExt;

use lead_assist::backend::{FaqBackend, FaqContent};
use lead_assist::buffer::QuestionBuffer;
use lead_assist::config::FunnelConfig;
use lead_assist::engine::contact::{ConversationStage, DocStage};
use lead_assist::engine::session::SessionStore;
use lead_assist::engine::{texts, Engine, InboundEvent};
use lead_assist::error::{BackendError, GatewayError};
use lead_assist::faq::FaqMatcher;
use lead_assist::gateway::Outbound;
use lead_assist::llm::LanguageModel;
use lead_assist::queue::{DelayedQueue, StepKind};
use lead_assist::store::{LibSqlBackend, Store};
use lead_assist::webhook::{self, AppState};

const JID: &str = "351911222333@s.whatsapp.net";
const NUMBER: &str = "351911222333";
const ADMIN: &str = "351900000000";

/// Records every outbound call instead of hitting Evolution.
#[derive(Default)]
struct RecordingOutbound {
    sent: Mutex<Vec<(String, String)>>,
}

impl RecordingOutbound {
    /// All (number, text) pairs sent so far, audio rendered as a marker.
    async fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().await.clone()
    }

    async fn last_text(&self) -> String {
        self.sent
            .lock()
            .await
            .last()
            .map(|(_, text)| text.clone())
            .expect("nothing was sent")
    }
}

#[async_trait]
impl Outbound for RecordingOutbound {
    async fn send_text(
        &self,
        _instance: &str,
        number: &str,
        text: &str,
    ) -> Result<(), GatewayError> {
        self.sent
            .lock()
            .await
            .push((number.to_string(), text.to_string()));
        Ok(())
    }

    async fn send_audio(
        &self,
        _instance: &str,
        number: &str,
        audio_url: &str,
    ) -> Result<(), GatewayError> {
        self.sent
            .lock()
            .await
            .push((number.to_string(), format!("[audio] {audio_url}")));
        Ok(())
    }

    async fn send_presence(&self, _instance: &str, _number: &str) -> Result<(), GatewayError> {
        Ok(())
    }
}

/// Deterministic model: embeddings come from a fixed table keyed by the
/// exact normalized question text.
struct StubModel {
    enabled: bool,
    vectors: HashMap<String, Vec<f32>>,
}

impl StubModel {
    fn disabled() -> Arc<Self> {
        Arc::new(Self {
            enabled: false,
            vectors: HashMap::new(),
        })
    }

    fn with_vectors(pairs: &[(&str, &[f32])]) -> Arc<Self> {
        Arc::new(Self {
            enabled: true,
            vectors: pairs
                .iter()
                .map(|(key, vector)| (key.to_string(), vector.to_vec()))
                .collect(),
        })
    }
}

#[async_trait]
impl LanguageModel for StubModel {
    fn is_enabled(&self) -> bool {
        self.enabled
    }

    async fn embed(&self, text: &str) -> Option<Vec<f32>> {
        self.vectors.get(text).cloned()
    }

    async fn rewrite(&self, _text: &str) -> Option<String> {
        None
    }
}

/// In-memory companion app.
struct StubBackend {
    next_id: AtomicI64,
    created: Mutex<Vec<(String, i64, String)>>,
    content: HashMap<i64, FaqContent>,
    media: HashMap<String, String>,
}

impl StubBackend {
    fn new() -> Arc<Self> {
        Self::build(HashMap::new(), HashMap::new())
    }

    fn with_content(entries: Vec<(i64, FaqContent)>) -> Arc<Self> {
        Self::build(entries.into_iter().collect(), HashMap::new())
    }

    fn with_media(asset: &str, url: &str) -> Arc<Self> {
        Self::build(
            HashMap::new(),
            [(asset.to_string(), url.to_string())].into_iter().collect(),
        )
    }

    fn build(content: HashMap<i64, FaqContent>, media: HashMap<String, String>) -> Arc<Self> {
        Arc::new(Self {
            next_id: AtomicI64::new(100),
            created: Mutex::new(Vec::new()),
            content,
            media,
        })
    }

    async fn created(&self) -> Vec<(String, i64, String)> {
        self.created.lock().await.clone()
    }
}

#[async_trait]
impl FaqBackend for StubBackend {
    async fn fetch_content(&self, entry_id: i64) -> Result<Option<FaqContent>, BackendError> {
        Ok(self.content.get(&entry_id).cloned())
    }

    async fn increment_usage(&self, _entry_id: i64) -> Result<(), BackendError> {
        Ok(())
    }

    async fn create_pending(
        &self,
        contact: &str,
        lead_id: i64,
        text: &str,
    ) -> Result<i64, BackendError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.created
            .lock()
            .await
            .push((contact.to_string(), lead_id, text.to_string()));
        Ok(id)
    }

    async fn signed_media_url(&self, asset: &str) -> Result<Option<String>, BackendError> {
        Ok(self.media.get(asset).cloned())
    }
}

// ── Harness ──────────────────────────────────────────────────────────

struct Rig {
    engine: Arc<Engine>,
    store: Arc<dyn Store>,
    outbound: Arc<RecordingOutbound>,
    backend: Arc<StubBackend>,
    queue: Arc<DelayedQueue>,
}

fn test_config() -> FunnelConfig {
    FunnelConfig {
        admin_number: Some(ADMIN.to_string()),
        ..FunnelConfig::default()
    }
}

async fn rig() -> Rig {
    rig_with(test_config(), StubModel::disabled(), StubBackend::new()).await
}

/// Wire everything the way `main` does, with the stubs swapped in.
async fn rig_with(
    config: FunnelConfig,
    model: Arc<StubModel>,
    backend: Arc<StubBackend>,
) -> Rig {
    let store: Arc<dyn Store> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
    let outbound = Arc::new(RecordingOutbound::default());
    let out: Arc<dyn Outbound> = outbound.clone();
    let model_dyn: Arc<dyn LanguageModel> = model;
    let faq_backend: Arc<dyn FaqBackend> = backend.clone();

    let buffer = QuestionBuffer::new(Arc::clone(&out), config.buffer_reminder);
    let queue = Arc::new(DelayedQueue::new(
        Arc::clone(&store),
        Arc::clone(&out),
        Arc::clone(&faq_backend),
        config.clone(),
    ));
    let sessions = SessionStore::new(config.session_idle_timeout);
    let matcher = FaqMatcher::new(
        Arc::clone(&store),
        Arc::clone(&faq_backend),
        Arc::clone(&model_dyn),
        config.match_threshold,
        config.duplicate_threshold,
    );
    let engine = Arc::new(Engine::new(
        Arc::clone(&store),
        Arc::clone(&out),
        matcher,
        buffer,
        Arc::clone(&queue),
        sessions,
        config,
        "http://uploads.example.com".to_string(),
    ));

    Rig {
        engine,
        store,
        outbound,
        backend,
        queue,
    }
}

fn from_contact(text: &str) -> InboundEvent {
    InboundEvent {
        instance: "main".to_string(),
        jid: JID.to_string(),
        push_name: Some("Maria Silva".to_string()),
        text: text.to_string(),
        from_me: false,
    }
}

fn from_operator(text: &str) -> InboundEvent {
    InboundEvent {
        instance: "main".to_string(),
        jid: JID.to_string(),
        push_name: None,
        text: text.to_string(),
        from_me: true,
    }
}

fn welcome_trigger() -> String {
    FunnelConfig::default().welcome_trigger
}

fn direct_trigger() -> String {
    FunnelConfig::default().direct_trigger
}

/// Give spawned background work (webhook dispatch, usage bumps) a moment.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

// ── Entry triggers ───────────────────────────────────────────────────

#[tokio::test]
async fn welcome_trigger_creates_contact_and_schedules_drip() {
    let rig = rig().await;
    rig.engine
        .handle_event(from_contact(&welcome_trigger()))
        .await;

    let contact = rig
        .store
        .find_contact(NUMBER)
        .await
        .unwrap()
        .expect("contact created");
    assert_eq!(contact.stage, ConversationStage::WelcomeSequence);
    assert_eq!(contact.first_name.as_deref(), Some("Maria"));

    let sent = rig.outbound.sent().await;
    assert_eq!(sent.len(), 1, "only the immediate greeting goes out");
    assert!(sent[0].1.contains("Maria"));

    let due = rig
        .store
        .due_steps(Utc::now() + ChronoDuration::hours(2), 10)
        .await
        .unwrap();
    assert_eq!(due.len(), 4, "four delayed welcome steps queued");
}

#[tokio::test]
async fn unknown_contact_free_text_is_dropped() {
    let rig = rig().await;
    rig.engine
        .handle_event(from_contact("olá, têm simulações?"))
        .await;

    assert!(rig.store.find_contact(NUMBER).await.unwrap().is_none());
    assert!(rig.outbound.sent().await.is_empty());
}

#[tokio::test]
async fn direct_trigger_lands_on_the_menu() {
    let rig = rig().await;
    rig.engine
        .handle_event(from_contact(&direct_trigger()))
        .await;

    let contact = rig.store.find_contact(NUMBER).await.unwrap().unwrap();
    assert_eq!(contact.stage, ConversationStage::AwaitingChoice);

    let menu = rig.outbound.last_text().await;
    assert!(menu.contains("GESTORA"));
    assert!(menu.contains("Maria"));
}

#[tokio::test]
async fn unrecognized_text_at_menu_repeats_the_menu() {
    let rig = rig().await;
    rig.engine
        .handle_event(from_contact(&direct_trigger()))
        .await;
    rig.engine.handle_event(from_contact("hmm não sei")).await;

    let sent = rig.outbound.sent().await;
    assert_eq!(sent.len(), 2);
    assert!(sent[1].1.contains("DÚVIDA"));
}

#[tokio::test]
async fn comecar_skips_the_welcome_drip() {
    let rig = rig().await;
    rig.engine
        .handle_event(from_contact(&welcome_trigger()))
        .await;
    rig.engine.handle_event(from_contact("Começar")).await;

    let contact = rig.store.find_contact(NUMBER).await.unwrap().unwrap();
    assert_eq!(contact.stage, ConversationStage::AwaitingChoice);

    let due = rig
        .store
        .due_steps(Utc::now() + ChronoDuration::hours(2), 10)
        .await
        .unwrap();
    assert!(due.is_empty(), "queued welcome steps are cancelled");
    assert!(rig.outbound.last_text().await.contains("GESTORA"));
}

#[tokio::test]
async fn welcome_drip_delivers_in_order() {
    let backend = StubBackend::with_media(
        texts::WELCOME_AUDIO_ASSET,
        "https://cdn.example.com/welcome.ogg",
    );
    let rig = rig_with(test_config(), StubModel::disabled(), backend).await;
    rig.engine
        .handle_event(from_contact(&welcome_trigger()))
        .await;

    let processed = rig
        .queue
        .drain_once(Utc::now() + ChronoDuration::hours(2))
        .await;
    assert_eq!(processed, 4);

    let sent = rig.outbound.sent().await;
    assert_eq!(sent.len(), 5, "greeting plus four drip steps");
    assert_eq!(sent[1].1, texts::WELCOME_STEP_1);
    assert_eq!(sent[2].1, texts::WELCOME_STEP_2);
    assert_eq!(sent[3].1, "[audio] https://cdn.example.com/welcome.ogg");
    assert_eq!(sent[4].1, texts::WELCOME_STEP_4);
}

// ── Question flow ────────────────────────────────────────────────────

#[tokio::test]
async fn question_fragments_join_and_escalate() {
    let rig = rig().await;
    rig.engine
        .handle_event(from_contact(&direct_trigger()))
        .await;
    rig.engine.handle_event(from_contact("DÚVIDA")).await;

    let contact = rig.store.find_contact(NUMBER).await.unwrap().unwrap();
    assert_eq!(contact.stage, ConversationStage::AnsweringQuestions);
    assert_eq!(rig.outbound.last_text().await, texts::ASK_QUESTION);

    rig.engine.handle_event(from_contact("olá")).await;
    rig.engine.handle_event(from_contact("como funciona")).await;
    rig.engine
        .handle_event(from_contact("isso é possível?"))
        .await;
    settle().await;

    let created = rig.backend.created().await;
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].0, NUMBER);
    assert_eq!(created[0].1, contact.id);
    assert_eq!(created[0].2, "olá como funciona isso é possível?");

    assert_eq!(rig.outbound.last_text().await, texts::PENDING_CREATED);
}

#[tokio::test]
async fn fullwidth_marker_completes_a_question() {
    let rig = rig().await;
    rig.engine
        .handle_event(from_contact(&direct_trigger()))
        .await;
    rig.engine.handle_event(from_contact("DÚVIDA")).await;
    rig.engine
        .handle_event(from_contact("quanto tempo demora o processo？"))
        .await;
    settle().await;

    let created = rig.backend.created().await;
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].2, "quanto tempo demora o processo？");
}

#[tokio::test]
async fn bare_greeting_gets_a_canned_reply() {
    let rig = rig().await;
    rig.engine
        .handle_event(from_contact(&direct_trigger()))
        .await;
    rig.engine.handle_event(from_contact("DÚVIDA")).await;
    rig.engine.handle_event(from_contact("Bom dia?")).await;
    settle().await;

    assert_eq!(rig.outbound.last_text().await, texts::GREETING_RESPONSE);
    assert!(rig.backend.created().await.is_empty());
}

#[tokio::test]
async fn every_third_answer_carries_the_menu_footer() {
    let model = StubModel::with_vectors(&[
        ("posso amortizar 1?", &[1.0, 0.0]),
        ("posso amortizar 2?", &[1.0, 0.0]),
        ("posso amortizar 3?", &[1.0, 0.0]),
    ]);
    let backend = StubBackend::with_content(vec![(
        1,
        FaqContent {
            question: "Posso amortizar o crédito?".to_string(),
            answers: vec!["Sim, pode.".to_string()],
        },
    )]);
    let rig = rig_with(test_config(), model, backend).await;
    rig.store
        .upsert_faq_entry(1, "Posso amortizar o crédito?", false)
        .await
        .unwrap();
    rig.store.save_faq_embedding(1, &[1.0, 0.0]).await.unwrap();

    rig.engine
        .handle_event(from_contact(&direct_trigger()))
        .await;
    rig.engine.handle_event(from_contact("DÚVIDA")).await;
    for n in 1..=3 {
        rig.engine
            .handle_event(from_contact(&format!("posso amortizar {n}?")))
            .await;
    }
    settle().await;

    let sent = rig.outbound.sent().await;
    let answers: Vec<&String> = sent
        .iter()
        .map(|(_, text)| text)
        .filter(|text| text.starts_with("Sim, pode."))
        .collect();
    assert_eq!(answers.len(), 3);
    assert_eq!(answers[0], "Sim, pode.");
    assert_eq!(answers[1], "Sim, pode.");
    assert!(answers[2].ends_with(texts::NAV_FOOTER));
}

#[tokio::test]
async fn question_limit_caps_new_questions() {
    let config = FunnelConfig {
        question_limit: 2,
        ..test_config()
    };
    let rig = rig_with(config, StubModel::disabled(), StubBackend::new()).await;
    rig.engine
        .handle_event(from_contact(&direct_trigger()))
        .await;
    rig.engine.handle_event(from_contact("DÚVIDA")).await;

    rig.engine
        .handle_event(from_contact("primeira pergunta?"))
        .await;
    rig.engine
        .handle_event(from_contact("segunda pergunta?"))
        .await;
    rig.engine
        .handle_event(from_contact("terceira pergunta?"))
        .await;
    settle().await;

    assert_eq!(rig.backend.created().await.len(), 2);
    assert_eq!(rig.outbound.last_text().await, texts::QUESTION_LIMIT_REACHED);
}

// ── Document collection ──────────────────────────────────────────────

#[tokio::test]
async fn gestora_starts_document_collection() {
    let rig = rig().await;
    rig.engine
        .handle_event(from_contact(&direct_trigger()))
        .await;
    rig.engine.handle_event(from_contact("GESTORA")).await;

    let contact = rig.store.find_contact(NUMBER).await.unwrap().unwrap();
    assert_eq!(contact.stage, ConversationStage::DocumentCollection);
    assert_eq!(contact.doc_stage, Some(DocStage::AwaitingDocs));

    let request = rig.outbound.last_text().await;
    assert!(
        request.contains(&format!("http://uploads.example.com/upload/{}", contact.id)),
        "upload link embeds the lead id: {request}"
    );

    // Free text now nudges about the documents.
    rig.engine.handle_event(from_contact("ok vou enviar")).await;
    assert_eq!(rig.outbound.last_text().await, texts::DOCS_REMINDER);
}

// ── Human handoff ────────────────────────────────────────────────────

#[tokio::test]
async fn falar_com_rafa_pauses_and_alerts_admin() {
    let rig = rig().await;
    rig.engine
        .handle_event(from_contact(&direct_trigger()))
        .await;
    rig.engine.handle_event(from_contact("Falar com Rafa")).await;

    let contact = rig.store.find_contact(NUMBER).await.unwrap().unwrap();
    assert_eq!(contact.stage, ConversationStage::WithHuman);
    assert!(contact.wants_human);

    let sent = rig.outbound.sent().await;
    assert!(
        sent.iter().any(|(n, t)| n == NUMBER && t.contains("Rafa")),
        "contact gets an acknowledgement"
    );
    assert!(
        sent.iter()
            .any(|(n, t)| n == ADMIN && t.contains(&format!("https://wa.me/{NUMBER}"))),
        "admin gets a deep link alert"
    );

    let due = rig
        .store
        .due_steps(Utc::now() + ChronoDuration::hours(25), 10)
        .await
        .unwrap();
    assert_eq!(due.len(), 1);
    assert_eq!(due[0].kind, StepKind::Resume);

    // While paused the bot stays silent.
    let before = rig.outbound.sent().await.len();
    rig.engine.handle_event(from_contact("estás aí?")).await;
    assert_eq!(rig.outbound.sent().await.len(), before);
}

#[tokio::test]
async fn operator_boa_sorte_releases_the_contact() {
    let rig = rig().await;
    rig.engine
        .handle_event(from_contact(&direct_trigger()))
        .await;
    rig.engine.handle_event(from_contact("Falar com Rafa")).await;
    rig.engine.handle_event(from_operator("Boa sorte!")).await;

    let contact = rig.store.find_contact(NUMBER).await.unwrap().unwrap();
    assert_eq!(contact.stage, ConversationStage::AwaitingChoice);
    assert!(!contact.wants_human);

    let due = rig
        .store
        .due_steps(Utc::now() + ChronoDuration::hours(25), 10)
        .await
        .unwrap();
    assert!(due.is_empty(), "pending resume row is cancelled");
}

#[tokio::test]
async fn operator_deixa_comigo_pauses_the_bot() {
    let rig = rig().await;
    rig.engine
        .handle_event(from_contact(&direct_trigger()))
        .await;
    rig.engine.handle_event(from_operator("deixa comigo")).await;

    let contact = rig.store.find_contact(NUMBER).await.unwrap().unwrap();
    assert_eq!(contact.stage, ConversationStage::WithHuman);

    let due = rig
        .store
        .due_steps(Utc::now() + ChronoDuration::hours(25), 10)
        .await
        .unwrap();
    assert_eq!(due.len(), 1, "auto-resume is scheduled");
}

// ── Simulator ────────────────────────────────────────────────────────

#[tokio::test]
async fn simulator_walks_to_an_estimate() {
    let rig = rig().await;
    rig.engine
        .handle_event(from_contact(&direct_trigger()))
        .await;
    rig.engine.handle_event(from_contact("SIMULADOR")).await;
    assert_eq!(rig.outbound.last_text().await, texts::SIM_ASK_AGE);

    rig.engine.handle_event(from_contact("35")).await;
    assert_eq!(rig.outbound.last_text().await, texts::SIM_ASK_PROPERTY_VALUE);

    rig.engine.handle_event(from_contact("250.000")).await;
    rig.engine.handle_event(from_contact("30")).await;
    rig.engine.handle_event(from_contact("50.000")).await;

    let result = rig.outbound.last_text().await;
    assert!(result.contains("200000"), "financed amount: {result}");
    assert!(result.contains("843.21"), "monthly payment: {result}");

    let contact = rig.store.find_contact(NUMBER).await.unwrap().unwrap();
    assert!(contact.simulator.is_none(), "wizard cursor cleared");
}

#[tokio::test]
async fn command_escapes_the_simulator() {
    let rig = rig().await;
    rig.engine
        .handle_event(from_contact(&direct_trigger()))
        .await;
    rig.engine.handle_event(from_contact("SIMULADOR")).await;
    rig.engine.handle_event(from_contact("35")).await;
    rig.engine.handle_event(from_contact("DÚVIDA")).await;

    let contact = rig.store.find_contact(NUMBER).await.unwrap().unwrap();
    assert!(contact.simulator.is_none());
    assert_eq!(contact.stage, ConversationStage::AnsweringQuestions);
}

// ── HTTP surface ─────────────────────────────────────────────────────

async fn http_rig() -> (axum::Router, Rig) {
    http_rig_with_secret(Some(SecretString::from("test-secret"))).await
}

async fn http_rig_with_secret(secret: Option<SecretString>) -> (axum::Router, Rig) {
    let rig = rig().await;
    let outbound: Arc<dyn Outbound> = rig.outbound.clone();
    let model: Arc<dyn LanguageModel> = StubModel::disabled();
    let state = AppState {
        engine: Arc::clone(&rig.engine),
        store: Arc::clone(&rig.store),
        outbound,
        model,
        internal_secret: secret,
        instance: "main".to_string(),
    };
    (webhook::router(state), rig)
}

fn post_json(uri: &str, secret: Option<&str>, body: String) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(secret) = secret {
        builder = builder.header("x-internal-secret", secret);
    }
    builder.body(Body::from(body)).unwrap()
}

#[tokio::test]
async fn health_endpoint_reports_ok() {
    let (app, _rig) = http_rig().await;
    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn webhook_envelope_reaches_the_engine() {
    let (app, rig) = http_rig().await;
    let envelope = serde_json::json!({
        "event": "messages.upsert",
        "instance": "main",
        "data": {
            "key": {"remoteJid": JID, "fromMe": false},
            "pushName": "Maria Silva",
            "message": {"conversation": welcome_trigger()}
        }
    });

    let response = app
        .oneshot(post_json("/webhook/evolution", None, envelope.to_string()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    settle().await;
    let contact = rig.store.find_contact(NUMBER).await.unwrap();
    assert!(contact.is_some(), "webhook event created the contact");
}

#[tokio::test]
async fn internal_api_rejects_a_wrong_secret() {
    let (app, _rig) = http_rig().await;
    let response = app
        .oneshot(post_json(
            "/api/internal/send-text",
            Some("wrong"),
            format!(r#"{{"number":"{NUMBER}","text":"olá"}}"#),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn internal_api_is_disabled_without_a_secret() {
    let (app, _rig) = http_rig_with_secret(None).await;
    let response = app
        .oneshot(post_json(
            "/api/internal/send-text",
            Some("anything"),
            format!(r#"{{"number":"{NUMBER}","text":"olá"}}"#),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn docs_received_callback_updates_the_contact() {
    let (app, rig) = http_rig().await;
    rig.engine
        .handle_event(from_contact(&direct_trigger()))
        .await;
    rig.engine.handle_event(from_contact("GESTORA")).await;
    let contact = rig.store.find_contact(NUMBER).await.unwrap().unwrap();

    let response = app
        .oneshot(post_json(
            "/api/internal/docs-received",
            Some("test-secret"),
            format!(r#"{{"lead_id":{}}}"#, contact.id),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let contact = rig.store.find_contact(NUMBER).await.unwrap().unwrap();
    assert_eq!(contact.doc_stage, Some(DocStage::DocsReceived));
    assert_eq!(rig.outbound.last_text().await, texts::DOCS_RECEIVED);
}
