//! HTTP surface: Evolution webhook ingestion plus the internal API the
//! companion app calls back into.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::Value;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::engine::contact::{DocStage, StateCommand};
use crate::engine::{texts, Engine, InboundEvent};
use crate::gateway::Outbound;
use crate::llm::LanguageModel;
use crate::store::Store;

/// Shared state for all HTTP routes.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    pub store: Arc<dyn Store>,
    pub outbound: Arc<dyn Outbound>,
    pub model: Arc<dyn LanguageModel>,
    pub internal_secret: Option<SecretString>,
    pub instance: String,
}

/// Build the full HTTP surface.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/webhook/evolution", post(webhook))
        .route("/api/internal/send-text", post(send_text))
        .route(
            "/api/internal/refresh-faq-embedding",
            post(refresh_faq_embedding),
        )
        .route("/api/internal/docs-received", post(docs_received))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /api/health
async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// POST /webhook/evolution
///
/// Accepts an Evolution webhook envelope, acks immediately and processes
/// the contained messages in the background. Evolution retries slow
/// deliveries, so nothing here may block on the funnel.
async fn webhook(State(state): State<AppState>, Json(body): Json<Value>) -> StatusCode {
    let events = extract_events(&body, &state.instance);
    debug!(count = events.len(), "Webhook delivery received");
    for event in events {
        let engine = Arc::clone(&state.engine);
        tokio::spawn(async move {
            engine.handle_event(event).await;
        });
    }
    StatusCode::OK
}

// ── Internal API ────────────────────────────────────────────────────────

/// Check the shared-secret header on internal endpoints.
///
/// No configured secret means the internal API is disabled outright; a
/// misconfigured deployment must not become an open relay.
fn authorized(state: &AppState, headers: &HeaderMap) -> Result<(), (StatusCode, Json<Value>)> {
    let Some(secret) = &state.internal_secret else {
        return Err((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({"error": "Internal API disabled: no secret configured"})),
        ));
    };
    let provided = headers
        .get("x-internal-secret")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if provided != secret.expose_secret() {
        return Err((
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({"error": "Invalid internal secret"})),
        ));
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
struct SendTextRequest {
    number: String,
    text: String,
}

/// POST /api/internal/send-text
///
/// Companion-app initiated outbound message, e.g. a curated answer to a
/// question that previously went to the pending list.
async fn send_text(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<SendTextRequest>,
) -> impl IntoResponse {
    if let Err(reject) = authorized(&state, &headers) {
        return reject.into_response();
    }

    // Prefer the instance the contact registered on.
    let instance = match state.store.find_contact(&req.number).await {
        Ok(Some(contact)) => contact.instance,
        _ => state.instance.clone(),
    };

    match state
        .outbound
        .send_text(&instance, &req.number, &req.text)
        .await
    {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => {
            warn!(number = %req.number, "Internal send failed: {e}");
            (
                StatusCode::BAD_GATEWAY,
                Json(serde_json::json!({"error": e.to_string()})),
            )
                .into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
struct RefreshFaqRequest {
    id: i64,
    question: String,
    #[serde(default)]
    pending: bool,
}

/// POST /api/internal/refresh-faq-embedding
///
/// Mirror a created or edited FAQ entry and recompute its embedding so
/// matching picks the change up without a restart.
async fn refresh_faq_embedding(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<RefreshFaqRequest>,
) -> impl IntoResponse {
    if let Err(reject) = authorized(&state, &headers) {
        return reject.into_response();
    }

    if let Err(e) = state
        .store
        .upsert_faq_entry(req.id, &req.question, req.pending)
        .await
    {
        warn!(id = req.id, "FAQ mirror upsert failed: {e}");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({"error": e.to_string()})),
        )
            .into_response();
    }

    let embedded = match state.model.embed(&req.question).await {
        Some(vector) => match state.store.save_faq_embedding(req.id, &vector).await {
            Ok(()) => true,
            Err(e) => {
                warn!(id = req.id, "Failed to store refreshed embedding: {e}");
                false
            }
        },
        None => false,
    };

    info!(id = req.id, embedded, "FAQ entry refreshed");
    Json(serde_json::json!({"embedded": embedded})).into_response()
}

#[derive(Debug, Deserialize)]
struct DocsReceivedRequest {
    lead_id: i64,
}

/// POST /api/internal/docs-received
///
/// Upload portal callback: the contact finished sending documents.
async fn docs_received(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<DocsReceivedRequest>,
) -> impl IntoResponse {
    if let Err(reject) = authorized(&state, &headers) {
        return reject.into_response();
    }

    let contact = match state.store.find_contact_by_id(req.lead_id).await {
        Ok(Some(contact)) => contact,
        Ok(None) => {
            return (
                StatusCode::NOT_FOUND,
                Json(serde_json::json!({"error": "Unknown lead"})),
            )
                .into_response();
        }
        Err(e) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": e.to_string()})),
            )
                .into_response();
        }
    };

    if let Err(e) = state
        .store
        .apply_commands(
            &contact.wa_number,
            &[StateCommand::SetDocStage(Some(DocStage::DocsReceived))],
        )
        .await
    {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({"error": e.to_string()})),
        )
            .into_response();
    }

    if let Err(e) = state
        .outbound
        .send_text(&contact.instance, &contact.wa_number, texts::DOCS_RECEIVED)
        .await
    {
        warn!(number = %contact.wa_number, "Docs-received confirmation failed: {e}");
    }

    info!(lead_id = req.lead_id, "Documents marked received");
    StatusCode::OK.into_response()
}

// ── Webhook envelope parsing ────────────────────────────────────────────

/// Pull `InboundEvent`s out of an Evolution webhook envelope.
///
/// Evolution has shipped several shapes of the MESSAGES_UPSERT payload over
/// its releases: `data.messages` as an array, `data` itself as an array, and
/// `data` as a single message object. All three are accepted; any other
/// event type yields nothing.
pub fn extract_events(body: &Value, default_instance: &str) -> Vec<InboundEvent> {
    let event_name = body
        .get("event")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_lowercase()
        .replace(['.', '_'], "");
    if event_name != "messagesupsert" {
        return Vec::new();
    }

    let instance = body
        .get("instance")
        .and_then(Value::as_str)
        .unwrap_or(default_instance)
        .to_string();

    let data = body.get("data").cloned().unwrap_or(Value::Null);
    let items: Vec<Value> = if let Some(messages) = data.get("messages").and_then(Value::as_array) {
        messages.clone()
    } else if let Some(array) = data.as_array() {
        array.clone()
    } else if data.is_object() {
        vec![data]
    } else {
        Vec::new()
    };

    items
        .iter()
        .filter_map(|item| parse_message(item, &instance))
        .collect()
}

fn parse_message(item: &Value, instance: &str) -> Option<InboundEvent> {
    let key = item.get("key")?;
    let jid = key.get("remoteJid").and_then(Value::as_str)?;
    // Group chats are out of scope for the funnel.
    if jid.ends_with("@g.us") {
        return None;
    }
    let from_me = key.get("fromMe").and_then(Value::as_bool).unwrap_or(false);
    let push_name = item
        .get("pushName")
        .and_then(Value::as_str)
        .map(str::to_string);
    let text = message_text(item.get("message"))?;
    Some(InboundEvent {
        instance: instance.to_string(),
        jid: jid.to_string(),
        push_name,
        text,
        from_me,
    })
}

/// Extract the text body from the message union. Only plain and extended
/// text messages carry something the funnel can act on.
fn message_text(message: Option<&Value>) -> Option<String> {
    let message = message?;
    if let Some(text) = message.get("conversation").and_then(Value::as_str) {
        if !text.trim().is_empty() {
            return Some(text.to_string());
        }
    }
    message
        .get("extendedTextMessage")
        .and_then(|m| m.get("text"))
        .and_then(Value::as_str)
        .filter(|t| !t.trim().is_empty())
        .map(str::to_string)
}
