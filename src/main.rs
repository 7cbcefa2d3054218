use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use lead_assist::backend::{CompanionBackend, FaqBackend};
use lead_assist::buffer::QuestionBuffer;
use lead_assist::config::AppConfig;
use lead_assist::engine::session::{self, SessionStore};
use lead_assist::engine::Engine;
use lead_assist::faq::FaqMatcher;
use lead_assist::gateway::{EvolutionGateway, Outbound};
use lead_assist::llm::{DisabledModel, LanguageModel, OpenAiModel};
use lead_assist::queue::{self, DelayedQueue};
use lead_assist::store::{LibSqlBackend, Store};
use lead_assist::webhook::{self, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = AppConfig::from_env().unwrap_or_else(|e| {
        eprintln!("Error: invalid configuration: {e}");
        std::process::exit(1);
    });

    eprintln!("🤝 Lead Assist v{}", env!("CARGO_PKG_VERSION"));
    eprintln!(
        "   Webhook: http://0.0.0.0:{}/webhook/evolution",
        config.server.port
    );
    eprintln!("   Database: {}", config.db_path);
    eprintln!(
        "   Gateway: {}",
        config
            .gateway
            .base_url
            .as_deref()
            .unwrap_or("(not configured, dry mode)")
    );
    eprintln!(
        "   Models: {} / {}",
        config.llm.chat_model, config.llm.embedding_model
    );
    eprintln!(
        "   Thresholds: match {:.2}, duplicate {:.2}\n",
        config.funnel.match_threshold, config.funnel.duplicate_threshold
    );

    // ── Storage ──────────────────────────────────────────────────────────
    let store: Arc<dyn Store> = Arc::new(
        LibSqlBackend::new_local(Path::new(&config.db_path))
            .await
            .unwrap_or_else(|e| {
                eprintln!("Error: failed to open database at {}: {e}", config.db_path);
                std::process::exit(1);
            }),
    );

    // ── Outbound + companion ─────────────────────────────────────────────
    let outbound: Arc<dyn Outbound> = Arc::new(EvolutionGateway::new(&config.gateway));
    let backend: Arc<dyn FaqBackend> = Arc::new(CompanionBackend::new(&config.backend));

    let model: Arc<dyn LanguageModel> = match OpenAiModel::new(&config.llm) {
        Some(model) => Arc::new(model),
        None => {
            eprintln!("   Note: OPENAI_API_KEY not set, every question goes to human triage");
            Arc::new(DisabledModel)
        }
    };

    // ── Funnel machinery ─────────────────────────────────────────────────
    let buffer = QuestionBuffer::new(Arc::clone(&outbound), config.funnel.buffer_reminder);
    let queue = Arc::new(DelayedQueue::new(
        Arc::clone(&store),
        Arc::clone(&outbound),
        Arc::clone(&backend),
        config.funnel.clone(),
    ));
    let sessions = SessionStore::new(config.funnel.session_idle_timeout);
    let matcher = FaqMatcher::new(
        Arc::clone(&store),
        Arc::clone(&backend),
        Arc::clone(&model),
        config.funnel.match_threshold,
        config.funnel.duplicate_threshold,
    );

    let engine = Arc::new(Engine::new(
        Arc::clone(&store),
        Arc::clone(&outbound),
        matcher,
        Arc::clone(&buffer),
        Arc::clone(&queue),
        Arc::clone(&sessions),
        config.funnel.clone(),
        config.backend.upload_base_url.clone(),
    ));

    // Background tasks: queue poller + session pruning
    let _poller = queue::spawn_poller(Arc::clone(&queue), config.funnel.poll_interval);
    let _pruner = session::spawn_prune_task(Arc::clone(&sessions), Duration::from_secs(600));

    // ── HTTP server ──────────────────────────────────────────────────────
    let state = AppState {
        engine,
        store,
        outbound,
        model,
        internal_secret: config.server.internal_secret.clone(),
        instance: config.gateway.instance.clone(),
    };
    let app = webhook::router(state);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.server.port))
        .await
        .unwrap_or_else(|e| {
            eprintln!("Error: failed to bind port {}: {e}", config.server.port);
            std::process::exit(1);
        });
    tracing::info!(port = config.server.port, "Webhook server started");
    axum::serve(listener, app).await?;

    Ok(())
}
