use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::{DefaultMakeSpan, TraceLayer};
use tracing::info;

use rag_engine::budget::BudgetLimits;
use rag_engine::chat::ChatOrchestrator;
use rag_engine::config::Settings;
use rag_engine::embedding::{Embedder, HashingEmbedder, RemoteEmbedder};
use rag_engine::handlers;
use rag_engine::lm::{GenerationParams, HttpLmAdapter, LmAdapter};
use rag_engine::retrieval::RetrievalPipeline;
use rag_engine::state::AppState;
use rag_engine::store::{ChunkStore, HistoryStore};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,rag_engine=debug".to_string()),
        )
        .with_target(true)
        .init();

    info!("starting rag-engine");

    let settings = Settings::load()?;
    info!("configuration loaded");

    let chunk_store_path = settings.rag.index_dir.join(&settings.rag.sqlite_file);
    let chunk_store = ChunkStore::connect(&chunk_store_path).await?;
    let history = Arc::new(HistoryStore::connect(&settings.history.path).await?);
    info!("stores connected");

    let embedder: Box<dyn Embedder> = match settings.rag.embedder_backend.as_str() {
        "remote" => {
            let base_url = settings.rag.embed_base_url.clone().ok_or_else(|| {
                anyhow::anyhow!("rag.embed_base_url is required when rag.embedder_backend is \"remote\"")
            })?;
            Box::new(RemoteEmbedder::new(base_url, settings.model.model_name.clone(), settings.rag.embed_dim))
        }
        _ => Box::new(HashingEmbedder::new(settings.rag.embed_dim)),
    };
    info!(backend = %settings.rag.embedder_backend, "embedder ready");

    let index_prefix = settings.rag.index_dir.join(&settings.rag.index_file);
    let retrieval = Arc::new(RetrievalPipeline::new(
        settings.docs.globs.clone(),
        settings.docs.exts.clone(),
        settings.rag.max_file_size_mb * 1024 * 1024,
        settings.rag.chunk_size,
        settings.rag.chunk_overlap,
        settings.rag.top_k,
        settings.rag.candidates_k,
        settings.rag.rerank_alpha,
        index_prefix,
        embedder,
        chunk_store,
        cfg!(feature = "ann-index"),
    ));

    if settings.rag.enabled {
        retrieval.build_or_update_index().await?;
        info!("corpus index built");
    } else {
        info!("rag.enabled is false, skipping index build");
    }

    let lm: Arc<dyn LmAdapter> = Arc::new(HttpLmAdapter::new(
        settings.model.base_url.clone(),
        settings.model.model_name.clone(),
        settings.model.timeout_seconds,
        settings.model.think,
    ));

    let generation_params = GenerationParams {
        temperature: settings.model.temperature,
        top_p: settings.model.top_p,
        max_new_tokens: settings.model.max_new_tokens,
    };

    let budget_limits = BudgetLimits {
        model_context_window: settings.budget.model_context_window,
        summary_token_limit: settings.budget.summary_token_limit,
        memory_token_limit: settings.budget.memory_token_limit,
        evidence_token_limit: settings.budget.evidence_token_limit,
    };

    let orchestrator = Arc::new(ChatOrchestrator::new(
        history.clone(),
        retrieval,
        lm,
        budget_limits,
        generation_params,
        settings.rag.top_k,
        settings.budget.recent_message_limit,
        ChatOrchestrator::default_system_prompt(),
    ));

    let addr = SocketAddr::from((
        settings.server.host.parse::<std::net::IpAddr>()?,
        settings.server.port,
    ));

    let state = Arc::new(AppState { settings, history, orchestrator });

    let app = Router::new()
        .route("/v1/chat/stream", post(handlers::chat::chat_stream_handler))
        .route("/v1/chats", get(handlers::chats::list_chats_handler))
        .route("/v1/chats/{chat_id}/messages", get(handlers::chats::get_messages_handler))
        .route("/v1/chats/{chat_id}", delete(handlers::chats::delete_chat_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http().make_span_with(DefaultMakeSpan::default().include_headers(true)))
        .with_state(state);

    info!(%addr, "listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
