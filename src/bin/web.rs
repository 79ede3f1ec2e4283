//! Conductor HTTP 接口
//!
//! 启动: cargo run --bin conductor-web --features web
//! 路由：POST /chat、/chat/batch、/chat/multi-agent；GET /health、/stats、/cache/stats

#![cfg(feature = "web")]

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

use conductor::config::load_config;
use conductor::core::{BatchOutcome, ChatOutcome, EngineStats, MultiAgentOutcome};
use conductor::llm::CacheStats;
use conductor::observability;
use conductor::{AgentError, Engine, EngineBuilder};

type ApiError = (StatusCode, Json<Value>);

fn internal(e: AgentError) -> ApiError {
    tracing::error!(error = %e, "request failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "detail": e.to_string() })),
    )
}

fn default_use_cache() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct ChatRequest {
    query: String,
    #[serde(default = "default_use_cache")]
    use_cache: bool,
}

#[derive(Debug, Deserialize)]
struct BatchRequest {
    queries: Vec<String>,
    #[serde(default = "default_use_cache")]
    use_cache: bool,
}

#[derive(Debug, Deserialize)]
struct MultiAgentRequest {
    query: String,
}

struct AppState {
    engine: Arc<Engine>,
    export_path: Option<std::path::PathBuf>,
}

impl AppState {
    fn export_traces(&self) {
        if let Some(path) = &self.export_path {
            if let Err(e) = self.engine.export_traces(path) {
                tracing::warn!(error = %e, "trace export failed");
            }
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let config_path = std::env::var_os("CONDUCTOR_CONFIG").map(std::path::PathBuf::from);
    let cfg = load_config(config_path).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        Default::default()
    });
    let bind = cfg.server.bind.clone();
    let export_path = cfg.trace.export_path.clone();
    let engine = Arc::new(EngineBuilder::new(cfg).build());

    let state = Arc::new(AppState {
        engine,
        export_path,
    });

    let app = Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/stats", get(stats))
        .route("/cache/stats", get(cache_stats))
        .route("/cache", delete(clear_cache))
        .route("/chat", post(chat))
        .route("/chat/batch", post(chat_batch))
        .route("/chat/multi-agent", post(chat_multi_agent))
        .with_state(state);

    tracing::info!("Conductor API: http://{}", bind);
    let listener = tokio::net::TcpListener::bind(&bind).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn root() -> Json<Value> {
    Json(json!({
        "message": "Conductor agent orchestration engine",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": ["/chat", "/chat/batch", "/chat/multi-agent", "/health", "/stats", "/cache/stats", "/cache"],
    }))
}

async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now(),
        "tools": state.engine.tools().tool_names(),
    }))
}

async fn stats(State(state): State<Arc<AppState>>) -> Json<EngineStats> {
    Json(state.engine.stats().await)
}

async fn cache_stats(State(state): State<Arc<AppState>>) -> Json<CacheStats> {
    Json(state.engine.cache_stats().await)
}

/// DELETE /cache：清空响应缓存，返回清空后的统计
async fn clear_cache(State(state): State<Arc<AppState>>) -> Json<CacheStats> {
    state.engine.clear_cache().await;
    Json(state.engine.cache_stats().await)
}

/// POST /chat：单智能体（缓存 + 档位选择）
async fn chat(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatOutcome>, ApiError> {
    let outcome = state
        .engine
        .process(&req.query, req.use_cache)
        .await
        .map_err(internal)?;
    state.export_traces();
    Ok(Json(outcome))
}

/// POST /chat/batch：并发处理多个查询
async fn chat_batch(
    State(state): State<Arc<AppState>>,
    Json(req): Json<BatchRequest>,
) -> Json<BatchOutcome> {
    let outcome = state.engine.process_batch(req.queries, req.use_cache).await;
    state.export_traces();
    Json(outcome)
}

/// POST /chat/multi-agent：规划 + 执行
async fn chat_multi_agent(
    State(state): State<Arc<AppState>>,
    Json(req): Json<MultiAgentRequest>,
) -> Result<Json<MultiAgentOutcome>, ApiError> {
    let outcome = state
        .engine
        .process_multi_agent(&req.query)
        .await
        .map_err(internal)?;
    state.export_traces();
    Ok(Json(outcome))
}
