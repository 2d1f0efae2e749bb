use std::sync::Arc;
use axum::{
    Router,
    extract::{Query, State},
    response::{Html, Json},
    routing::get,
};
use serde::Deserialize;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::config::Config;
use crate::engine::MonitorEngine;
use crate::metrics::render_metrics;

/// History points served when the caller does not ask for a count.
const DEFAULT_HISTORY_LIMIT: usize = 120;

/// Web UI server - cluster weather map
/// Shows node scores, risk tiers, stake distribution and history in real time
pub struct WebServer {
    engine: Arc<MonitorEngine>,
    config: Arc<Config>,
}

#[derive(Clone)]
struct AppState {
    engine: Arc<MonitorEngine>,
}

#[derive(Deserialize)]
struct ListQuery {
    limit: Option<usize>,
}

impl WebServer {
    pub fn new(engine: Arc<MonitorEngine>, config: Arc<Config>) -> Self {
        Self { engine, config }
    }

    pub async fn run(&self) -> anyhow::Result<()> {
        if !self.config.web.enabled {
            info!("Web UI disabled");
            return Ok(());
        }

        let state = AppState {
            engine: self.engine.clone(),
        };

        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        let app = Router::new()
            .route("/", get(dashboard))
            .route("/api/stats", get(api_stats))
            .route("/api/nodes", get(api_nodes))
            .route("/api/network", get(api_network))
            .route("/api/insights", get(api_insights))
            .route("/api/history", get(api_history))
            .route("/metrics", get(metrics_text))
            .layer(cors)
            .with_state(state);

        let addr = format!("{}:{}", self.config.web.address, self.config.web.port);
        info!("🌐 Web UI listening on http://{}", addr);

        let listener = tokio::net::TcpListener::bind(&addr).await?;
        axum::serve(listener, app).await?;
        Ok(())
    }
}

/// Dashboard HTML - embedded single-page app
async fn dashboard() -> Html<String> {
    Html(include_str!("../../static/dashboard.html").to_string())
}

/// Stats API
async fn api_stats(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(state.engine.get_stats())
}

/// Scored node collection, stake-descending as published
async fn api_nodes(
    State(state): State<AppState>,
    Query(params): Query<ListQuery>,
) -> Json<serde_json::Value> {
    match state.engine.state() {
        Some(view) => {
            let limit = params.limit.unwrap_or(view.nodes.len());
            let nodes: Vec<_> = view.nodes.iter().take(limit).collect();
            Json(serde_json::json!({
                "cycle": view.cycle,
                "fetched_at": view.fetched_at.to_rfc3339(),
                "nodes": nodes,
            }))
        }
        None => Json(warming_up()),
    }
}

/// Network aggregate API
async fn api_network(State(state): State<AppState>) -> Json<serde_json::Value> {
    match state.engine.state() {
        Some(view) => Json(serde_json::json!({
            "cycle": view.cycle,
            "fetched_at": view.fetched_at.to_rfc3339(),
            "network": view.aggregate,
        })),
        None => Json(warming_up()),
    }
}

/// Insight list API
async fn api_insights(State(state): State<AppState>) -> Json<serde_json::Value> {
    match state.engine.state() {
        Some(view) => Json(serde_json::json!({
            "cycle": view.cycle,
            "insights": view.insights,
        })),
        None => Json(warming_up()),
    }
}

/// History API - chart-ready series, oldest point first
async fn api_history(
    State(state): State<AppState>,
    Query(params): Query<ListQuery>,
) -> Json<serde_json::Value> {
    let limit = params.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
    let points = state.engine.history(limit);
    Json(serde_json::json!({ "points": points }))
}

/// Prometheus metrics endpoint
async fn metrics_text(State(state): State<AppState>) -> String {
    render_metrics(&state.engine)
}

fn warming_up() -> serde_json::Value {
    serde_json::json!({
        "status": "warming_up",
        "message": "No polling cycle has completed yet",
    })
}
