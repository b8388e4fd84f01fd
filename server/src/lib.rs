use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use bigsearch_core::{DocKind, EngineStatus, IndexError, IndexedDocument, ResultItem, SearchEngine};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

#[derive(Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub q: String,
    pub use_semantic: Option<bool>,
    pub semantic_weight: Option<f32>,
    /// Truncate to the top `k` results; all matches when absent.
    pub k: Option<usize>,
}

#[derive(Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub took_s: f64,
    pub total_hits: usize,
    pub results: Vec<ResultItem>,
}

#[derive(Deserialize)]
pub struct AutocompleteParams {
    #[serde(default)]
    pub q: String,
    #[serde(default = "default_limit")]
    pub limit: usize,
}
fn default_limit() -> usize { 5 }

#[derive(Serialize)]
pub struct AutocompleteResponse {
    pub query: String,
    pub suggestions: Vec<String>,
}

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<SearchEngine>,
    pub admin_token: Option<String>,
}

type ApiError = (StatusCode, String);

pub fn build_app(engine: Arc<SearchEngine>, admin_token: Option<String>) -> Router {
    let app_state = AppState { engine, admin_token };

    // CORS: read CORS_ALLOW_ORIGIN (comma-separated) or allow Any by default
    let cors = match std::env::var("CORS_ALLOW_ORIGIN") {
        Ok(val) => {
            let origins: Vec<_> = val.split(',').filter_map(|s| s.trim().parse().ok()).collect();
            if origins.is_empty() {
                CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
            } else {
                CorsLayer::new().allow_origin(AllowOrigin::list(origins)).allow_methods(Any).allow_headers(Any)
            }
        }
        Err(_) => CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any),
    };

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/api/search", get(search_handler))
        .route("/api/autocomplete", get(autocomplete_handler))
        .route("/api/status", get(status_handler))
        .route("/api/index/:kind", post(index_handler))
        .with_state(app_state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

pub async fn search_handler(State(state): State<AppState>, Query(params): Query<SearchParams>) -> Json<SearchResponse> {
    let start = std::time::Instant::now();
    let defaults = &state.engine.config().semantic;
    let use_semantic = params.use_semantic.unwrap_or(defaults.default_use);
    let weight = params.semantic_weight.unwrap_or(defaults.default_weight);

    let mut results = state.engine.search(&params.q, use_semantic, weight);
    let total_hits = results.len();
    if let Some(k) = params.k {
        results.truncate(k);
    }
    Json(SearchResponse { query: params.q, took_s: start.elapsed().as_secs_f64(), total_hits, results })
}

pub async fn autocomplete_handler(
    State(state): State<AppState>,
    Query(params): Query<AutocompleteParams>,
) -> Json<AutocompleteResponse> {
    let suggestions = state.engine.autocomplete(&params.q, params.limit);
    Json(AutocompleteResponse { query: params.q, suggestions })
}

pub async fn status_handler(State(state): State<AppState>) -> Json<EngineStatus> {
    Json(state.engine.status())
}

async fn index_handler(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<IndexedDocument>), ApiError> {
    authorize(&state, &headers)?;
    let kind = DocKind::parse(&kind).ok_or_else(|| (StatusCode::NOT_FOUND, format!("unknown document type {kind:?}")))?;

    let engine = Arc::clone(&state.engine);
    let indexed = tokio::task::spawn_blocking(move || engine.index_document(kind, &body))
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    match indexed {
        Ok(doc) => Ok((StatusCode::CREATED, Json(doc))),
        Err(e) => {
            let status = match &e {
                IndexError::InvalidPayload { .. } => StatusCode::BAD_REQUEST,
                IndexError::IndexingUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
                IndexError::Allocation(_) | IndexError::Staging { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            };
            warn!(kind = kind.as_str(), error = %e, "indexing request failed");
            Err((status, e.to_string()))
        }
    }
}

fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let required = match &state.admin_token {
        Some(t) => t,
        None => return Err((StatusCode::UNAUTHORIZED, "ADMIN_TOKEN not set".into())),
    };
    let provided = headers.get("X-ADMIN-TOKEN").and_then(|v| v.to_str().ok()).unwrap_or("");
    if provided == required {
        Ok(())
    } else {
        Err((StatusCode::UNAUTHORIZED, "invalid admin token".into()))
    }
}
