use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use crawler::{AppConfig, Coordinator};
use search_core::stats::StatisticsResponse;
use search_core::{Error, Repository, SearchEngine, SearchResponse};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub coordinator: Coordinator,
    pub engine: Arc<SearchEngine>,
}

impl AppState {
    pub fn new(config: &AppConfig, repo: Arc<dyn Repository>) -> anyhow::Result<Self> {
        let extractor = config.extractor()?;
        let engine = Arc::new(SearchEngine::new(repo.clone(), extractor.clone()));
        let coordinator = Coordinator::new(config, repo, extractor)?;
        Ok(Self { coordinator, engine })
    }
}

#[derive(Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub site: Option<String>,
    #[serde(default)]
    pub offset: usize,
    #[serde(default = "default_limit")]
    pub limit: usize,
}
fn default_limit() -> usize { 10 }

#[derive(Deserialize)]
pub struct IndexPageParams {
    #[serde(default)]
    pub url: String,
}

/// Body of every control endpoint; `error` only on failure.
#[derive(Debug, Serialize, Deserialize)]
pub struct IndexingResponse {
    pub result: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl IndexingResponse {
    pub fn ok() -> Self {
        Self { result: true, error: None }
    }
}

/// Any failure, rendered as `{"result": false, "error": "..."}`.
#[derive(Debug)]
pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = if self.0.is_client_error() { StatusCode::BAD_REQUEST } else { StatusCode::INTERNAL_SERVER_ERROR };
        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        }
        let body = IndexingResponse { result: false, error: Some(self.0.to_string()) };
        (status, Json(body)).into_response()
    }
}

pub fn build_app(state: AppState) -> Router {
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
        .route("/api/statistics", get(statistics))
        .route("/api/startIndexing", get(start_indexing))
        .route("/api/stopIndexing", get(stop_indexing))
        .route("/api/indexPage", post(index_page))
        .route("/api/search", get(search))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

async fn statistics(State(state): State<AppState>) -> Result<Json<StatisticsResponse>, ApiError> {
    Ok(Json(state.coordinator.statistics()?))
}

async fn start_indexing(State(state): State<AppState>) -> Result<Json<IndexingResponse>, ApiError> {
    state.coordinator.start_indexing()?;
    Ok(Json(IndexingResponse::ok()))
}

async fn stop_indexing(State(state): State<AppState>) -> Result<Json<IndexingResponse>, ApiError> {
    state.coordinator.stop_indexing().await?;
    Ok(Json(IndexingResponse::ok()))
}

async fn index_page(
    State(state): State<AppState>,
    Form(params): Form<IndexPageParams>,
) -> Result<Json<IndexingResponse>, ApiError> {
    state.coordinator.index_single_page(&params.url).await?;
    Ok(Json(IndexingResponse::ok()))
}

/// An empty query answers 400 with the regular search body (`count: 0`).
async fn search(State(state): State<AppState>, Query(params): Query<SearchParams>) -> Result<Response, ApiError> {
    let query = params.query.unwrap_or_default();
    let site = params.site.as_deref().filter(|s| !s.trim().is_empty());
    match state.engine.search(&query, site, params.offset, params.limit) {
        Ok(found) => Ok(Json(found).into_response()),
        Err(e @ Error::EmptyQuery) => {
            Ok((StatusCode::BAD_REQUEST, Json(SearchResponse::failed(e.to_string()))).into_response())
        }
        Err(e) => Err(e.into()),
    }
}
