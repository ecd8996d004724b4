// Cross-Reference Web API
// JSON search endpoints over one shared, read-only snapshot

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Json},
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::catalog::CatalogSnapshot;
use crate::matcher::{candidates, lookup_order, LookupOutcome, MatchOptions, Matcher};
use crate::preview::PreviewSource;

/// Shared application state (immutable, no locking)
#[derive(Clone)]
pub struct AppState {
    pub snapshot: Arc<CatalogSnapshot>,
    pub options: MatchOptions,
    pub preview: Option<Arc<dyn PreviewSource>>,
}

impl AppState {
    pub fn new(snapshot: CatalogSnapshot, options: MatchOptions) -> Self {
        Self {
            snapshot: Arc::new(snapshot),
            options,
            preview: None,
        }
    }

    pub fn with_preview(mut self, preview: Arc<dyn PreviewSource>) -> Self {
        self.preview = Some(preview);
        self
    }
}

/// API Response wrapper
#[derive(Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

#[derive(Deserialize)]
pub struct SearchParams {
    q: Option<String>,
}

/// Search response: matching rows plus the first match's product details
#[derive(Serialize)]
pub struct SearchResponse {
    query: String,
    count: usize,
    image_url: Option<String>,
    submittal_url: Option<String>,
    #[serde(flatten)]
    outcome: LookupOutcome,
}

#[derive(Serialize)]
pub struct CandidatesResponse {
    part: String,
    core_part: String,
    candidates: Vec<String>,
    /// Unmodified part first, then the candidates, as the lookup tries them
    lookup_order: Vec<String>,
}

// ============================================================================
// API Handlers
// ============================================================================

/// Only http(s) links are handed to the page
fn web_url(url: Option<&str>) -> Option<String> {
    let url = url?.trim();
    let scheme = url.split_once("://")?.0;
    if scheme.eq_ignore_ascii_case("http") || scheme.eq_ignore_ascii_case("https") {
        Some(url.to_string())
    } else {
        warn!(url, "Dropping non-http link from search response");
        None
    }
}

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// GET /api/search?q=... - Cross-reference search
async fn search(State(state): State<AppState>, Query(params): Query<SearchParams>) -> impl IntoResponse {
    let query = params.q.unwrap_or_default();

    if query.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::<SearchResponse>::error(
                "Enter a Haydon or vendor part number (?q=...)",
            )),
        );
    }

    let mut outcome = Matcher::new(&state.snapshot, state.options).lookup(&query);

    // Blocking fetch, kept off the async workers
    if let (Some(source), true) = (state.preview.clone(), outcome.wants_preview()) {
        let preview_query = outcome.preview_query().unwrap_or_default().to_string();
        let fetched = tokio::task::spawn_blocking(move || source.fetch_preview_image(&preview_query))
            .await
            .unwrap_or_else(|e| {
                warn!(error = %e, "Preview task failed");
                None
            });

        if let LookupOutcome::Matched { preview, .. } = &mut outcome {
            *preview = fetched;
        }
    }

    let response = SearchResponse {
        query,
        count: outcome.entries().len(),
        image_url: web_url(outcome.image_url()),
        submittal_url: web_url(outcome.submittal_url()),
        outcome,
    };

    (StatusCode::OK, Json(ApiResponse::ok(response)))
}

/// GET /api/candidates/:part - Fallback candidates for one part
async fn get_candidates(State(state): State<AppState>, Path(part): Path<String>) -> impl IntoResponse {
    let matcher = Matcher::new(&state.snapshot, state.options);

    Json(ApiResponse::ok(CandidatesResponse {
        core_part: matcher.core_part(&part),
        candidates: candidates(&part).collect(),
        lookup_order: lookup_order(&part),
        part,
    }))
}

/// GET / - Serve index.html
async fn serve_index() -> impl IntoResponse {
    Html(include_str!("../web/index.html"))
}

pub fn router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/search", get(search))
        .route("/candidates/:part", get(get_candidates))
        .with_state(state);

    Router::new()
        .route("/", get(serve_index))
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
