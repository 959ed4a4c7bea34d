//! HTTP API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `GET`  | `/api/docs/{type}?subDir=` | Doc tree of a category |
//! | `GET`  | `/api/doc-types?category=` | Doc types per category |
//! | `GET`  | `/api/search?q=&limit=` | Ranked search results |
//! | `GET`  | `/api/search/suggestions?q=` | Title suggestions (always an array) |
//! | `GET`  | `/api/og-image?url=` | Open Graph image of a page |
//! | `GET`  | `/api/proxy-image?url=` | Image bytes fetched server-side |
//! | `GET`  | `/api/optimize-image?url=&width=` | Browser-loadable thumbnail URL (never fails) |
//! | `GET`  | `/api/debug/keywords` | Keyword index summary (development) |
//! | `GET`  | `/api/debug/keywords/index` | Full keyword index (development) |
//! | `GET`  | `/api/debug/keywords/resolve?keyword=&docType=` | Resolve one keyword (development) |
//! | `POST` | `/api/debug/cache/invalidate` | Flush every cache (development) |
//! | `GET`  | `/api/admin/debug/keywords` | Keyword summary; 403 outside development |
//!
//! Debug routes answer 404 unless `server.environment = "development"`.
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "url parameter is required" } }
//! ```
//!
//! Error codes: `bad_request` (400), `forbidden` (403), `not_found` (404),
//! `timeout` (408), `unsupported_media_type` (415), `file_system_error`,
//! `invalid_snapshot`, `search_engine_error` and `internal` (500),
//! `upstream_error` (502). Messages are generic; details are logged.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use doclink_core::keyword::KeywordIndex;
use doclink_core::models::{DocCategory, DocNode, SearchResult};
use doclink_core::resolve::ResolvedLink;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};

use crate::cache::CacheSweeper;
use crate::config::{Config, TreeMode};
use crate::doc_tree::CategoryDocTypes;
use crate::error::DocsError;
use crate::images::FetchError;
use crate::keywords::KeywordDebugReport;
use crate::services::Services;

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    services: Services,
}

impl AppState {
    pub fn new(services: Services) -> Self {
        Self { services }
    }

    fn config(&self) -> &Config {
        &self.services.config
    }
}

/// The full router; used by [`run_server`] and by tests.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/api/docs/{doc_type}", get(handle_docs))
        .route("/api/doc-types", get(handle_doc_types))
        .route("/api/search", get(handle_search))
        .route("/api/search/suggestions", get(handle_suggestions))
        .route("/api/og-image", get(handle_og_image))
        .route("/api/proxy-image", get(handle_proxy_image))
        .route("/api/optimize-image", get(handle_optimize_image))
        .route("/api/debug/keywords", get(handle_debug_keywords))
        .route("/api/debug/keywords/index", get(handle_debug_keyword_index))
        .route("/api/debug/keywords/resolve", get(handle_debug_resolve))
        .route("/api/debug/cache/invalidate", post(handle_invalidate_caches))
        .route("/api/admin/debug/keywords", get(handle_admin_keywords))
        .layer(cors)
        .with_state(state)
}

/// Starts the HTTP server on `[server].bind`.
///
/// Runs until Ctrl-C; the cache sweeper is stopped on the way out.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let services = Services::new(Arc::new(config.clone()))?;

    let sweeper = CacheSweeper::start(
        services.caches(),
        Duration::from_secs(config.cache.check_interval_secs),
    );

    let app = router(AppState::new(services));

    println!("doclink server listening on http://{}", bind_addr);
    info!(
        bind = %bind_addr,
        environment = %config.server.environment,
        mode = ?config.content.mode,
        "server starting"
    );

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    sweeper.shutdown();
    info!("server stopped");
    served?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
    /// Thumbnail to show instead, on image lookups.
    #[serde(skip_serializing_if = "Option::is_none")]
    fallback: Option<String>,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
struct AppError {
    status: StatusCode,
    code: String,
    message: String,
    fallback: Option<String>,
}

impl AppError {
    fn new(status: StatusCode, code: &str, message: impl Into<String>) -> Self {
        AppError {
            status,
            code: code.to_string(),
            message: message.into(),
            fallback: None,
        }
    }

    fn with_fallback(mut self, fallback: &str) -> Self {
        self.fallback = Some(fallback.to_string());
        self
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
            fallback: self.fallback,
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError::new(StatusCode::BAD_REQUEST, "bad_request", message)
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError::new(StatusCode::NOT_FOUND, "not_found", message)
}

fn forbidden(message: impl Into<String>) -> AppError {
    AppError::new(StatusCode::FORBIDDEN, "forbidden", message)
}

impl From<DocsError> for AppError {
    fn from(err: DocsError) -> Self {
        error!(code = err.code(), error = %err, "request failed");
        let code = err.code().to_ascii_lowercase();
        match &err {
            DocsError::FileSystem { source, .. }
                if source.kind() == std::io::ErrorKind::NotFound =>
            {
                not_found("document directory not found")
            }
            DocsError::FileSystem { .. } => {
                AppError::new(StatusCode::INTERNAL_SERVER_ERROR, &code, "failed to read documents")
            }
            DocsError::InvalidSnapshot { .. } => {
                AppError::new(StatusCode::INTERNAL_SERVER_ERROR, &code, "document snapshot is invalid")
            }
            DocsError::SearchEngine(_) | DocsError::IndexNotFound(_) => {
                AppError::new(StatusCode::INTERNAL_SERVER_ERROR, &code, "search is unavailable")
            }
            DocsError::InvalidQuery { min } => {
                bad_request(format!("query must be at least {} characters", min))
            }
            DocsError::Cache(_) => {
                AppError::new(StatusCode::INTERNAL_SERVER_ERROR, "internal", "internal error")
            }
        }
    }
}

impl From<FetchError> for AppError {
    fn from(err: FetchError) -> Self {
        warn!(error = %err, "image fetch failed");
        match err {
            FetchError::Timeout => AppError::new(
                StatusCode::REQUEST_TIMEOUT,
                "timeout",
                "request timed out while fetching the resource",
            ),
            FetchError::Status(status) => AppError::new(
                StatusCode::BAD_GATEWAY,
                "upstream_error",
                format!("upstream returned HTTP {}", status),
            ),
            FetchError::NotAnImage(content_type) => AppError::new(
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
                "unsupported_media_type",
                format!("the requested resource isn't an image ({})", content_type),
            ),
            FetchError::InvalidUrl(_) => bad_request("url must be an absolute http(s) URL"),
            FetchError::Network(_) => AppError::new(
                StatusCode::BAD_GATEWAY,
                "upstream_error",
                "network error while fetching the resource",
            ),
        }
    }
}

fn require_development(state: &AppState) -> Result<(), AppError> {
    if state.config().server.is_development() {
        Ok(())
    } else {
        Err(not_found("not found"))
    }
}

// ============ Handlers ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

#[derive(Deserialize)]
struct DocsQuery {
    #[serde(rename = "subDir")]
    sub_dir: Option<String>,
}

async fn handle_docs(
    State(state): State<AppState>,
    Path(doc_type): Path<String>,
    Query(query): Query<DocsQuery>,
) -> Result<Json<Vec<DocNode>>, AppError> {
    let category: DocCategory = match doc_type.parse() {
        Ok(c) => c,
        Err(_) if state.config().content.mode == TreeMode::Snapshot => return Ok(Json(Vec::new())),
        Err(_) => return Err(bad_request(format!("unknown doc type: {}", doc_type))),
    };
    let sub_dir = query.sub_dir.as_deref().filter(|s| !s.trim().is_empty());
    let nodes = state.services.trees.load(category, sub_dir)?;
    Ok(Json(nodes))
}

#[derive(Deserialize)]
struct DocTypesQuery {
    category: Option<String>,
}

async fn handle_doc_types(
    State(state): State<AppState>,
    Query(query): Query<DocTypesQuery>,
) -> Result<Json<Vec<CategoryDocTypes>>, AppError> {
    let filter = match query.category.as_deref().filter(|c| !c.is_empty()) {
        Some(raw) => Some(
            raw.parse::<DocCategory>()
                .map_err(|_| bad_request(format!("unknown category: {}", raw)))?,
        ),
        None => None,
    };
    let mut listing = state.services.trees.list_doc_types()?;
    if let Some(category) = filter {
        listing.retain(|c| c.category == category);
    }
    Ok(Json(listing))
}

#[derive(Deserialize)]
struct SearchQuery {
    #[serde(default)]
    q: String,
    limit: Option<usize>,
}

async fn handle_search(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<SearchResult>>, AppError> {
    if query.limit == Some(0) {
        return Err(bad_request("limit must be >= 1"));
    }
    let results = state.services.search.search(&query.q, query.limit).await?;
    Ok(Json(results))
}

async fn handle_suggestions(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Json<Vec<String>> {
    let limit = query.limit.unwrap_or(5).max(1);
    match state.services.search.suggestions(&query.q, limit).await {
        Ok(titles) => Json(titles),
        Err(e) => {
            error!(code = e.code(), error = %e, "suggestions failed");
            Json(Vec::new())
        }
    }
}

#[derive(Deserialize)]
struct UrlQuery {
    url: Option<String>,
}

#[derive(Serialize)]
struct OgImageResponse {
    url: String,
}

async fn handle_og_image(
    State(state): State<AppState>,
    Query(query): Query<UrlQuery>,
) -> Result<Json<OgImageResponse>, AppError> {
    let url = query
        .url
        .filter(|u| !u.trim().is_empty())
        .ok_or_else(|| bad_request("url parameter is required"))?;
    let images = &state.services.images;
    let fallback = images.default_thumbnail().to_string();

    match images.og_image(&url).await {
        Ok(Some(found)) => Ok(Json(OgImageResponse { url: found })),
        Ok(None) => Err(not_found("no og:image on the page").with_fallback(&fallback)),
        Err(e) => Err(AppError::from(e).with_fallback(&fallback)),
    }
}

async fn handle_proxy_image(
    State(state): State<AppState>,
    Query(query): Query<UrlQuery>,
) -> Result<Response, AppError> {
    let url = query
        .url
        .filter(|u| !u.trim().is_empty())
        .ok_or_else(|| bad_request("url parameter is required"))?;
    let image = state.services.images.fetch_image(&url).await?;
    Ok((
        [
            (header::CONTENT_TYPE, image.content_type),
            (header::CACHE_CONTROL, "public, max-age=604800".to_string()),
        ],
        image.bytes,
    )
        .into_response())
}

#[derive(Deserialize)]
struct OptimizeQuery {
    url: Option<String>,
    width: Option<u32>,
}

async fn handle_optimize_image(
    State(state): State<AppState>,
    Query(query): Query<OptimizeQuery>,
) -> Json<OgImageResponse> {
    let url = query.url.unwrap_or_default();
    let optimized = state
        .services
        .images
        .optimize_image_url(&url, query.width)
        .await;
    Json(OgImageResponse { url: optimized })
}

async fn handle_debug_keywords(
    State(state): State<AppState>,
) -> Result<Json<KeywordDebugReport>, AppError> {
    require_development(&state)?;
    Ok(Json(state.services.keywords.debug_report().await?))
}

async fn handle_admin_keywords(
    State(state): State<AppState>,
) -> Result<Json<KeywordDebugReport>, AppError> {
    if !state.config().server.is_development() {
        return Err(forbidden("admin routes are only available in development"));
    }
    Ok(Json(state.services.keywords.debug_report().await?))
}

async fn handle_debug_keyword_index(
    State(state): State<AppState>,
) -> Result<Json<KeywordIndex>, AppError> {
    require_development(&state)?;
    Ok(Json(state.services.keywords.index().await?))
}

#[derive(Deserialize)]
struct ResolveQuery {
    keyword: Option<String>,
    #[serde(rename = "docType")]
    doc_type: Option<String>,
}

async fn handle_debug_resolve(
    State(state): State<AppState>,
    Query(query): Query<ResolveQuery>,
) -> Result<Json<Option<ResolvedLink>>, AppError> {
    require_development(&state)?;
    let keyword = query
        .keyword
        .filter(|k| !k.trim().is_empty())
        .ok_or_else(|| bad_request("keyword parameter is required"))?;
    let resolved = state
        .services
        .keywords
        .resolve(&keyword, query.doc_type.as_deref())
        .await?;
    Ok(Json(resolved))
}

#[derive(Serialize)]
struct InvalidateResponse {
    status: &'static str,
    invalidated: Vec<String>,
}

async fn handle_invalidate_caches(
    State(state): State<AppState>,
) -> Result<Json<InvalidateResponse>, AppError> {
    require_development(&state)?;
    let invalidated = state.services.invalidate_all();
    info!(caches = ?invalidated, "invalidated all caches");
    Ok(Json(InvalidateResponse {
        status: "ok",
        invalidated,
    }))
}
