//! TubeFetch API server.
//!
//! Exposes the download negotiation and streaming layer over HTTP: metadata
//! lookup, rendition listing, audio/video download streams, catalog search,
//! and autocomplete suggestions. Every substantive capability is delegated
//! to the configured yt-dlp binary; this process owns request validation,
//! format selection, response headers, and byte relay.

use std::{net::SocketAddr, sync::Arc};

use anyhow::{Context, Result};
use axum::{
    Json, Router,
    body::Body,
    extract::{Query, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tokio::signal;
use tubefetch_tools::{
    config::{RuntimeConfig, load_runtime_config},
    extractor::MediaExtractor,
    filename::{MediaKind, attachment_filename},
    resolver::{ResolveError, VideoMetadata, VideoResolver, is_valid_video_url},
    search::{SearchClient, SearchHit, suggestion_titles},
    security::ensure_not_root,
    selector::{DownloadPlan, QualitySelector, select_audio, select_video},
};

const SEARCH_RESULTS: usize = 20;
const GET_SEARCH_RESULTS: usize = 10;
const TRENDING_RESULTS: usize = 20;
const SUGGESTION_POOL: usize = 10;
/// Queries shorter than this return no suggestions at all.
const MIN_SUGGESTION_QUERY: usize = 2;

#[derive(Clone)]
struct AppState {
    config: Arc<RuntimeConfig>,
    resolver: VideoResolver,
    extractor: MediaExtractor,
    search: SearchClient,
}

impl AppState {
    fn new(config: Arc<RuntimeConfig>) -> Self {
        let resolver = VideoResolver::new(config.ytdlp_bin.clone());
        let extractor = MediaExtractor::new(
            config.ytdlp_bin.clone(),
            config.ffmpeg_location.clone(),
        );
        let search = SearchClient::new(config.ytdlp_bin.clone());
        Self {
            config,
            resolver,
            extractor,
            search,
        }
    }

    /// Resolves `url` and maps collaborator failures onto response codes:
    /// 400 for bad input, 404 when the video itself is gone, 500 otherwise.
    async fn resolve(&self, url: &str) -> ApiResult<VideoMetadata> {
        self.resolver.resolve(url).await.map_err(|err| match &err {
            ResolveError::InvalidUrl => ApiError::bad_request("invalid video URL"),
            _ if err.is_unavailable() => ApiError::not_found("video is unavailable"),
            _ => {
                eprintln!("resolver failure: {err}");
                ApiError::internal("could not resolve video")
            }
        })
    }
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, "application/json".parse().unwrap());
        let body = serde_json::json!({
            "error": self.message,
        });
        (self.status, headers, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

#[tokio::main]
async fn main() -> Result<()> {
    ensure_not_root("tubefetch backend")?;

    let config = load_runtime_config().context("loading runtime configuration")?;
    let addr = SocketAddr::new(
        config.host.parse().context("parsing listen host")?,
        config.port,
    );
    let state = AppState::new(Arc::new(config));

    let app = Router::new()
        .route("/health", get(health))
        .route("/trending", get(trending))
        .route("/search", get(search_get))
        .route("/api/video-info", post(video_info))
        .route("/api/formats", post(list_formats))
        .route("/api/download-mp3", post(download_mp3))
        .route("/api/download-mp4", post(download_mp4))
        .route("/api/search", post(search))
        .route("/api/search-suggestions", get(search_suggestions))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding to {}", addr))?;
    println!("API server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("running API server")?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = signal::ctrl_c().await {
        eprintln!("Failed to install Ctrl+C handler: {}", err);
    }
}

#[derive(Deserialize)]
struct UrlRequest {
    url: Option<String>,
}

#[derive(Deserialize)]
struct DownloadRequest {
    url: Option<String>,
    #[serde(default = "default_quality")]
    quality: String,
}

fn default_quality() -> String {
    "highest".to_owned()
}

#[derive(Deserialize)]
struct SearchRequest {
    query: Option<String>,
}

#[derive(Deserialize)]
struct SuggestionParams {
    q: Option<String>,
}

#[derive(Deserialize)]
struct ListParams {
    q: Option<String>,
    #[serde(rename = "maxResults")]
    max_results: Option<usize>,
}

#[derive(Serialize)]
struct HealthPayload {
    status: &'static str,
    message: &'static str,
}

#[derive(Serialize)]
struct VideoInfoPayload {
    title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    thumbnail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    author: Option<String>,
    #[serde(rename = "viewCount", skip_serializing_if = "Option::is_none")]
    view_count: Option<i64>,
}

#[derive(Serialize)]
struct FormatPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    quality: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    container: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    size: Option<i64>,
}

#[derive(Serialize)]
struct VideoListPayload {
    videos: Vec<SearchHit>,
}

async fn health() -> Json<HealthPayload> {
    Json(HealthPayload {
        status: "OK",
        message: "Server is running",
    })
}

async fn video_info(
    State(state): State<AppState>,
    Json(request): Json<UrlRequest>,
) -> ApiResult<Json<VideoInfoPayload>> {
    let url = required_video_url(request.url.as_deref())?;
    let metadata = state.resolve(url).await?;
    Ok(Json(VideoInfoPayload {
        title: metadata.title,
        thumbnail: metadata.thumbnail,
        duration: metadata.duration,
        author: metadata.author,
        view_count: metadata.view_count,
    }))
}

async fn list_formats(
    State(state): State<AppState>,
    Json(request): Json<UrlRequest>,
) -> ApiResult<Json<Vec<FormatPayload>>> {
    let url = required_video_url(request.url.as_deref())?;
    let metadata = state.resolve(url).await?;
    let formats = metadata
        .renditions
        .into_iter()
        .filter(|r| r.has_video && r.has_audio)
        .map(|r| FormatPayload {
            quality: r.quality_label,
            container: r.container,
            size: r.size,
        })
        .collect();
    Ok(Json(formats))
}

async fn download_mp3(
    State(state): State<AppState>,
    Json(request): Json<UrlRequest>,
) -> ApiResult<Response> {
    let url = required_video_url(request.url.as_deref())?;
    let metadata = state.resolve(url).await?;
    stream_download(&state, url, &metadata.title, select_audio(), MediaKind::Audio)
}

async fn download_mp4(
    State(state): State<AppState>,
    Json(request): Json<DownloadRequest>,
) -> ApiResult<Response> {
    let url = required_video_url(request.url.as_deref())?;
    let metadata = state.resolve(url).await?;

    let selector = QualitySelector::parse(&request.quality);
    let plan = select_video(&metadata.renditions, &selector)
        .map_err(|_| ApiError::not_found("requested quality not available"))?;

    stream_download(&state, url, &metadata.title, plan, MediaKind::Video)
}

/// Starts the extractor and relays its stdout as the response body. Headers
/// are fully set before the body is handed over; once the first chunk is
/// written, failures can only close the connection, which the extraction
/// stream logs server-side.
fn stream_download(
    state: &AppState,
    url: &str,
    title: &str,
    plan: DownloadPlan,
    kind: MediaKind,
) -> ApiResult<Response> {
    let stream = state.extractor.extract(url, &plan).map_err(|err| {
        eprintln!("failed to start extraction: {err}");
        ApiError::internal("could not start media extraction")
    })?;

    let filename = attachment_filename(title, kind, &state.config.filename);

    let mut response = Body::from_stream(stream).into_response();
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(kind.content_type()),
    );
    headers.insert(header::CONTENT_DISPOSITION, content_disposition(&filename));
    Ok(response)
}

/// Attachment header for the sanitized filename. The sanitizer already
/// removed quotes and backslashes; non-ASCII names use the RFC 5987
/// `filename*` form because header values must be visible ASCII.
fn content_disposition(filename: &str) -> HeaderValue {
    let plain = format!("attachment; filename=\"{filename}\"");
    if let Ok(value) = HeaderValue::from_str(&plain) {
        return value;
    }
    let encoded = urlencoding::encode(filename);
    HeaderValue::from_str(&format!("attachment; filename*=UTF-8''{encoded}"))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"))
}

fn required_video_url(url: Option<&str>) -> ApiResult<&str> {
    url.filter(|candidate| is_valid_video_url(candidate))
        .ok_or_else(|| ApiError::bad_request("invalid video URL"))
}

async fn search(
    State(state): State<AppState>,
    Json(request): Json<SearchRequest>,
) -> ApiResult<Json<Vec<SearchHit>>> {
    let query = request
        .query
        .filter(|q| !q.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("search query required"))?;

    let hits = run_search(&state, &query, SEARCH_RESULTS).await?;
    Ok(Json(hits))
}

async fn search_get(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<VideoListPayload>> {
    let query = params
        .q
        .filter(|q| !q.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("search query required"))?;
    let max_results = params.max_results.unwrap_or(GET_SEARCH_RESULTS);

    let videos = run_search(&state, &query, max_results).await?;
    Ok(Json(VideoListPayload { videos }))
}

async fn trending(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<VideoListPayload>> {
    let max_results = params.max_results.unwrap_or(TRENDING_RESULTS);
    // The catalog has no dedicated trending feed; a fixed keyword search is
    // the closest approximation it offers.
    let videos = run_search(&state, "trending", max_results).await?;
    Ok(Json(VideoListPayload { videos }))
}

async fn run_search(state: &AppState, query: &str, max_results: usize) -> ApiResult<Vec<SearchHit>> {
    state.search.search(query, max_results).await.map_err(|err| {
        eprintln!("catalog search failure: {err:#}");
        ApiError::internal("catalog search failed")
    })
}

/// Suggestions never surface upstream errors: short queries get an empty
/// list, collaborator failures degrade to echoing the query back.
async fn search_suggestions(
    State(state): State<AppState>,
    Query(params): Query<SuggestionParams>,
) -> Json<Vec<String>> {
    let Some(query) = params
        .q
        .filter(|q| q.chars().count() >= MIN_SUGGESTION_QUERY)
    else {
        return Json(Vec::new());
    };

    match state.search.search(&query, SUGGESTION_POOL).await {
        Ok(hits) => Json(suggestion_titles(
            &query,
            hits.iter().map(|hit| hit.title.as_str()),
        )),
        Err(err) => {
            eprintln!("suggestion search failure: {err:#}");
            Json(vec![query])
        }
    }
}
