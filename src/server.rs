use crate::blobs::{BlobHandler, MemBlobHandler};
use crate::chart::fetch::UpstreamFetcher;
use crate::chart::rewrite::RewriteOptions;
use crate::config::Config;
use crate::error::{ProxyError, Result};
use crate::registry::manifest::{spawn_eviction_loop, ManifestStore};
use crate::registry::{
    blob, catalog, is_blob, is_catalog, is_manifest, is_tags, is_v2_probe, manifest,
    path_segments, repository_name, tags, RegError,
};
use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::error;

const PROJECT_INFO_URL: &str = "https://helm.sh/docs/topics/registries/";
const HARBOR_VERSION: &str = "v2.7.0-864aca34";

#[derive(Clone)]
pub struct AppState {
    pub manifests: Arc<ManifestStore>,
    pub blobs: Arc<dyn BlobHandler>,
    pub config: Arc<Config>,
}

impl AppState {
    /// Wire up the default state: in-memory blobs, one manifest store, one
    /// upstream fetcher.
    pub fn new(config: Config, fetcher: UpstreamFetcher) -> Self {
        let config = Arc::new(config);
        let blobs: Arc<dyn BlobHandler> = Arc::new(MemBlobHandler::new());
        let manifests = Arc::new(ManifestStore::new(blobs.clone(), fetcher, config.clone()));
        AppState {
            manifests,
            blobs,
            config,
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(home))
        .route("/api/version", get(api_version))
        .route("/api/systeminfo", get(system_info))
        .route("/api/v2.0/systeminfo", get(system_info))
        .route("/v2", get(v2_probe))
        .route("/v2/", get(v2_probe))
        .route(
            "/v2/*path",
            get(dispatch_get).head(dispatch_head).fallback(method_unknown),
        )
        .fallback(unknown_route)
        .with_state(state)
}

/// Start the proxy. Returns the serving task; the eviction loop runs until
/// the cancellation token fires.
pub async fn start_server(
    config: Config,
    shutdown: CancellationToken,
) -> Result<tokio::task::JoinHandle<()>> {
    let addr = format!("0.0.0.0:{}", config.port);
    let use_tls = config.use_tls;
    let cert_file = config.cert_file.clone();
    let key_file = config.key_file.clone();

    let fetcher = UpstreamFetcher::new(&config)?;
    let state = AppState::new(config, fetcher);
    let _eviction = spawn_eviction_loop(state.manifests.clone(), shutdown.child_token());
    let app = build_router(state);

    let handle = if use_tls {
        let tls = crate::tls::server_tls_config(&cert_file, &key_file).await?;
        let listener = std::net::TcpListener::bind(&addr)
            .map_err(|e| ProxyError::Config(format!("failed to bind {addr}: {e}")))?;
        tracing::info!(addr = %addr, "listening HTTP over TLS");
        tokio::spawn(async move {
            if let Err(e) = axum_server::from_tcp_rustls(listener, tls)
                .serve(app.into_make_service())
                .await
            {
                error!("server error: {e}");
            }
        })
    } else {
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| ProxyError::Config(format!("failed to bind {addr}: {e}")))?;
        tracing::info!(addr = %addr, "listening HTTP");
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(shutdown.cancelled_owned())
                .await
            {
                error!("server error: {e}");
            }
        })
    };
    Ok(handle)
}

/// Dispatch for everything under `/v2/`. Axum path captures only match
/// single segments, while upstream repository paths are arbitrarily deep, so
/// the operation is picked off the *trailing* segments by hand.
async fn route(
    state: &AppState,
    uri: &Uri,
    headers: &HeaderMap,
    head: bool,
) -> Result<Response, RegError> {
    let path = uri.path();
    let segments = path_segments(path);
    let query = parse_query(uri.query());

    if is_blob(&segments) {
        let repo = repository_name(&segments, 2);
        let target = segments.last().copied().unwrap_or_default();
        return blob::serve_blob(state.blobs.as_ref(), &repo, target, !head).await;
    }
    if is_manifest(&segments) {
        let repo = repository_name(&segments, 2);
        let reference = segments.last().copied().unwrap_or_default();
        let rewrite = rewrite_options(&state.config, &query, headers);
        return if head {
            manifest::head_manifest(&state.manifests, &repo, reference, &rewrite).await
        } else {
            manifest::get_manifest(&state.manifests, &repo, reference, &rewrite).await
        };
    }
    if is_tags(&segments) {
        if head {
            return Err(RegError::method_unknown());
        }
        let repo = repository_name(&segments, 2);
        let rewrite = rewrite_options(&state.config, &query, headers);
        return tags::list_tags(&state.manifests, &repo, &query, &rewrite).await;
    }
    if is_catalog(&segments) {
        if head {
            return Err(RegError::method_unknown());
        }
        let prefix = repository_name(&segments, 1);
        return catalog::list_catalog(&state.manifests, &prefix, &query).await;
    }
    if is_v2_probe(&segments) {
        return Ok(v2_probe_response());
    }
    Err(RegError::unknown_url(path))
}

async fn dispatch_get(
    State(state): State<AppState>,
    uri: Uri,
    headers: HeaderMap,
) -> Result<Response, RegError> {
    log_reg_error("GET", &uri, route(&state, &uri, &headers, false).await)
}

async fn dispatch_head(
    State(state): State<AppState>,
    uri: Uri,
    headers: HeaderMap,
) -> Result<Response, RegError> {
    log_reg_error("HEAD", &uri, route(&state, &uri, &headers, true).await)
}

fn log_reg_error(
    method: &str,
    uri: &Uri,
    result: Result<Response, RegError>,
) -> Result<Response, RegError> {
    if let Err(err) = &result {
        tracing::warn!(
            method = %method,
            uri = %uri,
            status = err.status.as_u16(),
            code = %err.code,
            message = %err.message,
            "request failed"
        );
    }
    result
}

async fn method_unknown() -> RegError {
    RegError::method_unknown()
}

async fn unknown_route(uri: Uri) -> RegError {
    RegError::unknown_url(uri.path())
}

fn v2_probe_response() -> Response {
    (
        StatusCode::OK,
        [("Docker-Distribution-API-Version", "registry/2.0")],
    )
        .into_response()
}

async fn v2_probe() -> Response {
    v2_probe_response()
}

async fn home() -> Response {
    Response::builder()
        .status(StatusCode::FOUND)
        .header(header::LOCATION, PROJECT_INFO_URL)
        .body(Body::empty())
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

#[derive(Serialize)]
struct ApiVersion {
    version: &'static str,
}

async fn api_version() -> impl IntoResponse {
    Json(ApiVersion { version: "v2.0" })
}

#[derive(Serialize)]
struct SystemInfo {
    harbor_version: &'static str,
    current_time: DateTime<Utc>,
}

/// Harbor-compatible probe; some clients check it before pulling.
async fn system_info() -> impl IntoResponse {
    Json(SystemInfo {
        harbor_version: HARBOR_VERSION,
        current_time: Utc::now(),
    })
}

fn parse_query(query: Option<&str>) -> HashMap<String, String> {
    match query {
        Some(query) => url::form_urlencoded::parse(query.as_bytes())
            .into_owned()
            .collect(),
        None => HashMap::new(),
    }
}

fn rewrite_options(
    config: &Config,
    query: &HashMap<String, String>,
    headers: &HeaderMap,
) -> RewriteOptions {
    let query_override = match query.get("rewrite").map(String::as_str) {
        Some("1") | Some("true") => Some(true),
        Some("0") | Some("false") => Some(false),
        _ => None,
    };
    let host = headers
        .get(header::HOST)
        .and_then(|value| value.to_str().ok());
    RewriteOptions::resolve(config, query_override, host)
}
