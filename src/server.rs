//! Local caching proxy that hosts the cache manager in front of the report
//! application.
//!
//! Every request the browser sends to the proxy becomes a fetch event for the
//! manager. A few control routes under `/__offline/` stand in for the page's
//! `postMessage` and the platform's push and notification plumbing.

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response as HttpResponse};
use axum::routing::{get, post};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};

use crate::config::AppConfig;
use crate::event::Notification;
use crate::fetch::{Fetcher, HttpFetcher, build_http_client, is_hop_by_hop};
use crate::request::{Request, RequestMode, Response, parse_url, resolve};
use crate::storage::{Cache, CacheStorage, DiskCacheStorage};
use crate::worker::{NoProgress, OfflineCacheManager, WorkerState};

/// Largest request body forwarded upstream (PDF uploads included).
const MAX_BODY_BYTES: usize = 32 * 1024 * 1024;

type SharedManager<S, F> = Arc<OfflineCacheManager<S, F>>;

#[derive(Serialize)]
struct NamespaceStatus {
    name: String,
    entries: usize,
}

#[derive(Serialize)]
struct StatusResponse {
    state: WorkerState,
    skip_waiting: bool,
    clients_claimed: bool,
    core_cache: String,
    audio_cache: String,
    namespaces: Vec<NamespaceStatus>,
}

#[derive(Serialize)]
struct SyncResponse {
    tag: String,
    recognized: bool,
}

#[derive(Serialize)]
struct ClickResponse {
    open: Option<String>,
}

/// Derives the request mode from fetch metadata, falling back to the
/// `Accept` header for clients that do not send it.
fn request_mode(method: &Method, headers: &HeaderMap) -> RequestMode {
    match headers.get("sec-fetch-mode").and_then(|v| v.to_str().ok()) {
        Some("navigate") => RequestMode::Navigate,
        Some("no-cors") => RequestMode::NoCors,
        Some("cors") => RequestMode::Cors,
        Some(_) => RequestMode::SameOrigin,
        None => {
            let accepts_html = headers
                .get("accept")
                .and_then(|v| v.to_str().ok())
                .is_some_and(|accept| accept.contains("text/html"));
            if method == Method::GET && accepts_html {
                RequestMode::Navigate
            } else {
                RequestMode::SameOrigin
            }
        }
    }
}

fn into_http(response: Response) -> HttpResponse {
    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::BAD_GATEWAY);
    let mut builder = axum::http::Response::builder().status(status);
    for (name, value) in &response.headers {
        if !is_hop_by_hop(name) {
            builder = builder.header(name.as_str(), value.as_str());
        }
    }
    builder
        .body(Body::from(response.body))
        .unwrap_or_else(|e| (StatusCode::BAD_GATEWAY, e.to_string()).into_response())
}

async fn proxy<S: CacheStorage, F: Fetcher>(
    State(manager): State<SharedManager<S, F>>,
    request: axum::extract::Request,
) -> HttpResponse {
    let (parts, body) = request.into_parts();
    let body = match axum::body::to_bytes(body, MAX_BODY_BYTES).await {
        Ok(body) => body,
        Err(e) => return (StatusCode::PAYLOAD_TOO_LARGE, e.to_string()).into_response(),
    };

    let target = parts.uri.path_and_query().map_or("/", |pq| pq.as_str());
    let url = match resolve(manager.origin(), target) {
        Ok(url) => url,
        Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    };

    let headers = parts
        .headers
        .iter()
        .filter_map(|(k, v)| Some((k.as_str().to_string(), v.to_str().ok()?.to_string())))
        .collect();

    let request = Request {
        method: parts.method.as_str().to_string(),
        url,
        mode: request_mode(&parts.method, &parts.headers),
        headers,
        body,
    };

    match manager.handle_fetch(request).await {
        Ok(response) => into_http(response),
        Err(e) => {
            log::warn!("{} {target} failed: {e}", parts.method);
            (StatusCode::BAD_GATEWAY, e.to_string()).into_response()
        }
    }
}

async fn status<S: CacheStorage, F: Fetcher>(
    State(manager): State<SharedManager<S, F>>,
) -> HttpResponse {
    let result: crate::Result<Vec<NamespaceStatus>> = async {
        let mut namespaces = Vec::new();
        for name in manager.storage().keys().await? {
            if let Some(cache) = manager.storage().lookup(&name).await? {
                let entries = cache.keys().await?.len();
                namespaces.push(NamespaceStatus { name, entries });
            }
        }
        Ok(namespaces)
    }
    .await;

    match result {
        Ok(namespaces) => axum::Json(StatusResponse {
            state: manager.state(),
            skip_waiting: manager.skip_waiting(),
            clients_claimed: manager.clients_claimed(),
            core_cache: manager.config().core_cache_name.clone(),
            audio_cache: manager.config().audio_cache_name.clone(),
            namespaces,
        })
        .into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

async fn message<S: CacheStorage, F: Fetcher>(
    State(manager): State<SharedManager<S, F>>,
    payload: String,
) -> HttpResponse {
    match manager.handle_message(&payload, &NoProgress).await {
        Ok(Some(stats)) => axum::Json(stats).into_response(),
        Ok(None) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

async fn sync<S: CacheStorage, F: Fetcher>(
    State(manager): State<SharedManager<S, F>>,
    tag: String,
) -> axum::Json<SyncResponse> {
    let recognized = manager.sync(&tag);
    axum::Json(SyncResponse { tag, recognized })
}

async fn push<S: CacheStorage, F: Fetcher>(
    State(manager): State<SharedManager<S, F>>,
    payload: String,
) -> axum::Json<Notification> {
    let payload = (!payload.is_empty()).then_some(payload.as_str());
    axum::Json(manager.push(payload))
}

async fn notification_click<S: CacheStorage, F: Fetcher>(
    State(manager): State<SharedManager<S, F>>,
    action: String,
) -> axum::Json<ClickResponse> {
    let action = (!action.is_empty()).then_some(action.as_str());
    axum::Json(ClickResponse {
        open: manager.notification_click(action),
    })
}

/// Builds the proxy router around a manager.
pub fn router<S: CacheStorage, F: Fetcher>(manager: SharedManager<S, F>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let control = Router::new()
        .route("/__offline/status", get(status::<S, F>))
        .route("/__offline/message", post(message::<S, F>))
        .route("/__offline/sync", post(sync::<S, F>))
        .route("/__offline/push", post(push::<S, F>))
        .route("/__offline/notificationclick", post(notification_click::<S, F>))
        .layer(cors);

    Router::new()
        .merge(control)
        .fallback(proxy::<S, F>)
        .with_state(manager)
}

/// Installs and activates the configured version, then serves the proxy
/// until Ctrl-C.
///
/// # Errors
///
/// Returns an error if the origin is invalid, the cache directory cannot be
/// created, activation fails or the listener cannot bind.
pub async fn run(config: &AppConfig) -> crate::Result<()> {
    let origin = parse_url(&config.server.origin)?;
    let storage = DiskCacheStorage::new(&config.paths.cache_dir).await?;
    let fetcher = HttpFetcher::new(build_http_client()?, origin.clone());
    let manager = Arc::new(OfflineCacheManager::new(
        config.cache.clone(),
        origin,
        storage,
        fetcher,
    ));

    let outcome = manager.install().await;
    log::info!(
        "Install: {} cached, {} failed",
        outcome.cached,
        outcome.failed
    );
    let deleted = manager.activate().await?;
    if !deleted.is_empty() {
        log::info!("Removed old caches: {}", deleted.join(", "));
    }

    let listener =
        tokio::net::TcpListener::bind((config.server.host.as_str(), config.server.port)).await?;
    log::info!(
        "Serving {} on http://{}:{}",
        config.server.origin,
        config.server.host,
        config.server.port
    );

    axum::serve(listener, router(Arc::clone(&manager)))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            log::info!("Shutting down");
        })
        .await?;

    manager.settle().await;
    Ok(())
}
