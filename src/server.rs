//!
//! tabularium HTTP server
//! ----------------------
//! Axum-based JSON API over the exploration orchestrator. The server renders
//! nothing: every endpoint returns the orchestrator's own projections
//! (listing, current view, last error) and the presentation layer decides
//! what to do with them.
//!
//! Responsibilities:
//! - Session issue/end with a simple cookie (or `x-session-token` header).
//! - Listing, selection and view endpoints delegating to the per-session
//!   explorer; leaf work runs on the blocking pool.
//! - Error mapping through `ExploreError::http_status`.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info};
use uuid::Uuid;

use crate::config::{Config, SourceKind};
use crate::drive::DriveClient;
use crate::error::ExploreError;
use crate::explorer::{Explorer, ExplorerCaches, ExplorerFactory};
use crate::local::LocalFolderSource;
use crate::session::SessionManager;
use crate::sources::{ContentFetcher, FileLister, TabularParser};
use crate::tables::AutoParser;

const SESSION_COOKIE: &str = "tabularium_session";

/// Shared server state injected into all handlers.
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionManager>,
    pub factory: Arc<ExplorerFactory>,
}

/// Start the HTTP server with the given configuration: wires the configured
/// source and parser into an explorer factory and mounts all routes.
pub async fn run_with_config(cfg: Config) -> anyhow::Result<()> {
    let caches = ExplorerCaches::new();
    let (lister, fetcher): (Arc<dyn FileLister>, Arc<dyn ContentFetcher>) = match cfg.source {
        SourceKind::Local => {
            std::fs::create_dir_all(&cfg.local_root)
                .with_context(|| format!("creating local root '{}'", cfg.local_root))?;
            let src = Arc::new(LocalFolderSource::new(&cfg.local_root));
            (src.clone() as Arc<dyn FileLister>, src as Arc<dyn ContentFetcher>)
        }
        SourceKind::Drive => {
            let client = Arc::new(DriveClient::new(&cfg.drive_base_url, cfg.drive_token.clone())?);
            (client.clone() as Arc<dyn FileLister>, client as Arc<dyn ContentFetcher>)
        }
    };
    let parser: Arc<dyn TabularParser> = Arc::new(AutoParser);
    let factory = ExplorerFactory::new(
        lister,
        fetcher,
        parser,
        caches,
        cfg.filter.clone(),
        cfg.listing_ttl,
        cfg.content_ttl,
    );
    let state = AppState {
        sessions: Arc::new(SessionManager::new(cfg.session_ttl)),
        factory: Arc::new(factory),
    };

    let app = Router::new()
        .route("/", get(|| async { "tabularium ok" }))
        .route("/session", post(open_session))
        .route("/session/end", post(end_session))
        .route("/files", get(list_files))
        .route("/files/refresh", post(refresh_files))
        .route("/select", post(select_file))
        .route("/deselect", post(deselect))
        .route("/view", get(view))
        .with_state(state);

    let addr: SocketAddr = format!("0.0.0.0:{}", cfg.http_port).parse()?;
    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn parse_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    let cookie = headers.get("cookie").or_else(|| headers.get("Cookie"))?;
    let s = cookie.to_str().ok()?;
    for part in s.split(';') {
        let p = part.trim();
        if let Some(eq) = p.find('=') {
            let (k, v) = p.split_at(eq);
            if k == name {
                return Some(v[1..].to_string());
            }
        }
    }
    None
}

fn session_token(headers: &HeaderMap) -> Option<String> {
    parse_cookie(headers, SESSION_COOKIE)
        .or_else(|| headers.get("x-session-token").and_then(|v| v.to_str().ok()).map(|s| s.to_string()))
}

fn set_session_cookie(token: &str) -> HeaderValue {
    HeaderValue::from_str(&format!("{}={}; HttpOnly; SameSite=Strict; Path=/", SESSION_COOKIE, token))
        .unwrap_or_else(|_| HeaderValue::from_static(""))
}

fn error_response(e: &ExploreError) -> (StatusCode, Json<serde_json::Value>) {
    let code = StatusCode::from_u16(e.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (code, Json(json!({"status": "error", "error": e})))
}

fn no_session_response() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({"status": "error", "error": {"type": "no_session", "message": "open a session first"}})),
    )
}

fn resolve_session(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<Arc<Mutex<Explorer>>, (StatusCode, Json<serde_json::Value>)> {
    let Some(token) = session_token(headers) else { return Err(no_session_response()) };
    state.sessions.validate(&token).ok_or_else(no_session_response)
}

// Leaf calls block on network and parsing; run them on the blocking pool so
// the async workers stay free.
async fn on_explorer<T, F>(ex: Arc<Mutex<Explorer>>, f: F) -> Result<T, (StatusCode, Json<serde_json::Value>)>
where
    T: Send + 'static,
    F: FnOnce(&mut Explorer) -> T + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let mut g = ex.lock();
        f(&mut g)
    })
    .await
    .map_err(|e| {
        error!("explorer task panicked: {}", e);
        error_response(&ExploreError::internal(e))
    })
}

async fn open_session(State(state): State<AppState>) -> impl IntoResponse {
    let token = state.sessions.issue(state.factory.build());
    let mut headers = HeaderMap::new();
    headers.insert("Set-Cookie", set_session_cookie(&token));
    info!(target: "tabularium::server", "session opened, {} live", state.sessions.len());
    (StatusCode::OK, headers, Json(json!({"status": "ok", "token": token})))
}

async fn end_session(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    let removed = session_token(&headers).map(|t| state.sessions.end(&t)).unwrap_or(false);
    (StatusCode::OK, Json(json!({"status": "ok", "removed": removed})))
}

async fn list_files(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    listing_reply(state, headers, false).await
}

async fn refresh_files(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    listing_reply(state, headers, true).await
}

async fn listing_reply(
    state: AppState,
    headers: HeaderMap,
    refresh: bool,
) -> (StatusCode, Json<serde_json::Value>) {
    let ex = match resolve_session(&state, &headers) {
        Ok(ex) => ex,
        Err(resp) => return resp,
    };
    let result = on_explorer(ex, move |g| {
        let listed = if refresh { g.refresh_listing() } else { g.list_files() };
        (listed, g.last_listing().to_vec())
    })
    .await;
    match result {
        Ok((Ok(files), _)) => (StatusCode::OK, Json(json!({"status": "ok", "files": files}))),
        // A transient listing failure keeps the previous listing usable
        Ok((Err(e), previous)) => {
            let code = StatusCode::from_u16(e.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            (code, Json(json!({"status": "error", "error": e, "files": previous})))
        }
        Err(resp) => resp,
    }
}

#[derive(Debug, Deserialize)]
struct SelectPayload {
    id: String,
}

async fn select_file(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<SelectPayload>,
) -> impl IntoResponse {
    let ex = match resolve_session(&state, &headers) {
        Ok(ex) => ex,
        Err(resp) => return resp,
    };
    let req = Uuid::new_v4();
    info!(target: "tabularium::server", "select req={} id='{}'", req, payload.id);
    let id = payload.id.clone();
    let result = on_explorer(ex, move |g| g.select_file(&id).map(|_| g.current_view())).await;
    match result {
        Ok(Ok(view)) => (StatusCode::OK, Json(json!({"status": "ok", "view": view}))),
        Ok(Err(e)) => {
            info!(target: "tabularium::server", "select req={} failed: {}", req, e);
            error_response(&e)
        }
        Err(resp) => resp,
    }
}

async fn deselect(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    let ex = match resolve_session(&state, &headers) {
        Ok(ex) => ex,
        Err(resp) => return resp,
    };
    match on_explorer(ex, |g| g.deselect()).await {
        Ok(()) => (StatusCode::OK, Json(json!({"status": "ok"}))),
        Err(resp) => resp,
    }
}

async fn view(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    let ex = match resolve_session(&state, &headers) {
        Ok(ex) => ex,
        Err(resp) => return resp,
    };
    let result = on_explorer(ex, |g| {
        (g.phase(), g.current_view(), g.last_error().cloned())
    })
    .await;
    match result {
        Ok((phase, view, last_error)) => (
            StatusCode::OK,
            Json(json!({"status": "ok", "phase": phase, "view": view, "last_error": last_error})),
        ),
        Err(resp) => resp,
    }
}
