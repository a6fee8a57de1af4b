//! HTTP binding.
//!
//! Axum router over [`Viewer`]. Handlers stay thin: they ask the viewer what
//! to serve and write it out. Derivative generation is CPU-bound, so it runs
//! on tokio's blocking pool.
//!
//! | Route | Handler |
//! |---|---|
//! | `GET /api/items` | index snapshot as JSON |
//! | `GET /files/*path` | original file |
//! | `GET /thumbs/*path` | thumbnail derivative (when enabled) |
//! | `GET /display/*path` | display derivative (when enabled) |
//! | anything else | static front-end directory, or 404 |

use crate::derivative::ProfileKind;
use crate::serve::{Served, Viewer};
use axum::Router;
use axum::body::Body;
use axum::extract::{Path as UrlPath, Request, State};
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Invalid listen address {0}")]
    Address(String),
    #[error("Failed to bind {0}: {1}")]
    Bind(String, #[source] io::Error),
    #[error("HTTP server error: {0}")]
    Serve(#[from] io::Error),
}

#[derive(Clone)]
pub struct AppState {
    viewer: Arc<Viewer>,
}

/// Build the router. Derivative routes are mounted only when the viewer has
/// a derivative cache.
pub fn create_router(viewer: Arc<Viewer>, static_dir: Option<&Path>) -> Router {
    let mut routes = Router::new()
        .route("/api/items", get(items))
        .route("/files/*path", get(raw_file));
    if viewer.has_derivatives() {
        routes = routes
            .route("/thumbs/*path", get(thumb))
            .route("/display/*path", get(display));
    }
    let app = routes.with_state(AppState { viewer });

    let app = match static_dir {
        Some(dir) => app.fallback_service(ServeDir::new(dir)),
        None => app.fallback(not_found),
    };
    app.layer(TraceLayer::new_for_http())
}

/// Bind the listen socket.
pub async fn bind(host: &str, port: u16) -> Result<TcpListener, ServerError> {
    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .map_err(|_| ServerError::Address(format!("{host}:{port}")))?;
    TcpListener::bind(addr)
        .await
        .map_err(|e| ServerError::Bind(addr.to_string(), e))
}

/// `http://` URL of the address a listener actually bound, so port 0 shows
/// the port the OS picked.
pub fn local_url(listener: &TcpListener) -> Result<String, ServerError> {
    Ok(format!("http://{}", listener.local_addr()?))
}

/// Serve until `shutdown` resolves.
pub async fn run(
    listener: TcpListener,
    app: Router,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), ServerError> {
    if let Ok(url) = local_url(&listener) {
        info!("HTTP server listening on {}", url);
    }
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    info!("HTTP server shut down");
    Ok(())
}

async fn items(State(state): State<AppState>) -> Response {
    let snapshot = state.viewer.snapshot();
    Json(state.viewer.items(&snapshot)).into_response()
}

async fn raw_file(
    State(state): State<AppState>,
    UrlPath(path): UrlPath<String>,
    request: Request,
) -> Response {
    respond(state.viewer.raw_file(&path), request).await
}

async fn thumb(
    State(state): State<AppState>,
    UrlPath(path): UrlPath<String>,
    request: Request,
) -> Response {
    derivative(state, ProfileKind::Thumb, path, request).await
}

async fn display(
    State(state): State<AppState>,
    UrlPath(path): UrlPath<String>,
    request: Request,
) -> Response {
    derivative(state, ProfileKind::Display, path, request).await
}

async fn derivative(
    state: AppState,
    kind: ProfileKind,
    path: String,
    request: Request,
) -> Response {
    let viewer = state.viewer.clone();
    match tokio::task::spawn_blocking(move || viewer.derivative(kind, &path)).await {
        Ok(served) => respond(served, request).await,
        Err(e) => {
            warn!("derivative task failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn not_found() -> Response {
    (StatusCode::NOT_FOUND, "Not Found").into_response()
}

/// Write a [`Served`] answer. Files are streamed by [`ServeFile`], which also
/// answers range and conditional requests; the content type and cache
/// lifetime chosen by the viewer replace its defaults.
async fn respond(served: Served, request: Request) -> Response {
    let (path, content_type, max_age) = match served {
        Served::File {
            path,
            content_type,
            max_age,
        } => (path, content_type, max_age),
        Served::Forbidden => return (StatusCode::FORBIDDEN, "Forbidden").into_response(),
        Served::NotFound => return not_found().await,
    };

    let mut response = match ServeFile::new(&path).try_call(request).await {
        Ok(response) => response.map(Body::new),
        Err(e) => {
            warn!("failed to read {}: {}", path.display(), e);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };
    if response.status() == StatusCode::NOT_FOUND {
        return not_found().await;
    }

    if response.status().is_success() || response.status() == StatusCode::NOT_MODIFIED {
        let headers = response.headers_mut();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
        headers.insert(header::CACHE_CONTROL, cache_control(max_age));
    }
    response
}

fn cache_control(max_age: u32) -> HeaderValue {
    HeaderValue::try_from(format!("public, max-age={max_age}"))
        .unwrap_or_else(|_| HeaderValue::from_static("no-cache"))
}
