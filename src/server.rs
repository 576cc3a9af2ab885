//! Router glue: resolves request paths under a root directory, streams
//! audio and video through [`Ranged`] and hands everything else to a static
//! file service.

use std::net::SocketAddr;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::extract::{Request, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use tokio::net::TcpListener;
use tower::ServiceExt;
use tower_http::services::ServeDir;
use tracing::{debug, error, info, warn};

use crate::config::{ChunkCeilings, ServerConfig};
use crate::{health, KnownSize, RangeError, Ranged, RangedResponse};

struct AppState {
    root: PathBuf,
    ceilings: ChunkCeilings,
    static_files: ServeDir,
}

pub fn router(config: &ServerConfig) -> Router {
    let state = Arc::new(AppState {
        root: config.root.clone(),
        ceilings: config.ceilings,
        static_files: ServeDir::new(&config.root),
    });

    Router::new()
        .route("/_health", get(health_check))
        .route("/", get(serve_path))
        .route("/{*path}", get(serve_path))
        .with_state(state)
}

/// Binds `0.0.0.0:<port>` and serves until Ctrl-C.
pub async fn serve(config: ServerConfig) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    run(listener, config).await
}

pub async fn run(listener: TcpListener, config: ServerConfig) -> Result<()> {
    let report = health::spawn_memory_report(Duration::from_secs(config.health_interval_secs));

    info!(
        addr = %listener.local_addr()?,
        root = %config.root.display(),
        audio_ceiling = config.ceilings.audio.get(),
        video_ceiling = config.ceilings.video.get(),
        "server started"
    );

    axum::serve(listener, router(&config))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    if let Some(report) = report {
        report.abort();
    }
    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("received Ctrl-C, shutting down"),
        Err(e) => {
            error!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    }
}

async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn serve_path(State(state): State<Arc<AppState>>, request: Request) -> Response {
    let Some(relative) = resolve_request_path(request.uri().path()) else {
        warn!(path = request.uri().path(), "rejected request path");
        return (StatusCode::BAD_REQUEST, "Bad Request").into_response();
    };

    let mime = mime_guess::from_path(&relative).first_or_octet_stream();
    let ceiling = match state.ceilings.for_mime(&mime) {
        Some(ceiling) if relative.file_name().is_some() => ceiling,
        _ => return serve_static(&state, request).await,
    };

    let path = state.root.join(&relative);
    // a directory named like media, e.g. `clips.mp4/`
    if tokio::fs::metadata(&path).await.is_ok_and(|metadata| metadata.is_dir()) {
        return serve_static(&state, request).await;
    }

    let range = request.headers().get(header::RANGE).cloned();
    debug!(path = %path.display(), %mime, ?range, "media request");

    match stream_media(&path, range, mime.as_ref(), ceiling).await {
        Ok(response) => response.into_response(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "media request failed");
            e.into_response()
        }
    }
}

async fn stream_media(
    path: &Path,
    range: Option<header::HeaderValue>,
    mime: &str,
    ceiling: std::num::NonZeroU64,
) -> Result<RangedResponse, RangeError> {
    let body = KnownSize::open(path).await?;
    Ranged::new(range, body, mime, ceiling).respond().await
}

async fn serve_static(state: &AppState, request: Request) -> Response {
    match state.static_files.clone().oneshot(request).await {
        Ok(response) => response.into_response(),
        Err(never) => match never {},
    }
}

/// Percent-decodes a URI path and turns it into a path relative to the
/// serving root. `None` if it would leave the root.
pub fn resolve_request_path(uri_path: &str) -> Option<PathBuf> {
    let decoded = urlencoding::decode(uri_path).ok()?;
    if decoded.contains('\0') {
        return None;
    }

    let mut relative = PathBuf::new();
    for component in Path::new(decoded.trim_start_matches('/')).components() {
        match component {
            Component::Normal(part) => relative.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(relative)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_request_path() {
        let tests = [
            ("/song.mp3", Some("song.mp3")),
            ("/media/clip.mp4", Some("media/clip.mp4")),
            ("/my%20song.mp3", Some("my song.mp3")),
            ("/./a/./b.mp4", Some("a/b.mp4")),
            ("/", Some("")),
            ("/../secret.mp3", None),
            ("/a/../../secret.mp3", None),
            ("/%2e%2e/secret.mp3", None),
            ("//etc/passwd", Some("etc/passwd")),
            ("/bad%00.mp3", None),
            ("/bad%ff.mp3", None),
        ];

        for (i, (uri_path, expected)) in tests.iter().enumerate() {
            let resolved = resolve_request_path(uri_path);
            assert_eq!(expected.map(PathBuf::from), resolved, "failed to resolve #{i}: {uri_path}");
        }
    }
}
