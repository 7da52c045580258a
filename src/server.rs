use crate::config::AppConfig;
use crate::data::{parse_snapshot, SnapshotSource};
use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tracing::{info, warn};

pub struct AppState {
    pub source: SnapshotSource,
}

pub fn router(config: &AppConfig) -> Router {
    let state = Arc::new(AppState {
        source: SnapshotSource::parse(&config.data.source),
    });

    Router::new()
        .route("/data.json", get(snapshot_handler))
        .fallback_service(ServeDir::new(&config.server.root))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn start_server(config: AppConfig) -> Result<()> {
    let port = config.server.port;
    let addr = SocketAddr::from(([127, 0, 0, 1], port));

    let app = router(&config);

    info!(%addr, root = %config.server.root.display(), "serving console");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app).await?;
    Ok(())
}

// Re-read and validate on every request so edits show up on reload. The
// bytes sent are the bytes that were validated.
async fn snapshot_handler(State(state): State<Arc<AppState>>) -> Response {
    let SnapshotSource::File(path) = &state.source else {
        return (StatusCode::NOT_FOUND, "snapshot is not served locally").into_response();
    };

    let body = match tokio::fs::read(path).await {
        Ok(body) => body,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "snapshot unreadable");
            return (StatusCode::NOT_FOUND, e.to_string()).into_response();
        }
    };
    if let Err(e) = parse_snapshot(&state.source.location(), &body) {
        warn!(error = %e, "refusing to serve snapshot");
        return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response();
    }

    (
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("application/json")),
            (header::CACHE_CONTROL, HeaderValue::from_static("no-store")),
        ],
        body,
    )
        .into_response()
}
