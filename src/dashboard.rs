//! Read-only web dashboard over the persisted report and map.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::get,
};
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::error::Result;
use crate::overview::load_report;
use crate::paths::DataPaths;

#[derive(Clone)]
pub struct AppState {
    pub paths: Arc<DataPaths>,
}

pub fn router(paths: DataPaths) -> Router {
    let state = AppState {
        paths: Arc::new(paths),
    };
    Router::new()
        .route("/", get(index))
        .route("/api/overview", get(overview))
        .route("/map", get(map))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serves the dashboard until the process is stopped.
pub async fn serve(paths: DataPaths, port: u16) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "Dashboard running on http://localhost:{port}");
    axum::serve(listener, router(paths)).await?;
    Ok(())
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn overview(State(state): State<AppState>) -> Response {
    match load_report(&state.paths.overview_file()) {
        Ok(Some(report)) => Json(report).into_response(),
        Ok(None) => (StatusCode::NOT_FOUND, "no overview report yet").into_response(),
        Err(e) => {
            error!(error = %e, "Failed to load overview report");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

/// Serves the most recently generated map, dark or light.
async fn map(State(state): State<AppState>) -> Response {
    let mut newest: Option<(SystemTime, PathBuf)> = None;
    for dark_mode in [true, false] {
        let path = state.paths.map_file(dark_mode);
        let modified = match tokio::fs::metadata(&path).await.and_then(|m| m.modified()) {
            Ok(modified) => modified,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => {
                error!(path = %path.display(), error = %e, "Failed to stat map");
                continue;
            }
        };
        if newest.as_ref().is_none_or(|(current, _)| modified > *current) {
            newest = Some((modified, path));
        }
    }

    let Some((_, path)) = newest else {
        return (StatusCode::NOT_FOUND, "no map generated yet").into_response();
    };
    match tokio::fs::read_to_string(&path).await {
        Ok(page) => Html(page).into_response(),
        Err(e) => {
            error!(path = %path.display(), error = %e, "Failed to read map");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

async fn index(State(state): State<AppState>) -> Html<String> {
    let summary = match load_report(&state.paths.overview_file()) {
        Ok(Some(report)) => report.summary_text(),
        Ok(None) => "No overview report yet. Run `nmbs_data analyze` first.".to_string(),
        Err(e) => format!("Overview report unreadable: {e}"),
    };
    Html(format!(
        r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>NMBS train data</title></head>
<body style="font-family: sans-serif; max-width: 60em; margin: 2em auto;">
<h1>NMBS train data</h1>
<p><a href="/map">Train routes map</a> | <a href="/api/overview">Overview JSON</a></p>
<pre>{}</pre>
</body>
</html>
"#,
        escape_html(&summary)
    ))
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
