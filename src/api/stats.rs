//! Liveness and server status endpoints

use axum::{
    extract::{Query, State as AxumState},
    http::StatusCode,
    response::Response,
};
use serde::Deserialize;
use serde_json::json;

use crate::SharedState;
use crate::respond::{self, Format};

#[derive(Debug, Default, Deserialize)]
pub struct StatusParams {
    #[serde(default)]
    pub format: Format,
}

/// GET / - liveness
pub async fn root() -> Response {
    respond::status(StatusCode::OK, json!({}))
}

/// GET /status - server information, as JSON or `?format=shell`
pub async fn status(
    AxumState(state): AxumState<SharedState>,
    Query(params): Query<StatusParams>,
) -> Response {
    let data = json!({
        "server": {
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
            "started_at": state.started_at.to_rfc3339(),
            "uptime_seconds": state.start_time.elapsed().as_secs(),
        },
        "providers": state.config.providers(),
    });
    respond::render(params.format, &data)
}
