//! Push webhook handlers, one per provider

use axum::{
    body::Bytes,
    extract::State as AxumState,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use tracing::{Instrument, info, info_span, warn};
use uuid::Uuid;

use crate::SharedState;
use crate::pipeline;
use crate::provider::Provider;
use crate::respond;

/// POST /github/push
pub async fn github_push(
    AxumState(state): AxumState<SharedState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    match &state.github {
        Some(provider) => handle_push(&state, provider, &headers, &body).await,
        None => not_configured("github"),
    }
}

/// POST /gitea/push
pub async fn gitea_push(
    AxumState(state): AxumState<SharedState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    match &state.gitea {
        Some(provider) => handle_push(&state, provider, &headers, &body).await,
        None => not_configured("gitea"),
    }
}

async fn handle_push(
    state: &SharedState,
    provider: &dyn Provider,
    headers: &HeaderMap,
    body: &[u8],
) -> Response {
    let delivery = Uuid::now_v7();
    let span = info_span!("delivery", provider = provider.name(), id = %delivery);

    async move {
        info!("Received {} byte delivery", body.len());
        match pipeline::run(provider, &state.archiver, headers, body).await {
            Ok(outcome) => {
                info!("Delivery finished: {:?}", outcome);
                outcome.into_response()
            }
            Err(failure) => {
                warn!("Delivery failed at {}", failure.stage);
                failure.into_response()
            }
        }
    }
    .instrument(span)
    .await
}

fn not_configured(provider: &str) -> Response {
    warn!("Delivery for unconfigured provider {}", provider);
    respond::status_message(
        StatusCode::NOT_FOUND,
        format!("{} is not configured", provider),
    )
}
