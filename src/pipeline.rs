//! Release pipeline.
//!
//! `authenticate -> parse -> eligibility -> resolve_tag -> publish_release ->
//! build_archive -> upload_asset`. The first failing stage ends the delivery;
//! nothing already created on the provider is rolled back.

use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::json;
use std::fmt;
use tracing::{error, info, warn};

use crate::archive::ArchiveBuilder;
use crate::error::ReleaseError;
use crate::provider::Provider;
use crate::respond;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Authenticate,
    Parse,
    ResolveTag,
    PublishRelease,
    BuildArchive,
    UploadAsset,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Authenticate => "authenticate",
            Stage::Parse => "parse",
            Stage::ResolveTag => "resolve_tag",
            Stage::PublishRelease => "publish_release",
            Stage::BuildArchive => "build_archive",
            Stage::UploadAsset => "upload_asset",
        };
        f.write_str(name)
    }
}

/// Successful end states.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Not a tag creation; acknowledged without touching the provider.
    Ignored(&'static str),
    Released { tag: String, release_id: u64 },
}

impl IntoResponse for Outcome {
    fn into_response(self) -> Response {
        match self {
            Outcome::Ignored(reason) => respond::status_message(
                StatusCode::OK,
                format!("ignored: {}", reason),
            ),
            Outcome::Released { tag, release_id } => respond::status(
                StatusCode::OK,
                json!({
                    "message": "release created",
                    "tag": tag,
                    "release_id": release_id,
                }),
            ),
        }
    }
}

/// A pipeline error tagged with the stage it stopped in.
#[derive(Debug)]
pub struct PipelineFailure {
    pub stage: Stage,
    pub error: ReleaseError,
}

impl PipelineFailure {
    pub fn status_code(&self) -> StatusCode {
        match self.error {
            ReleaseError::Unauthorized => StatusCode::UNAUTHORIZED,
            ReleaseError::MalformedRequest(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl fmt::Display for PipelineFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.stage, self.error)
    }
}

impl IntoResponse for PipelineFailure {
    fn into_response(self) -> Response {
        respond::status(
            self.status_code(),
            json!({
                "message": self.error.to_string(),
                "stage": self.stage,
            }),
        )
    }
}

trait AtStage<T> {
    fn at(self, stage: Stage) -> Result<T, PipelineFailure>;
}

impl<T> AtStage<T> for Result<T, ReleaseError> {
    fn at(self, stage: Stage) -> Result<T, PipelineFailure> {
        self.map_err(|error| {
            match error.detail() {
                Some(detail) => error!("{} failed: {} ({})", stage, error, detail),
                None => error!("{} failed: {}", stage, error),
            }
            PipelineFailure { stage, error }
        })
    }
}

/// Runs one delivery through `provider`.
pub async fn run(
    provider: &dyn Provider,
    archiver: &ArchiveBuilder,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<Outcome, PipelineFailure> {
    if !provider.verify_signature(body, headers) {
        warn!("Signature verification failed for {} delivery", provider.name());
        return Err(PipelineFailure {
            stage: Stage::Authenticate,
            error: ReleaseError::Unauthorized,
        });
    }

    let event = provider.parse_event(body, headers).at(Stage::Parse)?;
    if let Err(reason) = provider.check_eligible(&event) {
        info!("Ignoring {:?}: {}", event.git_ref, reason);
        return Ok(Outcome::Ignored(reason));
    }
    let repo = event.repository().map_err(|error| PipelineFailure {
        stage: Stage::Parse,
        error,
    })?;

    let tag = provider.resolve_tag(&event).await.at(Stage::ResolveTag)?;
    info!("Resolved tag {} for {}/{}", tag.name, repo.owner, repo.name);

    let release = provider
        .publish_release(&tag, repo)
        .await
        .at(Stage::PublishRelease)?;
    info!("Release {} ready for {}", release.id, release.tag_name);

    let blob = archiver
        .build(&repo.clone_url, &tag.name, &repo.name)
        .await
        .at(Stage::BuildArchive)?;

    provider
        .upload_asset(&release, blob)
        .await
        .at(Stage::UploadAsset)?;
    info!("Uploaded {}.zip to release {}", repo.name, release.id);

    Ok(Outcome::Released {
        tag: tag.name,
        release_id: release.id,
    })
}
