//! Gitea adapter.
//!
//! The push payload's `after` is the tag object's SHA, so a single read of
//! `git/tags/<sha>` yields both name and annotation. Gitea reports no
//! `created` flag; any tag push that is not a deletion is released, and a
//! re-pushed tag lands on the `409 Conflict` path.
//!
//! Unlike GitHub, a lightweight tag is not released: its `after` is a commit,
//! the tag-object read fails and the delivery stops at tag resolution.

use async_trait::async_trait;
use axum::http::HeaderMap;
use reqwest::multipart::{Form, Part};
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use tracing::{error, info, warn};
use url::Url;

use super::{
    ApiClient, NewRelease, Provider, ReleaseRecord, TagInfo, UploadTarget, api_url,
    check_tag_push, header_value, read_json, tag_segments,
};
use crate::archive::ArchiveBlob;
use crate::error::ReleaseError;
use crate::signature::{GITEA_SIGNATURE_HEADER, verify_gitea_signature};
use crate::webhook::{GiteaPushPayload, RepositoryDescriptor, WebhookEvent};

pub const GITEA_ACCEPT: &str = "application/json";
pub const GITEA_EVENT_HEADER: &str = "x-gitea-event";

#[derive(Debug, Deserialize)]
struct AnnotatedTag {
    tag: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct Release {
    id: u64,
    tag_name: String,
}

pub struct GiteaProvider {
    api: ApiClient,
    secret: Vec<u8>,
    api_url: Option<String>,
}

impl GiteaProvider {
    pub fn new(http: reqwest::Client, secret: impl Into<Vec<u8>>, token: Option<String>) -> Self {
        Self {
            api: ApiClient::new(http, token, GITEA_ACCEPT),
            secret: secret.into(),
            api_url: None,
        }
    }

    /// Fixed API base (`https://host/api/v1`) instead of the payload's `compare_url`.
    pub fn with_api_url(mut self, api_url: Option<String>) -> Self {
        self.api_url = api_url;
        self
    }

    fn record(&self, releases_url: &str, release: Release) -> ReleaseRecord {
        ReleaseRecord {
            id: release.id,
            tag_name: release.tag_name,
            upload: UploadTarget::Collection {
                releases_url: releases_url.to_string(),
                id: release.id,
            },
        }
    }
}

#[async_trait]
impl Provider for GiteaProvider {
    fn name(&self) -> &'static str {
        "gitea"
    }

    fn verify_signature(&self, body: &[u8], headers: &HeaderMap) -> bool {
        match header_value(headers, GITEA_SIGNATURE_HEADER) {
            Some(signature) => verify_gitea_signature(&self.secret, body, signature),
            None => false,
        }
    }

    fn parse_event(&self, body: &[u8], headers: &HeaderMap) -> Result<WebhookEvent, ReleaseError> {
        let payload: GiteaPushPayload = serde_json::from_slice(body)
            .map_err(|e| ReleaseError::MalformedRequest(e.to_string()))?;
        let kind = header_value(headers, GITEA_EVENT_HEADER).map(str::to_string);
        payload.into_event(kind, self.api_url.as_deref())
    }

    fn check_eligible(&self, event: &WebhookEvent) -> Result<(), &'static str> {
        check_tag_push(event)
    }

    async fn resolve_tag(&self, event: &WebhookEvent) -> Result<TagInfo, ReleaseError> {
        let repo = event.repository()?;
        let sha = event
            .revision
            .as_deref()
            .ok_or_else(|| ReleaseError::MalformedRequest("missing after".to_string()))?;

        let uri = api_url(&repo.tags_url, [sha])?;
        let tag: AnnotatedTag = self.api.get_json(uri.as_str()).await?;
        Ok(TagInfo {
            name: tag.tag,
            message: tag.message.trim().to_string(),
        })
    }

    async fn publish_release(
        &self,
        tag: &TagInfo,
        repo: &RepositoryDescriptor,
    ) -> Result<ReleaseRecord, ReleaseError> {
        let uri = &repo.releases_url;
        let payload = NewRelease::new(tag, repo);
        info!("Creating release '{}' at {}", payload.name, uri);

        let response = self
            .api
            .send(self.api.request(Method::POST, uri).json(&payload), uri)
            .await?;

        match response.status() {
            StatusCode::OK | StatusCode::CREATED => {
                let release: Release = read_json(response, uri).await?;
                Ok(self.record(uri, release))
            }
            StatusCode::CONFLICT => {
                let existing = api_url(uri, tag_segments(&tag.name))?;
                info!("Release for {} already exists, fetching {}", tag.name, existing);
                let release: Release = self.api.get_json(existing.as_str()).await?;
                Ok(self.record(uri, release))
            }
            status => {
                error!("POST {} returned {}", uri, status);
                Err(ReleaseError::upstream(uri, Some(status.as_u16())))
            }
        }
    }

    async fn upload_asset(
        &self,
        release: &ReleaseRecord,
        blob: ArchiveBlob,
    ) -> Result<(), ReleaseError> {
        let (releases_url, id) = match &release.upload {
            UploadTarget::Collection { releases_url, id } => (releases_url, *id),
            UploadTarget::Template(_) => {
                return Err(ReleaseError::Upload("release has no asset collection".to_string()));
            }
        };
        let mut url = Url::parse(&format!("{}/{}/assets", releases_url, id))
            .map_err(|e| ReleaseError::Upload(e.to_string()))?;
        url.query_pairs_mut().append_pair("name", &blob.file_name);

        info!("Uploading {} ({} bytes) to {}", blob.file_name, blob.len(), url);
        let part = Part::bytes(blob.bytes)
            .file_name(blob.file_name)
            .mime_str("application/zip")
            .map_err(|e| ReleaseError::Upload(e.to_string()))?;
        let form = Form::new().part("attachment", part);

        let response = self
            .api
            .request(Method::POST, url.as_str())
            .multipart(form)
            .send()
            .await
            .map_err(|e| ReleaseError::Upload(e.to_string()))?;

        if response.status() != StatusCode::CREATED {
            warn!("Asset upload to {} returned {}", url, response.status());
            return Err(ReleaseError::Upload(format!("status {}", response.status())));
        }
        Ok(())
    }
}
