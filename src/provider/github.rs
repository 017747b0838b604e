//! GitHub adapter.
//!
//! Tag lookup takes two reads: the ref (`git/refs/tags/<name>`) points at a
//! tag object whose URL is then fetched for the annotation. Release creation
//! answers `422` with an `already_exists` error when the tag already has a
//! release; that release is then read from `releases/tags/<name>`.

use async_trait::async_trait;
use axum::http::HeaderMap;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
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
use crate::signature::{GITHUB_SIGNATURE_256_HEADER, GITHUB_SIGNATURE_HEADER, verify_hub_signature};
use crate::webhook::{GithubPushPayload, RepositoryDescriptor, WebhookEvent, strip_uri_template};

pub const GITHUB_ACCEPT: &str = "application/vnd.github.v3+json";
pub const GITHUB_EVENT_HEADER: &str = "x-github-event";

#[derive(Debug, Deserialize)]
struct GitRef {
    object: GitObject,
}

#[derive(Debug, Deserialize)]
struct GitObject {
    #[serde(rename = "type")]
    kind: String,
    url: String,
}

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
    upload_url: String,
}

#[derive(Debug, Default, Deserialize)]
struct ValidationFailure {
    #[serde(default)]
    errors: Vec<ValidationDetail>,
}

#[derive(Debug, Deserialize)]
struct ValidationDetail {
    #[serde(default)]
    code: Option<String>,
}

impl From<Release> for ReleaseRecord {
    fn from(release: Release) -> Self {
        ReleaseRecord {
            id: release.id,
            tag_name: release.tag_name,
            upload: UploadTarget::Template(release.upload_url),
        }
    }
}

pub struct GithubProvider {
    api: ApiClient,
    secret: Vec<u8>,
}

impl GithubProvider {
    pub fn new(http: reqwest::Client, secret: impl Into<Vec<u8>>, token: Option<String>) -> Self {
        Self {
            api: ApiClient::new(http, token, GITHUB_ACCEPT),
            secret: secret.into(),
        }
    }

    async fn fetch_existing(&self, releases_url: &str, tag: &str) -> Result<ReleaseRecord, ReleaseError> {
        let uri = api_url(releases_url, tag_segments(tag))?;
        info!("Release for {} already exists, fetching {}", tag, uri);
        let release: Release = self.api.get_json(uri.as_str()).await?;
        Ok(release.into())
    }
}

/// Expands an `upload_url` template with the asset name.
pub fn asset_upload_url(template: &str, name: &str) -> Result<Url, url::ParseError> {
    let mut url = Url::parse(&strip_uri_template(template))?;
    url.query_pairs_mut().append_pair("name", name);
    Ok(url)
}

#[async_trait]
impl Provider for GithubProvider {
    fn name(&self) -> &'static str {
        "github"
    }

    fn verify_signature(&self, body: &[u8], headers: &HeaderMap) -> bool {
        match header_value(headers, GITHUB_SIGNATURE_256_HEADER)
            .or_else(|| header_value(headers, GITHUB_SIGNATURE_HEADER))
        {
            Some(signature) => verify_hub_signature(&self.secret, body, signature),
            None => false,
        }
    }

    fn parse_event(&self, body: &[u8], headers: &HeaderMap) -> Result<WebhookEvent, ReleaseError> {
        let payload: GithubPushPayload = serde_json::from_slice(body)
            .map_err(|e| ReleaseError::MalformedRequest(e.to_string()))?;
        let kind = header_value(headers, GITHUB_EVENT_HEADER).map(str::to_string);
        Ok(payload.into_event(kind))
    }

    fn check_eligible(&self, event: &WebhookEvent) -> Result<(), &'static str> {
        check_tag_push(event)?;
        if event.created != Some(true) {
            return Err("tag not created");
        }
        Ok(())
    }

    async fn resolve_tag(&self, event: &WebhookEvent) -> Result<TagInfo, ReleaseError> {
        let repo = event.repository()?;
        let name = event
            .tag_name()
            .ok_or_else(|| ReleaseError::MalformedRequest("not a tag ref".to_string()))?;

        let ref_uri = api_url(&repo.tags_url, tag_segments(name))?;
        let git_ref: GitRef = self.api.get_json(ref_uri.as_str()).await?;

        if git_ref.object.kind != "tag" {
            // lightweight tag: the ref points straight at a commit
            info!("{} is a lightweight tag", name);
            return Ok(TagInfo {
                name: name.to_string(),
                message: String::new(),
            });
        }

        let tag: AnnotatedTag = self.api.get_json(&git_ref.object.url).await?;
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
                Ok(release.into())
            }
            StatusCode::UNPROCESSABLE_ENTITY => {
                let failure: ValidationFailure = read_json(response, uri).await?;
                let exists = failure
                    .errors
                    .first()
                    .and_then(|e| e.code.as_deref())
                    == Some("already_exists");
                if !exists {
                    error!("Release creation at {} rejected: {:?}", uri, failure);
                    return Err(ReleaseError::upstream(uri, Some(422)));
                }
                self.fetch_existing(uri, &tag.name).await
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
        let template = match &release.upload {
            UploadTarget::Template(template) => template,
            UploadTarget::Collection { .. } => {
                return Err(ReleaseError::Upload("release has no upload_url".to_string()));
            }
        };
        let url = asset_upload_url(template, &blob.file_name)
            .map_err(|e| ReleaseError::Upload(format!("bad upload_url {}: {}", template, e)))?;

        info!("Uploading {} ({} bytes) to {}", blob.file_name, blob.len(), url);
        let length = blob.len();
        let response = self
            .api
            .request(Method::POST, url.as_str())
            .header(CONTENT_TYPE, "application/zip")
            .header(CONTENT_LENGTH, length)
            .body(blob.bytes)
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
