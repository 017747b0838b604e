//! Source-control provider adapters.
//!
//! The orchestrator is written once against [`Provider`]; GitHub and Gitea
//! differ only in signature scheme, payload shape and endpoint layout.

pub mod gitea;
pub mod github;

use async_trait::async_trait;
use axum::http::HeaderMap;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::{Method, RequestBuilder, Response};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, error};
use url::Url;

use crate::archive::ArchiveBlob;
use crate::error::ReleaseError;
use crate::webhook::{RepositoryDescriptor, WebhookEvent};

pub use gitea::GiteaProvider;
pub use github::GithubProvider;

/// Resolved annotated (or lightweight) tag.
#[derive(Debug, Clone, PartialEq)]
pub struct TagInfo {
    pub name: String,
    pub message: String,
}

/// Where an asset for a release is sent.
#[derive(Debug, Clone, PartialEq)]
pub enum UploadTarget {
    /// RFC 6570 link handed out by the provider (GitHub `upload_url`).
    Template(String),
    /// `<releases_url>/<id>/assets` (Gitea).
    Collection { releases_url: String, id: u64 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReleaseRecord {
    pub id: u64,
    pub tag_name: String,
    pub upload: UploadTarget,
}

/// Body of a release-creation request.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct NewRelease {
    pub tag_name: String,
    pub target_commitish: String,
    pub name: String,
    pub body: String,
    pub draft: bool,
    pub prerelease: bool,
}

impl NewRelease {
    pub fn new(tag: &TagInfo, repo: &RepositoryDescriptor) -> Self {
        Self {
            tag_name: tag.name.clone(),
            target_commitish: repo.default_branch.clone(),
            name: release_title(&repo.name, &tag.name),
            body: tag.message.clone(),
            draft: false,
            prerelease: false,
        }
    }
}

/// `my-cool-app` -> `My Cool App`
pub fn humanize_name(name: &str) -> String {
    name.split('-')
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(char::to_lowercase))
                    .collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn release_title(repo_name: &str, tag: &str) -> String {
    format!("{} {}", humanize_name(repo_name), tag)
}

/// One provider integration.
#[async_trait]
pub trait Provider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Checks the delivery's signature header over the raw body.
    fn verify_signature(&self, body: &[u8], headers: &HeaderMap) -> bool;

    fn parse_event(&self, body: &[u8], headers: &HeaderMap) -> Result<WebhookEvent, ReleaseError>;

    /// `Err` carries the reason the delivery is ignored.
    fn check_eligible(&self, event: &WebhookEvent) -> Result<(), &'static str>;

    async fn resolve_tag(&self, event: &WebhookEvent) -> Result<TagInfo, ReleaseError>;

    async fn publish_release(
        &self,
        tag: &TagInfo,
        repo: &RepositoryDescriptor,
    ) -> Result<ReleaseRecord, ReleaseError>;

    async fn upload_asset(&self, release: &ReleaseRecord, blob: ArchiveBlob)
    -> Result<(), ReleaseError>;
}

pub(crate) fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Tag-ref eligibility shared by both providers.
pub(crate) fn check_tag_push(event: &WebhookEvent) -> Result<(), &'static str> {
    if !event.is_push() {
        return Err("not a push event");
    }
    if event.tag_name().is_none() {
        return Err("not a tag ref");
    }
    if event.is_deletion() {
        return Err("tag deleted");
    }
    Ok(())
}

/// Appends `segments` to `base` as percent-encoded path segments.
///
/// A tag name is pushed one `/`-separated component at a time, so `release/1.0`
/// keeps its slash while `#`, `?` and `%` are escaped.
pub fn api_url<'a>(
    base: &str,
    segments: impl IntoIterator<Item = &'a str>,
) -> Result<Url, ReleaseError> {
    let mut url = Url::parse(base)
        .map_err(|e| ReleaseError::MalformedRequest(format!("invalid API url {}: {}", base, e)))?;
    url.path_segments_mut()
        .map_err(|_| ReleaseError::MalformedRequest(format!("invalid API url {}", base)))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// Path segments of `tag` under a `tags/` collection.
pub(crate) fn tag_segments(tag: &str) -> impl Iterator<Item = &str> {
    std::iter::once("tags").chain(tag.split('/'))
}

/// Authenticated JSON client for one provider's REST API.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    token: Option<String>,
    accept: &'static str,
}

impl ApiClient {
    pub fn new(http: reqwest::Client, token: Option<String>, accept: &'static str) -> Self {
        Self {
            http,
            token: token.filter(|t| !t.is_empty()),
            accept,
        }
    }

    pub fn request(&self, method: Method, uri: &str) -> RequestBuilder {
        let builder = self.http.request(method, uri).header(ACCEPT, self.accept);
        match &self.token {
            Some(token) => builder.header(AUTHORIZATION, format!("token {}", token)),
            None => builder,
        }
    }

    pub async fn send(&self, builder: RequestBuilder, uri: &str) -> Result<Response, ReleaseError> {
        builder.send().await.map_err(|e| {
            error!("Request to {} failed: {}", uri, e);
            ReleaseError::upstream(uri, None)
        })
    }

    /// GET `uri`, requiring `200 OK` and a JSON body.
    pub async fn get_json<T: DeserializeOwned>(&self, uri: &str) -> Result<T, ReleaseError> {
        debug!("GET {}", uri);
        let response = self.send(self.request(Method::GET, uri), uri).await?;
        if response.status() != reqwest::StatusCode::OK {
            error!("GET {} returned {}", uri, response.status());
            return Err(ReleaseError::upstream(uri, Some(response.status().as_u16())));
        }
        read_json(response, uri).await
    }
}

pub(crate) async fn read_json<T: DeserializeOwned>(
    response: Response,
    uri: &str,
) -> Result<T, ReleaseError> {
    let bytes = response.bytes().await.map_err(|e| {
        error!("Reading body from {} failed: {}", uri, e);
        ReleaseError::upstream(uri, None)
    })?;
    serde_json::from_slice(&bytes).map_err(|e| {
        error!("Invalid JSON from {}: {}", uri, e);
        ReleaseError::upstream_parse(uri)
    })
}
