//! Webhook payload models.
//!
//! Each provider's push payload is decoded into its own serde model and then
//! flattened into a provider-neutral [`WebhookEvent`].

use serde::Deserialize;

use crate::error::ReleaseError;

pub const TAG_REF_PREFIX: &str = "refs/tags/";

const ZERO_SHA: &str = "0000000000000000000000000000000000000000";

/// Repository as described by the webhook payload.
#[derive(Debug, Clone, PartialEq)]
pub struct RepositoryDescriptor {
    pub owner: String,
    pub name: String,
    pub default_branch: String,
    pub clone_url: String,
    /// Collection the tag lookup is resolved against (refs or tag objects).
    pub tags_url: String,
    /// Releases collection; asset uploads and existing-release lookups hang off it.
    pub releases_url: String,
}

/// A received push delivery, reduced to the fields the pipeline needs.
#[derive(Debug, Clone, PartialEq)]
pub struct WebhookEvent {
    /// Value of the provider's event header, if it sent one.
    pub kind: Option<String>,
    pub git_ref: Option<String>,
    /// Only some providers report whether the ref was created.
    pub created: Option<bool>,
    /// The pushed revision (`after`).
    pub revision: Option<String>,
    pub repository: Option<RepositoryDescriptor>,
}

impl WebhookEvent {
    /// Tag name when the ref is a tag ref.
    pub fn tag_name(&self) -> Option<&str> {
        self.git_ref.as_deref()?.strip_prefix(TAG_REF_PREFIX)
    }

    pub fn is_push(&self) -> bool {
        self.kind.as_deref().is_none_or(|k| k == "push")
    }

    pub fn is_deletion(&self) -> bool {
        self.revision.as_deref() == Some(ZERO_SHA)
    }

    pub fn repository(&self) -> Result<&RepositoryDescriptor, ReleaseError> {
        self.repository
            .as_ref()
            .ok_or_else(|| ReleaseError::MalformedRequest("missing repository".to_string()))
    }
}

/// Strips RFC 6570 expressions (`{/sha}`, `{?name,label}`) from a link.
pub fn strip_uri_template(template: &str) -> String {
    let mut out = String::with_capacity(template.len());
    let mut depth = 0usize;
    for c in template.chars() {
        match c {
            '{' => depth += 1,
            '}' if depth > 0 => depth -= 1,
            _ if depth == 0 => out.push(c),
            _ => {}
        }
    }
    out
}

#[derive(Debug, Deserialize)]
pub struct GithubOwner {
    pub login: String,
}

#[derive(Debug, Deserialize)]
pub struct GithubRepository {
    pub name: String,
    pub owner: GithubOwner,
    pub default_branch: String,
    pub clone_url: String,
    pub git_refs_url: String,
    pub releases_url: String,
}

#[derive(Debug, Deserialize)]
pub struct GithubPushPayload {
    #[serde(rename = "ref", default)]
    pub git_ref: Option<String>,
    #[serde(default)]
    pub created: Option<bool>,
    #[serde(default)]
    pub after: Option<String>,
    #[serde(default)]
    pub repository: Option<GithubRepository>,
}

impl GithubPushPayload {
    pub fn into_event(self, kind: Option<String>) -> WebhookEvent {
        WebhookEvent {
            kind,
            git_ref: self.git_ref,
            created: self.created,
            revision: self.after,
            repository: self.repository.map(|r| RepositoryDescriptor {
                owner: r.owner.login,
                name: r.name,
                default_branch: r.default_branch,
                clone_url: r.clone_url,
                tags_url: strip_uri_template(&r.git_refs_url),
                releases_url: strip_uri_template(&r.releases_url),
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct GiteaOwner {
    #[serde(alias = "login")]
    pub username: String,
}

#[derive(Debug, Deserialize)]
pub struct GiteaRepository {
    pub name: String,
    pub owner: GiteaOwner,
    pub default_branch: String,
    pub clone_url: String,
}

#[derive(Debug, Deserialize)]
pub struct GiteaPushPayload {
    #[serde(rename = "ref", default)]
    pub git_ref: Option<String>,
    #[serde(default)]
    pub after: Option<String>,
    #[serde(default)]
    pub compare_url: Option<String>,
    #[serde(default)]
    pub repository: Option<GiteaRepository>,
}

impl GiteaPushPayload {
    /// Gitea payloads carry no API links; they are built from `api_base`,
    /// or from the instance root in `compare_url` when no base is configured.
    pub fn into_event(
        self,
        kind: Option<String>,
        api_base: Option<&str>,
    ) -> Result<WebhookEvent, ReleaseError> {
        let repository = match self.repository {
            Some(r) => {
                let base = match api_base {
                    Some(base) => base.trim_end_matches('/').to_string(),
                    None => {
                        let root = self.compare_url.as_deref().ok_or_else(|| {
                            ReleaseError::MalformedRequest("missing compare_url".to_string())
                        })?;
                        format!("{}/api/v1", root.trim_end_matches('/'))
                    }
                };
                let repo_base = format!("{}/repos/{}/{}", base, r.owner.username, r.name);
                Some(RepositoryDescriptor {
                    owner: r.owner.username,
                    name: r.name,
                    default_branch: r.default_branch,
                    clone_url: r.clone_url,
                    tags_url: format!("{repo_base}/git/tags"),
                    releases_url: format!("{repo_base}/releases"),
                })
            }
            None => None,
        };

        Ok(WebhookEvent {
            kind,
            git_ref: self.git_ref,
            created: None,
            revision: self.after,
            repository,
        })
    }
}
