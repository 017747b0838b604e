use std::io;

/// Errors raised while configuring the service or publishing a release
#[derive(Debug, thiserror::Error)]
pub enum ReleaseError {
    #[error("invalid or missing webhook signature")]
    Unauthorized,

    #[error("malformed request: {0}")]
    MalformedRequest(String),

    /// Non-success answer (or no answer at all) from the provider API.
    #[error("error fetching \"{uri}\"")]
    Upstream { uri: String, status: Option<u16> },

    #[error("error parsing JSON from \"{uri}\"")]
    UpstreamParse { uri: String },

    #[error("error cloning repository")]
    Clone(String),

    #[error("error creating archive")]
    Archive(String),

    #[error("error uploading archive")]
    Upload(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] io::Error),

    #[error("TOML parsing error: {0}")]
    TomlParseError(#[from] toml::de::Error),
}

impl ReleaseError {
    pub fn upstream(uri: impl Into<String>, status: Option<u16>) -> Self {
        ReleaseError::Upstream {
            uri: uri.into(),
            status,
        }
    }

    pub fn upstream_parse(uri: impl Into<String>) -> Self {
        ReleaseError::UpstreamParse { uri: uri.into() }
    }

    /// Extra detail that is logged but never sent back to the caller.
    pub fn detail(&self) -> Option<String> {
        match self {
            ReleaseError::Upstream {
                status: Some(status),
                ..
            } => Some(format!("HTTP {}", status)),
            ReleaseError::Upstream { status: None, .. } => Some("no response".to_string()),
            ReleaseError::Clone(d) | ReleaseError::Archive(d) | ReleaseError::Upload(d) => {
                Some(d.clone())
            }
            _ => None,
        }
    }
}

/// Helper type for Results that use ReleaseError
pub type Result<T> = std::result::Result<T, ReleaseError>;
