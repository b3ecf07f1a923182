use std::path::PathBuf;
use thiserror::Error;

/// Failures while turning an input file into a model payload.
#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("File not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("Unsupported file format: '{extension}'")]
    UnsupportedFormat { extension: String },

    #[error("Failed to decode '{}': {source}", path.display())]
    DecodeError {
        path: PathBuf,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl LoaderError {
    pub(crate) fn decode(
        path: impl Into<PathBuf>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::DecodeError {
            path: path.into(),
            source: source.into(),
        }
    }
}

/// Failures talking to the external model API.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("Model API credential is not configured")]
    NotConfigured,

    #[error("Model API request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Model API call timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("Model API returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid response format from model: {0}")]
    MalformedResponse(String),
}

/// Outcome of an agent call that did not produce a validated record.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Loader Error: {0}")]
    Loader(#[from] LoaderError),

    #[error("API Error: {0}")]
    Upstream(String),

    #[error("Schema validation failed: {0}")]
    Validation(String),
}

impl From<UpstreamError> for AgentError {
    fn from(e: UpstreamError) -> Self {
        AgentError::Upstream(e.to_string())
    }
}

pub type AgentResult<T> = std::result::Result<T, AgentError>;
