use shared::{domain::ReviewId, error::ErrorCode};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("invalid request path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },
    #[error("server returned {status} ({code:?}): {detail}")]
    Status {
        status: u16,
        code: ErrorCode,
        detail: String,
    },
    #[error("failed to decode response body: {0}")]
    Decode(#[from] serde_json::Error),
}

impl TransportError {
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Http(err) => err.status().map(|status| status.as_u16()),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum PanelError {
    #[error("failed to fetch reviews for tag '{tag}': {source}")]
    Fetch {
        tag: String,
        #[source]
        source: TransportError,
    },
    #[error("failed to delete review {id}: {source}")]
    Delete {
        id: ReviewId,
        #[source]
        source: TransportError,
    },
    #[error("failed to load panel settings: {0}")]
    Settings(#[source] TransportError),
    #[error("failed to load tag statistics: {0}")]
    TagStats(#[source] TransportError),
}
