use std::sync::Arc;

use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::Value;
use shared::{
    domain::{Cursor, ReviewId, SettingsId},
    protocol::{KeysetPage, PanelSettings, RatingStats},
};
use url::{Position, Url};

use crate::{error::TransportError, transport::ApiTransport};

pub const DEFAULT_API_PREFIX: &str = "/paidreviews/api/v1";
/// Page sizes the reviews endpoint accepts.
pub const MIN_PAGE_SIZE: u32 = 1;
pub const MAX_PAGE_SIZE: u32 = 50;

const PATH_BASE: &str = "http://reviews.invalid";

/// Typed view over the reviews endpoints.
#[derive(Clone)]
pub struct ReviewsApi {
    transport: Arc<dyn ApiTransport>,
    prefix: String,
    credential: String,
}

impl ReviewsApi {
    pub fn new(transport: Arc<dyn ApiTransport>, credential: impl Into<String>) -> Self {
        Self::with_prefix(transport, DEFAULT_API_PREFIX, credential)
    }

    pub fn with_prefix(
        transport: Arc<dyn ApiTransport>,
        prefix: impl Into<String>,
        credential: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            prefix: prefix.into(),
            credential: credential.into(),
        }
    }

    pub async fn settings(&self) -> Result<PanelSettings, TransportError> {
        let path = self.path(&["settings"], &[])?;
        let value = self
            .transport
            .request(Method::GET, &path, &self.credential, None)
            .await?;
        decode(value)
    }

    pub async fn reviews_page(
        &self,
        settings_id: &SettingsId,
        tag: &str,
        limit: u32,
        before: Option<&Cursor>,
    ) -> Result<KeysetPage, TransportError> {
        let limit = limit.clamp(MIN_PAGE_SIZE, MAX_PAGE_SIZE).to_string();
        let mut query = vec![("limit", limit.as_str())];
        if let Some(before) = before {
            query.push(("before", before.as_str()));
        }
        let path = self.path(&[settings_id.as_str(), tag], &query)?;
        let value = self
            .transport
            .request(Method::GET, &path, &self.credential, None)
            .await?;
        decode(value)
    }

    pub async fn delete_review(&self, id: &ReviewId) -> Result<(), TransportError> {
        let path = self.path(&["review", id.as_str()], &[])?;
        self.transport
            .request(Method::DELETE, &path, &self.credential, None)
            .await?;
        Ok(())
    }

    /// Per-tag aggregates. The endpoint is public, so no credential is sent.
    pub async fn tag_stats(
        &self,
        settings_id: &SettingsId,
    ) -> Result<Vec<RatingStats>, TransportError> {
        let path = self.path(&["tags", settings_id.as_str()], &[])?;
        let value = self.transport.request(Method::GET, &path, "", None).await?;
        decode(value)
    }

    fn path(&self, segments: &[&str], query: &[(&str, &str)]) -> Result<String, TransportError> {
        encode_path(&self.prefix, segments, query)
    }
}

/// Joins the prefix and percent-encoded segments into an absolute path with query.
pub(crate) fn encode_path(
    prefix: &str,
    segments: &[&str],
    query: &[(&str, &str)],
) -> Result<String, TransportError> {
    let invalid = |reason: String| TransportError::InvalidPath {
        path: format!("{prefix}/{}", segments.join("/")),
        reason,
    };

    let mut url = Url::parse(PATH_BASE).map_err(|err| invalid(err.to_string()))?;
    {
        let mut path = url
            .path_segments_mut()
            .map_err(|()| invalid("base cannot carry a path".into()))?;
        path.clear();
        path.extend(prefix.split('/').filter(|segment| !segment.is_empty()));
        path.extend(segments);
    }
    if !query.is_empty() {
        url.query_pairs_mut().extend_pairs(query);
    }
    Ok(url[Position::BeforePath..].to_string())
}

fn decode<T: DeserializeOwned + Default>(value: Value) -> Result<T, TransportError> {
    if value.is_null() {
        return Ok(T::default());
    }
    Ok(serde_json::from_value(value)?)
}

#[cfg(test)]
#[path = "tests/api_tests.rs"]
mod tests;
