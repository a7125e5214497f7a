use async_trait::async_trait;
use reqwest::{Client, Method};
use serde_json::Value;
use shared::error::ApiError;

use crate::error::TransportError;

const API_KEY_HEADER: &str = "X-Api-Key";

/// The request function the panel drives. Authentication and timeouts live behind it.
#[async_trait]
pub trait ApiTransport: Send + Sync {
    async fn request(
        &self,
        method: Method,
        path: &str,
        credential: &str,
        body: Option<Value>,
    ) -> Result<Value, TransportError>;
}

pub struct HttpTransport {
    http: Client,
    server_url: String,
}

impl HttpTransport {
    pub fn new(server_url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), server_url)
    }

    pub fn with_client(http: Client, server_url: impl Into<String>) -> Self {
        let server_url = server_url.into().trim().trim_end_matches('/').to_string();
        Self { http, server_url }
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }
}

#[async_trait]
impl ApiTransport for HttpTransport {
    async fn request(
        &self,
        method: Method,
        path: &str,
        credential: &str,
        body: Option<Value>,
    ) -> Result<Value, TransportError> {
        if !path.starts_with('/') {
            return Err(TransportError::InvalidPath {
                path: path.to_string(),
                reason: "path must be absolute".into(),
            });
        }

        let mut request = self
            .http
            .request(method, format!("{}{path}", self.server_url));
        if !credential.is_empty() {
            request = request.header(API_KEY_HEADER, credential);
        }
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            let api_error = ApiError::from_response(status.as_u16(), &text);
            return Err(TransportError::Status {
                status: status.as_u16(),
                code: api_error.code,
                detail: api_error.message,
            });
        }

        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text)?)
    }
}

#[cfg(test)]
#[path = "tests/transport_tests.rs"]
mod tests;
