//! HTTP transport over reqwest.

use async_trait::async_trait;
use reqwest::{header, multipart, Client, RequestBuilder, Response, StatusCode};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

use civicsync_common::{Error, Result};

use crate::config::TransportConfig;
use crate::token::TokenProvider;
use crate::transport::{Method, Transport, UploadPart};

/// Authenticated JSON transport to the backend.
///
/// Constructed explicitly with its configuration and token source; there is
/// no shared global client.
pub struct HttpTransport {
    http: Client,
    config: TransportConfig,
    tokens: Arc<dyn TokenProvider>,
}

impl HttpTransport {
    /// Create a new transport.
    ///
    /// # Errors
    /// - `Config` if the base URL is invalid or the HTTP client cannot be built
    pub fn new(config: TransportConfig, tokens: Arc<dyn TokenProvider>) -> Result<Self> {
        config.validate()?;

        let http = Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            config,
            tokens,
        })
    }

    /// Transport configuration.
    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Attach the bearer token, if any.
    async fn authorize(&self, request: RequestBuilder) -> Result<RequestBuilder> {
        match self.tokens.token().await? {
            Some(token) => Ok(request.bearer_auth(token.expose())),
            None => Ok(request),
        }
    }

    /// Dispatch a prepared request, log it and classify the outcome.
    async fn dispatch(&self, method: Method, path: &str, request: RequestBuilder) -> Result<Value> {
        let request = match self.authorize(request).await {
            Ok(request) => request,
            Err(e) => {
                warn!(%method, path, error = %e, "request aborted, token unavailable");
                return Err(e);
            }
        };
        let started = Instant::now();

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                let elapsed_ms = started.elapsed().as_millis() as u64;
                let reason = unreachable_reason(&e);
                warn!(%method, path, reason = %reason, elapsed_ms, "request failed");
                return Err(Error::Unreachable(format!("{} {}: {}", method, path, reason)));
            }
        };

        let status = response.status();
        let result = handle_response(response).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match &result {
            Ok(_) => debug!(%method, path, status = status.as_u16(), elapsed_ms, "request completed"),
            Err(e) => warn!(%method, path, status = status.as_u16(), elapsed_ms, error = %e, "request failed"),
        }

        result
    }
}

fn unreachable_reason(err: &reqwest::Error) -> String {
    if err.is_timeout() {
        "timed out".to_string()
    } else if err.is_connect() {
        format!("connection failed: {}", err)
    } else {
        err.to_string()
    }
}

/// Classify a received response.
async fn handle_response(response: Response) -> Result<Value> {
    let status = response.status();

    // A body cut short by the timeout or a dropped connection never arrived.
    let body = response.bytes().await.map_err(|e| {
        Error::Unreachable(format!("response body interrupted: {}", unreachable_reason(&e)))
    })?;

    if status.is_success() {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Value::Null);
        }
        return serde_json::from_slice(&body)
            .map_err(|e| Error::Serialization(format!("Failed to parse response: {}", e)));
    }

    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(Error::AuthExpired {
            status: status.as_u16(),
        });
    }

    Err(Error::Rejected {
        status: status.as_u16(),
        message: rejection_message(status, &body),
    })
}

/// Prefer the server's `error` field, then the raw body, then the reason phrase.
fn rejection_message(status: StatusCode, body: &[u8]) -> String {
    if let Ok(Value::Object(map)) = serde_json::from_slice::<Value>(body) {
        if let Some(Value::String(message)) = map.get("error") {
            return message.clone();
        }
    }

    let text = String::from_utf8_lossy(body).trim().to_string();
    if text.is_empty() {
        status
            .canonical_reason()
            .unwrap_or("Unknown error")
            .to_string()
    } else {
        text
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value> {
        let url = self.config.url_for(path);
        debug!(%method, path, "dispatching request");

        let mut request = match method {
            Method::Get => self.http.get(&url),
            Method::Post => self.http.post(&url),
            Method::Put => self.http.put(&url),
            Method::Delete => self.http.delete(&url),
        }
        .header(header::ACCEPT, "application/json");

        if let Some(body) = body {
            request = request.json(&body);
        }

        self.dispatch(method, path, request).await
    }

    async fn upload(&self, path: &str, part: UploadPart) -> Result<Value> {
        let url = self.config.url_for(path);
        debug!(path, file_name = %part.file_name, bytes = part.bytes.len(), "uploading file");

        let file = multipart::Part::bytes(part.bytes)
            .file_name(part.file_name)
            .mime_str(&part.mime)
            .map_err(|e| Error::InvalidInput(format!("Invalid MIME type '{}': {}", part.mime, e)))?;
        let form = multipart::Form::new().part(part.field, file);

        let request = self
            .http
            .post(&url)
            .header(header::ACCEPT, "application/json")
            .multipart(form);

        self.dispatch(Method::Post, path, request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::StaticTokenProvider;

    #[test]
    fn test_rejection_message_prefers_error_field() {
        let body = br#"{"error":"Title is required"}"#;
        assert_eq!(
            rejection_message(StatusCode::BAD_REQUEST, body),
            "Title is required"
        );
    }

    #[test]
    fn test_rejection_message_falls_back_to_body() {
        assert_eq!(
            rejection_message(StatusCode::INTERNAL_SERVER_ERROR, b"boom"),
            "boom"
        );
        assert_eq!(
            rejection_message(StatusCode::BAD_GATEWAY, b""),
            "Bad Gateway"
        );
    }

    #[test]
    fn test_new_rejects_invalid_base_url() {
        let result = HttpTransport::new(
            TransportConfig::new("localhost"),
            Arc::new(StaticTokenProvider::default()),
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
