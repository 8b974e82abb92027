//! Transport trait definition.

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use civicsync_common::Result;

/// HTTP method of a request or a queued write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    /// Wire spelling.
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single file part of a multipart upload.
#[derive(Clone)]
pub struct UploadPart {
    /// Form field name.
    pub field: String,
    /// File name reported to the server.
    pub file_name: String,
    /// MIME type of the content.
    pub mime: String,
    /// File content.
    pub bytes: Vec<u8>,
}

impl UploadPart {
    /// Create an upload part.
    pub fn new(
        field: impl Into<String>,
        file_name: impl Into<String>,
        mime: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Self {
        Self {
            field: field.into(),
            file_name: file_name.into(),
            mime: mime.into(),
            bytes,
        }
    }
}

impl fmt::Debug for UploadPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadPart")
            .field("field", &self.field)
            .field("file_name", &self.file_name)
            .field("mime", &self.mime)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Authenticated request/response channel to the backend.
///
/// Implementations attach the session token, apply the request timeout and
/// classify failures into `Unreachable`, `AuthExpired` and `Rejected`. They
/// never retry.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a JSON request and return the decoded JSON response.
    ///
    /// An empty 2xx body decodes to `Value::Null`.
    ///
    /// # Errors
    /// - `Unreachable` if no response was received
    /// - `AuthExpired` on 401/403
    /// - `Rejected` on any other non-2xx status
    /// - `Serialization` if a 2xx body is not JSON
    /// - `Storage` if the session token could not be read
    async fn send(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value>;

    /// POST a multipart form with one file part.
    async fn upload(&self, path: &str, part: UploadPart) -> Result<Value>;
}

/// Typed helpers on top of any [`Transport`].
#[async_trait]
pub trait TransportExt: Transport {
    /// GET and decode into `T`.
    async fn get_json<T>(&self, path: &str) -> Result<T>
    where
        T: DeserializeOwned + Send,
    {
        let value = self.send(Method::Get, path, None).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// POST a serializable body and decode the response into `T`.
    async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + Sync,
        T: DeserializeOwned + Send,
    {
        let body = serde_json::to_value(body)?;
        let value = self.send(Method::Post, path, Some(body)).await?;
        Ok(serde_json::from_value(value)?)
    }
}

impl<T: Transport + ?Sized> TransportExt for T {}
