//! Issue reads and writes with offline capture.

use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use civicsync_common::{Error, Issue, IssueId, NewIssue, Result};
use civicsync_sync::OfflineQueue;
use civicsync_transport::{Method, Transport, UploadPart};

use crate::cache::{Collection, ReadThroughCache};

/// Form field the backend expects the image under.
const IMAGE_FIELD: &str = "image";

/// Reference to an issue photo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageRef {
    /// Hosted by the backend.
    Remote(String),
    /// Upload failed offline; the local file is referenced instead.
    Local(PathBuf),
}

impl ImageRef {
    /// String form suitable for [`NewIssue::with_image_url`].
    pub fn to_url_string(&self) -> String {
        match self {
            ImageRef::Remote(url) => url.clone(),
            ImageRef::Local(path) => path.to_string_lossy().into_owned(),
        }
    }

    /// True if the image still lives only on this device.
    pub fn is_local(&self) -> bool {
        matches!(self, ImageRef::Local(_))
    }
}

/// Issue operations.
///
/// Writes that fail with `Unreachable` are appended to the offline queue
/// before the error is returned. Any other failure is returned directly.
#[derive(Clone)]
pub struct IssuesApi {
    transport: Arc<dyn Transport>,
    queue: OfflineQueue,
    cache: ReadThroughCache,
}

impl IssuesApi {
    /// Create the facade.
    pub fn new(transport: Arc<dyn Transport>, queue: OfflineQueue, cache: ReadThroughCache) -> Self {
        Self {
            transport,
            queue,
            cache,
        }
    }

    /// All issues, from the backend or a fallback.
    pub async fn list(&self) -> Result<Collection<Issue>> {
        self.cache.fetch_collection::<Issue>().await
    }

    /// Report a new issue.
    ///
    /// # Errors
    /// - `InvalidInput` if title or category is empty (nothing is queued)
    /// - `Unreachable` after the issue has been queued
    /// - `Rejected` or `AuthExpired` (nothing is queued)
    pub async fn create(&self, issue: &NewIssue) -> Result<Issue> {
        issue.validate()?;
        let payload = serde_json::to_value(issue)?;
        let created = self.write(Method::Post, "/issues", Some(payload)).await?;
        decode_issue(created)
    }

    /// Upvote an issue.
    pub async fn upvote(&self, id: &IssueId) -> Result<Issue> {
        let path = format!("/issues/{}/upvote", id);
        let updated = self.write(Method::Post, &path, None).await?;
        decode_issue(updated)
    }

    /// Upload a photo for an issue.
    ///
    /// When the backend is unreachable the local path is returned instead,
    /// so the issue can still be submitted.
    ///
    /// # Errors
    /// - `Io` if the file cannot be read
    /// - `Rejected`, `AuthExpired` or `Serialization` from the upload
    pub async fn upload_image(&self, path: impl AsRef<Path>) -> Result<ImageRef> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "issue.jpg".to_string());
        let part = UploadPart::new(IMAGE_FIELD, file_name, mime_for(path), bytes);

        match self.transport.upload("/upload", part).await {
            Ok(value) => {
                let url = value
                    .get("url")
                    .and_then(Value::as_str)
                    .ok_or_else(|| {
                        Error::Serialization("Upload response has no 'url'".to_string())
                    })?;
                Ok(ImageRef::Remote(url.to_string()))
            }
            Err(e) if e.is_unreachable() => {
                warn!(path = %path.display(), "upload unreachable, keeping local image: {}", e);
                Ok(ImageRef::Local(path.to_path_buf()))
            }
            Err(e) => Err(e),
        }
    }

    /// Send a write, queueing it if the backend cannot be reached.
    async fn write(&self, method: Method, path: &str, payload: Option<Value>) -> Result<Value> {
        match self.transport.send(method, path, payload.clone()).await {
            Err(e) if e.is_unreachable() => {
                let id = self.queue.enqueue(method, path, payload).await?;
                info!(id = %id, %method, path, "write queued for sync");
                Err(e)
            }
            other => other,
        }
    }
}

fn decode_issue(value: Value) -> Result<Issue> {
    serde_json::from_value(value)
        .map_err(|e| Error::Serialization(format!("Unexpected issue payload: {}", e)))
}

fn mime_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase());
    match ext.as_deref() {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("heic") => "image/heic",
        _ => "application/octet-stream",
    }
}
