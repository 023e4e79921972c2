//! Transport ports.
//!
//! The core emits outbound messages and fetches photo bytes through these
//! traits; the Telegram adapter implements them. Delivery failures are
//! explicit values, not exceptions: `SendError` distinguishes transient
//! backoff (retry-after) from permanent refusal (bot removed from the
//! destination) so callers can pick a policy per call site.

use std::time::Duration;

use async_trait::async_trait;

use crate::domain::{DestId, FileRef, MessageId};

/// Why an outbound send failed.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    /// Transport-signaled backoff; pause this destination and resume later.
    #[error("rate limited by transport, retry after {0:?}")]
    RetryAfter(Duration),

    /// The destination permanently rejects us (bot blocked/removed, chat gone).
    #[error("destination refused delivery: {0}")]
    Forbidden(String),

    #[error("transport error: {0}")]
    Other(String),
}

impl SendError {
    pub fn is_transient(&self) -> bool {
        matches!(self, SendError::RetryAfter(_))
    }
}

pub type SendResult<T> = std::result::Result<T, SendError>;

/// An inline action button attached to an outbound message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Button {
    pub label: String,
    pub data: String,
}

impl Button {
    pub fn new(label: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            data: data.into(),
        }
    }
}

/// Outbound messaging port (HTML text, captioned photos, media batches).
///
/// The transport enforces a batch cap of about 10 attachments per call;
/// callers truncate before invoking `send_media_batch`.
#[async_trait]
pub trait MessagingPort: Send + Sync {
    async fn send_text(&self, dest: DestId, html: &str) -> SendResult<MessageId>;

    async fn send_photo(
        &self,
        dest: DestId,
        photo: &FileRef,
        caption_html: &str,
        buttons: &[Button],
    ) -> SendResult<MessageId>;

    async fn send_media_batch(&self, dest: DestId, photos: &[FileRef]) -> SendResult<()>;
}

/// Inbound file access port (photo bytes for fingerprinting).
#[async_trait]
pub trait FileFetcher: Send + Sync {
    async fn fetch_file(&self, file: &FileRef) -> SendResult<Vec<u8>>;
}

/// Platform cap on attachments per media batch.
pub const MEDIA_BATCH_LIMIT: usize = 10;
