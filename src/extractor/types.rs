use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Telegram refuses media groups larger than this.
pub const MAX_GROUP_SIZE: usize = 10;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("Unsupported URL: {0}")]
    Unsupported(String),
    #[error("Content not available")]
    Unavailable,
    #[error("Media not found")]
    NotFound,
    #[error("Authenticated session was rejected")]
    AuthExpired,
    #[error("Network error: {0}")]
    Transient(String),
    #[error("Unexpected response: {0}")]
    Malformed(String),
}

impl ExtractError {
    /// Classify a non-success HTTP status.
    pub fn from_status(status: StatusCode) -> Self {
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ExtractError::AuthExpired,
            StatusCode::NOT_FOUND => ExtractError::NotFound,
            StatusCode::TOO_MANY_REQUESTS => {
                ExtractError::Transient(format!("rate limited: {}", status))
            }
            s if s.is_server_error() => ExtractError::Transient(format!("server error: {}", s)),
            s => ExtractError::Malformed(format!("unexpected status: {}", s)),
        }
    }

    /// Errors the router reports as "no result" rather than a failure.
    pub fn is_no_result(&self) -> bool {
        matches!(
            self,
            ExtractError::NotFound | ExtractError::Transient(_) | ExtractError::Malformed(_)
        )
    }
}

impl From<reqwest::Error> for ExtractError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ExtractError::Malformed(e.to_string())
        } else if let Some(status) = e.status() {
            ExtractError::from_status(status)
        } else {
            ExtractError::Transient(e.to_string())
        }
    }
}

impl From<serde_json::Error> for ExtractError {
    fn from(e: serde_json::Error) -> Self {
        ExtractError::Malformed(e.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MediaItem {
    Photo { url: String },
    Video { url: String },
}

impl MediaItem {
    pub fn photo(url: impl Into<String>) -> Self {
        MediaItem::Photo { url: url.into() }
    }

    pub fn video(url: impl Into<String>) -> Self {
        MediaItem::Video { url: url.into() }
    }

    pub fn url(&self) -> &str {
        match self {
            MediaItem::Photo { url } | MediaItem::Video { url } => url,
        }
    }
}

/// Ordered media items, capped at [`MAX_GROUP_SIZE`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaGroup {
    items: Vec<MediaItem>,
}

impl MediaGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(item: MediaItem) -> Self {
        Self { items: vec![item] }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[MediaItem] {
        &self.items
    }
}

impl FromIterator<MediaItem> for MediaGroup {
    fn from_iter<I: IntoIterator<Item = MediaItem>>(iter: I) -> Self {
        Self {
            items: iter.into_iter().take(MAX_GROUP_SIZE).collect(),
        }
    }
}

impl IntoIterator for MediaGroup {
    type Item = MediaItem;
    type IntoIter = std::vec::IntoIter<MediaItem>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}
