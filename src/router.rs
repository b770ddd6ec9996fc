//! Link dispatch: pick the extractor for a message's first URL and turn the
//! outcome into a reply.

use crate::extractor::{ExtractError, MediaGroup, Registry};
use async_trait::async_trait;
use regex::Regex;
use std::sync::LazyLock;
use tracing::{error, info};
use url::Url;

pub const UNSUPPORTED_TEXT: &str = "Unsupported URL 😔";
pub const NO_MEDIA_TEXT: &str = "Could not extract any media from the link 😔";
pub const UNAVAILABLE_TEXT: &str = "❌ Video unavailable";

static URL_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"https?://\S+").unwrap());

/// What to send back for one inbound message.
#[derive(Debug)]
pub enum Reply {
    /// Message carried no usable link.
    Ignore,
    Media(MediaGroup),
    Text(&'static str),
    /// Extraction failed in a way the user is not told about; already logged.
    Suppressed(ExtractError),
}

/// Shows the chat that work is under way.
#[async_trait]
pub trait BusyIndicator: Send + Sync {
    async fn working(&self);
}

/// Indicator that does nothing.
pub struct NoIndicator;

#[async_trait]
impl BusyIndicator for NoIndicator {
    async fn working(&self) {}
}

pub struct LinkRouter {
    registry: Registry,
}

impl LinkRouter {
    pub fn new(registry: Registry) -> Self {
        Self { registry }
    }

    pub async fn handle(&self, text: &str, indicator: &dyn BusyIndicator) -> Reply {
        let Some((url, host)) = first_link(text) else {
            return Reply::Ignore;
        };

        let Some(extractor) = self.registry.find(&host) else {
            error!(url = %url, "Unsupported URL");
            return Reply::Text(UNSUPPORTED_TEXT);
        };

        indicator.working().await;
        info!(url = %url, service = extractor.name(), "Dispatching link");

        match extractor.resolve(&url).await {
            Ok(Some(group)) if !group.is_empty() => Reply::Media(group),
            Ok(_) | Err(ExtractError::NotFound) => Reply::Text(NO_MEDIA_TEXT),
            Err(ExtractError::Unavailable) => Reply::Text(UNAVAILABLE_TEXT),
            Err(ExtractError::Unsupported(_)) => Reply::Text(UNSUPPORTED_TEXT),
            Err(e) => {
                error!(url = %url, service = extractor.name(), error = %e, "Unexpected error occurred");
                Reply::Suppressed(e)
            }
        }
    }
}

/// First URL in `text` and its lowercased hostname.
fn first_link(text: &str) -> Option<(String, String)> {
    let url = URL_REGEX.find(text)?.as_str();
    let host = Url::parse(url).ok()?.host_str()?.to_lowercase();
    if host.is_empty() {
        return None;
    }
    Some((url.to_string(), host))
}
