pub mod instagram;
pub mod tiktok;
mod types;
pub mod ytdlp;

pub use types::*;

use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

/// A service adapter: turns one service's links into media.
///
/// `Ok(None)` means nothing could be extracted; an empty group means the
/// service answered with no supported media.
#[async_trait]
pub trait Extractor: Send + Sync {
    fn name(&self) -> &'static str;

    async fn resolve(&self, url: &str) -> Result<Option<MediaGroup>, ExtractError>;
}

/// Host-token to extractor mapping. First registered match wins.
#[derive(Default, Clone)]
pub struct Registry {
    entries: Vec<(String, Arc<dyn Extractor>)>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, token: impl Into<String>, extractor: Arc<dyn Extractor>) -> Self {
        self.entries.push((token.into().to_lowercase(), extractor));
        self
    }

    /// Find the extractor whose token is contained in `host`.
    pub fn find(&self, host: &str) -> Option<&Arc<dyn Extractor>> {
        let host = host.to_lowercase();
        self.entries
            .iter()
            .find(|(token, _)| host.contains(token.as_str()))
            .map(|(_, extractor)| extractor)
    }

    pub fn tokens(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(token, _)| token.as_str())
    }
}

/// Turn "no result" class errors into `Ok(None)`, logging them.
pub(crate) fn settle(
    service: &str,
    url: &str,
    result: Result<Option<MediaGroup>, ExtractError>,
) -> Result<Option<MediaGroup>, ExtractError> {
    match result {
        Err(e) if e.is_no_result() => {
            warn!(service, url, error = %e, "extraction produced no result");
            Ok(None)
        }
        other => other,
    }
}
