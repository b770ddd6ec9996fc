mod client;
mod session;

pub use client::{
    ClientOptions, InstagramApi, InstagramClient, InstagramClientFactory, MediaInfo,
    SessionSettings, DEFAULT_API_BASE, MEDIA_TYPE_ALBUM, MEDIA_TYPE_PHOTO, MEDIA_TYPE_VIDEO,
};
pub use session::{ClientFactory, Credentials, SessionError, SessionManager};

use super::{settle, ExtractError, Extractor, MediaGroup, MediaItem, MAX_GROUP_SIZE};
use async_trait::async_trait;
use reqwest::header::USER_AGENT;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use url::Url;

pub const SHARE_LINK_TIMEOUT: Duration = Duration::from_secs(5);

pub struct InstagramExtractor<F: ClientFactory = InstagramClientFactory> {
    sessions: Arc<SessionManager<F>>,
    http: reqwest::Client,
    user_agent: String,
}

impl<F: ClientFactory> InstagramExtractor<F> {
    pub fn new(
        sessions: Arc<SessionManager<F>>,
        user_agent: impl Into<String>,
    ) -> Result<Self, reqwest::Error> {
        Ok(Self {
            sessions,
            http: reqwest::Client::builder()
                .timeout(SHARE_LINK_TIMEOUT)
                .build()?,
            user_agent: user_agent.into(),
        })
    }

    /// Check if URL is a share link that redirects to the real post
    pub fn is_share_link(url: &str) -> bool {
        Url::parse(url)
            .map(|u| u.path().starts_with("/share/"))
            .unwrap_or(false)
    }

    async fn resolve_share_link(&self, url: &str) -> Result<String, ExtractError> {
        let resp = self
            .http
            .get(url)
            .header(USER_AGENT, &self.user_agent)
            .send()
            .await
            .map_err(|e| ExtractError::Transient(format!("share link: {}", e)))?;

        let resolved = resp.url().to_string();
        debug!(url, resolved = %resolved, "Resolved share link");
        Ok(resolved)
    }

    async fn fetch(&self, client: &F::Client, url: &str) -> Result<MediaGroup, ExtractError> {
        let pk = client.media_pk_from_url(url).await?;
        let info = client.media_info(&pk).await?;
        media_group_from_info(info)
    }

    async fn do_extract(&self, url: &str) -> Result<Option<MediaGroup>, ExtractError> {
        let url = if Self::is_share_link(url) {
            self.resolve_share_link(url).await?
        } else {
            url.to_string()
        };

        let client = self.sessions.acquire().await.map_err(session_failure)?;
        match self.fetch(&client, &url).await {
            Err(ExtractError::AuthExpired) => {
                warn!(url = %url, "Instagram session expired mid-call, re-initializing");
                self.sessions.invalidate_stale(&client).await;
                let client = self.sessions.acquire().await.map_err(session_failure)?;
                self.fetch(&client, &url).await.map(Some)
            }
            other => other.map(Some),
        }
    }
}

#[async_trait]
impl<F: ClientFactory + 'static> Extractor for InstagramExtractor<F> {
    fn name(&self) -> &'static str {
        "instagram"
    }

    async fn resolve(&self, url: &str) -> Result<Option<MediaGroup>, ExtractError> {
        info!(url, "Processing Instagram url");
        settle(self.name(), url, self.do_extract(url).await)
    }
}

fn session_failure(e: SessionError) -> ExtractError {
    match e {
        SessionError::Remote(inner) => inner,
        other => {
            error!(error = %other, "Could not initialize Instagram session");
            ExtractError::Transient(other.to_string())
        }
    }
}

/// Map Instagram's media kinds onto a media group.
pub fn media_group_from_info(info: MediaInfo) -> Result<MediaGroup, ExtractError> {
    match info.media_type {
        MEDIA_TYPE_PHOTO => info
            .thumbnail_url
            .map(|url| MediaGroup::single(MediaItem::photo(url)))
            .ok_or_else(|| ExtractError::Malformed("photo without thumbnail_url".into())),
        MEDIA_TYPE_VIDEO => info
            .video_url
            .map(|url| MediaGroup::single(MediaItem::video(url)))
            .ok_or_else(|| ExtractError::Malformed("video without video_url".into())),
        MEDIA_TYPE_ALBUM => Ok(info
            .resources
            .into_iter()
            .take(MAX_GROUP_SIZE)
            .filter_map(resource_item)
            .collect()),
        other => {
            debug!(media_type = other, "Unsupported Instagram media type");
            Ok(MediaGroup::new())
        }
    }
}

fn resource_item(resource: MediaInfo) -> Option<MediaItem> {
    match resource.media_type {
        MEDIA_TYPE_PHOTO => resource.thumbnail_url.map(MediaItem::photo),
        MEDIA_TYPE_VIDEO => resource.video_url.map(MediaItem::video),
        other => {
            debug!(media_type = other, "Skipping unsupported album item");
            None
        }
    }
}
