use super::{settle, ExtractError, Extractor, MediaGroup, MediaItem, MAX_GROUP_SIZE};
use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use serde::Deserialize;
use std::time::Duration;
use tracing::{info, warn};

pub const DEFAULT_API_BASE: &str = "https://douyin.wtf/api/hybrid/video_data";

/// Path fragments the API uses for content that is gone.
const UNAVAILABLE_MARKERS: &[&str] = &["deleted", "private"];

pub struct TikTokExtractor {
    client: reqwest::Client,
    api_base: String,
    user_agent: String,
}

impl TikTokExtractor {
    pub fn new(
        api_base: impl Into<String>,
        timeout: Duration,
        user_agent: impl Into<String>,
    ) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: reqwest::Client::builder().timeout(timeout).build()?,
            api_base: api_base.into(),
            user_agent: user_agent.into(),
        })
    }

    /// Check if URL points at content the API reports as gone
    pub fn is_unavailable(url: &str) -> bool {
        UNAVAILABLE_MARKERS.iter().any(|m| url.contains(m))
    }

    fn api_url(&self, url: &str) -> String {
        format!("{}?url={}", self.api_base, urlencoding::encode(url))
    }

    async fn do_extract(&self, url: &str) -> Result<Option<MediaGroup>, ExtractError> {
        let resp = self
            .client
            .get(self.api_url(url))
            .header(USER_AGENT, &self.user_agent)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(ExtractError::Malformed(format!(
                "video_data request failed: {}",
                resp.status()
            )));
        }

        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        if !content_type.contains("application/json") {
            return Err(ExtractError::Malformed(format!(
                "unexpected Content-Type: {}",
                content_type
            )));
        }

        let body: ApiResponse = resp.json().await?;
        let Some(data) = body.data else {
            warn!(url, "API response contained no 'data' field");
            return Ok(None);
        };

        parse_data(data).map(Some)
    }
}

#[async_trait]
impl Extractor for TikTokExtractor {
    fn name(&self) -> &'static str {
        "tiktok"
    }

    async fn resolve(&self, url: &str) -> Result<Option<MediaGroup>, ExtractError> {
        info!(url, "Processing tiktok url");

        if Self::is_unavailable(url) {
            return Err(ExtractError::Unavailable);
        }

        settle(self.name(), url, self.do_extract(url).await)
    }
}

fn parse_data(data: ApiData) -> Result<MediaGroup, ExtractError> {
    match data.content_type.as_deref() {
        Some("multi_photo") => {
            let images = data
                .image_post_info
                .map(|info| info.images)
                .ok_or_else(|| ExtractError::Malformed("multi_photo without images".into()))?;

            Ok(images
                .into_iter()
                .take(MAX_GROUP_SIZE)
                .filter_map(|image| image.display_image.url_list.into_iter().next())
                .map(MediaItem::photo)
                .collect())
        }
        _ => {
            let video_url = data
                .video
                .and_then(|v| v.play_addr)
                .and_then(|addr| addr.url_list.into_iter().next())
                .ok_or_else(|| ExtractError::Malformed("video without play_addr".into()))?;

            Ok(MediaGroup::single(MediaItem::video(video_url)))
        }
    }
}

// ============ Response structs ============

#[derive(Debug, Deserialize)]
struct ApiResponse {
    data: Option<ApiData>,
}

#[derive(Debug, Deserialize)]
struct ApiData {
    content_type: Option<String>,
    video: Option<ApiVideo>,
    image_post_info: Option<ApiImagePostInfo>,
}

#[derive(Debug, Deserialize)]
struct ApiVideo {
    play_addr: Option<UrlList>,
}

#[derive(Debug, Deserialize)]
struct ApiImagePostInfo {
    #[serde(default)]
    images: Vec<ApiImage>,
}

#[derive(Debug, Deserialize)]
struct ApiImage {
    display_image: UrlList,
}

#[derive(Debug, Deserialize)]
struct UrlList {
    #[serde(default)]
    url_list: Vec<String>,
}
