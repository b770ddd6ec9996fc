use super::{settle, ExtractError, Extractor, MediaGroup, MediaItem};
use async_trait::async_trait;
use serde::Deserialize;
use std::io::Write;
use std::time::Duration;
use tempfile::NamedTempFile;
use tokio::process::Command;
use tracing::{info, warn};

pub const DEFAULT_BINARY: &str = "yt-dlp";

/// Resolves links through a local yt-dlp install.
pub struct YtDlpExtractor {
    binary: String,
    cookies: Option<String>,
    timeout: Duration,
}

impl YtDlpExtractor {
    pub fn new(binary: impl Into<String>, cookies: Option<String>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            cookies: cookies.filter(|c| !c.trim().is_empty()),
            timeout,
        }
    }

    /// Netscape cookie jar for yt-dlp, removed when dropped.
    fn cookie_file(&self) -> Result<Option<NamedTempFile>, ExtractError> {
        let Some(cookies) = &self.cookies else {
            warn!("yt-dlp cookies not set. Proceeding without authentication");
            return Ok(None);
        };

        let mut file = NamedTempFile::new()
            .map_err(|e| ExtractError::Transient(format!("cookie file: {}", e)))?;
        file.write_all(cookies.as_bytes())
            .map_err(|e| ExtractError::Transient(format!("cookie file: {}", e)))?;
        Ok(Some(file))
    }

    async fn do_extract(&self, url: &str) -> Result<Option<MediaGroup>, ExtractError> {
        let cookie_file = self.cookie_file()?;

        let mut cmd = Command::new(&self.binary);
        cmd.args(["-J", "--no-playlist", "--quiet", "--no-warnings"]);
        if let Some(file) = &cookie_file {
            cmd.arg("--cookies").arg(file.path());
        }
        cmd.arg(url).kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| ExtractError::Transient("yt-dlp timed out".into()))?
            .map_err(|e| ExtractError::Transient(format!("failed to run yt-dlp: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ExtractError::Malformed(format!(
                "yt-dlp exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let info: VideoInfo = serde_json::from_slice(&output.stdout)?;
        match pick_premerged_format(&info) {
            Some(format) => {
                info!(format_id = ?format.format_id, height = ?format.height, "Found pre-merged format");
                Ok(format
                    .url
                    .clone()
                    .map(|u| MediaGroup::single(MediaItem::video(u))))
            }
            None => {
                warn!(url, "No pre-merged video format found");
                Ok(None)
            }
        }
    }
}

#[async_trait]
impl Extractor for YtDlpExtractor {
    fn name(&self) -> &'static str {
        "yt-dlp"
    }

    async fn resolve(&self, url: &str) -> Result<Option<MediaGroup>, ExtractError> {
        info!(url, "Extracting info with yt-dlp");
        settle(self.name(), url, self.do_extract(url).await)
    }
}

/// Last listed format carrying both audio and video. yt-dlp sorts best last.
fn pick_premerged_format(info: &VideoInfo) -> Option<&VideoFormat> {
    info.formats.iter().rev().find(|f| {
        f.url.is_some() && has_codec(&f.vcodec) && has_codec(&f.acodec)
    })
}

/// Only an explicit "none" marks a missing stream.
fn has_codec(codec: &Option<String>) -> bool {
    codec.as_deref() != Some("none")
}

#[derive(Debug, Deserialize)]
struct VideoInfo {
    #[serde(default)]
    formats: Vec<VideoFormat>,
}

#[derive(Debug, Deserialize)]
struct VideoFormat {
    format_id: Option<String>,
    url: Option<String>,
    vcodec: Option<String>,
    acodec: Option<String>,
    height: Option<u32>,
}
