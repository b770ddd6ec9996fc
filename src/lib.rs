pub mod bot;
pub mod config;
pub mod extractor;
pub mod router;

#[cfg(test)]
mod test_support;

use config::Config;
use extractor::instagram::{InstagramClientFactory, InstagramExtractor, SessionManager};
use extractor::tiktok::TikTokExtractor;
use extractor::ytdlp::YtDlpExtractor;
use extractor::Registry;
use std::sync::Arc;

/// Host tokens handled by the yt-dlp extractor when it is enabled.
const YTDLP_TOKENS: &[&str] = &["youtube", "youtu.be"];

// ============ REGISTRY ============

/// Build the service registry. Order matters: first matching token wins.
pub fn build_registry(
    config: &Config,
    sessions: Arc<SessionManager<InstagramClientFactory>>,
) -> Result<Registry, reqwest::Error> {
    let tiktok = TikTokExtractor::new(
        config.tiktok.api_base.clone(),
        config.tiktok_timeout(),
        config.user_agent.clone(),
    )?;
    let instagram = InstagramExtractor::new(sessions, config.user_agent.clone())?;

    let mut registry = Registry::new()
        .register("tiktok", Arc::new(tiktok))
        .register("instagram", Arc::new(instagram));

    if config.ytdlp.enabled {
        let ytdlp = Arc::new(YtDlpExtractor::new(
            config.ytdlp.binary.clone(),
            config.ytdlp.cookies.clone(),
            config.ytdlp_timeout(),
        ));
        for token in YTDLP_TOKENS {
            registry = registry.register(*token, ytdlp.clone());
        }
    }

    Ok(registry)
}
