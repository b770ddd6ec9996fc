use crate::extractor::instagram::{self, ClientOptions, Credentials};
use crate::extractor::{tiktok, ytdlp};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Could not read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid config file: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Missing required setting: {0}")]
    Missing(&'static str),
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TelegramConfig {
    #[serde(default)]
    pub bot_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstagramConfig {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_session_file")]
    pub session_file: PathBuf,
    #[serde(default = "default_instagram_api")]
    pub api_base: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for InstagramConfig {
    fn default() -> Self {
        Self {
            username: None,
            password: None,
            session_file: default_session_file(),
            api_base: default_instagram_api(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl InstagramConfig {
    pub fn credentials(&self) -> Option<Credentials> {
        match (&self.username, &self.password) {
            (Some(username), Some(password)) => Some(Credentials {
                username: username.clone(),
                password: password.clone(),
            }),
            _ => None,
        }
    }

    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            api_base: self.api_base.clone(),
            timeout: Duration::from_secs(self.timeout_secs),
            ..ClientOptions::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TikTokConfig {
    #[serde(default = "default_tiktok_api")]
    pub api_base: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for TikTokConfig {
    fn default() -> Self {
        Self {
            api_base: default_tiktok_api(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YtDlpConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_ytdlp_binary")]
    pub binary: String,
    /// Netscape-format cookie jar contents.
    #[serde(default)]
    pub cookies: Option<String>,
    #[serde(default = "default_ytdlp_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for YtDlpConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            binary: default_ytdlp_binary(),
            cookies: None,
            timeout_secs: default_ytdlp_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub instagram: InstagramConfig,
    #[serde(default)]
    pub tiktok: TikTokConfig,
    #[serde(default)]
    pub ytdlp: YtDlpConfig,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_user_agent() -> String {
    concat!("quillgeist/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_session_file() -> PathBuf {
    config_dir().join("instagram_session.json")
}

fn default_instagram_api() -> String {
    instagram::DEFAULT_API_BASE.to_string()
}

fn default_tiktok_api() -> String {
    tiktok::DEFAULT_API_BASE.to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_ytdlp_binary() -> String {
    ytdlp::DEFAULT_BINARY.to_string()
}

fn default_ytdlp_timeout_secs() -> u64 {
    60
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            user_agent: default_user_agent(),
            telegram: TelegramConfig::default(),
            instagram: InstagramConfig::default(),
            tiktok: TikTokConfig::default(),
            ytdlp: YtDlpConfig::default(),
        }
    }
}

impl Config {
    /// Apply environment overrides from a lookup function.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(token) = get("BOT_TOKEN") {
            self.telegram.bot_token = Some(token);
        }
        if let Some(username) = get("IG_USERNAME") {
            self.instagram.username = Some(username);
        }
        if let Some(password) = get("IG_PASSWORD") {
            self.instagram.password = Some(password);
        }
        if let Some(path) = get("QUILLGEIST_SESSION_FILE") {
            self.instagram.session_file = PathBuf::from(path);
        }
        if let Some(cookies) = get("YDL_COOKIES") {
            self.ytdlp.cookies = Some(cookies);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.telegram.bot_token.as_deref().unwrap_or("").is_empty() {
            return Err(ConfigError::Missing("telegram.bot_token (BOT_TOKEN)"));
        }
        Ok(())
    }

    pub fn tiktok_timeout(&self) -> Duration {
        Duration::from_secs(self.tiktok.timeout_secs)
    }

    pub fn ytdlp_timeout(&self) -> Duration {
        Duration::from_secs(self.ytdlp.timeout_secs)
    }
}

fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("quillgeist")
}

pub fn config_path() -> PathBuf {
    std::env::var_os("QUILLGEIST_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|| config_dir().join("config.yml"))
}

pub fn load_from(path: &std::path::Path) -> Result<Config, ConfigError> {
    if path.exists() {
        let contents = fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&contents)?)
    } else {
        Ok(Config::default())
    }
}

/// Load `.env`, the config file, then environment overrides.
pub fn get_config() -> Result<Config, ConfigError> {
    let _ = dotenvy::dotenv();
    let mut config = load_from(&config_path())?;
    config.apply_env(|key| std::env::var(key).ok());
    Ok(config)
}
