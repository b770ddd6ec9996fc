use super::session::{ClientFactory, SessionError};
use crate::extractor::ExtractError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, COOKIE, USER_AGENT};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use url::Url;

pub const DEFAULT_API_BASE: &str = "https://i.instagram.com/api/v1/";
pub const DEFAULT_USER_AGENT: &str = "Instagram 269.0.0.18.75 Android (26/8.0.0; 480dpi; 1080x1920; OnePlus; 6T Dev; devitron; qcom; en_US; 314665256)";
const APP_ID: &str = "567067343352427";

const SHORTCODE_ALPHABET: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_";
/// Private-post shortcodes carry a 28 character suffix after the id.
const SHORTCODE_SUFFIX_LEN: usize = 28;

pub const MEDIA_TYPE_PHOTO: i64 = 1;
pub const MEDIA_TYPE_VIDEO: i64 = 2;
pub const MEDIA_TYPE_ALBUM: i64 = 8;

/// Calls the Instagram adapter makes against a logged-in session.
#[async_trait]
pub trait InstagramApi: Send + Sync {
    /// Cheap request that succeeds only while the session is accepted.
    async fn probe(&self) -> Result<(), ExtractError>;

    async fn media_pk_from_url(&self, url: &str) -> Result<String, ExtractError>;

    async fn media_info(&self, pk: &str) -> Result<MediaInfo, ExtractError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaInfo {
    pub media_type: i64,
    pub thumbnail_url: Option<String>,
    pub video_url: Option<String>,
    pub resources: Vec<MediaInfo>,
}

/// Everything needed to resume a session without logging in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSettings {
    pub uuid: String,
    pub device_id: String,
    pub user_agent: String,
    #[serde(default)]
    pub cookies: BTreeMap<String, String>,
    #[serde(default)]
    pub authorization: Option<String>,
    #[serde(default)]
    pub last_login: Option<DateTime<Utc>>,
}

impl SessionSettings {
    fn new_device(user_agent: &str) -> Self {
        let uuid = uuid::Uuid::new_v4().to_string();
        let digest = format!("{:x}", md5::compute(uuid.as_bytes()));
        Self {
            device_id: format!("android-{}", &digest[..16]),
            uuid,
            user_agent: user_agent.to_string(),
            cookies: BTreeMap::new(),
            authorization: None,
            last_login: None,
        }
    }

    fn cookie_header(&self) -> String {
        self.cookies
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("; ")
    }

    fn has_session(&self) -> bool {
        self.cookies.contains_key("sessionid") || self.authorization.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub api_base: String,
    pub user_agent: String,
    pub timeout: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

pub struct InstagramClient {
    http: reqwest::Client,
    api_base: Url,
    settings: SessionSettings,
}

impl InstagramClient {
    pub fn new(options: &ClientOptions, settings: SessionSettings) -> Result<Self, SessionError> {
        let mut api_base = Url::parse(&options.api_base)
            .map_err(|e| SessionError::Login(format!("invalid api base: {}", e)))?;
        if !api_base.path().ends_with('/') {
            let path = format!("{}/", api_base.path());
            api_base.set_path(&path);
        }

        let http = reqwest::Client::builder()
            .timeout(options.timeout)
            .build()
            .map_err(ExtractError::from)?;

        Ok(Self {
            http,
            api_base,
            settings,
        })
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    fn endpoint(&self, path: &str) -> Result<Url, ExtractError> {
        self.api_base
            .join(path)
            .map_err(|e| ExtractError::Malformed(e.to_string()))
    }

    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Ok(ua) = HeaderValue::from_str(&self.settings.user_agent) {
            headers.insert(USER_AGENT, ua);
        }
        headers.insert("x-ig-app-id", HeaderValue::from_static(APP_ID));
        if !self.settings.cookies.is_empty() {
            if let Ok(cookie) = HeaderValue::from_str(&self.settings.cookie_header()) {
                headers.insert(COOKIE, cookie);
            }
        }
        if let Some(auth) = self
            .settings
            .authorization
            .as_deref()
            .and_then(|a| HeaderValue::from_str(a).ok())
        {
            headers.insert(AUTHORIZATION, auth);
        }
        if let Some(csrf) = self
            .settings
            .cookies
            .get("csrftoken")
            .and_then(|c| HeaderValue::from_str(c).ok())
        {
            headers.insert("x-csrftoken", csrf);
        }
        headers
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ExtractError> {
        let resp = self
            .http
            .get(self.endpoint(path)?)
            .headers(self.headers())
            .send()
            .await?;
        read_json(resp).await
    }

    async fn login(mut self, username: &str, password: &str) -> Result<Self, SessionError> {
        let enc_password = format!("#PWD_INSTAGRAM:0:{}:{}", Utc::now().timestamp(), password);
        let form = [
            ("username", username),
            ("enc_password", enc_password.as_str()),
            ("device_id", self.settings.device_id.as_str()),
            ("guid", self.settings.uuid.as_str()),
            ("login_attempt_count", "0"),
        ];

        let resp = self
            .http
            .post(self.endpoint("accounts/login/")?)
            .headers(self.headers())
            .form(&form)
            .send()
            .await
            .map_err(ExtractError::from)?;

        for cookie in resp.cookies() {
            self.settings
                .cookies
                .insert(cookie.name().to_string(), cookie.value().to_string());
        }
        if let Some(auth) = resp
            .headers()
            .get("ig-set-authorization")
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
        {
            self.settings.authorization = Some(auth.to_string());
        }

        let status = resp.status();
        let body = resp.text().await.map_err(ExtractError::from)?;
        if !status.is_success() {
            let err: ApiError = serde_json::from_str(&body).unwrap_or_default();
            return Err(SessionError::Login(
                err.message
                    .or(err.error_type)
                    .unwrap_or_else(|| status.to_string()),
            ));
        }
        if !self.settings.has_session() {
            return Err(SessionError::Login("no session cookie in login response".into()));
        }

        self.settings.last_login = Some(Utc::now());
        Ok(self)
    }
}

#[async_trait]
impl InstagramApi for InstagramClient {
    async fn probe(&self) -> Result<(), ExtractError> {
        let _: serde_json::Value = self.get_json("accounts/current_user/?edit=true").await?;
        Ok(())
    }

    async fn media_pk_from_url(&self, url: &str) -> Result<String, ExtractError> {
        media_pk_from_url(url)
    }

    async fn media_info(&self, pk: &str) -> Result<MediaInfo, ExtractError> {
        let resp: MediaInfoResponse = self.get_json(&format!("media/{}/info/", pk)).await?;
        resp.items
            .into_iter()
            .next()
            .map(ApiMedia::into_media_info)
            .ok_or(ExtractError::NotFound)
    }
}

/// Builds [`InstagramClient`]s and (de)serializes their sessions as JSON.
#[derive(Debug, Clone, Default)]
pub struct InstagramClientFactory {
    options: ClientOptions,
}

impl InstagramClientFactory {
    pub fn new(options: ClientOptions) -> Self {
        Self { options }
    }
}

#[async_trait]
impl ClientFactory for InstagramClientFactory {
    type Client = InstagramClient;

    fn restore(&self, blob: &str) -> Result<InstagramClient, SessionError> {
        let settings: SessionSettings = serde_json::from_str(blob)?;
        InstagramClient::new(&self.options, settings)
    }

    async fn login(&self, username: &str, password: &str) -> Result<InstagramClient, SessionError> {
        let settings = SessionSettings::new_device(&self.options.user_agent);
        InstagramClient::new(&self.options, settings)?
            .login(username, password)
            .await
    }

    fn dump(&self, client: &InstagramClient) -> Result<String, SessionError> {
        Ok(serde_json::to_string_pretty(client.settings())?)
    }
}

/// Decode a post shortcode into the numeric media id.
fn media_pk_from_code(code: &str) -> Option<String> {
    let code = if code.len() > SHORTCODE_SUFFIX_LEN {
        &code[..code.len() - SHORTCODE_SUFFIX_LEN]
    } else {
        code
    };
    if code.is_empty() {
        return None;
    }

    let mut pk: u128 = 0;
    for c in code.bytes() {
        let idx = SHORTCODE_ALPHABET.iter().position(|&a| a == c)? as u128;
        pk = pk.checked_mul(64)?.checked_add(idx)?;
    }
    Some(pk.to_string())
}

/// Extract the media id from a post, reel or tv URL.
fn media_pk_from_url(url: &str) -> Result<String, ExtractError> {
    let parsed = Url::parse(url).map_err(|_| ExtractError::Malformed(format!("invalid URL: {}", url)))?;
    let segments: Vec<&str> = parsed
        .path_segments()
        .map(|s| s.filter(|seg| !seg.is_empty()).collect())
        .unwrap_or_default();

    segments
        .windows(2)
        .find(|w| matches!(w[0], "p" | "reel" | "reels" | "tv"))
        .and_then(|w| media_pk_from_code(w[1]))
        .ok_or_else(|| ExtractError::Malformed(format!("no media code in URL: {}", url)))
}

async fn read_json<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, ExtractError> {
    let status = resp.status();
    let body = resp.text().await?;
    if status.is_success() {
        return Ok(serde_json::from_str(&body)?);
    }
    let err: ApiError = serde_json::from_str(&body).unwrap_or_default();
    Err(classify_error(status, &err))
}

fn classify_error(status: reqwest::StatusCode, err: &ApiError) -> ExtractError {
    match err.message.as_deref() {
        Some("login_required") | Some("challenge_required") => ExtractError::AuthExpired,
        Some(m) if m.starts_with("Media not found") => ExtractError::NotFound,
        _ => ExtractError::from_status(status),
    }
}

// ============ Response structs ============

#[derive(Debug, Default, Deserialize)]
struct ApiError {
    message: Option<String>,
    error_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MediaInfoResponse {
    #[serde(default)]
    items: Vec<ApiMedia>,
}

#[derive(Debug, Deserialize)]
struct ApiMedia {
    media_type: i64,
    image_versions2: Option<ImageVersions>,
    #[serde(default)]
    video_versions: Vec<Candidate>,
    #[serde(default)]
    carousel_media: Vec<ApiMedia>,
}

#[derive(Debug, Deserialize)]
struct ImageVersions {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    url: String,
}

impl ApiMedia {
    fn into_media_info(self) -> MediaInfo {
        MediaInfo {
            media_type: self.media_type,
            thumbnail_url: self
                .image_versions2
                .and_then(|v| v.candidates.into_iter().next())
                .map(|c| c.url),
            video_url: self.video_versions.into_iter().next().map(|c| c.url),
            resources: self
                .carousel_media
                .into_iter()
                .map(ApiMedia::into_media_info)
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::serve;
    use axum::extract::Path as AxumPath;
    use axum::http::{header, HeaderMap as AxumHeaders, StatusCode};
    use axum::response::{AppendHeaders, IntoResponse};
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::json;

    #[test]
    fn shortcode_decoding_matches_known_ids() {
        assert_eq!(
            media_pk_from_code("B-fKL9qpeab").as_deref(),
            Some("2278584739065882267")
        );
        assert_eq!(
            media_pk_from_code("B8jnuB2HAbyc0q001y3F9CHRSoqEljK_dgkJjo0").as_deref(),
            Some("2243811726252050162")
        );
        assert_eq!(media_pk_from_code("bad!code"), None);
    }

    #[test]
    fn pk_from_post_reel_and_tv_urls() {
        for url in [
            "https://www.instagram.com/p/B-fKL9qpeab/",
            "https://www.instagram.com/reel/B-fKL9qpeab/?igsh=abc",
            "https://instagram.com/someone/tv/B-fKL9qpeab",
        ] {
            assert_eq!(media_pk_from_url(url).unwrap(), "2278584739065882267");
        }
        assert!(matches!(
            media_pk_from_url("https://www.instagram.com/someone/"),
            Err(ExtractError::Malformed(_))
        ));
    }

    #[test]
    fn error_messages_are_classified() {
        let login = ApiError {
            message: Some("login_required".into()),
            error_type: None,
        };
        assert!(matches!(
            classify_error(StatusCode::BAD_REQUEST, &login),
            ExtractError::AuthExpired
        ));

        let missing = ApiError {
            message: Some("Media not found or unavailable".into()),
            error_type: None,
        };
        assert!(matches!(
            classify_error(StatusCode::BAD_REQUEST, &missing),
            ExtractError::NotFound
        ));
    }

    fn options(base: &str) -> ClientOptions {
        ClientOptions {
            api_base: format!("{}/api/v1", base),
            ..ClientOptions::default()
        }
    }

    #[tokio::test]
    async fn login_collects_session_and_round_trips_through_factory() {
        let app = Router::new()
            .route(
                "/api/v1/accounts/login/",
                post(|| async {
                    (
                        AppendHeaders([
                            (header::SET_COOKIE, "sessionid=abc123; Path=/"),
                            (header::SET_COOKIE, "csrftoken=tok; Path=/"),
                        ]),
                        Json(json!({"status": "ok", "logged_in_user": {"pk": 1}})),
                    )
                        .into_response()
                }),
            )
            .route(
                "/api/v1/accounts/current_user/",
                get(|headers: AxumHeaders| async move {
                    let cookie = headers
                        .get(header::COOKIE)
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("");
                    if cookie.contains("sessionid=abc123") {
                        Json(json!({"status": "ok"})).into_response()
                    } else {
                        (
                            StatusCode::FORBIDDEN,
                            Json(json!({"message": "login_required"})),
                        )
                            .into_response()
                    }
                }),
            );
        let base = serve(app).await;
        let factory = InstagramClientFactory::new(options(&base));

        let client = factory.login("quill", "secret").await.unwrap();
        client.probe().await.unwrap();

        let blob = factory.dump(&client).unwrap();
        let restored = factory.restore(&blob).unwrap();
        restored.probe().await.unwrap();
        assert_eq!(restored.settings().device_id, client.settings().device_id);

        let anonymous = InstagramClient::new(
            &options(&base),
            SessionSettings::new_device(DEFAULT_USER_AGENT),
        )
        .unwrap();
        assert!(matches!(
            anonymous.probe().await,
            Err(ExtractError::AuthExpired)
        ));
    }

    #[tokio::test]
    async fn rejected_login_reports_message() {
        let app = Router::new().route(
            "/api/v1/accounts/login/",
            post(|| async {
                (
                    StatusCode::BAD_REQUEST,
                    Json(json!({"message": "bad_password", "error_type": "bad_password"})),
                )
            }),
        );
        let base = serve(app).await;
        let factory = InstagramClientFactory::new(options(&base));

        match factory.login("quill", "wrong").await {
            Err(SessionError::Login(msg)) => assert_eq!(msg, "bad_password"),
            other => panic!("unexpected: {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn media_info_maps_carousel() {
        let app = Router::new().route(
            "/api/v1/media/{pk}/info/",
            get(|AxumPath(pk): AxumPath<String>| async move {
                if pk != "42" {
                    return (
                        StatusCode::NOT_FOUND,
                        Json(json!({"message": "Media not found or unavailable"})),
                    )
                        .into_response();
                }
                Json(json!({"items": [{
                    "media_type": 8,
                    "carousel_media": [
                        {"media_type": 1, "image_versions2": {"candidates": [{"url": "https://cdn/p1.jpg"}]}},
                        {"media_type": 2, "image_versions2": {"candidates": [{"url": "https://cdn/t.jpg"}]},
                         "video_versions": [{"url": "https://cdn/v1.mp4"}]}
                    ]
                }]}))
                .into_response()
            }),
        );
        let base = serve(app).await;
        let client = InstagramClient::new(
            &options(&base),
            SessionSettings::new_device(DEFAULT_USER_AGENT),
        )
        .unwrap();

        let info = client.media_info("42").await.unwrap();
        assert_eq!(info.media_type, MEDIA_TYPE_ALBUM);
        assert_eq!(info.resources.len(), 2);
        assert_eq!(info.resources[0].thumbnail_url.as_deref(), Some("https://cdn/p1.jpg"));
        assert_eq!(info.resources[1].video_url.as_deref(), Some("https://cdn/v1.mp4"));

        assert!(matches!(
            client.media_info("7").await,
            Err(ExtractError::NotFound)
        ));
    }
}
