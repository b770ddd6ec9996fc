//! Lifecycle of the authenticated Instagram client.
//!
//! One client lives behind a mutex that doubles as the single-flight gate:
//! every `acquire` runs under it, so concurrent callers during a cold start
//! or a re-login wait for the same attempt instead of logging in again.

use super::client::InstagramApi;
use crate::extractor::ExtractError;
use async_trait::async_trait;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Instagram credentials are not configured")]
    MissingCredentials,
    #[error("Login failed: {0}")]
    Login(String),
    #[error("Remote error: {0}")]
    Remote(#[from] ExtractError),
    #[error("Session file error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Session file could not be replaced: {0}")]
    Persist(#[from] tempfile::PersistError),
    #[error("Session encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Builds clients either from a stored session blob or a fresh login.
#[async_trait]
pub trait ClientFactory: Send + Sync {
    type Client: InstagramApi + 'static;

    /// Rebuild a client from a session blob. No network access.
    fn restore(&self, blob: &str) -> Result<Self::Client, SessionError>;

    async fn login(&self, username: &str, password: &str) -> Result<Self::Client, SessionError>;

    /// Serialize the client's session for [`ClientFactory::restore`].
    fn dump(&self, client: &Self::Client) -> Result<String, SessionError>;
}

pub struct SessionManager<F: ClientFactory> {
    factory: F,
    credentials: Option<Credentials>,
    session_file: PathBuf,
    current: Mutex<Option<Arc<F::Client>>>,
}

impl<F: ClientFactory> SessionManager<F> {
    pub fn new(factory: F, credentials: Option<Credentials>, session_file: impl Into<PathBuf>) -> Self {
        Self {
            factory,
            credentials,
            session_file: session_file.into(),
            current: Mutex::new(None),
        }
    }

    /// Get a live client, restoring or logging in when needed.
    pub async fn acquire(&self) -> Result<Arc<F::Client>, SessionError> {
        let mut current = self.current.lock().await;

        if let Some(client) = current.as_ref() {
            match client.probe().await {
                Ok(()) => {
                    debug!("Reusing validated Instagram session");
                    return Ok(Arc::clone(client));
                }
                // A network failure says nothing about the session; keep it.
                Err(e @ ExtractError::Transient(_)) => {
                    warn!(error = %e, "Instagram liveness probe failed, keeping session");
                    return Err(SessionError::Remote(e));
                }
                Err(e) => warn!(error = %e, "Current Instagram session failed liveness probe"),
            }
            *current = None;
        }

        let client = Arc::new(self.initialize().await?);
        *current = Some(Arc::clone(&client));
        Ok(client)
    }

    /// Drop the current client. The session file is kept.
    pub async fn invalidate(&self) {
        *self.current.lock().await = None;
    }

    /// Drop the current client only if it is still `stale`.
    ///
    /// A caller holding an old handle must not throw away a client that
    /// another task already re-initialized.
    pub async fn invalidate_stale(&self, stale: &Arc<F::Client>) {
        let mut current = self.current.lock().await;
        if current.as_ref().is_some_and(|c| Arc::ptr_eq(c, stale)) {
            *current = None;
        }
    }

    async fn initialize(&self) -> Result<F::Client, SessionError> {
        if let Some(client) = self.restore_from_disk().await {
            return Ok(client);
        }
        self.login().await
    }

    async fn restore_from_disk(&self) -> Option<F::Client> {
        let blob = match tokio::fs::read_to_string(&self.session_file).await {
            Ok(blob) => blob,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %self.session_file.display(), "No stored Instagram session");
                return None;
            }
            Err(e) => {
                warn!(path = %self.session_file.display(), error = %e, "Could not read stored session");
                return None;
            }
        };

        let client = match self.factory.restore(&blob) {
            Ok(client) => client,
            Err(e) => {
                warn!(error = %e, "Stored Instagram session is unreadable");
                return None;
            }
        };

        match client.probe().await {
            Ok(()) => {
                info!("Restored Instagram session from disk");
                Some(client)
            }
            Err(e) => {
                warn!(error = %e, "Stored Instagram session was rejected");
                None
            }
        }
    }

    async fn login(&self) -> Result<F::Client, SessionError> {
        let creds = self
            .credentials
            .as_ref()
            .ok_or(SessionError::MissingCredentials)?;

        info!(username = %creds.username, "Logging in to Instagram");
        let client = self.factory.login(&creds.username, &creds.password).await?;
        client.probe().await?;
        self.persist(&client).await?;
        info!(path = %self.session_file.display(), "Instagram session saved");
        Ok(client)
    }

    async fn persist(&self, client: &F::Client) -> Result<(), SessionError> {
        let blob = self.factory.dump(client)?;
        let path = self.session_file.clone();
        tokio::task::spawn_blocking(move || write_atomic(&path, &blob))
            .await
            .map_err(|e| SessionError::Io(std::io::Error::other(e)))?
    }
}

/// Write via a sibling temp file and rename, so readers never see a partial file.
fn write_atomic(path: &Path, contents: &str) -> Result<(), SessionError> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(contents.as_bytes())?;
    tmp.as_file().sync_all()?;
    tmp.persist(path)?;
    Ok(())
}
