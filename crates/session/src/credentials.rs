//! Credential storage for the active session
//!
//! Holds at most one credential pair. Reads come from memory and are
//! immediately consistent: a renewal that replaced the access token is
//! visible to the very next read. Writes update memory first, then persist
//! the snapshot to a JSON file using atomic temp-file + rename. A tokio Mutex
//! serializes writes so the file always reflects the last write.
//!
//! The file survives process restarts, so a login from one invocation of the
//! CLI is reused by the next. `clear()` is the only way to end a session.

use std::fmt;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::token::TokenResponse;

/// The session's credential pair plus the opaque profile returned at login.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Credential {
    /// Usually "bearer"
    #[serde(default = "default_token_type")]
    pub token_type: String,
    /// Current access token, sent on every credentialed request
    pub access: String,
    /// Renewal token; without one, any renewal fails immediately
    #[serde(default)]
    pub renewal: Option<String>,
    /// User record from the login response, passed through unread
    #[serde(default)]
    pub profile: Option<serde_json::Value>,
}

fn default_token_type() -> String {
    "bearer".into()
}

impl Credential {
    pub fn new(access: impl Into<String>, renewal: Option<String>) -> Self {
        Self {
            token_type: default_token_type(),
            access: access.into(),
            renewal,
            profile: None,
        }
    }
}

impl From<TokenResponse> for Credential {
    fn from(response: TokenResponse) -> Self {
        let profile = if response.user.is_null() {
            None
        } else {
            Some(response.user)
        };
        Self {
            token_type: response.token_type,
            access: response.access_token,
            renewal: response.refresh_token,
            profile,
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("token_type", &self.token_type)
            .field("access", &"[REDACTED]")
            .field("renewal", &self.renewal.as_ref().map(|_| "[REDACTED]"))
            .field("profile", &self.profile)
            .finish()
    }
}

/// Session credential store.
///
/// `path` is `None` for an ephemeral store that never touches disk.
pub struct CredentialStore {
    path: Option<PathBuf>,
    current: RwLock<Option<Credential>>,
    writes: Mutex<()>,
}

impl CredentialStore {
    /// Load the session from the given file path.
    ///
    /// If the file doesn't exist, creates it holding `null` (logged out).
    pub async fn load(path: PathBuf) -> Result<Self> {
        let current = if path.exists() {
            let contents = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| Error::Io(format!("reading session file: {e}")))?;
            let credential: Option<Credential> = serde_json::from_str(&contents)
                .map_err(|e| Error::CredentialParse(format!("parsing session file: {e}")))?;
            info!(
                path = %path.display(),
                authenticated = credential.is_some(),
                "loaded session"
            );
            credential
        } else {
            info!(path = %path.display(), "session file not found, starting logged out");
            write_atomic(&path, None).await?;
            None
        };

        Ok(Self {
            path: Some(path),
            current: RwLock::new(current),
            writes: Mutex::new(()),
        })
    }

    /// Store with no persistence medium.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            current: RwLock::new(None),
            writes: Mutex::new(()),
        }
    }

    /// Clone of the current credential pair.
    pub fn get(&self) -> Option<Credential> {
        self.current.read().clone()
    }

    pub fn access_token(&self) -> Option<String> {
        self.current.read().as_ref().map(|c| c.access.clone())
    }

    pub fn renewal_token(&self) -> Option<String> {
        self.current.read().as_ref().and_then(|c| c.renewal.clone())
    }

    pub fn is_authenticated(&self) -> bool {
        self.current.read().is_some()
    }

    /// Replace the credential pair and persist.
    ///
    /// If the pair cannot be persisted, the previous one is restored so
    /// memory never holds a session the caller was told failed.
    pub async fn set(&self, credential: Credential) -> Result<()> {
        let _write = self.writes.lock().await;
        let previous = self.current.write().replace(credential);
        if let Err(error) = self.persist().await {
            *self.current.write() = previous;
            return Err(error);
        }
        debug!("stored credential");
        Ok(())
    }

    /// Install a renewed access token.
    ///
    /// The renewal token is replaced only when the service rotated it.
    /// Returns `NotFound` if the session was cleared while the renewal was
    /// in flight; in that case nothing is written.
    pub async fn apply_renewal(&self, access: String, renewal: Option<String>) -> Result<()> {
        let _write = self.writes.lock().await;
        {
            let mut current = self.current.write();
            let credential = current
                .as_mut()
                .ok_or_else(|| Error::NotFound("no session to renew".into()))?;
            credential.access = access;
            if let Some(renewal) = renewal {
                credential.renewal = Some(renewal);
            }
        }
        debug!("applied renewed access token");
        self.persist().await
    }

    /// Remove the credential pair and persist the logged-out state.
    pub async fn clear(&self) -> Result<()> {
        let _write = self.writes.lock().await;
        let had_session = self.current.write().take().is_some();
        if had_session {
            info!("session cleared");
        }
        self.persist().await
    }

    async fn persist(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let snapshot = self.current.read().clone();
        write_atomic(path, snapshot.as_ref()).await
    }
}

/// Write the session file atomically.
///
/// Writes to a temporary file in the same directory, then renames it over
/// the target. Sets permissions to 0600 since the file contains tokens.
async fn write_atomic(path: &Path, credential: Option<&Credential>) -> Result<()> {
    let json = serde_json::to_string_pretty(&credential)
        .map_err(|e| Error::CredentialParse(format!("serializing session: {e}")))?;

    let dir = path
        .parent()
        .ok_or_else(|| Error::Io("session path has no parent directory".into()))?;
    if !dir.as_os_str().is_empty() {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| Error::Io(format!("creating session directory: {e}")))?;
    }

    let tmp_path = dir.join(format!(".session.tmp.{}", std::process::id()));

    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(|e| Error::Io(format!("writing temp session file: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms)
            .await
            .map_err(|e| Error::Io(format!("setting session file permissions: {e}")))?;
    }

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::Io(format!("renaming temp session file: {e}")))?;

    debug!(path = %path.display(), "persisted session");
    Ok(())
}
