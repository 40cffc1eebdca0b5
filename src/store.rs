//! Persistence of session credentials between CLI invocations.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{IgiturError, Result};
use crate::session::GaudeamSession;

pub const DEFAULT_SESSION_FILE: &str = ".igitur_session";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SessionCredentials {
    pub gaudeam_session_cookie: String,
    pub subdomain: String,
}

impl SessionCredentials {
    pub fn new(cookie: impl Into<String>, subdomain: impl Into<String>) -> Self {
        Self {
            gaudeam_session_cookie: cookie.into(),
            subdomain: subdomain.into(),
        }
    }

    pub fn to_session(&self) -> GaudeamSession {
        GaudeamSession::new(self.gaudeam_session_cookie.clone(), &self.subdomain)
    }
}

pub trait SessionStore {
    /// Returns `None` when nothing has been saved yet.
    fn load(&self) -> Result<Option<SessionCredentials>>;

    fn save(&self, credentials: &SessionCredentials) -> Result<()>;

    /// Returns `true` if stored credentials were removed.
    fn clear(&self) -> Result<bool>;
}

/// Credentials kept as JSON in a single file, `~/.igitur_session` by default.
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn default_location() -> Result<Self> {
        let home = dirs::home_dir().ok_or_else(|| {
            IgiturError::Filesystem("Could not determine home directory".to_string())
        })?;
        Ok(Self::new(home.join(DEFAULT_SESSION_FILE)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SessionStore for FileSessionStore {
    fn load(&self) -> Result<Option<SessionCredentials>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&self.path)?;
        Ok(Some(serde_json::from_str(&contents)?))
    }

    fn save(&self, credentials: &SessionCredentials) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(&self.path, serde_json::to_string(credentials)?)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600))?;
        }
        Ok(())
    }

    fn clear(&self) -> Result<bool> {
        if self.path.exists() {
            std::fs::remove_file(&self.path)?;
            Ok(true)
        } else {
            Ok(false)
        }
    }
}
