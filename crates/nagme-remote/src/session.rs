//! Signed-in session kept between runs.
//!
//! Stored as JSON at `<config dir>/nagme/session.json`, readable by the
//! owner only on unix.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use tracing::debug;

use nagme_core::source::Session;

#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    #[must_use]
    pub const fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// The store under the user config directory.
    ///
    /// # Errors
    ///
    /// Fails when the platform has no config directory.
    pub fn default_location() -> Result<Self> {
        let dir = dirs::config_dir().ok_or_else(|| anyhow!("Unable to resolve user config directory"))?;
        Ok(Self::new(dir.join("nagme").join("session.json")))
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The saved session, if any.
    ///
    /// # Errors
    ///
    /// Fails when the file exists but cannot be read or parsed.
    pub fn load(&self) -> Result<Option<Session>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let text = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read session: {}", self.path.display()))?;
        let session = serde_json::from_str(&text)
            .with_context(|| format!("Invalid session file: {}", self.path.display()))?;
        Ok(Some(session))
    }

    /// # Errors
    ///
    /// Fails when the directory or file cannot be written.
    pub fn save(&self, session: &Session) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let text = serde_json::to_string_pretty(session).context("Failed to encode session")?;
        fs::write(&self.path, text)
            .with_context(|| format!("Failed to write session: {}", self.path.display()))?;
        restrict_permissions(&self.path)
            .with_context(|| format!("Failed to restrict permissions: {}", self.path.display()))?;
        debug!(path = %self.path.display(), user = %session.user_id, "saved session");
        Ok(())
    }

    /// Remove the saved session. Returns whether one existed.
    ///
    /// # Errors
    ///
    /// Fails when the file exists but cannot be removed.
    pub fn clear(&self) -> Result<bool> {
        if !self.path.exists() {
            return Ok(false);
        }
        fs::remove_file(&self.path)
            .with_context(|| format!("Failed to remove session: {}", self.path.display()))?;
        Ok(true)
    }
}

fn restrict_permissions(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perm = fs::metadata(path)?.permissions();
        perm.set_mode(0o600);
        fs::set_permissions(path, perm)?;
    }
    Ok(())
}
