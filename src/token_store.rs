use crate::{AtlasError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

/// Credentials used in token auth mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthTokens {
    /// Sent as `Authorization: Bearer ...` on every authenticated call
    pub access_token: String,
    /// Exchanged at the refresh endpoint for a new pair
    pub refresh_token: String,
}

/// Where token-mode credentials live between refreshes.
pub trait TokenStore: Send + Sync {
    fn load(&self) -> Result<Option<AuthTokens>>;
    fn save(&self, tokens: &AuthTokens) -> Result<()>;
    fn clear(&self) -> Result<()>;
}

/// Process-local store, for tests and short-lived CLI runs.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    tokens: Mutex<Option<AuthTokens>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tokens(tokens: AuthTokens) -> Self {
        Self {
            tokens: Mutex::new(Some(tokens)),
        }
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self) -> Result<Option<AuthTokens>> {
        Ok(self
            .tokens
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn save(&self, tokens: &AuthTokens) -> Result<()> {
        *self.tokens.lock().unwrap_or_else(PoisonError::into_inner) = Some(tokens.clone());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *self.tokens.lock().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }
}

/// JSON file store.
///
/// Defaults to `~/.local/share/artist-atlas/tokens.json` (the XDG data directory).
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at the default XDG location.
    pub fn in_data_dir() -> Result<Self> {
        Ok(Self::new(Self::default_path()?))
    }

    pub fn default_path() -> Result<PathBuf> {
        let data_dir = dirs::data_dir()
            .ok_or_else(|| AtlasError::Config("Cannot determine XDG data directory".to_string()))?;
        Ok(data_dir.join("artist-atlas").join("tokens.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self) -> Result<Option<AuthTokens>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let json = fs::read_to_string(&self.path)?;
        let tokens = serde_json::from_str(&json)?;
        log::debug!("Tokens loaded from: {}", self.path.display());
        Ok(Some(tokens))
    }

    fn save(&self, tokens: &AuthTokens) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_string_pretty(tokens)?)?;
        log::debug!("Tokens saved to: {}", self.path.display());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        if self.path.exists() {
            fs::remove_file(&self.path)?;
            log::debug!("Tokens removed from: {}", self.path.display());
        }
        Ok(())
    }
}
