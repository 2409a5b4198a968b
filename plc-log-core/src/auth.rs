//! Access tokens for the remote sheet
//!
//! Obtaining a token (OAuth consent, refresh) happens outside this crate.
//! The sink only needs something that hands out a bearer token.

use crate::types::{LoggerError, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Source of bearer tokens for the Sheets API
pub trait TokenProvider {
    fn access_token(&self) -> Result<String>;
}

/// Token stored in a JSON file with an `access_token` field
///
/// The file is re-read on every request so an external refresher can
/// replace it while the logger runs.
#[derive(Debug, Clone)]
pub struct TokenFile {
    path: PathBuf,
}

#[derive(Deserialize)]
struct TokenFileContent {
    access_token: String,
}

impl TokenFile {
    /// Open and validate a token file
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let provider = Self {
            path: path.as_ref().to_path_buf(),
        };
        provider.access_token()?;
        Ok(provider)
    }
}

impl TokenProvider for TokenFile {
    fn access_token(&self) -> Result<String> {
        let content = fs::read_to_string(&self.path).map_err(|e| {
            LoggerError::ConfigError(format!("Failed to read token file {:?}: {}", self.path, e))
        })?;
        let parsed: TokenFileContent = serde_json::from_str(&content).map_err(|e| {
            LoggerError::ConfigError(format!("Malformed token file {:?}: {}", self.path, e))
        })?;
        if parsed.access_token.trim().is_empty() {
            return Err(LoggerError::ConfigError(format!(
                "Token file {:?} has an empty access_token",
                self.path
            )));
        }
        Ok(parsed.access_token)
    }
}

/// Fixed token
#[derive(Debug, Clone)]
pub struct StaticToken(pub String);

impl TokenProvider for StaticToken {
    fn access_token(&self) -> Result<String> {
        Ok(self.0.clone())
    }
}
