//! Configuration loading and merging
//!
//! Settings come from an optional TOML file; command-line flags override
//! whatever the file says.

use anyhow::{bail, Context, Result};
use plc_log_core::{PollConfig, SheetRotationConfig, WorkbookConfig};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main application configuration (loaded from plc-log.toml)
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    /// Tags to poll, in read order
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub poll: PollConfig,
    pub flat: Option<FlatConfig>,
    pub csv: Option<CsvConfig>,
    pub workbook: Option<WorkbookConfig>,
    pub sheet: Option<SheetConfig>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SourceConfig {
    /// JSON snapshot file re-read on every poll
    pub file: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FlatConfig {
    pub path: PathBuf,
    /// Line template with {name}, {value} and {timestamp}
    pub format: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CsvConfig {
    pub path: PathBuf,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SheetConfig {
    #[serde(flatten)]
    pub rotation: SheetRotationConfig,
    #[serde(default = "default_token_file")]
    pub token_file: PathBuf,
}

pub fn default_token_file() -> PathBuf {
    PathBuf::from("token.json")
}

impl AppConfig {
    /// Check that the run has something to read and somewhere to write
    pub fn validate(&self) -> Result<()> {
        if self.tags.is_empty() {
            bail!("No tags configured (use --tag or `tags = [...]`)");
        }
        if let Some(dup) = self
            .tags
            .iter()
            .enumerate()
            .find(|(i, t)| self.tags[..*i].contains(t))
            .map(|(_, t)| t)
        {
            bail!("Tag {} is listed more than once", dup);
        }
        if self.source.file.is_none() {
            bail!("No tag source configured (use --source-file or [source] file = ...)");
        }
        if self.sink_count() == 0 {
            bail!("No sinks configured (use --flat-ascii, --csv, --excel or --gapi-ssheet-id)");
        }
        Ok(())
    }

    pub fn sink_count(&self) -> usize {
        [
            self.flat.is_some(),
            self.csv.is_some(),
            self.workbook.is_some(),
            self.sheet.is_some(),
        ]
        .iter()
        .filter(|configured| **configured)
        .count()
    }
}

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: AppConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    Ok(config)
}
