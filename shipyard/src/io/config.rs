//! Remembered choices stored under `.shipyard/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Choices carried from one run to the next.
///
/// Human-editable. Fields are absent until the run that resolves them.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Configuration {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub working_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repository_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_run_timestamp: Option<DateTime<Utc>>,
}

/// Owner of the configuration document.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the document. A missing or unreadable document yields the default
    /// record; this never fails.
    pub fn load(&self) -> Configuration {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "no configuration document");
            return Configuration::default();
        }
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) => {
                warn!(path = %self.path.display(), err = %err, "configuration unreadable, using defaults");
                return Configuration::default();
            }
        };
        match toml::from_str(&contents) {
            Ok(cfg) => cfg,
            Err(err) => {
                warn!(path = %self.path.display(), err = %err, "configuration malformed, using defaults");
                Configuration::default()
            }
        }
    }

    /// Overwrite the whole document (temp file + rename). Callers read, modify,
    /// then save.
    pub fn save(&self, cfg: &Configuration) -> Result<()> {
        let mut buf = toml::to_string_pretty(cfg).context("serialize configuration toml")?;
        buf.push('\n');
        write_atomic(&self.path, &buf)
    }

    /// Read-modify-write in one call; returns the saved record.
    pub fn update(&self, apply: impl FnOnce(&mut Configuration)) -> Result<Configuration> {
        let mut cfg = self.load();
        apply(&mut cfg);
        self.save(&cfg)?;
        Ok(cfg)
    }
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
