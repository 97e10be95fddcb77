//! Operator settings read from `shipyard.toml` in the launch directory.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

/// Operator knobs (TOML). Every field has a default, so the file is optional.
///
/// Unlike the configuration document this file is strict: a present but
/// unparseable or invalid file stops the run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Commit message offered when none is passed on the command line.
    pub default_commit_message: String,

    /// Upper bound for each `<tool> --version` probe.
    pub probe_timeout_secs: u64,

    pub hosting: HostingSettings,
    pub isolation: IsolationSettings,
    pub recording: RecordingSettings,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Public,
    Private,
    Internal,
}

impl Visibility {
    /// Flag understood by `gh repo create`.
    pub fn flag(self) -> &'static str {
        match self {
            Visibility::Public => "--public",
            Visibility::Private => "--private",
            Visibility::Internal => "--internal",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct HostingSettings {
    pub visibility: Visibility,

    /// Overwrite a local `origin` that points somewhere other than the hosted
    /// repository. Off by default: a divergent URL is only reported.
    pub sync_remote_url: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct IsolationSettings {
    pub enabled: bool,
    pub image: String,
    /// Relative to the working path.
    pub dockerfile: String,
    /// Program invoked inside the image to re-run the workflow.
    pub command: String,
}

impl Default for IsolationSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            image: "shipyard-workspace".to_string(),
            dockerfile: "Dockerfile".to_string(),
            command: "shipyard".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct RecordingSettings {
    pub enabled: bool,
}

impl Default for RecordingSettings {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_commit_message: "init".to_string(),
            probe_timeout_secs: 10,
            hosting: HostingSettings::default(),
            isolation: IsolationSettings::default(),
            recording: RecordingSettings::default(),
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        if self.default_commit_message.trim().is_empty() {
            return Err(anyhow!("default_commit_message must be non-empty"));
        }
        if self.probe_timeout_secs == 0 {
            return Err(anyhow!("probe_timeout_secs must be > 0"));
        }
        if self.isolation.image.trim().is_empty() {
            return Err(anyhow!("isolation.image must be non-empty"));
        }
        if self.isolation.dockerfile.trim().is_empty() {
            return Err(anyhow!("isolation.dockerfile must be non-empty"));
        }
        if self.isolation.command.trim().is_empty() {
            return Err(anyhow!("isolation.command must be non-empty"));
        }
        Ok(())
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}

/// Load settings from a TOML file.
///
/// If the file is missing, returns `Settings::default()`.
pub fn load_settings(path: &Path) -> Result<Settings> {
    if !path.exists() {
        return Ok(Settings::default());
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let settings: Settings =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    settings
        .validate()
        .with_context(|| format!("invalid settings in {}", path.display()))?;
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let settings = load_settings(&temp.path().join("shipyard.toml")).expect("load");
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.default_commit_message, "init");
        assert_eq!(settings.probe_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("shipyard.toml");
        fs::write(
            &path,
            "[hosting]\nvisibility = \"private\"\n\n[isolation]\nenabled = false\n",
        )
        .expect("write");

        let settings = load_settings(&path).expect("load");
        assert_eq!(settings.hosting.visibility, Visibility::Private);
        assert_eq!(settings.hosting.visibility.flag(), "--private");
        assert!(!settings.isolation.enabled);
        assert_eq!(settings.isolation.image, "shipyard-workspace");
        assert!(settings.recording.enabled);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("shipyard.toml");
        fs::write(&path, "probe_timeout_secs = 0\n").expect("write");
        let err = load_settings(&path).expect_err("zero timeout");
        assert!(format!("{err:#}").contains("probe_timeout_secs"));

        fs::write(&path, "[hosting]\nvisibility = \"secret\"\n").expect("write");
        assert!(load_settings(&path).is_err());
    }
}
