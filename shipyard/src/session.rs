//! Session context: log sink, configuration store, settings and canonical
//! paths, passed explicitly to every component.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::io::config::ConfigStore;
use crate::io::session_log::SessionLog;
use crate::io::settings::{Settings, load_settings};

/// Files the workflow's own `git add -A` must never pick up.
const IGNORED_STATE_FILES: [&str; 3] = ["config.toml", "session.cast", "session.log"];

/// All canonical paths relative to the launch directory.
///
/// The state directory stays with the launch directory even when the
/// workflow targets another working path: the configuration document is
/// what recalls that working path, so it cannot live under it. The session
/// log and cast file sit beside it so one run's state stays together.
#[derive(Debug, Clone)]
pub struct ShipyardPaths {
    pub root: PathBuf,
    pub state_dir: PathBuf,
    pub gitignore_path: PathBuf,
    pub config_path: PathBuf,
    pub log_path: PathBuf,
    pub cast_path: PathBuf,
    pub settings_path: PathBuf,
}

impl ShipyardPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let state_dir = root.join(".shipyard");
        Self {
            root: root.clone(),
            state_dir: state_dir.clone(),
            gitignore_path: state_dir.join(".gitignore"),
            config_path: state_dir.join("config.toml"),
            log_path: state_dir.join("session.log"),
            cast_path: state_dir.join("session.cast"),
            settings_path: root.join("shipyard.toml"),
        }
    }
}

#[derive(Debug)]
pub struct Session {
    paths: ShipyardPaths,
    settings: Settings,
    config: ConfigStore,
    log: SessionLog,
}

impl Session {
    /// Open the session rooted at `launch_dir`: load settings, prepare
    /// `.shipyard/`, and open the session log.
    pub fn open(launch_dir: &Path) -> Result<Self> {
        let paths = ShipyardPaths::new(launch_dir);
        let settings = load_settings(&paths.settings_path)?;
        ensure_state_gitignore(&paths.gitignore_path)?;
        let log = SessionLog::open(&paths.log_path)?;
        Ok(Self {
            config: ConfigStore::new(&paths.config_path),
            paths,
            settings,
            log,
        })
    }

    /// Stop mirroring log entries to the terminal.
    pub fn quiet(mut self) -> Self {
        self.log = self.log.quiet();
        self
    }

    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    pub fn paths(&self) -> &ShipyardPaths {
        &self.paths
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn config(&self) -> &ConfigStore {
        &self.config
    }

    pub fn log(&self) -> &SessionLog {
        &self.log
    }
}

fn ensure_state_gitignore(path: &Path) -> Result<()> {
    let mut existing = String::new();
    if path.exists() {
        existing = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    }

    let mut lines: Vec<String> = existing
        .lines()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect();
    for required in IGNORED_STATE_FILES {
        if !lines.iter().any(|l| l == required) {
            lines.push(required.to_string());
        }
    }
    lines.sort();
    lines.dedup();

    let mut out = lines.join("\n");
    out.push('\n');
    if out != existing {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
        }
        fs::write(path, out).with_context(|| format!("write {}", path.display()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_prepares_state_dir() {
        let temp = tempfile::tempdir().expect("tempdir");
        let session = Session::open(temp.path()).expect("open").quiet();

        assert!(session.paths().log_path.exists());
        let ignore = fs::read_to_string(&session.paths().gitignore_path).expect("gitignore");
        assert_eq!(ignore, "config.toml\nsession.cast\nsession.log\n");
        assert_eq!(session.settings(), &Settings::default());
    }

    #[test]
    fn gitignore_keeps_operator_lines() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join(".shipyard/.gitignore");
        fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        fs::write(&path, "notes.md\nsession.log\n").expect("write");

        ensure_state_gitignore(&path).expect("ensure");
        let ignore = fs::read_to_string(&path).expect("read");
        assert_eq!(ignore, "config.toml\nnotes.md\nsession.cast\nsession.log\n");
    }

    #[test]
    fn invalid_settings_fail_the_open() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::write(temp.path().join("shipyard.toml"), "probe_timeout_secs = 0\n").expect("write");
        assert!(Session::open(temp.path()).is_err());
    }
}
