//! Append-only session log at `.shipyard/session.log`.
//!
//! This is a product artifact, separate from `tracing` diagnostics: every
//! external command, its captured output, and every workflow note or warning
//! lands here, one timestamped line per event. Each entry is written and the
//! file closed before the call returns, so an interrupted run keeps a
//! truthful trace. Entries are mirrored to the terminal.

use std::cell::RefCell;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// An external command about to run.
    Command,
    /// Output captured from the preceding command.
    Output,
    Note,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub kind: EntryKind,
    pub text: String,
}

impl LogEntry {
    fn render(&self) -> String {
        let ts = self.timestamp.format("%Y-%m-%dT%H:%M:%S%.3fZ");
        let mut buf = String::new();
        match self.kind {
            EntryKind::Command => buf.push_str(&format!("{ts} $ {}\n", self.text)),
            EntryKind::Output => {
                for line in self.text.lines() {
                    buf.push_str(&format!("{ts}   {line}\n"));
                }
            }
            EntryKind::Note => buf.push_str(&format!("{ts} {}\n", self.text)),
            EntryKind::Warning => buf.push_str(&format!("{ts} warning: {}\n", self.text)),
        }
        buf
    }
}

#[derive(Debug)]
pub struct SessionLog {
    path: PathBuf,
    echo: bool,
    entries: RefCell<Vec<LogEntry>>,
}

impl SessionLog {
    /// Open (or create) the log file. Existing content is kept.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create log dir {}", parent.display()))?;
        }
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("open session log {}", path.display()))?;
        Ok(Self {
            path: path.to_path_buf(),
            echo: true,
            entries: RefCell::new(Vec::new()),
        })
    }

    /// Disable terminal mirroring (the file is still written).
    pub fn quiet(mut self) -> Self {
        self.echo = false;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn command(&self, command_line: &str) {
        self.append(EntryKind::Command, command_line);
    }

    /// Record captured output. Blank output is not recorded.
    pub fn output(&self, text: &str) {
        let trimmed = text.trim_end();
        if trimmed.trim().is_empty() {
            return;
        }
        self.append(EntryKind::Output, trimmed);
    }

    pub fn note(&self, text: &str) {
        self.append(EntryKind::Note, text);
    }

    pub fn warn(&self, text: &str) {
        self.append(EntryKind::Warning, text);
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.borrow().clone()
    }

    /// Command lines issued so far, in order.
    pub fn commands(&self) -> Vec<String> {
        self.entries
            .borrow()
            .iter()
            .filter(|e| e.kind == EntryKind::Command)
            .map(|e| e.text.clone())
            .collect()
    }

    pub fn warnings(&self) -> Vec<String> {
        self.entries
            .borrow()
            .iter()
            .filter(|e| e.kind == EntryKind::Warning)
            .map(|e| e.text.clone())
            .collect()
    }

    fn append(&self, kind: EntryKind, text: &str) {
        let entry = LogEntry {
            timestamp: Utc::now(),
            kind,
            text: text.to_string(),
        };
        if self.echo {
            mirror(&entry);
        }
        // A broken log file must not break the run; the terminal still has it.
        if let Err(err) = self.write_line(&entry.render()) {
            warn!(err = %err, path = %self.path.display(), "failed to append session log");
        }
        self.entries.borrow_mut().push(entry);
    }

    fn write_line(&self, rendered: &str) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("open {}", self.path.display()))?;
        file.write_all(rendered.as_bytes())
            .with_context(|| format!("append {}", self.path.display()))?;
        file.flush().context("flush session log")
    }
}

fn mirror(entry: &LogEntry) {
    match entry.kind {
        EntryKind::Command => println!("$ {}", entry.text),
        EntryKind::Output => println!("{}", entry.text),
        EntryKind::Note => println!("{}", entry.text),
        EntryKind::Warning => eprintln!("warning: {}", entry.text),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appends_one_timestamped_line_per_event() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join(".shipyard/session.log");
        let log = SessionLog::open(&path).expect("open").quiet();

        log.command("git add -A");
        log.output("line one\nline two\n");
        log.warn("docker not found");

        let contents = fs::read_to_string(&path).expect("read log");
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].ends_with(" $ git add -A"));
        assert!(lines[1].ends_with("   line one"));
        assert!(lines[2].ends_with("   line two"));
        assert!(lines[3].ends_with(" warning: docker not found"));
        assert!(lines.iter().all(|l| l.contains('T') && l.split(' ').next().is_some_and(|ts| ts.ends_with('Z'))));
    }

    #[test]
    fn reopening_keeps_previous_entries() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("session.log");
        SessionLog::open(&path).expect("open").quiet().note("first run");
        SessionLog::open(&path).expect("reopen").quiet().note("second run");

        let contents = fs::read_to_string(&path).expect("read log");
        assert!(contents.contains("first run"));
        assert!(contents.contains("second run"));
    }

    #[test]
    fn blank_output_is_skipped() {
        let temp = tempfile::tempdir().expect("tempdir");
        let log = SessionLog::open(&temp.path().join("session.log"))
            .expect("open")
            .quiet();
        log.output("  \n");
        assert!(log.entries().is_empty());
    }
}
