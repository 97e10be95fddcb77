//! Commit History Extractor and the emit step that follows it.

use std::path::{Path, PathBuf};

use anyhow::Result;
use tracing::debug;

use crate::core::commit_log::parse_commit_log;
use crate::core::types::CommitRecord;
use crate::io::git::Git;
use crate::io::session_log::SessionLog;
use crate::io::visualization::{self, OUTPUT_DIR};

/// Read the full log and parse it. Malformed lines are skipped and logged.
pub fn extract(git: &Git<'_>, log: &SessionLog) -> Result<Vec<CommitRecord>> {
    let raw = git.log_raw()?;
    let parsed = parse_commit_log(&raw);
    for skipped in &parsed.skipped {
        log.warn(&format!(
            "skipping commit log line {}: {} ({})",
            skipped.line_number, skipped.line, skipped.reason
        ));
    }
    debug!(
        records = parsed.records.len(),
        skipped = parsed.skipped.len(),
        "commit history extracted"
    );
    Ok(parsed.records)
}

/// Write the visualization for `records` under `<working_path>/visualization`.
pub fn emit(records: &[CommitRecord], working_path: &Path, title: &str) -> Result<PathBuf> {
    visualization::emit(records, &working_path.join(OUTPUT_DIR), title)
}

/// Title for the page: the last path component of the repository name.
pub fn page_title(repository_name: &str) -> &str {
    repository_name
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or(repository_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::shell::Shell;
    use crate::test_support::FakeBackends;

    #[test]
    fn malformed_lines_are_logged_and_skipped() {
        let temp = tempfile::tempdir().expect("tempdir");
        let log = SessionLog::open(&temp.path().join("session.log"))
            .expect("open")
            .quiet();
        let fake = FakeBackends::new();
        fake.init_repository();
        fake.set_commit_log(
            "aaa111|Ada|2024-03-01T10:00:00+01:00|init\n\
             abc123|onlytwoFields\n\
             bbb222|Grace|2024-03-02T10:00:00+01:00|second",
        );
        let git = Git::new(Shell::new(&fake, &log), temp.path());

        let records = extract(&git, &log).expect("extract");
        let hashes: Vec<&str> = records.iter().map(|r| r.hash.as_str()).collect();
        assert_eq!(hashes, vec!["aaa111", "bbb222"]);
        assert_eq!(records[1].sequence_index, 1);
        assert!(
            log.warnings()
                .iter()
                .any(|w| w.contains("abc123|onlytwoFields"))
        );
    }

    #[test]
    fn page_title_uses_repository_basename() {
        assert_eq!(page_title("me/demo"), "demo");
        assert_eq!(page_title("demo"), "demo");
    }
}
