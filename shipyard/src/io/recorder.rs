//! asciinema adapter: the session recorder.

use std::path::Path;

use anyhow::Result;
use tracing::{debug, instrument};

use crate::io::process::Invocation;
use crate::io::shell::Shell;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recording {
    /// The cast file already exists; nothing was run.
    AlreadyRecorded,
    /// The wrapped command ran under the recorder.
    Recorded { exit: Option<i32> },
}

#[derive(Clone, Copy)]
pub struct Asciinema<'a> {
    shell: Shell<'a>,
}

impl<'a> Asciinema<'a> {
    pub fn new(shell: Shell<'a>) -> Self {
        Self { shell }
    }

    /// Record `command` into `cast` unless the cast file already exists.
    #[instrument(skip_all, fields(cast = %cast.display()))]
    pub fn record_if_absent(&self, cast: &Path, command: &str) -> Result<Recording> {
        if cast.exists() {
            debug!("cast file present, not recording");
            return Ok(Recording::AlreadyRecorded);
        }
        let cast_arg = cast.display().to_string();
        let exit = self.shell.run_attached(&Invocation::new(
            "asciinema",
            ["rec", cast_arg.as_str(), "--command", command],
        ))?;
        Ok(Recording::Recorded { exit })
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::core::types::ToolId;
    use crate::io::session_log::SessionLog;
    use crate::test_support::FakeBackends;

    #[test]
    fn existing_cast_is_never_overwritten() {
        let temp = tempfile::tempdir().expect("tempdir");
        let log = SessionLog::open(&temp.path().join("session.log"))
            .expect("open")
            .quiet();
        let cast = temp.path().join("session.cast");
        fs::write(&cast, "{}").expect("write cast");
        let fake = FakeBackends::new();
        let recorder = Asciinema::new(Shell::new(&fake, &log));

        let outcome = recorder
            .record_if_absent(&cast, "shipyard run --no-record")
            .expect("record");
        assert_eq!(outcome, Recording::AlreadyRecorded);
        assert!(fake.commands().is_empty());
    }

    #[test]
    fn absent_cast_wraps_the_command() {
        let temp = tempfile::tempdir().expect("tempdir");
        let log = SessionLog::open(&temp.path().join("session.log"))
            .expect("open")
            .quiet();
        let cast = temp.path().join("session.cast");
        let fake = FakeBackends::new();
        fake.install(ToolId::Asciinema);
        let recorder = Asciinema::new(Shell::new(&fake, &log));

        let outcome = recorder
            .record_if_absent(&cast, "shipyard run --no-record")
            .expect("record");
        assert_eq!(outcome, Recording::Recorded { exit: Some(0) });
        assert!(cast.exists());
        let argv = fake.invocations().pop().expect("one call");
        assert_eq!(argv.program, "asciinema");
        assert_eq!(argv.args[2], "--command");
        assert_eq!(argv.args[3], "shipyard run --no-record");
    }
}
