//! CLI tests for the `history` and `doctor` subcommands.
//!
//! Spawns the shipyard binary against a real git repository in a temporary
//! directory. Skipped when git is not installed.

use std::fs;
use std::path::Path;
use std::process::Command;

use shipyard::core::types::CommitRecord;
use shipyard::exit_codes;

fn git(dir: &Path, args: &[&str]) {
    let status = Command::new("git")
        .args(args)
        .current_dir(dir)
        .status()
        .expect("spawn git");
    assert!(status.success(), "git {args:?} failed");
}

fn repository_with_commits(dir: &Path, messages: &[&str]) {
    git(dir, &["init", "--quiet"]);
    git(dir, &["config", "user.name", "Test Author"]);
    git(dir, &["config", "user.email", "test@example.com"]);
    git(dir, &["config", "commit.gpgsign", "false"]);
    for (i, message) in messages.iter().enumerate() {
        fs::write(dir.join(format!("file{i}.txt")), message).expect("write file");
        git(dir, &["add", "-A"]);
        git(dir, &["commit", "--quiet", "-m", message]);
    }
}

#[test]
fn history_writes_feed_and_page_in_commit_order() {
    if which::which("git").is_err() {
        eprintln!("git not installed; skipping");
        return;
    }
    let temp = tempfile::tempdir().expect("tempdir");
    let project = temp.path().join("demo");
    fs::create_dir(&project).expect("create project");
    repository_with_commits(&project, &["first", "second | with pipe", "third"]);

    let output = Command::new(env!("CARGO_BIN_EXE_shipyard"))
        .current_dir(temp.path())
        .arg("history")
        .arg("--path")
        .arg(&project)
        .output()
        .expect("shipyard history");

    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let page = project.join("visualization").join("commits.html");
    assert!(page.is_file());
    let html = fs::read_to_string(&page).expect("read page");
    assert!(html.contains("demo &middot; 3 commits"));

    let feed: Vec<CommitRecord> = serde_json::from_str(
        &fs::read_to_string(project.join("visualization/commits.json")).expect("read feed"),
    )
    .expect("parse feed");
    let messages: Vec<&str> = feed.iter().map(|r| r.message.as_str()).collect();
    assert_eq!(messages, vec!["first", "second | with pipe", "third"]);
    assert!(feed.iter().all(|r| r.author.as_deref() == Some("Test Author")));
}

#[test]
fn history_outside_a_repository_fails() {
    if which::which("git").is_err() {
        eprintln!("git not installed; skipping");
        return;
    }
    let temp = tempfile::tempdir().expect("tempdir");

    let status = Command::new(env!("CARGO_BIN_EXE_shipyard"))
        .current_dir(temp.path())
        .arg("history")
        .arg("--path")
        .arg(temp.path())
        .status()
        .expect("shipyard history");

    assert_eq!(status.code(), Some(exit_codes::INVALID));
    assert!(!temp.path().join("visualization").exists());
}

#[test]
fn doctor_lists_every_tool() {
    let temp = tempfile::tempdir().expect("tempdir");

    let output = Command::new(env!("CARGO_BIN_EXE_shipyard"))
        .current_dir(temp.path())
        .arg("doctor")
        .output()
        .expect("shipyard doctor");

    let stdout = String::from_utf8_lossy(&output.stdout);
    for tool in ["git", "gh", "docker", "asciinema"] {
        assert!(
            stdout.lines().any(|line| line.starts_with(tool)),
            "missing {tool} in:\n{stdout}"
        );
    }
    assert!(temp.path().join(".shipyard").is_dir());
}
