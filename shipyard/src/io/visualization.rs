//! Visualization Emitter: commit feed plus a static page.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use minijinja::{Environment, context};
use tracing::debug;

use crate::core::types::CommitRecord;

const PAGE_TEMPLATE: &str = include_str!("templates/commits.html");

/// Directory (under the working path) that receives the artifact.
pub const OUTPUT_DIR: &str = "visualization";
pub const FEED_FILE: &str = "commits.json";
pub const PAGE_FILE: &str = "commits.html";

/// Write `commits.json` and `commits.html` into `output_dir`, creating it if
/// needed. Returns the page path. Output depends only on the inputs.
pub fn emit(records: &[CommitRecord], output_dir: &Path, title: &str) -> Result<PathBuf> {
    fs::create_dir_all(output_dir)
        .with_context(|| format!("create directory {}", output_dir.display()))?;

    let mut feed = serde_json::to_string_pretty(records).context("serialize commit feed")?;
    feed.push('\n');
    let feed_path = output_dir.join(FEED_FILE);
    fs::write(&feed_path, &feed).with_context(|| format!("write {}", feed_path.display()))?;

    let page = render_page(records, &feed, title)?;
    let page_path = output_dir.join(PAGE_FILE);
    fs::write(&page_path, page).with_context(|| format!("write {}", page_path.display()))?;

    debug!(records = records.len(), path = %page_path.display(), "visualization written");
    Ok(page_path)
}

fn render_page(records: &[CommitRecord], feed: &str, title: &str) -> Result<String> {
    let mut env = Environment::new();
    env.add_template(PAGE_FILE, PAGE_TEMPLATE)
        .expect("page template should be valid");
    let template = env.get_template(PAGE_FILE)?;
    let rendered = template.render(context! {
        title => title,
        commit_count => records.len(),
        feed => embeddable_json(feed.trim_end()),
    })?;
    Ok(rendered)
}

/// Keep a JSON document from closing the surrounding `<script>` element.
fn embeddable_json(json: &str) -> String {
    json.replace("</", "<\\/")
}

#[cfg(test)]
mod tests {
    use chrono::DateTime;

    use super::*;

    fn record(index: usize, message: &str) -> CommitRecord {
        CommitRecord {
            hash: format!("{index:040}"),
            author: Some("Ada".to_string()),
            date: DateTime::parse_from_rfc3339("2024-03-01T10:00:00+01:00").expect("date"),
            message: message.to_string(),
            sequence_index: index,
        }
    }

    #[test]
    fn repeated_emits_are_byte_identical() {
        let temp = tempfile::tempdir().expect("tempdir");
        let out = temp.path().join(OUTPUT_DIR);
        let records = vec![record(0, "init"), record(1, "add readme")];

        let page = emit(&records, &out, "demo").expect("emit");
        let first_page = fs::read(&page).expect("read page");
        let first_feed = fs::read(out.join(FEED_FILE)).expect("read feed");

        emit(&records, &out, "demo").expect("emit again");
        assert_eq!(fs::read(&page).expect("read page"), first_page);
        assert_eq!(fs::read(out.join(FEED_FILE)).expect("read feed"), first_feed);
        assert_eq!(page, out.join(PAGE_FILE));
    }

    #[test]
    fn feed_is_embedded_without_breaking_the_script_block() {
        let temp = tempfile::tempdir().expect("tempdir");
        let out = temp.path().join(OUTPUT_DIR);
        let records = vec![record(0, "fix </script> injection")];

        let page = emit(&records, &out, "<demo>").expect("emit");
        let html = fs::read_to_string(page).expect("read page");
        assert!(html.contains("fix <\\/script> injection"));
        assert!(html.contains("&lt;demo&gt;"));
        assert!(html.contains("1 commit"));
        assert!(!html.contains("1 commits"));

        let feed: Vec<CommitRecord> =
            serde_json::from_str(&fs::read_to_string(out.join(FEED_FILE)).expect("read feed"))
                .expect("parse feed");
        assert_eq!(feed, records);
    }
}
