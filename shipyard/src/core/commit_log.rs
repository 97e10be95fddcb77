//! Parser for the delimited commit log.
//!
//! The log is requested with [`LOG_FORMAT`], one commit per line. Lines that do
//! not split into [`FIELD_COUNT`] fields (or carry no readable date) are
//! reported back instead of failing the whole parse.

use chrono::DateTime;

use crate::core::types::CommitRecord;

pub const FIELD_DELIMITER: char = '|';

/// `git log --pretty=format:` string producing hash, author, ISO-8601 date, subject.
pub const LOG_FORMAT: &str = "%H|%an|%aI|%s";

pub const FIELD_COUNT: usize = 4;

/// A log line that was left out of the result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedLine {
    /// 1-indexed line number within the raw log.
    pub line_number: usize,
    pub line: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedLog {
    pub records: Vec<CommitRecord>,
    pub skipped: Vec<SkippedLine>,
}

/// Parse the raw log, preserving line order.
///
/// `sequence_index` counts kept records only, so it always runs 0, 1, 2, ...
/// The author and the subject may themselves contain the delimiter.
pub fn parse_commit_log(raw: &str) -> ParsedLog {
    let mut parsed = ParsedLog::default();
    for (idx, line) in raw.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match parse_line(line, parsed.records.len()) {
            Ok(record) => parsed.records.push(record),
            Err(reason) => parsed.skipped.push(SkippedLine {
                line_number: idx + 1,
                line: line.to_string(),
                reason,
            }),
        }
    }
    parsed
}

fn parse_line(line: &str, sequence_index: usize) -> Result<CommitRecord, String> {
    let fields: Vec<&str> = line.split(FIELD_DELIMITER).collect();
    if fields.len() < FIELD_COUNT {
        return Err(format!(
            "expected {FIELD_COUNT} fields, found {}",
            fields.len()
        ));
    }
    let hash = fields[0].trim();
    if hash.is_empty() {
        return Err("empty commit hash".to_string());
    }
    // The author may contain the delimiter too: the date is the first field
    // after it that reads as one, with at least a subject field following.
    let last_date_at = fields.len() - 2;
    let Some((date_at, date)) = (2..=last_date_at).find_map(|at| {
        DateTime::parse_from_rfc3339(fields[at].trim())
            .ok()
            .map(|date| (at, date))
    }) else {
        let field = fields[2].trim();
        return Err(if fields.len() > FIELD_COUNT {
            format!(
                "no readable date after the author ({} fields; the author or date may contain '{FIELD_DELIMITER}')",
                fields.len()
            )
        } else {
            format!("unreadable date '{field}'")
        });
    };
    let delimiter = FIELD_DELIMITER.to_string();
    let author = fields[1..date_at].join(delimiter.as_str());
    let author = Some(author.trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string);
    Ok(CommitRecord {
        hash: hash.to_string(),
        author,
        date,
        message: fields[date_at + 1..].join(delimiter.as_str()),
        sequence_index,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOG: &str = "\
a1b2c3|Ada|2024-01-02T10:00:00+01:00|init
d4e5f6|Grace|2024-01-03T11:30:00Z|add readme
0a9b8c|Linus|2024-01-04T09:15:00-05:00|fix: handle a|b pipes
";

    #[test]
    fn preserves_order_and_numbers_from_zero() {
        let parsed = parse_commit_log(LOG);
        assert!(parsed.skipped.is_empty());
        let hashes: Vec<&str> = parsed.records.iter().map(|r| r.hash.as_str()).collect();
        assert_eq!(hashes, vec!["a1b2c3", "d4e5f6", "0a9b8c"]);
        let indices: Vec<usize> = parsed.records.iter().map(|r| r.sequence_index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert_eq!(parsed.records[2].message, "fix: handle a|b pipes");
    }

    #[test]
    fn skips_line_with_too_few_fields() {
        let raw = format!("abc123|onlytwoFields\n{LOG}");
        let parsed = parse_commit_log(&raw);
        assert_eq!(parsed.records.len(), 3);
        assert_eq!(parsed.records[0].hash, "a1b2c3");
        assert_eq!(parsed.records[0].sequence_index, 0);
        assert_eq!(parsed.skipped.len(), 1);
        assert_eq!(parsed.skipped[0].line_number, 1);
        assert_eq!(parsed.skipped[0].line, "abc123|onlytwoFields");
        assert!(parsed.skipped[0].reason.contains("expected 4 fields"));
    }

    #[test]
    fn skips_unreadable_date_and_keeps_indices_contiguous() {
        let raw = "aaa|Ada|yesterday|one\nbbb|Ada|2024-01-02T10:00:00Z|two\n";
        let parsed = parse_commit_log(raw);
        assert_eq!(parsed.records.len(), 1);
        assert_eq!(parsed.records[0].hash, "bbb");
        assert_eq!(parsed.records[0].sequence_index, 0);
        assert!(parsed.skipped[0].reason.contains("unreadable date"));
    }

    #[test]
    fn author_containing_the_delimiter_is_kept_whole() {
        let parsed = parse_commit_log("eee|Ada | Lovelace|2024-01-02T10:00:00Z|notes|draft\n");
        assert!(parsed.skipped.is_empty());
        let record = &parsed.records[0];
        assert_eq!(record.author.as_deref(), Some("Ada | Lovelace"));
        assert_eq!(record.message, "notes|draft");
    }

    #[test]
    fn shifted_fields_without_a_date_name_the_delimiter() {
        let parsed = parse_commit_log("fff|Ada|Lovelace|soon|msg\n");
        assert!(parsed.records.is_empty());
        let reason = &parsed.skipped[0].reason;
        assert!(reason.contains("5 fields"));
        assert!(reason.contains("'|'"));
    }

    #[test]
    fn empty_author_is_absent() {
        let parsed = parse_commit_log("ccc||2024-01-02T10:00:00Z|anonymous\n");
        assert_eq!(parsed.records[0].author, None);
    }

    #[test]
    fn blank_input_yields_nothing() {
        assert_eq!(parse_commit_log("\n\n"), ParsedLog::default());
    }
}
