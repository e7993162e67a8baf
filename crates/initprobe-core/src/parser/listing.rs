//! `crinit-ctl list` response grammar.

use serde::Serialize;

use super::{ParseError, parse_pid};

/// Literal first token of the listing header line.
const HEADER_TOKEN: &str = "NAME";

/// One row of a task listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListingEntry {
    /// Task name (first column).
    pub name: String,
    /// Task pid (second column), `-1` when not running.
    pub pid: i64,
}

impl ListingEntry {
    /// Returns `true` if the row reports a live process.
    #[must_use]
    pub const fn is_running(&self) -> bool {
        self.pid != super::NOT_RUNNING_PID
    }
}

/// Parses a task listing.
///
/// A line whose first token is exactly `NAME` is the header and is skipped.
/// Blank lines are skipped. Every other line must have at least two
/// whitespace-separated columns: task name, then pid. Further columns are
/// ignored.
///
/// # Errors
///
/// Returns [`ParseError::ListingLine`] for a line with fewer than two columns
/// or a non-integer pid column. Malformed rows are never dropped, so a
/// garbled listing cannot masquerade as an empty task set.
pub fn parse_listing(text: &str) -> Result<Vec<ListingEntry>, ParseError> {
    let mut entries = Vec::new();

    for (idx, line) in text.lines().enumerate() {
        let mut columns = line.split_whitespace();
        let Some(name) = columns.next() else {
            continue;
        };
        if name == HEADER_TOKEN {
            continue;
        }

        let malformed = |reason| ParseError::ListingLine {
            line_no: idx + 1,
            line: line.to_string(),
            reason,
        };

        let pid = columns.next().ok_or_else(|| malformed("missing pid column"))?;
        let pid = parse_pid(pid).map_err(|_| malformed("pid column is not an integer"))?;

        entries.push(ListingEntry {
            name: name.to_string(),
            pid,
        });
    }

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn entry(name: &str, pid: i64) -> ListingEntry {
        ListingEntry {
            name: name.to_string(),
            pid,
        }
    }

    #[test]
    fn test_parse_listing_basic() {
        let entries = parse_listing("NAME PID\nfoo 1234\nbar -1\n").unwrap();
        assert_eq!(entries, vec![entry("foo", 1234), entry("bar", -1)]);
        assert!(entries[0].is_running());
        assert!(!entries[1].is_running());
    }

    #[test]
    fn test_parse_listing_extra_columns_ignored() {
        let text = "NAME       PID   STATUS\nnetwork    88    running\ndbus       -1    done\n";
        let entries = parse_listing(text).unwrap();
        assert_eq!(entries, vec![entry("network", 88), entry("dbus", -1)]);
    }

    #[test]
    fn test_parse_listing_header_only() {
        assert!(parse_listing("NAME PID\n").unwrap().is_empty());
    }

    #[test]
    fn test_parse_listing_empty_input() {
        assert!(parse_listing("").unwrap().is_empty());
    }

    #[test]
    fn test_parse_listing_skips_blank_lines() {
        let entries = parse_listing("NAME PID\n\nfoo 1\n   \n").unwrap();
        assert_eq!(entries, vec![entry("foo", 1)]);
    }

    #[test]
    fn test_parse_listing_header_token_is_case_exact() {
        // A task literally named "name" is a row, not a header.
        let entries = parse_listing("NAME PID\nname 5\n").unwrap();
        assert_eq!(entries, vec![entry("name", 5)]);

        let err = parse_listing("Name PID\n").unwrap_err();
        assert!(matches!(err, ParseError::ListingLine { line_no: 1, .. }));
    }

    #[test]
    fn test_parse_listing_single_column_is_error() {
        let err = parse_listing("NAME PID\nfoo 1\nbroken\n").unwrap_err();
        match err {
            ParseError::ListingLine {
                line_no,
                line,
                reason,
            } => {
                assert_eq!(line_no, 3);
                assert_eq!(line, "broken");
                assert_eq!(reason, "missing pid column");
            },
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_parse_listing_non_numeric_pid_is_error() {
        let err = parse_listing("NAME PID\nfoo running\n").unwrap_err();
        assert!(matches!(
            err,
            ParseError::ListingLine {
                reason: "pid column is not an integer",
                ..
            }
        ));
    }

    proptest! {
        #[test]
        fn prop_rendered_rows_parse_back(
            rows in prop::collection::vec(("[a-z][a-z0-9_.-]{0,15}", -1i64..100_000), 0..20)
        ) {
            let mut text = String::from("NAME PID\n");
            for (name, pid) in &rows {
                text.push_str(&format!("{name}\t{pid}\n"));
            }

            let parsed = parse_listing(&text).unwrap();
            prop_assert_eq!(parsed.len(), rows.len());
            for (entry, (name, pid)) in parsed.iter().zip(&rows) {
                prop_assert_eq!(&entry.name, name);
                prop_assert_eq!(entry.pid, *pid);
            }
        }
    }
}
