//! Line diff between the installed anchor and freshly compiled rules

use similar::{ChangeTag, TextDiff};
use std::fmt::Write;

/// Diffs two rule texts line by line.
///
/// Lines are prefixed `- ` (removed), `+ ` (added) or two spaces
/// (unchanged). Returns `None` when the texts are identical.
pub fn ruleset_diff(old_text: &str, new_text: &str) -> Option<String> {
    if old_text == new_text {
        return None;
    }

    let diff = TextDiff::from_lines(old_text, new_text);
    let mut result = String::new();

    for change in diff.iter_all_changes() {
        let sign = match change.tag() {
            ChangeTag::Delete => "- ",
            ChangeTag::Insert => "+ ",
            ChangeTag::Equal => "  ",
        };
        let _ = write!(result, "{sign}{change}");
        if change.missing_newline() {
            result.push('\n');
        }
    }

    Some(result)
}
