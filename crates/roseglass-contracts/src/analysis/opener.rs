use std::sync::OnceLock;

use regex::Regex;

// Label must be wrapped in literal `**` emphasis; the body may sit on the next
// line behind a blockquote marker and ends at a blank line, the next bold
// header, or end of text.
const OPENER_PATTERN: &str =
    r"(?s)\*\*Suggested Opener[:*]*\*?\s*\n?>?\s*(.+?)(?:\n\n|\n\*\*|$)";

fn opener_regex() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(OPENER_PATTERN).expect("opener pattern compiles"))
}

/// Best-effort lookup of the "Suggested Opener" section in an analysis body.
///
/// Returns `None` when the marker is missing or the captured text is blank.
/// A miss is a normal outcome: the backend's prose is free-form.
pub fn extract_suggested_opener(analysis: &str) -> Option<String> {
    let captures = opener_regex().captures(analysis)?;
    let opener = captures.get(1)?.as_str().trim();
    if opener.is_empty() {
        return None;
    }
    Some(opener.to_string())
}
