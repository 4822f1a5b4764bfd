use regex::Regex;
use std::sync::LazyLock;

/// Shown in place of an article body the API did not provide.
pub const NO_CONTENT: &str = "No content available.";

// Truncation marker the search API appends, e.g. "[+1234 chars]".
static TRUNCATION_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[\+\d+ chars\]").expect("marker pattern is valid"));

/// Cleans an article body for display.
///
/// The search API truncates bodies and appends a marker like
/// `"[+1234 chars]"`. Every such marker is removed and the result trimmed.
/// Bracketed text that doesn't match the marker shape exactly is kept.
///
/// # Examples
///
/// ```
/// use headlines::util::clean_content;
///
/// assert_eq!(clean_content(Some("Rain expected… [+2107 chars]")), "Rain expected…");
/// assert_eq!(clean_content(None), "No content available.");
/// ```
pub fn clean_content(content: Option<&str>) -> String {
    let Some(content) = content else {
        return NO_CONTENT.to_string();
    };
    TRUNCATION_MARKER
        .replace_all(content, "")
        .trim()
        .to_string()
}

/// Whether the stored body was cut short by the API.
pub fn is_truncated(content: Option<&str>) -> bool {
    content.is_some_and(|c| TRUNCATION_MARKER.is_match(c))
}
