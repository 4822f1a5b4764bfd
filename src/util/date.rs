use chrono::DateTime;

/// Formats an ISO-8601 timestamp for display, in the timestamp's own offset.
///
/// Returns the input unchanged if it doesn't parse.
///
/// # Examples
///
/// ```
/// use headlines::util::format_published_date;
///
/// assert_eq!(format_published_date("2023-10-27T10:15:30Z"), "Oct 27, 2023 • 10:15 AM");
/// assert_eq!(format_published_date("yesterday"), "yesterday");
/// ```
pub fn format_published_date(iso_date: &str) -> String {
    match DateTime::parse_from_rfc3339(iso_date) {
        Ok(parsed) => parsed.format("%b %d, %Y • %I:%M %p").to_string(),
        Err(e) => {
            tracing::trace!(value = %iso_date, error = %e, "Unparseable publish date");
            iso_date.to_string()
        }
    }
}
