//! Display helpers for article detail output.
//!
//! - **Dates**: ISO-8601 publish timestamps rendered as `"Oct 27, 2023 • 10:15 AM"`
//! - **Text**: article bodies with the API's truncation marker removed

mod date;
mod text;

pub use date::format_published_date;
pub use text::{clean_content, is_truncated, NO_CONTENT};
