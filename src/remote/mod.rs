//! Client for the remote article search endpoint.
//!
//! - [`client`] - HTTP fetch with size limits, no retries
//! - [`dto`] - wire shapes of the search response and their mapping to [`Article`]
//!
//! [`Article`]: crate::storage::Article

mod client;
mod dto;

pub use client::{
    build_http_client, FetchError, NewsClient, DEFAULT_BASE_URL, DEFAULT_QUERY, DEFAULT_SORT_BY,
};
pub use dto::{ArticleDto, NewsResponse, SourceDto, STATUS_OK};
