//! Observable state for a presentation layer.
//!
//! [`SharedState`] turns a cold stream into a lazily started, replaying view;
//! [`NewsView`] wires the article cache and the periodic sync status through
//! it.

mod news_view;
mod share;

pub use news_view::NewsView;
pub use share::{SharedState, Subscription, DEFAULT_GRACE};
