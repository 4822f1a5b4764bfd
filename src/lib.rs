//! headlines: keeps a local news article cache in sync with a search API.
//!
//! - [`storage`] - SQLite article cache, the single source of truth for reads
//! - [`remote`] - search API client
//! - [`sync`] - the sync operation and the jobs that run it
//! - [`work`] - in-process background work engine
//! - [`observe`] - lazily started live views for a presentation layer

pub mod config;
pub mod observe;
pub mod remote;
pub mod storage;
pub mod sync;
pub mod util;
pub mod work;
