//! News synchronization.
//!
//! [`NewsRepository::sync_news`] is the one write path into the article
//! cache. [`NewsSyncWorker`] wraps it for the work engine and
//! [`NewsSyncScheduler`] owns the periodic and on-demand jobs.

mod repository;
mod scheduler;
mod worker;

pub use repository::{NewsRepository, SearchParams, SyncError};
pub use scheduler::{NewsSyncScheduler, SyncSchedule, IMMEDIATE_SYNC_WORK, PERIODIC_SYNC_WORK};
pub use worker::NewsSyncWorker;
