use super::repository::NewsRepository;
use crate::work::{WorkOutcome, Worker};

/// Background job that runs one news sync per attempt.
///
/// Retryable failures ask the engine for another attempt after backoff;
/// anything else ends the attempt for good.
pub struct NewsSyncWorker {
    repository: NewsRepository,
}

impl NewsSyncWorker {
    pub fn new(repository: NewsRepository) -> Self {
        Self { repository }
    }
}

impl Worker for NewsSyncWorker {
    async fn do_work(&self) -> WorkOutcome {
        tracing::debug!("News sync attempt starting");
        match self.repository.sync_news().await {
            Ok(count) => {
                tracing::info!(articles = count, "News sync succeeded");
                WorkOutcome::Success
            }
            Err(e) if e.is_retryable() => {
                tracing::warn!(error = %e, "News sync failed, will retry");
                WorkOutcome::Retry
            }
            Err(e) => {
                tracing::error!(error = %e, "News sync failed");
                WorkOutcome::Failure
            }
        }
    }
}
