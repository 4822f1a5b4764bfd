use anyhow::Result;
use futures::stream::BoxStream;
use secrecy::SecretString;
use thiserror::Error;

use crate::remote::{FetchError, NewsClient, DEFAULT_QUERY, DEFAULT_SORT_BY};
use crate::storage::{Article, Database};

/// Why a sync attempt did not update the cache.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Transport, HTTP or decode failure while fetching
    #[error("Fetch failed: {0}")]
    Fetch(#[from] FetchError),
    /// The endpoint answered, but not with `status: "ok"`
    #[error("API error: status \"{status}\" ({})", .message.as_deref().unwrap_or("no message"))]
    Status {
        status: String,
        code: Option<String>,
        message: Option<String>,
    },
    /// Writing the fetched articles to the cache failed
    #[error("Failed to store articles: {0}")]
    Storage(String),
}

impl SyncError {
    /// Fetch and status errors are expected to clear up on their own; a
    /// storage failure points at a local problem and is not retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Fetch(_) | SyncError::Status { .. } => true,
            SyncError::Storage(_) => false,
        }
    }
}

/// The fixed search the app syncs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchParams {
    pub query: String,
    pub sort_by: String,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            query: DEFAULT_QUERY.to_string(),
            sort_by: DEFAULT_SORT_BY.to_string(),
        }
    }
}

/// Single source of truth for articles: reads come from the cache, writes
/// come only from [`NewsRepository::sync_news`].
pub struct NewsRepository {
    client: NewsClient,
    db: Database,
    params: SearchParams,
    api_key: SecretString,
}

impl NewsRepository {
    pub fn new(
        client: NewsClient,
        db: Database,
        params: SearchParams,
        api_key: SecretString,
    ) -> Self {
        Self {
            client,
            db,
            params,
            api_key,
        }
    }

    /// Live, newest-first view of the cached articles.
    pub fn articles(&self) -> BoxStream<'static, Result<Vec<Article>>> {
        self.db.observe_articles()
    }

    /// Fetch the latest results and make them the entire cache.
    ///
    /// On any error the cache is left exactly as it was. On success it holds
    /// exactly the fetched articles, so running this twice against the same
    /// response leaves the same cache as running it once.
    ///
    /// Returns the number of articles now cached.
    pub async fn sync_news(&self) -> Result<usize, SyncError> {
        let response = self
            .client
            .fetch(&self.params.query, &self.params.sort_by, &self.api_key)
            .await?;

        if !response.is_ok() {
            return Err(SyncError::Status {
                status: response.status,
                code: response.code,
                message: response.message,
            });
        }

        let articles: Vec<Article> = response.articles.into_iter().map(Article::from).collect();
        let stored = self
            .db
            .replace_all(&articles)
            .await
            .map_err(|e| SyncError::Storage(e.to_string()))?;

        tracing::info!(
            fetched = articles.len(),
            stored = stored,
            query = %self.params.query,
            "News sync complete"
        );
        Ok(stored)
    }
}
