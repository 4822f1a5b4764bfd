use anyhow::Result;
use futures::stream::{self, BoxStream, StreamExt};
use sqlx::QueryBuilder;

use super::schema::Database;
use super::types::{Article, ArticleDbRow};

/// Rows per INSERT statement. 8 columns * 50 = 400 bound parameters, well
/// under SQLite's 999 limit.
const BATCH_SIZE: usize = 50;

impl Database {
    // ========================================================================
    // Article Mutations
    // ========================================================================

    /// Replace the whole cache with `articles`, returns the number of rows stored.
    ///
    /// The clear and the bulk insert run in a single transaction and observers
    /// are notified only after commit, so nobody ever reads the empty table in
    /// between. Rollback happens on drop if any statement fails, leaving the
    /// previous contents in place.
    ///
    /// Duplicate ids inside `articles` collapse to the last occurrence
    /// (`INSERT OR REPLACE`), keeping one record per URL.
    pub async fn replace_all(&self, articles: &[Article]) -> Result<usize> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM news_articles")
            .execute(&mut *tx)
            .await?;

        for chunk in articles.chunks(BATCH_SIZE) {
            let mut builder: QueryBuilder<sqlx::Sqlite> = QueryBuilder::new(
                "INSERT OR REPLACE INTO news_articles \
                 (url, title, description, author, image_url, source_name, published_at, content) ",
            );
            builder.push_values(chunk, |mut b, article| {
                b.push_bind(&article.id)
                    .push_bind(&article.title)
                    .push_bind(&article.description)
                    .push_bind(&article.author)
                    .push_bind(&article.image_url)
                    .push_bind(&article.source_name)
                    .push_bind(&article.published_at)
                    .push_bind(&article.content);
            });
            builder.build().execute(&mut *tx).await?;
        }

        let stored: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM news_articles")
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        self.notify_changed();

        tracing::debug!(
            received = articles.len(),
            stored = stored.0,
            "Replaced article cache"
        );
        Ok(stored.0 as usize)
    }

    // ========================================================================
    // Article Queries
    // ========================================================================

    /// Snapshot of the cache, newest first.
    ///
    /// Articles sharing a timestamp keep their storage order.
    pub async fn list_articles(&self) -> Result<Vec<Article>> {
        let rows = sqlx::query_as::<_, ArticleDbRow>(
            r#"
            SELECT url, title, description, author, image_url, source_name,
                   published_at, content
            FROM news_articles
            ORDER BY published_at DESC, rowid ASC
        "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(ArticleDbRow::into_article).collect())
    }

    /// Get a single article by its id (canonical URL).
    pub async fn get_article(&self, id: &str) -> Result<Option<Article>> {
        let row = sqlx::query_as::<_, ArticleDbRow>(
            r#"
            SELECT url, title, description, author, image_url, source_name,
                   published_at, content
            FROM news_articles
            WHERE url = ?
        "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(ArticleDbRow::into_article))
    }

    pub async fn count_articles(&self) -> Result<i64> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM news_articles")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.0)
    }

    // ========================================================================
    // Observation
    // ========================================================================

    /// Live view of the cache.
    ///
    /// Yields the full ordered list immediately, then again after every
    /// committed mutation. Mutations that land while a query is running are
    /// coalesced into one follow-up emission. The stream never ends on its
    /// own; drop it to stop observing.
    pub fn observe_articles(&self) -> BoxStream<'static, Result<Vec<Article>>> {
        let rx = self.changes.subscribe();
        stream::unfold((self.clone(), rx, true), |(db, mut rx, first)| async move {
            if !first && rx.changed().await.is_err() {
                return None;
            }
            // Mark the current generation seen before querying so a write
            // racing this query triggers another emission.
            let _generation = *rx.borrow_and_update();
            let articles = db.list_articles().await;
            Some((articles, (db, rx, false)))
        })
        .boxed()
    }
}
