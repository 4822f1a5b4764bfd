use serde::Serialize;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Database-specific errors with user-friendly messages
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Another process holds a write lock on the database file
    #[error("The article cache is locked by another process. Please close it and try again.")]
    InstanceLocked,

    /// Migration failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// Generic database error
    #[error("Database error: {0}")]
    Other(#[from] sqlx::Error),
}

impl DatabaseError {
    /// Check if a sqlx error indicates database locking
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        if is_lock_message(&err.to_string()) {
            return DatabaseError::InstanceLocked;
        }
        DatabaseError::Other(err)
    }
}

/// SQLITE_BUSY (5), SQLITE_LOCKED (6) and SQLITE_CANTOPEN (14) all surface
/// through the error message only.
pub(crate) fn is_lock_message(message: &str) -> bool {
    let message = message.to_lowercase();
    message.contains("database is locked")
        || message.contains("database table is locked")
        || message.contains("sqlite_busy")
        || message.contains("sqlite_locked")
        || message.contains("unable to open database file")
}

// ============================================================================
// Helper Types
// ============================================================================

/// Internal row type for `news_articles` queries (used by sqlx FromRow).
/// The primary key column is `url`; it becomes `Article::id`.
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct ArticleDbRow {
    pub url: String,
    pub title: String,
    pub description: Option<String>,
    pub author: Option<String>,
    pub image_url: Option<String>,
    pub source_name: String,
    pub published_at: String,
    pub content: Option<String>,
}

impl ArticleDbRow {
    pub(crate) fn into_article(self) -> Article {
        Article {
            id: self.url,
            title: self.title,
            description: self.description,
            author: self.author,
            image_url: self.image_url,
            source_name: self.source_name,
            published_at: self.published_at,
            content: self.content,
        }
    }
}

// ============================================================================
// Data Structures
// ============================================================================

/// A cached news article.
///
/// `id` is the canonical source URL and is the only identity an article has:
/// a sync that returns the same URL overwrites the stored record.
/// `published_at` is kept as the ISO-8601 string the source sent, which sorts
/// lexicographically in the same order as chronologically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Article {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub author: Option<String>,
    pub image_url: Option<String>,
    pub source_name: String,
    pub published_at: String,
    pub content: Option<String>,
}
