use serde::Deserialize;

use crate::storage::Article;

/// Status value the search endpoint uses for a successful response.
pub const STATUS_OK: &str = "ok";

/// Body of a `v2/everything` response.
///
/// Error responses carry `status: "error"` plus `code`/`message` and no
/// `articles`, so the list defaults to empty. Unknown fields are ignored.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewsResponse {
    pub status: String,
    #[serde(default)]
    pub total_results: Option<u64>,
    #[serde(default)]
    pub articles: Vec<ArticleDto>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl NewsResponse {
    pub fn is_ok(&self) -> bool {
        self.status == STATUS_OK
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticleDto {
    pub url: String,
    pub title: String,
    pub description: Option<String>,
    pub author: Option<String>,
    pub url_to_image: Option<String>,
    pub source: SourceDto,
    pub published_at: String,
    pub content: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceDto {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
}

impl From<ArticleDto> for Article {
    fn from(dto: ArticleDto) -> Self {
        Article {
            id: dto.url,
            title: dto.title,
            description: dto.description,
            author: dto.author,
            image_url: dto.url_to_image,
            source_name: dto.source.name,
            published_at: dto.published_at,
            content: dto.content,
        }
    }
}
