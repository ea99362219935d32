use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;

/// One entry on a listing page, before the article page itself is fetched.
#[derive(Debug, Clone)]
pub struct ListingEntry {
    pub source_key: String,
    pub url_name: String,
    pub title: String,
    pub author: Option<String>,
    pub thumbnail: Option<String>,
    pub published_at: DateTime<Utc>,
}

/// Full article record as read from its detail page.
#[derive(Debug, Clone)]
pub struct ArticleDetail {
    pub title: Option<String>,
    pub author: Option<String>,
    pub thumbnail: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub body_text: String,
}

/// Paginated listing of a category. An empty page signals the end of
/// results. Listings are assumed reverse-chronological.
#[async_trait]
pub trait ListingSource: Send + Sync {
    async fn list_page(&self, label: &str, page: u32) -> Result<Vec<ListingEntry>>;
}

/// Article detail pages, addressed by the same composite key the listing
/// hands out.
#[async_trait]
pub trait DetailSource: Send + Sync {
    async fn fetch_detail(&self, source_key: &str, url_name: &str) -> Result<ArticleDetail>;
}
