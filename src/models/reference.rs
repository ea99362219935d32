use chrono::{DateTime, Utc};

/// A sighting of an article on a listing page, recorded before its detail
/// page has been fetched. Keyed by (source_key, url_name); rows are never
/// deleted so the table doubles as the cross-run dedup ledger.
#[derive(Debug, Clone)]
pub struct ArticleReference {
    pub source_key: String,
    pub url_name: String,
    pub category: String,
    pub title: Option<String>,
    pub author: Option<String>,
    pub thumbnail: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub collected_at: DateTime<Utc>,
    pub is_processed: bool,
}

impl ArticleReference {
    /// Stable article id derived from the composite key.
    pub fn article_id(&self) -> String {
        format!("{}_{}", self.url_name, self.source_key)
    }

    pub fn article_url(&self, base_url: &str) -> String {
        format!(
            "{}/{}/n/{}",
            base_url.trim_end_matches('/'),
            self.url_name,
            self.source_key
        )
    }
}
