use chrono::{DateTime, Utc};

#[derive(Debug, Clone)]
pub struct Article {
    pub id: String,
    pub title: String,
    pub url: String,
    pub thumbnail: Option<String>,
    pub published_at: DateTime<Utc>,
    pub author: String,
    pub content_preview: Option<String>,
    pub category: String,
    pub collected_at: DateTime<Utc>,
    pub is_evaluated: bool,
    pub evaluation_retry_count: i64,
    pub is_excluded: bool,
    pub exclusion_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Article as produced by the collector. Evaluation bookkeeping columns are
/// owned by the evaluation queue and are not part of this struct.
#[derive(Debug, Clone)]
pub struct NewArticle {
    pub id: String,
    pub title: String,
    pub url: String,
    pub thumbnail: Option<String>,
    pub published_at: DateTime<Utc>,
    pub author: String,
    pub content_preview: Option<String>,
    pub category: String,
    pub is_excluded: bool,
    pub exclusion_reason: Option<String>,
}
