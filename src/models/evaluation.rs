use chrono::{DateTime, Utc};

pub const QUALITY_MAX: i64 = 40;
pub const ORIGINALITY_MAX: i64 = 30;
pub const ENTERTAINMENT_MAX: i64 = 30;

/// One scoring result for an article. An article can accumulate several
/// rows (retry chain); the row with the highest id is canonical.
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub id: i64,
    pub article_id: String,
    pub quality_score: i64,
    pub originality_score: i64,
    pub entertainment_score: i64,
    pub total_score: i64,
    pub ai_summary: String,
    pub is_retry_evaluation: bool,
    pub original_evaluation_id: Option<i64>,
    pub retry_reason: Option<String>,
    pub evaluated_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewEvaluation {
    pub article_id: String,
    pub quality_score: i64,
    pub originality_score: i64,
    pub entertainment_score: i64,
    pub total_score: i64,
    pub ai_summary: String,
    pub is_retry_evaluation: bool,
    pub original_evaluation_id: Option<i64>,
    pub retry_reason: Option<String>,
}
