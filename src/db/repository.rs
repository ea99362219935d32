use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use tokio_rusqlite::Connection;

use crate::error::Result;
use crate::models::{Article, ArticleReference, Evaluation, NewArticle, NewEvaluation};

use super::schema::SCHEMA;

pub struct Repository {
    conn: Connection,
}

/// Article joined with its canonical (latest) evaluation, as read by the
/// ranking exporter.
#[derive(Debug, Clone)]
pub struct RankedArticle {
    pub id: String,
    pub title: String,
    pub url: String,
    pub thumbnail: Option<String>,
    pub published_at: DateTime<Utc>,
    pub author: String,
    pub content_preview: Option<String>,
    pub category: String,
    pub quality_score: i64,
    pub originality_score: i64,
    pub entertainment_score: i64,
    pub total_score: i64,
    pub ai_summary: String,
    pub evaluated_at: DateTime<Utc>,
}

impl Repository {
    pub async fn new(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path).await?;

        conn.call(|conn| {
            conn.execute_batch("PRAGMA foreign_keys = ON;")?;
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await?;

        Ok(Self { conn })
    }

    // Reference store operations

    pub async fn has_seen(&self, source_key: &str, url_name: &str) -> Result<bool> {
        let source_key = source_key.to_string();
        let url_name = url_name.to_string();
        let seen = self
            .conn
            .call(move |conn| {
                let found: Option<i64> = conn
                    .query_row(
                        "SELECT 1 FROM article_references WHERE source_key = ?1 AND url_name = ?2",
                        params![source_key, url_name],
                        |row| row.get(0),
                    )
                    .optional()?;
                Ok(found.is_some())
            })
            .await?;
        Ok(seen)
    }

    /// Idempotent insert: a reference that already exists is left untouched.
    pub async fn record(&self, reference: ArticleReference) -> Result<()> {
        self.conn
            .call(move |conn| {
                conn.execute(
                    r#"INSERT OR IGNORE INTO article_references
                       (source_key, url_name, category, title, author, thumbnail, published_at, collected_at, is_processed)
                       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"#,
                    params![
                        reference.source_key,
                        reference.url_name,
                        reference.category,
                        reference.title,
                        reference.author,
                        reference.thumbnail,
                        reference.published_at.map(|dt| dt.to_rfc3339()),
                        reference.collected_at.to_rfc3339(),
                        reference.is_processed,
                    ],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn mark_processed(&self, source_key: &str, url_name: &str) -> Result<()> {
        let source_key = source_key.to_string();
        let url_name = url_name.to_string();
        let updated = self
            .conn
            .call(move |conn| {
                let n = conn.execute(
                    "UPDATE article_references SET is_processed = 1 WHERE source_key = ?1 AND url_name = ?2",
                    params![source_key, url_name],
                )?;
                Ok(n)
            })
            .await?;
        if updated == 0 {
            tracing::debug!("mark_processed: no such reference, ignoring");
        }
        Ok(())
    }

    pub async fn unprocessed(&self, category: &str, limit: u32) -> Result<Vec<ArticleReference>> {
        let category = category.to_string();
        let references = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    r#"SELECT source_key, url_name, category, title, author, thumbnail, published_at, collected_at, is_processed
                       FROM article_references
                       WHERE category = ?1 AND is_processed = 0
                       ORDER BY collected_at ASC, rowid ASC
                       LIMIT ?2"#,
                )?;
                let references = stmt
                    .query_map(params![category, limit], |row| Ok(reference_from_row(row)))?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(references)
            })
            .await?;
        Ok(references)
    }

    // Article operations

    /// Insert or refresh an article. Conflicts on id update the content
    /// columns only; evaluation bookkeeping (`is_evaluated`,
    /// `evaluation_retry_count`) belongs to the evaluation queue and is
    /// never overwritten here.
    pub async fn upsert_article(&self, article: NewArticle) -> Result<()> {
        self.conn
            .call(move |conn| {
                conn.execute(
                    r#"INSERT INTO articles
                       (id, title, url, thumbnail, published_at, author, content_preview,
                        category, is_excluded, exclusion_reason)
                       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                       ON CONFLICT(id) DO UPDATE SET
                           title = excluded.title,
                           url = excluded.url,
                           thumbnail = excluded.thumbnail,
                           published_at = excluded.published_at,
                           author = excluded.author,
                           content_preview = excluded.content_preview,
                           category = excluded.category,
                           is_excluded = excluded.is_excluded,
                           exclusion_reason = excluded.exclusion_reason,
                           updated_at = datetime('now')"#,
                    params![
                        article.id,
                        article.title,
                        article.url,
                        article.thumbnail,
                        article.published_at.to_rfc3339(),
                        article.author,
                        article.content_preview,
                        article.category,
                        article.is_excluded,
                        article.exclusion_reason,
                    ],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn article(&self, article_id: &str) -> Result<Option<Article>> {
        let article_id = article_id.to_string();
        let article = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    r#"SELECT id, title, url, thumbnail, published_at, author, content_preview,
                              category, collected_at, is_evaluated, evaluation_retry_count,
                              is_excluded, exclusion_reason, created_at, updated_at
                       FROM articles WHERE id = ?1"#,
                )?;
                let article = stmt
                    .query_row(params![article_id], |row| Ok(article_from_row(row)))
                    .optional()?;
                Ok(article)
            })
            .await?;
        Ok(article)
    }

    /// Unevaluated, non-excluded articles in collection order, capped to
    /// respect the daily scoring ceiling.
    pub async fn select_candidates(&self, limit: u32) -> Result<Vec<Article>> {
        let articles = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    r#"SELECT id, title, url, thumbnail, published_at, author, content_preview,
                              category, collected_at, is_evaluated, evaluation_retry_count,
                              is_excluded, exclusion_reason, created_at, updated_at
                       FROM articles
                       WHERE is_excluded = 0 AND is_evaluated = 0
                       ORDER BY collected_at ASC, rowid ASC
                       LIMIT ?1"#,
                )?;
                let articles = stmt
                    .query_map(params![limit], |row| Ok(article_from_row(row)))?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(articles)
            })
            .await?;
        Ok(articles)
    }

    /// Bumps the retry counter and returns the new value.
    pub async fn increment_retry(&self, article_id: &str) -> Result<i64> {
        let article_id = article_id.to_string();
        let count = self
            .conn
            .call(move |conn| {
                conn.execute(
                    r#"UPDATE articles
                       SET evaluation_retry_count = evaluation_retry_count + 1,
                           updated_at = datetime('now')
                       WHERE id = ?1"#,
                    params![article_id],
                )?;
                let count: i64 = conn.query_row(
                    "SELECT evaluation_retry_count FROM articles WHERE id = ?1",
                    params![article_id],
                    |row| row.get(0),
                )?;
                Ok(count)
            })
            .await?;
        Ok(count)
    }

    pub async fn mark_evaluated(&self, article_id: &str) -> Result<()> {
        let article_id = article_id.to_string();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "UPDATE articles SET is_evaluated = 1, updated_at = datetime('now') WHERE id = ?1",
                    params![article_id],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    // Evaluation operations

    pub async fn insert_evaluation(&self, evaluation: NewEvaluation) -> Result<i64> {
        let id = self
            .conn
            .call(move |conn| {
                conn.execute(
                    r#"INSERT INTO evaluations
                       (article_id, quality_score, originality_score, entertainment_score,
                        total_score, ai_summary, is_retry_evaluation, original_evaluation_id,
                        retry_reason, evaluated_at)
                       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"#,
                    params![
                        evaluation.article_id,
                        evaluation.quality_score,
                        evaluation.originality_score,
                        evaluation.entertainment_score,
                        evaluation.total_score,
                        evaluation.ai_summary,
                        evaluation.is_retry_evaluation,
                        evaluation.original_evaluation_id,
                        evaluation.retry_reason,
                        Utc::now().to_rfc3339(),
                    ],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await?;
        Ok(id)
    }

    /// Canonical evaluation for an article: the most recent row.
    pub async fn latest_evaluation(&self, article_id: &str) -> Result<Option<Evaluation>> {
        let article_id = article_id.to_string();
        let evaluation = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    r#"SELECT id, article_id, quality_score, originality_score, entertainment_score,
                              total_score, ai_summary, is_retry_evaluation, original_evaluation_id,
                              retry_reason, evaluated_at, created_at
                       FROM evaluations
                       WHERE article_id = ?1
                       ORDER BY id DESC
                       LIMIT 1"#,
                )?;
                let evaluation = stmt
                    .query_row(params![article_id], |row| Ok(evaluation_from_row(row)))
                    .optional()?;
                Ok(evaluation)
            })
            .await?;
        Ok(evaluation)
    }

    pub async fn evaluations_for(&self, article_id: &str) -> Result<Vec<Evaluation>> {
        let article_id = article_id.to_string();
        let evaluations = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    r#"SELECT id, article_id, quality_score, originality_score, entertainment_score,
                              total_score, ai_summary, is_retry_evaluation, original_evaluation_id,
                              retry_reason, evaluated_at, created_at
                       FROM evaluations
                       WHERE article_id = ?1
                       ORDER BY id ASC"#,
                )?;
                let evaluations = stmt
                    .query_map(params![article_id], |row| Ok(evaluation_from_row(row)))?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(evaluations)
            })
            .await?;
        Ok(evaluations)
    }

    /// Number of evaluations performed on the given calendar day. Used to
    /// rebuild the rate limiter's daily counter after a restart.
    pub async fn evaluations_on(&self, day: DateTime<Utc>) -> Result<u32> {
        let day = day.to_rfc3339();
        let count = self
            .conn
            .call(move |conn| {
                let count: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM evaluations WHERE date(evaluated_at) = date(?1)",
                    params![day],
                    |row| row.get(0),
                )?;
                Ok(count)
            })
            .await?;
        Ok(count as u32)
    }

    /// Evaluated articles joined with their canonical evaluation, best first.
    pub async fn ranked_articles(&self, min_score: i64, limit: u32) -> Result<Vec<RankedArticle>> {
        let ranked = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    r#"SELECT a.id, a.title, a.url, a.thumbnail, a.published_at, a.author,
                              a.content_preview, a.category,
                              e.quality_score, e.originality_score, e.entertainment_score,
                              e.total_score, e.ai_summary, e.evaluated_at
                       FROM articles a
                       JOIN evaluations e ON e.article_id = a.id
                       WHERE e.id = (SELECT MAX(id) FROM evaluations WHERE article_id = a.id)
                         AND a.is_excluded = 0
                         AND e.total_score >= ?1
                       ORDER BY e.total_score DESC, a.published_at DESC
                       LIMIT ?2"#,
                )?;
                let ranked = stmt
                    .query_map(params![min_score, limit], |row| Ok(ranked_from_row(row)))?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(ranked)
            })
            .await?;
        Ok(ranked)
    }

    // Operator log

    pub async fn record_log(&self, level: &str, component: &str, message: &str) -> Result<()> {
        let level = level.to_string();
        let component = component.to_string();
        let message = message.to_string();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO system_logs (level, message, component) VALUES (?1, ?2, ?3)",
                    params![level, message, component],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }
}

fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    // Try RFC3339 first (e.g., "2026-01-11T12:34:56+00:00")
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    // Try SQLite datetime format (e.g., "2026-01-11 12:34:56")
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    None
}

fn reference_from_row(row: &Row) -> ArticleReference {
    ArticleReference {
        source_key: row.get(0).unwrap(),
        url_name: row.get(1).unwrap(),
        category: row.get(2).unwrap(),
        title: row.get(3).unwrap(),
        author: row.get(4).unwrap(),
        thumbnail: row.get(5).unwrap(),
        published_at: row
            .get::<_, Option<String>>(6)
            .unwrap()
            .and_then(|s| parse_datetime(&s)),
        collected_at: row
            .get::<_, String>(7)
            .ok()
            .and_then(|s| parse_datetime(&s))
            .unwrap_or_else(Utc::now),
        is_processed: row.get::<_, i64>(8).unwrap() != 0,
    }
}

fn article_from_row(row: &Row) -> Article {
    Article {
        id: row.get(0).unwrap(),
        title: row.get(1).unwrap(),
        url: row.get(2).unwrap(),
        thumbnail: row.get(3).unwrap(),
        published_at: row
            .get::<_, String>(4)
            .ok()
            .and_then(|s| parse_datetime(&s))
            .unwrap_or_else(Utc::now),
        author: row.get(5).unwrap(),
        content_preview: row.get(6).unwrap(),
        category: row.get(7).unwrap(),
        collected_at: row
            .get::<_, String>(8)
            .ok()
            .and_then(|s| parse_datetime(&s))
            .unwrap_or_else(Utc::now),
        is_evaluated: row.get::<_, i64>(9).unwrap() != 0,
        evaluation_retry_count: row.get(10).unwrap(),
        is_excluded: row.get::<_, i64>(11).unwrap() != 0,
        exclusion_reason: row.get(12).unwrap(),
        created_at: row
            .get::<_, String>(13)
            .ok()
            .and_then(|s| parse_datetime(&s))
            .unwrap_or_else(Utc::now),
        updated_at: row
            .get::<_, String>(14)
            .ok()
            .and_then(|s| parse_datetime(&s))
            .unwrap_or_else(Utc::now),
    }
}

fn evaluation_from_row(row: &Row) -> Evaluation {
    Evaluation {
        id: row.get(0).unwrap(),
        article_id: row.get(1).unwrap(),
        quality_score: row.get(2).unwrap(),
        originality_score: row.get(3).unwrap(),
        entertainment_score: row.get(4).unwrap(),
        total_score: row.get(5).unwrap(),
        ai_summary: row.get(6).unwrap(),
        is_retry_evaluation: row.get::<_, i64>(7).unwrap() != 0,
        original_evaluation_id: row.get(8).unwrap(),
        retry_reason: row.get(9).unwrap(),
        evaluated_at: row
            .get::<_, String>(10)
            .ok()
            .and_then(|s| parse_datetime(&s))
            .unwrap_or_else(Utc::now),
        created_at: row
            .get::<_, String>(11)
            .ok()
            .and_then(|s| parse_datetime(&s))
            .unwrap_or_else(Utc::now),
    }
}

fn ranked_from_row(row: &Row) -> RankedArticle {
    RankedArticle {
        id: row.get(0).unwrap(),
        title: row.get(1).unwrap(),
        url: row.get(2).unwrap(),
        thumbnail: row.get(3).unwrap(),
        published_at: row
            .get::<_, String>(4)
            .ok()
            .and_then(|s| parse_datetime(&s))
            .unwrap_or_else(Utc::now),
        author: row.get(5).unwrap(),
        content_preview: row.get(6).unwrap(),
        category: row.get(7).unwrap(),
        quality_score: row.get(8).unwrap(),
        originality_score: row.get(9).unwrap(),
        entertainment_score: row.get(10).unwrap(),
        total_score: row.get(11).unwrap(),
        ai_summary: row.get(12).unwrap(),
        evaluated_at: row
            .get::<_, String>(13)
            .ok()
            .and_then(|s| parse_datetime(&s))
            .unwrap_or_else(Utc::now),
    }
}
