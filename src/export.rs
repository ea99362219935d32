use std::fs;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::db::{RankedArticle, Repository};
use crate::error::Result;

const TOP_COUNT: usize = 5;
const EXPORT_LIMIT: u32 = 1000;

#[derive(Debug, Clone, Serialize)]
struct ArticleEntry {
    id: String,
    title: String,
    url: String,
    thumbnail: Option<String>,
    published_at: DateTime<Utc>,
    author: String,
    content_preview: Option<String>,
    category: String,
    quality_score: i64,
    originality_score: i64,
    entertainment_score: i64,
    total_score: i64,
    ai_summary: String,
    evaluated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
struct RankingFile {
    generated_at: DateTime<Utc>,
    count: usize,
    articles: Vec<ArticleEntry>,
}

/// Writes the ranking JSON files the static site serves: `articles.json`
/// with every evaluated article and `top.json` with the day's best.
pub struct Exporter<'a> {
    repo: &'a Repository,
    output_dir: PathBuf,
}

impl<'a> Exporter<'a> {
    pub fn new(repo: &'a Repository, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            repo,
            output_dir: output_dir.into(),
        }
    }

    pub async fn export_all(&self) -> Result<()> {
        fs::create_dir_all(&self.output_dir)?;

        let ranked = self.repo.ranked_articles(0, EXPORT_LIMIT).await?;
        let entries: Vec<ArticleEntry> = ranked.into_iter().map(article_entry).collect();
        let top: Vec<ArticleEntry> = entries.iter().take(TOP_COUNT).cloned().collect();

        self.write_json("top.json", top)?;
        let count = entries.len();
        self.write_json("articles.json", entries)?;

        tracing::info!("Exported {count} articles to {}", self.output_dir.display());
        Ok(())
    }

    /// Write through a temp file so readers never see a half-written export.
    fn write_json(&self, name: &str, articles: Vec<ArticleEntry>) -> Result<()> {
        let file = RankingFile {
            generated_at: Utc::now(),
            count: articles.len(),
            articles,
        };

        let path = self.output_dir.join(name);
        let tmp_path = self.output_dir.join(format!("{name}.tmp"));
        fs::write(&tmp_path, serde_json::to_vec_pretty(&file)?)?;
        fs::rename(&tmp_path, &path)?;
        Ok(())
    }
}

fn article_entry(ranked: RankedArticle) -> ArticleEntry {
    ArticleEntry {
        id: ranked.id,
        title: ranked.title,
        url: ranked.url,
        thumbnail: ranked.thumbnail,
        published_at: ranked.published_at,
        author: ranked.author,
        content_preview: ranked.content_preview,
        category: ranked.category,
        quality_score: ranked.quality_score,
        originality_score: ranked.originality_score,
        entertainment_score: ranked.entertainment_score,
        total_score: ranked.total_score,
        ai_summary: ranked.ai_summary,
        evaluated_at: ranked.evaluated_at,
    }
}
