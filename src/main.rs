use std::time::Duration;

use chrono::Utc;

mod collect;
mod config;
mod db;
mod error;
mod eval;
mod export;
mod models;
mod quality;
mod rate_limit;

use collect::{Collector, CollectorSettings, PlatformClient, StopReason};
use config::Config;
use db::Repository;
use error::{AppError, Result};
use eval::{EvalSettings, EvaluationQueue, GroqOracle};
use export::Exporter;
use quality::QualityFilter;
use rate_limit::RateLimiter;

#[derive(Debug, Default)]
struct RunSummary {
    collected: u32,
    excluded: u32,
    skipped_known: u32,
    failed_details: u32,
    evaluated: u32,
    eval_failed: u32,
    gave_up: u32,
    deferred: u32,
    category_errors: u32,
}

struct Args {
    categories: Vec<String>,
    limit: Option<u32>,
    export_only: bool,
}

fn parse_args() -> Result<Args> {
    let args: Vec<String> = std::env::args().collect();
    let mut parsed = Args {
        categories: Vec::new(),
        limit: None,
        export_only: false,
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--category" => {
                i += 1;
                let name = args
                    .get(i)
                    .ok_or_else(|| AppError::Config("--category needs a value".to_string()))?;
                parsed.categories.push(name.clone());
            }
            "--limit" => {
                i += 1;
                let value = args
                    .get(i)
                    .and_then(|v| v.parse().ok())
                    .ok_or_else(|| AppError::Config("--limit needs a number".to_string()))?;
                parsed.limit = Some(value);
            }
            "--export-only" => parsed.export_only = true,
            other => {
                return Err(AppError::Config(format!("unknown argument: {other}")));
            }
        }
        i += 1;
    }

    Ok(parsed)
}

#[tokio::main]
async fn main() {
    // Batch job: everything on stderr, INFO by default
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run().await {
        tracing::error!("Daily batch failed: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let args = parse_args()?;
    let config = Config::load()?;
    let repo = Repository::new(&config.db_path).await?;

    if args.export_only {
        Exporter::new(&repo, &config.output_dir).export_all().await?;
        return Ok(());
    }

    let api_key = config
        .groq_api_key
        .clone()
        .or_else(|| std::env::var("GROQ_API_KEY").ok())
        .ok_or_else(|| {
            AppError::Config("groq_api_key missing from config and GROQ_API_KEY unset".to_string())
        })?;

    let platform_host = url::Url::parse(&config.platform_base_url)
        .map_err(|e| AppError::Config(format!("invalid platform_base_url: {e}")))?
        .host_str()
        .ok_or_else(|| AppError::Config("platform_base_url has no host".to_string()))?
        .to_string();

    let mut summary = RunSummary::default();

    // Phase 1: collect new articles per category
    let platform = PlatformClient::new(&config.platform_base_url);
    let filter = QualityFilter::new(&platform_host, config.collection.link_threshold);
    let collector = Collector::new(
        &repo,
        &platform,
        &platform,
        &filter,
        &config.platform_base_url,
        CollectorSettings {
            max_pages: config.collection.max_pages,
            cutoff: Utc::now() - chrono::Duration::days(config.collection.cutoff_days),
            page_delay: Duration::from_millis(config.collection.page_delay_ms),
            preview_chars: config.collection.preview_chars,
        },
    );

    let categories: Vec<_> = config
        .categories
        .iter()
        .filter(|c| args.categories.is_empty() || args.categories.contains(&c.name))
        .collect();
    if categories.is_empty() {
        return Err(AppError::Config("no matching categories configured".to_string()));
    }

    for category in &categories {
        let outcome = collector
            .collect_category(&category.name, &category.label)
            .await?;
        summary.collected += outcome.collected;
        summary.excluded += outcome.excluded;
        summary.skipped_known += outcome.skipped_known;
        summary.failed_details += outcome.failed_details;
        if outcome.stop == StopReason::Error {
            summary.category_errors += 1;
        }

        let backlog = collector
            .process_backlog(&category.name, config.collection.backlog_limit)
            .await?;
        summary.collected += backlog.processed.saturating_sub(backlog.excluded);
        summary.excluded += backlog.excluded;
        summary.failed_details += backlog.failed_details;
    }

    // Phase 2: score everything collected but not yet evaluated
    let oracle = GroqOracle::new(api_key);
    let mut limiter = RateLimiter::new(config.rate_limit.per_minute, config.rate_limit.per_day);
    limiter.seed_daily_usage(repo.evaluations_on(Utc::now()).await?);

    let batch_limit = args.limit.unwrap_or(config.evaluation.daily_limit);
    let mut queue = EvaluationQueue::new(
        &repo,
        &oracle,
        &mut limiter,
        EvalSettings {
            batch_limit,
            retry_budget: config.evaluation.retry_budget,
            summary_max_chars: config.evaluation.summary_max_chars,
        },
    );
    let stats = queue.run().await?;
    summary.evaluated = stats.evaluated;
    summary.eval_failed = stats.failed;
    summary.gave_up = stats.gave_up;
    summary.deferred = stats.deferred;

    // Phase 3: refresh the published rankings
    Exporter::new(&repo, &config.output_dir).export_all().await?;

    let report = format!(
        "collected {} (excluded {}, known {}, detail failures {}), evaluated {} (failed {}, gave up {}, deferred {}), category errors {}",
        summary.collected,
        summary.excluded,
        summary.skipped_known,
        summary.failed_details,
        summary.evaluated,
        summary.eval_failed,
        summary.gave_up,
        summary.deferred,
        summary.category_errors,
    );
    tracing::info!("Daily batch finished: {report}");
    repo.record_log("INFO", "daily_batch", &report).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Duration as ChronoDuration;
    use std::sync::Mutex;
    use tempfile::TempDir;

    use crate::collect::{ArticleDetail, DetailSource, ListingEntry, ListingSource};
    use crate::eval::{RawScore, ScoreRequest, ScoringOracle};

    struct FixtureListing {
        pages_by_label: Vec<(String, Vec<Vec<ListingEntry>>)>,
    }

    #[async_trait]
    impl ListingSource for FixtureListing {
        async fn list_page(&self, label: &str, page: u32) -> Result<Vec<ListingEntry>> {
            Ok(self
                .pages_by_label
                .iter()
                .find(|(l, _)| l == label)
                .and_then(|(_, pages)| pages.get(page as usize - 1))
                .cloned()
                .unwrap_or_default())
        }
    }

    struct FixtureDetails {
        spam_keys: Vec<String>,
    }

    #[async_trait]
    impl DetailSource for FixtureDetails {
        async fn fetch_detail(&self, source_key: &str, _url_name: &str) -> Result<ArticleDetail> {
            let body = if self.spam_keys.iter().any(|k| k == source_key) {
                (1..=5)
                    .map(|i| format!("https://note.com/user{i}/n/key{i}"))
                    .collect::<Vec<_>>()
                    .join("\n")
            } else {
                format!("A long read about {source_key} and the week in music.")
            };
            Ok(ArticleDetail {
                title: Some(format!("Detail {source_key}")),
                author: Some("Hana".to_string()),
                thumbnail: None,
                published_at: None,
                body_text: body,
            })
        }
    }

    struct CountingOracle {
        calls: Mutex<i64>,
    }

    #[async_trait]
    impl ScoringOracle for CountingOracle {
        async fn score(&self, _request: &ScoreRequest) -> Result<RawScore> {
            let mut calls = self.calls.lock().unwrap();
            *calls += 1;
            // distinct triples so the duplicate-pattern rescore stays quiet
            Ok(RawScore {
                article_id: None,
                quality_score: Some(20 + *calls),
                originality_score: Some(15),
                entertainment_score: Some(15),
                total_score: None,
                ai_summary: Some("A cheerful weekly column.".to_string()),
            })
        }

        async fn rescore(&self, request: &ScoreRequest) -> Result<RawScore> {
            self.score(request).await
        }
    }

    fn entry(key: &str, hours_ago: i64) -> ListingEntry {
        ListingEntry {
            source_key: key.to_string(),
            url_name: "hana".to_string(),
            title: format!("Entry {key}"),
            author: Some("Hana".to_string()),
            thumbnail: None,
            published_at: Utc::now() - ChronoDuration::hours(hours_ago),
        }
    }

    /// Whole pipeline over fixtures: collect two categories (one with a
    /// stale tail), evaluate, export.
    #[tokio::test]
    async fn full_batch_over_fixture_sources() {
        let dir = TempDir::new().unwrap();
        let db_path = dir.path().join("test.db");
        let repo = Repository::new(db_path.to_str().unwrap()).await.unwrap();

        let listing = FixtureListing {
            pages_by_label: vec![
                (
                    "K-POP".to_string(),
                    vec![vec![entry("n1", 1), entry("n2", 2), entry("n4", 48), entry("n5", 3)]],
                ),
                ("アイドル".to_string(), vec![vec![entry("m1", 5), entry("m2", 6)]]),
            ],
        };
        let details = FixtureDetails {
            spam_keys: vec!["m2".to_string()],
        };
        let filter = QualityFilter::new("note.com", 4);

        let collector = Collector::new(
            &repo,
            &listing,
            &details,
            &filter,
            "https://note.com",
            CollectorSettings {
                max_pages: 5,
                cutoff: Utc::now() - ChronoDuration::days(1),
                page_delay: Duration::ZERO,
                preview_chars: 200,
            },
        );

        let kpop = collector.collect_category("kpop", "K-POP").await.unwrap();
        assert_eq!(kpop.stop, StopReason::Cutoff);
        assert_eq!(kpop.collected, 2); // n4 is stale, n5 never reached

        let idol = collector.collect_category("idol", "アイドル").await.unwrap();
        assert_eq!(idol.collected, 1);
        assert_eq!(idol.excluded, 1); // m2 is link spam

        let oracle = CountingOracle {
            calls: Mutex::new(0),
        };
        let mut limiter = RateLimiter::new(30, 100);
        let mut queue = EvaluationQueue::new(
            &repo,
            &oracle,
            &mut limiter,
            EvalSettings {
                batch_limit: 100,
                retry_budget: 3,
                summary_max_chars: 300,
            },
        );
        let stats = queue.run().await.unwrap();
        assert_eq!(stats.evaluated, 3);
        assert_eq!(*oracle.calls.lock().unwrap(), 3);

        let out = dir.path().join("out");
        Exporter::new(&repo, &out).export_all().await.unwrap();

        let articles: serde_json::Value =
            serde_json::from_slice(&std::fs::read(out.join("articles.json")).unwrap()).unwrap();
        assert_eq!(articles["count"], 3);

        // idempotent re-run: everything already known, nothing re-evaluated
        let rerun = collector.collect_category("kpop", "K-POP").await.unwrap();
        assert_eq!(rerun.collected, 0);
        assert_eq!(rerun.skipped_known, 2);
        let stats = queue.run().await.unwrap();
        assert_eq!(stats.evaluated, 0);
    }
}
