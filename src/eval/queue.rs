use std::collections::VecDeque;

use crate::db::Repository;
use crate::error::{AppError, Result};
use crate::models::{Article, NewEvaluation};
use crate::rate_limit::RateLimiter;

use super::oracle::{ScoreRequest, ScoringOracle};
use super::response::{validate, ValidatedScore};

/// Summary stored when an article exhausts its retry budget.
const GIVE_UP_SUMMARY: &str =
    "Scoring failed repeatedly; the article was retired without an AI evaluation.";

/// How many recent score triples to remember for duplicate detection.
const PATTERN_MEMORY: usize = 20;

#[derive(Debug, Clone)]
pub struct EvalSettings {
    /// Per-run cap on candidates, sized to the daily scoring ceiling.
    pub batch_limit: u32,
    /// Failures an article may accumulate before the permanent give-up.
    pub retry_budget: i64,
    pub summary_max_chars: usize,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct EvalStats {
    pub evaluated: u32,
    pub rescored: u32,
    pub failed: u32,
    pub gave_up: u32,
    pub deferred: u32,
}

/// Selects unevaluated articles and drives them through the scoring oracle
/// one at a time, under the shared rate limiter, tracking retry state
/// across runs.
pub struct EvaluationQueue<'a> {
    repo: &'a Repository,
    oracle: &'a dyn ScoringOracle,
    limiter: &'a mut RateLimiter,
    settings: EvalSettings,
    recent_patterns: VecDeque<(i64, i64, i64)>,
}

impl<'a> EvaluationQueue<'a> {
    pub fn new(
        repo: &'a Repository,
        oracle: &'a dyn ScoringOracle,
        limiter: &'a mut RateLimiter,
        settings: EvalSettings,
    ) -> Self {
        Self {
            repo,
            oracle,
            limiter,
            settings,
            recent_patterns: VecDeque::new(),
        }
    }

    pub async fn run(&mut self) -> Result<EvalStats> {
        let candidates = self.repo.select_candidates(self.settings.batch_limit).await?;
        let mut stats = EvalStats::default();

        if candidates.is_empty() {
            tracing::info!("No articles waiting for evaluation");
            return Ok(stats);
        }

        tracing::info!("Evaluating {} articles", candidates.len());

        for (i, article) in candidates.iter().enumerate() {
            match self.limiter.acquire().await {
                Ok(()) => {}
                Err(AppError::QuotaExhausted) => {
                    stats.deferred = (candidates.len() - i) as u32;
                    tracing::warn!(
                        "Daily scoring quota exhausted, deferring {} articles to the next run",
                        stats.deferred
                    );
                    break;
                }
                Err(e) => return Err(e),
            }

            let request = score_request(article);
            let scored = match self.oracle.score(&request).await {
                Ok(raw) => {
                    // Models occasionally echo the wrong id back; the score
                    // is still for the article we sent.
                    if let Some(returned) = raw.article_id.as_deref() {
                        if returned != article.id {
                            tracing::warn!(
                                "Oracle answered with article_id {returned}, expected {}",
                                article.id
                            );
                        }
                    }
                    validate(&raw, self.settings.summary_max_chars)
                }
                Err(e) => Err(e),
            };

            match scored {
                Ok(valid) => self.persist_success(article, &request, valid, &mut stats).await?,
                Err(e) => {
                    tracing::warn!("Evaluation of {} failed: {e}", article.id);
                    self.persist_failure(article, &e, &mut stats).await?;
                }
            }
        }

        tracing::info!(
            "Evaluation pass done: {} evaluated ({} rescored), {} failed, {} gave up, {} deferred",
            stats.evaluated,
            stats.rescored,
            stats.failed,
            stats.gave_up,
            stats.deferred,
        );

        Ok(stats)
    }

    async fn persist_success(
        &mut self,
        article: &Article,
        request: &ScoreRequest,
        valid: ValidatedScore,
        stats: &mut EvalStats,
    ) -> Result<()> {
        let pattern = (
            valid.quality_score,
            valid.originality_score,
            valid.entertainment_score,
        );
        let duplicate = self.note_pattern(pattern);

        let first_id = self
            .repo
            .insert_evaluation(NewEvaluation {
                article_id: article.id.clone(),
                quality_score: valid.quality_score,
                originality_score: valid.originality_score,
                entertainment_score: valid.entertainment_score,
                total_score: valid.total_score,
                ai_summary: valid.ai_summary,
                is_retry_evaluation: false,
                original_evaluation_id: None,
                retry_reason: None,
            })
            .await?;

        if duplicate {
            // The oracle has settled into a rut; ask for an independent
            // second opinion and let it supersede the first row.
            tracing::info!(
                "Duplicate score pattern {}/{}/{} for {}, re-scoring",
                pattern.0,
                pattern.1,
                pattern.2,
                article.id
            );
            self.rescore_duplicate(article, request, first_id, pattern, stats)
                .await?;
        }

        self.repo.mark_evaluated(&article.id).await?;
        stats.evaluated += 1;
        Ok(())
    }

    async fn rescore_duplicate(
        &mut self,
        article: &Article,
        request: &ScoreRequest,
        first_id: i64,
        pattern: (i64, i64, i64),
        stats: &mut EvalStats,
    ) -> Result<()> {
        // The rescore is a full oracle call and pays for its own slot. A
        // spent quota just keeps the first evaluation.
        match self.limiter.acquire().await {
            Ok(()) => {}
            Err(AppError::QuotaExhausted) => {
                tracing::warn!("Quota exhausted before rescore of {}, keeping first result", article.id);
                return Ok(());
            }
            Err(e) => return Err(e),
        }

        let rescored = match self.oracle.rescore(request).await {
            Ok(raw) => validate(&raw, self.settings.summary_max_chars),
            Err(e) => Err(e),
        };

        match rescored {
            Ok(valid) => {
                self.note_pattern((
                    valid.quality_score,
                    valid.originality_score,
                    valid.entertainment_score,
                ));
                self.repo
                    .insert_evaluation(NewEvaluation {
                        article_id: article.id.clone(),
                        quality_score: valid.quality_score,
                        originality_score: valid.originality_score,
                        entertainment_score: valid.entertainment_score,
                        total_score: valid.total_score,
                        ai_summary: valid.ai_summary,
                        is_retry_evaluation: true,
                        original_evaluation_id: Some(first_id),
                        retry_reason: Some(format!(
                            "duplicate score pattern {}/{}/{}",
                            pattern.0, pattern.1, pattern.2
                        )),
                    })
                    .await?;
                stats.rescored += 1;
            }
            Err(e) => {
                tracing::warn!("Rescore of {} failed, keeping first result: {e}", article.id);
            }
        }

        Ok(())
    }

    async fn persist_failure(
        &mut self,
        article: &Article,
        error: &AppError,
        stats: &mut EvalStats,
    ) -> Result<()> {
        let attempts = self.repo.increment_retry(&article.id).await?;
        stats.failed += 1;

        if attempts < self.settings.retry_budget {
            tracing::info!(
                "Article {} failed evaluation (attempt {attempts}/{}), will retry next run",
                article.id,
                self.settings.retry_budget
            );
            return Ok(());
        }

        // Permanent give-up: a synthetic floor evaluation stops the article
        // from being re-selected and eating the daily budget forever.
        let prior = self.repo.latest_evaluation(&article.id).await?.map(|e| e.id);
        self.repo
            .insert_evaluation(NewEvaluation {
                article_id: article.id.clone(),
                quality_score: 0,
                originality_score: 0,
                entertainment_score: 0,
                total_score: 0,
                ai_summary: GIVE_UP_SUMMARY.to_string(),
                is_retry_evaluation: true,
                original_evaluation_id: prior,
                retry_reason: Some(format!(
                    "retry budget exhausted after {attempts} attempts: {error}"
                )),
            })
            .await?;
        self.repo.mark_evaluated(&article.id).await?;
        stats.gave_up += 1;

        tracing::warn!("Giving up on {} after {attempts} failed evaluations", article.id);
        Ok(())
    }

    /// Remember a score triple; true when it repeats one already in the
    /// memory window (trigger for the second-opinion rescore).
    fn note_pattern(&mut self, pattern: (i64, i64, i64)) -> bool {
        let duplicate = self.recent_patterns.contains(&pattern);
        self.recent_patterns.push_back(pattern);
        if self.recent_patterns.len() > PATTERN_MEMORY {
            self.recent_patterns.pop_front();
        }
        duplicate
    }
}

fn score_request(article: &Article) -> ScoreRequest {
    ScoreRequest {
        article_id: article.id.clone(),
        title: article.title.clone(),
        author: article.author.clone(),
        category: article.category.clone(),
        preview: article.content_preview.clone().unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tempfile::TempDir;

    use crate::eval::oracle::RawScore;
    use crate::models::NewArticle;

    fn raw(quality: i64, originality: i64, entertainment: i64) -> RawScore {
        RawScore {
            article_id: None,
            quality_score: Some(quality),
            originality_score: Some(originality),
            entertainment_score: Some(entertainment),
            total_score: None,
            ai_summary: Some("A lively column about the week in idol news.".to_string()),
        }
    }

    /// Oracle that replays a script of responses, then falls back to a
    /// fixed score. Failures are modelled as poisoned entries.
    struct ScriptedOracle {
        responses: Mutex<VecDeque<std::result::Result<RawScore, String>>>,
        rescore_response: std::result::Result<RawScore, String>,
        score_calls: Mutex<u32>,
        rescore_calls: Mutex<u32>,
    }

    impl ScriptedOracle {
        fn new(responses: Vec<std::result::Result<RawScore, String>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                rescore_response: Ok(raw(25, 18, 12)),
                score_calls: Mutex::new(0),
                rescore_calls: Mutex::new(0),
            }
        }

        fn always_failing() -> Self {
            Self::new(vec![])
        }

        fn score_calls(&self) -> u32 {
            *self.score_calls.lock().unwrap()
        }

        fn rescore_calls(&self) -> u32 {
            *self.rescore_calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl ScoringOracle for ScriptedOracle {
        async fn score(&self, _request: &ScoreRequest) -> Result<RawScore> {
            *self.score_calls.lock().unwrap() += 1;
            match self.responses.lock().unwrap().pop_front() {
                Some(Ok(raw)) => Ok(raw),
                Some(Err(message)) => Err(AppError::Oracle(message)),
                None => Err(AppError::Oracle("oracle unavailable".to_string())),
            }
        }

        async fn rescore(&self, _request: &ScoreRequest) -> Result<RawScore> {
            *self.rescore_calls.lock().unwrap() += 1;
            match &self.rescore_response {
                Ok(raw) => Ok(raw.clone()),
                Err(message) => Err(AppError::Oracle(message.clone())),
            }
        }
    }

    async fn open_repo(dir: &TempDir) -> Repository {
        let path = dir.path().join("test.db");
        Repository::new(path.to_str().unwrap()).await.unwrap()
    }

    fn new_article(id: &str) -> NewArticle {
        NewArticle {
            id: id.to_string(),
            title: format!("Article {id}"),
            url: format!("https://note.com/writer/n/{id}"),
            thumbnail: None,
            published_at: chrono::Utc::now(),
            author: "writer".to_string(),
            content_preview: Some("A week of concerts.".to_string()),
            category: "kpop".to_string(),
            is_excluded: false,
            exclusion_reason: None,
        }
    }

    fn settings() -> EvalSettings {
        EvalSettings {
            batch_limit: 100,
            retry_budget: 3,
            summary_max_chars: 300,
        }
    }

    #[tokio::test]
    async fn successful_score_marks_article_evaluated() {
        let dir = TempDir::new().unwrap();
        let repo = open_repo(&dir).await;
        repo.upsert_article(new_article("a1")).await.unwrap();

        let oracle = ScriptedOracle::new(vec![Ok(raw(31, 22, 18))]);
        let mut limiter = RateLimiter::new(100, 1000);
        let mut queue = EvaluationQueue::new(&repo, &oracle, &mut limiter, settings());
        let stats = queue.run().await.unwrap();

        assert_eq!(stats.evaluated, 1);
        assert_eq!(stats.failed, 0);

        let article = repo.article("a1").await.unwrap().unwrap();
        assert!(article.is_evaluated);

        let evaluation = repo.latest_evaluation("a1").await.unwrap().unwrap();
        assert_eq!(evaluation.total_score, 71);
        assert!(!evaluation.is_retry_evaluation);
    }

    #[tokio::test]
    async fn out_of_range_scores_are_clamped_before_persisting() {
        let dir = TempDir::new().unwrap();
        let repo = open_repo(&dir).await;
        repo.upsert_article(new_article("a1")).await.unwrap();

        let oracle = ScriptedOracle::new(vec![Ok(raw(55, 10, 10))]);
        let mut limiter = RateLimiter::new(100, 1000);
        let mut queue = EvaluationQueue::new(&repo, &oracle, &mut limiter, settings());
        queue.run().await.unwrap();

        let evaluation = repo.latest_evaluation("a1").await.unwrap().unwrap();
        assert_eq!(evaluation.quality_score, 40);
        assert_eq!(evaluation.total_score, 60);
    }

    #[tokio::test]
    async fn third_failure_becomes_a_permanent_give_up() {
        let dir = TempDir::new().unwrap();
        let repo = open_repo(&dir).await;
        repo.upsert_article(new_article("a1")).await.unwrap();

        let oracle = ScriptedOracle::always_failing();
        let mut limiter = RateLimiter::new(100, 1000);
        let mut queue = EvaluationQueue::new(&repo, &oracle, &mut limiter, settings());

        let first = queue.run().await.unwrap();
        assert_eq!(first.failed, 1);
        assert_eq!(first.gave_up, 0);

        let second = queue.run().await.unwrap();
        assert_eq!(second.gave_up, 0);

        let third = queue.run().await.unwrap();
        assert_eq!(third.gave_up, 1);

        let article = repo.article("a1").await.unwrap().unwrap();
        assert!(article.is_evaluated);
        assert_eq!(article.evaluation_retry_count, 3);

        let evaluation = repo.latest_evaluation("a1").await.unwrap().unwrap();
        assert_eq!(evaluation.total_score, 0);
        assert!(evaluation.is_retry_evaluation);
        assert!(evaluation
            .retry_reason
            .as_deref()
            .unwrap()
            .contains("retry budget exhausted after 3 attempts"));

        // retired for good: nothing left to select
        assert!(repo.select_candidates(10).await.unwrap().is_empty());
        let fourth = queue.run().await.unwrap();
        assert_eq!(fourth, EvalStats::default());
    }

    #[tokio::test]
    async fn quota_exhaustion_defers_without_burning_retries() {
        let dir = TempDir::new().unwrap();
        let repo = open_repo(&dir).await;
        repo.upsert_article(new_article("a1")).await.unwrap();
        repo.upsert_article(new_article("a2")).await.unwrap();

        let oracle = ScriptedOracle::new(vec![Ok(raw(31, 22, 18)), Ok(raw(28, 20, 15))]);
        let mut limiter = RateLimiter::new(100, 1);
        let mut queue = EvaluationQueue::new(&repo, &oracle, &mut limiter, settings());
        let stats = queue.run().await.unwrap();

        assert_eq!(stats.evaluated, 1);
        assert_eq!(stats.deferred, 1);

        // the deferred article is untouched, not failed
        let deferred = repo.article("a2").await.unwrap().unwrap();
        assert!(!deferred.is_evaluated);
        assert_eq!(deferred.evaluation_retry_count, 0);
    }

    #[tokio::test]
    async fn duplicate_score_pattern_triggers_a_linked_rescore() {
        let dir = TempDir::new().unwrap();
        let repo = open_repo(&dir).await;
        repo.upsert_article(new_article("a1")).await.unwrap();
        repo.upsert_article(new_article("a2")).await.unwrap();

        // identical triples back to back
        let oracle = ScriptedOracle::new(vec![Ok(raw(20, 15, 15)), Ok(raw(20, 15, 15))]);
        let mut limiter = RateLimiter::new(100, 1000);
        let mut queue = EvaluationQueue::new(&repo, &oracle, &mut limiter, settings());
        let stats = queue.run().await.unwrap();

        assert_eq!(stats.evaluated, 2);
        assert_eq!(stats.rescored, 1);
        assert_eq!(oracle.rescore_calls(), 1);

        // first article kept its single evaluation
        assert_eq!(repo.evaluations_for("a1").await.unwrap().len(), 1);

        // second article got a superseding retry evaluation
        let chain = repo.evaluations_for("a2").await.unwrap();
        assert_eq!(chain.len(), 2);
        let canonical = repo.latest_evaluation("a2").await.unwrap().unwrap();
        assert!(canonical.is_retry_evaluation);
        assert_eq!(canonical.original_evaluation_id, Some(chain[0].id));
        assert_eq!(
            canonical.retry_reason.as_deref(),
            Some("duplicate score pattern 20/15/15")
        );
        assert_eq!(canonical.total_score, 55);
    }

    #[tokio::test]
    async fn excluded_articles_never_reach_the_oracle() {
        let dir = TempDir::new().unwrap();
        let repo = open_repo(&dir).await;
        let mut excluded = new_article("a1");
        excluded.is_excluded = true;
        excluded.exclusion_reason = Some("link spam".to_string());
        repo.upsert_article(excluded).await.unwrap();

        let oracle = ScriptedOracle::new(vec![Ok(raw(31, 22, 18))]);
        let mut limiter = RateLimiter::new(100, 1000);
        let mut queue = EvaluationQueue::new(&repo, &oracle, &mut limiter, settings());
        let stats = queue.run().await.unwrap();

        assert_eq!(stats, EvalStats::default());
        assert_eq!(oracle.score_calls(), 0);
        assert!(repo.evaluations_for("a1").await.unwrap().is_empty());
    }
}
