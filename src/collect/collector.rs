use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::db::Repository;
use crate::error::Result;
use crate::models::{ArticleReference, NewArticle};
use crate::quality::{Classification, QualityFilter};

use super::source::{ArticleDetail, DetailSource, ListingEntry, ListingSource};

/// Why a category stopped paging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Hit an entry older than the recency cutoff; listings are
    /// reverse-chronological, so everything after it is stale too.
    Cutoff,
    /// Ran out of listing pages.
    Exhausted,
    /// Listing fetch failed; partial progress stays committed.
    Error,
}

#[derive(Debug)]
pub struct CategoryOutcome {
    pub category: String,
    pub stop: StopReason,
    pub collected: u32,
    pub excluded: u32,
    pub skipped_known: u32,
    pub failed_details: u32,
}

#[derive(Debug, Default)]
pub struct BacklogOutcome {
    pub processed: u32,
    pub excluded: u32,
    pub failed_details: u32,
}

#[derive(Debug, Clone)]
pub struct CollectorSettings {
    /// Hard cap on listing pages per category per run.
    pub max_pages: u32,
    /// Entries published before this instant stop the category.
    pub cutoff: DateTime<Utc>,
    /// Pause between listing page requests.
    pub page_delay: Duration,
    /// Length of the stored content preview, in characters.
    pub preview_chars: usize,
}

enum ProcessOutcome {
    Saved { excluded: bool },
    FetchFailed,
}

/// Walks the paginated listing per category, deduplicates against the
/// reference store, fetches details for new entries, filters spam and
/// persists articles.
pub struct Collector<'a> {
    repo: &'a Repository,
    listing: &'a dyn ListingSource,
    details: &'a dyn DetailSource,
    filter: &'a QualityFilter,
    base_url: String,
    settings: CollectorSettings,
}

impl<'a> Collector<'a> {
    pub fn new(
        repo: &'a Repository,
        listing: &'a dyn ListingSource,
        details: &'a dyn DetailSource,
        filter: &'a QualityFilter,
        base_url: &str,
        settings: CollectorSettings,
    ) -> Self {
        Self {
            repo,
            listing,
            details,
            filter,
            base_url: base_url.trim_end_matches('/').to_string(),
            settings,
        }
    }

    /// Collect one category. Database errors propagate; fetch errors are
    /// contained: a failed listing page aborts the category, a failed
    /// detail only skips its entry.
    pub async fn collect_category(&self, category: &str, label: &str) -> Result<CategoryOutcome> {
        let mut outcome = CategoryOutcome {
            category: category.to_string(),
            stop: StopReason::Exhausted,
            collected: 0,
            excluded: 0,
            skipped_known: 0,
            failed_details: 0,
        };

        tracing::info!("Collecting category {category} (label: {label})");

        'paging: for page in 1..=self.settings.max_pages {
            let entries = match self.listing.list_page(label, page).await {
                Ok(entries) => entries,
                Err(e) => {
                    tracing::warn!("Listing page {page} for {category} failed: {e}");
                    outcome.stop = StopReason::Error;
                    break 'paging;
                }
            };

            if entries.is_empty() {
                outcome.stop = StopReason::Exhausted;
                break 'paging;
            }

            for entry in entries {
                if self.repo.has_seen(&entry.source_key, &entry.url_name).await? {
                    outcome.skipped_known += 1;
                    continue;
                }

                if entry.published_at < self.settings.cutoff {
                    tracing::info!(
                        "Reached stale entry in {category} (published {}), stopping",
                        entry.published_at
                    );
                    outcome.stop = StopReason::Cutoff;
                    break 'paging;
                }

                let reference = self.reference_from_entry(&entry, category);
                self.repo.record(reference.clone()).await?;

                match self.process_reference(&reference).await? {
                    ProcessOutcome::Saved { excluded: true } => outcome.excluded += 1,
                    ProcessOutcome::Saved { excluded: false } => outcome.collected += 1,
                    ProcessOutcome::FetchFailed => outcome.failed_details += 1,
                }
            }

            tokio::time::sleep(self.settings.page_delay).await;
        }

        tracing::info!(
            "Category {category} stopped ({:?}): {} collected, {} excluded, {} known, {} failed",
            outcome.stop,
            outcome.collected,
            outcome.excluded,
            outcome.skipped_known,
            outcome.failed_details,
        );

        Ok(outcome)
    }

    /// Sweep references that earlier runs recorded but never finished,
    /// usually because their detail fetch failed.
    pub async fn process_backlog(&self, category: &str, limit: u32) -> Result<BacklogOutcome> {
        let mut outcome = BacklogOutcome::default();

        let pending = self.repo.unprocessed(category, limit).await?;
        if pending.is_empty() {
            return Ok(outcome);
        }

        tracing::info!("Processing {} backlog references for {category}", pending.len());

        for reference in &pending {
            match self.process_reference(reference).await? {
                ProcessOutcome::Saved { excluded: true } => {
                    outcome.excluded += 1;
                    outcome.processed += 1;
                }
                ProcessOutcome::Saved { excluded: false } => outcome.processed += 1,
                ProcessOutcome::FetchFailed => outcome.failed_details += 1,
            }
        }

        Ok(outcome)
    }

    /// Fetch detail, classify the body and persist the article. A fetch
    /// failure leaves the reference unprocessed so the next run retries it.
    async fn process_reference(&self, reference: &ArticleReference) -> Result<ProcessOutcome> {
        let detail = match self
            .details
            .fetch_detail(&reference.source_key, &reference.url_name)
            .await
        {
            Ok(detail) => detail,
            Err(e) => {
                tracing::warn!(
                    "Detail fetch for {}/{} failed, will retry next run: {e}",
                    reference.url_name,
                    reference.source_key
                );
                return Ok(ProcessOutcome::FetchFailed);
            }
        };

        let classification = self.filter.classify(&detail.body_text);
        let excluded = !classification.is_admissible();
        let exclusion_reason = match classification {
            Classification::Admissible => None,
            Classification::Excluded { reason } => {
                tracing::info!(
                    "Excluding {}/{}: {reason}",
                    reference.url_name,
                    reference.source_key
                );
                Some(reason)
            }
        };

        let article = self.article_from_detail(reference, detail, excluded, exclusion_reason);
        self.repo.upsert_article(article).await?;
        self.repo
            .mark_processed(&reference.source_key, &reference.url_name)
            .await?;

        Ok(ProcessOutcome::Saved { excluded })
    }

    fn reference_from_entry(&self, entry: &ListingEntry, category: &str) -> ArticleReference {
        ArticleReference {
            source_key: entry.source_key.clone(),
            url_name: entry.url_name.clone(),
            category: category.to_string(),
            title: Some(entry.title.clone()),
            author: entry.author.clone(),
            thumbnail: entry.thumbnail.clone(),
            published_at: Some(entry.published_at),
            collected_at: Utc::now(),
            is_processed: false,
        }
    }

    fn article_from_detail(
        &self,
        reference: &ArticleReference,
        detail: ArticleDetail,
        excluded: bool,
        exclusion_reason: Option<String>,
    ) -> NewArticle {
        let preview: String = detail
            .body_text
            .chars()
            .take(self.settings.preview_chars)
            .collect();

        NewArticle {
            id: reference.article_id(),
            title: detail
                .title
                .or_else(|| reference.title.clone())
                .unwrap_or_else(|| "Untitled".to_string()),
            url: reference.article_url(&self.base_url),
            thumbnail: detail.thumbnail.or_else(|| reference.thumbnail.clone()),
            published_at: detail
                .published_at
                .or(reference.published_at)
                .unwrap_or_else(Utc::now),
            author: detail
                .author
                .or_else(|| reference.author.clone())
                .unwrap_or_else(|| "Unknown".to_string()),
            content_preview: Some(preview),
            category: reference.category.clone(),
            is_excluded: excluded,
            exclusion_reason,
        }
    }
}
