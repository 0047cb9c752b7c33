//! Paginated listing traversal with challenge checkpoints.
//!
//! Drives an adapter's `next_page` loop. Every batch is classified
//! before its extraction is trusted, because a challenge page can
//! masquerade as an empty listing. Stop conditions, checked per batch:
//! the adapter reports no more pages; the oldest date in the batch falls
//! before the requested range (listings are most-recent-first, so later
//! pages are provably out of range); or the page ceiling is reached.
//!
//! Transient fetch failures retry with jittered backoff; exhausting the
//! retries aborts with the accumulated fragments preserved. Cancellation
//! is honored at every page boundary and inside the challenge wait.

use crate::challenge::{join_kinds, ChallengeDetector, OperatorPrompt, PageState};
use crate::daterange::DateRange;
use crate::model::{RawReviewFragment, TraversalStatus};
use crate::normalize::Normalizer;
use crate::source::{PageBatch, SourceAdapter};
use rand::Rng;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Traversal tuning knobs.
#[derive(Debug, Clone)]
pub struct WalkerConfig {
    /// Hard ceiling on pages fetched, bounding worst-case runtime
    /// against malformed listings.
    pub max_pages: u32,
    /// Retries per page on transient fetch failure.
    pub max_retries: u32,
    /// Base backoff between retries; doubles per attempt.
    pub retry_backoff: Duration,
    /// How long a human gets to clear a challenge before the run fails.
    pub challenge_wait: Duration,
    /// Jittered politeness delay between pages, `None` to disable.
    pub page_delay_ms: Option<(u64, u64)>,
}

impl Default for WalkerConfig {
    fn default() -> Self {
        Self {
            max_pages: 100,
            max_retries: 2,
            retry_backoff: Duration::from_millis(750),
            challenge_wait: Duration::from_secs(180),
            page_delay_ms: Some((3_000, 5_000)),
        }
    }
}

/// A completed traversal: every fragment seen, in listing order.
#[derive(Debug)]
pub struct Walk {
    pub fragments: Vec<RawReviewFragment>,
    pub pages_fetched: u32,
    pub status: TraversalStatus,
}

/// A failed traversal; accumulated fragments are always preserved.
#[derive(Debug)]
pub enum WalkError {
    UnresolvedChallenge {
        kinds: String,
        fragments: Vec<RawReviewFragment>,
        pages_fetched: u32,
    },
    RetriesExhausted {
        cause: String,
        fragments: Vec<RawReviewFragment>,
        pages_fetched: u32,
    },
    Cancelled {
        fragments: Vec<RawReviewFragment>,
        pages_fetched: u32,
    },
}

/// Drives pagination for one resolved product.
pub struct PageWalker<'a> {
    config: WalkerConfig,
    detector: ChallengeDetector,
    prompt: &'a mut dyn OperatorPrompt,
    cancel: watch::Receiver<bool>,
}

impl<'a> PageWalker<'a> {
    pub fn new(
        config: WalkerConfig,
        detector: ChallengeDetector,
        prompt: &'a mut dyn OperatorPrompt,
        cancel: watch::Receiver<bool>,
    ) -> Self {
        Self {
            config,
            detector,
            prompt,
            cancel,
        }
    }

    /// Walk the listing until exhaustion, the date boundary, or a bound.
    pub async fn walk(
        &mut self,
        adapter: &mut dyn SourceAdapter,
        normalizer: &Normalizer,
        range: &DateRange,
    ) -> Result<Walk, WalkError> {
        let mut fragments: Vec<RawReviewFragment> = Vec::new();
        let mut pages_fetched = 0u32;

        loop {
            if *self.cancel.borrow() {
                return Err(WalkError::Cancelled {
                    fragments,
                    pages_fetched,
                });
            }
            if pages_fetched >= self.config.max_pages {
                warn!(max_pages = self.config.max_pages, "page ceiling reached");
                return Ok(Walk {
                    fragments,
                    pages_fetched,
                    status: TraversalStatus::PageLimit,
                });
            }

            let mut batch = match self.fetch_with_retry(adapter).await {
                Ok(batch) => batch,
                Err(FetchFailure::Cancelled) => {
                    return Err(WalkError::Cancelled {
                        fragments,
                        pages_fetched,
                    })
                }
                Err(FetchFailure::Exhausted(cause)) => {
                    return Err(WalkError::RetriesExhausted {
                        cause,
                        fragments,
                        pages_fetched,
                    })
                }
            };
            pages_fetched += 1;

            // Classify before trusting the extraction.
            match self.detector.classify(&batch.html) {
                PageState::Normal => {}
                PageState::Blocked => {
                    warn!("hard block page encountered, aborting walk");
                    return Err(WalkError::UnresolvedChallenge {
                        kinds: "blocked".into(),
                        fragments,
                        pages_fetched,
                    });
                }
                PageState::Challenge(kinds) => {
                    batch = match self.suspend_for_operator(adapter, &kinds).await {
                        Ok(batch) => batch,
                        Err(SuspendFailure::Cancelled) => {
                            return Err(WalkError::Cancelled {
                                fragments,
                                pages_fetched,
                            })
                        }
                        Err(SuspendFailure::Unresolved) => {
                            return Err(WalkError::UnresolvedChallenge {
                                kinds: join_kinds(&kinds),
                                fragments,
                                pages_fetched,
                            })
                        }
                    };
                }
            }

            let batch_oldest = batch
                .fragments
                .iter()
                .filter_map(|f| normalizer.fragment_date(f))
                .min();
            let count = batch.fragments.len();
            fragments.extend(batch.fragments);
            debug!(page = pages_fetched, count, "batch accumulated");

            if !batch.has_more {
                info!(pages_fetched, total = fragments.len(), "listing exhausted");
                return Ok(Walk {
                    fragments,
                    pages_fetched,
                    status: TraversalStatus::Completed,
                });
            }

            // Early stop: listing is most-recent-first, so once a batch
            // reaches past the range start, later pages are all older.
            // Over-trusts the site's default sort; see DESIGN.md.
            if let Some(oldest) = batch_oldest {
                if range.is_before_range(oldest) {
                    info!(
                        pages_fetched,
                        %oldest,
                        range_start = %range.start(),
                        "date boundary reached, stopping early"
                    );
                    return Ok(Walk {
                        fragments,
                        pages_fetched,
                        status: TraversalStatus::DateBoundary,
                    });
                }
            }

            if let Some((lo, hi)) = self.config.page_delay_ms {
                let delay = rand::thread_rng().gen_range(lo..=hi);
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_millis(delay)) => {}
                    _ = cancelled(&mut self.cancel) => {}
                }
            }
        }
    }

    /// Fetch the next page (or the first), retrying transient failures
    /// against the same page with doubling, jittered backoff.
    async fn fetch_with_retry(
        &mut self,
        adapter: &mut dyn SourceAdapter,
    ) -> Result<PageBatch, FetchFailure> {
        let mut attempt = 0u32;
        let mut result = adapter.next_page().await;
        loop {
            match result {
                Ok(batch) => return Ok(batch),
                Err(e) => {
                    if attempt >= self.config.max_retries {
                        return Err(FetchFailure::Exhausted(e.to_string()));
                    }
                    attempt += 1;
                    let backoff = self.config.retry_backoff * 2u32.pow(attempt - 1);
                    let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..250));
                    warn!(attempt, error = %e, "page fetch failed, retrying");
                    tokio::select! {
                        _ = tokio::time::sleep(backoff + jitter) => {}
                        _ = cancelled(&mut self.cancel) => return Err(FetchFailure::Cancelled),
                    }
                    if *self.cancel.borrow() {
                        return Err(FetchFailure::Cancelled);
                    }
                    // Retries must not advance the page counter.
                    result = adapter.reload_page().await;
                }
            }
        }
    }

    /// Suspend for manual challenge resolution, bounded by the
    /// configured wait, then re-fetch and re-classify the same page.
    async fn suspend_for_operator(
        &mut self,
        adapter: &mut dyn SourceAdapter,
        kinds: &[crate::challenge::ChallengeKind],
    ) -> Result<PageBatch, SuspendFailure> {
        info!(kinds = %join_kinds(kinds), "challenge detected, suspending for operator");

        let resolved = tokio::select! {
            r = tokio::time::timeout(self.config.challenge_wait, self.prompt.resolve_challenge(adapter.source(), kinds)) => r.is_ok(),
            _ = cancelled(&mut self.cancel) => return Err(SuspendFailure::Cancelled),
        };
        if !resolved {
            warn!(wait = ?self.config.challenge_wait, "operator wait elapsed");
            return Err(SuspendFailure::Unresolved);
        }

        let batch = adapter
            .reload_page()
            .await
            .map_err(|_| SuspendFailure::Unresolved)?;

        // Same markers persisting after the operator attempt means blocked.
        match self.detector.classify(&batch.html) {
            PageState::Normal => {
                info!("challenge cleared, resuming walk");
                Ok(batch)
            }
            PageState::Challenge(_) | PageState::Blocked => Err(SuspendFailure::Unresolved),
        }
    }
}

/// Resolves only when a true cancel signal arrives. A dropped sender
/// means no one can cancel anymore, not that cancellation happened.
async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    loop {
        if *cancel.borrow() {
            return;
        }
        if cancel.changed().await.is_err() {
            futures::future::pending::<()>().await;
        }
    }
}

enum FetchFailure {
    Exhausted(String),
    Cancelled,
}

enum SuspendFailure {
    Unresolved,
    Cancelled,
}
