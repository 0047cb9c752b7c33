// Copyright 2026 Revharvest Contributors
// SPDX-License-Identifier: Apache-2.0

//! Acquisition orchestration: resolve → walk → normalize → filter → sort.

use crate::challenge::{ChallengeDetector, OperatorPrompt};
use crate::daterange::DateRange;
use crate::error::AcquireError;
use crate::model::{AcquisitionResult, ProductCandidate, RawReviewFragment, Review};
use crate::normalize::{normalize_all, Normalizer};
use crate::resolve::{resolve, Resolution};
use crate::source::SourceAdapter;
use crate::walker::{PageWalker, Walk, WalkError, WalkerConfig};
use tokio::sync::watch;
use tracing::info;

/// Engine-level configuration; walker knobs plus nothing else yet.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    pub walker: WalkerConfig,
}

/// Orchestrates one acquisition run over an injected adapter.
///
/// The engine owns no browser state itself; the session lives under the
/// adapter's fetcher and is released by the caller on every exit path.
pub struct AcquisitionEngine {
    config: EngineConfig,
    detector: ChallengeDetector,
    normalizer: Normalizer,
    prompt: Box<dyn OperatorPrompt>,
    cancel: watch::Receiver<bool>,
}

impl AcquisitionEngine {
    pub fn new(
        config: EngineConfig,
        prompt: Box<dyn OperatorPrompt>,
        cancel: watch::Receiver<bool>,
    ) -> Self {
        Self {
            config,
            detector: ChallengeDetector::new(),
            normalizer: Normalizer::new(),
            prompt,
            cancel,
        }
    }

    /// Disambiguation entry point: surface all candidates for a query.
    pub async fn resolve_candidates(
        &mut self,
        adapter: &mut dyn SourceAdapter,
        query: &str,
    ) -> Result<Vec<ProductCandidate>, AcquireError> {
        match resolve(adapter, query).await? {
            Resolution::Resolved(c) => Ok(vec![c]),
            Resolution::Ambiguous(candidates) => Ok(candidates),
        }
    }

    /// Acquire all reviews for a product within a date range.
    ///
    /// When `resolved` is given (a prior disambiguation choice), search
    /// is skipped. Otherwise an inexact query fails with `Ambiguous`
    /// carrying the candidate list.
    pub async fn acquire(
        &mut self,
        adapter: &mut dyn SourceAdapter,
        query: &str,
        range: &DateRange,
        resolved: Option<ProductCandidate>,
    ) -> Result<AcquisitionResult, AcquireError> {
        let candidate = match resolved {
            Some(c) => c,
            None => match resolve(adapter, query).await? {
                Resolution::Resolved(c) => c,
                Resolution::Ambiguous(candidates) => {
                    return Err(AcquireError::Ambiguous {
                        platform: adapter.source(),
                        query: query.to_string(),
                        candidates,
                    })
                }
            },
        };

        info!(
            source = %adapter.source(),
            product = %candidate.display_name,
            %range,
            "starting acquisition"
        );

        adapter.open_listing(&candidate).await?;

        let mut walker = PageWalker::new(
            self.config.walker.clone(),
            self.detector,
            self.prompt.as_mut(),
            self.cancel.clone(),
        );

        let scale = adapter.rating_scale();
        let walk = match walker.walk(adapter, &self.normalizer, range).await {
            Ok(walk) => walk,
            Err(e) => {
                return Err(self.walk_failure(e, &candidate.display_name, scale, range));
            }
        };

        let Walk {
            fragments,
            pages_fetched,
            status,
        } = walk;
        let (reviews, dropped) =
            self.finish(&fragments, &candidate.display_name, scale, range);

        info!(
            pages_fetched,
            collected = reviews.len(),
            dropped,
            ?status,
            "acquisition finished"
        );

        Ok(AcquisitionResult {
            product_name: candidate.display_name,
            reviews,
            status,
            pages_fetched,
            dropped,
        })
    }

    /// Normalize, filter to the range, and order newest-first with
    /// listing-order tie-break (stable sort over listing order).
    fn finish(
        &self,
        fragments: &[RawReviewFragment],
        product_name: &str,
        rating_scale: f32,
        range: &DateRange,
    ) -> (Vec<Review>, u32) {
        let (all, dropped) = normalize_all(&self.normalizer, fragments, product_name, rating_scale);
        let mut reviews: Vec<Review> = all
            .into_iter()
            .filter(|r| range.contains(r.review_date))
            .collect();
        reviews.sort_by(|a, b| b.review_date.cmp(&a.review_date));
        (reviews, dropped)
    }

    /// Attach normalized partial results to a terminal walk failure so
    /// the caller sees what was accomplished before the abort.
    fn walk_failure(
        &self,
        e: WalkError,
        product_name: &str,
        rating_scale: f32,
        range: &DateRange,
    ) -> AcquireError {
        match e {
            WalkError::UnresolvedChallenge {
                kinds,
                fragments,
                pages_fetched,
            } => {
                let (partial, _) = self.finish(&fragments, product_name, rating_scale, range);
                AcquireError::UnresolvedChallenge {
                    kinds,
                    pages_fetched,
                    partial,
                }
            }
            WalkError::RetriesExhausted {
                cause,
                fragments,
                pages_fetched,
            } => {
                let (partial, _) = self.finish(&fragments, product_name, rating_scale, range);
                AcquireError::PartialResult {
                    cause,
                    pages_fetched,
                    partial,
                }
            }
            WalkError::Cancelled {
                fragments,
                pages_fetched,
            } => {
                let (partial, _) = self.finish(&fragments, product_name, rating_scale, range);
                AcquireError::Cancelled {
                    pages_fetched,
                    partial,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::challenge::{ChallengeKind, OperatorPrompt};
    use crate::model::Source;
    use crate::source::fields;
    use async_trait::async_trait;
    use chrono::Utc;

    struct NopPrompt;

    #[async_trait]
    impl OperatorPrompt for NopPrompt {
        async fn resolve_challenge(&mut self, _source: Source, _kinds: &[ChallengeKind]) {}
    }

    fn engine() -> (AcquisitionEngine, watch::Sender<bool>) {
        let (tx, rx) = watch::channel(false);
        (
            AcquisitionEngine::new(EngineConfig::default(), Box::new(NopPrompt), rx),
            tx,
        )
    }

    fn fragment(title: &str, date: &str) -> RawReviewFragment {
        let mut f = RawReviewFragment::new(Source::G2, Utc::now());
        f.fields.insert(fields::TITLE.into(), title.into());
        f.fields.insert(fields::BODY.into(), "body".into());
        f.fields.insert(fields::RATING.into(), "4.0".into());
        f.fields.insert(fields::DATE.into(), date.into());
        f
    }

    fn range(start: &str, end: &str) -> DateRange {
        DateRange::new(start.parse().unwrap(), end.parse().unwrap()).unwrap()
    }

    #[test]
    fn sort_is_descending_with_listing_order_tie_break() {
        let (e, _tx) = engine();
        let fragments = vec![
            fragment("a", "2025-11-01"),
            fragment("b", "2025-11-05"),
            fragment("c", "2025-11-05"),
            fragment("d", "2025-11-03"),
        ];
        let (reviews, dropped) = e.finish(&fragments, "X", 5.0, &range("2025-01-01", "2025-12-31"));
        assert_eq!(dropped, 0);
        let titles: Vec<&str> = reviews.iter().map(|r| r.title.as_str()).collect();
        // b and c share a date; b came first in the listing and stays first.
        assert_eq!(titles, vec!["b", "c", "d", "a"]);
    }

    #[test]
    fn out_of_range_reviews_are_filtered_not_counted_as_drops() {
        let (e, _tx) = engine();
        let fragments = vec![
            fragment("in", "2025-11-01"),
            fragment("too-old", "2024-01-01"),
            fragment("bad-date", "sometime"),
        ];
        let (reviews, dropped) = e.finish(&fragments, "X", 5.0, &range("2025-01-01", "2025-12-31"));
        assert_eq!(reviews.len(), 1);
        assert_eq!(reviews[0].title, "in");
        assert_eq!(dropped, 1);
    }

    #[test]
    fn walk_failure_attaches_normalized_partials() {
        let (e, _tx) = engine();
        let err = e.walk_failure(
            WalkError::RetriesExhausted {
                cause: "timeout".into(),
                fragments: vec![fragment("kept", "2025-11-01")],
                pages_fetched: 3,
            },
            "X",
            5.0,
            &range("2025-01-01", "2025-12-31"),
        );
        match err {
            AcquireError::PartialResult { partial, pages_fetched, .. } => {
                assert_eq!(partial.len(), 1);
                assert_eq!(pages_fetched, 3);
            }
            other => panic!("expected partial result, got {other}"),
        }
    }
}
