//! Crate-wide error taxonomy.
//!
//! Structural failures (no match, ambiguity, unresolved challenge) carry
//! enough context to act on: candidate lists, page counts, and any
//! reviews collected before the failure. Transient faults (a single
//! navigation hiccup, one unparsable record) never surface here; they are
//! retried or counted inside the walker and normalizer.

use crate::model::{ProductCandidate, Review, Source};
use chrono::NaiveDate;
use thiserror::Error;

/// Typed failure modes of the acquisition engine.
#[derive(Debug, Error)]
pub enum AcquireError {
    /// Search found nothing. Recoverable; surfaced to the caller.
    ///
    /// The field is `platform`, not `source`: thiserror reserves that
    /// name for the error-chain source.
    #[error("no products matched \"{query}\" on {platform}")]
    NoMatch { platform: Source, query: String },

    /// Search found several plausible products and no resolved candidate
    /// was supplied. The caller must re-invoke with a chosen candidate.
    #[error("{} candidates matched \"{query}\" on {platform}; disambiguation required", candidates.len())]
    Ambiguous {
        platform: Source,
        query: String,
        candidates: Vec<ProductCandidate>,
    },

    /// A navigation failed after the session-level wait. Retried by the
    /// walker, never by the session itself.
    #[error("navigation to {url} failed: {cause}")]
    Navigation { url: String, cause: String },

    /// An anti-bot challenge persisted past the operator-resolution bound,
    /// or the page was a hard block. Fatal for the run; anything already
    /// collected is preserved.
    #[error("unresolved challenge ({kinds}) after {pages_fetched} pages; {} reviews collected before abort", partial.len())]
    UnresolvedChallenge {
        /// Comma-joined challenge marker names that were detected.
        kinds: String,
        pages_fetched: u32,
        partial: Vec<Review>,
    },

    /// Page-fetch retries were exhausted mid-walk. The data fetched so far
    /// is returned, not discarded.
    #[error("retries exhausted after {pages_fetched} pages ({cause}); {} reviews preserved", partial.len())]
    PartialResult {
        cause: String,
        pages_fetched: u32,
        partial: Vec<Review>,
    },

    /// The caller's cancellation signal fired.
    #[error("cancelled after {pages_fetched} pages; {} reviews preserved", partial.len())]
    Cancelled {
        pages_fetched: u32,
        partial: Vec<Review>,
    },

    /// Date range construction with start after end.
    #[error("invalid date range: start {start} is after end {end}")]
    InvalidDateRange { start: NaiveDate, end: NaiveDate },

    /// Browser launch/teardown or another session-level fault.
    #[error("browser session error: {0}")]
    Session(#[from] anyhow::Error),
}

impl AcquireError {
    /// Reviews collected before a terminal failure, if any.
    pub fn partial_reviews(&self) -> &[Review] {
        match self {
            AcquireError::UnresolvedChallenge { partial, .. }
            | AcquireError::PartialResult { partial, .. }
            | AcquireError::Cancelled { partial, .. } => partial,
            _ => &[],
        }
    }
}
