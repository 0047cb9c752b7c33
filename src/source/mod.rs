//! Per-source adapters behind one shared contract.
//!
//! Each site differs in markup, pagination affordance, and sort control;
//! the adapters encode those mechanics and nothing else. Selection is
//! explicit at construction time, with no runtime probing.

pub mod capterra;
pub mod g2;

use crate::error::AcquireError;
use crate::model::{ProductCandidate, RawReviewFragment, Source};
use crate::session::PageFetcher;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Fragment field keys shared between the adapters and the normalizer.
pub mod fields {
    pub const TITLE: &str = "title";
    pub const RATING: &str = "rating";
    pub const REVIEWER: &str = "reviewer_name";
    pub const DATE: &str = "date";
    pub const BODY: &str = "body";
    pub const REVIEW_URL: &str = "review_url";
}

/// One extracted listing page.
#[derive(Debug, Clone)]
pub struct PageBatch {
    /// Raw page HTML, kept so the walker can classify the page before
    /// trusting the extraction (a challenge page can masquerade as an
    /// empty listing).
    pub html: String,
    pub fragments: Vec<RawReviewFragment>,
    /// Whether the site's pagination affordance indicates further pages.
    pub has_more: bool,
    pub fetched_at: DateTime<Utc>,
}

/// Shared adapter contract over {search, resolve, walk}.
///
/// Pagination contract: `next_page` advances to the following page and
/// fetches it; `reload_page` re-fetches the current page without
/// advancing (used after challenge resolution and for retries).
#[async_trait]
pub trait SourceAdapter: Send {
    fn source(&self) -> Source;

    /// The site's native rating scale (both modeled sites use 5 stars,
    /// but the normalizer never assumes that).
    fn rating_scale(&self) -> f32 {
        5.0
    }

    /// Issue the site's product search. An empty result is a valid
    /// outcome, not a fault; the resolver maps it to `NoMatch`.
    async fn search(&mut self, query: &str) -> Result<Vec<ProductCandidate>, AcquireError>;

    /// Point the adapter at a resolved product's review listing, with
    /// the site's most-recent-first sort applied.
    async fn open_listing(&mut self, candidate: &ProductCandidate) -> Result<(), AcquireError>;

    async fn next_page(&mut self) -> Result<PageBatch, AcquireError>;

    async fn reload_page(&mut self) -> Result<PageBatch, AcquireError>;
}

/// Construct the adapter for a source over a fetcher.
pub fn adapter_for<'a>(
    source: Source,
    fetcher: &'a mut dyn PageFetcher,
) -> Box<dyn SourceAdapter + 'a> {
    match source {
        Source::G2 => Box::new(g2::G2Adapter::new(fetcher)),
        Source::Capterra => Box::new(capterra::CapterraAdapter::new(fetcher)),
    }
}

pub(crate) fn encode_query(query: &str) -> String {
    url::form_urlencoded::byte_serialize(query.as_bytes()).collect()
}

/// Concatenated text content of an element.
pub(crate) fn text_of(el: scraper::ElementRef<'_>) -> String {
    el.text().collect::<Vec<_>>().join(" ")
}

/// Collapse runs of whitespace, matching how the sites render text.
pub(crate) fn collapse_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
pub(crate) mod testfetch {
    use super::*;
    use std::collections::HashMap;

    /// Serves canned HTML per URL so the real adapters can be exercised
    /// without a browser. Unknown URLs get an empty document.
    pub struct FixtureFetcher {
        pages: HashMap<String, String>,
        current: Option<String>,
        pub fail_next: u32,
        pub fetch_count: u32,
    }

    impl FixtureFetcher {
        pub fn new() -> Self {
            Self {
                pages: HashMap::new(),
                current: None,
                fail_next: 0,
                fetch_count: 0,
            }
        }

        pub fn insert(&mut self, url: &str, html: &str) {
            self.pages.insert(url.to_string(), html.to_string());
        }
    }

    #[async_trait]
    impl PageFetcher for FixtureFetcher {
        async fn goto(&mut self, url: &str) -> Result<(), AcquireError> {
            self.fetch_count += 1;
            if self.fail_next > 0 {
                self.fail_next -= 1;
                return Err(AcquireError::Navigation {
                    url: url.to_string(),
                    cause: "fixture timeout".into(),
                });
            }
            self.current = Some(url.to_string());
            Ok(())
        }

        async fn content(&mut self) -> Result<String, AcquireError> {
            let html = self
                .current
                .as_ref()
                .and_then(|u| self.pages.get(u))
                .cloned()
                .unwrap_or_else(|| "<html><body></body></html>".to_string());
            Ok(html)
        }

        async fn current_url(&mut self) -> Result<String, AcquireError> {
            Ok(self.current.clone().unwrap_or_default())
        }
    }
}
