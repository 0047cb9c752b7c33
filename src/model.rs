//! Canonical data model: sources, candidates, raw fragments, and the
//! normalized `Review` record.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// A supported review aggregator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    G2,
    Capterra,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::G2 => write!(f, "g2"),
            Source::Capterra => write!(f, "capterra"),
        }
    }
}

impl FromStr for Source {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "g2" => Ok(Source::G2),
            "capterra" => Ok(Source::Capterra),
            other => Err(format!("unknown source '{other}' (expected g2 or capterra)")),
        }
    }
}

/// A product identity returned by a source's search.
///
/// Discarded after resolution; only the `source_id` (an opaque per-site
/// identifier, e.g. a URL slug) and `url` feed the listing walk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductCandidate {
    /// Opaque per-site identifier (G2 product slug, Capterra software slug).
    pub source_id: String,
    /// Display name as shown in search results.
    pub display_name: String,
    /// Review listing URL for this product.
    pub url: String,
}

/// A source-specific field map extracted from one review entry.
///
/// Opaque to everything except the adapter that produced it and the
/// normalizer; never persisted. `fetched_at` anchors relative date
/// phrasing ("3 days ago") to the time the page was fetched.
#[derive(Debug, Clone)]
pub struct RawReviewFragment {
    pub source: Source,
    pub fields: HashMap<String, String>,
    pub fetched_at: DateTime<Utc>,
}

impl RawReviewFragment {
    pub fn new(source: Source, fetched_at: DateTime<Utc>) -> Self {
        Self {
            source,
            fields: HashMap::new(),
            fetched_at,
        }
    }

    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }
}

/// The canonical, source-independent review record.
///
/// `review_date` is always a valid calendar date; fragments that cannot
/// produce one are rejected during normalization, never zeroed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    pub source: Source,
    pub product_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reviewer_name: Option<String>,
    /// Rating on the source's own scale.
    pub rating: f32,
    /// Rating projected onto a 1–5 scale.
    pub rating_normalized: f32,
    pub title: String,
    pub body: String,
    pub review_date: NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub review_url: Option<String>,
}

/// How a listing traversal ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraversalStatus {
    /// The adapter reported no further pages.
    Completed,
    /// Remaining pages were provably older than the requested range.
    DateBoundary,
    /// The configured page ceiling was reached.
    PageLimit,
}

/// The final output of one acquisition run.
#[derive(Debug, Clone)]
pub struct AcquisitionResult {
    /// Display name of the product the reviews were acquired for.
    pub product_name: String,
    /// Reviews sorted by date descending, ties kept in listing order.
    pub reviews: Vec<Review>,
    pub status: TraversalStatus,
    /// Listing pages fetched during the walk.
    pub pages_fetched: u32,
    /// Fragments dropped because a required field or date failed to parse.
    pub dropped: u32,
}
