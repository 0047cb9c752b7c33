//! Product resolution: free-text query to a single candidate, or a
//! candidate list for upstream disambiguation.

use crate::error::AcquireError;
use crate::model::ProductCandidate;
use crate::source::SourceAdapter;
use tracing::debug;

/// Outcome of resolving a product query.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// Exactly one candidate matched the query name exactly
    /// (case-insensitive, whitespace-normalized).
    Resolved(ProductCandidate),
    /// Several plausible candidates; the caller must choose.
    Ambiguous(Vec<ProductCandidate>),
}

/// Resolve a query through the adapter's search.
pub async fn resolve(
    adapter: &mut dyn SourceAdapter,
    query: &str,
) -> Result<Resolution, AcquireError> {
    let candidates = adapter.search(query).await?;
    if candidates.is_empty() {
        return Err(AcquireError::NoMatch {
            platform: adapter.source(),
            query: query.to_string(),
        });
    }

    let normalized_query = normalize_name(query);
    if let Some(exact) = candidates
        .iter()
        .find(|c| normalize_name(&c.display_name) == normalized_query)
    {
        debug!(name = %exact.display_name, "exact match resolved automatically");
        return Ok(Resolution::Resolved(exact.clone()));
    }

    debug!(count = candidates.len(), "no exact match, surfacing candidates");
    Ok(Resolution::Ambiguous(candidates))
}

/// Collapse whitespace and case for exact-match comparison.
fn normalize_name(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
