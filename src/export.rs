//! JSON export of acquired reviews.
//!
//! The engine guarantees ordering and date filtering, so this stays a
//! dumb serializer. File naming follows the
//! `{source}-{product}-{start}-to-{end}.json` convention.

use crate::daterange::DateRange;
use crate::model::{Review, Source};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::info;

/// Build the conventional output path for a run.
pub fn output_path(dir: &Path, source: Source, product_name: &str, range: &DateRange) -> PathBuf {
    let safe_product = product_name.replace(' ', "_").replace('/', "-");
    dir.join(format!(
        "{source}-{safe_product}-{}-to-{}.json",
        range.start(),
        range.end()
    ))
}

/// Write reviews as pretty-printed JSON.
pub fn write_reviews(path: &Path, reviews: &[Review]) -> Result<()> {
    let json = serde_json::to_string_pretty(reviews).context("failed to serialize reviews")?;
    std::fs::write(path, json)
        .with_context(|| format!("failed to write {}", path.display()))?;
    info!(path = %path.display(), count = reviews.len(), "reviews exported");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn range() -> DateRange {
        DateRange::new(
            NaiveDate::from_ymd_opt(2025, 10, 20).unwrap(),
            NaiveDate::from_ymd_opt(2025, 12, 26).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn path_follows_naming_convention() {
        let p = output_path(Path::new("."), Source::G2, "Visual Studio Code", &range());
        assert_eq!(
            p.file_name().unwrap().to_str().unwrap(),
            "g2-Visual_Studio_Code-2025-10-20-to-2025-12-26.json"
        );
    }

    #[test]
    fn slashes_in_product_names_are_sanitized() {
        let p = output_path(Path::new("."), Source::Capterra, "CI/CD Tool", &range());
        assert_eq!(
            p.file_name().unwrap().to_str().unwrap(),
            "capterra-CI-CD_Tool-2025-10-20-to-2025-12-26.json"
        );
    }

    #[test]
    fn written_file_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let review = Review {
            source: Source::G2,
            product_name: "X".into(),
            reviewer_name: Some("Dana R.".into()),
            rating: 4.5,
            rating_normalized: 4.5,
            title: "Great".into(),
            body: "Works.".into(),
            review_date: NaiveDate::from_ymd_opt(2025, 11, 2).unwrap(),
            review_url: None,
        };
        let path = output_path(dir.path(), Source::G2, "X", &range());
        write_reviews(&path, &[review.clone()]).unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        let parsed: Vec<Review> = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed, vec![review]);
    }
}
