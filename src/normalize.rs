//! Fragment-to-Review normalization, including date parsing.
//!
//! Each source phrases dates differently: G2 emits ISO dates in a meta
//! tag, Capterra renders loose text ("17 February 2025") and sometimes
//! relative phrasing ("posted 3 days ago"). Relative phrasing resolves
//! against the fragment's fetch time, not processing time. Fragments
//! that cannot produce a valid Review are dropped and counted, never
//! fatal to the run.

use crate::model::{RawReviewFragment, Review};
use crate::source::fields;
use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use regex::Regex;
use tracing::debug;

/// Maps raw fragments into canonical reviews.
pub struct Normalizer {
    relative_re: Regex,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Normalizer {
    pub fn new() -> Self {
        Self {
            // "posted 3 days ago", "2 weeks ago", "a month ago"
            relative_re: Regex::new(
                r"(?i)\b(?:(\d+)|an?)\s+(day|week|month|year)s?\s+ago\b",
            )
            .expect("relative date regex"),
        }
    }

    /// Normalize one fragment; `None` means dropped (caller counts it).
    pub fn normalize(
        &self,
        frag: &RawReviewFragment,
        product_name: &str,
        rating_scale: f32,
    ) -> Option<Review> {
        let review_date = self.fragment_date(frag)?;
        let title = frag.field(fields::TITLE)?.to_string();
        let body = frag.field(fields::BODY)?.to_string();
        let rating: f32 = frag.field(fields::RATING)?.trim().parse().ok()?;
        if title.is_empty() || body.is_empty() {
            return None;
        }

        let rating_normalized = if rating_scale > 0.0 {
            (rating / rating_scale * 5.0).clamp(1.0, 5.0)
        } else {
            return None;
        };

        Some(Review {
            source: frag.source,
            product_name: product_name.to_string(),
            reviewer_name: frag.field(fields::REVIEWER).map(str::to_string),
            rating,
            rating_normalized,
            title,
            body,
            review_date,
            review_url: frag.field(fields::REVIEW_URL).map(str::to_string),
        })
    }

    /// Parse the fragment's date field, if it has one and it is valid.
    ///
    /// Also used by the walker for the early-stop boundary check.
    pub fn fragment_date(&self, frag: &RawReviewFragment) -> Option<NaiveDate> {
        let text = frag.field(fields::DATE)?;
        let date = self.parse_date(text, frag.fetched_at);
        if date.is_none() {
            debug!(source = %frag.source, date = text, "unparseable review date");
        }
        date
    }

    fn parse_date(&self, text: &str, fetched_at: DateTime<Utc>) -> Option<NaiveDate> {
        let trimmed = text.trim();

        // ISO: 2025-11-02 (G2 datePublished)
        if let Ok(d) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
            return Some(d);
        }
        // 17 February 2025 (Capterra)
        if let Ok(d) = NaiveDate::parse_from_str(trimmed, "%d %B %Y") {
            return Some(d);
        }
        // February 17, 2025
        if let Ok(d) = NaiveDate::parse_from_str(trimmed, "%B %d, %Y") {
            return Some(d);
        }

        self.parse_relative(trimmed, fetched_at.date_naive())
    }

    /// Relative phrasing anchored to the fetch date.
    fn parse_relative(&self, text: &str, anchor: NaiveDate) -> Option<NaiveDate> {
        let lower = text.to_ascii_lowercase();
        if lower.contains("today") || lower.contains("just now") {
            return Some(anchor);
        }
        if lower.contains("yesterday") {
            return Some(anchor - Duration::days(1));
        }

        let caps = self.relative_re.captures(&lower)?;
        let n: i64 = caps
            .get(1)
            .map(|m| m.as_str().parse().ok())
            .unwrap_or(Some(1))?;
        match &caps[2] {
            "day" => Some(anchor - Duration::days(n)),
            "week" => Some(anchor - Duration::weeks(n)),
            "month" => shift_months(anchor, -(n as i32)),
            "year" => anchor.with_year(anchor.year() - n as i32),
            _ => None,
        }
    }
}

/// Calendar-aware month arithmetic, clamping the day to the target month.
fn shift_months(date: NaiveDate, months: i32) -> Option<NaiveDate> {
    let total = date.year() * 12 + date.month0() as i32 + months;
    let year = total.div_euclid(12);
    let month = total.rem_euclid(12) as u32 + 1;
    let mut day = date.day();
    loop {
        if let Some(d) = NaiveDate::from_ymd_opt(year, month, day) {
            return Some(d);
        }
        if day <= 28 {
            return None;
        }
        day -= 1;
    }
}

/// Normalize a whole walk's fragments, returning reviews plus the count
/// of fragments dropped for missing fields or unparseable dates.
pub fn normalize_all(
    normalizer: &Normalizer,
    fragments: &[RawReviewFragment],
    product_name: &str,
    rating_scale: f32,
) -> (Vec<Review>, u32) {
    let mut reviews = Vec::with_capacity(fragments.len());
    let mut dropped = 0u32;
    for frag in fragments {
        match normalizer.normalize(frag, product_name, rating_scale) {
            Some(review) => reviews.push(review),
            None => dropped += 1,
        }
    }
    (reviews, dropped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Source;
    use chrono::TimeZone;

    fn fragment(source: Source, date: &str) -> RawReviewFragment {
        let fetched_at = Utc.with_ymd_and_hms(2025, 12, 26, 12, 0, 0).unwrap();
        let mut frag = RawReviewFragment::new(source, fetched_at);
        frag.fields.insert(fields::TITLE.into(), "Solid".into());
        frag.fields.insert(fields::BODY.into(), "Works well.".into());
        frag.fields.insert(fields::RATING.into(), "4.5".into());
        frag.fields.insert(fields::DATE.into(), date.into());
        frag
    }

    #[test]
    fn iso_and_verbose_dates_parse() {
        let n = Normalizer::new();
        let d = |s: &str| n.fragment_date(&fragment(Source::G2, s)).unwrap();
        assert_eq!(d("2025-11-02"), NaiveDate::from_ymd_opt(2025, 11, 2).unwrap());
        assert_eq!(d("17 February 2025"), NaiveDate::from_ymd_opt(2025, 2, 17).unwrap());
        assert_eq!(d("February 17, 2025"), NaiveDate::from_ymd_opt(2025, 2, 17).unwrap());
    }

    #[test]
    fn relative_dates_anchor_to_fetch_time() {
        let n = Normalizer::new();
        let d = |s: &str| n.fragment_date(&fragment(Source::Capterra, s)).unwrap();
        // fetched_at is 2025-12-26
        assert_eq!(d("posted 3 days ago"), NaiveDate::from_ymd_opt(2025, 12, 23).unwrap());
        assert_eq!(d("2 weeks ago"), NaiveDate::from_ymd_opt(2025, 12, 12).unwrap());
        assert_eq!(d("a month ago"), NaiveDate::from_ymd_opt(2025, 11, 26).unwrap());
        assert_eq!(d("1 year ago"), NaiveDate::from_ymd_opt(2024, 12, 26).unwrap());
        assert_eq!(d("yesterday"), NaiveDate::from_ymd_opt(2025, 12, 25).unwrap());
        assert_eq!(d("today"), NaiveDate::from_ymd_opt(2025, 12, 26).unwrap());
    }

    #[test]
    fn month_arithmetic_clamps_day() {
        // 31 Mar minus one month lands on 28/29 Feb, not an invalid date.
        let d = shift_months(NaiveDate::from_ymd_opt(2025, 3, 31).unwrap(), -1).unwrap();
        assert_eq!(d, NaiveDate::from_ymd_opt(2025, 2, 28).unwrap());
    }

    #[test]
    fn invalid_date_rejects_record() {
        let n = Normalizer::new();
        let frag = fragment(Source::Capterra, "sometime last spring");
        assert!(n.normalize(&frag, "X", 5.0).is_none());
    }

    #[test]
    fn missing_required_field_rejects_record() {
        let n = Normalizer::new();
        let mut frag = fragment(Source::G2, "2025-11-02");
        frag.fields.remove(fields::BODY);
        assert!(n.normalize(&frag, "X", 5.0).is_none());
    }

    #[test]
    fn one_bad_fragment_in_five_drops_exactly_one() {
        let n = Normalizer::new();
        let mut frags: Vec<_> = (1..=4)
            .map(|day| fragment(Source::G2, &format!("2025-11-{day:02}")))
            .collect();
        frags.push(fragment(Source::G2, "not a date"));

        let (reviews, dropped) = normalize_all(&n, &frags, "X", 5.0);
        assert_eq!(reviews.len(), 4);
        assert_eq!(dropped, 1);
    }

    #[test]
    fn rating_scale_projection() {
        let n = Normalizer::new();
        let mut frag = fragment(Source::G2, "2025-11-02");
        frag.fields.insert(fields::RATING.into(), "8".into());
        let review = n.normalize(&frag, "X", 10.0).unwrap();
        assert_eq!(review.rating, 8.0);
        assert_eq!(review.rating_normalized, 4.0);
    }

    #[test]
    fn optional_fields_stay_optional() {
        let n = Normalizer::new();
        let frag = fragment(Source::G2, "2025-11-02");
        let review = n.normalize(&frag, "Visual Studio Code", 5.0).unwrap();
        assert_eq!(review.reviewer_name, None);
        assert_eq!(review.review_url, None);
        assert_eq!(review.product_name, "Visual Studio Code");
    }
}
