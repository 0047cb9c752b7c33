//! Capterra adapter: search, listing navigation, and review extraction.
//!
//! Search result cards are `a.entry` links into `/software/{id}/{slug}`
//! pages, with the product name on the thumbnail's alt text. The review
//! listing paginates by page number with `sort=most_recent`; a page with
//! zero review cards ends pagination. Dates here are loose text
//! ("17 February 2025" or relative phrasing), left for the normalizer.

use super::{collapse_ws, encode_query, fields, text_of, PageBatch, SourceAdapter};
use crate::error::AcquireError;
use crate::model::{ProductCandidate, RawReviewFragment, Source};
use crate::session::PageFetcher;
use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use scraper::{Html, Selector};
use std::collections::HashSet;
use tracing::debug;

const BASE_URL: &str = "https://www.capterra.in";
const MAX_CANDIDATES: usize = 5;

pub struct CapterraAdapter<'a> {
    fetcher: &'a mut dyn PageFetcher,
    listing_url: Option<String>,
    page: u32,
}

impl<'a> CapterraAdapter<'a> {
    pub fn new(fetcher: &'a mut dyn PageFetcher) -> Self {
        Self {
            fetcher,
            listing_url: None,
            page: 0,
        }
    }

    async fn fetch_current(&mut self) -> Result<PageBatch, AcquireError> {
        let base = self
            .listing_url
            .clone()
            .ok_or_else(|| AcquireError::Session(anyhow!("listing not opened")))?;
        let url = format!("{base}?page={}&sort=most_recent", self.page);
        self.fetcher.goto(&url).await?;
        let html = self.fetcher.content().await?;
        let fetched_at = Utc::now();

        let fragments = extract_fragments(&html, &url, fetched_at);
        debug!(page = self.page, count = fragments.len(), "capterra page extracted");
        let has_more = !fragments.is_empty();
        Ok(PageBatch {
            html,
            fragments,
            has_more,
            fetched_at,
        })
    }
}

#[async_trait]
impl SourceAdapter for CapterraAdapter<'_> {
    fn source(&self) -> Source {
        Source::Capterra
    }

    async fn search(&mut self, query: &str) -> Result<Vec<ProductCandidate>, AcquireError> {
        let url = format!("{BASE_URL}/search/product?q={}", encode_query(query));
        self.fetcher.goto(&url).await?;
        let html = self.fetcher.content().await?;
        Ok(extract_candidates(&html))
    }

    async fn open_listing(&mut self, candidate: &ProductCandidate) -> Result<(), AcquireError> {
        self.listing_url = Some(candidate.url.trim_end_matches('/').to_string());
        self.page = 0;
        Ok(())
    }

    async fn next_page(&mut self) -> Result<PageBatch, AcquireError> {
        self.page += 1;
        self.fetch_current().await
    }

    async fn reload_page(&mut self) -> Result<PageBatch, AcquireError> {
        self.fetch_current().await
    }
}

/// Pull product candidates out of a Capterra search results page.
fn extract_candidates(html: &str) -> Vec<ProductCandidate> {
    let doc = Html::parse_document(html);
    let link_sel = Selector::parse(r#"a.entry[data-evcmp="product-card_search"]"#).unwrap();
    let thumb_sel = Selector::parse("img.search-results__thumbnail__img").unwrap();

    let mut candidates = Vec::new();
    let mut seen = HashSet::new();

    for link in doc.select(&link_sel) {
        if candidates.len() >= MAX_CANDIDATES {
            break;
        }
        let Some(name) = link
            .select(&thumb_sel)
            .next()
            .and_then(|img| img.value().attr("alt"))
            .map(str::trim)
            .filter(|n| !n.is_empty())
        else {
            continue;
        };
        let Some(href) = link.value().attr("href") else {
            continue;
        };

        let full_url = if href.starts_with("http") {
            href.to_string()
        } else {
            format!("{BASE_URL}{href}")
        };

        if seen.insert(name.to_string()) {
            candidates.push(ProductCandidate {
                source_id: slug_from_href(href),
                display_name: name.to_string(),
                url: full_url,
            });
        }
    }

    candidates
}

/// Product slug from `/software/{id}/{slug}`; falls back to the href.
fn slug_from_href(href: &str) -> String {
    let parts: Vec<&str> = href.split('/').collect();
    if let Some(idx) = parts.iter().position(|p| *p == "software") {
        if let Some(slug) = parts.get(idx + 2) {
            return slug.to_string();
        }
        if let Some(id) = parts.get(idx + 1) {
            return id.to_string();
        }
    }
    href.to_string()
}

/// Extract review fragments from a Capterra listing page.
fn extract_fragments(html: &str, page_url: &str, fetched_at: DateTime<Utc>) -> Vec<RawReviewFragment> {
    let doc = Html::parse_document(html);
    let card_sel = Selector::parse("div.review-card").unwrap();
    let title_sel = Selector::parse("h3").unwrap();
    let rating_sel = Selector::parse(".star-rating-component span.ms-1").unwrap();
    let reviewer_sel = Selector::parse("div.fw-600").unwrap();
    let date_sel = Selector::parse("div.d-lg-flex div.fs-5.text-neutral-90").unwrap();
    let text_sel = Selector::parse("div.fs-4.lh-2.text-neutral-99").unwrap();
    let pros_sel = Selector::parse("div.my-3.my-lg-4").unwrap();
    let cons_sel = Selector::parse("div.mb-3.mb-lg-4").unwrap();
    let header_sel = Selector::parse("div.fw-600").unwrap();

    let mut fragments = Vec::new();

    for card in doc.select(&card_sel) {
        let mut frag = RawReviewFragment::new(Source::Capterra, fetched_at);

        if let Some(title) = card.select(&title_sel).next() {
            let t = collapse_ws(&text_of(title));
            frag.fields
                .insert(fields::TITLE.into(), t.trim_matches('"').to_string());
        }
        if let Some(rating) = card.select(&rating_sel).next() {
            frag.fields
                .insert(fields::RATING.into(), collapse_ws(&text_of(rating)));
        }
        if let Some(name) = card.select(&reviewer_sel).next() {
            frag.fields
                .insert(fields::REVIEWER.into(), collapse_ws(&text_of(name)));
        }
        if let Some(date) = card.select(&date_sel).next() {
            frag.fields
                .insert(fields::DATE.into(), collapse_ws(&text_of(date)));
        }

        let mut parts = Vec::new();
        if let Some(text) = card.select(&text_sel).next() {
            let t = collapse_ws(&text_of(text));
            if !t.is_empty() {
                parts.push(t);
            }
        }
        for (container_sel, label) in [(&pros_sel, "Pros:"), (&cons_sel, "Cons:")] {
            for container in card.select(container_sel) {
                let header_matches = container
                    .select(&header_sel)
                    .next()
                    .map(|h| text_of(h).contains(label))
                    .unwrap_or(false);
                if !header_matches {
                    continue;
                }
                if let Some(content) = container.select(&text_sel).next() {
                    let t = collapse_ws(&text_of(content));
                    if !t.is_empty() {
                        parts.push(format!("{label} {t}"));
                    }
                }
                break;
            }
        }
        if !parts.is_empty() {
            frag.fields.insert(fields::BODY.into(), parts.join("\n\n"));
        }

        frag.fields
            .insert(fields::REVIEW_URL.into(), page_url.to_string());
        fragments.push(frag);
    }

    fragments
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::testfetch::FixtureFetcher;

    const SEARCH_HTML: &str = r#"
        <html><body>
          <a class="entry" data-evcmp="product-card_search" href="/software/186634/visual-studio-code">
            <img class="search-results__thumbnail__img" alt="Visual Studio Code">
          </a>
          <a class="entry" data-evcmp="product-card_search" href="/software/120551/visual-studio">
            <img class="search-results__thumbnail__img" alt="Visual Studio 2022">
          </a>
          <a class="entry" data-evcmp="product-card_search" href="/software/1/no-thumb"></a>
        </body></html>"#;

    #[test]
    fn search_extraction_parses_cards() {
        let candidates = extract_candidates(SEARCH_HTML);
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].display_name, "Visual Studio Code");
        assert_eq!(candidates[0].source_id, "visual-studio-code");
        assert_eq!(
            candidates[0].url,
            "https://www.capterra.in/software/186634/visual-studio-code"
        );
    }

    fn review_card(title: &str, rating: &str, date: &str) -> String {
        format!(
            r#"<div class="review-card">
                 <div class="fw-600">Priya S.</div>
                 <h3 class="fs-3">"{title}"</h3>
                 <div class="d-lg-flex">
                   <div class="star-rating-component"><span class="ms-1">{rating}</span></div>
                   <div class="fs-5 text-neutral-90">{date}</div>
                 </div>
                 <div class="fs-4 lh-2 text-neutral-99"><span>Solid overall experience.</span></div>
                 <div class="my-3 my-lg-4">
                   <div class="fw-600">Pros:</div>
                   <div class="fs-4 lh-2 text-neutral-99">Clean interface</div>
                 </div>
                 <div class="mb-3 mb-lg-4">
                   <div class="fw-600">Cons:</div>
                   <div class="fs-4 lh-2 text-neutral-99">Heavy on memory</div>
                 </div>
               </div>"#
        )
    }

    #[test]
    fn fragment_extraction_maps_fields() {
        let html = format!(
            "<html><body>{}</body></html>",
            review_card("Does the job", "4.0", "17 February 2025")
        );
        let frags = extract_fragments(&html, "https://www.capterra.in/x", Utc::now());
        assert_eq!(frags.len(), 1);
        let f = &frags[0];
        assert_eq!(f.field(fields::TITLE), Some("Does the job"));
        assert_eq!(f.field(fields::RATING), Some("4.0"));
        assert_eq!(f.field(fields::REVIEWER), Some("Priya S."));
        assert_eq!(f.field(fields::DATE), Some("17 February 2025"));
        let body = f.field(fields::BODY).unwrap();
        assert!(body.contains("Solid overall experience."));
        assert!(body.contains("Pros: Clean interface"));
        assert!(body.contains("Cons: Heavy on memory"));
    }

    #[tokio::test]
    async fn empty_page_ends_pagination() {
        let mut fetcher = FixtureFetcher::new();
        let mut adapter = CapterraAdapter::new(&mut fetcher);
        adapter
            .open_listing(&ProductCandidate {
                source_id: "x".into(),
                display_name: "X".into(),
                url: "https://www.capterra.in/software/1/x".into(),
            })
            .await
            .unwrap();
        let batch = adapter.next_page().await.unwrap();
        assert!(batch.fragments.is_empty());
        assert!(!batch.has_more);
    }
}
