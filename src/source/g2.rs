//! G2 adapter: search, listing navigation, and review extraction.
//!
//! Search results carry the product name inside a JSON tracking attribute
//! (`data-event-options`) on links into `/products/{slug}/reviews`. The
//! review listing is page-number paginated and sorted via the
//! `order=most_recent` query parameter; a 500 error page past the last
//! page ends pagination.

use super::{collapse_ws, encode_query, fields, text_of, PageBatch, SourceAdapter};
use crate::error::AcquireError;
use crate::model::{ProductCandidate, RawReviewFragment, Source};
use crate::session::PageFetcher;
use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use tracing::debug;

const SEARCH_URL: &str = "https://www.g2.com/search/products";
const BOILERPLATE: &str = "Review collected by and hosted on G2.com.";

pub struct G2Adapter<'a> {
    fetcher: &'a mut dyn PageFetcher,
    slug: Option<String>,
    page: u32,
}

impl<'a> G2Adapter<'a> {
    pub fn new(fetcher: &'a mut dyn PageFetcher) -> Self {
        Self {
            fetcher,
            slug: None,
            page: 0,
        }
    }

    async fn fetch_current(&mut self) -> Result<PageBatch, AcquireError> {
        let slug = self
            .slug
            .clone()
            .ok_or_else(|| AcquireError::Session(anyhow!("listing not opened")))?;
        let url = format!(
            "https://www.g2.com/products/{slug}/reviews?order=most_recent&page={}",
            self.page
        );
        self.fetcher.goto(&url).await?;
        let html = self.fetcher.content().await?;
        let fetched_at = Utc::now();

        // G2 serves a 500 page when asked for a page past the last one.
        if html.contains(r#"<h1 class="error-text-number">500</h1>"#) {
            debug!(page = self.page, "g2 returned 500, end of listing");
            return Ok(PageBatch {
                html,
                fragments: Vec::new(),
                has_more: false,
                fetched_at,
            });
        }

        let fragments = extract_fragments(&html, &url, fetched_at);
        debug!(page = self.page, count = fragments.len(), "g2 page extracted");
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
impl SourceAdapter for G2Adapter<'_> {
    fn source(&self) -> Source {
        Source::G2
    }

    async fn search(&mut self, query: &str) -> Result<Vec<ProductCandidate>, AcquireError> {
        let url = format!("{SEARCH_URL}?max=5&query={}", encode_query(query));
        self.fetcher.goto(&url).await?;
        let html = self.fetcher.content().await?;
        Ok(extract_candidates(&html))
    }

    async fn open_listing(&mut self, candidate: &ProductCandidate) -> Result<(), AcquireError> {
        self.slug = Some(candidate.source_id.clone());
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

/// Pull product candidates out of a G2 search results page.
fn extract_candidates(html: &str) -> Vec<ProductCandidate> {
    let doc = Html::parse_document(html);
    let link_sel =
        Selector::parse(r#"a[data-event-options*="item_name"][href*="/reviews"]"#).unwrap();

    let mut candidates = Vec::new();
    let mut seen = HashSet::new();

    for link in doc.select(&link_sel) {
        let Some(options) = link.value().attr("data-event-options") else {
            continue;
        };
        let Ok(data) = serde_json::from_str::<serde_json::Value>(options) else {
            continue;
        };
        let Some(name) = data.get("item_name").and_then(|v| v.as_str()) else {
            continue;
        };
        let Some(slug) = link
            .value()
            .attr("href")
            .and_then(|href| slug_from_href(href))
        else {
            continue;
        };

        if seen.insert(name.to_string()) {
            candidates.push(ProductCandidate {
                url: format!("https://www.g2.com/products/{slug}/reviews"),
                source_id: slug,
                display_name: name.to_string(),
            });
        }
    }

    candidates
}

/// Second path segment of `/products/{slug}/reviews`, absolute or relative.
fn slug_from_href(href: &str) -> Option<String> {
    let path = match url::Url::parse(href) {
        Ok(u) => u.path().to_string(),
        Err(_) => href.split(['?', '#']).next().unwrap_or(href).to_string(),
    };
    let mut segments = path.split('/').filter(|s| !s.is_empty());
    match (segments.next(), segments.next()) {
        (Some("products"), Some(slug)) => Some(slug.to_string()),
        _ => None,
    }
}

/// Extract review fragments from a G2 listing page.
fn extract_fragments(html: &str, page_url: &str, fetched_at: DateTime<Utc>) -> Vec<RawReviewFragment> {
    let doc = Html::parse_document(html);
    let article_sel = Selector::parse(r#"article[itemprop="review"]"#).unwrap();
    let title_sel = Selector::parse(r#"div[itemprop="name"]"#).unwrap();
    let rating_sel = Selector::parse(r#"meta[itemprop="ratingValue"]"#).unwrap();
    let reviewer_sel = Selector::parse(r#"meta[itemprop="name"]"#).unwrap();
    let date_sel = Selector::parse(r#"meta[itemprop="datePublished"]"#).unwrap();
    let body_sel = Selector::parse(r#"div[itemprop="reviewBody"] section"#).unwrap();
    let accordion_sel =
        Selector::parse(r#"div[data-elv--accordion--show-more-controller-target="panel"] section"#)
            .unwrap();

    let mut fragments = Vec::new();

    for article in doc.select(&article_sel) {
        let mut frag = RawReviewFragment::new(Source::G2, fetched_at);

        if let Some(title) = article.select(&title_sel).next() {
            frag.fields
                .insert(fields::TITLE.into(), collapse_ws(&text_of(title)));
        }
        if let Some(rating) = article
            .select(&rating_sel)
            .next()
            .and_then(|el| el.value().attr("content"))
        {
            frag.fields.insert(fields::RATING.into(), rating.to_string());
        }
        if let Some(name) = article
            .select(&reviewer_sel)
            .next()
            .and_then(|el| el.value().attr("content"))
        {
            frag.fields.insert(fields::REVIEWER.into(), name.to_string());
        }
        if let Some(date) = article
            .select(&date_sel)
            .next()
            .and_then(|el| el.value().attr("content"))
        {
            frag.fields.insert(fields::DATE.into(), date.to_string());
        }

        // Visible Q&A sections plus the "Show More" accordion panel.
        let mut parts = Vec::new();
        for section in article.select(&body_sel).chain(article.select(&accordion_sel)) {
            if let Some((question, answer)) = section_qa(section) {
                parts.push(format!("{question}\n{answer}"));
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

/// A G2 body section is a bold question `div` followed by an answer `p`.
fn section_qa(section: ElementRef<'_>) -> Option<(String, String)> {
    let mut question = None;
    let mut answer = None;
    for child in section.children().filter_map(ElementRef::wrap) {
        match child.value().name() {
            "div" if question.is_none() => question = Some(collapse_ws(&text_of(child))),
            "p" if answer.is_none() => {
                let text = text_of(child).replace(BOILERPLATE, "");
                answer = Some(collapse_ws(&text));
            }
            _ => {}
        }
    }
    match (question, answer) {
        (Some(q), Some(a)) if !q.is_empty() && !a.is_empty() => Some((q, a)),
        _ => None,
    }
}
