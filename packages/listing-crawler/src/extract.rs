use chrono::Utc;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use thiserror::Error;
use url::Url;

use crate::traits::ExtractRow;
use crate::types::{ListingRecord, Placements, Reviews};

/// Origin prefixed onto site-relative hrefs from the listing table.
pub const SITE_ORIGIN: &str = "https://collegedunia.com";

/// Source tag stamped on every record from this extractor.
pub const SOURCE: &str = "collegedunia";

#[derive(Debug, Error)]
pub enum ExtractError {
    /// Not a listing row (header, ad strip, skeleton placeholder).
    #[error("row has no college link")]
    MissingLink,
    #[error("college link has no href")]
    MissingHref,
    #[error("college link href is not a valid url: {0}")]
    BadHref(String),
    #[error("invalid site origin: {0}")]
    Origin(String),
    #[error("invalid selector `{0}`: {1}")]
    Selector(&'static str, String),
    #[error("invalid pattern: {0}")]
    Pattern(String),
}

/// Selector wiring for one collegedunia listing row.
///
/// Selectors are compiled once at construction; a bad selector is a
/// constructor error, never a per-row one.
pub struct RowExtractor {
    origin: Url,
    link: Selector,
    logo_img: Selector,
    logo_span: Selector,
    location: Selector,
    approvals: Selector,
    program: Selector,
    fees: Selector,
    placement_col: Selector,
    placement_pkg: Selector,
    placement_score: Selector,
    review_col: Selector,
    review_rating: Selector,
    review_count: Selector,
    bg_url: Regex,
}

fn sel(s: &'static str) -> Result<Selector, ExtractError> {
    Selector::parse(s).map_err(|e| ExtractError::Selector(s, e.to_string()))
}

impl RowExtractor {
    pub fn collegedunia() -> Result<Self, ExtractError> {
        Ok(Self {
            origin: Url::parse(SITE_ORIGIN).map_err(|e| ExtractError::Origin(e.to_string()))?,
            link: sel("a.college_name")?,
            logo_img: sel("a.clg-logo img")?,
            logo_span: sel("a.clg-logo span")?,
            location: sel("span.location")?,
            approvals: sel("span.approvals")?,
            program: sel("span.fee-shorm-form")?,
            fees: sel("td.col-fees span.text-green")?,
            placement_col: sel("td.col-placement")?,
            placement_pkg: sel("span.text-green")?,
            placement_score: sel("span.font-weight-bold")?,
            review_col: sel("td.col-reviews")?,
            review_rating: sel("span.lr-key")?,
            review_count: sel("span.lr-value")?,
            bg_url: Regex::new(r#"url\(["']?(.*?)["']?\)"#)
                .map_err(|e| ExtractError::Pattern(e.to_string()))?,
        })
    }

    fn text_of(el: ElementRef<'_>) -> Option<String> {
        clean(&el.text().collect::<String>())
    }

    fn first_text(&self, row: ElementRef<'_>, selector: &Selector) -> Option<String> {
        row.select(selector).next().and_then(Self::text_of)
    }

    /// Logo fallback chain: lazy-loaded `data-src`, plain `src`, then the
    /// `background-image` of the placeholder span.
    fn logo_url(&self, row: ElementRef<'_>) -> Option<String> {
        if let Some(img) = row.select(&self.logo_img).next() {
            let attrs = img.value();
            if let Some(src) = attrs.attr("data-src").or_else(|| attrs.attr("src")) {
                if !src.is_empty() {
                    return Some(src.to_string());
                }
            }
        }
        row.select(&self.logo_span)
            .next()
            .and_then(|span| span.value().attr("style"))
            .and_then(|style| self.extract_bg_url(style))
    }

    fn extract_bg_url(&self, style: &str) -> Option<String> {
        self.bg_url
            .captures(style)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
            .filter(|u| !u.is_empty())
    }
}

impl ExtractRow for RowExtractor {
    fn extract(&self, row_html: &str) -> Result<ListingRecord, ExtractError> {
        // tr/td are dropped by the HTML parser outside a table context, so
        // row snapshots are re-wrapped before parsing.
        let wrapped = format!("<table><tbody>{row_html}</tbody></table>");
        let doc = Html::parse_document(&wrapped);
        let row = doc.root_element();

        let link = row.select(&self.link).next().ok_or(ExtractError::MissingLink)?;
        let href = link
            .value()
            .attr("href")
            .filter(|h| !h.is_empty())
            .ok_or(ExtractError::MissingHref)?;
        // Resolves site-relative hrefs against the origin; absolute hrefs
        // pass through unchanged.
        let url = self
            .origin
            .join(href)
            .map_err(|_| ExtractError::BadHref(href.to_string()))?
            .to_string();

        let mut placements = Placements::default();
        if let Some(col) = row.select(&self.placement_col).next() {
            let mut pkgs = col.select(&self.placement_pkg);
            placements.average_package = pkgs.next().and_then(Self::text_of);
            placements.highest_package = pkgs.next().and_then(Self::text_of);
            placements.score = col.select(&self.placement_score).next().and_then(Self::text_of);
        }

        let mut reviews = Reviews::default();
        if let Some(col) = row.select(&self.review_col).next() {
            reviews.rating = col.select(&self.review_rating).next().and_then(Self::text_of);
            reviews.count = col.select(&self.review_count).next().and_then(Self::text_of);
        }

        Ok(ListingRecord {
            url,
            name: Self::text_of(link),
            logo: self.logo_url(row),
            location: self.first_text(row, &self.location),
            approvals: self.first_text(row, &self.approvals),
            program: self.first_text(row, &self.program),
            fees: self.first_text(row, &self.fees),
            placements,
            reviews,
            source: SOURCE.to_string(),
            updated_at: Utc::now(),
        })
    }
}

/// Collapse whitespace runs and newlines into single spaces; empty ⇒ `None`.
pub fn clean(text: &str) -> Option<String> {
    let cleaned = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}
