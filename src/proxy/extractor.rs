//! Listing extractor for HTML proxy tables
//!
//! Turns one rendered listing page into proxy records. Rows that do not look
//! like a proxy entry are skipped silently; an empty page is classified as
//! either blocked or exhausted.

use crate::proxy::models::{PageExtract, PageStatus, ProxyRecord};
use crate::Result;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::fs;
use std::path::Path;

/// Strict dotted-quad pattern for cell 0
static IPV4_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}$").expect("Invalid IPv4 regex")
});

/// Country token inside the flag link of cell 2
static COUNTRY_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"country=([A-Z]+)").expect("Invalid country regex"));

static ROW_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("table tr").expect("Invalid row selector"));
static CELL_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("td").expect("Invalid cell selector"));
static LINK_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a[href]").expect("Invalid link selector"));
static TITLE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("title").expect("Invalid title selector"));

/// Title fragments of known challenge interstitials
const BLOCK_TITLE_MARKERS: &[&str] = &["Cloudflare", "Just a moment"];

/// Body fragments of known deny pages
const BLOCK_BODY_MARKERS: &[&str] = &["Access Denied"];

/// Minimum number of cells in a proxy row: ip, port, country, city
const MIN_CELLS: usize = 4;

/// Extractor for table-based proxy listing pages
pub struct ListingExtractor;

impl ListingExtractor {
    /// Extract all proxy records from one page
    pub fn extract_page(html: &str) -> PageExtract {
        let document = Html::parse_document(html);

        let records: Vec<ProxyRecord> = document
            .select(&ROW_SELECTOR)
            .filter_map(Self::parse_row)
            .collect();

        let status = if !records.is_empty() {
            PageStatus::Ok
        } else if Self::is_blocked(&document, html) {
            PageStatus::Blocked
        } else {
            PageStatus::Exhausted
        };

        PageExtract { records, status }
    }

    /// Extract records from a saved HTML file
    pub fn extract_file<P: AsRef<Path>>(path: P) -> Result<PageExtract> {
        let html = fs::read_to_string(path)?;
        Ok(Self::extract_page(&html))
    }

    /// Parse a single table row
    fn parse_row(row: ElementRef<'_>) -> Option<ProxyRecord> {
        let cells: Vec<ElementRef<'_>> = row.select(&CELL_SELECTOR).collect();
        if cells.len() < MIN_CELLS {
            return None;
        }

        let ip = cell_text(&cells[0]);
        if !IPV4_REGEX.is_match(&ip) {
            return None;
        }

        let port = cell_text(&cells[1]);
        let city = cell_text(&cells[3]);
        let record = ProxyRecord::new(ip, port, city);

        match Self::country_code(&cells[2]) {
            Some(code) => Some(record.with_country(code)),
            None => Some(record),
        }
    }

    /// Country code from the first link in the cell
    fn country_code(cell: &ElementRef<'_>) -> Option<String> {
        let link = cell.select(&LINK_SELECTOR).next()?;
        let href = link.value().attr("href")?;
        let caps = COUNTRY_REGEX.captures(href)?;
        Some(caps[1].to_string())
    }

    /// Check whether an empty page is an anti-bot interstitial
    fn is_blocked(document: &Html, html: &str) -> bool {
        let title: String = document
            .select(&TITLE_SELECTOR)
            .next()
            .map(|t| t.text().collect())
            .unwrap_or_default();

        BLOCK_TITLE_MARKERS.iter().any(|m| title.contains(m))
            || BLOCK_BODY_MARKERS.iter().any(|m| html.contains(m))
    }
}

/// Concatenate the trimmed text fragments of an element
fn cell_text(cell: &ElementRef<'_>) -> String {
    cell.text().map(str::trim).collect()
}
