//! Proxy data models

use std::fmt;

/// Placeholder used for country and city when the listing row lacks them
pub const UNKNOWN: &str = "Unknown";

/// Credential prefix baked into every emitted URI
const URI_USERINFO: &str = "Og";

/// A single proxy row scraped from a listing page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyRecord {
    pub ip: String,
    pub port: String,
    pub country_code: String,
    pub city: String,
}

impl ProxyRecord {
    /// Create a record with an unknown country code
    pub fn new(ip: String, port: String, city: String) -> Self {
        Self {
            ip,
            port,
            country_code: UNKNOWN.to_string(),
            city,
        }
    }

    /// Set the country code, keeping the default for empty values
    pub fn with_country(mut self, country_code: impl Into<String>) -> Self {
        let country_code = country_code.into();
        if !country_code.is_empty() {
            self.country_code = country_code;
        }
        self
    }

    /// Format the record as a proxy URI
    ///
    /// `socks://Og@{ip}:{port}#{country},%20{city}` with the city percent-encoded.
    pub fn to_uri(&self) -> String {
        let country = if self.country_code.is_empty() {
            UNKNOWN
        } else {
            self.country_code.as_str()
        };
        let city = if self.city.is_empty() {
            UNKNOWN
        } else {
            self.city.as_str()
        };

        format!(
            "socks://{}@{}:{}#{},%20{}",
            URI_USERINFO,
            self.ip,
            self.port,
            country,
            encode_city(city)
        )
    }
}

/// Percent-encode a city name, keeping `/` separators readable
fn encode_city(city: &str) -> String {
    city.split('/')
        .map(|part| urlencoding::encode(part).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

impl fmt::Display for ProxyRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_uri())
    }
}

/// Outcome of extracting a single listing page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageStatus {
    /// At least one proxy row was found
    Ok,
    /// No rows, and the page looks like an anti-bot interstitial
    Blocked,
    /// No rows on an ordinary page, most likely past the last page
    Exhausted,
}

impl PageStatus {
    /// Whether the paging loop should stop after this page
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PageStatus::Ok)
    }
}

impl fmt::Display for PageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PageStatus::Ok => write!(f, "ok"),
            PageStatus::Blocked => write!(f, "blocked"),
            PageStatus::Exhausted => write!(f, "exhausted"),
        }
    }
}

/// Records extracted from one page together with the page status
#[derive(Debug, Clone)]
pub struct PageExtract {
    pub records: Vec<ProxyRecord>,
    pub status: PageStatus,
}

impl PageExtract {
    /// Formatted URIs for every record, in page order
    pub fn uris(&self) -> Vec<String> {
        self.records.iter().map(ProxyRecord::to_uri).collect()
    }
}
