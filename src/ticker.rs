//! Normalization of raw security codes into provider-queryable symbols.
//!
//! Holdings disclosures carry codes in several shapes: bare 6-digit mainland
//! codes, short Hong Kong codes, Bloomberg-style " US"/" HK"/" CH" suffixes,
//! and comma-joined composites listing the same instrument on several
//! exchanges. `normalize` maps each shape to the symbol the quote feeds
//! understand, tagged with its home market.

use serde::Serialize;
use std::fmt;

/// Exchange a security trades on, as inferred from its raw code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Market {
    Shanghai,
    Shenzhen,
    Beijing,
    HongKong,
    Us,
    Unknown,
}

impl Market {
    /// Reporting group used for weight breakdowns; the three mainland
    /// exchanges share one group.
    pub fn group(&self) -> MarketGroup {
        match self {
            Market::Shanghai | Market::Shenzhen | Market::Beijing => MarketGroup::AShare,
            Market::HongKong => MarketGroup::HongKong,
            Market::Us => MarketGroup::Us,
            Market::Unknown => MarketGroup::Other,
        }
    }
}

/// Market grouping for diagnostic weight buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum MarketGroup {
    AShare,
    HongKong,
    Us,
    Other,
}

impl fmt::Display for MarketGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            MarketGroup::AShare => "A-share",
            MarketGroup::HongKong => "HK",
            MarketGroup::Us => "US",
            MarketGroup::Other => "Other",
        };
        write!(f, "{label}")
    }
}

/// A raw holding code resolved to a quotable symbol.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedTicker {
    pub raw: String,
    pub symbol: String,
    pub market: Market,
}

/// Resolves a raw security code into a feed symbol and market tag.
///
/// Pure and total: unrecognized shapes come back unchanged with
/// `Market::Unknown` rather than failing.
pub fn normalize(code: &str) -> NormalizedTicker {
    let cleaned = code.trim().to_uppercase();
    let (symbol, market) = convert(&cleaned);
    NormalizedTicker {
        raw: code.to_string(),
        symbol,
        market,
    }
}

fn convert(code: &str) -> (String, Market) {
    if let Some(rest) = code.strip_suffix(" US") {
        return (rest.trim().to_string(), Market::Us);
    }
    if let Some(rest) = code.strip_suffix(" HK") {
        return (format!("{:0>5}.HK", rest.trim()), Market::HongKong);
    }
    if let Some(rest) = code.strip_suffix(" CH") {
        return convert(rest.trim());
    }
    if code.len() == 6 && is_digits(code) {
        return match code.as_bytes()[0] {
            b'8' | b'4' | b'9' => (format!("{code}.BJ"), Market::Beijing),
            b'6' => (format!("{code}.SS"), Market::Shanghai),
            _ => (format!("{code}.SZ"), Market::Shenzhen),
        };
    }
    if !code.is_empty() && code.len() < 6 && is_digits(code) {
        return (format!("{code:0>5}.HK"), Market::HongKong);
    }
    if !code.is_empty() && code.bytes().all(|b| b.is_ascii_alphabetic()) {
        return (code.to_string(), Market::Us);
    }
    if code.contains(',') {
        // Composite listing of one instrument on several exchanges. The
        // 6-digit mainland code is the home listing when present.
        let elements: Vec<&str> = code.split(',').map(str::trim).collect();
        if let Some(home) = elements.iter().find(|e| e.len() == 6 && is_digits(e)) {
            return convert(home);
        }
        if let Some(first) = elements.iter().find(|e| !e.is_empty()) {
            return convert(first);
        }
    }
    (code.to_string(), Market::Unknown)
}

fn is_digits(code: &str) -> bool {
    code.bytes().all(|b| b.is_ascii_digit())
}
