//! Quote-source abstractions shared by the provider cascade.

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::HashMap;

use crate::session::CalculationMode;

/// The price comparison a quote request asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuoteWindow {
    /// Latest price against the prior session close.
    Intraday(CalculationMode),
    /// Close on or before the target date against the nearest earlier close.
    Historical(NaiveDate),
}

/// Where a change ratio came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ChangeSource {
    Provider(&'static str),
    /// Every source failed for this symbol and the ratio was pinned to zero.
    Defaulted,
}

/// Price-change ratio for one symbol:
/// `(latest − previous close) / previous close`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceChange {
    pub ratio: f64,
    pub source: ChangeSource,
}

impl PriceChange {
    pub fn is_defaulted(&self) -> bool {
        self.source == ChangeSource::Defaulted
    }
}

/// One upstream quote source.
///
/// Implementations return a partial map — symbols they could not resolve are
/// simply absent — and reserve `Err` for failures that sink the whole request
/// (transport, decode). Either way the cascade hands the remainder to the
/// next source.
#[async_trait]
pub trait QuoteProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Live feeds cannot answer historical windows.
    fn supports(&self, window: &QuoteWindow) -> bool;

    async fn query(
        &self,
        symbols: &[String],
        window: QuoteWindow,
    ) -> Result<HashMap<String, f64>>;
}
