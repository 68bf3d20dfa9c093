use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::{Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use futures::future::join_all;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::{debug, instrument};

use crate::quote_provider::{QuoteProvider, QuoteWindow};
use crate::session::CalculationMode;

const REQUEST_TIMEOUT_SECS: u64 = 10;
/// Calendar days fetched before a review target so holidays and trading
/// halts still leave two usable closes inside the window.
const REVIEW_LOOKBACK_DAYS: i64 = 10;

/// Primary quote source: per-symbol daily chart JSON. Serves both the
/// intraday and the historical window; symbols in a batch are fetched
/// concurrently.
pub struct YahooProvider {
    base_url: String,
    client: reqwest::Client,
}

impl YahooProvider {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent("navcast/0.1")
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(YahooProvider {
            base_url: base_url.to_string(),
            client,
        })
    }

    fn chart_url(&self, symbol: &str, window: QuoteWindow) -> String {
        match window {
            QuoteWindow::Intraday(mode) => {
                let range = match mode {
                    CalculationMode::CurrentDay => "2d",
                    CalculationMode::PreviousDay => "3d",
                };
                format!(
                    "{}/v8/finance/chart/{}?interval=1d&range={}",
                    self.base_url, symbol, range
                )
            }
            QuoteWindow::Historical(target) => {
                let start = target - Duration::days(REVIEW_LOOKBACK_DAYS);
                let end = target + Duration::days(1);
                let period1 = start.and_time(NaiveTime::MIN).and_utc().timestamp();
                let period2 = end.and_time(NaiveTime::MIN).and_utc().timestamp();
                format!(
                    "{}/v8/finance/chart/{}?interval=1d&period1={}&period2={}",
                    self.base_url, symbol, period1, period2
                )
            }
        }
    }

    /// Fetches one symbol's chart and reduces it to a change ratio.
    /// `Ok(None)` means the response held no usable close pair.
    async fn fetch_change(&self, symbol: &str, window: QuoteWindow) -> Result<Option<f64>> {
        let url = self.chart_url(symbol, window);
        debug!("Requesting price data from {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| anyhow!("Request error: {} for symbol: {} URL: {}", e, symbol, url))?;

        let data = response
            .json::<ChartResponse>()
            .await
            .with_context(|| format!("Failed to parse chart response for symbol: {symbol}"))?;

        let item = data
            .chart
            .result
            .first()
            .ok_or_else(|| anyhow!("No price data found for symbol: {}", symbol))?;

        Ok(match window {
            QuoteWindow::Intraday(_) => intraday_change(item),
            QuoteWindow::Historical(target) => review_change(item, target),
        })
    }
}

#[derive(Deserialize, Debug)]
struct ChartResponse {
    chart: ChartResult,
}

#[derive(Deserialize, Debug)]
struct ChartResult {
    result: Vec<ChartItem>,
}

#[derive(Deserialize, Debug)]
struct ChartItem {
    meta: ChartMeta,
    timestamp: Option<Vec<i64>>,
    indicators: Option<Indicators>,
}

#[derive(Deserialize, Debug)]
struct ChartMeta {
    #[serde(alias = "regularMarketPrice")]
    regular_market_price: Option<f64>,
    #[serde(alias = "chartPreviousClose")]
    previous_close: Option<f64>,
}

#[derive(Deserialize, Debug)]
struct Indicators {
    quote: Vec<Quote>,
}

#[derive(Deserialize, Debug)]
struct Quote {
    close: Option<Vec<Option<f64>>>,
}

fn valid_closes(item: &ChartItem) -> Vec<(i64, f64)> {
    let Some(timestamps) = item.timestamp.as_ref() else {
        return Vec::new();
    };
    let Some(closes) = item
        .indicators
        .as_ref()
        .and_then(|inds| inds.quote.first())
        .and_then(|q| q.close.as_ref())
    else {
        return Vec::new();
    };
    timestamps
        .iter()
        .zip(closes.iter())
        .filter_map(|(ts, close)| close.map(|c| (*ts, c)))
        .collect()
}

fn intraday_change(item: &ChartItem) -> Option<f64> {
    let closes = valid_closes(item);
    if closes.len() >= 2 {
        let previous = closes[closes.len() - 2].1;
        let latest = closes[closes.len() - 1].1;
        return ratio(latest, previous);
    }
    // Thin listings sometimes answer with meta fields only.
    let latest = item.meta.regular_market_price?;
    let previous = item.meta.previous_close?;
    ratio(latest, previous)
}

fn review_change(item: &ChartItem, target: NaiveDate) -> Option<f64> {
    let samples: Vec<(NaiveDate, f64)> = valid_closes(item)
        .into_iter()
        .filter_map(|(ts, close)| {
            Utc.timestamp_opt(ts, 0)
                .single()
                .map(|dt| (dt.date_naive(), close))
        })
        .collect();
    select_review_window(&samples, target)
}

/// Picks the latest close on or before `target` and the nearest earlier
/// close out of an unordered sample set, returning the change ratio between
/// them. Fewer than two qualifying samples resolves nothing.
pub(crate) fn select_review_window(
    samples: &[(NaiveDate, f64)],
    target: NaiveDate,
) -> Option<f64> {
    let (current_date, current) = samples
        .iter()
        .copied()
        .filter(|(date, _)| *date <= target)
        .max_by_key(|&(date, _)| date)?;
    let (_, previous) = samples
        .iter()
        .copied()
        .filter(|(date, _)| *date < current_date)
        .max_by_key(|&(date, _)| date)?;
    ratio(current, previous)
}

fn ratio(latest: f64, previous: f64) -> Option<f64> {
    (previous > 0.0).then(|| (latest - previous) / previous)
}

#[async_trait]
impl QuoteProvider for YahooProvider {
    fn name(&self) -> &'static str {
        "yahoo"
    }

    fn supports(&self, _window: &QuoteWindow) -> bool {
        true
    }

    #[instrument(name = "YahooBatch", skip(self, symbols), fields(count = symbols.len()))]
    async fn query(
        &self,
        symbols: &[String],
        window: QuoteWindow,
    ) -> Result<HashMap<String, f64>> {
        let fetches = symbols.iter().map(|symbol| async move {
            match self.fetch_change(symbol, window).await {
                Ok(Some(change)) => Some((symbol.clone(), change)),
                Ok(None) => {
                    debug!(%symbol, "no usable close pair");
                    None
                }
                Err(e) => {
                    debug!(%symbol, error = %e, "chart request failed");
                    None
                }
            }
        });
        Ok(join_all(fetches).await.into_iter().flatten().collect())
    }
}
