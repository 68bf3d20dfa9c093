//! Weighted valuation of a holdings list against per-security price deltas.

use anyhow::{Result, bail};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::chain::QuoteChain;
use crate::holdings::HoldingRow;
use crate::quote_provider::{ChangeSource, QuoteWindow};
use crate::session::{self, CalculationMode, SessionState};
use crate::ticker::{self, MarketGroup, NormalizedTicker};

/// What kind of estimate the caller asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RequestMode {
    /// Estimate against whichever session the clock says is in play.
    Realtime,
    /// Reconstruct the change as of a past trading day.
    Review { target: NaiveDate },
}

/// Which bucket a holding's weight landed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WeightBucket {
    /// Quote resolved by a source; contributes to the estimate.
    Calculated,
    /// Requested but unresolved or defaulted; weight counted, no
    /// contribution.
    Failed,
    /// Home market had not begun its trading day; excluded from the request.
    Inactive,
}

#[derive(Debug, Clone, Serialize)]
pub struct HoldingDetail {
    pub company: String,
    pub symbol: String,
    pub market: MarketGroup,
    /// Weight as a fraction of net assets.
    pub weight: f64,
    pub session: SessionState,
    pub change: Option<f64>,
    pub source: Option<ChangeSource>,
    pub bucket: WeightBucket,
}

/// Per-market weight totals for each outcome class.
#[derive(Debug, Clone, Default, Serialize)]
pub struct WeightBuckets {
    pub calculated: HashMap<MarketGroup, f64>,
    pub failed: HashMap<MarketGroup, f64>,
    pub inactive: HashMap<MarketGroup, f64>,
}

impl WeightBuckets {
    fn add(&mut self, bucket: WeightBucket, market: MarketGroup, weight: f64) {
        let slot = match bucket {
            WeightBucket::Calculated => &mut self.calculated,
            WeightBucket::Failed => &mut self.failed,
            WeightBucket::Inactive => &mut self.inactive,
        };
        *slot.entry(market).or_default() += weight;
    }

    pub fn calculated_total(&self) -> f64 {
        self.calculated.values().sum()
    }

    pub fn failed_total(&self) -> f64 {
        self.failed.values().sum()
    }

    pub fn inactive_total(&self) -> f64 {
        self.inactive.values().sum()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EstimateResult {
    /// Weighted change ratio; multiply by 100 for percent.
    pub estimated_change: f64,
    /// Sum of all holding weight fractions seen, resolved or not.
    pub total_weight: f64,
    pub buckets: WeightBuckets,
    pub holdings: Vec<HoldingDetail>,
    /// Rows discarded for a missing name or unparseable weight.
    pub dropped_rows: usize,
    pub mode: RequestMode,
    pub calc_mode: CalculationMode,
}

struct Entry {
    company: String,
    ticker: NormalizedTicker,
    weight_pct: f64,
    session: SessionState,
}

pub struct Estimator {
    chain: QuoteChain,
}

impl Estimator {
    pub fn new(chain: QuoteChain) -> Self {
        Estimator { chain }
    }

    pub async fn evaluate(
        &self,
        rows: &[HoldingRow],
        mode: RequestMode,
    ) -> Result<EstimateResult> {
        self.evaluate_at(rows, mode, Utc::now(), None).await
    }

    /// Explicit-instant variant. `deadline` bounds the total quote-fetch
    /// time; whatever is unresolved when it elapses is defaulted.
    pub async fn evaluate_at(
        &self,
        rows: &[HoldingRow],
        mode: RequestMode,
        now: DateTime<Utc>,
        deadline: Option<Instant>,
    ) -> Result<EstimateResult> {
        let (rows, dropped_rows) = sanitize(rows);
        if rows.is_empty() {
            bail!("No usable holdings rows; nothing to estimate");
        }
        if dropped_rows > 0 {
            warn!("Dropped {dropped_rows} holdings rows with invalid weight or name");
        }

        let calc_mode = session::mode_at(now);

        // One entry per company; repeated disclosures keep the first row.
        let mut seen_names = HashSet::new();
        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            if !seen_names.insert(row.company.clone()) {
                debug!(company = %row.company, "duplicate holding collapsed");
                continue;
            }
            let normalized = ticker::normalize(&row.security_code);
            let state = session::status_at(normalized.market, now);
            entries.push(Entry {
                company: row.company,
                ticker: normalized,
                weight_pct: row.weight_pct,
                session: state,
            });
        }

        let window = match mode {
            RequestMode::Realtime => QuoteWindow::Intraday(calc_mode),
            RequestMode::Review { target } => QuoteWindow::Historical(target),
        };

        // Realtime only asks about markets that have begun their trading
        // day; a review reconstructs every market.
        let mut requested = HashSet::new();
        let mut symbols = Vec::new();
        for entry in &entries {
            let wanted = match mode {
                RequestMode::Realtime => entry.session.is_quotable(),
                RequestMode::Review { .. } => true,
            };
            if wanted && requested.insert(entry.ticker.symbol.clone()) {
                symbols.push(entry.ticker.symbol.clone());
            }
        }
        info!(
            holdings = entries.len(),
            quotable = symbols.len(),
            ?calc_mode,
            "requesting quotes"
        );

        let changes = self.chain.fetch_changes(&symbols, window, deadline).await;

        let mut total_weight = 0.0;
        let mut numerator = 0.0;
        let mut buckets = WeightBuckets::default();
        let mut holdings = Vec::with_capacity(entries.len());

        for entry in entries {
            let weight = entry.weight_pct / 100.0;
            total_weight += weight;
            let market = entry.ticker.market.group();

            let (bucket, change, source) = if requested.contains(&entry.ticker.symbol) {
                match changes.get(&entry.ticker.symbol) {
                    Some(change) if !change.is_defaulted() => {
                        numerator += weight * change.ratio;
                        (
                            WeightBucket::Calculated,
                            Some(change.ratio),
                            Some(change.source.clone()),
                        )
                    }
                    Some(change) => (
                        WeightBucket::Failed,
                        Some(change.ratio),
                        Some(change.source.clone()),
                    ),
                    None => (WeightBucket::Failed, None, None),
                }
            } else {
                (WeightBucket::Inactive, None, None)
            };

            buckets.add(bucket, market, weight);
            holdings.push(HoldingDetail {
                company: entry.company,
                symbol: entry.ticker.symbol,
                market,
                weight,
                session: entry.session,
                change,
                source,
                bucket,
            });
        }

        let estimated_change = if total_weight > 0.0 {
            numerator / total_weight
        } else {
            0.0
        };
        info!(
            estimated_change,
            total_weight,
            calculated = buckets.calculated_total(),
            failed = buckets.failed_total(),
            inactive = buckets.inactive_total(),
            "valuation complete"
        );

        Ok(EstimateResult {
            estimated_change,
            total_weight,
            buckets,
            holdings,
            dropped_rows,
            mode,
            calc_mode,
        })
    }
}

struct CleanRow {
    company: String,
    security_code: String,
    weight_pct: f64,
}

fn sanitize(rows: &[HoldingRow]) -> (Vec<CleanRow>, usize) {
    let mut kept = Vec::with_capacity(rows.len());
    let mut dropped = 0;
    for row in rows {
        match row.weight_pct {
            Some(weight) if weight.is_finite() && weight > 0.0 && !row.company.trim().is_empty() => {
                kept.push(CleanRow {
                    company: row.company.trim().to_string(),
                    security_code: row.security_code.clone(),
                    weight_pct: weight,
                });
            }
            _ => dropped += 1,
        }
    }
    (kept, dropped)
}
