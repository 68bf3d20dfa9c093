//! Ordered quote-source cascade with batching and fail-soft defaulting.
//!
//! Sources are queried in order over the still-unresolved remainder: a
//! symbol the first source cannot answer is retried by the second, then the
//! third. Symbols left over after every source are pinned to a zero change
//! and flagged, so one dead instrument never sinks a valuation.

use rand::RngExt;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::quote_provider::{ChangeSource, PriceChange, QuoteProvider, QuoteWindow};

/// Symbols per upstream burst; large funds get split so no source sees an
/// oversized request.
const BATCH_SIZE: usize = 15;
// Randomized pause between bursts keeps the aggregate request rate under
// provider throttling thresholds.
const PAUSE_MIN_MS: u64 = 2_000;
const PAUSE_MAX_MS: u64 = 4_000;

pub struct QuoteChain {
    providers: Vec<Box<dyn QuoteProvider>>,
    batch_size: usize,
    paced: bool,
}

impl QuoteChain {
    pub fn new(providers: Vec<Box<dyn QuoteProvider>>) -> Self {
        QuoteChain {
            providers,
            batch_size: BATCH_SIZE,
            paced: true,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Disables the inter-batch pause. Only sensible against local or mocked
    /// feeds.
    pub fn without_pacing(mut self) -> Self {
        self.paced = false;
        self
    }

    /// Resolves a change ratio for every requested symbol. Never fails:
    /// symbols no source could answer come back with a zero ratio and a
    /// `Defaulted` source. An elapsed `deadline` abandons in-flight lookups
    /// and defaults whatever is left.
    pub async fn fetch_changes(
        &self,
        symbols: &[String],
        window: QuoteWindow,
        deadline: Option<Instant>,
    ) -> HashMap<String, PriceChange> {
        let mut results = HashMap::with_capacity(symbols.len());

        for (index, batch) in symbols.chunks(self.batch_size).enumerate() {
            if deadline.is_some_and(|d| Instant::now() >= d) {
                warn!("Deadline reached; abandoning remaining quote lookups");
                break;
            }
            if index > 0 && self.paced {
                let pause = rand::rng().random_range(PAUSE_MIN_MS..=PAUSE_MAX_MS);
                debug!("Pausing {}ms before the next batch", pause);
                tokio::time::sleep(Duration::from_millis(pause)).await;
            }
            self.run_cascade(batch, window, deadline, &mut results)
                .await;
        }

        for symbol in symbols {
            if !results.contains_key(symbol) {
                results.insert(
                    symbol.clone(),
                    PriceChange {
                        ratio: 0.0,
                        source: ChangeSource::Defaulted,
                    },
                );
            }
        }
        results
    }

    async fn run_cascade(
        &self,
        batch: &[String],
        window: QuoteWindow,
        deadline: Option<Instant>,
        results: &mut HashMap<String, PriceChange>,
    ) {
        let mut remaining: Vec<String> = batch.to_vec();

        for provider in &self.providers {
            if remaining.is_empty() {
                break;
            }
            if !provider.supports(&window) {
                debug!(provider = provider.name(), "source skipped for this window");
                continue;
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                warn!("Deadline reached mid-cascade");
                break;
            }

            let lookup = provider.query(&remaining, window);
            let outcome = match deadline {
                Some(deadline) => match tokio::time::timeout_at(deadline, lookup).await {
                    Ok(outcome) => outcome,
                    Err(_) => {
                        warn!(provider = provider.name(), "quote lookups timed out");
                        break;
                    }
                },
                None => lookup.await,
            };

            match outcome {
                Ok(resolved) => {
                    remaining.retain(|symbol| !resolved.contains_key(symbol));
                    info!(
                        provider = provider.name(),
                        resolved = resolved.len(),
                        unresolved = remaining.len(),
                        "source pass complete"
                    );
                    for (symbol, ratio) in resolved {
                        results.insert(
                            symbol,
                            PriceChange {
                                ratio,
                                source: ChangeSource::Provider(provider.name()),
                            },
                        );
                    }
                }
                Err(e) => {
                    warn!(
                        provider = provider.name(),
                        error = %e,
                        "source failed; falling through"
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::CalculationMode;
    use anyhow::{Result, anyhow};
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    const INTRADAY: QuoteWindow = QuoteWindow::Intraday(CalculationMode::CurrentDay);

    struct StubProvider {
        name: &'static str,
        live_only: bool,
        fail: bool,
        answers: HashMap<String, f64>,
        calls: Arc<Mutex<Vec<Vec<String>>>>,
    }

    impl StubProvider {
        fn new(name: &'static str, answers: &[(&str, f64)]) -> Self {
            StubProvider {
                name,
                live_only: false,
                fail: false,
                answers: answers
                    .iter()
                    .map(|(symbol, ratio)| (symbol.to_string(), *ratio))
                    .collect(),
                calls: Arc::new(Mutex::new(Vec::new())),
            }
        }

        fn live_only(mut self) -> Self {
            self.live_only = true;
            self
        }

        fn failing(mut self) -> Self {
            self.fail = true;
            self
        }

        fn calls(&self) -> Arc<Mutex<Vec<Vec<String>>>> {
            Arc::clone(&self.calls)
        }
    }

    #[async_trait]
    impl QuoteProvider for StubProvider {
        fn name(&self) -> &'static str {
            self.name
        }

        fn supports(&self, window: &QuoteWindow) -> bool {
            !self.live_only || matches!(window, QuoteWindow::Intraday(_))
        }

        async fn query(
            &self,
            symbols: &[String],
            _window: QuoteWindow,
        ) -> Result<HashMap<String, f64>> {
            self.calls.lock().unwrap().push(symbols.to_vec());
            if self.fail {
                return Err(anyhow!("stub offline"));
            }
            Ok(symbols
                .iter()
                .filter_map(|s| self.answers.get(s).map(|r| (s.clone(), *r)))
                .collect())
        }
    }

    fn symbols(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_cascade_falls_through_in_order() {
        let first = StubProvider::new("first", &[("600519.SS", 0.02)]);
        let second = StubProvider::new("second", &[("AAPL", -0.01)]);
        let third = StubProvider::new("third", &[("AAPL", 0.5)]);
        let third_calls = third.calls();

        let chain = QuoteChain::new(vec![Box::new(first), Box::new(second), Box::new(third)]);
        let changes = chain
            .fetch_changes(&symbols(&["600519.SS", "AAPL"]), INTRADAY, None)
            .await;

        assert_eq!(
            changes["600519.SS"].source,
            ChangeSource::Provider("first")
        );
        assert_eq!(changes["AAPL"].source, ChangeSource::Provider("second"));
        assert!((changes["AAPL"].ratio - (-0.01)).abs() < 1e-9);
        // Everything resolved upstream: the third source is never consulted.
        assert!(third_calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_exhausted_symbols_default_to_flagged_zero() {
        let first = StubProvider::new("first", &[]);
        let second = StubProvider::new("second", &[("AAPL", 0.0)]);

        let chain = QuoteChain::new(vec![Box::new(first), Box::new(second)]);
        let changes = chain
            .fetch_changes(&symbols(&["AAPL", "GHOST"]), INTRADAY, None)
            .await;

        let ghost = &changes["GHOST"];
        assert_eq!(ghost.ratio, 0.0);
        assert!(ghost.is_defaulted());

        // A genuine zero move from a source is not a default.
        let aapl = &changes["AAPL"];
        assert_eq!(aapl.ratio, 0.0);
        assert!(!aapl.is_defaulted());
        assert_eq!(aapl.source, ChangeSource::Provider("second"));
    }

    #[tokio::test]
    async fn test_provider_error_falls_through() {
        let first = StubProvider::new("first", &[("AAPL", 1.0)]).failing();
        let second = StubProvider::new("second", &[("AAPL", 0.03)]);

        let chain = QuoteChain::new(vec![Box::new(first), Box::new(second)]);
        let changes = chain
            .fetch_changes(&symbols(&["AAPL"]), INTRADAY, None)
            .await;

        assert_eq!(changes["AAPL"].source, ChangeSource::Provider("second"));
        assert!((changes["AAPL"].ratio - 0.03).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_historical_window_skips_live_sources() {
        let primary = StubProvider::new("primary", &[("600519.SS", 0.04)]);
        let live = StubProvider::new("live", &[("AAPL", 0.01)]).live_only();
        let live_calls = live.calls();

        let chain = QuoteChain::new(vec![Box::new(primary), Box::new(live)]);
        let target = chrono::NaiveDate::from_ymd_opt(2025, 6, 10).unwrap();
        let changes = chain
            .fetch_changes(
                &symbols(&["600519.SS", "AAPL"]),
                QuoteWindow::Historical(target),
                None,
            )
            .await;

        assert_eq!(
            changes["600519.SS"].source,
            ChangeSource::Provider("primary")
        );
        // The live feed never sees the historical request; the leftover
        // symbol defaults instead.
        assert!(live_calls.lock().unwrap().is_empty());
        assert!(changes["AAPL"].is_defaulted());
    }

    #[tokio::test]
    async fn test_requests_are_split_into_batches() {
        let answers: Vec<(String, f64)> = (0..5).map(|i| (format!("S{i}"), 0.01)).collect();
        let answer_refs: Vec<(&str, f64)> =
            answers.iter().map(|(s, r)| (s.as_str(), *r)).collect();
        let provider = StubProvider::new("only", &answer_refs);
        let calls = provider.calls();

        let chain = QuoteChain::new(vec![Box::new(provider)])
            .with_batch_size(2)
            .without_pacing();
        let requested: Vec<String> = (0..5).map(|i| format!("S{i}")).collect();
        let changes = chain.fetch_changes(&requested, INTRADAY, None).await;

        assert_eq!(changes.len(), 5);
        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 3);
        assert!(calls.iter().all(|batch| batch.len() <= 2));
    }

    #[tokio::test]
    async fn test_elapsed_deadline_defaults_everything() {
        let provider = StubProvider::new("only", &[("AAPL", 0.01)]);
        let calls = provider.calls();

        let chain = QuoteChain::new(vec![Box::new(provider)]);
        let deadline = Instant::now() - Duration::from_millis(1);
        let changes = chain
            .fetch_changes(&symbols(&["AAPL"]), INTRADAY, Some(deadline))
            .await;

        assert!(calls.lock().unwrap().is_empty());
        assert!(changes["AAPL"].is_defaulted());
    }

    #[tokio::test]
    async fn test_empty_request_yields_empty_result() {
        let chain = QuoteChain::new(vec![]);
        let changes = chain.fetch_changes(&[], INTRADAY, None).await;
        assert!(changes.is_empty());
    }
}
