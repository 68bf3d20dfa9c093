pub mod chain;
pub mod config;
pub mod engine;
pub mod holdings;
pub mod log;
pub mod providers;
pub mod quote_provider;
pub mod report;
pub mod session;
pub mod ticker;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use std::time::Duration;
use tracing::{debug, info};

use crate::chain::QuoteChain;
use crate::engine::{Estimator, RequestMode};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppCommand {
    /// Estimate a fund's NAV change against the live sessions.
    Estimate { fund: String },
    /// Reconstruct a fund's NAV change for a past trading day.
    Review { fund: String, date: NaiveDate },
}

pub async fn run_command(command: AppCommand, config_path: Option<&str>) -> Result<()> {
    info!("Fund NAV estimator starting...");

    let config = match config_path {
        Some(path) => config::AppConfig::load_from_path(path)?,
        None => config::AppConfig::load()?,
    };
    debug!("Loaded config: {config:#?}");

    let (fund, mode) = match command {
        AppCommand::Estimate { fund } => (fund, RequestMode::Realtime),
        AppCommand::Review { fund, date } => (fund, RequestMode::Review { target: date }),
    };

    let holdings_path = config.holdings_dir.join(format!("{fund}.csv"));
    let rows = holdings::load_csv(&holdings_path)
        .with_context(|| format!("No holdings data for fund {fund}"))?;
    info!(fund = %fund, rows = rows.len(), "loaded holdings disclosure");

    let estimator = Estimator::new(build_chain(&config.providers)?);

    let spinner = indicatif::ProgressBar::new_spinner();
    spinner.set_message("Fetching quotes...");
    spinner.enable_steady_tick(Duration::from_millis(120));
    let result = estimator.evaluate(&rows, mode).await;
    spinner.finish_and_clear();

    println!("{}", report::render(&result?));
    Ok(())
}

/// The provider cascade in resolution order: the chart/batch source first,
/// then the two live feeds.
pub fn build_chain(providers: &config::ProvidersConfig) -> Result<QuoteChain> {
    Ok(QuoteChain::new(vec![
        Box::new(providers::yahoo::YahooProvider::new(
            providers.yahoo_base_url(),
        )?),
        Box::new(providers::sina::SinaProvider::new(
            providers.sina_base_url(),
        )?),
        Box::new(providers::tencent::TencentProvider::new(
            providers.tencent_base_url(),
        )?),
    ]))
}
