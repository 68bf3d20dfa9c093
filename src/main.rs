use anyhow::{Context, Result, bail};
use chrono::{NaiveDate, Utc};
use clap::{CommandFactory, Parser, Subcommand};
use navcast::log::init_logging;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to optional configuration file
    #[arg(short, long, global = true)]
    config_path: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create default configuration
    Setup,
    /// Estimate a fund's NAV change right now
    Estimate {
        /// Fund code whose holdings disclosure to value
        fund: String,
    },
    /// Reconstruct a fund's NAV change for a past trading day
    Review {
        /// Fund code whose holdings disclosure to value
        fund: String,
        /// Trading date to reconstruct (YYYY-MM-DD)
        #[arg(long)]
        date: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let result = match cli.command {
        Some(Commands::Setup) => setup(),
        Some(Commands::Estimate { fund }) => {
            navcast::run_command(
                navcast::AppCommand::Estimate { fund },
                cli.config_path.as_deref(),
            )
            .await
        }
        Some(Commands::Review { fund, date }) => {
            match parse_review_date(&date, Utc::now().date_naive()) {
                Ok(date) => {
                    navcast::run_command(
                        navcast::AppCommand::Review { fund, date },
                        cli.config_path.as_deref(),
                    )
                    .await
                }
                Err(e) => Err(e),
            }
        }
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "Application failed");
    }
    result
}

fn parse_review_date(input: &str, today: NaiveDate) -> Result<NaiveDate> {
    let date = NaiveDate::parse_from_str(input.trim(), "%Y-%m-%d")
        .with_context(|| format!("Invalid date '{input}'; use YYYY-MM-DD"))?;
    if date > today {
        bail!("Cannot review a future date");
    }
    if (today - date).num_days() > 365 {
        bail!("Review dates older than one year rarely have quote data; pick a recent date");
    }
    Ok(date)
}

fn setup() -> anyhow::Result<()> {
    let path = navcast::config::AppConfig::default_config_path()?;

    if path.exists() {
        anyhow::bail!("Configuration file already exists at {}", path.display());
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    let default_config = r#"---
# Directory with one <fund_code>.csv holdings disclosure per fund.
holdings_dir: "fund_holdings"

providers:
  yahoo:
    base_url: "https://query1.finance.yahoo.com"
  sina:
    base_url: "https://hq.sinajs.cn"
  tencent:
    base_url: "http://qt.gtimg.cn"
"#;

    std::fs::write(&path, default_config)
        .with_context(|| format!("Failed to write config file to {}", path.display()))?;

    tracing::info!("Created default configuration at {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_review_date() {
        let today = NaiveDate::from_ymd_opt(2026, 8, 7).unwrap();

        let parsed = parse_review_date("2026-08-05", today).unwrap();
        assert_eq!(parsed, NaiveDate::from_ymd_opt(2026, 8, 5).unwrap());

        assert!(parse_review_date("2026-08-08", today).is_err());
        assert!(parse_review_date("2025-01-01", today).is_err());
        assert!(parse_review_date("08/05/2026", today).is_err());
        assert!(parse_review_date("", today).is_err());
    }
}
