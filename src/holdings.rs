//! Disclosed fund holdings as published in portfolio reports.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

/// One row of a holdings disclosure. The weight stays optional here: a
/// malformed percentage drops the row during valuation instead of aborting
/// the run.
#[derive(Debug, Clone)]
pub struct HoldingRow {
    pub company: String,
    pub security_code: String,
    pub weight_pct: Option<f64>,
}

impl HoldingRow {
    pub fn new(company: &str, security_code: &str, weight_pct: f64) -> Self {
        HoldingRow {
            company: company.to_string(),
            security_code: security_code.to_string(),
            weight_pct: Some(weight_pct),
        }
    }
}

// Column layout funds publish: company name, security code, percent of net
// asset value.
#[derive(Debug, Deserialize)]
struct CsvRecord {
    #[serde(rename = "公司名称")]
    company: String,
    #[serde(rename = "证券代码")]
    security_code: String,
    #[serde(rename = "占基金资产净值比例(%)")]
    weight_pct: String,
}

/// Reads a holdings disclosure CSV. A missing file or a structurally broken
/// sheet is an error; a row with an unparseable weight is kept with
/// `weight_pct: None` for the engine to drop and count.
pub fn load_csv<P: AsRef<Path>>(path: P) -> Result<Vec<HoldingRow>> {
    let path = path.as_ref();
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("Failed to read holdings file: {}", path.display()))?;

    let mut rows = Vec::new();
    for record in reader.deserialize() {
        let record: CsvRecord =
            record.with_context(|| format!("Malformed holdings file: {}", path.display()))?;
        rows.push(HoldingRow {
            company: record.company.trim().to_string(),
            security_code: record.security_code.trim().to_string(),
            weight_pct: record.weight_pct.trim().parse().ok(),
        });
    }
    Ok(rows)
}
