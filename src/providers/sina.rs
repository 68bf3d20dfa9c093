use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use tracing::{debug, instrument};

use crate::quote_provider::{QuoteProvider, QuoteWindow};

const REQUEST_TIMEOUT_SECS: u64 = 15;

/// Live quote feed answering one combined request with
/// `var hq_str_<code>="field0,field1,…";` lines.
///
/// The payload is GBK-encoded, but every delimiter and numeric field is
/// plain ASCII, so a lossy UTF-8 view parses cleanly; only company names
/// mangle, and the parser never reads them.
pub struct SinaProvider {
    base_url: String,
    client: reqwest::Client,
}

impl SinaProvider {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent("Mozilla/5.0")
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(SinaProvider {
            base_url: base_url.to_string(),
            client,
        })
    }

    fn feed_code(symbol: &str) -> String {
        if let Some(code) = symbol.strip_suffix(".SS") {
            format!("sh{code}")
        } else if let Some(code) = symbol.strip_suffix(".SZ") {
            format!("sz{code}")
        } else if let Some(code) = symbol.strip_suffix(".HK") {
            format!("hk{code}")
        } else if let Some(code) = symbol.strip_suffix(".BJ") {
            format!("bj{code}")
        } else {
            format!("gb_{}", symbol.to_lowercase())
        }
    }
}

fn parse_feed(body: &str, requested: &HashMap<String, String>) -> HashMap<String, f64> {
    let mut changes = HashMap::new();
    for line in body.split(';') {
        let line = line.trim();
        let Some(rest) = line.strip_prefix("var hq_str_") else {
            continue;
        };
        let Some((code, value)) = rest.split_once('=') else {
            continue;
        };
        let Some(symbol) = requested.get(code) else {
            continue;
        };
        let data = value.trim().trim_matches('"');
        if data.is_empty() {
            continue;
        }
        let fields: Vec<&str> = data.split(',').collect();
        if let Some(change) = change_from_fields(code, &fields) {
            changes.insert(symbol.clone(), change);
        }
    }
    changes
}

// Field layout differs per market prefix; anything that does not parse
// leaves the symbol unresolved for the next source.
fn change_from_fields(code: &str, fields: &[&str]) -> Option<f64> {
    let field = |index: usize| fields.get(index).and_then(|s| s.trim().parse::<f64>().ok());

    let (latest, previous) = if code.starts_with("gb_") {
        let latest = field(1)?;
        let mut previous = field(26)?;
        if previous == 0.0 {
            // Overnight sessions zero out the regular previous-close field.
            previous = field(7)?;
        }
        (latest, previous)
    } else if code.starts_with("hk") {
        (field(6)?, field(3)?)
    } else {
        (field(3)?, field(2)?)
    };

    (previous > 0.0).then(|| (latest - previous) / previous)
}

#[async_trait]
impl QuoteProvider for SinaProvider {
    fn name(&self) -> &'static str {
        "sina"
    }

    fn supports(&self, window: &QuoteWindow) -> bool {
        matches!(window, QuoteWindow::Intraday(_))
    }

    #[instrument(name = "SinaBatch", skip(self, symbols), fields(count = symbols.len()))]
    async fn query(
        &self,
        symbols: &[String],
        _window: QuoteWindow,
    ) -> Result<HashMap<String, f64>> {
        let requested: HashMap<String, String> = symbols
            .iter()
            .map(|symbol| (Self::feed_code(symbol), symbol.clone()))
            .collect();
        let list = requested.keys().cloned().collect::<Vec<_>>().join(",");

        let url = format!("{}/list={}", self.base_url, list);
        debug!("Requesting quotes from {}", url);

        let response = self
            .client
            .get(&url)
            .header("Referer", "https://finance.sina.com.cn/")
            .send()
            .await
            .context("Quote request failed")?
            .error_for_status()
            .context("Quote request rejected")?;

        let body = response
            .bytes()
            .await
            .context("Failed to read quote response")?;
        Ok(parse_feed(&String::from_utf8_lossy(&body), &requested))
    }
}
