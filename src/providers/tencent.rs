use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use tracing::{debug, instrument};

use crate::quote_provider::{QuoteProvider, QuoteWindow};

const REQUEST_TIMEOUT_SECS: u64 = 15;

/// Live quote feed answering one combined request with
/// `v_<code>="field0~field1~…";` lines. Latest price and previous close sit
/// at the same indexes for every market.
pub struct TencentProvider {
    base_url: String,
    client: reqwest::Client,
}

impl TencentProvider {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent("Mozilla/5.0")
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(TencentProvider {
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
            format!("us{}", symbol.to_uppercase())
        }
    }
}

fn parse_feed(body: &str, requested: &HashMap<String, String>) -> HashMap<String, f64> {
    let mut changes = HashMap::new();
    for line in body.split(';') {
        let line = line.trim();
        let Some(rest) = line.strip_prefix("v_") else {
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
        let fields: Vec<&str> = data.split('~').collect();
        let latest = fields.get(3).and_then(|s| s.trim().parse::<f64>().ok());
        let previous = fields.get(4).and_then(|s| s.trim().parse::<f64>().ok());
        if let (Some(latest), Some(previous)) = (latest, previous)
            && previous > 0.0
        {
            changes.insert(symbol.clone(), (latest - previous) / previous);
        }
    }
    changes
}

#[async_trait]
impl QuoteProvider for TencentProvider {
    fn name(&self) -> &'static str {
        "tencent"
    }

    fn supports(&self, window: &QuoteWindow) -> bool {
        matches!(window, QuoteWindow::Intraday(_))
    }

    #[instrument(name = "TencentBatch", skip(self, symbols), fields(count = symbols.len()))]
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

        let url = format!("{}/q={}", self.base_url, list);
        debug!("Requesting quotes from {}", url);

        let response = self
            .client
            .get(&url)
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::CalculationMode;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn requested(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(code, symbol)| (code.to_string(), symbol.to_string()))
            .collect()
    }

    #[test]
    fn test_feed_code_mapping() {
        assert_eq!(TencentProvider::feed_code("600519.SS"), "sh600519");
        assert_eq!(TencentProvider::feed_code("000001.SZ"), "sz000001");
        assert_eq!(TencentProvider::feed_code("00700.HK"), "hk00700");
        assert_eq!(TencentProvider::feed_code("430047.BJ"), "bj430047");
        assert_eq!(TencentProvider::feed_code("aapl"), "usAAPL");
    }

    #[test]
    fn test_parse_quote_line() {
        let body = r#"v_sh600519="1~贵州茅台~600519~1717.00~1700.00~1680.00";"#;
        let changes = parse_feed(body, &requested(&[("sh600519", "600519.SS")]));

        let expected = (1717.0 - 1700.0) / 1700.0;
        assert!((changes["600519.SS"] - expected).abs() < 1e-9);
    }

    #[test]
    fn test_parse_multiple_lines() {
        let body = concat!(
            r#"v_sh600519="1~贵州茅台~600519~1717.00~1700.00";"#,
            "\n",
            r#"v_usAAPL="200~Apple~AAPL~151.50~150.00";"#,
        );
        let changes = parse_feed(
            body,
            &requested(&[("sh600519", "600519.SS"), ("usAAPL", "AAPL")]),
        );

        assert_eq!(changes.len(), 2);
        assert!((changes["AAPL"] - 0.01).abs() < 1e-9);
    }

    #[test]
    fn test_empty_and_short_lines_are_skipped() {
        let body = concat!(
            r#"v_sh600519="";"#,
            "\n",
            r#"v_sz000001="1~平安银行~000001";"#,
        );
        let changes = parse_feed(
            body,
            &requested(&[("sh600519", "600519.SS"), ("sz000001", "000001.SZ")]),
        );
        assert!(changes.is_empty());
    }

    #[test]
    fn test_zero_previous_close_is_unresolved() {
        let body = r#"v_sh600519="1~贵州茅台~600519~1717.00~0.00";"#;
        let changes = parse_feed(body, &requested(&[("sh600519", "600519.SS")]));
        assert!(changes.is_empty());
    }

    #[test]
    fn test_rejects_historical_window() {
        let provider = TencentProvider::new("http://example.invalid").unwrap();
        let target = chrono::NaiveDate::from_ymd_opt(2025, 6, 10).unwrap();
        assert!(!provider.supports(&QuoteWindow::Historical(target)));
    }

    #[tokio::test]
    async fn test_query_against_mock_feed() {
        let mock_server = MockServer::start().await;
        let body = r#"v_usAAPL="200~Apple~AAPL~151.50~150.00";"#;
        Mock::given(method("GET"))
            .and(path("/q=usAAPL"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&mock_server)
            .await;

        let provider = TencentProvider::new(&mock_server.uri()).unwrap();
        let changes = provider
            .query(
                &["AAPL".to_string()],
                QuoteWindow::Intraday(CalculationMode::CurrentDay),
            )
            .await
            .unwrap();

        assert!((changes["AAPL"] - 0.01).abs() < 1e-9);
    }
}
