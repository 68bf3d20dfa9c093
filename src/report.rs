//! Terminal rendering of valuation results.

use chrono::{DateTime, Utc};
use chrono_tz::Asia::Shanghai;
use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Attribute, Cell, CellAlignment, Color, ContentArrangement, Table};
use console::style;
use std::collections::HashMap;

use crate::engine::{EstimateResult, RequestMode, WeightBucket};
use crate::quote_provider::ChangeSource;
use crate::session::CalculationMode;
use crate::ticker::MarketGroup;

pub fn render(result: &EstimateResult) -> String {
    render_at(result, Utc::now())
}

fn render_at(result: &EstimateResult, now: DateTime<Utc>) -> String {
    let mut output = String::new();

    let headline = format!("{:+.4}%", result.estimated_change * 100.0);
    let styled_headline = if result.estimated_change >= 0.0 {
        style(&headline).green().bold()
    } else {
        style(&headline).red().bold()
    };
    output.push_str(&format!(
        "Estimated NAV change: {styled_headline}\n"
    ));

    let mode_line = match result.mode {
        RequestMode::Realtime => match result.calc_mode {
            CalculationMode::CurrentDay => "realtime (today's sessions)".to_string(),
            CalculationMode::PreviousDay => "realtime (previous session recap)".to_string(),
        },
        RequestMode::Review { target } => format!("review of {target}"),
    };
    let update_time = now.with_timezone(&Shanghai).format("%Y-%m-%d %H:%M:%S");
    output.push_str(&format!("Mode: {mode_line}\n"));
    output.push_str(&format!("Updated: {update_time} (Beijing)\n\n"));

    output.push_str(&format!(
        "Equity weight covered: {}\n",
        format_pct(result.total_weight)
    ));
    output.push_str(&format!(
        "  - calculated: {} ({})\n",
        format_pct(result.buckets.calculated_total()),
        format_market_weights(&result.buckets.calculated)
    ));
    output.push_str(&format!(
        "  - failed:     {} ({})\n",
        format_pct(result.buckets.failed_total()),
        format_market_weights(&result.buckets.failed)
    ));
    if result.buckets.inactive_total() > 0.0 {
        output.push_str(&format!(
            "  - not open:   {} ({})\n",
            format_pct(result.buckets.inactive_total()),
            format_market_weights(&result.buckets.inactive)
        ));
    }
    if result.dropped_rows > 0 {
        output.push_str(&format!(
            "{}\n",
            style(format!(
                "Dropped {} holdings rows with invalid data",
                result.dropped_rows
            ))
            .yellow()
        ));
    }

    output.push('\n');
    output.push_str(&holdings_table(result).to_string());
    output
}

fn holdings_table(result: &EstimateResult) -> Table {
    let mut table = new_styled_table();
    table.set_header(vec![
        header_cell("Company"),
        header_cell("Symbol"),
        header_cell("Market"),
        header_cell("Weight"),
        header_cell("Session"),
        header_cell("Change"),
        header_cell("Source"),
    ]);

    for holding in &result.holdings {
        let change_cell = match holding.change {
            Some(change) if holding.bucket == WeightBucket::Calculated => {
                let text = format!("{:+.2}%", change * 100.0);
                let color = if change >= 0.0 {
                    Color::Green
                } else {
                    Color::Red
                };
                Cell::new(text).fg(color).set_alignment(CellAlignment::Right)
            }
            _ => Cell::new("N/A")
                .fg(Color::DarkGrey)
                .set_alignment(CellAlignment::Right),
        };
        let source = match &holding.source {
            Some(ChangeSource::Provider(name)) => Cell::new(*name),
            Some(ChangeSource::Defaulted) => Cell::new("defaulted").fg(Color::Red),
            None => Cell::new("-").fg(Color::DarkGrey),
        };

        table.add_row(vec![
            Cell::new(&holding.company),
            Cell::new(&holding.symbol),
            Cell::new(holding.market.to_string()),
            Cell::new(format_pct(holding.weight)).set_alignment(CellAlignment::Right),
            Cell::new(holding.session.to_string()),
            change_cell,
            source,
        ]);
    }
    table
}

fn new_styled_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

fn header_cell(text: &str) -> Cell {
    Cell::new(text)
        .fg(Color::Cyan)
        .add_attribute(Attribute::Bold)
}

fn format_pct(fraction: f64) -> String {
    format!("{:.2}%", fraction * 100.0)
}

fn format_market_weights(weights: &HashMap<MarketGroup, f64>) -> String {
    let mut entries: Vec<(&MarketGroup, &f64)> =
        weights.iter().filter(|(_, w)| **w > 0.0).collect();
    if entries.is_empty() {
        return "0.00%".to_string();
    }
    entries.sort_by_key(|(market, _)| **market);
    entries
        .iter()
        .map(|(market, weight)| format!("{market}: {}", format_pct(**weight)))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{HoldingDetail, WeightBuckets};
    use crate::session::SessionState;

    #[test]
    fn test_render_includes_headline_and_buckets() {
        let mut buckets = WeightBuckets::default();
        buckets.calculated.insert(MarketGroup::AShare, 0.6);
        buckets.failed.insert(MarketGroup::Us, 0.2);

        let result = EstimateResult {
            estimated_change: 0.008,
            total_weight: 0.8,
            buckets,
            holdings: vec![HoldingDetail {
                company: "Moutai".to_string(),
                symbol: "600519.SS".to_string(),
                market: MarketGroup::AShare,
                weight: 0.6,
                session: SessionState::Open,
                change: Some(0.02),
                source: Some(ChangeSource::Provider("yahoo")),
                bucket: WeightBucket::Calculated,
            }],
            dropped_rows: 1,
            mode: RequestMode::Realtime,
            calc_mode: CalculationMode::CurrentDay,
        };

        let text = render(&result);
        assert!(text.contains("+0.8000%"));
        assert!(text.contains("A-share: 60.00%"));
        assert!(text.contains("US: 20.00%"));
        assert!(text.contains("600519.SS"));
        assert!(text.contains("Dropped 1 holdings rows"));
    }

    #[test]
    fn test_market_weights_are_sorted_and_filtered() {
        let mut weights = HashMap::new();
        weights.insert(MarketGroup::Us, 0.2);
        weights.insert(MarketGroup::AShare, 0.5);
        weights.insert(MarketGroup::HongKong, 0.0);

        assert_eq!(
            format_market_weights(&weights),
            "A-share: 50.00%, US: 20.00%"
        );
        assert_eq!(format_market_weights(&HashMap::new()), "0.00%");
    }
}
