//! Output formatting module for CLI display
//!
//! Terminal output formatting, kept apart from the computation paths.

use colored::Colorize;
use rust_decimal::Decimal;
use tabled::{
    settings::{object::Columns, Alignment, Style},
    Table, Tabled,
};

use crate::db::CashFlowEvent;
use crate::engine::{BatchReport, ScanReport, UnitReturn};

fn fmt_amount(value: Decimal) -> String {
    let formatted = format!("{:.2}", value.abs());
    let parts: Vec<&str> = formatted.split('.').collect();
    let integer_part = parts[0];
    let decimal_part = parts.get(1).unwrap_or(&"00");

    let with_separators: String = integer_part
        .chars()
        .rev()
        .enumerate()
        .flat_map(|(i, c)| {
            if i > 0 && i % 3 == 0 {
                vec![',', c]
            } else {
                vec![c]
            }
        })
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();

    let sign = if value < Decimal::ZERO { "-" } else { "" };
    format!("{}{}.{}", sign, with_separators, decimal_part)
}

fn fmt_pct(value: Option<Decimal>) -> String {
    match value {
        Some(p) => format!("{:.2}%", p),
        None => "n/a".to_string(),
    }
}

/// Format a single unit's return for terminal output
pub fn format_unit_return(result: &UnitReturn) -> String {
    let pct = match result.payload.return_pct {
        Some(p) if p >= Decimal::ZERO => fmt_pct(Some(p)).red().bold().to_string(),
        Some(p) => fmt_pct(Some(p)).green().bold().to_string(),
        None => "n/a (no positive base asset)".dimmed().to_string(),
    };

    let mut output = String::new();
    output.push_str(&format!(
        "\n{} [{}] {} -> {}\n\n",
        result.payload.unit.cyan().bold(),
        result.source,
        result.payload.prev_trade_date,
        result.payload.trade_date,
    ));
    output.push_str(&format!("  daily return     {}\n", pct));
    output.push_str(&format!(
        "  total asset      {}  (prev {})\n",
        fmt_amount(result.payload.total_asset_today),
        fmt_amount(result.payload.total_asset_yesterday),
    ));
    output.push_str(&format!(
        "  net flow         {}\n",
        fmt_amount(result.payload.net_flow)
    ));
    if let Some(benchmark) = result.payload.benchmark_return {
        output.push_str(&format!("  benchmark        {}\n", fmt_pct(Some(benchmark))));
    }
    output.push_str(&format!(
        "  computed at      {}{}\n",
        result.computed_at.format("%Y-%m-%d %H:%M:%S"),
        if result.from_cache { " (cached)" } else { "" },
    ));
    output
}

#[derive(Tabled)]
struct ReturnRow {
    #[tabled(rename = "Unit")]
    unit: String,
    #[tabled(rename = "Return")]
    return_pct: String,
    #[tabled(rename = "Total Asset")]
    total_asset: String,
    #[tabled(rename = "Prev Asset")]
    prev_asset: String,
    #[tabled(rename = "Net Flow")]
    net_flow: String,
}

/// Format a whole-source batch report as a table plus failure notes
pub fn format_batch_report(report: &BatchReport) -> String {
    let mut output = String::new();
    output.push_str(&format!(
        "\n{} [{}] {} -> {}\n\n",
        "Daily returns".cyan().bold(),
        report.source,
        report.prev_trade_date,
        report.trade_date,
    ));

    if report.succeeded.is_empty() {
        output.push_str("  No units with data.\n");
    } else {
        let rows: Vec<ReturnRow> = report
            .succeeded
            .iter()
            .map(|r| ReturnRow {
                unit: r.payload.unit.clone(),
                return_pct: fmt_pct(r.payload.return_pct),
                total_asset: fmt_amount(r.payload.total_asset_today),
                prev_asset: fmt_amount(r.payload.total_asset_yesterday),
                net_flow: fmt_amount(r.payload.net_flow),
            })
            .collect();

        let mut table = Table::new(rows);
        table
            .with(Style::rounded())
            .modify(Columns::new(1..), Alignment::right());
        output.push_str(&table.to_string());
        output.push('\n');
    }

    for failure in &report.failed {
        output.push_str(&format!(
            "  {} {}: {}\n",
            "skipped".yellow(),
            failure.unit,
            failure.reason
        ));
    }
    for file in &report.skipped_files {
        output.push_str(&format!("  {} {}\n", "unreadable".yellow(), file));
    }

    output
}

#[derive(Tabled)]
struct FlowRow {
    #[tabled(rename = "Date")]
    date: String,
    #[tabled(rename = "Type")]
    flow_type: String,
    #[tabled(rename = "Amount")]
    amount: String,
    #[tabled(rename = "Note")]
    note: String,
}

/// Format a unit's ledger rows
pub fn format_flows(unit: &str, flows: &[CashFlowEvent]) -> String {
    if flows.is_empty() {
        return format!("No cash flows recorded for {}.\n", unit);
    }

    let rows: Vec<FlowRow> = flows
        .iter()
        .map(|f| FlowRow {
            date: f.flow_date.to_string(),
            flow_type: f.flow_type.as_str().to_string(),
            amount: fmt_amount(f.amount),
            note: f.note.clone().unwrap_or_default(),
        })
        .collect();

    let mut table = Table::new(rows);
    table
        .with(Style::rounded())
        .modify(Columns::one(2), Alignment::right());
    format!("\n{}\n{}\n", unit.cyan().bold(), table)
}

/// Format a scan report: which files would feed a computation right now
pub fn format_scan_report(report: &ScanReport) -> String {
    let mut output = String::new();
    let Some(date) = report.date else {
        return format!("No export data found for source '{}'.\n", report.source);
    };

    output.push_str(&format!(
        "\n{} [{}] trading date {}\n\n",
        "Export scan".cyan().bold(),
        report.source,
        date
    ));

    match &report.unit_asset {
        Some(f) => output.push_str(&format!(
            "  unit assets      {} ({} rows, {})\n",
            f.path, f.rows, f.timestamp
        )),
        None => output.push_str("  unit assets      none\n"),
    }
    match &report.futures_asset {
        Some(f) => output.push_str(&format!(
            "  futures assets   {} ({} rows, {})\n",
            f.path, f.rows, f.timestamp
        )),
        None => output.push_str("  futures assets   none\n"),
    }

    for p in &report.positions {
        output.push_str(&format!(
            "  positions        {} {} ({} rows, {})\n",
            p.product, p.path, p.rows, p.timestamp
        ));
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_amount_grouping() {
        assert_eq!(fmt_amount(dec!(1234567.891)), "1,234,567.89");
        assert_eq!(fmt_amount(dec!(-40000)), "-40,000.00");
        assert_eq!(fmt_amount(dec!(0)), "0.00");
    }

    #[test]
    fn test_pct_none_is_na() {
        assert_eq!(fmt_pct(None), "n/a");
        assert_eq!(fmt_pct(Some(dec!(1))), "1.00%");
    }
}
