#![allow(clippy::format_push_string)]

use crate::engine::BacktestReport;

const HEAVY_RULE: &str = "═══════════════════════════════════════════════════════════════\n";
const LIGHT_RULE: &str = "───────────────────────────────────────────────────────────────\n";

fn optional(value: Option<f64>) -> String {
    value.map_or_else(|| "N/A".to_string(), |v| format!("{v:.4}"))
}

pub struct SummaryFormatter;

impl SummaryFormatter {
    #[must_use]
    pub fn format(report: &BacktestReport) -> String {
        let summary = &report.summary;
        let mut output = String::new();

        output.push('\n');
        output.push_str(HEAVY_RULE);
        output.push_str("                 IV SPREAD STRATEGY SUMMARY                    \n");
        output.push_str(HEAVY_RULE);
        output.push('\n');

        if let (Some(first), Some(last)) = (report.rows.first(), report.rows.last()) {
            output.push_str("Time Period\n");
            output.push_str(LIGHT_RULE);
            output.push_str(&format!(
                "Start:                 {}\n",
                first.timestamp.format("%Y-%m-%d %H:%M:%S UTC")
            ));
            output.push_str(&format!(
                "End:                   {}\n",
                last.timestamp.format("%Y-%m-%d %H:%M:%S UTC")
            ));
            output.push_str(&format!("Rows:                  {}\n", summary.n_rows));
            output.push('\n');
        }

        output.push_str("Performance\n");
        output.push_str(LIGHT_RULE);
        output.push_str(&format!(
            "Cumulative Return:     {:.2}%\n",
            summary.cumulative_return * 100.0
        ));
        output.push_str(&format!(
            "Annualized Volatility: {:.2}%\n",
            summary.volatility * 100.0
        ));
        output.push_str(&format!("Sharpe Ratio:          {:.4}\n", summary.sharpe_ratio));
        output.push_str(&format!(
            "Max Drawdown:          {:.2}%\n",
            summary.max_drawdown * 100.0
        ));
        output.push_str(&format!("Number of Trades:      {}\n", summary.n_trades));
        output.push('\n');

        output.push_str("Current State\n");
        output.push_str(LIGHT_RULE);
        let signal = if summary.current_signal == 1 { "LONG" } else { "FLAT" };
        output.push_str(&format!("Signal:                {signal}\n"));
        output.push_str(&format!(
            "Position Size:         {:.4}\n",
            summary.current_position_size
        ));
        output.push_str(&format!(
            "Spread IV:             {:.4}\n",
            summary.current_spread_iv
        ));
        output.push_str(&format!(
            "Z-Score (short):       {}\n",
            optional(summary.current_z_short)
        ));
        output.push_str(&format!(
            "Z-Score (long):        {}\n",
            optional(summary.current_z_long)
        ));

        output.push('\n');
        output.push_str(HEAVY_RULE);

        if summary.n_trades == 0 {
            output.push_str("\n⚠️  No signals fired during this backtest.\n");
            output.push_str("    Consider a longer history or looser thresholds.\n\n");
        }

        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::run_backtest;
    use crate::synthetic::{SyntheticConfig, SyntheticIvGenerator};
    use ivspread_core::StrategyParameters;

    #[test]
    fn test_format_contains_sections() {
        let samples = SyntheticIvGenerator::new(SyntheticConfig::default().with_rows(300)).generate();
        let report = run_backtest(&samples, &StrategyParameters::default()).unwrap();
        let text = SummaryFormatter::format(&report);

        assert!(text.contains("IV SPREAD STRATEGY SUMMARY"));
        assert!(text.contains("Sharpe Ratio:"));
        assert!(text.contains("Number of Trades:"));
        assert!(text.contains("Rows:                  300"));
    }

    #[test]
    fn test_short_history_warns_and_shows_missing_zscores() {
        let samples = SyntheticIvGenerator::new(SyntheticConfig::default().with_rows(5)).generate();
        let report = run_backtest(&samples, &StrategyParameters::default()).unwrap();
        let text = SummaryFormatter::format(&report);

        assert!(text.contains("Signal:                FLAT"));
        assert!(text.contains("Z-Score (long):        N/A"));
        assert!(text.contains("No signals fired"));
    }
}
