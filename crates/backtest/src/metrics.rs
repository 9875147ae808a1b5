use ivspread_core::{EngineError, EngineResult};
use ivspread_signals::SpreadRow;
use serde::{Deserialize, Serialize};

const TRADING_DAYS: f64 = 252.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSummary {
    /// Final `cum_pnl` minus one.
    pub cumulative_return: f64,
    /// Annualized standard deviation of strategy returns.
    pub volatility: f64,
    pub sharpe_ratio: f64,
    /// Open plus close transitions of the signal series.
    pub n_trades: u32,
    /// Largest peak-to-trough fall of `cum_pnl`, as a fraction.
    pub max_drawdown: f64,
    pub n_rows: usize,
    pub current_signal: u8,
    pub current_position_size: f64,
    pub current_spread_iv: f64,
    pub current_z_short: Option<f64>,
    pub current_z_long: Option<f64>,
}

/// Turns sized rows into strategy returns and summary statistics.
#[derive(Debug, Clone, Copy, Default)]
pub struct PerformanceEvaluator;

impl PerformanceEvaluator {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Fills `underlying_return`, `strategy_return` and `cum_pnl` on every row
    /// and summarizes the result.
    ///
    /// The first row has no prior price: its return is 0 and it is left out
    /// of the volatility and Sharpe statistics.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::ComputationIndeterminate` for an empty series.
    pub fn evaluate(&self, rows: &mut [SpreadRow]) -> EngineResult<PerformanceSummary> {
        if rows.is_empty() {
            return Err(EngineError::ComputationIndeterminate(
                "no rows to evaluate".to_string(),
            ));
        }

        let mut previous_price: Option<f64> = None;
        let mut cum_pnl = 1.0;
        for row in rows.iter_mut() {
            row.underlying_return = match previous_price {
                Some(prev) if prev > 0.0 && row.underlying.is_finite() => {
                    row.underlying / prev - 1.0
                }
                _ => 0.0,
            };
            row.strategy_return = row.position_size * row.underlying_return;
            cum_pnl *= 1.0 + row.strategy_return;
            row.cum_pnl = cum_pnl;
            previous_price = Some(row.underlying);
        }

        let returns: Vec<f64> = rows.iter().skip(1).map(|r| r.strategy_return).collect();
        let (mean, std) = mean_and_sample_std(&returns);
        let volatility = std.map_or(0.0, |s| s * TRADING_DAYS.sqrt());
        let sharpe_ratio = match (mean, std) {
            (Some(m), Some(s)) if s > f64::EPSILON => m / s * TRADING_DAYS.sqrt(),
            _ => 0.0,
        };

        let n_trades = rows
            .windows(2)
            .map(|pair| u32::from(pair[0].signal != pair[1].signal))
            .sum();

        let last = &rows[rows.len() - 1];
        Ok(PerformanceSummary {
            cumulative_return: last.cum_pnl - 1.0,
            volatility,
            sharpe_ratio,
            n_trades,
            max_drawdown: max_drawdown(rows.iter().map(|r| r.cum_pnl)),
            n_rows: rows.len(),
            current_signal: last.signal,
            current_position_size: last.position_size,
            current_spread_iv: last.spread_iv,
            current_z_short: last.z_short,
            current_z_long: last.z_long,
        })
    }
}

fn mean_and_sample_std(values: &[f64]) -> (Option<f64>, Option<f64>) {
    if values.is_empty() {
        return (None, None);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    if values.len() < 2 {
        return (Some(mean), None);
    }
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    (Some(mean), Some(variance.sqrt()))
}

fn max_drawdown(equity: impl Iterator<Item = f64>) -> f64 {
    let mut peak = 1.0_f64;
    let mut max_drawdown = 0.0_f64;

    for value in equity {
        if value > peak {
            peak = value;
        }
        if peak > 0.0 {
            max_drawdown = max_drawdown.max((peak - value) / peak);
        }
    }

    max_drawdown
}
