//! Per-row spread statistics and the batch pipeline.

use chrono::{DateTime, Utc};
use ivspread_core::{SpreadSeed, StrategyParameters};
use serde::{Deserialize, Serialize};

use crate::generator::SignalGenerator;
use crate::peaks::find_peaks;
use crate::rolling::{diff, rolling_mean, rolling_zscore};
use crate::sizing::PositionSizer;

/// One timestamp of the spread series with every derived column.
///
/// Rolling values are `None` until their window is full, or when the
/// statistic is undefined (zero standard deviation).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpreadRow {
    pub timestamp: DateTime<Utc>,
    pub put25_iv: f64,
    pub call25_iv: f64,
    pub underlying: f64,
    pub spread_iv: f64,
    pub spread_diff: Option<f64>,
    pub accel: Option<f64>,
    pub ma_short: Option<f64>,
    pub ma_long: Option<f64>,
    pub z_short: Option<f64>,
    pub z_long: Option<f64>,
    pub is_peak: bool,
    /// Raw compound condition at this row, before the one-step lag.
    pub trigger: bool,
    /// 0 or 1, equal to the previous row's trigger.
    pub signal: u8,
    pub position_size: f64,
    pub underlying_return: f64,
    pub strategy_return: f64,
    pub cum_pnl: f64,
}

impl SpreadRow {
    fn from_seed(seed: &SpreadSeed) -> Self {
        Self {
            timestamp: seed.timestamp,
            put25_iv: seed.put25_iv,
            call25_iv: seed.call25_iv,
            underlying: seed.underlying,
            spread_iv: seed.put25_iv - seed.call25_iv,
            spread_diff: None,
            accel: None,
            ma_short: None,
            ma_long: None,
            z_short: None,
            z_long: None,
            is_peak: false,
            trigger: false,
            signal: 0,
            position_size: 0.0,
            underlying_return: 0.0,
            strategy_return: 0.0,
            cum_pnl: 1.0,
        }
    }
}

/// Turns an ordered seed series into fully populated rows.
///
/// The same routine serves backtests over a full history and the live
/// adapter over its sliding buffer.
#[derive(Debug, Clone)]
pub struct SpreadMetricsEngine {
    params: StrategyParameters,
}

impl SpreadMetricsEngine {
    #[must_use]
    pub fn new(params: StrategyParameters) -> Self {
        Self { params }
    }

    #[must_use]
    pub fn params(&self) -> &StrategyParameters {
        &self.params
    }

    /// Spread statistics only: no trigger, signal or size.
    #[must_use]
    pub fn metrics(&self, seeds: &[SpreadSeed]) -> Vec<SpreadRow> {
        let mut rows: Vec<SpreadRow> = seeds.iter().map(SpreadRow::from_seed).collect();
        let spread: Vec<f64> = rows.iter().map(|r| r.spread_iv).collect();

        let spread_opt: Vec<Option<f64>> = spread.iter().copied().map(Some).collect();
        let spread_diff = diff(&spread_opt);
        let accel = diff(&spread_diff);
        let ma_short = rolling_mean(&spread, self.params.short_window);
        let ma_long = rolling_mean(&spread, self.params.long_window);
        let z_short = rolling_zscore(&spread, self.params.short_z_window);
        let z_long = rolling_zscore(&spread, self.params.long_z_window);
        let peaks = find_peaks(&spread, self.params.peak_min_distance);

        for (i, row) in rows.iter_mut().enumerate() {
            row.spread_diff = spread_diff[i];
            row.accel = accel[i];
            row.ma_short = ma_short[i];
            row.ma_long = ma_long[i];
            row.z_short = z_short[i];
            row.z_long = z_long[i];
            row.is_peak = peaks[i];
        }

        rows
    }

    /// Metrics, then the lagged signal, then the position size.
    #[must_use]
    pub fn compute(&self, seeds: &[SpreadSeed]) -> Vec<SpreadRow> {
        let mut rows = self.metrics(seeds);
        SignalGenerator::new(&self.params).apply(&mut rows);
        PositionSizer::new(&self.params).apply(&mut rows);
        rows
    }
}
