//! Compound entry rule and the one-step lag.

use ivspread_core::StrategyParameters;

use crate::metrics::SpreadRow;

/// Evaluates the raw trigger per row and emits `signal(t) = trigger(t - 1)`.
#[derive(Debug, Clone)]
pub struct SignalGenerator {
    warmup: usize,
    ma_tolerance: f64,
    z_thresh_short: f64,
    z_thresh_long: f64,
    accel_thresh: f64,
}

impl SignalGenerator {
    #[must_use]
    pub fn new(params: &StrategyParameters) -> Self {
        Self {
            warmup: params.signal_warmup(),
            ma_tolerance: params.ma_tolerance,
            z_thresh_short: params.z_thresh_short,
            z_thresh_long: params.z_thresh_long,
            accel_thresh: params.accel_thresh,
        }
    }

    /// Raw condition for a single row.
    ///
    /// Missing statistics count as "not satisfied". Callers gate on the
    /// warmup before relying on this.
    #[must_use]
    pub fn trigger(&self, row: &SpreadRow) -> bool {
        if !row.is_peak {
            return false;
        }

        let trend = match (row.ma_short, row.ma_long) {
            (Some(short), Some(long)) => short >= long - self.ma_tolerance,
            _ => false,
        };

        let z_branch = matches!(
            (row.z_short, row.z_long),
            (Some(zs), Some(zl)) if zs > self.z_thresh_short && zl > self.z_thresh_long
        );
        let accel_branch = row.accel.is_some_and(|a| a > self.accel_thresh);

        trend && (z_branch || accel_branch)
    }

    /// Fills `trigger` and `signal` on every row.
    pub fn apply(&self, rows: &mut [SpreadRow]) {
        let mut previous = false;
        for (i, row) in rows.iter_mut().enumerate() {
            row.signal = u8::from(previous);
            row.trigger = i + 1 >= self.warmup && self.trigger(row);
            previous = row.trigger;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn row() -> SpreadRow {
        SpreadRow {
            timestamp: Utc.with_ymd_and_hms(2025, 3, 3, 14, 30, 0).unwrap(),
            put25_iv: 0.30,
            call25_iv: 0.20,
            underlying: 230.0,
            spread_iv: 0.10,
            spread_diff: Some(0.01),
            accel: Some(0.0),
            ma_short: Some(0.09),
            ma_long: Some(0.08),
            z_short: Some(1.5),
            z_long: Some(0.8),
            is_peak: true,
            trigger: false,
            signal: 0,
            position_size: 0.0,
            underlying_return: 0.0,
            strategy_return: 0.0,
            cum_pnl: 1.0,
        }
    }

    fn generator() -> SignalGenerator {
        SignalGenerator::new(&StrategyParameters::default())
    }

    #[test]
    fn z_branch_fires_on_peak_with_trend() {
        assert!(generator().trigger(&row()));
    }

    #[test]
    fn accel_branch_substitutes_for_z_scores() {
        let r = SpreadRow {
            z_short: None,
            z_long: None,
            accel: Some(0.002),
            ..row()
        };
        assert!(generator().trigger(&r));
    }

    #[test]
    fn no_peak_no_trigger() {
        let r = SpreadRow {
            is_peak: false,
            ..row()
        };
        assert!(!generator().trigger(&r));
    }

    #[test]
    fn short_ma_may_sit_within_tolerance_below_long() {
        let r = SpreadRow {
            ma_short: Some(0.07),
            ma_long: Some(0.08),
            ..row()
        };
        // The exact boundary depends on float rounding.
        let below = SpreadRow {
            ma_short: Some(0.0699),
            ..r.clone()
        };
        assert!(!generator().trigger(&below));
        let above = SpreadRow {
            ma_short: Some(0.0701),
            ..r
        };
        assert!(generator().trigger(&above));
    }

    #[test]
    fn undefined_z_scores_do_not_trigger() {
        let r = SpreadRow {
            z_short: None,
            ..row()
        };
        assert!(!generator().trigger(&r));
    }

    #[test]
    fn z_thresholds_are_strict() {
        let r = SpreadRow {
            z_short: Some(1.0),
            ..row()
        };
        assert!(!generator().trigger(&r));
    }

    #[test]
    fn signal_lags_trigger_by_one_row() {
        let params = StrategyParameters {
            short_window: 1,
            long_window: 1,
            short_z_window: 2,
            long_z_window: 2,
            ..StrategyParameters::default()
        };
        let mut rows: Vec<SpreadRow> = (0..5)
            .map(|i| SpreadRow {
                is_peak: i == 2,
                ..row()
            })
            .collect();
        SignalGenerator::new(&params).apply(&mut rows);

        let triggers: Vec<bool> = rows.iter().map(|r| r.trigger).collect();
        let signals: Vec<u8> = rows.iter().map(|r| r.signal).collect();
        assert_eq!(triggers, vec![false, false, true, false, false]);
        assert_eq!(signals, vec![0, 0, 0, 1, 0]);
    }

    #[test]
    fn warmup_rows_never_trigger() {
        let mut rows: Vec<SpreadRow> = (0..10).map(|_| row()).collect();
        // Default warmup is 120 rows.
        generator().apply(&mut rows);
        assert!(rows.iter().all(|r| !r.trigger && r.signal == 0));
    }
}
