//! Spread-magnitude position sizing.

use ivspread_core::StrategyParameters;

use crate::metrics::SpreadRow;
use crate::rolling::rolling_min_max;

/// Maps the spread's position inside its trailing range to a position fraction.
#[derive(Debug, Clone)]
pub struct PositionSizer {
    lookback: usize,
    risk_multiplier: f64,
    max_position: f64,
}

impl PositionSizer {
    #[must_use]
    pub fn new(params: &StrategyParameters) -> Self {
        Self {
            lookback: params.sizing_lookback,
            risk_multiplier: params.risk_multiplier,
            max_position: params.max_position,
        }
    }

    /// `(value - min) / (max - min)` clamped to `[0, 1]`; 0 on a flat range.
    #[must_use]
    pub fn normalize(value: f64, min: f64, max: f64) -> f64 {
        let range = max - min;
        if range <= f64::EPSILON {
            return 0.0;
        }
        ((value - min) / range).clamp(0.0, 1.0)
    }

    /// Position fraction for one row given its normalized spread.
    #[must_use]
    pub fn size(&self, signal: u8, norm: Option<f64>) -> f64 {
        match norm {
            Some(norm) if signal == 1 => {
                (norm * self.risk_multiplier).clamp(0.0, self.max_position)
            }
            _ => 0.0,
        }
    }

    /// Fills `position_size` on every row. Rows before the lookback is full get 0.
    pub fn apply(&self, rows: &mut [SpreadRow]) {
        let spread: Vec<f64> = rows.iter().map(|r| r.spread_iv).collect();
        let ranges = rolling_min_max(&spread, self.lookback);

        for (row, range) in rows.iter_mut().zip(ranges) {
            let norm = range.map(|(min, max)| Self::normalize(row.spread_iv, min, max));
            row.position_size = self.size(row.signal, norm);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sizer() -> PositionSizer {
        PositionSizer::new(&StrategyParameters::default())
    }

    #[test]
    fn normalize_maps_range_to_unit_interval() {
        assert!((PositionSizer::normalize(0.05, 0.0, 0.10) - 0.5).abs() < 1e-12);
        assert_eq!(PositionSizer::normalize(0.10, 0.0, 0.10), 1.0);
        assert_eq!(PositionSizer::normalize(0.0, 0.0, 0.10), 0.0);
    }

    #[test]
    fn flat_range_normalizes_to_zero() {
        assert_eq!(PositionSizer::normalize(0.07, 0.07, 0.07), 0.0);
    }

    #[test]
    fn size_is_gated_by_signal() {
        assert_eq!(sizer().size(0, Some(1.0)), 0.0);
        assert_eq!(sizer().size(1, None), 0.0);
    }

    #[test]
    fn size_scales_and_clips() {
        // 0.1 * 5 = 0.5
        assert!((sizer().size(1, Some(0.1)) - 0.5).abs() < 1e-12);
        // 0.8 * 5 = 4.0, clipped to 1.5
        assert_eq!(sizer().size(1, Some(0.8)), 1.5);
    }
}
