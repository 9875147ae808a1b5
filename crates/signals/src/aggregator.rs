//! Groups raw option samples into one 25-delta put/call pair per timestamp.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use ivspread_core::{EngineError, EngineResult, IvSample, SpreadSeed, StrategyParameters};
use tracing::debug;

/// Selects near-25-delta legs and averages their IV per timestamp.
#[derive(Debug, Clone)]
pub struct IvSampleAggregator {
    put_band: (f64, f64),
    call_band: (f64, f64),
}

#[derive(Debug, Default)]
struct LegAccumulator {
    put_sum: f64,
    put_count: usize,
    call_sum: f64,
    call_count: usize,
    underlying: Option<f64>,
}

impl IvSampleAggregator {
    #[must_use]
    pub fn new(params: &StrategyParameters) -> Self {
        Self {
            put_band: params.put_delta_band,
            call_band: params.call_delta_band,
        }
    }

    /// True when `delta` lies inside the inclusive put band.
    #[must_use]
    pub fn is_put_leg(&self, delta: f64) -> bool {
        delta >= self.put_band.0 && delta <= self.put_band.1
    }

    /// True when `delta` lies inside the inclusive call band.
    #[must_use]
    pub fn is_call_leg(&self, delta: f64) -> bool {
        delta >= self.call_band.0 && delta <= self.call_band.1
    }

    /// Builds the ordered seed series.
    ///
    /// Timestamps lacking either leg are dropped; nothing is imputed across legs.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::DataUnavailable` when no put leg or no call leg
    /// survives the delta filter, or when no timestamp carries both.
    pub fn aggregate(&self, samples: &[IvSample]) -> EngineResult<Vec<SpreadSeed>> {
        let mut groups: BTreeMap<DateTime<Utc>, LegAccumulator> = BTreeMap::new();
        let mut puts = 0usize;
        let mut calls = 0usize;

        for sample in samples {
            let acc = groups.entry(sample.timestamp).or_default();
            if acc.underlying.is_none() && sample.underlying_price.is_finite() {
                acc.underlying = Some(sample.underlying_price);
            }
            if self.is_put_leg(sample.put_delta) && sample.put_iv.is_finite() {
                acc.put_sum += sample.put_iv;
                acc.put_count += 1;
                puts += 1;
            }
            if self.is_call_leg(sample.call_delta) && sample.call_iv.is_finite() {
                acc.call_sum += sample.call_iv;
                acc.call_count += 1;
                calls += 1;
            }
        }

        if puts == 0 || calls == 0 {
            return Err(EngineError::DataUnavailable(
                "insufficient option data".to_string(),
            ));
        }

        let seeds: Vec<SpreadSeed> = groups
            .into_iter()
            .filter_map(|(timestamp, acc)| {
                if acc.put_count == 0 || acc.call_count == 0 {
                    debug!(%timestamp, puts = acc.put_count, calls = acc.call_count, "Dropping timestamp missing a leg");
                    return None;
                }
                Some(SpreadSeed {
                    timestamp,
                    put25_iv: acc.put_sum / acc.put_count as f64,
                    call25_iv: acc.call_sum / acc.call_count as f64,
                    underlying: acc.underlying?,
                })
            })
            .collect();

        if seeds.is_empty() {
            return Err(EngineError::DataUnavailable(
                "insufficient option data: no timestamp carries both legs".to_string(),
            ));
        }

        Ok(seeds)
    }
}
