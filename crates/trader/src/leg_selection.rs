//! Picks the put and call closest to 25 delta from an option chain.
//!
//! Chains rarely carry greeks for every strike, so selection runs on a
//! linear moneyness approximation of delta; a quoted delta replaces the
//! estimate once the chosen contract's snapshot has been fetched.

use ivspread_core::{OptionContract, OptionRight};
use rust_decimal::prelude::ToPrimitive;

pub const TARGET_DELTA: f64 = 0.25;

/// Moneyness distance, as a fraction of spot, that moves the estimate by 1.0.
const MONEYNESS_SCALE: f64 = 0.1;
const MIN_ABS_DELTA: f64 = 0.01;
const MAX_ABS_DELTA: f64 = 0.99;

/// Signed delta estimate: positive for calls, negative for puts.
pub fn estimate_delta(right: OptionRight, strike: f64, spot: f64) -> f64 {
    let scale = MONEYNESS_SCALE * spot;
    match right {
        OptionRight::Call => {
            (0.5 - (strike - spot) / scale).clamp(MIN_ABS_DELTA, MAX_ABS_DELTA)
        }
        OptionRight::Put => {
            -(0.5 - (spot - strike) / scale).clamp(MIN_ABS_DELTA, MAX_ABS_DELTA)
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectedLeg {
    pub contract: OptionContract,
    pub estimated_delta: f64,
}

impl SelectedLeg {
    /// Quoted delta when the provider supplies one, otherwise the estimate.
    pub fn delta(&self, quoted: Option<f64>) -> f64 {
        quoted
            .filter(|d| d.is_finite())
            .unwrap_or(self.estimated_delta)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectedLegs {
    pub put: SelectedLeg,
    pub call: SelectedLeg,
}

fn closest(
    contracts: &[&OptionContract],
    right: OptionRight,
    spot: f64,
) -> Option<SelectedLeg> {
    let target = match right {
        OptionRight::Call => TARGET_DELTA,
        OptionRight::Put => -TARGET_DELTA,
    };
    contracts
        .iter()
        .filter(|c| c.right == right)
        .filter_map(|c| {
            let strike = c.strike.to_f64()?;
            Some(SelectedLeg {
                contract: (*c).clone(),
                estimated_delta: estimate_delta(right, strike, spot),
            })
        })
        .min_by(|a, b| {
            (a.estimated_delta - target)
                .abs()
                .total_cmp(&(b.estimated_delta - target).abs())
        })
}

/// Chooses both legs from the nearest expiration.
///
/// Returns `None` when the chain is empty, the spot is not positive, or the
/// nearest expiration lacks either side.
pub fn select_legs(contracts: &[OptionContract], spot: f64) -> Option<SelectedLegs> {
    if !(spot.is_finite() && spot > 0.0) {
        return None;
    }
    let nearest = contracts.iter().map(|c| c.expiration).min()?;
    let expiring: Vec<&OptionContract> = contracts
        .iter()
        .filter(|c| c.expiration == nearest)
        .collect();

    Some(SelectedLegs {
        put: closest(&expiring, OptionRight::Put, spot)?,
        call: closest(&expiring, OptionRight::Call, spot)?,
    })
}
