//! Substitute values used when the option chain or price feed is down.

use ivspread_core::{FallbackConfig, FallbackMode, CALL_SKEW, PUT_SKEW};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Underlying level at which the deterministic base IV drops.
const PRICE_TIER: f64 = 230.0;
const HIGH_PRICE_BASE_IV: f64 = 0.22;
const LOW_PRICE_BASE_IV: f64 = 0.25;
const RANDOM_BASE_RANGE: (f64, f64) = (0.15, 0.35);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FallbackLegs {
    pub put_iv: f64,
    pub call_iv: f64,
}

#[derive(Debug)]
pub struct FallbackIv {
    mode: FallbackMode,
    price: f64,
    rng: ChaCha8Rng,
}

impl FallbackIv {
    pub fn new(config: &FallbackConfig) -> Self {
        Self {
            mode: config.mode,
            price: config.price,
            rng: ChaCha8Rng::seed_from_u64(config.seed),
        }
    }

    /// Price used when every price source has failed.
    pub fn price(&self) -> f64 {
        self.price
    }

    fn base_iv(&mut self, underlying: f64) -> f64 {
        match self.mode {
            FallbackMode::Deterministic => {
                if underlying >= PRICE_TIER {
                    HIGH_PRICE_BASE_IV
                } else {
                    LOW_PRICE_BASE_IV
                }
            }
            FallbackMode::Randomized => self.rng.gen_range(RANDOM_BASE_RANGE.0..RANDOM_BASE_RANGE.1),
        }
    }

    /// Both legs for one cycle.
    pub fn legs(&mut self, underlying: f64) -> FallbackLegs {
        let base = self.base_iv(underlying);
        FallbackLegs {
            put_iv: base * PUT_SKEW,
            call_iv: base * CALL_SKEW,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deterministic() -> FallbackIv {
        FallbackIv::new(&FallbackConfig::default())
    }

    #[test]
    fn test_price_tiers() {
        let mut fallback = deterministic();
        let high = fallback.legs(232.04);
        assert!((high.put_iv - 0.231).abs() < 1e-12);
        assert!((high.call_iv - 0.209).abs() < 1e-12);

        let low = fallback.legs(150.0);
        assert!((low.put_iv - 0.2625).abs() < 1e-12);
        assert!((low.call_iv - 0.2375).abs() < 1e-12);
    }

    #[test]
    fn test_tier_boundary_is_inclusive() {
        let mut fallback = deterministic();
        let legs = fallback.legs(230.0);
        assert!((legs.put_iv - 0.22 * PUT_SKEW).abs() < 1e-12);
    }

    #[test]
    fn test_randomized_is_seeded_and_skewed() {
        let config = FallbackConfig {
            mode: FallbackMode::Randomized,
            ..FallbackConfig::default()
        };
        let mut a = FallbackIv::new(&config);
        let mut b = FallbackIv::new(&config);
        for _ in 0..20 {
            let la = a.legs(200.0);
            let lb = b.legs(200.0);
            assert_eq!(la, lb);
            assert!(la.put_iv > la.call_iv);
            let base = la.put_iv / PUT_SKEW;
            assert!((0.15..0.35).contains(&base));
        }
    }

    #[test]
    fn test_fallback_price() {
        assert_eq!(deterministic().price(), 232.04);
    }
}
