//! Seeded synthetic option samples for offline backtests.
//!
//! Prices follow a multiplicative random walk. Every `anchor_every` rows the
//! legs are re-drawn from a uniform IV level with a fixed put/call skew; in
//! between they drift by a small relative Gaussian step.

use chrono::{DateTime, Duration, TimeZone, Utc};
use ivspread_core::{IvSample, CALL_SKEW, PUT_SKEW};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyntheticConfig {
    pub rows: usize,
    pub seed: u64,
    pub base_price: f64,
    /// Standard deviation of the per-row price return.
    pub return_std: f64,
    /// Standard deviation of the relative IV step between anchors.
    pub iv_step_std: f64,
    /// Inclusive range of the anchor IV level.
    pub iv_range: (f64, f64),
    pub anchor_every: usize,
    pub start: DateTime<Utc>,
    pub step_secs: i64,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            rows: 200,
            seed: 42,
            base_price: 150.0,
            return_std: 0.02,
            iv_step_std: 0.01,
            iv_range: (0.15, 0.35),
            anchor_every: 10,
            start: Utc
                .with_ymd_and_hms(2025, 1, 2, 14, 30, 0)
                .single()
                .unwrap_or_default(),
            step_secs: 60,
        }
    }
}

impl SyntheticConfig {
    #[must_use]
    pub fn with_rows(mut self, rows: usize) -> Self {
        self.rows = rows;
        self
    }

    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    #[must_use]
    pub fn with_base_price(mut self, base_price: f64) -> Self {
        self.base_price = base_price;
        self
    }
}

/// Draws one standard normal value (Box-Muller).
pub fn standard_normal<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    let u1: f64 = rng.gen::<f64>().max(f64::MIN_POSITIVE);
    let u2: f64 = rng.gen();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

pub struct SyntheticIvGenerator {
    config: SyntheticConfig,
}

impl SyntheticIvGenerator {
    #[must_use]
    pub fn new(config: SyntheticConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &SyntheticConfig {
        &self.config
    }

    /// One sample per row, both legs at exactly 25 delta.
    #[must_use]
    pub fn generate(&self) -> Vec<IvSample> {
        let cfg = &self.config;
        let mut rng = ChaCha8Rng::seed_from_u64(cfg.seed);
        let anchor_every = cfg.anchor_every.max(1);
        let (iv_lo, iv_hi) = cfg.iv_range;

        let mut price = cfg.base_price;
        let mut put_iv = 0.0;
        let mut call_iv = 0.0;
        let mut samples = Vec::with_capacity(cfg.rows);

        for i in 0..cfg.rows {
            price *= 1.0 + cfg.return_std * standard_normal(&mut rng);

            if i % anchor_every == 0 {
                let base = if iv_hi > iv_lo {
                    rng.gen_range(iv_lo..=iv_hi)
                } else {
                    iv_lo
                };
                put_iv = base * PUT_SKEW;
                call_iv = base * CALL_SKEW;
            } else {
                put_iv *= 1.0 + cfg.iv_step_std * standard_normal(&mut rng);
                call_iv *= 1.0 + cfg.iv_step_std * standard_normal(&mut rng);
            }

            samples.push(IvSample {
                timestamp: cfg.start + Duration::seconds(cfg.step_secs * i as i64),
                call_iv,
                put_iv,
                call_delta: 0.25,
                put_delta: -0.25,
                underlying_price: price,
            });
        }

        samples
    }
}
