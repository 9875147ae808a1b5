use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Immutable parameters of the IV spread strategy.
///
/// Built once at startup and passed by reference into every component.
/// Nothing in the workspace keeps its own copy of these constants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyParameters {
    /// Short moving-average window (rows).
    pub short_window: usize,
    /// Long moving-average window (rows).
    pub long_window: usize,
    /// Short z-score window (rows).
    pub short_z_window: usize,
    /// Long z-score window (rows).
    pub long_z_window: usize,
    /// Slack allowed when comparing the short MA against the long MA.
    pub ma_tolerance: f64,
    pub z_thresh_short: f64,
    pub z_thresh_long: f64,
    /// Second difference of the spread above which the acceleration branch fires.
    pub accel_thresh: f64,
    /// Scales the normalized spread into a position fraction.
    pub risk_multiplier: f64,
    /// Minimum distance in rows between two registered peaks.
    pub peak_min_distance: usize,
    /// Trailing min/max window used to normalize the spread for sizing.
    pub sizing_lookback: usize,
    /// Upper clip for the position fraction.
    pub max_position: f64,
    /// Inclusive delta band for the put leg, e.g. `[-0.30, -0.20]`.
    pub put_delta_band: (f64, f64),
    /// Inclusive delta band for the call leg, e.g. `[0.20, 0.30]`.
    pub call_delta_band: (f64, f64),
}

impl Default for StrategyParameters {
    fn default() -> Self {
        Self {
            short_window: 5,
            long_window: 20,
            short_z_window: 20,
            long_z_window: 120,
            ma_tolerance: 0.01,
            z_thresh_short: 1.0,
            z_thresh_long: 0.5,
            accel_thresh: 0.001,
            risk_multiplier: 5.0,
            peak_min_distance: 2,
            sizing_lookback: 60,
            max_position: 1.5,
            put_delta_band: (-0.30, -0.20),
            call_delta_band: (0.20, 0.30),
        }
    }
}

impl StrategyParameters {
    /// Longest of the four rolling windows the trigger depends on.
    #[must_use]
    pub fn signal_warmup(&self) -> usize {
        self.short_window
            .max(self.long_window)
            .max(self.short_z_window)
            .max(self.long_z_window)
    }

    /// Longest window any per-row statistic depends on, sizing included.
    #[must_use]
    pub fn longest_window(&self) -> usize {
        self.signal_warmup().max(self.sizing_lookback)
    }

    /// Checks that the parameters describe a usable strategy.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::InvalidParameters` naming the first offending field.
    pub fn validate(&self) -> Result<(), EngineError> {
        let windows = [
            ("short_window", self.short_window),
            ("long_window", self.long_window),
            ("short_z_window", self.short_z_window),
            ("long_z_window", self.long_z_window),
            ("sizing_lookback", self.sizing_lookback),
        ];
        for (name, value) in windows {
            if value == 0 {
                return Err(EngineError::InvalidParameters(format!(
                    "{name} must be at least 1"
                )));
            }
        }
        if self.short_z_window < 2 || self.long_z_window < 2 {
            return Err(EngineError::InvalidParameters(
                "z-score windows need at least 2 rows for a standard deviation".to_string(),
            ));
        }
        if self.peak_min_distance == 0 {
            return Err(EngineError::InvalidParameters(
                "peak_min_distance must be at least 1".to_string(),
            ));
        }
        if !(self.max_position > 0.0) || !(self.risk_multiplier >= 0.0) {
            return Err(EngineError::InvalidParameters(
                "max_position must be positive and risk_multiplier non-negative".to_string(),
            ));
        }
        let (put_lo, put_hi) = self.put_delta_band;
        if !(put_lo <= put_hi && put_hi < 0.0 && put_lo > -1.0) {
            return Err(EngineError::InvalidParameters(format!(
                "put_delta_band [{put_lo}, {put_hi}] must be an ordered band inside (-1, 0)"
            )));
        }
        let (call_lo, call_hi) = self.call_delta_band;
        if !(call_lo <= call_hi && call_lo > 0.0 && call_hi < 1.0) {
            return Err(EngineError::InvalidParameters(format!(
                "call_delta_band [{call_lo}, {call_hi}] must be an ordered band inside (0, 1)"
            )));
        }
        Ok(())
    }
}

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub strategy: StrategyParameters,
    pub trading: TradingConfig,
    pub alpaca: AlpacaConfig,
    pub backoff: BackoffConfig,
    pub fallback: FallbackConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TradingConfig {
    pub symbol: String,
    /// Bar timeframe passed to the market data source (e.g. "1Min").
    pub timeframe: String,
    /// Bars requested when the latest price is unavailable.
    pub lookback: usize,
    pub poll_interval_secs: u64,
    /// Fraction of the sized notional actually committed, leaving margin for slippage.
    pub cash_buffer: f64,
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            symbol: "AAPL".to_string(),
            timeframe: "1Min".to_string(),
            lookback: 200,
            poll_interval_secs: 60,
            cash_buffer: 0.95,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlpacaConfig {
    /// Trading API host (paper by default).
    pub base_url: String,
    /// Market data API host.
    pub data_url: String,
    pub api_key: Option<String>,
    pub secret_key: Option<String>,
    pub requests_per_minute: u32,
    pub timeout_secs: u64,
}

impl Default for AlpacaConfig {
    fn default() -> Self {
        Self {
            base_url: "https://paper-api.alpaca.markets".to_string(),
            data_url: "https://data.alpaca.markets".to_string(),
            api_key: None,
            secret_key: None,
            requests_per_minute: 200,
            timeout_secs: 30,
        }
    }
}

impl AlpacaConfig {
    /// Returns `(api_key, secret_key)` when both are present and non-empty.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Config` when either credential is missing. Live
    /// trading must not start without them.
    pub fn credentials(&self) -> Result<(&str, &str), EngineError> {
        match (self.api_key.as_deref(), self.secret_key.as_deref()) {
            (Some(key), Some(secret)) if !key.is_empty() && !secret.is_empty() => {
                Ok((key, secret))
            }
            _ => Err(EngineError::Config(
                "Alpaca credentials missing: set ALPACA_API_KEY and ALPACA_SECRET_KEY".to_string(),
            )),
        }
    }
}

/// Failure-streak backoff for the polling loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    /// Upper bound on the delay between failing cycles.
    pub max_backoff_secs: u64,
    /// Largest power of two applied to the poll interval.
    pub max_exponent: u32,
    /// Consecutive failures after which every further failure raises an alert.
    pub alert_after_failures: u32,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            max_backoff_secs: 15 * 60,
            max_exponent: 6,
            alert_after_failures: 5,
        }
    }
}

/// Put leg IV relative to the base level wherever legs are substituted or simulated.
pub const PUT_SKEW: f64 = 1.05;
/// Call leg IV relative to the base level.
pub const CALL_SKEW: f64 = 0.95;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackMode {
    /// Price-tiered constant IV.
    Deterministic,
    /// Seeded uniform draw of the base IV.
    Randomized,
}

/// Values substituted when market or option data is unavailable.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackConfig {
    pub mode: FallbackMode,
    /// Underlying price used when every price source fails.
    pub price: f64,
    pub seed: u64,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            mode: FallbackMode::Deterministic,
            price: 232.04,
            seed: 42,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_parameters_are_valid() {
        let params = StrategyParameters::default();
        assert!(params.validate().is_ok());
        assert_eq!(params.signal_warmup(), 120);
        assert_eq!(params.longest_window(), 120);
    }

    #[test]
    fn zero_window_is_rejected() {
        let params = StrategyParameters {
            long_window: 0,
            ..StrategyParameters::default()
        };
        let err = params.validate().unwrap_err();
        assert!(err.to_string().contains("long_window"));
    }

    #[test]
    fn inverted_put_band_is_rejected() {
        let params = StrategyParameters {
            put_delta_band: (-0.20, -0.30),
            ..StrategyParameters::default()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn longest_window_includes_sizing_lookback() {
        let params = StrategyParameters {
            long_z_window: 30,
            ..StrategyParameters::default()
        };
        assert_eq!(params.signal_warmup(), 30);
        assert_eq!(params.longest_window(), 60);
    }

    #[test]
    fn missing_credentials_are_reported() {
        let config = AlpacaConfig::default();
        assert!(config.credentials().is_err());

        let config = AlpacaConfig {
            api_key: Some("key".to_string()),
            secret_key: Some(String::new()),
            ..AlpacaConfig::default()
        };
        assert!(config.credentials().is_err());

        let config = AlpacaConfig {
            api_key: Some("key".to_string()),
            secret_key: Some("secret".to_string()),
            ..AlpacaConfig::default()
        };
        assert_eq!(config.credentials().unwrap(), ("key", "secret"));
    }
}
