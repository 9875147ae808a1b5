use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One observation of the two option legs and the underlying at an instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IvSample {
    pub timestamp: DateTime<Utc>,
    pub call_iv: f64,
    pub put_iv: f64,
    /// In (0, 1).
    pub call_delta: f64,
    /// In (-1, 0).
    pub put_delta: f64,
    pub underlying_price: f64,
}

/// Aggregated 25-delta legs for one timestamp, input to the metrics engine.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpreadSeed {
    pub timestamp: DateTime<Utc>,
    pub put25_iv: f64,
    pub call25_iv: f64,
    pub underlying: f64,
}

/// What the live path hands to the execution collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalRecord {
    pub timestamp: Option<DateTime<Utc>>,
    /// 0 or 1.
    pub signal: u8,
    pub position_size: f64,
    pub spread_iv: f64,
    pub reason: String,
}

impl SignalRecord {
    pub const REASON_LONG: &'static str = "long signal: MA/Z/peak conditions satisfied";
    pub const REASON_NONE: &'static str = "no signal: conditions unmet";
    pub const REASON_INSUFFICIENT: &'static str = "insufficient data";

    /// Neutral record used whenever no sample or not enough history is available.
    #[must_use]
    pub fn insufficient(timestamp: Option<DateTime<Utc>>, spread_iv: f64) -> Self {
        Self {
            timestamp,
            signal: 0,
            position_size: 0.0,
            spread_iv,
            reason: Self::REASON_INSUFFICIENT.to_string(),
        }
    }

    #[must_use]
    pub fn is_long(&self) -> bool {
        self.signal == 1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionRight {
    Call,
    Put,
}

impl std::fmt::Display for OptionRight {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Call => write!(f, "C"),
            Self::Put => write!(f, "P"),
        }
    }
}

/// An active listed option on the underlying.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionContract {
    /// OCC-style contract symbol, e.g. `AAPL250117C00230000`.
    pub symbol: String,
    pub underlying: String,
    pub right: OptionRight,
    pub strike: Decimal,
    pub expiration: NaiveDate,
}

/// Quote snapshot for one contract. IV and delta are optional because
/// providers omit them for illiquid strikes.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct OptionQuote {
    pub iv: Option<f64>,
    pub bid: Option<Decimal>,
    pub ask: Option<Decimal>,
    pub delta: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub timestamp: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountSnapshot {
    pub equity: Decimal,
    pub cash: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionSnapshot {
    pub symbol: String,
    pub qty: Decimal,
    pub avg_entry_price: Decimal,
    pub market_value: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buy => write!(f, "buy"),
            Self::Sell => write!(f, "sell"),
        }
    }
}

/// Broker acknowledgement of a submitted order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderAck {
    pub order_id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub qty: Decimal,
    pub submitted_at: DateTime<Utc>,
}
