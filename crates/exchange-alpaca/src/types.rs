//! Wire formats of the Alpaca REST API and their conversions into domain types.
//!
//! Trading endpoints encode money as decimal strings; market data endpoints
//! use JSON numbers.

use std::collections::HashMap;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use ivspread_core::{
    AccountSnapshot, OptionContract, OptionQuote, OptionRight, OrderAck, OrderSide,
    PositionSnapshot, PriceBar,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{AlpacaError, Result};

fn parse_decimal(field: &str, value: &str) -> Result<Decimal> {
    Decimal::from_str(value)
        .map_err(|e| AlpacaError::Serialization(format!("{field}: '{value}' is not a decimal: {e}")))
}

fn decimal_from_f64(field: &str, value: f64) -> Result<Decimal> {
    Decimal::try_from(value)
        .map_err(|e| AlpacaError::Serialization(format!("{field}: {value} out of range: {e}")))
}

// =============================================================================
// Market Data
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawLatestTradeResponse {
    pub trade: Option<RawTrade>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawTrade {
    #[serde(rename = "p")]
    pub price: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawLatestQuoteResponse {
    pub quote: Option<RawQuote>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawQuote {
    #[serde(rename = "bp")]
    pub bid_price: Option<f64>,
    #[serde(rename = "ap")]
    pub ask_price: Option<f64>,
}

impl RawQuote {
    /// Midpoint when both sides are positive.
    pub fn mid(&self) -> Option<f64> {
        match (self.bid_price, self.ask_price) {
            (Some(bid), Some(ask)) if bid > 0.0 && ask > 0.0 => Some((bid + ask) / 2.0),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawBarsResponse {
    pub bars: Option<Vec<RawBar>>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawBar {
    #[serde(rename = "t")]
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "o")]
    pub open: f64,
    #[serde(rename = "h")]
    pub high: f64,
    #[serde(rename = "l")]
    pub low: f64,
    #[serde(rename = "c")]
    pub close: f64,
    #[serde(rename = "v")]
    pub volume: f64,
}

impl TryFrom<RawBar> for PriceBar {
    type Error = AlpacaError;

    fn try_from(raw: RawBar) -> Result<Self> {
        Ok(Self {
            timestamp: raw.timestamp,
            open: decimal_from_f64("o", raw.open)?,
            high: decimal_from_f64("h", raw.high)?,
            low: decimal_from_f64("l", raw.low)?,
            close: decimal_from_f64("c", raw.close)?,
            volume: decimal_from_f64("v", raw.volume)?,
        })
    }
}

// =============================================================================
// Options
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawContractsResponse {
    pub option_contracts: Option<Vec<RawContract>>,
    #[allow(dead_code)]
    pub next_page_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawContract {
    pub symbol: String,
    pub underlying_symbol: String,
    #[serde(rename = "type")]
    pub right: OptionRight,
    pub strike_price: String,
    pub expiration_date: NaiveDate,
    pub tradable: Option<bool>,
}

impl TryFrom<RawContract> for OptionContract {
    type Error = AlpacaError;

    fn try_from(raw: RawContract) -> Result<Self> {
        Ok(Self {
            strike: parse_decimal("strike_price", &raw.strike_price)?,
            symbol: raw.symbol,
            underlying: raw.underlying_symbol,
            right: raw.right,
            expiration: raw.expiration_date,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawSnapshotsResponse {
    pub snapshots: Option<HashMap<String, RawSnapshot>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RawSnapshot {
    pub latest_quote: Option<RawQuote>,
    pub implied_volatility: Option<f64>,
    pub greeks: Option<RawGreeks>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawGreeks {
    pub delta: Option<f64>,
}

impl TryFrom<RawSnapshot> for OptionQuote {
    type Error = AlpacaError;

    fn try_from(raw: RawSnapshot) -> Result<Self> {
        let (bid, ask) = match raw.latest_quote {
            Some(q) => (
                q.bid_price.map(|p| decimal_from_f64("bp", p)).transpose()?,
                q.ask_price.map(|p| decimal_from_f64("ap", p)).transpose()?,
            ),
            None => (None, None),
        };
        Ok(Self {
            iv: raw.implied_volatility.filter(|iv| iv.is_finite() && *iv > 0.0),
            bid,
            ask,
            delta: raw.greeks.and_then(|g| g.delta),
        })
    }
}

// =============================================================================
// Trading
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawAccount {
    pub equity: String,
    pub cash: String,
}

impl TryFrom<RawAccount> for AccountSnapshot {
    type Error = AlpacaError;

    fn try_from(raw: RawAccount) -> Result<Self> {
        Ok(Self {
            equity: parse_decimal("equity", &raw.equity)?,
            cash: parse_decimal("cash", &raw.cash)?,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawPosition {
    pub symbol: String,
    pub qty: String,
    pub avg_entry_price: String,
    pub market_value: Option<String>,
}

impl TryFrom<RawPosition> for PositionSnapshot {
    type Error = AlpacaError;

    fn try_from(raw: RawPosition) -> Result<Self> {
        Ok(Self {
            qty: parse_decimal("qty", &raw.qty)?,
            avg_entry_price: parse_decimal("avg_entry_price", &raw.avg_entry_price)?,
            market_value: raw
                .market_value
                .as_deref()
                .map(|v| parse_decimal("market_value", v))
                .transpose()?
                .unwrap_or_default(),
            symbol: raw.symbol,
        })
    }
}

/// Market order body for `POST /v2/orders`.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct OrderRequest {
    pub symbol: String,
    pub qty: String,
    pub side: OrderSide,
    #[serde(rename = "type")]
    pub order_type: &'static str,
    pub time_in_force: &'static str,
}

impl OrderRequest {
    pub fn market(symbol: &str, qty: Decimal, side: OrderSide) -> Self {
        Self {
            symbol: symbol.to_string(),
            qty: qty.normalize().to_string(),
            side,
            order_type: "market",
            time_in_force: "day",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawOrder {
    pub id: String,
    pub symbol: String,
    pub qty: Option<String>,
    pub side: OrderSide,
    pub submitted_at: Option<DateTime<Utc>>,
}

impl TryFrom<RawOrder> for OrderAck {
    type Error = AlpacaError;

    fn try_from(raw: RawOrder) -> Result<Self> {
        Ok(Self {
            qty: raw
                .qty
                .as_deref()
                .map(|q| parse_decimal("qty", q))
                .transpose()?
                .unwrap_or_default(),
            order_id: raw.id,
            symbol: raw.symbol,
            side: raw.side,
            submitted_at: raw.submitted_at.unwrap_or_else(Utc::now),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_quote_mid_requires_both_sides() {
        let quote = RawQuote {
            bid_price: Some(232.0),
            ask_price: Some(233.0),
        };
        assert_eq!(quote.mid(), Some(232.5));

        let one_sided = RawQuote {
            bid_price: Some(0.0),
            ask_price: Some(233.0),
        };
        assert_eq!(one_sided.mid(), None);
    }

    #[test]
    fn test_contract_conversion() {
        let raw: RawContract = serde_json::from_value(serde_json::json!({
            "id": "6e58f870",
            "symbol": "AAPL250117P00225000",
            "underlying_symbol": "AAPL",
            "type": "put",
            "strike_price": "225",
            "expiration_date": "2025-01-17",
            "tradable": true
        }))
        .unwrap();
        let contract = OptionContract::try_from(raw).unwrap();
        assert_eq!(contract.right, OptionRight::Put);
        assert_eq!(contract.strike, dec!(225));
        assert_eq!(
            contract.expiration,
            NaiveDate::from_ymd_opt(2025, 1, 17).unwrap()
        );
    }

    #[test]
    fn test_bad_strike_is_serialization_error() {
        let raw = RawContract {
            symbol: "X".to_string(),
            underlying_symbol: "AAPL".to_string(),
            right: OptionRight::Call,
            strike_price: "n/a".to_string(),
            expiration_date: NaiveDate::from_ymd_opt(2025, 1, 17).unwrap(),
            tradable: None,
        };
        assert!(matches!(
            OptionContract::try_from(raw),
            Err(AlpacaError::Serialization(_))
        ));
    }

    #[test]
    fn test_snapshot_drops_zero_iv() {
        let raw: RawSnapshot = serde_json::from_value(serde_json::json!({
            "latestQuote": {"bp": 1.25, "ap": 1.5},
            "impliedVolatility": 0.0,
            "greeks": {"delta": 0.26}
        }))
        .unwrap();
        let quote = OptionQuote::try_from(raw).unwrap();
        assert_eq!(quote.iv, None);
        assert_eq!(quote.delta, Some(0.26));
        assert_eq!(quote.bid, Some(dec!(1.25)));
        assert_eq!(quote.ask, Some(dec!(1.5)));
    }

    #[test]
    fn test_order_request_body() {
        let body = OrderRequest::market("AAPL", dec!(21.000), OrderSide::Buy);
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["qty"], "21");
        assert_eq!(json["side"], "buy");
        assert_eq!(json["type"], "market");
        assert_eq!(json["time_in_force"], "day");
    }
}
