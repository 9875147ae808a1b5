//! Alpaca integration for the IV spread trader.
//!
//! This crate provides:
//! - REST client with rate limiting for the Alpaca trading and market data APIs
//! - `MarketDataSource`, `OptionsChainProvider` and `BrokerSession` implementations
//!
//! # Authentication
//!
//! Requests carry the `APCA-API-KEY-ID` and `APCA-API-SECRET-KEY` headers.
//! Keys come from `ALPACA_API_KEY` / `ALPACA_SECRET_KEY` through the
//! application config.
//!
//! # API Endpoints
//!
//! - `GET /v2/stocks/{symbol}/trades/latest` - Latest trade (data host)
//! - `GET /v2/stocks/{symbol}/quotes/latest` - Latest quote (data host)
//! - `GET /v2/stocks/{symbol}/bars` - Price bars (data host)
//! - `GET /v1beta1/options/snapshots` - Option IV, greeks and quote (data host)
//! - `GET /v2/options/contracts` - Active option contracts
//! - `GET /v2/account` - Account equity and cash
//! - `GET /v2/positions/{symbol}` - Open position
//! - `POST /v2/orders` - Submit order
//! - `DELETE /v2/positions/{symbol}` - Close position

pub mod client;
pub mod error;
pub mod provider;
pub mod types;

pub use client::{
    AlpacaClient, AlpacaClientConfig, ALPACA_DATA_URL, ALPACA_LIVE_URL, ALPACA_PAPER_URL,
};
pub use error::{AlpacaError, Result};
