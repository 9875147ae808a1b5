//! Capability interfaces for the engine's collaborators.
//!
//! The live service receives these as trait objects instead of reaching for
//! process-wide clients, so tests can substitute in-memory fakes.

use crate::events::{
    AccountSnapshot, OptionContract, OptionQuote, OrderAck, OrderSide, PositionSnapshot, PriceBar,
};
use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;

#[async_trait]
pub trait MarketDataSource: Send + Sync {
    async fn latest_price(&self, symbol: &str) -> Result<Decimal>;

    /// Most recent bars, oldest first, at most `window` of them.
    async fn recent_bars(&self, symbol: &str, timeframe: &str, window: usize)
        -> Result<Vec<PriceBar>>;
}

#[async_trait]
pub trait OptionsChainProvider: Send + Sync {
    async fn list_active_contracts(&self, symbol: &str) -> Result<Vec<OptionContract>>;

    async fn quote(&self, contract_symbol: &str) -> Result<OptionQuote>;
}

#[async_trait]
pub trait BrokerSession: Send + Sync {
    async fn account(&self) -> Result<AccountSnapshot>;

    /// `Ok(None)` when no position is open.
    async fn position(&self, symbol: &str) -> Result<Option<PositionSnapshot>>;

    async fn submit_market_order(&self, symbol: &str, qty: Decimal, side: OrderSide)
        -> Result<OrderAck>;

    async fn close_position(&self, symbol: &str) -> Result<()>;
}
