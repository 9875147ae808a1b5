//! Collaborator trait implementations backed by [`AlpacaClient`].

use anyhow::{Context, Result};
use async_trait::async_trait;
use ivspread_core::{
    AccountSnapshot, BrokerSession, MarketDataSource, OptionContract, OptionQuote,
    OptionsChainProvider, OrderAck, OrderSide, PositionSnapshot, PriceBar,
};
use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::client::AlpacaClient;

#[async_trait]
impl MarketDataSource for AlpacaClient {
    /// Latest trade, then the quote midpoint.
    async fn latest_price(&self, symbol: &str) -> Result<Decimal> {
        match self.latest_trade_price(symbol).await {
            Ok(price) => Ok(price),
            Err(trade_err) => {
                warn!(symbol, error = %trade_err, "Latest trade unavailable, trying quote mid");
                self.latest_quote_mid(symbol)
                    .await
                    .with_context(|| format!("No trade or quote price for {symbol}"))
            }
        }
    }

    async fn recent_bars(
        &self,
        symbol: &str,
        timeframe: &str,
        window: usize,
    ) -> Result<Vec<PriceBar>> {
        Ok(self.bars(symbol, timeframe, window).await?)
    }
}

#[async_trait]
impl OptionsChainProvider for AlpacaClient {
    async fn list_active_contracts(&self, symbol: &str) -> Result<Vec<OptionContract>> {
        Ok(self.option_contracts(symbol).await?)
    }

    async fn quote(&self, contract_symbol: &str) -> Result<OptionQuote> {
        Ok(self.option_snapshot(contract_symbol).await?)
    }
}

#[async_trait]
impl BrokerSession for AlpacaClient {
    async fn account(&self) -> Result<AccountSnapshot> {
        Ok(AlpacaClient::account(self).await?)
    }

    async fn position(&self, symbol: &str) -> Result<Option<PositionSnapshot>> {
        Ok(AlpacaClient::position(self, symbol).await?)
    }

    async fn submit_market_order(
        &self,
        symbol: &str,
        qty: Decimal,
        side: OrderSide,
    ) -> Result<OrderAck> {
        let ack = AlpacaClient::submit_market_order(self, symbol, qty, side).await?;
        info!(order_id = %ack.order_id, symbol, %qty, %side, "Order submitted");
        Ok(ack)
    }

    async fn close_position(&self, symbol: &str) -> Result<()> {
        AlpacaClient::close_position(self, symbol).await?;
        info!(symbol, "Position close requested");
        Ok(())
    }
}
