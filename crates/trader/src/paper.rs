//! Offline collaborators for `live --paper` and tests.
//!
//! [`SimulatedMarket`] walks the underlying and a base IV level with a seeded
//! RNG and serves an option chain around spot. [`PaperBroker`] fills market
//! orders instantly at the current price and keeps cash and positions in
//! memory.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use ivspread_backtest::synthetic::standard_normal;
use ivspread_core::{
    AccountSnapshot, BrokerSession, MarketDataSource, OptionContract, OptionQuote, OptionRight,
    OptionsChainProvider, OrderAck, OrderSide, PositionSnapshot, PriceBar, CALL_SKEW, PUT_SKEW,
};
use parking_lot::Mutex;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use tracing::info;


// =============================================================================
// Simulated market
// =============================================================================

#[derive(Debug, Clone)]
pub struct SimulatedMarketConfig {
    pub symbol: String,
    pub start_price: f64,
    /// Std of the per-step simple return of the underlying.
    pub return_std: f64,
    pub start_iv: f64,
    /// Std of the per-step multiplicative IV move.
    pub iv_step_std: f64,
    pub iv_bounds: (f64, f64),
    /// Strikes listed on each side of spot, as a fraction of spot.
    pub strike_span: f64,
    pub days_to_expiry: i64,
    pub seed: u64,
}

impl Default for SimulatedMarketConfig {
    fn default() -> Self {
        Self {
            symbol: "AAPL".to_string(),
            start_price: 232.04,
            return_std: 0.002,
            start_iv: 0.25,
            iv_step_std: 0.01,
            iv_bounds: (0.10, 0.60),
            strike_span: 0.10,
            days_to_expiry: 7,
            seed: 42,
        }
    }
}

impl SimulatedMarketConfig {
    pub fn with_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.symbol = symbol.into();
        self
    }

    pub fn with_start_price(mut self, price: f64) -> Self {
        self.start_price = price;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

struct MarketState {
    rng: ChaCha8Rng,
    price: f64,
    base_iv: f64,
    closes: Vec<(DateTime<Utc>, f64)>,
    chain: HashMap<String, OptionContract>,
}

const MAX_HISTORY: usize = 1_000;

pub struct SimulatedMarket {
    config: SimulatedMarketConfig,
    state: Mutex<MarketState>,
}

impl SimulatedMarket {
    pub fn new(config: SimulatedMarketConfig) -> Self {
        let state = MarketState {
            rng: ChaCha8Rng::seed_from_u64(config.seed),
            price: config.start_price,
            base_iv: config.start_iv,
            closes: Vec::new(),
            chain: HashMap::new(),
        };
        Self {
            config,
            state: Mutex::new(state),
        }
    }

    /// Current spot without advancing the walk.
    pub fn spot(&self) -> f64 {
        self.state.lock().price
    }

    /// Advances the underlying and the IV level by one step.
    pub fn step(&self) -> f64 {
        let mut state = self.state.lock();
        let ret = self.config.return_std * standard_normal(&mut state.rng);
        state.price = (state.price * (1.0 + ret)).max(0.01);
        let iv_move = self.config.iv_step_std * standard_normal(&mut state.rng);
        let (lo, hi) = self.config.iv_bounds;
        state.base_iv = (state.base_iv * (1.0 + iv_move)).clamp(lo, hi);

        let price = state.price;
        state.closes.push((Utc::now(), price));
        if state.closes.len() > MAX_HISTORY {
            state.closes.remove(0);
        }
        price
    }

    fn check_symbol(&self, symbol: &str) -> Result<()> {
        if symbol != self.config.symbol {
            bail!("Simulated market only serves {}, not {symbol}", self.config.symbol);
        }
        Ok(())
    }

    /// Strike spacing in cents, about half a percent of spot. Keeps the
    /// nearest strike's estimated delta inside a +/-0.05 band.
    fn strike_step_cents(spot: f64) -> i64 {
        ((spot * 0.5).round() as i64).max(1)
    }
}

fn occ_symbol(
    underlying: &str,
    expiration: NaiveDate,
    right: OptionRight,
    strike: f64,
) -> String {
    format!(
        "{underlying}{}{right}{:08}",
        expiration.format("%y%m%d"),
        (strike * 1000.0).round() as i64
    )
}

#[async_trait]
impl MarketDataSource for SimulatedMarket {
    /// Each call is one step of the walk.
    async fn latest_price(&self, symbol: &str) -> Result<Decimal> {
        self.check_symbol(symbol)?;
        let price = self.step();
        Decimal::from_f64(price)
            .map(|p| p.round_dp(2))
            .ok_or_else(|| anyhow!("Simulated price {price} not representable"))
    }

    async fn recent_bars(
        &self,
        symbol: &str,
        _timeframe: &str,
        window: usize,
    ) -> Result<Vec<PriceBar>> {
        self.check_symbol(symbol)?;
        let state = self.state.lock();
        let start = state.closes.len().saturating_sub(window);
        state.closes[start..]
            .iter()
            .map(|&(timestamp, close)| -> Result<PriceBar> {
                let close = Decimal::from_f64(close)
                    .ok_or_else(|| anyhow!("Simulated close {close} not representable"))?
                    .round_dp(2);
                Ok(PriceBar {
                    timestamp,
                    open: close,
                    high: close,
                    low: close,
                    close,
                    volume: Decimal::ZERO,
                })
            })
            .collect()
    }
}

#[async_trait]
impl OptionsChainProvider for SimulatedMarket {
    async fn list_active_contracts(&self, symbol: &str) -> Result<Vec<OptionContract>> {
        self.check_symbol(symbol)?;
        let mut state = self.state.lock();
        let spot = state.price;
        let step = Self::strike_step_cents(spot);
        let expiration = (Utc::now() + Duration::days(self.config.days_to_expiry)).date_naive();
        let lo = (spot * 100.0 * (1.0 - self.config.strike_span) / step as f64).floor() as i64;
        let hi = (spot * 100.0 * (1.0 + self.config.strike_span) / step as f64).ceil() as i64;

        let mut contracts = Vec::new();
        for k in lo.max(1)..=hi {
            let strike_dec = Decimal::new(k * step, 2);
            let Some(strike) = strike_dec.to_f64() else {
                continue;
            };
            for right in [OptionRight::Put, OptionRight::Call] {
                contracts.push(OptionContract {
                    symbol: occ_symbol(symbol, expiration, right, strike),
                    underlying: symbol.to_string(),
                    right,
                    strike: strike_dec,
                    expiration,
                });
            }
        }

        state.chain = contracts
            .iter()
            .map(|c| (c.symbol.clone(), c.clone()))
            .collect();
        Ok(contracts)
    }

    /// IV is the walked base level with put/call skew, a mild smile and noise.
    /// No greeks are quoted.
    async fn quote(&self, contract_symbol: &str) -> Result<OptionQuote> {
        let mut state = self.state.lock();
        let contract = state
            .chain
            .get(contract_symbol)
            .cloned()
            .with_context(|| format!("Unknown simulated contract {contract_symbol}"))?;
        let strike = contract
            .strike
            .to_f64()
            .with_context(|| format!("Strike of {contract_symbol} not representable"))?;
        let moneyness = (strike / state.price - 1.0).abs();
        let skew = match contract.right {
            OptionRight::Put => PUT_SKEW,
            OptionRight::Call => CALL_SKEW,
        };
        let noise = 1.0 + 0.01 * standard_normal(&mut state.rng);
        let iv = state.base_iv * skew * (1.0 + moneyness) * noise;

        Ok(OptionQuote {
            iv: Some(iv.max(0.01)),
            bid: None,
            ask: None,
            delta: None,
        })
    }
}

// =============================================================================
// Paper broker
// =============================================================================

#[derive(Debug, Clone)]
struct PaperPosition {
    qty: Decimal,
    avg_entry_price: Decimal,
}

#[derive(Default)]
struct BrokerState {
    cash: Decimal,
    marks: HashMap<String, Decimal>,
    positions: HashMap<String, PaperPosition>,
    orders: Vec<OrderAck>,
}

/// In-memory broker filling market orders at the mark.
///
/// Marks come from an attached [`MarketDataSource`] when there is one,
/// otherwise from [`PaperBroker::set_price`].
pub struct PaperBroker {
    state: Mutex<BrokerState>,
    price_source: Option<Arc<dyn MarketDataSource>>,
}

impl PaperBroker {
    pub fn new(starting_cash: Decimal) -> Self {
        Self {
            state: Mutex::new(BrokerState {
                cash: starting_cash,
                ..BrokerState::default()
            }),
            price_source: None,
        }
    }

    pub fn with_price_source(mut self, source: Arc<dyn MarketDataSource>) -> Self {
        self.price_source = Some(source);
        self
    }

    pub fn set_price(&self, symbol: &str, price: Decimal) {
        self.state.lock().marks.insert(symbol.to_string(), price);
    }

    pub fn position_qty(&self, symbol: &str) -> Decimal {
        self.state
            .lock()
            .positions
            .get(symbol)
            .map(|p| p.qty)
            .unwrap_or_default()
    }

    pub fn orders(&self) -> Vec<OrderAck> {
        self.state.lock().orders.clone()
    }

    async fn mark(&self, symbol: &str) -> Result<Decimal> {
        if let Some(source) = &self.price_source {
            let price = source.latest_price(symbol).await?;
            self.set_price(symbol, price);
            return Ok(price);
        }
        self.state
            .lock()
            .marks
            .get(symbol)
            .copied()
            .with_context(|| format!("No paper mark for {symbol}"))
    }

    fn fill(&self, symbol: &str, qty: Decimal, side: OrderSide, price: Decimal) -> OrderAck {
        let mut state = self.state.lock();
        let notional = qty * price;
        match side {
            OrderSide::Buy => {
                state.cash -= notional;
                let position = state
                    .positions
                    .entry(symbol.to_string())
                    .or_insert(PaperPosition {
                        qty: Decimal::ZERO,
                        avg_entry_price: price,
                    });
                let total = position.qty + qty;
                if !total.is_zero() {
                    position.avg_entry_price =
                        (position.avg_entry_price * position.qty + notional) / total;
                }
                position.qty = total;
            }
            OrderSide::Sell => {
                state.cash += notional;
                if let Some(position) = state.positions.get_mut(symbol) {
                    position.qty -= qty;
                }
            }
        }
        state.positions.retain(|_, p| !p.qty.is_zero());

        let ack = OrderAck {
            order_id: format!(
                "PAPER-{}-{}",
                Utc::now().timestamp_millis(),
                state.orders.len() + 1
            ),
            symbol: symbol.to_string(),
            side,
            qty,
            submitted_at: Utc::now(),
        };
        state.orders.push(ack.clone());
        ack
    }
}

#[async_trait]
impl BrokerSession for PaperBroker {
    async fn account(&self) -> Result<AccountSnapshot> {
        let state = self.state.lock();
        let holdings: Decimal = state
            .positions
            .iter()
            .map(|(symbol, p)| {
                let mark = state.marks.get(symbol).copied().unwrap_or(p.avg_entry_price);
                p.qty * mark
            })
            .sum();
        Ok(AccountSnapshot {
            equity: state.cash + holdings,
            cash: state.cash,
        })
    }

    async fn position(&self, symbol: &str) -> Result<Option<PositionSnapshot>> {
        let state = self.state.lock();
        Ok(state.positions.get(symbol).map(|p| {
            let mark = state.marks.get(symbol).copied().unwrap_or(p.avg_entry_price);
            PositionSnapshot {
                symbol: symbol.to_string(),
                qty: p.qty,
                avg_entry_price: p.avg_entry_price,
                market_value: p.qty * mark,
            }
        }))
    }

    async fn submit_market_order(
        &self,
        symbol: &str,
        qty: Decimal,
        side: OrderSide,
    ) -> Result<OrderAck> {
        if qty <= Decimal::ZERO {
            bail!("Paper order quantity must be positive, got {qty}");
        }
        let price = self.mark(symbol).await?;
        let ack = self.fill(symbol, qty, side, price);
        info!(
            order_id = %ack.order_id,
            symbol,
            %qty,
            %side,
            %price,
            "Paper fill simulated"
        );
        Ok(ack)
    }

    async fn close_position(&self, symbol: &str) -> Result<()> {
        let qty = self.position_qty(symbol);
        if qty.is_zero() {
            bail!("No paper position in {symbol}");
        }
        let side = if qty > Decimal::ZERO {
            OrderSide::Sell
        } else {
            OrderSide::Buy
        };
        let price = self.mark(symbol).await?;
        let ack = self.fill(symbol, qty.abs(), side, price);
        info!(order_id = %ack.order_id, symbol, %qty, %price, "Paper position closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::leg_selection::select_legs;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_simulated_walk_is_seeded() {
        let a = SimulatedMarket::new(SimulatedMarketConfig::default());
        let b = SimulatedMarket::new(SimulatedMarketConfig::default());
        for _ in 0..10 {
            assert_eq!(
                a.latest_price("AAPL").await.unwrap(),
                b.latest_price("AAPL").await.unwrap()
            );
        }
        let bars = a.recent_bars("AAPL", "1Min", 3).await.unwrap();
        assert_eq!(bars.len(), 3);
    }

    #[tokio::test]
    async fn test_simulated_market_rejects_other_symbols() {
        let market = SimulatedMarket::new(SimulatedMarketConfig::default());
        assert!(market.latest_price("MSFT").await.is_err());
        assert!(market.list_active_contracts("MSFT").await.is_err());
    }

    #[tokio::test]
    async fn test_simulated_chain_has_skewed_quarter_delta_legs() {
        let market = SimulatedMarket::new(SimulatedMarketConfig::default());
        let chain = market.list_active_contracts("AAPL").await.unwrap();
        assert!(chain.iter().any(|c| c.right == OptionRight::Put));
        assert!(chain.iter().any(|c| c.right == OptionRight::Call));

        let legs = select_legs(&chain, market.spot()).unwrap();
        assert!((legs.put.estimated_delta + 0.25).abs() <= 0.03);
        assert!((legs.call.estimated_delta - 0.25).abs() <= 0.03);

        let put = market.quote(&legs.put.contract.symbol).await.unwrap();
        let call = market.quote(&legs.call.contract.symbol).await.unwrap();
        assert!(put.iv.unwrap() > call.iv.unwrap());
        assert!(market.quote("AAPL990101C00001000").await.is_err());
    }

    #[tokio::test]
    async fn test_simulated_chain_legs_stay_in_default_bands_at_any_spot() {
        for start in [3.7, 12.3, 149.0, 150.0, 251.0, 1234.5] {
            let market =
                SimulatedMarket::new(SimulatedMarketConfig::default().with_start_price(start));
            let chain = market.list_active_contracts("AAPL").await.unwrap();
            let legs = select_legs(&chain, market.spot()).unwrap();
            assert!(
                (-0.30..=-0.20).contains(&legs.put.estimated_delta),
                "put delta {} at spot {start}",
                legs.put.estimated_delta
            );
            assert!(
                (0.20..=0.30).contains(&legs.call.estimated_delta),
                "call delta {} at spot {start}",
                legs.call.estimated_delta
            );
        }
    }

    #[tokio::test]
    async fn test_paper_round_trip_updates_cash() {
        let broker = PaperBroker::new(dec!(10000));
        broker.set_price("AAPL", dec!(100));
        broker
            .submit_market_order("AAPL", dec!(10), OrderSide::Buy)
            .await
            .unwrap();

        let account = broker.account().await.unwrap();
        assert_eq!(account.cash, dec!(9000));
        assert_eq!(account.equity, dec!(10000));

        broker.set_price("AAPL", dec!(110));
        let position = broker.position("AAPL").await.unwrap().unwrap();
        assert_eq!(position.market_value, dec!(1100));

        broker.close_position("AAPL").await.unwrap();
        let account = broker.account().await.unwrap();
        assert_eq!(account.cash, dec!(10100));
        assert!(broker.position("AAPL").await.unwrap().is_none());
        assert_eq!(broker.orders().len(), 2);
    }

    #[tokio::test]
    async fn test_paper_rejects_bad_orders() {
        let broker = PaperBroker::new(dec!(10000));
        assert!(broker
            .submit_market_order("AAPL", dec!(1), OrderSide::Buy)
            .await
            .is_err());
        broker.set_price("AAPL", dec!(100));
        assert!(broker
            .submit_market_order("AAPL", dec!(0), OrderSide::Buy)
            .await
            .is_err());
        assert!(broker.close_position("AAPL").await.is_err());
    }
}
