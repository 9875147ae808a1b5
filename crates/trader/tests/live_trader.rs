use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use ivspread_core::{
    AccountSnapshot, AppConfig, BrokerSession, EngineError, MarketDataSource, OptionContract,
    OptionQuote, OptionRight, OptionsChainProvider, OrderAck, OrderSide, PositionSnapshot,
    PriceBar, SignalRecord,
};
use ivspread_trader::{
    ExecutionOutcome, IvSource, LiveTrader, PaperBroker, PriceSource, SimulatedMarket,
    SimulatedMarketConfig,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 2, 14, 30, 0).unwrap()
}

fn at(i: usize) -> DateTime<Utc> {
    start() + Duration::minutes(i as i64)
}

// =============================================================================
// Test collaborators
// =============================================================================

struct FixedMarket {
    price: Option<Decimal>,
    bar_close: Option<Decimal>,
}

#[async_trait]
impl MarketDataSource for FixedMarket {
    async fn latest_price(&self, _symbol: &str) -> Result<Decimal> {
        match self.price {
            Some(p) => Ok(p),
            None => bail!("trade feed down"),
        }
    }

    async fn recent_bars(&self, _symbol: &str, _tf: &str, _window: usize) -> Result<Vec<PriceBar>> {
        match self.bar_close {
            Some(close) => Ok(vec![PriceBar {
                timestamp: start(),
                open: close,
                high: close,
                low: close,
                close,
                volume: dec!(100),
            }]),
            None => bail!("bars feed down"),
        }
    }
}

fn market(price: Decimal) -> Arc<FixedMarket> {
    Arc::new(FixedMarket {
        price: Some(price),
        bar_close: None,
    })
}

/// Two-strike chain whose quotes replay a spread series, one step per listing.
struct ScriptedChain {
    spreads: Vec<f64>,
    cursor: AtomicUsize,
    call_iv_missing: bool,
    put_delta: Option<f64>,
    call_delta: Option<f64>,
}

impl ScriptedChain {
    fn new(spreads: Vec<f64>) -> Self {
        Self {
            spreads,
            cursor: AtomicUsize::new(0),
            call_iv_missing: false,
            put_delta: Some(-0.25),
            call_delta: Some(0.25),
        }
    }
}

fn contract(right: OptionRight, strike: Decimal) -> OptionContract {
    OptionContract {
        symbol: format!("AAPL-{right}-{strike}"),
        underlying: "AAPL".to_string(),
        right,
        strike,
        expiration: NaiveDate::from_ymd_opt(2025, 1, 17).unwrap(),
    }
}

#[async_trait]
impl OptionsChainProvider for ScriptedChain {
    async fn list_active_contracts(&self, _symbol: &str) -> Result<Vec<OptionContract>> {
        self.cursor.fetch_add(1, Ordering::SeqCst);
        Ok(vec![
            contract(OptionRight::Put, dec!(224)),
            contract(OptionRight::Call, dec!(236)),
        ])
    }

    async fn quote(&self, contract_symbol: &str) -> Result<OptionQuote> {
        let step = self.cursor.load(Ordering::SeqCst) - 1;
        let spread = self.spreads.get(step).copied().unwrap_or(0.0);
        if contract_symbol.contains("-P-") {
            Ok(OptionQuote {
                iv: Some(0.25 + spread),
                delta: self.put_delta,
                ..OptionQuote::default()
            })
        } else {
            Ok(OptionQuote {
                iv: (!self.call_iv_missing).then_some(0.25),
                delta: self.call_delta,
                ..OptionQuote::default()
            })
        }
    }
}

struct DownChain;

#[async_trait]
impl OptionsChainProvider for DownChain {
    async fn list_active_contracts(&self, _symbol: &str) -> Result<Vec<OptionContract>> {
        bail!("options feed down")
    }

    async fn quote(&self, _contract_symbol: &str) -> Result<OptionQuote> {
        bail!("options feed down")
    }
}

struct DownBroker;

#[async_trait]
impl BrokerSession for DownBroker {
    async fn account(&self) -> Result<AccountSnapshot> {
        bail!("broker unreachable")
    }

    async fn position(&self, _symbol: &str) -> Result<Option<PositionSnapshot>> {
        bail!("broker unreachable")
    }

    async fn submit_market_order(
        &self,
        _symbol: &str,
        _qty: Decimal,
        _side: OrderSide,
    ) -> Result<OrderAck> {
        bail!("broker unreachable")
    }

    async fn close_position(&self, _symbol: &str) -> Result<()> {
        bail!("broker unreachable")
    }
}

/// Fills nothing and cannot report the account; position reads succeed.
struct AccountlessBroker;

#[async_trait]
impl BrokerSession for AccountlessBroker {
    async fn account(&self) -> Result<AccountSnapshot> {
        bail!("account endpoint down")
    }

    async fn position(&self, _symbol: &str) -> Result<Option<PositionSnapshot>> {
        Ok(None)
    }

    async fn submit_market_order(
        &self,
        _symbol: &str,
        _qty: Decimal,
        _side: OrderSide,
    ) -> Result<OrderAck> {
        bail!("orders disabled")
    }

    async fn close_position(&self, _symbol: &str) -> Result<()> {
        bail!("orders disabled")
    }
}

fn paper_broker(price: Decimal) -> Arc<PaperBroker> {
    let broker = PaperBroker::new(dec!(100000));
    broker.set_price("AAPL", price);
    Arc::new(broker)
}

/// Rises linearly until `peak`, then falls sharply.
fn single_peak_spread(peak: usize, tail: usize) -> Vec<f64> {
    let top = 0.01 + 0.001 * peak as f64;
    (0..=peak)
        .map(|i| 0.01 + 0.001 * i as f64)
        .chain((1..=tail).map(|k| top - 0.01 * k as f64))
        .collect()
}

// =============================================================================
// Cycles
// =============================================================================

#[tokio::test]
async fn single_peak_opens_one_cycle_late_then_flattens() {
    let peak = 130;
    let spreads = single_peak_spread(peak, 20);
    let n = spreads.len();
    let broker = paper_broker(dec!(230));
    let mut trader = LiveTrader::new(
        &AppConfig::default(),
        market(dec!(230)),
        Arc::new(ScriptedChain::new(spreads)),
        broker.clone(),
    )
    .unwrap();

    let mut reports = Vec::new();
    for i in 0..n {
        reports.push(trader.run_cycle_at(at(i)).await.unwrap());
    }

    let longs: Vec<usize> = reports
        .iter()
        .enumerate()
        .filter_map(|(i, r)| r.record.is_long().then_some(i))
        .collect();
    assert_eq!(longs, vec![peak + 1]);
    assert!(reports.iter().all(|r| r.iv_source == IvSource::Quotes));
    assert!(reports.iter().all(|r| r.price_source == PriceSource::Latest));

    let opened = match &reports[peak + 1].execution {
        ExecutionOutcome::Opened { qty, .. } => *qty,
        other => panic!("expected an opening order, got {other:?}"),
    };
    assert!(opened > Decimal::ZERO);
    assert!(reports[..=peak].iter().all(|r| r.position.is_none()));
    assert_eq!(reports[peak + 1].position.as_ref().unwrap().qty, opened);
    let account = reports[peak + 1].account.as_ref().unwrap();
    assert_eq!(account.cash, dec!(100000) - opened * dec!(230));
    assert_eq!(account.equity, dec!(100000));

    assert!(matches!(
        reports[peak + 2].execution,
        ExecutionOutcome::Closed { .. }
    ));
    assert!(reports[peak + 2].position.is_none());
    assert_eq!(
        reports[peak + 2].account.as_ref().unwrap().cash,
        dec!(100000)
    );
    assert_eq!(broker.orders().len(), 2);
    assert_eq!(broker.position_qty("AAPL"), Decimal::ZERO);
}

#[tokio::test]
async fn chain_outage_substitutes_fallback_iv() {
    let mut trader = LiveTrader::new(
        &AppConfig::default(),
        market(dec!(232.04)),
        Arc::new(DownChain),
        paper_broker(dec!(232.04)),
    )
    .unwrap();

    let report = trader.run_cycle_at(at(0)).await.unwrap();
    assert_eq!(report.iv_source, IvSource::Fallback);
    assert_eq!(report.record.reason, SignalRecord::REASON_INSUFFICIENT);
    assert!(!report.has_live_data());
    assert_eq!(trader.adapter().len(), 1);

    let row = trader.adapter().latest_row().unwrap();
    assert!((row.put25_iv - 0.22 * 1.05).abs() < 1e-12);
    assert!((row.call25_iv - 0.22 * 0.95).abs() < 1e-12);
    assert!(row.spread_iv > 0.0);
}

#[tokio::test]
async fn missing_call_iv_is_partially_substituted() {
    let mut chain = ScriptedChain::new(vec![0.03]);
    chain.call_iv_missing = true;
    let mut trader = LiveTrader::new(
        &AppConfig::default(),
        market(dec!(200)),
        Arc::new(chain),
        paper_broker(dec!(200)),
    )
    .unwrap();

    let report = trader.run_cycle_at(at(0)).await.unwrap();
    assert_eq!(report.iv_source, IvSource::Partial);
    let row = trader.adapter().latest_row().unwrap();
    assert!((row.put25_iv - 0.28).abs() < 1e-12);
    // Below the price tier the base IV is 0.25.
    assert!((row.call25_iv - 0.25 * 0.95).abs() < 1e-12);
}

#[tokio::test]
async fn out_of_band_quoted_delta_buffers_fallback_legs() {
    let mut chain = ScriptedChain::new(vec![0.03, 0.03]);
    chain.put_delta = Some(-0.45);
    let mut trader = LiveTrader::new(
        &AppConfig::default(),
        market(dec!(230)),
        Arc::new(chain),
        paper_broker(dec!(230)),
    )
    .unwrap();

    let report = trader.run_cycle_at(at(0)).await.unwrap();
    assert_eq!(report.iv_source, IvSource::Fallback);
    assert!(!report.has_live_data());
    assert_eq!(report.record.timestamp, Some(at(0)));
    assert_eq!(report.record.reason, SignalRecord::REASON_INSUFFICIENT);
    assert_eq!(report.execution, ExecutionOutcome::Flat);
    assert_eq!(trader.adapter().len(), 1);

    // Quoted put IV (0.28) is discarded along with its delta.
    let row = trader.adapter().latest_row().unwrap();
    assert!((row.put25_iv - 0.22 * 1.05).abs() < 1e-12);
    assert!((row.call25_iv - 0.22 * 0.95).abs() < 1e-12);
}

#[tokio::test]
async fn snapshot_read_failure_does_not_fail_the_cycle() {
    let mut trader = LiveTrader::new(
        &AppConfig::default(),
        market(dec!(230)),
        Arc::new(ScriptedChain::new(vec![0.02])),
        Arc::new(AccountlessBroker),
    )
    .unwrap();

    let report = trader.run_cycle_at(at(0)).await.unwrap();
    assert_eq!(report.execution, ExecutionOutcome::Flat);
    assert!(report.account.is_none());
    assert!(report.position.is_none());
    assert!(report.has_live_data());
}

#[tokio::test]
async fn price_falls_back_to_last_bar_then_config() {
    let bars_only = Arc::new(FixedMarket {
        price: None,
        bar_close: Some(dec!(231.5)),
    });
    let mut trader = LiveTrader::new(
        &AppConfig::default(),
        bars_only,
        Arc::new(ScriptedChain::new(vec![0.02])),
        paper_broker(dec!(231.5)),
    )
    .unwrap();
    let report = trader.run_cycle_at(at(0)).await.unwrap();
    assert_eq!(report.price_source, PriceSource::LastBar);
    assert_eq!(report.price, 231.5);

    let dark = Arc::new(FixedMarket {
        price: None,
        bar_close: None,
    });
    let mut trader = LiveTrader::new(
        &AppConfig::default(),
        dark,
        Arc::new(DownChain),
        paper_broker(dec!(232.04)),
    )
    .unwrap();
    let report = trader.run_cycle_at(at(0)).await.unwrap();
    assert_eq!(report.price_source, PriceSource::Fallback);
    assert_eq!(report.price, 232.04);
    assert!(!report.has_live_data());
}

#[tokio::test]
async fn broker_failure_fails_the_cycle() {
    let mut trader = LiveTrader::new(
        &AppConfig::default(),
        market(dec!(230)),
        Arc::new(ScriptedChain::new(vec![0.02])),
        Arc::new(DownBroker),
    )
    .unwrap();

    let err = trader.run_cycle_at(at(0)).await.unwrap_err();
    assert!(matches!(err, EngineError::ExternalService(_)));
    assert!(err.to_string().contains("broker unreachable"));
    // The sample was still recorded before execution failed.
    assert_eq!(trader.adapter().len(), 1);
}

// =============================================================================
// Polling loop
// =============================================================================

#[tokio::test(start_paused = true)]
async fn failing_cycles_extend_the_streak_without_stopping() {
    let mut trader = LiveTrader::new(
        &AppConfig::default(),
        market(dec!(230)),
        Arc::new(ScriptedChain::new(vec![0.02; 10])),
        Arc::new(DownBroker),
    )
    .unwrap();

    trader.run(Some(4)).await;
    assert_eq!(trader.streak().streak(), 4);
    assert_eq!(trader.adapter().len(), 4);
}

#[tokio::test(start_paused = true)]
async fn substituted_legs_extend_the_streak() {
    let mut chain = ScriptedChain::new(vec![0.02; 10]);
    // Quotes carry no delta and both strikes sit far from 25-delta at spot 200.
    chain.put_delta = None;
    chain.call_delta = None;
    let mut trader = LiveTrader::new(
        &AppConfig::default(),
        market(dec!(200)),
        Arc::new(chain),
        paper_broker(dec!(200)),
    )
    .unwrap();

    trader.run(Some(3)).await;
    assert_eq!(trader.streak().streak(), 3);
    assert_eq!(trader.adapter().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn paper_session_runs_clean() {
    let sim = Arc::new(SimulatedMarket::new(SimulatedMarketConfig::default()));
    let broker = Arc::new(PaperBroker::new(dec!(100000)).with_price_source(sim.clone()));
    let mut trader = LiveTrader::new(&AppConfig::default(), sim.clone(), sim, broker).unwrap();

    trader.run(Some(5)).await;
    assert_eq!(trader.streak().streak(), 0);
    assert_eq!(trader.adapter().len(), 5);
}

#[test]
fn rejects_bad_configuration() {
    let mut config = AppConfig::default();
    config.trading.cash_buffer = 1.5;
    let err = LiveTrader::new(
        &config,
        market(dec!(230)),
        Arc::new(DownChain),
        paper_broker(dec!(230)),
    )
    .err()
    .unwrap();
    assert!(matches!(err, EngineError::Config(_)));

    let mut config = AppConfig::default();
    config.strategy.long_window = 0;
    let err = LiveTrader::new(
        &config,
        market(dec!(230)),
        Arc::new(DownChain),
        paper_broker(dec!(230)),
    )
    .err()
    .unwrap();
    assert!(matches!(err, EngineError::InvalidParameters(_)));
}
