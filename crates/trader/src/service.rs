//! Live polling loop.
//!
//! One [`LiveTrader`] serves one symbol. Each cycle resolves a price,
//! samples the 25-delta legs, feeds the signal adapter and hands the
//! resulting record to the executor. Data problems degrade to fallbacks;
//! only order failures fail a cycle.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use ivspread_core::{
    AccountSnapshot, AppConfig, BrokerSession, EngineError, EngineResult, IvSample,
    MarketDataSource, OptionsChainProvider, PositionSnapshot, SignalRecord, SpreadSeed,
};
use ivspread_signals::{IvSampleAggregator, LiveSignalAdapter};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use tracing::{error, info, warn};

use crate::backoff::FailureStreak;
use crate::executor::{ExecutionOutcome, SignalExecutor};
use crate::fallback::{FallbackIv, FallbackLegs};
use crate::leg_selection::{select_legs, SelectedLeg};

/// Where this cycle's underlying price came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceSource {
    Latest,
    LastBar,
    Fallback,
}

/// Where this cycle's leg IVs came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IvSource {
    Quotes,
    /// One leg quoted, the other substituted.
    Partial,
    Fallback,
}

impl fmt::Display for PriceSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Latest => write!(f, "latest"),
            Self::LastBar => write!(f, "last_bar"),
            Self::Fallback => write!(f, "fallback"),
        }
    }
}

impl fmt::Display for IvSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Quotes => write!(f, "quotes"),
            Self::Partial => write!(f, "partial"),
            Self::Fallback => write!(f, "fallback"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CycleReport {
    pub timestamp: DateTime<Utc>,
    pub price: f64,
    pub price_source: PriceSource,
    pub iv_source: IvSource,
    pub record: SignalRecord,
    pub execution: ExecutionOutcome,
    /// Account after execution; `None` when the broker could not report it.
    pub account: Option<AccountSnapshot>,
    /// Open position after execution; `None` when flat or unreported.
    pub position: Option<PositionSnapshot>,
}

impl CycleReport {
    /// False when the price or both option legs were substituted.
    pub fn has_live_data(&self) -> bool {
        self.price_source != PriceSource::Fallback && self.iv_source != IvSource::Fallback
    }
}

struct LegReading {
    iv: f64,
    delta: f64,
    quoted: bool,
}

pub struct LiveTrader {
    symbol: String,
    timeframe: String,
    lookback: usize,
    poll_interval: Duration,
    cash_buffer: f64,
    aggregator: IvSampleAggregator,
    adapter: LiveSignalAdapter,
    fallback: FallbackIv,
    /// Put and call deltas stamped on substituted legs: the band midpoints.
    fallback_deltas: (f64, f64),
    streak: FailureStreak,
    market: Arc<dyn MarketDataSource>,
    chain: Arc<dyn OptionsChainProvider>,
    broker: Arc<dyn BrokerSession>,
}

impl LiveTrader {
    /// # Errors
    ///
    /// Returns `EngineError::InvalidParameters` for unusable strategy
    /// parameters and `EngineError::Config` for a bad cash buffer.
    pub fn new(
        config: &AppConfig,
        market: Arc<dyn MarketDataSource>,
        chain: Arc<dyn OptionsChainProvider>,
        broker: Arc<dyn BrokerSession>,
    ) -> EngineResult<Self> {
        config.strategy.validate()?;
        let trading = &config.trading;
        if !(trading.cash_buffer > 0.0 && trading.cash_buffer <= 1.0) {
            return Err(EngineError::Config(format!(
                "trading.cash_buffer must be in (0, 1], got {}",
                trading.cash_buffer
            )));
        }

        Ok(Self {
            symbol: trading.symbol.clone(),
            timeframe: trading.timeframe.clone(),
            lookback: trading.lookback,
            poll_interval: Duration::from_secs(trading.poll_interval_secs),
            cash_buffer: trading.cash_buffer,
            aggregator: IvSampleAggregator::new(&config.strategy),
            adapter: LiveSignalAdapter::new(config.strategy.clone()),
            fallback: FallbackIv::new(&config.fallback),
            fallback_deltas: (
                midpoint(config.strategy.put_delta_band),
                midpoint(config.strategy.call_delta_band),
            ),
            streak: FailureStreak::new(config.backoff.clone()),
            market,
            chain,
            broker,
        })
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn adapter(&self) -> &LiveSignalAdapter {
        &self.adapter
    }

    pub fn streak(&self) -> &FailureStreak {
        &self.streak
    }

    /// Latest price, then the last bar's close, then the configured fallback.
    async fn resolve_price(&self) -> (f64, PriceSource) {
        match self.market.latest_price(&self.symbol).await {
            Ok(price) => match price.to_f64().filter(|p| *p > 0.0) {
                Some(p) => return (p, PriceSource::Latest),
                None => warn!(symbol = %self.symbol, %price, "Ignoring non-positive latest price"),
            },
            Err(e) => warn!(symbol = %self.symbol, error = %e, "Latest price unavailable"),
        }

        match self
            .market
            .recent_bars(&self.symbol, &self.timeframe, self.lookback)
            .await
        {
            Ok(bars) => {
                if let Some(close) = bars
                    .last()
                    .and_then(|bar| bar.close.to_f64())
                    .filter(|p| *p > 0.0)
                {
                    return (close, PriceSource::LastBar);
                }
                warn!(symbol = %self.symbol, "No usable bars");
            }
            Err(e) => warn!(symbol = %self.symbol, error = %e, "Recent bars unavailable"),
        }

        let price = self.fallback.price();
        warn!(symbol = %self.symbol, price, "Using fallback price");
        (price, PriceSource::Fallback)
    }

    async fn read_leg(
        &mut self,
        leg: &SelectedLeg,
        substitute: &mut Option<FallbackLegs>,
        price: f64,
        is_put: bool,
    ) -> LegReading {
        let quoted_delta = match self.chain.quote(&leg.contract.symbol).await {
            Ok(quote) => {
                if let Some(iv) = quote.iv {
                    return LegReading {
                        iv,
                        delta: leg.delta(quote.delta),
                        quoted: true,
                    };
                }
                warn!(contract = %leg.contract.symbol, "Quote carries no IV, using fallback");
                quote.delta
            }
            Err(e) => {
                warn!(contract = %leg.contract.symbol, error = %e, "Quote unavailable, using fallback");
                None
            }
        };
        let legs = *substitute.get_or_insert_with(|| self.fallback.legs(price));
        LegReading {
            iv: if is_put { legs.put_iv } else { legs.call_iv },
            delta: leg.delta(quoted_delta),
            quoted: false,
        }
    }

    /// Builds this cycle's two-leg sample, substituting what is missing.
    async fn sample_legs(&mut self, timestamp: DateTime<Utc>, price: f64) -> (IvSample, IvSource) {
        let legs = match self.chain.list_active_contracts(&self.symbol).await {
            Ok(contracts) => {
                let selected = select_legs(&contracts, price);
                if selected.is_none() {
                    warn!(
                        symbol = %self.symbol,
                        contracts = contracts.len(),
                        "No put/call pair in nearest expiration"
                    );
                }
                selected
            }
            Err(e) => {
                warn!(symbol = %self.symbol, error = %e, "Option chain unavailable");
                None
            }
        };

        let Some(legs) = legs else {
            return (self.fallback_sample(timestamp, price), IvSource::Fallback);
        };

        let mut substitute = None;
        let put = self.read_leg(&legs.put, &mut substitute, price, true).await;
        let call = self.read_leg(&legs.call, &mut substitute, price, false).await;
        let source = match (put.quoted, call.quoted) {
            (true, true) => IvSource::Quotes,
            (false, false) => IvSource::Fallback,
            _ => IvSource::Partial,
        };

        let sample = IvSample {
            timestamp,
            call_iv: call.iv,
            put_iv: put.iv,
            call_delta: call.delta,
            put_delta: put.delta,
            underlying_price: price,
        };
        (sample, source)
    }

    /// Both legs substituted at the delta band midpoints.
    fn fallback_sample(&mut self, timestamp: DateTime<Utc>, price: f64) -> IvSample {
        let substitute = self.fallback.legs(price);
        warn!(
            symbol = %self.symbol,
            put_iv = substitute.put_iv,
            call_iv = substitute.call_iv,
            "Using fallback IV for both legs"
        );
        IvSample {
            timestamp,
            call_iv: substitute.call_iv,
            put_iv: substitute.put_iv,
            call_delta: self.fallback_deltas.1,
            put_delta: self.fallback_deltas.0,
            underlying_price: price,
        }
    }

    fn seed(&self, sample: &IvSample) -> Option<SpreadSeed> {
        match self.aggregator.aggregate(std::slice::from_ref(sample)) {
            Ok(seeds) => seeds.into_iter().next(),
            Err(e) => {
                warn!(
                    symbol = %self.symbol,
                    put_delta = sample.put_delta,
                    call_delta = sample.call_delta,
                    error = %e,
                    "Sample legs outside delta bands"
                );
                None
            }
        }
    }

    /// One cycle stamped with `timestamp`.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::ExternalService` when order handling fails; data
    /// outages and snapshot reads never fail a cycle.
    pub async fn run_cycle_at(&mut self, timestamp: DateTime<Utc>) -> EngineResult<CycleReport> {
        let (price, price_source) = self.resolve_price().await;
        let (sample, mut iv_source) = self.sample_legs(timestamp, price).await;
        let seed = match self.seed(&sample) {
            Some(seed) => Some(seed),
            None => {
                iv_source = IvSource::Fallback;
                let substitute = self.fallback_sample(timestamp, price);
                self.seed(&substitute)
            }
        };
        let record = self.adapter.on_sample(seed);

        let order_price = Decimal::from_f64(price)
            .map(|p| p.round_dp(4))
            .ok_or_else(|| EngineError::DataUnavailable(format!("price {price} not representable")))?;
        let executor = SignalExecutor::new(self.broker.as_ref(), self.cash_buffer);
        let execution = executor
            .execute(&self.symbol, &record, order_price)
            .await
            .map_err(|e| EngineError::external(format!("{e:#}")))?;
        let (account, position) = self.snapshot().await;
        let equity = account.as_ref().map(|a| a.equity);
        let position_qty = position.as_ref().map_or(Decimal::ZERO, |p| p.qty);

        info!(
            symbol = %self.symbol,
            price,
            %price_source,
            %iv_source,
            spread = record.spread_iv,
            signal = record.signal,
            size = record.position_size,
            reason = %record.reason,
            buffered = self.adapter.len(),
            %execution,
            ?equity,
            %position_qty,
            "Cycle complete"
        );

        Ok(CycleReport {
            timestamp,
            price,
            price_source,
            iv_source,
            record,
            execution,
            account,
            position,
        })
    }

    /// Account and position after execution. Read failures are logged only.
    async fn snapshot(&self) -> (Option<AccountSnapshot>, Option<PositionSnapshot>) {
        let account = match self.broker.account().await {
            Ok(account) => Some(account),
            Err(e) => {
                warn!(symbol = %self.symbol, error = %e, "Account snapshot unavailable");
                None
            }
        };
        let position = match self.broker.position(&self.symbol).await {
            Ok(position) => position,
            Err(e) => {
                warn!(symbol = %self.symbol, error = %e, "Position snapshot unavailable");
                None
            }
        };
        (account, position)
    }

    pub async fn run_cycle(&mut self) -> EngineResult<CycleReport> {
        self.run_cycle_at(Utc::now()).await
    }

    /// Polls until `max_cycles` cycles have run, or forever when `None`.
    ///
    /// Failures never end the loop. They lengthen the wait before the next
    /// cycle and raise an alert once the streak is long enough.
    pub async fn run(&mut self, max_cycles: Option<u64>) {
        info!(
            symbol = %self.symbol,
            poll_secs = self.poll_interval.as_secs(),
            buffer_capacity = self.adapter.capacity(),
            "Live trader started"
        );

        let mut cycles = 0u64;
        loop {
            match self.run_cycle().await {
                Ok(report) if report.has_live_data() => self.streak.record_success(),
                Ok(report) => {
                    warn!(
                        symbol = %self.symbol,
                        price_source = %report.price_source,
                        iv_source = %report.iv_source,
                        "No live market data this cycle"
                    );
                    self.streak.record_failure();
                }
                Err(e) => {
                    error!(symbol = %self.symbol, error = %e, "Cycle failed");
                    self.streak.record_failure();
                }
            }

            cycles += 1;
            if max_cycles.is_some_and(|max| cycles >= max) {
                info!(symbol = %self.symbol, cycles, "Cycle limit reached, stopping");
                return;
            }

            let delay = self.streak.delay(self.poll_interval);
            tokio::time::sleep(delay).await;
        }
    }
}

fn midpoint((lo, hi): (f64, f64)) -> f64 {
    (lo + hi) / 2.0
}
