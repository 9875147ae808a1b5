//! Live trading for the IV spread strategy.
//!
//! [`LiveTrader`] polls market data and the option chain, keeps the signal
//! adapter's buffer current and executes each record against a
//! [`BrokerSession`](ivspread_core::BrokerSession). The [`paper`] module
//! provides offline stand-ins for every collaborator.

pub mod backoff;
pub mod executor;
pub mod fallback;
pub mod leg_selection;
pub mod paper;
pub mod service;

pub use backoff::FailureStreak;
pub use executor::{ExecutionOutcome, SignalExecutor};
pub use fallback::{FallbackIv, FallbackLegs};
pub use leg_selection::{estimate_delta, select_legs, SelectedLeg, SelectedLegs};
pub use paper::{PaperBroker, SimulatedMarket, SimulatedMarketConfig};
pub use service::{CycleReport, IvSource, LiveTrader, PriceSource};
