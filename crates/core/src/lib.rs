pub mod config;
pub mod config_loader;
pub mod error;
pub mod events;
pub mod position_sizing;
pub mod traits;

pub use config::{
    AlpacaConfig, AppConfig, BackoffConfig, FallbackConfig, FallbackMode, StrategyParameters,
    TradingConfig, CALL_SKEW, PUT_SKEW,
};
pub use config_loader::ConfigLoader;
pub use error::{EngineError, EngineResult};
pub use events::{
    AccountSnapshot, IvSample, OptionContract, OptionQuote, OptionRight, OrderAck, OrderSide,
    PositionSnapshot, PriceBar, SignalRecord, SpreadSeed,
};
pub use traits::{BrokerSession, MarketDataSource, OptionsChainProvider};
