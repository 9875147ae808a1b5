pub mod data_provider;
pub mod engine;
pub mod metrics;
pub mod report;
pub mod synthetic;

pub use data_provider::{write_rows_csv, write_samples_csv, HistoricalIvProvider};
pub use engine::{run_backtest, BacktestEngine, BacktestReport};
pub use metrics::{PerformanceEvaluator, PerformanceSummary};
pub use report::SummaryFormatter;
pub use synthetic::{SyntheticConfig, SyntheticIvGenerator};
