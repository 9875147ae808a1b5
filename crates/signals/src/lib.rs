pub mod aggregator;
pub mod generator;
pub mod live;
pub mod metrics;
pub mod peaks;
pub mod rolling;
pub mod sizing;

pub use aggregator::IvSampleAggregator;
pub use generator::SignalGenerator;
pub use live::LiveSignalAdapter;
pub use metrics::{SpreadMetricsEngine, SpreadRow};
pub use peaks::find_peaks;
pub use sizing::PositionSizer;
