//! Batch backtest: aggregate, compute, evaluate.

use ivspread_core::{EngineResult, IvSample, SpreadSeed, StrategyParameters};
use ivspread_signals::{IvSampleAggregator, SpreadMetricsEngine, SpreadRow};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::metrics::{PerformanceEvaluator, PerformanceSummary};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestReport {
    pub rows: Vec<SpreadRow>,
    pub summary: PerformanceSummary,
}

impl BacktestReport {
    /// Indices of rows carrying a long signal.
    #[must_use]
    pub fn signal_indices(&self) -> Vec<usize> {
        self.rows
            .iter()
            .enumerate()
            .filter_map(|(i, r)| (r.signal == 1).then_some(i))
            .collect()
    }
}

pub struct BacktestEngine {
    aggregator: IvSampleAggregator,
    engine: SpreadMetricsEngine,
    evaluator: PerformanceEvaluator,
}

impl BacktestEngine {
    #[must_use]
    pub fn new(params: StrategyParameters) -> Self {
        Self {
            aggregator: IvSampleAggregator::new(&params),
            engine: SpreadMetricsEngine::new(params),
            evaluator: PerformanceEvaluator::new(),
        }
    }

    /// Runs the full pipeline over raw option samples.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::DataUnavailable` when no timestamp carries both
    /// legs, and `EngineError::ComputationIndeterminate` when nothing is left
    /// to evaluate.
    pub fn run(&self, samples: &[IvSample]) -> EngineResult<BacktestReport> {
        let seeds = self.aggregator.aggregate(samples)?;
        info!(
            samples = samples.len(),
            rows = seeds.len(),
            "Aggregated option samples"
        );
        self.run_seeds(&seeds)
    }

    /// Runs the pipeline over an already aggregated seed series.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::ComputationIndeterminate` for an empty series.
    pub fn run_seeds(&self, seeds: &[SpreadSeed]) -> EngineResult<BacktestReport> {
        let mut rows = self.engine.compute(seeds);
        let summary = self.evaluator.evaluate(&mut rows)?;

        info!(
            rows = summary.n_rows,
            trades = summary.n_trades,
            cumulative_return = summary.cumulative_return,
            sharpe = summary.sharpe_ratio,
            "Backtest complete"
        );

        Ok(BacktestReport { rows, summary })
    }
}

/// Convenience wrapper over [`BacktestEngine::run`].
///
/// # Errors
///
/// See [`BacktestEngine::run`].
pub fn run_backtest(
    samples: &[IvSample],
    params: &StrategyParameters,
) -> EngineResult<BacktestReport> {
    BacktestEngine::new(params.clone()).run(samples)
}
