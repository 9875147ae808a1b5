//! Tick-by-tick signal evaluation over a bounded history.
//!
//! The adapter keeps just enough seeds for every statistic the latest row
//! depends on, and runs them through [`SpreadMetricsEngine::compute`]. Once
//! the buffer is full, each record equals the last row of a batch
//! computation over the whole history seen so far.

use std::collections::VecDeque;

use ivspread_core::{EngineError, EngineResult, SignalRecord, SpreadSeed, StrategyParameters};
use tracing::{debug, warn};

use crate::metrics::{SpreadMetricsEngine, SpreadRow};

pub struct LiveSignalAdapter {
    engine: SpreadMetricsEngine,
    buffer: VecDeque<SpreadSeed>,
    capacity: usize,
    min_rows: usize,
}

impl LiveSignalAdapter {
    #[must_use]
    pub fn new(params: StrategyParameters) -> Self {
        // Latest signal needs full windows one row back, plus the row itself.
        let min_rows = params.signal_warmup() + 1;
        let capacity = (params.longest_window() + 1)
            .max(params.peak_min_distance + 2)
            .max(4);
        Self {
            engine: SpreadMetricsEngine::new(params),
            buffer: VecDeque::with_capacity(capacity),
            capacity,
            min_rows,
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// True once a signal can be evaluated for the newest row.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.buffer.len() >= self.min_rows
    }

    /// Appends a seed, evicting the oldest beyond capacity.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::DataUnavailable` if the seed is not newer than
    /// the last buffered one. The buffer is left unchanged.
    pub fn push(&mut self, seed: SpreadSeed) -> EngineResult<()> {
        if let Some(last) = self.buffer.back() {
            if seed.timestamp <= last.timestamp {
                return Err(EngineError::DataUnavailable(format!(
                    "stale sample at {} (last buffered {})",
                    seed.timestamp, last.timestamp
                )));
            }
        }
        self.buffer.push_back(seed);
        while self.buffer.len() > self.capacity {
            self.buffer.pop_front();
        }
        Ok(())
    }

    /// Runs the buffer through the batch engine.
    #[must_use]
    pub fn rows(&self) -> Vec<SpreadRow> {
        let seeds: Vec<SpreadSeed> = self.buffer.iter().copied().collect();
        self.engine.compute(&seeds)
    }

    #[must_use]
    pub fn latest_row(&self) -> Option<SpreadRow> {
        self.rows().pop()
    }

    /// Signal record for the newest buffered seed.
    #[must_use]
    pub fn evaluate(&self) -> SignalRecord {
        let Some(last) = self.buffer.back() else {
            return SignalRecord::insufficient(None, 0.0);
        };
        let spread = last.put25_iv - last.call25_iv;

        if !self.is_ready() {
            debug!(
                buffered = self.buffer.len(),
                required = self.min_rows,
                "Warming up live buffer"
            );
            return SignalRecord::insufficient(Some(last.timestamp), spread);
        }

        match self.latest_row() {
            Some(row) => {
                let reason = if row.signal == 1 {
                    SignalRecord::REASON_LONG
                } else {
                    SignalRecord::REASON_NONE
                };
                SignalRecord {
                    timestamp: Some(row.timestamp),
                    signal: row.signal,
                    position_size: row.position_size,
                    spread_iv: row.spread_iv,
                    reason: reason.to_string(),
                }
            }
            None => SignalRecord::insufficient(Some(last.timestamp), spread),
        }
    }

    /// One tick: push the sample if there is one, then evaluate.
    ///
    /// A missing or rejected sample yields an "insufficient data" record and
    /// leaves the buffer as it was.
    pub fn on_sample(&mut self, sample: Option<SpreadSeed>) -> SignalRecord {
        let Some(seed) = sample else {
            return SignalRecord::insufficient(None, 0.0);
        };
        let spread = seed.put25_iv - seed.call25_iv;
        if let Err(e) = self.push(seed) {
            warn!(error = %e, "Rejected live sample");
            return SignalRecord::insufficient(Some(seed.timestamp), spread);
        }
        self.evaluate()
    }
}
