//! Error taxonomy for the IV spread engine.
//!
//! Only `Config` and `InvalidParameters` are fatal, and only at startup.
//! The live service absorbs the other variants at the cycle boundary.

use thiserror::Error;

pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum EngineError {
    /// Quotes, contracts or legs missing after filtering.
    #[error("data unavailable: {0}")]
    DataUnavailable(String),

    /// A statistic that cannot be computed from the given input.
    #[error("computation indeterminate: {0}")]
    ComputationIndeterminate(String),

    /// A collaborator (market data, options chain, broker) failed.
    #[error("external service error: {0}")]
    ExternalService(String),

    #[error("invalid strategy parameters: {0}")]
    InvalidParameters(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl EngineError {
    /// Wraps any collaborator failure.
    pub fn external(err: impl std::fmt::Display) -> Self {
        Self::ExternalService(err.to_string())
    }

    /// True for errors the polling loop may absorb and retry.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::DataUnavailable(_) | Self::ComputationIndeterminate(_) | Self::ExternalService(_)
        )
    }
}
