//! Turns a live signal into at most one broker action.

use std::fmt;

use anyhow::{Context, Result};
use ivspread_core::position_sizing::order_quantity;
use ivspread_core::{BrokerSession, OrderSide, SignalRecord};
use rust_decimal::Decimal;
use tracing::{debug, info};

/// What the execution step did this cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    /// A market buy was submitted.
    Opened { order_id: String, qty: Decimal },
    /// Long signal while a position is already held.
    AlreadyOpen { qty: Decimal },
    /// Long signal but equity, size and price round down to no shares.
    ZeroQuantity,
    /// Flat signal closed the open position.
    Closed { qty: Decimal },
    /// Flat signal with nothing held.
    Flat,
}

impl fmt::Display for ExecutionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Opened { order_id, qty } => write!(f, "opened {qty} ({order_id})"),
            Self::AlreadyOpen { qty } => write!(f, "holding {qty}"),
            Self::ZeroQuantity => write!(f, "skipped (zero quantity)"),
            Self::Closed { qty } => write!(f, "closed {qty}"),
            Self::Flat => write!(f, "flat"),
        }
    }
}

/// Buys `floor(size · equity · cash_buffer / price)` on a long signal unless
/// a position is open, and flattens on any other signal.
pub struct SignalExecutor<'a> {
    broker: &'a dyn BrokerSession,
    cash_buffer: f64,
}

impl<'a> SignalExecutor<'a> {
    pub fn new(broker: &'a dyn BrokerSession, cash_buffer: f64) -> Self {
        Self {
            broker,
            cash_buffer,
        }
    }

    pub async fn execute(
        &self,
        symbol: &str,
        record: &SignalRecord,
        price: Decimal,
    ) -> Result<ExecutionOutcome> {
        let position = self
            .broker
            .position(symbol)
            .await
            .with_context(|| format!("Failed to read position for {symbol}"))?
            .filter(|p| !p.qty.is_zero());

        if record.is_long() {
            if let Some(open) = position {
                debug!(symbol, qty = %open.qty, "Long signal with position already open");
                return Ok(ExecutionOutcome::AlreadyOpen { qty: open.qty });
            }

            let account = self
                .broker
                .account()
                .await
                .context("Failed to read account")?;
            let qty = order_quantity(
                account.equity,
                record.position_size,
                self.cash_buffer,
                price,
            )?;
            if qty.is_zero() {
                info!(
                    symbol,
                    equity = %account.equity,
                    size = record.position_size,
                    %price,
                    "Order quantity rounds to zero, skipping"
                );
                return Ok(ExecutionOutcome::ZeroQuantity);
            }

            let ack = self
                .broker
                .submit_market_order(symbol, qty, OrderSide::Buy)
                .await
                .with_context(|| format!("Failed to buy {qty} {symbol}"))?;
            info!(
                order_id = %ack.order_id,
                symbol,
                %qty,
                size = record.position_size,
                "Opened position"
            );
            return Ok(ExecutionOutcome::Opened {
                order_id: ack.order_id,
                qty,
            });
        }

        match position {
            Some(open) => {
                self.broker
                    .close_position(symbol)
                    .await
                    .with_context(|| format!("Failed to close {symbol}"))?;
                info!(symbol, qty = %open.qty, reason = %record.reason, "Closed position");
                Ok(ExecutionOutcome::Closed { qty: open.qty })
            }
            None => Ok(ExecutionOutcome::Flat),
        }
    }
}
