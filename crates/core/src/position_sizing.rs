use anyhow::Result;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;

/// Whole-share quantity for a target position fraction.
///
/// # Arguments
/// * `account_equity` - Current account equity
/// * `position_fraction` - Fraction of equity from the position sizer (0.0-1.5)
/// * `cash_buffer` - Share of the sized notional actually committed (0.0-1.0)
/// * `price` - Current underlying price
///
/// # Returns
/// `floor(position_fraction × equity × cash_buffer / price)`
///
/// # Errors
/// Returns error if parameters are invalid
pub fn order_quantity(
    account_equity: Decimal,
    position_fraction: f64,
    cash_buffer: f64,
    price: Decimal,
) -> Result<Decimal> {
    if price <= Decimal::ZERO {
        anyhow::bail!("Price must be positive");
    }

    if !(0.0..=1.0).contains(&cash_buffer) {
        anyhow::bail!("Cash buffer must be between 0 and 1");
    }

    if !position_fraction.is_finite() || position_fraction < 0.0 {
        anyhow::bail!("Position fraction must be a non-negative number");
    }

    if account_equity <= Decimal::ZERO {
        return Ok(Decimal::ZERO);
    }

    let fraction = Decimal::from_f64(position_fraction)
        .ok_or_else(|| anyhow::anyhow!("Position fraction not representable"))?;
    let buffer = Decimal::from_f64(cash_buffer)
        .ok_or_else(|| anyhow::anyhow!("Cash buffer not representable"))?;

    let notional = account_equity * fraction * buffer;

    Ok((notional / price).floor())
}
