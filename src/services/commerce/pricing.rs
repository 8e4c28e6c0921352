//! Order money arithmetic.
//!
//! Amounts are whole rupiah. The platform fee is 5% of the subtotal rounded to
//! 0 decimal places (midpoint away from zero) and the order total is the
//! subtotal plus that fee, so the two always add up exactly.

use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::Serialize;
use utoipa::ToSchema;

/// Platform surcharge applied to every order subtotal
pub const PLATFORM_FEE_RATE: Decimal = dec!(0.05);

/// Decimal places kept on IDR amounts
pub const CURRENCY_SCALE: u32 = 0;

/// Computed amounts for an order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct OrderTotals {
    pub subtotal: Decimal,
    pub platform_fee: Decimal,
    pub total_amount: Decimal,
}

pub fn line_total(unit_price: Decimal, quantity: i32) -> Decimal {
    unit_price * Decimal::from(quantity)
}

/// Sum of `unit_price * quantity` across lines.
pub fn subtotal<I>(lines: I) -> Decimal
where
    I: IntoIterator<Item = (Decimal, i32)>,
{
    lines
        .into_iter()
        .map(|(price, qty)| line_total(price, qty))
        .sum()
}

/// Rounds to [`CURRENCY_SCALE`] places, midpoint away from zero.
pub fn round_amount(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(CURRENCY_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// True when `amount` carries no digits below [`CURRENCY_SCALE`].
pub fn is_whole_amount(amount: Decimal) -> bool {
    round_amount(amount) == amount
}

pub fn platform_fee(subtotal: Decimal) -> Decimal {
    round_amount(subtotal * PLATFORM_FEE_RATE)
}

impl OrderTotals {
    pub fn from_subtotal(subtotal: Decimal) -> Self {
        let platform_fee = platform_fee(subtotal);
        Self {
            subtotal,
            platform_fee,
            total_amount: subtotal + platform_fee,
        }
    }
}
