//! Tax, shipping and loyalty arithmetic shared by the cart and checkout.

use rust_decimal::Decimal;
use serde::Serialize;

use crate::domain::value_objects::{round_cents, whole_points};

/// 21% VAT.
pub const TAX_RATE: Decimal = Decimal::from_parts(21, 0, 0, false, 2);
/// Orders at or above this subtotal ship for free.
pub const FREE_SHIPPING_THRESHOLD: Decimal = Decimal::from_parts(50, 0, 0, false, 0);
pub const FLAT_SHIPPING_RATE: Decimal = Decimal::from_parts(495, 0, 0, false, 2);
/// Largest amount a stored money column (`NUMERIC(12, 2)`) holds.
pub const MAX_STORED_AMOUNT: Decimal = Decimal::from_parts(3_567_587_327, 232, 0, false, 2);

pub fn tax_for(subtotal: Decimal) -> Decimal { round_cents(subtotal * TAX_RATE) }

pub fn shipping_for(subtotal: Decimal) -> Decimal {
    if subtotal >= FREE_SHIPPING_THRESHOLD { Decimal::ZERO } else { FLAT_SHIPPING_RATE }
}

pub fn loyalty_points_for(subtotal: Decimal) -> i64 { whole_points(subtotal) }

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Totals {
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub shipping_cost: Decimal,
    pub total: Decimal,
}

impl Totals {
    pub fn from_subtotal(subtotal: Decimal, shipping_cost: Decimal) -> Self {
        let subtotal = round_cents(subtotal);
        let tax = tax_for(subtotal);
        Self { subtotal, tax, shipping_cost, total: subtotal + tax + shipping_cost }
    }

    /// Totals for a line sum using the standard shipping rule.
    pub fn with_standard_shipping(subtotal: Decimal) -> Self {
        Self::from_subtotal(subtotal, shipping_for(round_cents(subtotal)))
    }
}
