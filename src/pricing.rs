//! Pricing calculator
//!
//! Subtotal computation in the store's base currency and conversion into the
//! target currency. Intermediate amounts keep full precision; rounding to two
//! decimal places happens once, at the result boundary.

use rust_decimal::{Decimal, RoundingStrategy};
use thiserror::Error;

use crate::cart::CartLine;

/// Calculation-integrity failures in pricing.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PricingError {
    /// A non-empty cart must never price to zero or less. This is an
    /// upstream bug, not a business condition, and aborts the calculation.
    #[error("non-empty cart produced non-positive subtotal {subtotal}")]
    NonPositiveSubtotal {
        /// The offending converted subtotal.
        subtotal: Decimal,
    },

    /// Converting the subtotal overflowed the representable money range.
    /// Unit prices are bounded at the cart boundary, so this can only come
    /// from an absurd stored exchange rate.
    #[error("subtotal conversion overflowed at rate {rate}")]
    ConversionOverflow {
        /// The offending exchange rate.
        rate: Decimal,
    },
}

/// Sum of `unit_price * quantity` over all lines, in the base currency.
pub fn subtotal(lines: &[CartLine]) -> Decimal {
    lines
        .iter()
        .fold(Decimal::ZERO, |acc, line| acc + line.line_total())
}

/// Subtotal converted into the target currency.
///
/// # Errors
///
/// Returns [`PricingError::NonPositiveSubtotal`] when a non-empty cart
/// converts to zero or less. A non-empty cart must never report zero value;
/// with validated lines and a positive rate this cannot happen, so hitting it
/// means an upstream bug. Returns [`PricingError::ConversionOverflow`] when
/// the stored rate is so large the conversion leaves [`Decimal`] range.
pub fn converted_subtotal(lines: &[CartLine], rate: Decimal) -> Result<Decimal, PricingError> {
    let Some(converted) = subtotal(lines).checked_mul(rate) else {
        return Err(PricingError::ConversionOverflow { rate });
    };

    if !lines.is_empty() && converted <= Decimal::ZERO {
        return Err(PricingError::NonPositiveSubtotal {
            subtotal: converted,
        });
    }

    Ok(converted)
}

/// Rounds a monetary amount to two decimal places, midpoints away from zero.
pub(crate) fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

#[cfg(test)]
mod tests {
    use testresult::TestResult;

    use crate::cart::ItemKind;

    use super::*;

    fn line(price: Decimal, quantity: u32) -> Result<CartLine, crate::cart::CartError> {
        CartLine::new(1, ItemKind::File, "item", price, quantity)
    }

    #[test]
    fn subtotal_sums_extended_prices() -> TestResult {
        let lines = [
            line(Decimal::new(1000, 2), 2)?,
            line(Decimal::new(550, 2), 1)?,
        ];

        assert_eq!(subtotal(&lines), Decimal::new(2550, 2));

        Ok(())
    }

    #[test]
    fn subtotal_of_empty_cart_is_zero() {
        assert_eq!(subtotal(&[]), Decimal::ZERO);
    }

    #[test]
    fn converted_subtotal_applies_rate() -> TestResult {
        let lines = [line(Decimal::new(2000, 2), 1)?];
        let converted = converted_subtotal(&lines, Decimal::new(9, 1))?;

        assert_eq!(converted, Decimal::new(1800, 2));

        Ok(())
    }

    #[test]
    fn converted_subtotal_of_empty_cart_is_zero() -> TestResult {
        let converted = converted_subtotal(&[], Decimal::ONE)?;

        assert_eq!(converted, Decimal::ZERO);

        Ok(())
    }

    #[test]
    fn non_empty_cart_pricing_to_zero_is_an_integrity_failure() -> TestResult {
        let lines = [line(Decimal::ZERO, 3)?];
        let result = converted_subtotal(&lines, Decimal::ONE);

        assert_eq!(
            result,
            Err(PricingError::NonPositiveSubtotal {
                subtotal: Decimal::ZERO
            })
        );

        Ok(())
    }

    #[test]
    fn conversion_overflow_is_an_integrity_failure() -> TestResult {
        let lines = [line(crate::cart::MAX_UNIT_PRICE, u32::MAX)?];
        let result = converted_subtotal(&lines, Decimal::MAX);

        assert_eq!(
            result,
            Err(PricingError::ConversionOverflow { rate: Decimal::MAX })
        );

        Ok(())
    }

    #[test]
    fn round_money_uses_two_places_midpoint_away_from_zero() {
        assert_eq!(round_money(Decimal::new(12345, 3)), Decimal::new(1235, 2));
        assert_eq!(round_money(Decimal::new(12344, 3)), Decimal::new(1234, 2));
    }
}
