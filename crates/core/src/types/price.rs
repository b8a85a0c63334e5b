//! Non-negative monetary amounts.
//!
//! Money is carried as [`Decimal`] end to end. Amounts are serialized as
//! strings (`"19.99"`) and accepted as either JSON numbers or numeric strings.
//! Every amount is at most [`MAX_AMOUNT`] and arithmetic is checked.

use core::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::validation::ValidationError;

/// Largest accepted single amount (unit price, subtotal, tax, shipping).
pub const MAX_AMOUNT: Decimal = Decimal::from_parts(1_000_000_000, 0, 0, false, 0);

/// A monetary amount that is never negative.
///
/// Used for unit prices and order totals. Currency is a storefront-wide
/// setting and is not carried per amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Price(Decimal);

impl Price {
    /// Zero.
    pub const ZERO: Self = Self(Decimal::ZERO);

    /// Construct a price, naming the field in the error for negative input.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::Negative`] if `amount < 0` and
    /// [`ValidationError::AmountTooLarge`] if `amount > MAX_AMOUNT`.
    pub fn new(amount: Decimal, field: &'static str) -> Result<Self, ValidationError> {
        if amount.is_sign_negative() && !amount.is_zero() {
            return Err(ValidationError::Negative { field });
        }
        if amount > MAX_AMOUNT {
            return Err(ValidationError::AmountTooLarge {
                field,
                max: MAX_AMOUNT,
            });
        }
        Ok(Self(amount.normalize()))
    }

    /// The underlying amount.
    #[must_use]
    pub const fn amount(self) -> Decimal {
        self.0
    }

    /// Price of `quantity` units.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::AmountOverflow`] if the product does not fit
    /// in a [`Decimal`].
    pub fn checked_times(self, quantity: u32, field: &'static str) -> Result<Self, ValidationError> {
        self.0
            .checked_mul(Decimal::from(quantity))
            .map(Self)
            .ok_or(ValidationError::AmountOverflow { field })
    }

    /// Sum of two amounts.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::AmountOverflow`] if the sum does not fit in
    /// a [`Decimal`].
    pub fn checked_add(self, rhs: Self, field: &'static str) -> Result<Self, ValidationError> {
        self.0
            .checked_add(rhs.0)
            .map(Self)
            .ok_or(ValidationError::AmountOverflow { field })
    }

    /// Sum of `prices`, failing instead of overflowing.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::AmountOverflow`] on overflow.
    pub fn checked_sum(
        prices: impl IntoIterator<Item = Self>,
        field: &'static str,
    ) -> Result<Self, ValidationError> {
        prices
            .into_iter()
            .try_fold(Self::ZERO, |acc, p| acc.checked_add(p, field))
    }
}

impl TryFrom<Decimal> for Price {
    type Error = ValidationError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value, "amount")
    }
}

impl From<Price> for Decimal {
    fn from(price: Price) -> Self {
        price.0
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::str::FromStr;

    use super::*;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_negative_rejected_with_field_name() {
        assert_eq!(
            Price::new(dec("-0.01"), "tax"),
            Err(ValidationError::Negative { field: "tax" })
        );
        assert!(Price::new(Decimal::ZERO, "tax").is_ok());
    }

    #[test]
    fn test_accepts_number_or_string() {
        let a: Price = serde_json::from_str("12.5").unwrap();
        let b: Price = serde_json::from_str("\"12.50\"").unwrap();
        assert_eq!(a, b);
        assert!(serde_json::from_str::<Price>("-1").is_err());
    }

    #[test]
    fn test_serializes_as_string() {
        let p = Price::new(dec("4.25"), "unitPrice").unwrap();
        assert_eq!(serde_json::to_string(&p).unwrap(), "\"4.25\"");
    }

    #[test]
    fn test_times_and_sum() {
        let p = Price::new(dec("2.50"), "unitPrice").unwrap();
        let total = Price::checked_sum([p.checked_times(3, "subtotal").unwrap(), p], "subtotal")
            .unwrap();
        assert_eq!(total.amount(), dec("10"));
        assert_eq!(total.to_string(), "10.00");
    }

    #[test]
    fn test_amount_above_ceiling_rejected() {
        assert!(Price::new(MAX_AMOUNT, "unitPrice").is_ok());
        assert_eq!(
            Price::new(Decimal::MAX, "unitPrice"),
            Err(ValidationError::AmountTooLarge {
                field: "unitPrice",
                max: MAX_AMOUNT,
            })
        );
        assert!(serde_json::from_str::<Price>("\"79228162514264337593543950335\"").is_err());
    }

    #[test]
    fn test_overflow_is_an_error_not_a_panic() {
        let huge = Price(Decimal::MAX);
        assert_eq!(
            huge.checked_times(2, "subtotal"),
            Err(ValidationError::AmountOverflow { field: "subtotal" })
        );
        assert_eq!(
            huge.checked_add(Price(Decimal::ONE), "total"),
            Err(ValidationError::AmountOverflow { field: "total" })
        );
        assert!(Price::checked_sum([huge, huge], "subtotal").is_err());
    }
}
