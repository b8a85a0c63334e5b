//! Validation errors shared by every boundary that accepts client input.

use crate::types::status::OrderStatus;

/// Largest quantity a single cart or order line may hold.
///
/// Quantities are stored in a Postgres `INTEGER` column.
pub const MAX_QUANTITY: u32 = i32::MAX.unsigned_abs();

/// Malformed, missing, or out-of-range input.
///
/// Field names use the wire (camelCase) spelling so messages can be shown to
/// API callers unchanged.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A required field was absent or blank.
    #[error("{field} is required")]
    MissingField {
        /// Wire name of the field.
        field: &'static str,
    },

    /// A monetary field was below zero.
    #[error("{field} must not be negative")]
    Negative {
        /// Wire name of the field.
        field: &'static str,
    },

    /// A numeric field was below its minimum.
    #[error("{field} must be at least {min}")]
    BelowMinimum {
        /// Wire name of the field.
        field: &'static str,
        /// Smallest accepted value.
        min: i64,
    },

    /// A monetary field exceeded the largest accepted amount.
    #[error("{field} must be at most {max}")]
    AmountTooLarge {
        /// Wire name of the field.
        field: &'static str,
        /// Largest accepted amount.
        max: rust_decimal::Decimal,
    },

    /// Monetary arithmetic on accepted amounts overflowed.
    #[error("{field} is too large to compute")]
    AmountOverflow {
        /// Wire name of the computed field.
        field: &'static str,
    },

    /// A text field exceeded its maximum length.
    #[error("{field} must be at most {max} characters")]
    TooLong {
        /// Wire name of the field.
        field: &'static str,
        /// Maximum accepted length.
        max: usize,
    },

    /// A field was present but could not be interpreted.
    #[error("{field} is invalid: {reason}")]
    Invalid {
        /// Wire name of the field.
        field: &'static str,
        /// Human-readable reason.
        reason: String,
    },

    /// Incrementing a line would exceed [`MAX_QUANTITY`].
    #[error("quantity for {product_ref} would exceed {max}")]
    QuantityOverflow {
        /// Canonical product reference of the line.
        product_ref: String,
        /// Maximum accepted quantity.
        max: u32,
    },

    /// An order was submitted without items.
    #[error("order must contain at least one item")]
    EmptyOrder,

    /// An order status write that the status machine forbids.
    #[error("cannot change order status from {from} to {to}")]
    IllegalTransition {
        /// Current status.
        from: OrderStatus,
        /// Requested status.
        to: OrderStatus,
    },
}

/// Validate a client-supplied quantity for a line that must exist.
///
/// # Errors
///
/// Returns [`ValidationError::BelowMinimum`] when `quantity < 1` and
/// [`ValidationError::Invalid`] when it does not fit in [`MAX_QUANTITY`].
pub fn validate_quantity(quantity: i64, field: &'static str) -> Result<u32, ValidationError> {
    if quantity < 1 {
        return Err(ValidationError::BelowMinimum { field, min: 1 });
    }

    u32::try_from(quantity)
        .ok()
        .filter(|q| *q <= MAX_QUANTITY)
        .ok_or_else(|| ValidationError::Invalid {
            field,
            reason: format!("must be at most {MAX_QUANTITY}"),
        })
}

/// Trim a required text field, rejecting blanks and oversized values.
pub(crate) fn required_text(
    value: Option<String>,
    field: &'static str,
    max: usize,
) -> Result<String, ValidationError> {
    let value = value
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
        .ok_or(ValidationError::MissingField { field })?;

    if value.chars().count() > max {
        return Err(ValidationError::TooLong { field, max });
    }

    Ok(value)
}
