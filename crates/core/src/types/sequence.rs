//! Human-readable order and invoice numbers.
//!
//! Numbers have the form `PREFIX-YYYYMMDD-NNNN`:
//!
//! - `PREFIX` is `ORD` or `INV` depending on the [`SequencePurpose`]
//! - `YYYYMMDD` is the UTC calendar day the number was drawn
//! - `NNNN` is the zero-padded per-day counter, starting at 1
//!
//! Only formatting and parsing live here; the atomic counter is a storage
//! concern.

use core::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Largest counter value that fits the four-digit suffix.
pub const MAX_SEQUENCE: u32 = 9999;

/// What a sequence number identifies. Each purpose has its own counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SequencePurpose {
    Order,
    Invoice,
}

impl SequencePurpose {
    /// Number prefix.
    #[must_use]
    pub const fn prefix(self) -> &'static str {
        match self {
            Self::Order => "ORD",
            Self::Invoice => "INV",
        }
    }

    /// Storage key for the counter row.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Order => "order",
            Self::Invoice => "invoice",
        }
    }
}

impl fmt::Display for SequencePurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Render a sequence number.
///
/// Returns `None` when `count` is zero or above [`MAX_SEQUENCE`].
///
/// ```
/// use chrono::NaiveDate;
/// use cartwheel_core::{SequencePurpose, format_sequence_number};
///
/// let day = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
/// assert_eq!(
///     format_sequence_number(SequencePurpose::Order, day, 1).as_deref(),
///     Some("ORD-20250101-0001")
/// );
/// assert_eq!(format_sequence_number(SequencePurpose::Invoice, day, 10_000), None);
/// ```
#[must_use]
pub fn format_sequence_number(purpose: SequencePurpose, day: NaiveDate, count: u32) -> Option<String> {
    if count == 0 || count > MAX_SEQUENCE {
        return None;
    }
    Some(format!(
        "{}-{}-{count:04}",
        purpose.prefix(),
        day.format("%Y%m%d")
    ))
}

/// Split a sequence number into its parts.
///
/// Returns `None` for anything that [`format_sequence_number`] could not have
/// produced.
#[must_use]
pub fn parse_sequence_number(number: &str) -> Option<(SequencePurpose, NaiveDate, u32)> {
    let mut parts = number.split('-');
    let prefix = parts.next()?;
    let day = parts.next()?;
    let count = parts.next()?;
    if parts.next().is_some() || day.len() != 8 || count.len() != 4 {
        return None;
    }

    let purpose = match prefix {
        "ORD" => SequencePurpose::Order,
        "INV" => SequencePurpose::Invoice,
        _ => return None,
    };
    if !count.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let day = NaiveDate::parse_from_str(day, "%Y%m%d").ok()?;
    let count: u32 = count.parse().ok()?;
    if count == 0 {
        return None;
    }

    Some((purpose, day, count))
}
