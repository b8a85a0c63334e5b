//! Newtype identifiers for type-safe references.
//!
//! Client identities and product references arrive from untrusted input, so
//! each type canonicalizes once at the boundary (`parse`) and every
//! comparison, map key, and storage operation afterwards uses the canonical
//! form.

use core::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::types::validation::ValidationError;

/// Implement `sqlx` `Type`, `Encode`, and `Decode` for a `String`-backed newtype.
///
/// Database values are assumed canonical (they were canonicalized before
/// being written), so decoding does not re-validate.
macro_rules! impl_text_sqlx {
    ($name:ident) => {
        #[cfg(feature = "postgres")]
        impl ::sqlx::Type<::sqlx::Postgres> for $name {
            fn type_info() -> ::sqlx::postgres::PgTypeInfo {
                <String as ::sqlx::Type<::sqlx::Postgres>>::type_info()
            }

            fn compatible(ty: &::sqlx::postgres::PgTypeInfo) -> bool {
                <String as ::sqlx::Type<::sqlx::Postgres>>::compatible(ty)
            }
        }

        #[cfg(feature = "postgres")]
        impl<'r> ::sqlx::Decode<'r, ::sqlx::Postgres> for $name {
            fn decode(
                value: ::sqlx::postgres::PgValueRef<'r>,
            ) -> ::core::result::Result<Self, ::sqlx::error::BoxDynError> {
                let s = <String as ::sqlx::Decode<::sqlx::Postgres>>::decode(value)?;
                Ok(Self(s))
            }
        }

        #[cfg(feature = "postgres")]
        impl ::sqlx::Encode<'_, ::sqlx::Postgres> for $name {
            fn encode_by_ref(
                &self,
                buf: &mut ::sqlx::postgres::PgArgumentBuffer,
            ) -> ::std::result::Result<::sqlx::encode::IsNull, ::sqlx::error::BoxDynError> {
                <String as ::sqlx::Encode<::sqlx::Postgres>>::encode_by_ref(&self.0, buf)
            }
        }

        impl ::core::fmt::Display for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

// =============================================================================
// ClientId
// =============================================================================

/// Stable identity of an authenticated shopper, as returned by the identity
/// resolver.
///
/// ## Constraints
///
/// - 1-128 characters after trimming
/// - No whitespace or control characters
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ClientId(String);

impl ClientId {
    /// Maximum length of a client identity.
    pub const MAX_LENGTH: usize = 128;

    /// Parse a client identity.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] if the identity is blank, too long, or
    /// contains whitespace/control characters.
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::MissingField { field: "clientId" });
        }
        if trimmed.chars().count() > Self::MAX_LENGTH {
            return Err(ValidationError::TooLong {
                field: "clientId",
                max: Self::MAX_LENGTH,
            });
        }
        if trimmed
            .chars()
            .any(|c| c.is_whitespace() || c.is_control())
        {
            return Err(ValidationError::Invalid {
                field: "clientId",
                reason: "must not contain whitespace".to_string(),
            });
        }
        Ok(Self(trimmed.to_owned()))
    }

    /// Returns the identity as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ClientId {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ClientId> for String {
    fn from(id: ClientId) -> Self {
        id.0
    }
}

impl_text_sqlx!(ClientId);

// =============================================================================
// ProductRef
// =============================================================================

/// Canonical reference to a catalog product.
///
/// Product references reach the service as JSON strings, as integers, or as
/// `{"$oid": "..."}` objects, depending on which client produced them. All
/// three collapse to one canonical string:
///
/// - surrounding whitespace is trimmed
/// - integers are rendered in decimal
/// - 24-digit hexadecimal object ids are lower-cased
///
/// ```
/// use cartwheel_core::ProductRef;
///
/// let a: ProductRef = serde_json::from_str(r#""65A1F0C2B3D4E5F601234567""#).unwrap();
/// let b: ProductRef = serde_json::from_str(r#"{"$oid": "65a1f0c2b3d4e5f601234567"}"#).unwrap();
/// assert_eq!(a, b);
///
/// let n: ProductRef = serde_json::from_str("42").unwrap();
/// assert_eq!(n.as_str(), "42");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ProductRef(String);

impl ProductRef {
    /// Maximum length of a product reference.
    pub const MAX_LENGTH: usize = 128;

    /// Length of a hexadecimal object id.
    const OBJECT_ID_LENGTH: usize = 24;

    /// Parse and canonicalize a product reference.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] if the reference is blank or too long.
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::MissingField { field: "productRef" });
        }
        if trimmed.chars().count() > Self::MAX_LENGTH {
            return Err(ValidationError::TooLong {
                field: "productRef",
                max: Self::MAX_LENGTH,
            });
        }

        let is_object_id = trimmed.len() == Self::OBJECT_ID_LENGTH
            && trimmed.chars().all(|c| c.is_ascii_hexdigit());

        if is_object_id {
            Ok(Self(trimmed.to_ascii_lowercase()))
        } else {
            Ok(Self(trimmed.to_owned()))
        }
    }

    /// Returns the canonical reference as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<i64> for ProductRef {
    fn from(value: i64) -> Self {
        Self(value.to_string())
    }
}

impl std::str::FromStr for ProductRef {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl<'de> Deserialize<'de> for ProductRef {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawRef {
            Text(String),
            Integer(i64),
            Object {
                #[serde(rename = "$oid")]
                oid: String,
            },
        }

        match RawRef::deserialize(deserializer)? {
            RawRef::Text(s) | RawRef::Object { oid: s } => {
                Self::parse(&s).map_err(serde::de::Error::custom)
            }
            RawRef::Integer(n) => Ok(Self::from(n)),
        }
    }
}

impl_text_sqlx!(ProductRef);

// =============================================================================
// IdempotencyKey
// =============================================================================

/// Client-chosen token that makes an add-to-cart retry safe.
///
/// ## Constraints
///
/// - 1-128 characters
/// - Visible ASCII only (`!` through `~`)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    /// Maximum length of an idempotency key.
    pub const MAX_LENGTH: usize = 128;

    /// Parse an idempotency key.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] if the key is empty, too long, or
    /// contains characters outside visible ASCII.
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        if raw.is_empty() {
            return Err(ValidationError::MissingField {
                field: "idempotencyKey",
            });
        }
        if raw.len() > Self::MAX_LENGTH {
            return Err(ValidationError::TooLong {
                field: "idempotencyKey",
                max: Self::MAX_LENGTH,
            });
        }
        if !raw.bytes().all(|b| b.is_ascii_graphic()) {
            return Err(ValidationError::Invalid {
                field: "idempotencyKey",
                reason: "must be visible ASCII".to_string(),
            });
        }
        Ok(Self(raw.to_owned()))
    }

    /// Returns the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl_text_sqlx!(IdempotencyKey);

// =============================================================================
// OrderId
// =============================================================================

/// Primary key of a persisted order.
///
/// Orders are looked up by their order or invoice number in every public
/// interface; the id exists so rows have a key that never changes meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(Uuid);

impl OrderId {
    /// Generate a fresh random order id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID.
    #[must_use]
    pub const fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Get the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for OrderId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Type<sqlx::Postgres> for OrderId {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <Uuid as sqlx::Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
        <Uuid as sqlx::Type<sqlx::Postgres>>::compatible(ty)
    }
}

#[cfg(feature = "postgres")]
impl<'r> sqlx::Decode<'r, sqlx::Postgres> for OrderId {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        Ok(Self(<Uuid as sqlx::Decode<sqlx::Postgres>>::decode(value)?))
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Encode<'_, sqlx::Postgres> for OrderId {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        <Uuid as sqlx::Encode<sqlx::Postgres>>::encode_by_ref(&self.0, buf)
    }
}
