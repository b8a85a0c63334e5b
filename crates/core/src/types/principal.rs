//! Authenticated principals.

use core::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::types::id::ClientId;
use crate::types::validation::ValidationError;

/// What an authenticated principal may do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// A shopper: may read and mutate their own cart.
    Customer,
    /// Staff: may additionally list, read, and update orders.
    Admin,
}

impl Role {
    /// Token and wire spelling.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Customer => "customer",
            Self::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "customer" => Ok(Self::Customer),
            "admin" => Ok(Self::Admin),
            other => Err(ValidationError::Invalid {
                field: "role",
                reason: format!("unknown role '{other}'"),
            }),
        }
    }
}

/// A resolved identity together with its role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub client_id: ClientId,
    pub role: Role,
}

impl Principal {
    /// Create a principal.
    #[must_use]
    pub const fn new(client_id: ClientId, role: Role) -> Self {
        Self { client_id, role }
    }

    /// Whether this principal may use admin order operations.
    #[must_use]
    pub const fn is_admin(&self) -> bool {
        matches!(self.role, Role::Admin)
    }
}
