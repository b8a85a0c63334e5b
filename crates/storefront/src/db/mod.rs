//! Storage for carts, sequence counters, and orders.
//!
//! # Backends
//!
//! - [`postgres`](Storage::postgres) - shared `PostgreSQL` database, schema `storefront`
//! - [`in_memory`](Storage::in_memory) - process-local maps for development and tests
//!
//! Both backends implement the same store traits and apply cart mutations
//! through [`Cart::apply`](cartwheel_core::Cart::apply) semantics, so behaviour
//! differs only in durability.
//!
//! ## Tables
//!
//! - `cart` - One row per identity; row lock serializes mutations
//! - `cart_item` - Cart lines, `PRIMARY KEY (owner_id, product_ref)`
//! - `cart_idempotency_key` - Applied `Idempotency-Key` values per identity
//! - `sequence_counter` - One counter per `(purpose, period)`
//! - `customer_order` - Persisted orders
//!
//! # Migrations
//!
//! Migrations are stored in `crates/storefront/migrations/` and run via:
//! ```bash
//! cargo run -p cartwheel-cli -- migrate
//! ```

pub mod carts;
pub mod memory;
pub mod orders;
pub mod sequences;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use cartwheel_core::{
    Cart, CartAction, ClientId, IdempotencyKey, Order, OrderStatus, SequencePurpose,
    ValidationError,
};

pub use carts::PgCartStore;
pub use memory::MemoryStore;
pub use orders::PgOrderStore;
pub use sequences::PgSequenceStore;

/// How long an applied idempotency key is remembered.
pub const IDEMPOTENCY_KEY_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation (e.g., duplicate order number).
    #[error("constraint violation: {0}")]
    Conflict(String),

    /// The mutation was rejected by domain validation.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The storage call did not finish within the configured timeout.
    #[error("storage call timed out after {0:?}")]
    Timeout(Duration),
}

impl RepositoryError {
    /// Whether retrying the same call may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout(_) => true,
            Self::Database(err) => match err {
                sqlx::Error::Io(_)
                | sqlx::Error::PoolTimedOut
                | sqlx::Error::WorkerCrashed
                | sqlx::Error::Tls(_) => true,
                // Class 08: connection exception. 40001/40P01: serialization
                // failure and deadlock.
                sqlx::Error::Database(db_err) => db_err
                    .code()
                    .is_some_and(|code| code.starts_with("08") || code == "40001" || code == "40P01"),
                _ => false,
            },
            _ => false,
        }
    }
}

/// Map a unique violation to [`RepositoryError::Conflict`].
pub(crate) fn conflict_on_unique(e: sqlx::Error, what: &str) -> RepositoryError {
    if let sqlx::Error::Database(ref db_err) = e
        && db_err.is_unique_violation()
    {
        return RepositoryError::Conflict(format!("{what} already exists"));
    }
    RepositoryError::Database(e)
}

// =============================================================================
// Store traits
// =============================================================================

/// Authoritative, identity-keyed cart storage.
///
/// Every mutation for one identity is atomic with respect to every other
/// mutation for the same identity.
#[async_trait]
pub trait CartStore: Send + Sync {
    /// Load the cart of `owner`, or an empty cart if none exists yet.
    async fn load(&self, owner: &ClientId) -> Result<Cart, RepositoryError>;

    /// Apply one mutation and return the resulting cart.
    ///
    /// When `key` is given it is recorded atomically with the mutation; a
    /// replay of an already-recorded key returns the current cart without
    /// applying the mutation again.
    async fn apply(
        &self,
        owner: &ClientId,
        action: CartAction,
        key: Option<&IdempotencyKey>,
    ) -> Result<Cart, RepositoryError>;
}

/// Durable per-`(purpose, day)` counters.
#[async_trait]
pub trait SequenceStore: Send + Sync {
    /// Atomically increment the counter, creating it at 1 if absent, and
    /// return the new value.
    async fn increment(&self, purpose: SequencePurpose, day: NaiveDate)
    -> Result<i64, RepositoryError>;
}

/// Filter and page for order listings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderQuery {
    /// Case-insensitive substring of order number, invoice number, customer
    /// name, or customer email.
    pub search: Option<String>,
    pub status: Option<OrderStatus>,
    /// Rows to skip.
    pub offset: u64,
    /// Rows to return.
    pub limit: u32,
}

/// One page of orders plus the unpaged match count.
#[derive(Debug, Clone)]
pub struct OrderPage {
    pub orders: Vec<Order>,
    pub total: u64,
}

/// Change to the mutable fields of an order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderChange {
    pub status: OrderStatus,
    /// `None` leaves notes unchanged; `Some(None)` clears them.
    pub notes: Option<Option<String>>,
    pub updated_at: DateTime<Utc>,
}

/// Persisted orders.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Insert a new order.
    ///
    /// Returns [`RepositoryError::Conflict`] if either number is taken.
    async fn insert(&self, order: &Order) -> Result<(), RepositoryError>;

    /// Find an order by order number or invoice number.
    async fn find_by_number(&self, number: &str) -> Result<Option<Order>, RepositoryError>;

    /// List orders newest first.
    async fn list(&self, query: &OrderQuery) -> Result<OrderPage, RepositoryError>;

    /// Apply `change` only if the order's status is still `expected`.
    ///
    /// Returns `None` when the order is missing or its status has moved on.
    async fn update_if_status(
        &self,
        number: &str,
        expected: OrderStatus,
        change: &OrderChange,
    ) -> Result<Option<Order>, RepositoryError>;
}

// =============================================================================
// Storage bundle
// =============================================================================

/// The three stores plus a readiness probe, behind trait objects.
#[derive(Clone)]
pub struct Storage {
    pub carts: Arc<dyn CartStore>,
    pub sequences: Arc<dyn SequenceStore>,
    pub orders: Arc<dyn OrderStore>,
    pool: Option<PgPool>,
}

impl Storage {
    /// `PostgreSQL`-backed storage sharing one pool.
    #[must_use]
    pub fn postgres(pool: PgPool) -> Self {
        Self {
            carts: Arc::new(PgCartStore::new(pool.clone())),
            sequences: Arc::new(PgSequenceStore::new(pool.clone())),
            orders: Arc::new(PgOrderStore::new(pool.clone())),
            pool: Some(pool),
        }
    }

    /// Process-local storage.
    #[must_use]
    pub fn in_memory() -> Self {
        let store = Arc::new(MemoryStore::new());
        Self {
            carts: store.clone(),
            sequences: store.clone(),
            orders: store,
            pool: None,
        }
    }

    /// Name of the backend, for logs.
    #[must_use]
    pub const fn backend(&self) -> &'static str {
        if self.pool.is_some() { "postgres" } else { "memory" }
    }

    /// Check that storage is reachable.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the database cannot be queried.
    pub async fn ping(&self) -> Result<(), RepositoryError> {
        if let Some(pool) = &self.pool {
            sqlx::query("SELECT 1").execute(pool).await?;
        }
        Ok(())
    }
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Arguments
///
/// * `database_url` - `PostgreSQL` connection string (wrapped in `SecretString`)
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}
