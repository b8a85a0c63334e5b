//! Business logic services for the storefront.
//!
//! # Services
//!
//! - `cart` - Identity-scoped cart operations
//! - `reconcile` - Client cart cache and sign-in reconciliation
//! - `sequence` - `ORD-`/`INV-` number generation
//! - `orders` - Order creation, lookup, listing, and updates
//! - `notify` - Order-created notifications (log or webhook)
//! - `identity` - Signed bearer-token resolution
//! - `catalog` - Product display-field lookup
//! - `retry` - Storage timeouts and read retries

pub mod cart;
pub mod catalog;
pub mod identity;
pub mod notify;
pub mod orders;
pub mod reconcile;
pub mod retry;
pub mod sequence;

pub use cart::{CartError, CartService};
pub use catalog::{Catalog, CatalogEntry, CatalogError, StaticCatalog};
pub use identity::{AuthError, IdentityResolver, SignedTokenResolver};
pub use notify::{LogNotifier, Notifier, NotifyError, WebhookNotifier};
pub use orders::{CreatedOrder, ListParams, OrderError, OrderList, OrderService, OrderUpdate};
pub use reconcile::{
    CacheError, CartCache, FileCartCache, MemoryCartCache, ReconcileError, Reconciliation,
    reconcile_on_sign_in,
};
pub use retry::StoragePolicy;
pub use sequence::{SequenceError, SequenceGenerator};
