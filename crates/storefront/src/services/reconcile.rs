//! Client-side cart cache and sign-in reconciliation.
//!
//! A client keeps a durable local copy of its cart. On sign-in the local copy
//! and the server cart are reconciled with a non-empty-wins rule:
//!
//! - non-empty local cache: pushed to the server with a wholesale replace
//! - empty local cache: the server cart is pulled into the cache
//!
//! Lines that exist only on the server are lost when the cache is pushed.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::instrument;

use cartwheel_core::{Cart, CartItem, ClientId};

use crate::services::cart::{CartError, CartService};

/// Errors from a cart cache.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cart cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cart cache is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Errors from sign-in reconciliation.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Cart(#[from] CartError),
}

/// Durable local copy of one client's cart lines.
#[async_trait]
pub trait CartCache: Send + Sync {
    async fn load(&self) -> Result<Vec<CartItem>, CacheError>;
    async fn store(&self, items: &[CartItem]) -> Result<(), CacheError>;
}

/// Cache kept in one JSON file.
///
/// Writes go to a sibling temp file which is flushed to disk and then renamed
/// over the cache, so a crash leaves either the old or the new document.
#[derive(Debug, Clone)]
pub struct FileCartCache {
    path: PathBuf,
}

impl FileCartCache {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Cache file for `client` under `dir`.
    ///
    /// The file is named by the SHA-256 of the identity, so any identity maps
    /// to a single fixed-length component directly inside `dir`.
    #[must_use]
    pub fn for_client(dir: &Path, client: &ClientId) -> Self {
        let digest = Sha256::digest(client.as_str().as_bytes());
        Self::new(dir.join(format!("cart-{}.json", hex::encode(digest))))
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl CartCache for FileCartCache {
    async fn load(&self) -> Result<Vec<CartItem>, CacheError> {
        match tokio::fs::read(&self.path).await {
            Ok(raw) => Ok(serde_json::from_slice(&raw)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn store(&self, items: &[CartItem]) -> Result<(), CacheError> {
        let raw = serde_json::to_vec_pretty(items)?;
        let temp = self.temp_path();

        let mut file = tokio::fs::File::create(&temp).await?;
        file.write_all(&raw).await?;
        file.sync_all().await?;
        drop(file);

        tokio::fs::rename(&temp, &self.path).await?;
        Ok(())
    }
}

/// Cache held in process memory.
#[derive(Debug, Default)]
pub struct MemoryCartCache {
    items: Mutex<Vec<CartItem>>,
}

impl MemoryCartCache {
    #[must_use]
    pub fn new(items: Vec<CartItem>) -> Self {
        Self {
            items: Mutex::new(items),
        }
    }

    fn guard(&self) -> std::sync::MutexGuard<'_, Vec<CartItem>> {
        self.items
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[async_trait]
impl CartCache for MemoryCartCache {
    async fn load(&self) -> Result<Vec<CartItem>, CacheError> {
        Ok(self.guard().clone())
    }

    async fn store(&self, items: &[CartItem]) -> Result<(), CacheError> {
        *self.guard() = items.to_vec();
        Ok(())
    }
}

/// Which side won a reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciliation {
    /// The local cache replaced the server cart.
    Pushed { cart: Cart },
    /// The server cart replaced the (empty) local cache.
    Pulled { cart: Cart },
}

impl Reconciliation {
    /// The server cart after reconciliation.
    #[must_use]
    pub const fn cart(&self) -> &Cart {
        match self {
            Self::Pushed { cart } | Self::Pulled { cart } => cart,
        }
    }
}

/// Reconcile a client's cache with its server cart after sign-in.
///
/// On push the cache is rewritten with the normalized server result, so
/// both sides hold identical lines afterwards.
///
/// # Errors
///
/// Returns `ReconcileError` if the cache cannot be read or written, or the
/// cart operation fails. A failed push leaves the cache untouched.
#[instrument(skip(cache, carts), fields(owner = %owner))]
pub async fn reconcile_on_sign_in(
    cache: &dyn CartCache,
    carts: &CartService,
    owner: &ClientId,
) -> Result<Reconciliation, ReconcileError> {
    let local = cache.load().await?;

    if local.is_empty() {
        let cart = carts.get(owner).await?;
        cache.store(&cart.items).await?;
        tracing::info!(lines = cart.items.len(), "Pulled server cart into local cache");
        Ok(Reconciliation::Pulled { cart })
    } else {
        let cart = carts.replace_all(owner, local).await?;
        cache.store(&cart.items).await?;
        tracing::info!(lines = cart.items.len(), "Pushed local cache to server cart");
        Ok(Reconciliation::Pushed { cart })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use cartwheel_core::{CartItemDraft, Price, ProductRef};
    use rust_decimal::Decimal;

    use super::*;
    use crate::db::MemoryStore;
    use crate::services::retry::StoragePolicy;

    fn carts() -> CartService {
        CartService::new(
            Arc::new(MemoryStore::new()),
            StoragePolicy::new(Duration::from_secs(1), 1),
        )
    }

    fn owner() -> ClientId {
        ClientId::parse("shopper-1").unwrap()
    }

    fn line(r: &str, qty: u32) -> CartItem {
        CartItem {
            product_ref: ProductRef::parse(r).unwrap(),
            name: format!("Product {r}"),
            unit_price: Price::new(Decimal::from(3), "unitPrice").unwrap(),
            image_ref: format!("/img/{r}.jpg"),
            quantity: qty,
        }
    }

    fn draft(r: &str, qty: i64) -> CartItemDraft {
        CartItemDraft {
            product_ref: Some(ProductRef::parse(r).unwrap()),
            name: Some(format!("Product {r}")),
            unit_price: Some(Decimal::from(3)),
            image_ref: Some(format!("/img/{r}.jpg")),
            quantity: Some(qty),
        }
    }

    #[tokio::test]
    async fn test_non_empty_cache_overwrites_server() {
        let carts = carts();
        carts.add_item(&owner(), draft("server-only", 4), None).await.unwrap();

        let cache = MemoryCartCache::new(vec![line("1001", 2)]);
        let outcome = reconcile_on_sign_in(&cache, &carts, &owner()).await.unwrap();

        assert!(matches!(outcome, Reconciliation::Pushed { .. }));
        let server = carts.get(&owner()).await.unwrap();
        assert_eq!(server.items, vec![line("1001", 2)]);
        assert_eq!(cache.load().await.unwrap(), server.items);
    }

    #[tokio::test]
    async fn test_empty_cache_pulls_server() {
        let carts = carts();
        carts.add_item(&owner(), draft("1001", 1), None).await.unwrap();
        carts.add_item(&owner(), draft("2002", 3), None).await.unwrap();

        let cache = MemoryCartCache::default();
        let outcome = reconcile_on_sign_in(&cache, &carts, &owner()).await.unwrap();

        assert!(matches!(outcome, Reconciliation::Pulled { .. }));
        assert_eq!(cache.load().await.unwrap(), outcome.cart().items);
        assert_eq!(cache.load().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_push_normalizes_duplicates_into_cache() {
        let carts = carts();
        let cache = MemoryCartCache::new(vec![line("1001", 1), line("1001", 2)]);

        reconcile_on_sign_in(&cache, &carts, &owner()).await.unwrap();
        assert_eq!(cache.load().await.unwrap(), vec![line("1001", 3)]);
    }

    #[tokio::test]
    async fn test_file_cache_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCartCache::for_client(dir.path(), &owner());

        assert!(cache.load().await.unwrap().is_empty());

        cache.store(&[line("1001", 2)]).await.unwrap();
        assert_eq!(cache.load().await.unwrap(), vec![line("1001", 2)]);
        assert!(!cache.temp_path().exists());
    }

    #[tokio::test]
    async fn test_file_cache_overwrites_previous_document() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCartCache::for_client(dir.path(), &owner());

        cache.store(&[line("1001", 2), line("2002", 1)]).await.unwrap();
        cache.store(&[line("3003", 4)]).await.unwrap();

        assert_eq!(cache.load().await.unwrap(), vec![line("3003", 4)]);
        assert!(!cache.temp_path().exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn test_file_cache_path_stays_inside_dir() {
        let dir = tempfile::tempdir().unwrap();

        for raw in ["../../x", "/etc/passwd", "..", "a/b\\c", "..\\..\\y"] {
            let client = ClientId::parse(raw).unwrap();
            let cache = FileCartCache::for_client(dir.path(), &client);

            assert_eq!(cache.path().parent(), Some(dir.path()));
            let name = cache.path().file_name().unwrap().to_str().unwrap();
            assert!(name.starts_with("cart-") && name.ends_with(".json"));
            assert!(name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.'));

            cache.store(&[line("1001", 1)]).await.unwrap();
            assert!(cache.path().exists());
        }

        let other = FileCartCache::for_client(dir.path(), &ClientId::parse("../x").unwrap());
        assert_ne!(
            other.path(),
            FileCartCache::for_client(dir.path(), &ClientId::parse("../../x").unwrap()).path()
        );
    }

    #[tokio::test]
    async fn test_file_cache_reports_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCartCache::new(dir.path().join("cart.json"));
        tokio::fs::write(cache.path(), b"{not json").await.unwrap();

        assert!(matches!(cache.load().await, Err(CacheError::Corrupt(_))));
    }
}
