//! Cart operations scoped to one resolved identity.

use std::sync::Arc;

use thiserror::Error;
use tracing::instrument;

use cartwheel_core::{
    Cart, CartAction, CartItem, CartItemDraft, ClientId, IdempotencyKey, ProductRef,
    ValidationError,
};

use crate::db::{CartStore, RepositoryError};
use crate::services::catalog::Catalog;
use crate::services::retry::StoragePolicy;

/// Errors from cart operations.
#[derive(Debug, Error)]
pub enum CartError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("cart storage error: {0}")]
    Storage(RepositoryError),
}

impl From<RepositoryError> for CartError {
    fn from(e: RepositoryError) -> Self {
        match e {
            RepositoryError::Validation(v) => Self::Validation(v),
            other => Self::Storage(other),
        }
    }
}

/// Authoritative cart service.
#[derive(Clone)]
pub struct CartService {
    store: Arc<dyn CartStore>,
    policy: StoragePolicy,
    catalog: Option<Arc<dyn Catalog>>,
}

impl CartService {
    #[must_use]
    pub fn new(store: Arc<dyn CartStore>, policy: StoragePolicy) -> Self {
        Self {
            store,
            policy,
            catalog: None,
        }
    }

    /// Fill missing display fields on added items from `catalog`.
    #[must_use]
    pub fn with_catalog(mut self, catalog: Arc<dyn Catalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// The current cart; empty if the identity has none yet.
    ///
    /// # Errors
    ///
    /// Returns `CartError::Storage` once read retries are exhausted.
    #[instrument(skip(self), fields(owner = %owner))]
    pub async fn get(&self, owner: &ClientId) -> Result<Cart, CartError> {
        Ok(self
            .policy
            .read("cart.load", || self.store.load(owner))
            .await?)
    }

    /// Add `draft.quantity` (default 1) units of a product.
    ///
    /// Missing display fields are taken from the catalog when one is
    /// configured. With a `key`, a replay returns the current cart without
    /// adding again.
    ///
    /// # Errors
    ///
    /// Returns `CartError::Validation` for an incomplete or invalid line, or
    /// a quantity that would overflow.
    #[instrument(skip(self, draft), fields(owner = %owner, product_ref))]
    pub async fn add_item(
        &self,
        owner: &ClientId,
        mut draft: CartItemDraft,
        key: Option<&IdempotencyKey>,
    ) -> Result<Cart, CartError> {
        if let Some(product_ref) = &draft.product_ref {
            tracing::Span::current().record("product_ref", product_ref.as_str());
        }

        if draft.is_missing_display_fields()
            && let (Some(catalog), Some(product_ref)) = (&self.catalog, &draft.product_ref)
            && let Some(entry) = catalog.lookup(product_ref).await
        {
            tracing::debug!("Filling display fields from catalog");
            draft.fill_display_fields(&entry.name, entry.unit_price, &entry.image_ref);
        }

        let item = draft.validate()?;
        self.apply(owner, CartAction::AddItem(item), key).await
    }

    /// Set a line's quantity. `quantity <= 0` removes the line; an absent
    /// line is never created.
    ///
    /// # Errors
    ///
    /// Returns `CartError::Validation` if `quantity` is too large.
    pub async fn set_item_quantity(
        &self,
        owner: &ClientId,
        product_ref: ProductRef,
        quantity: i64,
    ) -> Result<Cart, CartError> {
        self.apply(
            owner,
            CartAction::SetQuantity {
                product_ref,
                quantity,
            },
            None,
        )
        .await
    }

    /// Remove a line if present.
    ///
    /// # Errors
    ///
    /// Returns `CartError::Storage` on storage failure.
    pub async fn remove_item(
        &self,
        owner: &ClientId,
        product_ref: ProductRef,
    ) -> Result<Cart, CartError> {
        self.apply(owner, CartAction::RemoveItem(product_ref), None)
            .await
    }

    /// Replace the whole cart with the normalized form of `items`.
    ///
    /// # Errors
    ///
    /// Returns `CartError::Validation` if a line has quantity 0 or summed
    /// duplicates overflow.
    pub async fn replace_all(
        &self,
        owner: &ClientId,
        items: Vec<CartItem>,
    ) -> Result<Cart, CartError> {
        self.apply(owner, CartAction::ReplaceAll(items), None).await
    }

    /// Empty the cart.
    ///
    /// # Errors
    ///
    /// Returns `CartError::Storage` on storage failure.
    pub async fn clear(&self, owner: &ClientId) -> Result<Cart, CartError> {
        self.apply(owner, CartAction::Clear, None).await
    }

    /// Apply one mutation. Mutations are never retried.
    ///
    /// # Errors
    ///
    /// Returns `CartError::Validation` if the mutation is rejected, or
    /// `CartError::Storage` on storage failure or timeout.
    #[instrument(skip(self, action, key), fields(owner = %owner))]
    pub async fn apply(
        &self,
        owner: &ClientId,
        action: CartAction,
        key: Option<&IdempotencyKey>,
    ) -> Result<Cart, CartError> {
        Ok(self
            .policy
            .write(self.store.apply(owner, action, key))
            .await?)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::str::FromStr;
    use std::time::Duration;

    use rust_decimal::Decimal;

    use super::*;
    use crate::db::MemoryStore;
    use crate::services::catalog::{CatalogEntry, StaticCatalog};

    fn service() -> CartService {
        CartService::new(
            Arc::new(MemoryStore::new()),
            StoragePolicy::new(Duration::from_secs(1), 1),
        )
    }

    fn owner() -> ClientId {
        ClientId::parse("shopper-7").unwrap()
    }

    fn draft(r: &str, qty: i64) -> CartItemDraft {
        CartItemDraft {
            product_ref: Some(ProductRef::parse(r).unwrap()),
            name: Some(format!("Product {r}")),
            unit_price: Some(Decimal::from_str("4.50").unwrap()),
            image_ref: Some(format!("/img/{r}.jpg")),
            quantity: Some(qty),
        }
    }

    #[tokio::test]
    async fn test_get_creates_empty_cart() {
        let cart = service().get(&owner()).await.unwrap();
        assert!(cart.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_adds_two_plus_three() {
        let svc = service();
        let (owner_a, owner_b) = (owner(), owner());
        let (a, b) = tokio::join!(
            svc.add_item(&owner_a, draft("1001", 2), None),
            svc.add_item(&owner_b, draft("1001", 3), None),
        );
        a.unwrap();
        b.unwrap();

        let cart = svc.get(&owner()).await.unwrap();
        assert_eq!(cart.find(&ProductRef::parse("1001").unwrap()).unwrap().quantity, 5);
    }

    #[tokio::test]
    async fn test_add_item_requires_display_fields_without_catalog() {
        let mut incomplete = draft("1001", 1);
        incomplete.name = None;
        let err = service().add_item(&owner(), incomplete, None).await.unwrap_err();
        assert!(matches!(
            err,
            CartError::Validation(ValidationError::MissingField { field: "name" })
        ));
    }

    #[tokio::test]
    async fn test_add_item_fills_from_catalog() {
        let catalog = StaticCatalog::default().with_entry(
            ProductRef::parse("1001").unwrap(),
            CatalogEntry {
                name: "Catalog Mug".into(),
                unit_price: Decimal::from(8),
                image_ref: "/img/catalog-mug.jpg".into(),
            },
        );
        let svc = service().with_catalog(Arc::new(catalog));

        let bare = CartItemDraft {
            product_ref: Some(ProductRef::parse("1001").unwrap()),
            name: Some("My Mug".into()),
            ..CartItemDraft::default()
        };
        let cart = svc.add_item(&owner(), bare, None).await.unwrap();
        let line = &cart.items[0];
        assert_eq!(line.name, "My Mug");
        assert_eq!(line.image_ref, "/img/catalog-mug.jpg");
        assert_eq!(line.quantity, 1);
    }

    #[tokio::test]
    async fn test_idempotent_add() {
        let svc = service();
        let key = IdempotencyKey::parse("retry-me").unwrap();
        svc.add_item(&owner(), draft("1001", 2), Some(&key)).await.unwrap();
        let cart = svc.add_item(&owner(), draft("1001", 2), Some(&key)).await.unwrap();
        assert_eq!(cart.items[0].quantity, 2);
    }

    #[tokio::test]
    async fn test_set_quantity_and_remove() {
        let svc = service();
        let pref = ProductRef::parse("1001").unwrap();
        svc.add_item(&owner(), draft("1001", 1), None).await.unwrap();

        let cart = svc.set_item_quantity(&owner(), pref.clone(), 6).await.unwrap();
        assert_eq!(cart.items[0].quantity, 6);

        let cart = svc.set_item_quantity(&owner(), pref.clone(), 0).await.unwrap();
        assert!(cart.is_empty());

        let cart = svc.remove_item(&owner(), pref).await.unwrap();
        assert!(cart.is_empty());
    }

    #[tokio::test]
    async fn test_replace_all_and_clear() {
        let svc = service();
        svc.add_item(&owner(), draft("9", 1), None).await.unwrap();

        let items = vec![
            draft("1001", 1).validate().unwrap(),
            draft("1001", 2).validate().unwrap(),
        ];
        let cart = svc.replace_all(&owner(), items).await.unwrap();
        assert_eq!(cart.items.len(), 1);
        assert_eq!(cart.items[0].quantity, 3);

        assert!(svc.clear(&owner()).await.unwrap().is_empty());
    }

    #[test]
    fn test_repository_validation_maps_to_validation() {
        let err = CartError::from(RepositoryError::Validation(ValidationError::EmptyOrder));
        assert!(matches!(err, CartError::Validation(_)));
        let err = CartError::from(RepositoryError::NotFound);
        assert!(matches!(err, CartError::Storage(_)));
    }
}
