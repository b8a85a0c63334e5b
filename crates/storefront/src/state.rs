//! Application state shared across handlers.

use std::sync::Arc;

use crate::config::StorefrontConfig;
use crate::db::Storage;
use crate::services::{
    CartService, Catalog, CatalogError, IdentityResolver, LogNotifier, Notifier, NotifyError,
    OrderService, SequenceGenerator, SignedTokenResolver, StaticCatalog, StoragePolicy,
    WebhookNotifier,
};

/// Error assembling the application state.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),
    #[error("notifier error: {0}")]
    Notifier(#[from] NotifyError),
}

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// the services and configuration.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: StorefrontConfig,
    storage: Storage,
    carts: CartService,
    orders: OrderService,
    identity: Arc<dyn IdentityResolver>,
}

impl AppState {
    /// Build the services from configuration.
    ///
    /// Loads the catalog if `catalog_path` is set and picks the webhook
    /// notifier if `order_webhook_url` is set, else the log notifier.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog cannot be loaded or the webhook
    /// client cannot be built.
    pub async fn new(config: StorefrontConfig, storage: Storage) -> Result<Self, StateError> {
        let catalog: Option<Arc<dyn Catalog>> = match &config.catalog_path {
            Some(path) => {
                let catalog = StaticCatalog::from_path(path).await?;
                tracing::info!(path = %path.display(), products = catalog.len(), "Loaded catalog");
                Some(Arc::new(catalog))
            }
            None => None,
        };

        let notifier: Arc<dyn Notifier> = match &config.order_webhook_url {
            Some(url) => {
                tracing::info!(url = %url, "Order notifications via webhook");
                Arc::new(WebhookNotifier::new(url.clone(), config.storage_timeout)?)
            }
            None => Arc::new(LogNotifier),
        };

        let identity = Arc::new(SignedTokenResolver::new(config.token_secret.clone()));
        Ok(Self::assemble(config, storage, identity, notifier, catalog))
    }

    /// Build the state from explicit collaborators.
    #[must_use]
    pub fn assemble(
        config: StorefrontConfig,
        storage: Storage,
        identity: Arc<dyn IdentityResolver>,
        notifier: Arc<dyn Notifier>,
        catalog: Option<Arc<dyn Catalog>>,
    ) -> Self {
        let policy = StoragePolicy::new(config.storage_timeout, config.read_attempts);

        let mut carts = CartService::new(storage.carts.clone(), policy);
        if let Some(catalog) = catalog {
            carts = carts.with_catalog(catalog);
        }
        let orders = OrderService::new(
            storage.orders.clone(),
            SequenceGenerator::new(storage.sequences.clone(), policy),
            notifier,
            policy,
        );

        Self {
            inner: Arc::new(AppStateInner {
                config,
                storage,
                carts,
                orders,
                identity,
            }),
        }
    }

    /// Get a reference to the storefront configuration.
    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn storage(&self) -> &Storage {
        &self.inner.storage
    }

    #[must_use]
    pub fn carts(&self) -> &CartService {
        &self.inner.carts
    }

    #[must_use]
    pub fn orders(&self) -> &OrderService {
        &self.inner.orders
    }

    #[must_use]
    pub fn identity(&self) -> &dyn IdentityResolver {
        self.inner.identity.as_ref()
    }
}
