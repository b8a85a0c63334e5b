//! Read-only product catalog used to fill missing cart display fields.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use thiserror::Error;

use cartwheel_core::ProductRef;

/// Errors from loading a catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read catalog {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid catalog {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("duplicate product {0} in catalog")]
    Duplicate(String),
}

/// Display fields for one product.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntry {
    pub name: String,
    pub unit_price: Decimal,
    pub image_ref: String,
}

/// Product lookup.
#[async_trait]
pub trait Catalog: Send + Sync {
    async fn lookup(&self, product_ref: &ProductRef) -> Option<CatalogEntry>;
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CatalogRecord {
    product_ref: ProductRef,
    #[serde(flatten)]
    entry: CatalogEntry,
}

/// Catalog loaded once from a JSON array:
///
/// ```json
/// [{"productRef": "1001", "name": "Mug", "unitPrice": "8.00", "imageRef": "/img/mug.jpg"}]
/// ```
#[derive(Debug, Default, Clone)]
pub struct StaticCatalog {
    entries: HashMap<ProductRef, CatalogEntry>,
}

impl StaticCatalog {
    /// Load from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError` if the file cannot be read or parsed, or lists
    /// a product twice.
    pub async fn from_path(path: &Path) -> Result<Self, CatalogError> {
        let display = path.display().to_string();
        let raw = tokio::fs::read(path).await.map_err(|source| CatalogError::Io {
            path: display.clone(),
            source,
        })?;
        let records: Vec<CatalogRecord> =
            serde_json::from_slice(&raw).map_err(|source| CatalogError::Parse {
                path: display,
                source,
            })?;
        Self::from_records(records)
    }

    fn from_records(records: Vec<CatalogRecord>) -> Result<Self, CatalogError> {
        let mut entries = HashMap::with_capacity(records.len());
        for record in records {
            let key = record.product_ref.to_string();
            if entries.insert(record.product_ref, record.entry).is_some() {
                return Err(CatalogError::Duplicate(key));
            }
        }
        Ok(Self { entries })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Add or replace one entry.
    #[must_use]
    pub fn with_entry(mut self, product_ref: ProductRef, entry: CatalogEntry) -> Self {
        self.entries.insert(product_ref, entry);
        self
    }
}

#[async_trait]
impl Catalog for StaticCatalog {
    async fn lookup(&self, product_ref: &ProductRef) -> Option<CatalogEntry> {
        self.entries.get(product_ref).cloned()
    }
}
