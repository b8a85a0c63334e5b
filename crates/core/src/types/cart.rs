//! Cart lines, carts, and the cart mutation vocabulary.
//!
//! [`Cart`] holds the pure arithmetic of every cart mutation so that each
//! storage backend applies exactly the same rules:
//!
//! - at most one line per [`ProductRef`]
//! - adding to an existing line increments its quantity and overwrites the
//!   display fields (`name`, `unitPrice`, `imageRef`)
//! - setting a quantity never creates a line; `<= 0` removes it
//! - wholesale replacement collapses duplicate refs, summing quantities

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::id::{ClientId, ProductRef};
use crate::types::price::Price;
use crate::types::validation::{MAX_QUANTITY, ValidationError, required_text, validate_quantity};

/// Maximum length of a product display name.
pub const MAX_NAME_LENGTH: usize = 200;

/// Maximum length of an image reference (URL or asset key).
pub const MAX_IMAGE_REF_LENGTH: usize = 2048;

/// One line of a cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    pub product_ref: ProductRef,
    pub name: String,
    pub unit_price: Price,
    pub image_ref: String,
    pub quantity: u32,
}

impl CartItem {
    /// Price of the whole line.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::AmountOverflow`] if the line total does not
    /// fit in a decimal.
    pub fn line_total(&self) -> Result<Price, ValidationError> {
        self.unit_price.checked_times(self.quantity, "subtotal")
    }

    fn overwrite_display_fields(&mut self, from: Self) {
        self.name = from.name;
        self.unit_price = from.unit_price;
        self.image_ref = from.image_ref;
    }
}

/// A cart line as submitted by a client, before validation.
///
/// Every field is optional on the wire so that missing fields can be
/// reported as validation errors (or filled from the catalog) rather than
/// failing deserialization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItemDraft {
    pub product_ref: Option<ProductRef>,
    pub name: Option<String>,
    pub unit_price: Option<Decimal>,
    pub image_ref: Option<String>,
    pub quantity: Option<i64>,
}

impl CartItemDraft {
    /// Whether any display field is missing or blank.
    #[must_use]
    pub fn is_missing_display_fields(&self) -> bool {
        let blank = |v: &Option<String>| v.as_deref().is_none_or(|s| s.trim().is_empty());
        blank(&self.name) || self.unit_price.is_none() || blank(&self.image_ref)
    }

    /// Fill missing display fields. Supplied values are kept.
    pub fn fill_display_fields(&mut self, name: &str, unit_price: Decimal, image_ref: &str) {
        if self.name.as_deref().is_none_or(|s| s.trim().is_empty()) {
            self.name = Some(name.to_owned());
        }
        if self.unit_price.is_none() {
            self.unit_price = Some(unit_price);
        }
        if self.image_ref.as_deref().is_none_or(|s| s.trim().is_empty()) {
            self.image_ref = Some(image_ref.to_owned());
        }
    }

    /// Validate into a cart line. A missing quantity defaults to 1.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] for the first missing or invalid field.
    pub fn validate(self) -> Result<CartItem, ValidationError> {
        let product_ref = self
            .product_ref
            .ok_or(ValidationError::MissingField { field: "productRef" })?;
        let name = required_text(self.name, "name", MAX_NAME_LENGTH)?;
        let unit_price = self
            .unit_price
            .ok_or(ValidationError::MissingField { field: "unitPrice" })
            .and_then(|p| Price::new(p, "unitPrice"))?;
        let image_ref = required_text(self.image_ref, "imageRef", MAX_IMAGE_REF_LENGTH)?;
        let quantity = validate_quantity(self.quantity.unwrap_or(1), "quantity")?;

        Ok(CartItem {
            product_ref,
            name,
            unit_price,
            image_ref,
            quantity,
        })
    }
}

/// The authoritative cart of one identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cart {
    pub owner_id: ClientId,
    pub items: Vec<CartItem>,
    pub updated_at: DateTime<Utc>,
}

impl Cart {
    /// A cart with no lines.
    #[must_use]
    pub const fn empty(owner_id: ClientId, now: DateTime<Utc>) -> Self {
        Self {
            owner_id,
            items: Vec::new(),
            updated_at: now,
        }
    }

    /// Look up a line by product.
    #[must_use]
    pub fn find(&self, product_ref: &ProductRef) -> Option<&CartItem> {
        self.items.iter().find(|i| &i.product_ref == product_ref)
    }

    /// Total number of units across all lines.
    #[must_use]
    pub fn item_count(&self) -> u64 {
        self.items.iter().map(|i| u64::from(i.quantity)).sum()
    }

    /// Sum of line totals.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::AmountOverflow`] if the sum does not fit in
    /// a decimal.
    pub fn subtotal(&self) -> Result<Price, ValidationError> {
        let lines = self
            .items
            .iter()
            .map(CartItem::line_total)
            .collect::<Result<Vec<_>, _>>()?;
        Price::checked_sum(lines, "subtotal")
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Add `item.quantity` units of a product.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::QuantityOverflow`] if the line would exceed
    /// [`MAX_QUANTITY`]; the cart is left unchanged.
    pub fn add_item(&mut self, item: CartItem) -> Result<(), ValidationError> {
        match self
            .items
            .iter_mut()
            .find(|i| i.product_ref == item.product_ref)
        {
            Some(line) => {
                line.quantity = checked_quantity(line.quantity, item.quantity, &item.product_ref)?;
                line.overwrite_display_fields(item);
            }
            None => self.items.push(item),
        }
        Ok(())
    }

    /// Set a line's quantity exactly.
    ///
    /// `quantity <= 0` removes the line. An absent line is left absent.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] if `quantity` exceeds [`MAX_QUANTITY`].
    pub fn set_quantity(
        &mut self,
        product_ref: &ProductRef,
        quantity: i64,
    ) -> Result<(), ValidationError> {
        if quantity <= 0 {
            self.remove_item(product_ref);
            return Ok(());
        }
        let quantity = validate_quantity(quantity, "quantity")?;
        if let Some(line) = self.items.iter_mut().find(|i| &i.product_ref == product_ref) {
            line.quantity = quantity;
        }
        Ok(())
    }

    /// Remove a line if present.
    pub fn remove_item(&mut self, product_ref: &ProductRef) {
        self.items.retain(|i| &i.product_ref != product_ref);
    }

    /// Replace every line with the normalized form of `items`.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] from [`normalize_items`]; the cart is
    /// left unchanged.
    pub fn replace_items(&mut self, items: Vec<CartItem>) -> Result<(), ValidationError> {
        self.items = normalize_items(items)?;
        Ok(())
    }

    /// Remove every line.
    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Apply one mutation.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] if the mutation is rejected; the cart is
    /// left unchanged.
    pub fn apply(&mut self, action: CartAction) -> Result<(), ValidationError> {
        match action {
            CartAction::AddItem(item) => self.add_item(item),
            CartAction::SetQuantity {
                product_ref,
                quantity,
            } => self.set_quantity(&product_ref, quantity),
            CartAction::ReplaceAll(items) => self.replace_items(items),
            CartAction::RemoveItem(product_ref) => {
                self.remove_item(&product_ref);
                Ok(())
            }
            CartAction::Clear => {
                self.clear();
                Ok(())
            }
        }
    }
}

fn checked_quantity(
    current: u32,
    delta: u32,
    product_ref: &ProductRef,
) -> Result<u32, ValidationError> {
    current
        .checked_add(delta)
        .filter(|q| *q <= MAX_QUANTITY)
        .ok_or_else(|| ValidationError::QuantityOverflow {
            product_ref: product_ref.to_string(),
            max: MAX_QUANTITY,
        })
}

/// Collapse duplicate product refs.
///
/// Quantities of duplicate lines are summed and the last occurrence's
/// display fields win. Lines keep the position of their first occurrence.
///
/// # Errors
///
/// Returns a [`ValidationError`] if any line has quantity 0 or a summed
/// quantity exceeds [`MAX_QUANTITY`].
pub fn normalize_items(items: Vec<CartItem>) -> Result<Vec<CartItem>, ValidationError> {
    let mut normalized: Vec<CartItem> = Vec::with_capacity(items.len());

    for item in items {
        if item.quantity == 0 {
            return Err(ValidationError::BelowMinimum {
                field: "quantity",
                min: 1,
            });
        }
        match normalized
            .iter_mut()
            .find(|i| i.product_ref == item.product_ref)
        {
            Some(line) => {
                line.quantity = checked_quantity(line.quantity, item.quantity, &item.product_ref)?;
                line.overwrite_display_fields(item);
            }
            None => {
                if item.quantity > MAX_QUANTITY {
                    return Err(ValidationError::QuantityOverflow {
                        product_ref: item.product_ref.to_string(),
                        max: MAX_QUANTITY,
                    });
                }
                normalized.push(item);
            }
        }
    }

    Ok(normalized)
}

/// A validated cart mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CartAction {
    /// Increment by `quantity` units, creating the line if needed.
    AddItem(CartItem),
    /// Set a line's quantity; `<= 0` removes.
    SetQuantity {
        product_ref: ProductRef,
        quantity: i64,
    },
    /// Replace every line.
    ReplaceAll(Vec<CartItem>),
    /// Remove one line.
    RemoveItem(ProductRef),
    /// Remove every line.
    Clear,
}

/// Body of `PUT /cart`, discriminated by its `action` field.
///
/// ```json
/// {"action": "updateQuantity", "productRef": "1001", "quantity": 3}
/// {"action": "replaceAll", "items": [...]}
/// {"action": "removeItem", "productRef": "1001"}
/// {"action": "clear"}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(
    tag = "action",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum CartActionRequest {
    UpdateQuantity {
        product_ref: ProductRef,
        quantity: i64,
    },
    ReplaceAll {
        items: Vec<CartItemDraft>,
    },
    RemoveItem {
        product_ref: ProductRef,
    },
    Clear,
}

impl TryFrom<CartActionRequest> for CartAction {
    type Error = ValidationError;

    fn try_from(request: CartActionRequest) -> Result<Self, Self::Error> {
        Ok(match request {
            CartActionRequest::UpdateQuantity {
                product_ref,
                quantity,
            } => Self::SetQuantity {
                product_ref,
                quantity,
            },
            CartActionRequest::ReplaceAll { items } => Self::ReplaceAll(
                items
                    .into_iter()
                    .map(CartItemDraft::validate)
                    .collect::<Result<_, _>>()?,
            ),
            CartActionRequest::RemoveItem { product_ref } => Self::RemoveItem(product_ref),
            CartActionRequest::Clear => Self::Clear,
        })
    }
}
