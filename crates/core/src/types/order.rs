//! Orders, their customer snapshot, and the order request accepted at
//! checkout.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::cart::{CartItem, MAX_NAME_LENGTH};
use crate::types::email::Email;
use crate::types::id::{OrderId, ProductRef};
use crate::types::price::Price;
use crate::types::status::{OrderStatus, PaymentMethod};
use crate::types::validation::{ValidationError, required_text, validate_quantity};

/// Maximum length of free-text order notes.
pub const MAX_NOTES_LENGTH: usize = 2000;

const MAX_FIELD_LENGTH: usize = 200;

/// Customer details frozen onto an order at creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    pub name: String,
    pub email: Email,
    pub phone: String,
    pub address: String,
    pub city: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    pub postal_code: String,
    pub country: String,
}

/// Customer details as submitted, before validation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerDraft {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
}

impl CustomerDraft {
    /// Validate the required fields.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] naming the first missing or invalid field.
    pub fn validate(self) -> Result<Customer, ValidationError> {
        let name = required_text(self.name, "customer.name", MAX_FIELD_LENGTH)?;
        let email = required_text(self.email, "customer.email", Email::MAX_LENGTH)?;
        let email = Email::parse(&email).map_err(|e| ValidationError::Invalid {
            field: "customer.email",
            reason: e.to_string(),
        })?;
        let phone = required_text(self.phone, "customer.phone", MAX_FIELD_LENGTH)?;
        let address = required_text(self.address, "customer.address", MAX_FIELD_LENGTH)?;
        let city = required_text(self.city, "customer.city", MAX_FIELD_LENGTH)?;
        let state = match self.state.filter(|s| !s.trim().is_empty()) {
            Some(s) => Some(required_text(Some(s), "customer.state", MAX_FIELD_LENGTH)?),
            None => None,
        };
        let postal_code = required_text(self.postal_code, "customer.postalCode", MAX_FIELD_LENGTH)?;
        let country = required_text(self.country, "customer.country", MAX_FIELD_LENGTH)?;

        Ok(Customer {
            name,
            email,
            phone,
            address,
            city,
            state,
            postal_code,
            country,
        })
    }
}

/// A line frozen onto an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub product_ref: ProductRef,
    pub name: String,
    pub unit_price: Price,
    pub quantity: u32,
}

impl From<&CartItem> for OrderItem {
    fn from(item: &CartItem) -> Self {
        Self {
            product_ref: item.product_ref.clone(),
            name: item.name.clone(),
            unit_price: item.unit_price,
            quantity: item.quantity,
        }
    }
}

/// An order line as submitted, before validation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemDraft {
    pub product_ref: Option<ProductRef>,
    pub name: Option<String>,
    pub unit_price: Option<Decimal>,
    pub quantity: Option<i64>,
}

impl OrderItemDraft {
    /// Validate into a frozen order line.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] for a missing field, a negative price,
    /// or a quantity below 1.
    pub fn validate(self) -> Result<OrderItem, ValidationError> {
        let product_ref = self.product_ref.ok_or(ValidationError::MissingField {
            field: "items.productRef",
        })?;
        let name = required_text(self.name, "items.name", MAX_NAME_LENGTH)?;
        let unit_price = self
            .unit_price
            .ok_or(ValidationError::MissingField {
                field: "items.unitPrice",
            })
            .and_then(|p| Price::new(p, "items.unitPrice"))?;
        let quantity = self
            .quantity
            .ok_or(ValidationError::MissingField {
                field: "items.quantity",
            })
            .and_then(|q| validate_quantity(q, "items.quantity"))?;

        Ok(OrderItem {
            product_ref,
            name,
            unit_price,
            quantity,
        })
    }
}

/// Monetary totals of an order. `total == subtotal + tax + shipping`.
///
/// The parts are bounded by the amount ceiling; the total may exceed it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "StoredTotals")]
pub struct OrderTotals {
    pub subtotal: Price,
    pub tax: Price,
    pub shipping: Price,
    pub total: Price,
}

impl OrderTotals {
    /// Compute the total from its parts.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::Negative`] naming the first negative part,
    /// [`ValidationError::AmountTooLarge`] for a part above the amount
    /// ceiling, and [`ValidationError::AmountOverflow`] if the total cannot
    /// be represented.
    pub fn compute(
        subtotal: Decimal,
        tax: Decimal,
        shipping: Decimal,
    ) -> Result<Self, ValidationError> {
        let subtotal = Price::new(subtotal, "subtotal")?;
        let tax = Price::new(tax, "tax")?;
        let shipping = Price::new(shipping, "shipping")?;

        Ok(Self {
            subtotal,
            tax,
            shipping,
            total: Price::checked_sum([subtotal, tax, shipping], "total")?,
        })
    }

    /// Rebuild totals read back from storage, checking the stored total.
    ///
    /// # Errors
    ///
    /// Returns the errors of [`OrderTotals::compute`], or
    /// [`ValidationError::Invalid`] if `total` is not the sum of its parts.
    pub fn from_stored(
        subtotal: Decimal,
        tax: Decimal,
        shipping: Decimal,
        total: Decimal,
    ) -> Result<Self, ValidationError> {
        let totals = Self::compute(subtotal, tax, shipping)?;
        if totals.total.amount() != total {
            return Err(ValidationError::Invalid {
                field: "total",
                reason: "must equal subtotal + tax + shipping".to_string(),
            });
        }
        Ok(totals)
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredTotals {
    subtotal: Decimal,
    tax: Decimal,
    shipping: Decimal,
    total: Decimal,
}

impl TryFrom<StoredTotals> for OrderTotals {
    type Error = ValidationError;

    fn try_from(raw: StoredTotals) -> Result<Self, Self::Error> {
        Self::from_stored(raw.subtotal, raw.tax, raw.shipping, raw.total)
    }
}

/// Body of `POST /orders`, before validation.
///
/// `tax` and `shipping` default to zero. Payment method names outside the
/// closed set fail deserialization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRequest {
    pub customer: Option<CustomerDraft>,
    #[serde(default)]
    pub items: Vec<OrderItemDraft>,
    pub subtotal: Option<Decimal>,
    pub tax: Option<Decimal>,
    pub shipping: Option<Decimal>,
    pub payment_method: Option<PaymentMethod>,
    pub notes: Option<String>,
}

impl OrderRequest {
    /// Validate every part of the request.
    ///
    /// Performs no I/O, so it runs before any sequence number is drawn.
    ///
    /// # Errors
    ///
    /// Returns the first [`ValidationError`] found.
    pub fn validate(self) -> Result<NewOrder, ValidationError> {
        if self.items.is_empty() {
            return Err(ValidationError::EmptyOrder);
        }
        let items = self
            .items
            .into_iter()
            .map(OrderItemDraft::validate)
            .collect::<Result<Vec<_>, _>>()?;

        let customer = self
            .customer
            .ok_or(ValidationError::MissingField { field: "customer" })?
            .validate()?;

        let subtotal = self
            .subtotal
            .ok_or(ValidationError::MissingField { field: "subtotal" })?;
        let totals = OrderTotals::compute(
            subtotal,
            self.tax.unwrap_or_default(),
            self.shipping.unwrap_or_default(),
        )?;

        let payment_method = self.payment_method.ok_or(ValidationError::MissingField {
            field: "paymentMethod",
        })?;

        let notes = self
            .notes
            .map(|n| n.trim().to_owned())
            .filter(|n| !n.is_empty());
        if notes
            .as_ref()
            .is_some_and(|n| n.chars().count() > MAX_NOTES_LENGTH)
        {
            return Err(ValidationError::TooLong {
                field: "notes",
                max: MAX_NOTES_LENGTH,
            });
        }

        Ok(NewOrder {
            customer,
            items,
            totals,
            payment_method,
            notes,
        })
    }
}

/// A validated order that has not yet been numbered or persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrder {
    pub customer: Customer,
    pub items: Vec<OrderItem>,
    pub totals: OrderTotals,
    pub payment_method: PaymentMethod,
    pub notes: Option<String>,
}

impl NewOrder {
    /// Attach sequence numbers, producing a pending order.
    #[must_use]
    pub fn into_order(
        self,
        order_number: String,
        invoice_number: String,
        now: DateTime<Utc>,
    ) -> Order {
        Order {
            id: OrderId::new(),
            order_number,
            invoice_number,
            customer: self.customer,
            items: self.items,
            totals: self.totals,
            status: OrderStatus::Pending,
            payment_method: self.payment_method,
            notes: self.notes,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A persisted order.
///
/// Only `status`, `notes`, and `updated_at` change after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: OrderId,
    pub order_number: String,
    pub invoice_number: String,
    pub customer: Customer,
    pub items: Vec<OrderItem>,
    #[serde(flatten)]
    pub totals: OrderTotals,
    pub status: OrderStatus,
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Whether `number` is this order's order number or invoice number.
    #[must_use]
    pub fn is_identified_by(&self, number: &str) -> bool {
        self.order_number == number || self.invoice_number == number
    }
}

/// Event emitted to the notifier after an order is persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderCreated {
    pub order_number: String,
    pub invoice_number: String,
    pub customer: Customer,
    pub items: Vec<OrderItem>,
    pub totals: OrderTotals,
}

impl From<&Order> for OrderCreated {
    fn from(order: &Order) -> Self {
        Self {
            order_number: order.order_number.clone(),
            invoice_number: order.invoice_number.clone(),
            customer: order.customer.clone(),
            items: order.items.clone(),
            totals: order.totals,
        }
    }
}
