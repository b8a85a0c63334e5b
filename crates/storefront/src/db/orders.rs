//! `PostgreSQL` order store.
//!
//! Customer and items are frozen snapshots, stored as JSONB. Money columns are
//! `NUMERIC`; status and payment method are `TEXT` with `CHECK` constraints.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use sqlx::types::Json;
use tracing::{debug, instrument};
use uuid::Uuid;

use cartwheel_core::{Customer, Order, OrderId, OrderItem, OrderStatus, OrderTotals};

use super::{OrderChange, OrderPage, OrderQuery, OrderStore, RepositoryError, conflict_on_unique};

const ORDER_COLUMNS: &str = r"
    id, order_number, invoice_number, customer, items,
    subtotal, tax, shipping, total, status, payment_method, notes,
    created_at, updated_at
";

/// `$1`: `LIKE` pattern or NULL. `$2`: status or NULL.
const LIST_FILTER: &str = r"
    ($1::text IS NULL
        OR order_number ILIKE $1
        OR invoice_number ILIKE $1
        OR customer->>'name' ILIKE $1
        OR customer->>'email' ILIKE $1)
    AND ($2::text IS NULL OR status = $2)
";

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    order_number: String,
    invoice_number: String,
    customer: Json<Customer>,
    items: Json<Vec<OrderItem>>,
    subtotal: Decimal,
    tax: Decimal,
    shipping: Decimal,
    total: Decimal,
    status: String,
    payment_method: String,
    notes: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = RepositoryError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        let corrupt =
            |what: &str| RepositoryError::DataCorruption(format!("order {}: {what}", row.order_number));

        let totals = OrderTotals::from_stored(row.subtotal, row.tax, row.shipping, row.total)
            .map_err(|e| corrupt(&e.to_string()))?;
        let status = row
            .status
            .parse::<OrderStatus>()
            .map_err(|e| corrupt(&e.to_string()))?;
        let payment_method = row
            .payment_method
            .parse()
            .map_err(|e: cartwheel_core::ValidationError| corrupt(&e.to_string()))?;

        Ok(Self {
            id: OrderId::from_uuid(row.id),
            order_number: row.order_number,
            invoice_number: row.invoice_number,
            customer: row.customer.0,
            items: row.items.0,
            totals,
            status,
            payment_method,
            notes: row.notes,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Escape `LIKE` metacharacters so user search text matches literally.
fn like_pattern(search: &str) -> String {
    let escaped = search
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

/// Order store backed by `storefront.customer_order`.
#[derive(Clone)]
pub struct PgOrderStore {
    pool: PgPool,
}

impl PgOrderStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrderStore for PgOrderStore {
    #[instrument(skip(self, order), fields(order_number = %order.order_number))]
    async fn insert(&self, order: &Order) -> Result<(), RepositoryError> {
        sqlx::query(
            r"
            INSERT INTO storefront.customer_order (
                id, order_number, invoice_number, customer, items,
                subtotal, tax, shipping, total, status, payment_method, notes,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            ",
        )
        .bind(order.id)
        .bind(&order.order_number)
        .bind(&order.invoice_number)
        .bind(Json(&order.customer))
        .bind(Json(&order.items))
        .bind(order.totals.subtotal.amount())
        .bind(order.totals.tax.amount())
        .bind(order.totals.shipping.amount())
        .bind(order.totals.total.amount())
        .bind(order.status.as_str())
        .bind(order.payment_method.as_str())
        .bind(order.notes.as_deref())
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, "order or invoice number"))?;

        debug!("Inserted order");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn find_by_number(&self, number: &str) -> Result<Option<Order>, RepositoryError> {
        let row: Option<OrderRow> = sqlx::query_as(&format!(
            "SELECT {ORDER_COLUMNS} FROM storefront.customer_order
             WHERE order_number = $1 OR invoice_number = $1"
        ))
        .bind(number)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Order::try_from).transpose()
    }

    #[instrument(skip(self))]
    async fn list(&self, query: &OrderQuery) -> Result<OrderPage, RepositoryError> {
        let pattern = query.search.as_deref().map(like_pattern);
        let status = query.status.map(OrderStatus::as_str);

        let total: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM storefront.customer_order WHERE {LIST_FILTER}"
        ))
        .bind(pattern.as_deref())
        .bind(status)
        .fetch_one(&self.pool)
        .await?;

        let rows: Vec<OrderRow> = sqlx::query_as(&format!(
            "SELECT {ORDER_COLUMNS} FROM storefront.customer_order
             WHERE {LIST_FILTER}
             ORDER BY created_at DESC, order_number DESC
             LIMIT $3 OFFSET $4"
        ))
        .bind(pattern.as_deref())
        .bind(status)
        .bind(i64::from(query.limit))
        .bind(i64::try_from(query.offset).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        let orders = rows
            .into_iter()
            .map(Order::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(OrderPage {
            orders,
            total: u64::try_from(total).unwrap_or_default(),
        })
    }

    #[instrument(skip(self, change), fields(to = %change.status))]
    async fn update_if_status(
        &self,
        number: &str,
        expected: OrderStatus,
        change: &OrderChange,
    ) -> Result<Option<Order>, RepositoryError> {
        let (notes_changed, notes) = match &change.notes {
            Some(notes) => (true, notes.as_deref()),
            None => (false, None),
        };

        let row: Option<OrderRow> = sqlx::query_as(&format!(
            "UPDATE storefront.customer_order
             SET status = $3,
                 notes = CASE WHEN $4 THEN $5 ELSE notes END,
                 updated_at = $6
             WHERE (order_number = $1 OR invoice_number = $1) AND status = $2
             RETURNING {ORDER_COLUMNS}"
        ))
        .bind(number)
        .bind(expected.as_str())
        .bind(change.status.as_str())
        .bind(notes_changed)
        .bind(notes)
        .bind(change.updated_at)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Order::try_from).transpose()
    }
}
