//! `PostgreSQL` cart store.
//!
//! Every mutation runs in one transaction that:
//!
//! 1. upserts the `cart` row, taking its row lock (serializes mutations per
//!    identity) and bumping `updated_at`
//! 2. records the idempotency key, if any, rolling back on replay
//! 3. applies the change to `cart_item`
//! 4. reads the cart back

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};
use tracing::{debug, instrument};

use cartwheel_core::{
    Cart, CartAction, CartItem, ClientId, IdempotencyKey, MAX_QUANTITY, Price, ProductRef,
    ValidationError, normalize_items, validate_quantity,
};

use super::{CartStore, IDEMPOTENCY_KEY_TTL, RepositoryError};

/// SQLSTATE for `numeric_value_out_of_range` (integer overflow).
const NUMERIC_OUT_OF_RANGE: &str = "22003";

#[derive(sqlx::FromRow)]
struct CartItemRow {
    product_ref: ProductRef,
    name: String,
    unit_price: Decimal,
    image_ref: String,
    quantity: i32,
}

impl TryFrom<CartItemRow> for CartItem {
    type Error = RepositoryError;

    fn try_from(row: CartItemRow) -> Result<Self, Self::Error> {
        let unit_price = Price::new(row.unit_price, "unit_price").map_err(|e| {
            RepositoryError::DataCorruption(format!("cart_item {}: {e}", row.product_ref))
        })?;
        let quantity = u32::try_from(row.quantity)
            .ok()
            .filter(|q| *q >= 1)
            .ok_or_else(|| {
                RepositoryError::DataCorruption(format!(
                    "cart_item {}: quantity {}",
                    row.product_ref, row.quantity
                ))
            })?;

        Ok(Self {
            product_ref: row.product_ref,
            name: row.name,
            unit_price,
            image_ref: row.image_ref,
            quantity,
        })
    }
}

/// Cart store backed by the `storefront.cart` and `storefront.cart_item` tables.
#[derive(Clone)]
pub struct PgCartStore {
    pool: PgPool,
}

impl PgCartStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CartStore for PgCartStore {
    #[instrument(skip(self), fields(owner = %owner))]
    async fn load(&self, owner: &ClientId) -> Result<Cart, RepositoryError> {
        let mut conn = self.pool.acquire().await?;

        let updated_at: Option<DateTime<Utc>> = sqlx::query_scalar(
            "SELECT updated_at FROM storefront.cart WHERE owner_id = $1",
        )
        .bind(owner)
        .fetch_optional(&mut *conn)
        .await?;

        match updated_at {
            Some(updated_at) => read_cart(&mut conn, owner, updated_at).await,
            None => Ok(Cart::empty(owner.clone(), Utc::now())),
        }
    }

    #[instrument(skip(self, action), fields(owner = %owner, replayable = key.is_some()))]
    async fn apply(
        &self,
        owner: &ClientId,
        action: CartAction,
        key: Option<&IdempotencyKey>,
    ) -> Result<Cart, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let updated_at: DateTime<Utc> = sqlx::query_scalar(
            r"
            INSERT INTO storefront.cart (owner_id)
            VALUES ($1)
            ON CONFLICT (owner_id) DO UPDATE SET updated_at = NOW()
            RETURNING updated_at
            ",
        )
        .bind(owner)
        .fetch_one(&mut *tx)
        .await?;

        if let Some(key) = key
            && !record_key(&mut tx, owner, key).await?
        {
            tx.rollback().await?;
            debug!(key = key.as_str(), "Idempotency key replayed, skipping mutation");
            return self.load(owner).await;
        }

        apply_action(&mut tx, owner, action).await?;

        let cart = read_cart(&mut tx, owner, updated_at).await?;
        tx.commit().await?;
        Ok(cart)
    }
}

/// Record `key` for `owner`. Returns `false` if it was already recorded.
async fn record_key(
    conn: &mut PgConnection,
    owner: &ClientId,
    key: &IdempotencyKey,
) -> Result<bool, RepositoryError> {
    let cutoff = chrono::Duration::from_std(IDEMPOTENCY_KEY_TTL)
        .map(|ttl| Utc::now() - ttl)
        .map_err(|e| RepositoryError::DataCorruption(format!("idempotency ttl: {e}")))?;

    sqlx::query(
        r"
        DELETE FROM storefront.cart_idempotency_key
        WHERE owner_id = $1 AND created_at < $2
        ",
    )
    .bind(owner)
    .bind(cutoff)
    .execute(&mut *conn)
    .await?;

    let inserted = sqlx::query(
        r"
        INSERT INTO storefront.cart_idempotency_key (owner_id, idempotency_key)
        VALUES ($1, $2)
        ON CONFLICT (owner_id, idempotency_key) DO NOTHING
        ",
    )
    .bind(owner)
    .bind(key)
    .execute(&mut *conn)
    .await?;

    Ok(inserted.rows_affected() == 1)
}

async fn apply_action(
    conn: &mut PgConnection,
    owner: &ClientId,
    action: CartAction,
) -> Result<(), RepositoryError> {
    match action {
        CartAction::AddItem(item) => add_item(conn, owner, &item).await,
        CartAction::SetQuantity {
            product_ref,
            quantity,
        } => {
            if quantity <= 0 {
                delete_item(conn, owner, &product_ref).await
            } else {
                let quantity = to_column(validate_quantity(quantity, "quantity")?)?;
                sqlx::query(
                    r"
                    UPDATE storefront.cart_item
                    SET quantity = $3
                    WHERE owner_id = $1 AND product_ref = $2
                    ",
                )
                .bind(owner)
                .bind(&product_ref)
                .bind(quantity)
                .execute(&mut *conn)
                .await?;
                Ok(())
            }
        }
        CartAction::ReplaceAll(items) => {
            let items = normalize_items(items)?;
            clear_items(conn, owner).await?;
            for item in &items {
                add_item(conn, owner, item).await?;
            }
            Ok(())
        }
        CartAction::RemoveItem(product_ref) => delete_item(conn, owner, &product_ref).await,
        CartAction::Clear => clear_items(conn, owner).await,
    }
}

/// Insert a line or atomically increment an existing one, overwriting its
/// display fields.
async fn add_item(
    conn: &mut PgConnection,
    owner: &ClientId,
    item: &CartItem,
) -> Result<(), RepositoryError> {
    sqlx::query(
        r"
        INSERT INTO storefront.cart_item AS line
            (owner_id, product_ref, name, unit_price, image_ref, quantity)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (owner_id, product_ref) DO UPDATE SET
            quantity = line.quantity + EXCLUDED.quantity,
            name = EXCLUDED.name,
            unit_price = EXCLUDED.unit_price,
            image_ref = EXCLUDED.image_ref
        ",
    )
    .bind(owner)
    .bind(&item.product_ref)
    .bind(&item.name)
    .bind(item.unit_price.amount())
    .bind(&item.image_ref)
    .bind(to_column(item.quantity)?)
    .execute(&mut *conn)
    .await
    .map_err(|e| {
        if let sqlx::Error::Database(ref db_err) = e
            && db_err.code().as_deref() == Some(NUMERIC_OUT_OF_RANGE)
        {
            return RepositoryError::Validation(ValidationError::QuantityOverflow {
                product_ref: item.product_ref.to_string(),
                max: MAX_QUANTITY,
            });
        }
        RepositoryError::Database(e)
    })?;
    Ok(())
}

async fn delete_item(
    conn: &mut PgConnection,
    owner: &ClientId,
    product_ref: &ProductRef,
) -> Result<(), RepositoryError> {
    sqlx::query("DELETE FROM storefront.cart_item WHERE owner_id = $1 AND product_ref = $2")
        .bind(owner)
        .bind(product_ref)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

async fn clear_items(conn: &mut PgConnection, owner: &ClientId) -> Result<(), RepositoryError> {
    sqlx::query("DELETE FROM storefront.cart_item WHERE owner_id = $1")
        .bind(owner)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

async fn read_cart(
    conn: &mut PgConnection,
    owner: &ClientId,
    updated_at: DateTime<Utc>,
) -> Result<Cart, RepositoryError> {
    let rows: Vec<CartItemRow> = sqlx::query_as(
        r"
        SELECT product_ref, name, unit_price, image_ref, quantity
        FROM storefront.cart_item
        WHERE owner_id = $1
        ORDER BY position
        ",
    )
    .bind(owner)
    .fetch_all(&mut *conn)
    .await?;

    let items = rows
        .into_iter()
        .map(CartItem::try_from)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Cart {
        owner_id: owner.clone(),
        items,
        updated_at,
    })
}

fn to_column(quantity: u32) -> Result<i32, RepositoryError> {
    i32::try_from(quantity).map_err(|_| {
        RepositoryError::Validation(ValidationError::Invalid {
            field: "quantity",
            reason: format!("must be at most {MAX_QUANTITY}"),
        })
    })
}
