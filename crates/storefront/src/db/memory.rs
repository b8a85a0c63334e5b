//! In-memory storage backend.
//!
//! Carts and counters live in [`DashMap`]s; every mutation runs inside the
//! map's per-key entry guard, which gives the same per-identity atomicity as
//! the `cart` row lock in `PostgreSQL`. Guards are never held across an
//! `.await`.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use dashmap::DashMap;
use tokio::sync::RwLock;

use cartwheel_core::{
    Cart, CartAction, ClientId, IdempotencyKey, Order, OrderStatus, SequencePurpose,
};

use super::{
    CartStore, IDEMPOTENCY_KEY_TTL, OrderChange, OrderPage, OrderQuery, OrderStore,
    RepositoryError, SequenceStore,
};

struct CartRecord {
    cart: Cart,
    applied_keys: HashMap<IdempotencyKey, DateTime<Utc>>,
}

impl CartRecord {
    fn new(owner: ClientId, now: DateTime<Utc>) -> Self {
        Self {
            cart: Cart::empty(owner, now),
            applied_keys: HashMap::new(),
        }
    }

    fn forget_expired_keys(&mut self, now: DateTime<Utc>) {
        if let Ok(ttl) = chrono::Duration::from_std(IDEMPOTENCY_KEY_TTL) {
            self.applied_keys.retain(|_, applied_at| now - *applied_at < ttl);
        }
    }
}

#[derive(Default)]
struct OrderTable {
    /// Insertion order, oldest first.
    orders: Vec<Order>,
    /// Order number and invoice number -> index into `orders`.
    by_number: HashMap<String, usize>,
}

/// Process-local implementation of every store trait.
#[derive(Default)]
pub struct MemoryStore {
    carts: DashMap<ClientId, CartRecord>,
    counters: DashMap<(SequencePurpose, NaiveDate), i64>,
    orders: RwLock<OrderTable>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CartStore for MemoryStore {
    async fn load(&self, owner: &ClientId) -> Result<Cart, RepositoryError> {
        Ok(self.carts.get(owner).map_or_else(
            || Cart::empty(owner.clone(), Utc::now()),
            |record| record.cart.clone(),
        ))
    }

    async fn apply(
        &self,
        owner: &ClientId,
        action: CartAction,
        key: Option<&IdempotencyKey>,
    ) -> Result<Cart, RepositoryError> {
        let now = Utc::now();
        let mut record = self
            .carts
            .entry(owner.clone())
            .or_insert_with(|| CartRecord::new(owner.clone(), now));

        if let Some(key) = key {
            record.forget_expired_keys(now);
            if record.applied_keys.contains_key(key) {
                return Ok(record.cart.clone());
            }
        }

        record.cart.apply(action)?;
        record.cart.updated_at = now;
        if let Some(key) = key {
            record.applied_keys.insert(key.clone(), now);
        }

        Ok(record.cart.clone())
    }
}

#[async_trait]
impl SequenceStore for MemoryStore {
    async fn increment(
        &self,
        purpose: SequencePurpose,
        day: NaiveDate,
    ) -> Result<i64, RepositoryError> {
        let mut count = self.counters.entry((purpose, day)).or_insert(0);
        *count += 1;
        Ok(*count)
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn insert(&self, order: &Order) -> Result<(), RepositoryError> {
        let mut table = self.orders.write().await;

        if order.order_number == order.invoice_number
            || table.by_number.contains_key(&order.order_number)
            || table.by_number.contains_key(&order.invoice_number)
        {
            return Err(RepositoryError::Conflict(
                "order or invoice number already exists".to_owned(),
            ));
        }

        let index = table.orders.len();
        table.by_number.insert(order.order_number.clone(), index);
        table.by_number.insert(order.invoice_number.clone(), index);
        table.orders.push(order.clone());
        Ok(())
    }

    async fn find_by_number(&self, number: &str) -> Result<Option<Order>, RepositoryError> {
        let table = self.orders.read().await;
        Ok(table
            .by_number
            .get(number)
            .and_then(|&i| table.orders.get(i))
            .cloned())
    }

    async fn list(&self, query: &OrderQuery) -> Result<OrderPage, RepositoryError> {
        let table = self.orders.read().await;
        let needle = query.search.as_deref().map(str::to_lowercase);

        let matches = |order: &&Order| {
            query.status.is_none_or(|s| order.status == s)
                && needle.as_deref().is_none_or(|n| {
                    [
                        order.order_number.as_str(),
                        order.invoice_number.as_str(),
                        order.customer.name.as_str(),
                        order.customer.email.as_str(),
                    ]
                    .iter()
                    .any(|field| field.to_lowercase().contains(n))
                })
        };

        let mut found: Vec<&Order> = table.orders.iter().filter(matches).collect();
        found.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.order_number.cmp(&a.order_number))
        });

        let total = found.len() as u64;
        let orders = found
            .into_iter()
            .skip(usize::try_from(query.offset).unwrap_or(usize::MAX))
            .take(query.limit as usize)
            .cloned()
            .collect();

        Ok(OrderPage { orders, total })
    }

    async fn update_if_status(
        &self,
        number: &str,
        expected: OrderStatus,
        change: &OrderChange,
    ) -> Result<Option<Order>, RepositoryError> {
        let mut table = self.orders.write().await;
        let Some(&index) = table.by_number.get(number) else {
            return Ok(None);
        };
        let Some(order) = table.orders.get_mut(index) else {
            return Ok(None);
        };
        if order.status != expected {
            return Ok(None);
        }

        order.status = change.status;
        if let Some(notes) = &change.notes {
            order.notes.clone_from(notes);
        }
        order.updated_at = change.updated_at;
        Ok(Some(order.clone()))
    }
}
