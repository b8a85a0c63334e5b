//! Order creation, lookup, listing, and status updates.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::instrument;

use cartwheel_core::{
    MAX_NOTES_LENGTH, Order, OrderCreated, OrderRequest, OrderStatus, SequencePurpose,
    ValidationError,
};

use crate::db::{OrderChange, OrderQuery, OrderStore, RepositoryError};
use crate::services::notify::{NotifyError, Notifier};
use crate::services::retry::StoragePolicy;
use crate::services::sequence::{SequenceError, SequenceGenerator};

/// Default page size for order listings.
pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// Largest accepted page size.
pub const MAX_PAGE_SIZE: u32 = 100;

/// Errors from order operations.
#[derive(Debug, Error)]
pub enum OrderError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("order {0} not found")]
    NotFound(String),

    /// A number collided at insert, or the status changed concurrently.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error(transparent)]
    Sequence(#[from] SequenceError),

    #[error("order storage error: {0}")]
    Storage(RepositoryError),
}

impl From<RepositoryError> for OrderError {
    fn from(e: RepositoryError) -> Self {
        match e {
            RepositoryError::Validation(v) => Self::Validation(v),
            RepositoryError::Conflict(what) => Self::Conflict(what),
            other => Self::Storage(other),
        }
    }
}

/// A created order plus any non-fatal problems met after it was persisted.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedOrder {
    pub order: Order,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// Query string of `GET /orders`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListParams {
    pub search: Option<String>,
    pub status: Option<OrderStatus>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub total_pages: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderList {
    pub orders: Vec<Order>,
    pub pagination: Pagination,
}

/// Body of `PATCH /orders/{number}`.
///
/// `notes: null` clears the notes; an absent `notes` leaves them unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrderUpdate {
    pub status: Option<OrderStatus>,
    #[serde(default, deserialize_with = "present")]
    pub notes: Option<Option<String>>,
}

/// Distinguish an explicit `null` from an absent field.
fn present<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Some)
}

#[derive(Clone)]
pub struct OrderService {
    orders: Arc<dyn OrderStore>,
    sequences: SequenceGenerator,
    notifier: Arc<dyn Notifier>,
    policy: StoragePolicy,
}

impl OrderService {
    #[must_use]
    pub fn new(
        orders: Arc<dyn OrderStore>,
        sequences: SequenceGenerator,
        notifier: Arc<dyn Notifier>,
        policy: StoragePolicy,
    ) -> Self {
        Self {
            orders,
            sequences,
            notifier,
            policy,
        }
    }

    /// Create an order now.
    ///
    /// # Errors
    ///
    /// See [`create_order_at`](Self::create_order_at).
    pub async fn create_order(&self, request: OrderRequest) -> Result<CreatedOrder, OrderError> {
        self.create_order_at(request, Utc::now()).await
    }

    /// Validate, number, persist, and announce an order.
    ///
    /// Validation happens before any number is drawn. Numbers drawn for an
    /// order that then fails to persist are not reused.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::Validation` for a malformed request,
    /// `OrderError::Sequence` if a counter is exhausted, and
    /// `OrderError::Conflict` if a drawn number already exists.
    #[instrument(skip(self, request))]
    pub async fn create_order_at(
        &self,
        request: OrderRequest,
        now: DateTime<Utc>,
    ) -> Result<CreatedOrder, OrderError> {
        let new_order = request.validate()?;

        let order_number = self.sequences.next(SequencePurpose::Order, now).await?;
        let invoice_number = self.sequences.next(SequencePurpose::Invoice, now).await?;
        let order = new_order.into_order(order_number, invoice_number, now);

        self.policy.write(self.orders.insert(&order)).await?;
        tracing::info!(
            order_number = %order.order_number,
            invoice_number = %order.invoice_number,
            total = %order.totals.total,
            "Order created"
        );

        let mut warnings = Vec::new();
        if let Err(e) = self.notify(&order).await {
            tracing::warn!(
                order_number = %order.order_number,
                error = %e,
                "Order notification failed"
            );
            warnings.push(format!("order notification failed: {e}"));
        }

        Ok(CreatedOrder { order, warnings })
    }

    async fn notify(&self, order: &Order) -> Result<(), NotifyError> {
        let event = OrderCreated::from(order);
        tokio::time::timeout(self.policy.timeout, self.notifier.order_created(&event))
            .await
            .map_err(|_| NotifyError::Timeout(self.policy.timeout))?
    }

    /// Look up an order by order number or invoice number.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::NotFound` if neither number matches.
    #[instrument(skip(self))]
    pub async fn get(&self, number: &str) -> Result<Order, OrderError> {
        self.policy
            .read("orders.find", || self.orders.find_by_number(number))
            .await?
            .ok_or_else(|| OrderError::NotFound(number.to_owned()))
    }

    /// List orders newest first.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::Validation` for `page` 0 or a `limit` outside
    /// `1..=100`.
    #[instrument(skip(self))]
    pub async fn list(&self, params: ListParams) -> Result<OrderList, OrderError> {
        let page = params.page.unwrap_or(1);
        if page == 0 {
            return Err(ValidationError::BelowMinimum {
                field: "page",
                min: 1,
            }
            .into());
        }
        let limit = params.limit.unwrap_or(DEFAULT_PAGE_SIZE);
        if !(1..=MAX_PAGE_SIZE).contains(&limit) {
            return Err(ValidationError::Invalid {
                field: "limit",
                reason: format!("must be between 1 and {MAX_PAGE_SIZE}"),
            }
            .into());
        }

        let query = OrderQuery {
            search: params
                .search
                .map(|s| s.trim().to_owned())
                .filter(|s| !s.is_empty()),
            status: params.status,
            offset: u64::from(page - 1) * u64::from(limit),
            limit,
        };
        let found = self
            .policy
            .read("orders.list", || self.orders.list(&query))
            .await?;

        Ok(OrderList {
            orders: found.orders,
            pagination: Pagination {
                page,
                limit,
                total: found.total,
                total_pages: found.total.div_ceil(u64::from(limit)),
            },
        })
    }

    /// Change an order's status and/or notes.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::Validation` for an empty update or an illegal
    /// transition, `OrderError::NotFound` for an unknown number, and
    /// `OrderError::Conflict` if the status changed underneath the update.
    #[instrument(skip(self, update))]
    pub async fn update(&self, number: &str, update: OrderUpdate) -> Result<Order, OrderError> {
        if update.status.is_none() && update.notes.is_none() {
            return Err(ValidationError::Invalid {
                field: "body",
                reason: "expected status or notes".to_owned(),
            }
            .into());
        }

        let notes = match update.notes {
            Some(Some(text)) => {
                let text = text.trim().to_owned();
                if text.chars().count() > MAX_NOTES_LENGTH {
                    return Err(ValidationError::TooLong {
                        field: "notes",
                        max: MAX_NOTES_LENGTH,
                    }
                    .into());
                }
                Some((!text.is_empty()).then_some(text))
            }
            Some(None) => Some(None),
            None => None,
        };

        let current = self.get(number).await?;
        let status = match update.status {
            Some(next) => current.status.transition_to(next)?,
            None => current.status,
        };

        let change = OrderChange {
            status,
            notes,
            updated_at: Utc::now(),
        };
        let updated = self
            .policy
            .write(self.orders.update_if_status(number, current.status, &change))
            .await?
            .ok_or_else(|| {
                OrderError::Conflict(format!("order {number} was modified concurrently"))
            })?;

        tracing::info!(
            order_number = %updated.order_number,
            from = %current.status,
            to = %updated.status,
            "Order updated"
        );
        Ok(updated)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::str::FromStr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::TimeZone;
    use rust_decimal::Decimal;
    use serde_json::json;

    use super::*;
    use crate::db::MemoryStore;
    use crate::services::notify::LogNotifier;

    struct FailingNotifier(AtomicUsize);

    #[async_trait]
    impl Notifier for FailingNotifier {
        async fn order_created(&self, _event: &OrderCreated) -> Result<(), NotifyError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Err(NotifyError::Api {
                status: 500,
                message: "boom".into(),
            })
        }
    }

    fn service_with(notifier: Arc<dyn Notifier>) -> OrderService {
        let store = Arc::new(MemoryStore::new());
        let policy = StoragePolicy::new(Duration::from_secs(1), 1);
        OrderService::new(
            store.clone(),
            SequenceGenerator::new(store, policy),
            notifier,
            policy,
        )
    }

    fn service() -> OrderService {
        service_with(Arc::new(LogNotifier))
    }

    fn request(subtotal: &str) -> OrderRequest {
        serde_json::from_value(json!({
            "customer": {
                "name": "Grace Hopper",
                "email": "grace@example.com",
                "phone": "555-0100",
                "address": "1 Compiler Way",
                "city": "Arlington",
                "state": "VA",
                "postalCode": "22201",
                "country": "US"
            },
            "items": [
                {"productRef": "1001", "name": "Mug", "unitPrice": "8.00", "quantity": 2}
            ],
            "subtotal": subtotal,
            "tax": "1.28",
            "shipping": "4.99",
            "paymentMethod": "card"
        }))
        .unwrap()
    }

    fn new_year() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 10, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_create_order_numbers_and_total() {
        let svc = service();
        let created = svc.create_order_at(request("16.00"), new_year()).await.unwrap();
        let order = created.order;

        assert_eq!(order.order_number, "ORD-20250101-0001");
        assert_eq!(order.invoice_number, "INV-20250101-0001");
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.totals.total.amount(), Decimal::from_str("22.27").unwrap());
        assert!(created.warnings.is_empty());

        assert_eq!(svc.get("ORD-20250101-0001").await.unwrap().id, order.id);
        assert_eq!(svc.get("INV-20250101-0001").await.unwrap().id, order.id);
    }

    #[tokio::test]
    async fn test_concurrent_creates_get_consecutive_numbers() {
        let svc = service();
        let (a, b) = tokio::join!(
            svc.create_order_at(request("16.00"), new_year()),
            svc.create_order_at(request("16.00"), new_year()),
        );
        let mut numbers = vec![a.unwrap().order.order_number, b.unwrap().order.order_number];
        numbers.sort();
        assert_eq!(numbers, vec!["ORD-20250101-0001", "ORD-20250101-0002"]);
    }

    #[tokio::test]
    async fn test_invalid_request_burns_no_numbers() {
        let svc = service();
        let err = svc.create_order_at(request("-1"), new_year()).await.unwrap_err();
        assert!(matches!(
            err,
            OrderError::Validation(ValidationError::Negative { field: "subtotal" })
        ));

        let created = svc.create_order_at(request("16.00"), new_year()).await.unwrap();
        assert_eq!(created.order.order_number, "ORD-20250101-0001");
    }

    #[tokio::test]
    async fn test_notification_failure_is_a_warning() {
        let notifier = Arc::new(FailingNotifier(AtomicUsize::new(0)));
        let svc = service_with(notifier.clone());

        let created = svc.create_order_at(request("16.00"), new_year()).await.unwrap();
        assert_eq!(created.warnings.len(), 1);
        assert_eq!(notifier.0.load(Ordering::SeqCst), 1);
        assert!(svc.get(&created.order.order_number).await.is_ok());
    }

    #[tokio::test]
    async fn test_get_unknown_is_not_found() {
        assert!(matches!(
            service().get("ORD-20990101-0001").await,
            Err(OrderError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_list_paginates_newest_first() {
        let svc = service();
        for _ in 0..3 {
            svc.create_order(request("16.00")).await.unwrap();
        }

        let page = svc
            .list(ListParams {
                limit: Some(2),
                ..ListParams::default()
            })
            .await
            .unwrap();
        assert_eq!(page.orders.len(), 2);
        assert_eq!(
            page.pagination,
            Pagination {
                page: 1,
                limit: 2,
                total: 3,
                total_pages: 2
            }
        );
        assert!(page.orders[0].order_number > page.orders[1].order_number);

        let search = svc
            .list(ListParams {
                search: Some("GRACE@".into()),
                ..ListParams::default()
            })
            .await
            .unwrap();
        assert_eq!(search.pagination.total, 3);

        let none = svc
            .list(ListParams {
                status: Some(OrderStatus::Shipped),
                ..ListParams::default()
            })
            .await
            .unwrap();
        assert!(none.orders.is_empty());
        assert_eq!(none.pagination.total_pages, 0);
    }

    #[tokio::test]
    async fn test_list_rejects_bad_paging() {
        let svc = service();
        let zero_page = ListParams {
            page: Some(0),
            ..ListParams::default()
        };
        assert!(matches!(svc.list(zero_page).await, Err(OrderError::Validation(_))));

        let huge = ListParams {
            limit: Some(101),
            ..ListParams::default()
        };
        assert!(matches!(svc.list(huge).await, Err(OrderError::Validation(_))));
    }

    #[tokio::test]
    async fn test_update_follows_transition_table() {
        let svc = service();
        let number = svc
            .create_order(request("16.00"))
            .await
            .unwrap()
            .order
            .order_number;

        let update = |status| OrderUpdate {
            status: Some(status),
            notes: None,
        };

        let order = svc.update(&number, update(OrderStatus::Confirmed)).await.unwrap();
        assert_eq!(order.status, OrderStatus::Confirmed);

        let err = svc.update(&number, update(OrderStatus::Delivered)).await.unwrap_err();
        assert!(matches!(
            err,
            OrderError::Validation(ValidationError::IllegalTransition { .. })
        ));
    }

    #[tokio::test]
    async fn test_update_notes_only() {
        let svc = service();
        let number = svc
            .create_order(request("16.00"))
            .await
            .unwrap()
            .order
            .order_number;

        let set: OrderUpdate = serde_json::from_value(json!({"notes": "Leave at door"})).unwrap();
        let order = svc.update(&number, set).await.unwrap();
        assert_eq!(order.notes.as_deref(), Some("Leave at door"));
        assert_eq!(order.status, OrderStatus::Pending);

        let clear: OrderUpdate = serde_json::from_value(json!({"notes": null})).unwrap();
        assert_eq!(svc.update(&number, clear).await.unwrap().notes, None);

        let empty: OrderUpdate = serde_json::from_value(json!({})).unwrap();
        assert!(matches!(
            svc.update(&number, empty).await,
            Err(OrderError::Validation(_))
        ));
    }

    #[test]
    fn test_repository_errors_map() {
        assert!(matches!(
            OrderError::from(RepositoryError::Conflict("order number".into())),
            OrderError::Conflict(_)
        ));
        assert!(matches!(
            OrderError::from(RepositoryError::NotFound),
            OrderError::Storage(_)
        ));
    }
}
