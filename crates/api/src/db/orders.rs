//! Order repository.
//!
//! Listing, counting and aggregation all share [`OrderFilter`], so the page,
//! the total and the per-status counts always describe the same set of
//! orders. The reads are independent statements and may observe slightly
//! different snapshots under concurrent writes.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use mockall::automock;
use pickup_core::{
    OrderId, PaymentStatus, PickupDate, PickupStatus, PickupTime, Price, ProductId, UserId,
};
use sqlx::{FromRow, PgPool, Postgres, Transaction, query, query_as, query_scalar};
use tracing::instrument;

use super::RepositoryError;
use crate::models::{LineItem, Order};

/// Criteria for selecting orders.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderFilter {
    pub status: Option<PickupStatus>,
    pub owner: Option<UserId>,
    /// Inclusive lower bound on `created_at`.
    pub created_from: Option<DateTime<Utc>>,
    /// Exclusive upper bound on `created_at`.
    pub created_before: Option<DateTime<Utc>>,
}

impl OrderFilter {
    /// Whether an order satisfies every criterion.
    #[must_use]
    pub fn matches(&self, order: &Order) -> bool {
        self.status.is_none_or(|s| order.pickup_status == s)
            && self.owner.is_none_or(|o| order.owner == Some(o))
            && self.created_from.is_none_or(|from| order.created_at >= from)
            && self
                .created_before
                .is_none_or(|before| order.created_at < before)
    }
}

/// A window into a newest-first ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub offset: u64,
    pub limit: u64,
}

/// Number of orders in each pickup status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub pending: u64,
    pub processing: u64,
    pub ready: u64,
    pub completed: u64,
    pub cancelled: u64,
}

impl StatusCounts {
    /// Sum over all buckets.
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.pending + self.processing + self.ready + self.completed + self.cancelled
    }

    /// Count one order in the bucket for `status`.
    pub const fn record(&mut self, status: PickupStatus) {
        match status {
            PickupStatus::Pending => self.pending += 1,
            PickupStatus::Processing => self.processing += 1,
            PickupStatus::Ready => self.ready += 1,
            PickupStatus::Completed => self.completed += 1,
            PickupStatus::Cancelled => self.cancelled += 1,
        }
    }
}

#[automock]
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Persist a new order and its line items atomically.
    async fn insert(&self, order: &Order) -> Result<(), RepositoryError>;

    /// Fetch a single order.
    async fn get(&self, id: OrderId) -> Result<Option<Order>, RepositoryError>;

    /// Matching orders, newest first, restricted to `page`.
    async fn find_page(
        &self,
        filter: &OrderFilter,
        page: PageRequest,
    ) -> Result<Vec<Order>, RepositoryError>;

    /// Number of matching orders.
    async fn count(&self, filter: &OrderFilter) -> Result<u64, RepositoryError>;

    /// Per-status counts over matching orders.
    async fn status_counts(&self, filter: &OrderFilter) -> Result<StatusCounts, RepositoryError>;

    /// Sum of line-item quantities over matching orders.
    async fn total_items(&self, filter: &OrderFilter) -> Result<u64, RepositoryError>;

    /// All orders placed by `owner`, newest first.
    async fn list_by_owner(&self, owner: UserId) -> Result<Vec<Order>, RepositoryError>;

    /// Overwrite the pickup status. Returns `None` if the order does not exist.
    async fn set_pickup_status(
        &self,
        id: OrderId,
        status: PickupStatus,
    ) -> Result<Option<Order>, RepositoryError>;

    /// Overwrite the payment status. Returns `None` if the order does not exist.
    async fn set_payment_status(
        &self,
        id: OrderId,
        status: PaymentStatus,
    ) -> Result<Option<Order>, RepositoryError>;
}

// =============================================================================
// PostgreSQL implementation
// =============================================================================

const ORDER_COLUMNS: &str = "o.id, o.customer_id, o.total_price, o.pickup_date, o.pickup_time, \
     o.pickup_status, o.payment_status, o.customer_comments, o.created_at";

const FILTER_PREDICATE: &str = "($1::shop.pickup_status IS NULL OR o.pickup_status = $1) \
     AND ($2::uuid IS NULL OR o.customer_id = $2) \
     AND ($3::timestamptz IS NULL OR o.created_at >= $3) \
     AND ($4::timestamptz IS NULL OR o.created_at < $4)";

macro_rules! bind_filter {
    ($query:expr, $filter:expr) => {
        $query
            .bind($filter.status)
            .bind($filter.owner)
            .bind($filter.created_from)
            .bind($filter.created_before)
    };
}

#[derive(Debug, FromRow)]
struct OrderRow {
    id: OrderId,
    customer_id: Option<UserId>,
    total_price: Price,
    pickup_date: NaiveDate,
    pickup_time: Option<NaiveTime>,
    pickup_status: PickupStatus,
    payment_status: PaymentStatus,
    customer_comments: Option<String>,
    created_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct ItemRow {
    order_id: OrderId,
    product_id: ProductId,
    quantity: i32,
    unit_price: Price,
}

#[derive(Debug, FromRow)]
struct StatusCountRow {
    pending: i64,
    processing: i64,
    ready: i64,
    completed: i64,
    cancelled: i64,
}

fn to_count(value: i64, column: &str) -> Result<u64, RepositoryError> {
    u64::try_from(value)
        .map_err(|_| RepositoryError::DataCorruption(format!("negative {column}: {value}")))
}

fn to_sql_int(value: u64, what: &str) -> Result<i64, RepositoryError> {
    i64::try_from(value).map_err(|_| RepositoryError::DataCorruption(format!("{what} too large")))
}

impl TryFrom<ItemRow> for LineItem {
    type Error = RepositoryError;

    fn try_from(row: ItemRow) -> Result<Self, Self::Error> {
        let quantity = u32::try_from(row.quantity).map_err(|_| {
            RepositoryError::DataCorruption(format!(
                "order {} has invalid quantity {}",
                row.order_id, row.quantity
            ))
        })?;
        Ok(Self {
            product_ref: row.product_id,
            quantity,
            unit_price: row.unit_price,
        })
    }
}

/// `PostgreSQL`-backed [`OrderRepository`].
#[derive(Debug, Clone)]
pub struct PgOrderRepository {
    pool: PgPool,
}

impl PgOrderRepository {
    /// Create a new order repository.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Load line items for `rows` and assemble full orders, keeping row order.
    async fn hydrate(&self, rows: Vec<OrderRow>) -> Result<Vec<Order>, RepositoryError> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<OrderId> = rows.iter().map(|r| r.id).collect();
        let item_rows = query_as::<Postgres, ItemRow>(
            "SELECT order_id, product_id, quantity, unit_price \
             FROM shop.order_item \
             WHERE order_id = ANY($1) \
             ORDER BY order_id, position",
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let mut items: HashMap<OrderId, Vec<LineItem>> = HashMap::new();
        for row in item_rows {
            let order_id = row.order_id;
            items.entry(order_id).or_default().push(row.try_into()?);
        }

        Ok(rows
            .into_iter()
            .map(|row| Order {
                line_items: items.remove(&row.id).unwrap_or_default(),
                id: row.id,
                owner: row.customer_id,
                total_price: row.total_price,
                pickup_date: PickupDate::from(row.pickup_date),
                pickup_time: row.pickup_time.map(PickupTime::from),
                pickup_status: row.pickup_status,
                payment_status: row.payment_status,
                created_at: row.created_at,
                customer_comments: row.customer_comments,
            })
            .collect())
    }

    async fn insert_items(
        tx: &mut Transaction<'_, Postgres>,
        order: &Order,
    ) -> Result<(), RepositoryError> {
        for (position, item) in (0_i32..).zip(&order.line_items) {
            let quantity = i32::try_from(item.quantity).map_err(|_| {
                RepositoryError::Conflict(format!("quantity {} out of range", item.quantity))
            })?;
            query(
                "INSERT INTO shop.order_item (order_id, position, product_id, quantity, unit_price) \
                 VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(order.id)
            .bind(position)
            .bind(item.product_ref)
            .bind(quantity)
            .bind(item.unit_price)
            .execute(&mut **tx)
            .await?;
        }
        Ok(())
    }

    async fn update_status<T>(
        &self,
        column: &'static str,
        id: OrderId,
        value: T,
    ) -> Result<Option<Order>, RepositoryError>
    where
        T: for<'q> sqlx::Encode<'q, Postgres> + sqlx::Type<Postgres> + Send + 'static,
    {
        let sql = format!("UPDATE shop.orders SET {column} = $2 WHERE id = $1 RETURNING id");
        let updated: Option<OrderId> = query_scalar(&sql)
            .bind(id)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?;

        match updated {
            Some(id) => self.get(id).await,
            None => Ok(None),
        }
    }
}

#[async_trait]
impl OrderRepository for PgOrderRepository {
    #[instrument(skip(self, order), fields(order_id = %order.id))]
    async fn insert(&self, order: &Order) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        query(
            "INSERT INTO shop.orders \
             (id, customer_id, total_price, pickup_date, pickup_time, pickup_status, \
              payment_status, customer_comments, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(order.id)
        .bind(order.owner)
        .bind(order.total_price)
        .bind(order.pickup_date.date())
        .bind(order.pickup_time.map(|t| t.time()))
        .bind(order.pickup_status)
        .bind(order.payment_status)
        .bind(order.customer_comments.as_deref())
        .bind(order.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                RepositoryError::Conflict(format!("order {} already exists", order.id))
            }
            other => RepositoryError::Database(other),
        })?;

        Self::insert_items(&mut tx, order).await?;

        tx.commit().await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM shop.orders o WHERE o.id = $1");
        let row = query_as::<Postgres, OrderRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(self.hydrate(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    #[instrument(skip(self))]
    async fn find_page(
        &self,
        filter: &OrderFilter,
        page: PageRequest,
    ) -> Result<Vec<Order>, RepositoryError> {
        let sql = format!(
            "SELECT {ORDER_COLUMNS} FROM shop.orders o WHERE {FILTER_PREDICATE} \
             ORDER BY o.created_at DESC, o.id DESC LIMIT $5 OFFSET $6"
        );
        let rows = bind_filter!(query_as::<Postgres, OrderRow>(&sql), filter)
            .bind(to_sql_int(page.limit, "limit")?)
            .bind(to_sql_int(page.offset, "offset")?)
            .fetch_all(&self.pool)
            .await?;

        self.hydrate(rows).await
    }

    #[instrument(skip(self))]
    async fn count(&self, filter: &OrderFilter) -> Result<u64, RepositoryError> {
        let sql = format!("SELECT COUNT(*) FROM shop.orders o WHERE {FILTER_PREDICATE}");
        let count: i64 = bind_filter!(query_scalar(&sql), filter)
            .fetch_one(&self.pool)
            .await?;
        to_count(count, "count")
    }

    #[instrument(skip(self))]
    async fn status_counts(&self, filter: &OrderFilter) -> Result<StatusCounts, RepositoryError> {
        let sql = format!(
            "SELECT \
               COUNT(*) FILTER (WHERE o.pickup_status = 'pending') AS pending, \
               COUNT(*) FILTER (WHERE o.pickup_status = 'processing') AS processing, \
               COUNT(*) FILTER (WHERE o.pickup_status = 'ready') AS ready, \
               COUNT(*) FILTER (WHERE o.pickup_status = 'completed') AS completed, \
               COUNT(*) FILTER (WHERE o.pickup_status = 'cancelled') AS cancelled \
             FROM shop.orders o WHERE {FILTER_PREDICATE}"
        );
        let row = bind_filter!(query_as::<Postgres, StatusCountRow>(&sql), filter)
            .fetch_one(&self.pool)
            .await?;

        Ok(StatusCounts {
            pending: to_count(row.pending, "pending")?,
            processing: to_count(row.processing, "processing")?,
            ready: to_count(row.ready, "ready")?,
            completed: to_count(row.completed, "completed")?,
            cancelled: to_count(row.cancelled, "cancelled")?,
        })
    }

    #[instrument(skip(self))]
    async fn total_items(&self, filter: &OrderFilter) -> Result<u64, RepositoryError> {
        let sql = format!(
            "SELECT COALESCE(SUM(i.quantity), 0)::BIGINT \
             FROM shop.orders o JOIN shop.order_item i ON i.order_id = o.id \
             WHERE {FILTER_PREDICATE}"
        );
        let total: i64 = bind_filter!(query_scalar(&sql), filter)
            .fetch_one(&self.pool)
            .await?;
        to_count(total, "total_items")
    }

    #[instrument(skip(self))]
    async fn list_by_owner(&self, owner: UserId) -> Result<Vec<Order>, RepositoryError> {
        let sql = format!(
            "SELECT {ORDER_COLUMNS} FROM shop.orders o WHERE o.customer_id = $1 \
             ORDER BY o.created_at DESC, o.id DESC"
        );
        let rows = query_as::<Postgres, OrderRow>(&sql)
            .bind(owner)
            .fetch_all(&self.pool)
            .await?;

        self.hydrate(rows).await
    }

    #[instrument(skip(self))]
    async fn set_pickup_status(
        &self,
        id: OrderId,
        status: PickupStatus,
    ) -> Result<Option<Order>, RepositoryError> {
        self.update_status("pickup_status", id, status).await
    }

    #[instrument(skip(self))]
    async fn set_payment_status(
        &self,
        id: OrderId,
        status: PaymentStatus,
    ) -> Result<Option<Order>, RepositoryError> {
        self.update_status("payment_status", id, status).await
    }
}
