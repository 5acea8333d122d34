//! Admin order listing with pagination and aggregates.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Days, NaiveDate, Utc};
use pickup_core::{DateBound, PickupStatus, ProductId, UserId};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::instrument;

use crate::db::{OrderFilter, OrderRepository, PageRequest, ProductLookup, RepositoryError, UserDirectory};
use crate::models::{Customer, OrderDetail, Product};

pub const DEFAULT_PAGE: u64 = 1;
pub const DEFAULT_LIMIT: u64 = 10;
pub const MAX_LIMIT: u64 = 100;

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("{0}")]
    InvalidInput(String),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Raw query-string parameters.
///
/// Kept as strings so that every malformed value produces the same 400 body.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListOrdersParams {
    pub page: Option<String>,
    pub limit: Option<String>,
    pub status: Option<String>,
    pub user_id: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub current_page: u64,
    pub total_pages: u64,
    pub limit: u64,
    pub page_size: u64,
    pub has_previous_page: bool,
    pub has_next_page: bool,
    pub previous_page: Option<u64>,
    pub next_page: Option<u64>,
    pub total_docs: u64,
}

impl Pagination {
    #[must_use]
    pub fn new(current_page: u64, limit: u64, page_size: u64, total_docs: u64) -> Self {
        let total_pages = total_docs.div_ceil(limit);
        let has_previous_page = current_page > 1;
        let has_next_page = current_page < total_pages;
        Self {
            current_page,
            total_pages,
            limit,
            page_size,
            has_previous_page,
            has_next_page,
            previous_page: has_previous_page.then(|| current_page - 1),
            next_page: has_next_page.then(|| current_page + 1),
            total_docs,
        }
    }
}

/// One page of orders plus aggregates over the whole filtered set.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderListing {
    pub orders: Vec<OrderDetail>,
    pub total_orders: u64,
    pub orders_pending: u64,
    pub orders_processing: u64,
    pub orders_ready: u64,
    pub orders_completed: u64,
    pub orders_cancelled: u64,
    pub total_items: u64,
    pub pagination: Pagination,
}

/// Parsed and validated listing parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ListQuery {
    page: u64,
    limit: u64,
    filter: OrderFilter,
}

#[derive(Clone)]
pub struct OrderQueryService {
    orders: Arc<dyn OrderRepository>,
    products: Arc<dyn ProductLookup>,
    users: Arc<dyn UserDirectory>,
}

impl OrderQueryService {
    #[must_use]
    pub fn new(
        orders: Arc<dyn OrderRepository>,
        products: Arc<dyn ProductLookup>,
        users: Arc<dyn UserDirectory>,
    ) -> Self {
        Self {
            orders,
            products,
            users,
        }
    }

    /// List orders for the admin dashboard.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::InvalidInput`] for malformed parameters and
    /// [`QueryError::Repository`] if any read fails.
    #[instrument(skip(self))]
    pub async fn list(&self, params: &ListOrdersParams) -> Result<OrderListing, QueryError> {
        let query = parse(params)?;
        let page = PageRequest {
            offset: (query.page - 1).saturating_mul(query.limit),
            limit: query.limit,
        };

        let (orders, total, counts, total_items) = tokio::try_join!(
            self.orders.find_page(&query.filter, page),
            self.orders.count(&query.filter),
            self.orders.status_counts(&query.filter),
            self.orders.total_items(&query.filter),
        )?;

        let mut owner_ids: Vec<UserId> = orders.iter().filter_map(|o| o.owner).collect();
        owner_ids.sort_unstable();
        owner_ids.dedup();
        let mut product_ids: Vec<ProductId> = orders
            .iter()
            .flat_map(|o| o.line_items.iter().map(|i| i.product_ref))
            .collect();
        product_ids.sort_unstable();
        product_ids.dedup();

        let (owners, products) = tokio::try_join!(
            self.users.find_many(&owner_ids),
            self.products.find_many(&product_ids),
        )?;
        let owners: HashMap<UserId, Customer> = owners.into_iter().map(|c| (c.id, c)).collect();
        let products: HashMap<ProductId, Product> =
            products.into_iter().map(|p| (p.id, p)).collect();

        let orders: Vec<OrderDetail> = orders
            .into_iter()
            .map(|o| OrderDetail::expand(o, &owners, &products))
            .collect();
        let page_size = u64::try_from(orders.len()).unwrap_or(u64::MAX);

        tracing::debug!(total, page = query.page, page_size, "Orders listed");

        Ok(OrderListing {
            orders,
            total_orders: total,
            orders_pending: counts.pending,
            orders_processing: counts.processing,
            orders_ready: counts.ready,
            orders_completed: counts.completed,
            orders_cancelled: counts.cancelled,
            total_items,
            pagination: Pagination::new(query.page, query.limit, page_size, total),
        })
    }
}

fn parse(params: &ListOrdersParams) -> Result<ListQuery, QueryError> {
    let page = positive(params.page.as_deref(), "page", DEFAULT_PAGE)?;
    let limit = positive(params.limit.as_deref(), "limit", DEFAULT_LIMIT)?;
    if limit > MAX_LIMIT {
        return Err(invalid(format!("limit must be at most {MAX_LIMIT}")));
    }

    let status = present(params.status.as_deref())
        .map(|s| {
            s.parse::<PickupStatus>()
                .map_err(|_| invalid(format!("Invalid status: {s}")))
        })
        .transpose()?;

    let owner = present(params.user_id.as_deref())
        .map(|s| {
            s.parse::<UserId>()
                .map_err(|_| invalid(format!("Invalid userId: {s}")))
        })
        .transpose()?;

    let start = date_bound(params.start_date.as_deref(), "startDate")?;
    let end = date_bound(params.end_date.as_deref(), "endDate")?;
    if let (Some(start), Some(end)) = (start, end)
        && start > end
    {
        return Err(invalid("startDate must not be after endDate"));
    }

    // The end date names a whole day, so the bound is the following midnight.
    let created_before = end
        .map(|d| {
            d.checked_add_days(Days::new(1))
                .ok_or_else(|| invalid("endDate is out of range"))
        })
        .transpose()?;

    Ok(ListQuery {
        page,
        limit,
        filter: OrderFilter {
            status,
            owner,
            created_from: start.map(midnight_utc),
            created_before: created_before.map(midnight_utc),
        },
    })
}

fn present(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

fn positive(value: Option<&str>, name: &str, default: u64) -> Result<u64, QueryError> {
    match present(value) {
        None => Ok(default),
        Some(raw) => raw
            .parse::<u64>()
            .ok()
            .filter(|n| *n >= 1)
            .ok_or_else(|| invalid(format!("{name} must be a positive integer"))),
    }
}

fn date_bound(value: Option<&str>, name: &str) -> Result<Option<NaiveDate>, QueryError> {
    present(value)
        .map(|raw| {
            DateBound::parse(raw)
                .map(|bound| bound.date())
                .map_err(|_| invalid(format!("{name} must be in YYYY-MM-DD format")))
        })
        .transpose()
}

fn midnight_utc(date: NaiveDate) -> chrono::DateTime<Utc> {
    date.and_time(chrono::NaiveTime::MIN).and_utc()
}

fn invalid(message: impl Into<String>) -> QueryError {
    QueryError::InvalidInput(message.into())
}
