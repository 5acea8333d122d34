//! Order route handlers.

use axum::{
    Json,
    extract::{Path, Query, State, rejection::QueryRejection},
    http::StatusCode,
};
use pickup_core::{OrderId, PaymentStatus, PickupStatus};
use serde::Deserialize;
use tracing::instrument;

use crate::error::{AppError, Result};
use crate::middleware::{AppJson, OptionalAuth, RequireAdmin, RequireAuth};
use crate::models::{CreateOrderRequest, Order, OrderDetail};
use crate::services::order_query::{ListOrdersParams, OrderListing};
use crate::services::orders::OrderError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct PickupStatusBody {
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentStatusBody {
    pub payment_status: Option<String>,
}

/// `POST /orders`
#[instrument(skip_all, fields(guest = principal.is_none()))]
pub async fn create(
    State(state): State<AppState>,
    OptionalAuth(principal): OptionalAuth,
    AppJson(request): AppJson<CreateOrderRequest>,
) -> Result<(StatusCode, Json<Order>)> {
    let order = state
        .orders()
        .create_order(principal.as_ref(), request)
        .await?;
    Ok((StatusCode::CREATED, Json(order)))
}

/// `GET /orders`
#[instrument(skip_all, fields(admin = %admin.id))]
pub async fn list(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    query: std::result::Result<Query<ListOrdersParams>, QueryRejection>,
) -> Result<Json<OrderListing>> {
    let Query(params) = query?;
    Ok(Json(state.order_query().list(&params).await?))
}

/// `GET /orders/myorders`
#[instrument(skip_all, fields(user_id = %principal.id))]
pub async fn mine(
    State(state): State<AppState>,
    RequireAuth(principal): RequireAuth,
) -> Result<Json<Vec<OrderDetail>>> {
    Ok(Json(state.orders().my_orders(principal.id).await?))
}

/// `PATCH /orders/{order_id}/pickup-status`
#[instrument(skip_all, fields(admin = %admin.id, order_id = %order_id))]
pub async fn update_pickup_status(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(order_id): Path<String>,
    AppJson(body): AppJson<PickupStatusBody>,
) -> Result<Json<Order>> {
    let id = parse_order_id(&order_id)?;
    let status: PickupStatus = parse_status(body.status.as_deref(), "status")?;
    Ok(Json(state.orders().update_pickup_status(id, status).await?))
}

/// `PATCH /orders/{order_id}/payment-status`
#[instrument(skip_all, fields(admin = %admin.id, order_id = %order_id))]
pub async fn update_payment_status(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(order_id): Path<String>,
    AppJson(body): AppJson<PaymentStatusBody>,
) -> Result<Json<Order>> {
    let id = parse_order_id(&order_id)?;
    let status: PaymentStatus = parse_status(body.payment_status.as_deref(), "paymentStatus")?;
    Ok(Json(state.orders().update_payment_status(id, status).await?))
}

/// An id that cannot name an order is reported as a missing order.
fn parse_order_id(raw: &str) -> Result<OrderId> {
    raw.parse().map_err(|_| OrderError::NotFound.into())
}

fn parse_status<T: std::str::FromStr>(raw: Option<&str>, field: &str) -> Result<T> {
    let raw = raw.ok_or_else(|| AppError::InvalidInput(format!("{field} is required")))?;
    raw.parse()
        .map_err(|_| AppError::InvalidInput(format!("Invalid {field}: {raw}")))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_status() {
        let status: PickupStatus = parse_status(Some("Ready"), "status").unwrap();
        assert_eq!(status, PickupStatus::Ready);

        let err = parse_status::<PickupStatus>(Some("Shipped"), "status").unwrap_err();
        assert_eq!(err.to_string(), "Invalid status: Shipped");

        let err = parse_status::<PaymentStatus>(None, "paymentStatus").unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_unparseable_id_is_not_found() {
        let err = parse_order_id("12345").unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        assert_eq!(err.to_string(), "Order not found");
    }
}
