//! Pickup orders.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use pickup_core::{
    OrderId, PaymentStatus, PickupDate, PickupStatus, PickupTime, Price, PriceError, ProductId,
    UserId,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::product::Product;
use super::user::{Customer, OwnerSummary};

/// One product/quantity/price triple, with the price snapshotted at order time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    pub product_ref: ProductId,
    pub quantity: u32,
    pub unit_price: Price,
}

impl LineItem {
    /// `unit_price × quantity`.
    ///
    /// # Errors
    ///
    /// Returns [`PriceError::Overflow`] if the subtotal exceeds [`Price::MAX`].
    pub fn subtotal(&self) -> Result<Price, PriceError> {
        self.unit_price.times(self.quantity)
    }
}

/// A persisted pickup order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: OrderId,
    pub owner: Option<UserId>,
    pub line_items: Vec<LineItem>,
    pub total_price: Price,
    pub pickup_date: PickupDate,
    pub pickup_time: Option<PickupTime>,
    pub pickup_status: PickupStatus,
    pub payment_status: PaymentStatus,
    pub created_at: DateTime<Utc>,
    pub customer_comments: Option<String>,
}

impl Order {
    /// Build a new order in its initial state.
    ///
    /// The total is always derived from the line items.
    ///
    /// # Errors
    ///
    /// Returns [`PriceError::Overflow`] if the total exceeds [`Price::MAX`].
    pub fn new(
        owner: Option<UserId>,
        line_items: Vec<LineItem>,
        pickup_date: PickupDate,
        pickup_time: Option<PickupTime>,
        customer_comments: Option<String>,
    ) -> Result<Self, PriceError> {
        let total_price = total_of(&line_items)?;
        Ok(Self {
            id: OrderId::generate(),
            owner,
            line_items,
            total_price,
            pickup_date,
            pickup_time,
            pickup_status: PickupStatus::Pending,
            payment_status: PaymentStatus::Pending,
            created_at: Utc::now(),
            customer_comments,
        })
    }

    /// Total number of units across all line items.
    #[must_use]
    pub fn item_count(&self) -> u64 {
        self.line_items.iter().map(|i| u64::from(i.quantity)).sum()
    }
}

/// Sum of line-item subtotals.
///
/// # Errors
///
/// Returns [`PriceError::Overflow`] if a subtotal or the total exceeds [`Price::MAX`].
pub fn total_of(line_items: &[LineItem]) -> Result<Price, PriceError> {
    line_items
        .iter()
        .try_fold(Price::ZERO, |total, item| total.checked_add(item.subtotal()?))
}

/// Order creation payload as sent by clients.
///
/// Fields are kept loose here and validated by the order service so every
/// problem surfaces as a 400 with a readable message.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    #[serde(default)]
    pub items: Vec<RequestedItem>,
    pub pickup_date: Option<String>,
    pub pickup_time: Option<String>,
    pub customer_comments: Option<String>,
}

/// A requested line item before validation.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestedItem {
    pub product_id: String,
    #[serde(default = "default_quantity")]
    pub quantity: i64,
    pub price: Decimal,
}

const fn default_quantity() -> i64 {
    1
}

/// A line item with its catalog product expanded for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItemDetail {
    pub product_ref: ProductId,
    pub product: Option<Product>,
    pub quantity: u32,
    pub unit_price: Price,
}

/// An order with owner and products expanded, as shown to admins and owners.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderDetail {
    pub id: OrderId,
    pub owner: Option<OwnerSummary>,
    pub line_items: Vec<LineItemDetail>,
    pub total_price: Price,
    pub pickup_date: PickupDate,
    pub pickup_time: Option<PickupTime>,
    pub pickup_status: PickupStatus,
    pub payment_status: PaymentStatus,
    pub created_at: DateTime<Utc>,
    pub customer_comments: Option<String>,
}

impl OrderDetail {
    /// Expand an order using pre-fetched owners and products.
    ///
    /// Owners or products missing from the maps are rendered as `null`.
    #[must_use]
    pub fn expand(
        order: Order,
        owners: &HashMap<UserId, Customer>,
        products: &HashMap<ProductId, Product>,
    ) -> Self {
        let owner = order
            .owner
            .and_then(|id| owners.get(&id))
            .map(OwnerSummary::from);
        let line_items = order
            .line_items
            .into_iter()
            .map(|item| LineItemDetail {
                product: products.get(&item.product_ref).cloned(),
                product_ref: item.product_ref,
                quantity: item.quantity,
                unit_price: item.unit_price,
            })
            .collect();

        Self {
            id: order.id,
            owner,
            line_items,
            total_price: order.total_price,
            pickup_date: order.pickup_date,
            pickup_time: order.pickup_time,
            pickup_status: order.pickup_status,
            payment_status: order.payment_status,
            created_at: order.created_at,
            customer_comments: order.customer_comments,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    fn item(quantity: u32, price: Decimal) -> LineItem {
        LineItem {
            product_ref: ProductId::generate(),
            quantity,
            unit_price: Price::new(price).unwrap(),
        }
    }

    fn pickup_date() -> PickupDate {
        PickupDate::parse("2025-06-01").unwrap()
    }

    #[test]
    fn test_new_order_totals_and_initial_state() {
        let order = Order::new(
            None,
            vec![item(2, dec!(5.00)), item(1, dec!(3.50))],
            pickup_date(),
            None,
            None,
        )
        .unwrap();

        assert_eq!(order.total_price.amount(), dec!(13.50));
        assert_eq!(order.pickup_status, PickupStatus::Pending);
        assert_eq!(order.payment_status, PaymentStatus::Pending);
        assert_eq!(order.item_count(), 3);
    }

    #[test]
    fn test_total_overflow_is_rejected() {
        let at_cap = item(1, Price::MAX.amount());
        let result = Order::new(
            None,
            vec![at_cap.clone(), item(1, dec!(0.01))],
            pickup_date(),
            None,
            None,
        );
        assert_eq!(result, Err(PriceError::Overflow));

        let large_quantity = item(u32::MAX, dec!(1000));
        assert_eq!(large_quantity.subtotal(), Err(PriceError::Overflow));
        assert_eq!(total_of(&[at_cap]), Ok(Price::MAX));
    }

    #[test]
    fn test_order_json_shape() {
        let order = Order::new(
            None,
            vec![item(2, dec!(5.00))],
            pickup_date(),
            Some(PickupTime::parse("10:30").unwrap()),
            Some("extra bag".to_owned()),
        )
        .unwrap();
        let json = serde_json::to_value(&order).unwrap();

        assert_eq!(json["owner"], serde_json::Value::Null);
        assert_eq!(json["totalPrice"], serde_json::json!(10.0));
        assert_eq!(json["pickupDate"], "2025-06-01");
        assert_eq!(json["pickupTime"], "10:30");
        assert_eq!(json["pickupStatus"], "Pending");
        assert_eq!(json["paymentStatus"], "Pending");
        assert_eq!(json["lineItems"][0]["quantity"], 2);
        assert!(json["lineItems"][0]["productRef"].is_string());
        assert_eq!(json["customerComments"], "extra bag");
    }

    #[test]
    fn test_request_defaults_quantity_to_one() {
        let request: CreateOrderRequest = serde_json::from_str(
            r#"{"items":[{"productId":"x","price":2.5}],"pickupDate":"2025-06-01"}"#,
        )
        .unwrap();
        assert_eq!(request.items[0].quantity, 1);
        assert_eq!(request.items[0].price, dec!(2.5));
    }

    #[test]
    fn test_expand_handles_missing_references() {
        let owner = UserId::generate();
        let order =
            Order::new(Some(owner), vec![item(1, dec!(1))], pickup_date(), None, None).unwrap();

        let detail = OrderDetail::expand(order, &HashMap::new(), &HashMap::new());
        assert!(detail.owner.is_none());
        assert!(detail.line_items[0].product.is_none());
    }
}
