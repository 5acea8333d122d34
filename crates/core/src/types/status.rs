//! Status enums for orders.
//!
//! An order carries two independent states: where it is in the pickup
//! workflow and whether it has been paid. Both serialize using their
//! PascalCase variant names (`"Pending"`, `"Paid"`, ...).

use serde::{Deserialize, Serialize};

/// Error returned when parsing an unknown status name.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid {kind} status: {value}")]
pub struct ParseStatusError {
    /// Which status enum was being parsed.
    pub kind: &'static str,
    /// The rejected input.
    pub value: String,
}

/// Fulfillment-side state of a pickup order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "shop.pickup_status", rename_all = "snake_case")
)]
pub enum PickupStatus {
    #[default]
    Pending,
    Processing,
    Ready,
    Completed,
    Cancelled,
}

impl PickupStatus {
    /// Every variant, in dashboard order.
    pub const ALL: [Self; 5] = [
        Self::Pending,
        Self::Processing,
        Self::Ready,
        Self::Completed,
        Self::Cancelled,
    ];

    /// Canonical name used on the wire.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Processing => "Processing",
            Self::Ready => "Ready",
            Self::Completed => "Completed",
            Self::Cancelled => "Cancelled",
        }
    }
}

impl std::fmt::Display for PickupStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PickupStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| ParseStatusError {
                kind: "pickup",
                value: s.to_owned(),
            })
    }
}

/// Payment-side state of a pickup order.
///
/// `Pending -> Paid` is driven by the payment webhook. `Failed` is only ever
/// set by an admin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "shop.payment_status", rename_all = "snake_case")
)]
pub enum PaymentStatus {
    #[default]
    Pending,
    Paid,
    Failed,
}

impl PaymentStatus {
    /// Canonical name used on the wire.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Paid => "Paid",
            Self::Failed => "Failed",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PaymentStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(Self::Pending),
            "Paid" => Ok(Self::Paid),
            "Failed" => Ok(Self::Failed),
            _ => Err(ParseStatusError {
                kind: "payment",
                value: s.to_owned(),
            }),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_pending() {
        assert_eq!(PickupStatus::default(), PickupStatus::Pending);
        assert_eq!(PaymentStatus::default(), PaymentStatus::Pending);
    }

    #[test]
    fn test_pickup_status_parse_is_case_sensitive() {
        assert_eq!("Ready".parse::<PickupStatus>().unwrap(), PickupStatus::Ready);
        assert!("ready".parse::<PickupStatus>().is_err());
        assert!("Shipped".parse::<PickupStatus>().is_err());
    }

    #[test]
    fn test_wire_names_match_serde() {
        for status in PickupStatus::ALL {
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{status}\""));
        }
        let json = serde_json::to_string(&PaymentStatus::Paid).unwrap();
        assert_eq!(json, "\"Paid\"");
    }

    #[test]
    fn test_payment_status_parse_error_names_kind() {
        let err = "Refunded".parse::<PaymentStatus>().unwrap_err();
        assert_eq!(err.to_string(), "invalid payment status: Refunded");
    }
}
