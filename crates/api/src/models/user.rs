//! Principals and customer records.

use pickup_core::{Email, UserId};
use serde::{Deserialize, Serialize};

/// The authenticated caller of a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Principal {
    pub id: UserId,
    pub name: String,
    pub email: Option<Email>,
    #[serde(default)]
    pub is_admin: bool,
}

/// A customer record used to expand order owners for admin views.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Customer {
    pub id: UserId,
    pub name: String,
    pub email: Option<Email>,
}

/// Owner details embedded in admin order listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OwnerSummary {
    pub id: UserId,
    pub name: String,
    pub email: Option<Email>,
}

impl From<&Customer> for OwnerSummary {
    fn from(customer: &Customer) -> Self {
        Self {
            id: customer.id,
            name: customer.name.clone(),
            email: customer.email.clone(),
        }
    }
}
