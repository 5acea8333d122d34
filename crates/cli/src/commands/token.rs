//! Bearer token issuance for local testing and service accounts.
//!
//! ```bash
//! pickup-cli token -u <customer-id> --hours 12
//! ```
//!
//! Signs with `PICKUP_JWT_SECRET`, the same key the API validates with.

use chrono::Duration;
use pickup_api::models::Principal;
use pickup_api::services::JwtAuthenticator;
use pickup_core::{Email, UserId};
use secrecy::SecretString;

use super::{CommandError, connect};

#[derive(sqlx::FromRow)]
struct CustomerRow {
    id: UserId,
    name: String,
    email: Option<Email>,
    is_admin: bool,
}

/// Print a token for an existing customer.
///
/// # Errors
///
/// Returns an error if the customer does not exist, the secret is missing, or
/// signing fails.
pub async fn issue(user: &str, hours: i64) -> Result<(), CommandError> {
    let id: UserId = user
        .parse()
        .map_err(|_| CommandError::InvalidArgument(format!("Invalid customer id: {user}")))?;
    if hours <= 0 {
        return Err(CommandError::InvalidArgument("hours must be positive".to_owned()));
    }

    let pool = connect().await?;
    let secret = std::env::var("PICKUP_JWT_SECRET")
        .map(SecretString::from)
        .map_err(|_| CommandError::MissingEnvVar("PICKUP_JWT_SECRET"))?;

    let customer = sqlx::query_as::<_, CustomerRow>(
        "SELECT id, name, email, is_admin FROM shop.customer WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(&pool)
    .await?
    .ok_or_else(|| CommandError::InvalidArgument(format!("No customer with id {id}")))?;

    let principal = Principal {
        id: customer.id,
        name: customer.name,
        email: customer.email,
        is_admin: customer.is_admin,
    };
    let token = JwtAuthenticator::new(&secret)
        .issue(&principal, Duration::hours(hours))
        .map_err(|e| CommandError::InvalidArgument(e.to_string()))?;

    tracing::info!(%id, admin = principal.is_admin, hours, "Token issued");
    #[allow(clippy::print_stdout)]
    {
        println!("{token}");
    }
    Ok(())
}
