//! Customer management.
//!
//! ```bash
//! pickup-cli customer create -e sam@example.com -n "Sam" --admin
//! ```

use pickup_core::{Email, UserId};

use super::{CommandError, connect};

/// Create a customer and return its id.
///
/// # Errors
///
/// Returns an error if the email is invalid, already registered, or the
/// insert fails.
pub async fn create(email: &str, name: &str, admin: bool) -> Result<UserId, CommandError> {
    let email = Email::parse(email).map_err(|e| CommandError::InvalidArgument(e.to_string()))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(CommandError::InvalidArgument("name cannot be empty".to_owned()));
    }

    let pool = connect().await?;

    let existing: Option<UserId> =
        sqlx::query_scalar("SELECT id FROM shop.customer WHERE email = $1")
            .bind(&email)
            .fetch_optional(&pool)
            .await?;
    if existing.is_some() {
        return Err(CommandError::InvalidArgument(format!(
            "Customer already exists with email: {email}"
        )));
    }

    let id = UserId::generate();
    sqlx::query("INSERT INTO shop.customer (id, name, email, is_admin) VALUES ($1, $2, $3, $4)")
        .bind(id)
        .bind(name)
        .bind(&email)
        .bind(admin)
        .execute(&pool)
        .await?;

    tracing::info!(%id, %email, admin, "Customer created");
    Ok(id)
}
