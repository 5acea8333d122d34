//! Bearer-token extractors.
//!
//! ```rust,ignore
//! async fn handler(RequireAdmin(admin): RequireAdmin) -> impl IntoResponse {
//!     format!("Hello, {}!", admin.name)
//! }
//! ```

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};

use crate::error::AppError;
use crate::models::Principal;
use crate::services::AuthError;
use crate::state::AppState;

/// Extract the token from `Authorization: Bearer <token>`.
///
/// `Ok(None)` means no credentials were sent at all.
fn bearer_token(parts: &Parts) -> Result<Option<&str>, AuthError> {
    let Some(value) = parts.headers.get(AUTHORIZATION) else {
        return Ok(None);
    };
    let value = value
        .to_str()
        .map_err(|_| AuthError::InvalidToken("non-ASCII authorization header".to_owned()))?;
    let token = value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(AuthError::MissingToken)?;
    Ok(Some(token))
}

fn authenticate(parts: &Parts, state: &AppState) -> Result<Option<Principal>, AuthError> {
    bearer_token(parts)?
        .map(|token| state.authenticator().authenticate(token))
        .transpose()
        .inspect_err(|e| tracing::debug!(error = ?e, "Bearer token rejected"))
}

/// Requires a valid bearer token.
pub struct RequireAuth(pub Principal);

impl FromRequestParts<AppState> for RequireAuth {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let principal = authenticate(parts, state)?.ok_or(AuthError::MissingToken)?;
        Ok(Self(principal))
    }
}

/// Requires a valid bearer token with the admin capability.
pub struct RequireAdmin(pub Principal);

impl FromRequestParts<AppState> for RequireAdmin {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let RequireAuth(principal) = RequireAuth::from_request_parts(parts, state).await?;
        if !principal.is_admin {
            tracing::warn!(user_id = %principal.id, "Non-admin attempted admin operation");
            return Err(AuthError::NotAdmin.into());
        }
        Ok(Self(principal))
    }
}

/// Identifies the caller when credentials are sent.
///
/// No `Authorization` header means a guest; a token that fails validation is
/// still rejected.
pub struct OptionalAuth(pub Option<Principal>);

impl FromRequestParts<AppState> for OptionalAuth {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        Ok(Self(authenticate(parts, state)?))
    }
}
