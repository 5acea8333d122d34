//! Payment route handlers.

use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::HeaderMap,
};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::instrument;

use crate::error::Result;
use crate::middleware::AppJson;
use crate::services::checkout::CheckoutRedirect;
use crate::state::AppState;
use crate::stripe::SIGNATURE_HEADER;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutBody {
    pub order_id: Option<String>,
}

/// `POST /payment/create-checkout-session`
#[instrument(skip_all)]
pub async fn create_checkout_session(
    State(state): State<AppState>,
    AppJson(body): AppJson<CheckoutBody>,
) -> Result<Json<CheckoutRedirect>> {
    Ok(Json(
        state
            .checkout()
            .create_session(body.order_id.as_deref())
            .await?,
    ))
}

/// `POST /payment/webhook`
///
/// Takes the body as raw bytes; the signature covers the exact payload.
#[instrument(skip_all, fields(bytes = body.len()))]
pub async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());

    let outcome = state.webhooks().handle(&body, signature).await?;
    tracing::debug!(?outcome, "Webhook processed");

    Ok(Json(json!({ "received": true })))
}
