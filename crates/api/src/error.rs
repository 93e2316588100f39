//! HTTP error mapping for the webhook surface
//!
//! Only two error classes ever reach the provider: signature failures
//! (401, rejected before processing) and status-fetch failures (500, so
//! the provider's retry mechanism redelivers). Everything else is logged
//! inside the billing crate and acknowledged with 200.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use oliver_billing::BillingError;
use serde_json::json;

pub struct ApiError(pub BillingError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self.0 {
            BillingError::SignatureInvalid => {
                (StatusCode::UNAUTHORIZED, "invalid signature".to_string())
            }
            BillingError::Gateway(m) | BillingError::GatewayUnavailable(m) => {
                (StatusCode::INTERNAL_SERVER_ERROR, m.clone())
            }
            other => (StatusCode::INTERNAL_SERVER_ERROR, other.to_string()),
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<BillingError> for ApiError {
    fn from(e: BillingError) -> Self {
        Self(e)
    }
}
