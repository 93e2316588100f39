//! HTTP routes

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

use crate::error::ApiError;
use crate::state::AppState;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        // The provider posts to the root path; the named route exists for
        // explicit configuration.
        .route("/", post(payment_webhook))
        .route("/webhooks/payments", post(payment_webhook))
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Response {
    let database = match sqlx::query("SELECT 1").execute(&state.pool).await {
        Ok(_) => "ok",
        Err(e) => {
            tracing::error!(error = %e, "Health check database probe failed");
            "unavailable"
        }
    };

    let (status, overall) = if database == "ok" {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };

    (status, Json(json!({ "status": overall, "database": database }))).into_response()
}

/// Payment provider callback endpoint.
///
/// Answers 200 once the event is classified, even when side effects
/// partially fail, to stop the provider's retry storm. Signature
/// failures reject with 401 before any processing; status-fetch
/// failures answer 500 so the provider redelivers.
async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Response {
    let signature = headers.get("x-signature").and_then(|v| v.to_str().ok());
    if let Err(e) = state.webhooks.verify_signature(&body, signature) {
        tracing::warn!("Rejecting webhook with invalid signature");
        return ApiError(e).into_response();
    }

    let parsed: Value = match serde_json::from_str(&body) {
        Ok(value) => value,
        Err(e) => {
            // Malformed bodies are acknowledged so the provider does not
            // redeliver something we will never be able to parse.
            tracing::info!(error = %e, "Acknowledging unparseable webhook body");
            return (StatusCode::OK, Json(json!({ "received": true }))).into_response();
        }
    };

    match state.webhooks.handle(&parsed).await {
        Ok(outcome) => {
            tracing::debug!(outcome = ?outcome, "Webhook acknowledged");
            (StatusCode::OK, Json(json!({ "received": true }))).into_response()
        }
        Err(e) => {
            tracing::error!(error = %e, "Webhook processing failed before classification");
            ApiError(e).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::config::Config;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use oliver_billing::{
        AccountStore, AuthDirectory, BillingError, BillingResult, EmailSender, LedgerEntry,
        OutboundEmail, PaymentGateway, PaymentRecord, PaymentStatus, WebhookHandler,
    };
    use sqlx::PgPool;
    use std::sync::Arc;
    use time::OffsetDateTime;
    use tower::ServiceExt;

    /// What the scripted gateway answers for any payment id.
    enum GatewayScript {
        Approved(&'static str),
        Unavailable,
        /// Classification should finish before the gateway is consulted;
        /// reaching it turns the response into a 500 and fails the test.
        Unreachable,
    }

    struct ScriptedGateway(GatewayScript);

    #[async_trait]
    impl PaymentGateway for ScriptedGateway {
        async fn fetch_payment(&self, _payment_id: &str) -> BillingResult<PaymentRecord> {
            match self.0 {
                GatewayScript::Approved(reference) => Ok(PaymentRecord {
                    status: PaymentStatus::Approved,
                    external_reference: Some(reference.to_string()),
                    provider_subscription_id: None,
                }),
                GatewayScript::Unavailable => {
                    Err(BillingError::GatewayUnavailable("provider down".to_string()))
                }
                GatewayScript::Unreachable => Err(BillingError::Internal(
                    "gateway consulted unexpectedly".to_string(),
                )),
            }
        }
    }

    struct OkStore;

    #[async_trait]
    impl AccountStore for OkStore {
        async fn find_account_by_email(&self, _email: &str) -> BillingResult<Option<String>> {
            Ok(None)
        }
        async fn expiration_of(
            &self,
            _account_id: &str,
        ) -> BillingResult<Option<OffsetDateTime>> {
            Ok(None)
        }
        async fn activate(
            &self,
            _account_id: &str,
            _expires_at: OffsetDateTime,
        ) -> BillingResult<()> {
            Ok(())
        }
        async fn deactivate(&self, _account_id: &str) -> BillingResult<()> {
            Ok(())
        }
        async fn upsert_profile(
            &self,
            _account_id: &str,
            _name: &str,
            _email: &str,
        ) -> BillingResult<()> {
            Ok(())
        }
        async fn upsert_ledger(&self, _entry: &LedgerEntry) -> BillingResult<()> {
            Ok(())
        }
        async fn cancel_ledger(&self, _account_id: &str) -> BillingResult<()> {
            Ok(())
        }
    }

    struct NoopAuth;

    #[async_trait]
    impl AuthDirectory for NoopAuth {
        async fn find_user_by_email(&self, _email: &str) -> BillingResult<Option<String>> {
            Ok(None)
        }
        async fn create_user(&self, _email: &str, _name: &str) -> BillingResult<String> {
            Ok("user-1".to_string())
        }
        async fn generate_setup_link(&self, _email: &str) -> BillingResult<String> {
            Ok("https://example.com/setup".to_string())
        }
    }

    struct NoopMailer;

    #[async_trait]
    impl EmailSender for NoopMailer {
        async fn send(&self, _email: &OutboundEmail) -> BillingResult<()> {
            Ok(())
        }
    }

    fn app(script: GatewayScript, webhook_secret: Option<&str>) -> Router {
        let handler = WebhookHandler::new(
            Arc::new(ScriptedGateway(script)),
            Arc::new(OkStore),
            Arc::new(NoopAuth),
            Arc::new(NoopMailer),
            webhook_secret.map(str::to_string),
        );
        // Lazy pool: never connected, the webhook routes do not touch it.
        let pool = PgPool::connect_lazy("postgres://postgres@localhost/unused").unwrap();
        let state = AppState {
            pool,
            config: Config {
                database_url: "postgres://postgres@localhost/unused".to_string(),
                bind_address: "127.0.0.1:0".to_string(),
            },
            webhooks: Arc::new(handler),
        };
        create_router(state)
    }

    fn post_webhook(body: &str, signature: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/webhooks/payments")
            .header("content-type", "application/json");
        if let Some(sig) = signature {
            builder = builder.header("x-signature", sig);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn missing_signature_is_rejected_with_401() {
        let app = app(GatewayScript::Unreachable, Some("whsec_test"));
        let body = r#"{"type":"payment","data":{"id":"1"}}"#;

        let response = app.oneshot(post_webhook(body, None)).await.unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let json = body_json(response).await;
        assert_eq!(json["error"], "invalid signature");
    }

    #[tokio::test]
    async fn gateway_failure_maps_to_500_with_error_body() {
        let app = app(GatewayScript::Unavailable, None);
        let body = r#"{"type":"payment","data":{"id":"1"}}"#;

        let response = app.oneshot(post_webhook(body, None)).await.unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = body_json(response).await;
        assert!(json["error"].as_str().unwrap().contains("provider down"));
    }

    #[tokio::test]
    async fn classified_event_is_acknowledged_with_200() {
        let app = app(GatewayScript::Approved("acct-1"), None);
        let body = r#"{"type":"payment","data":{"id":"1"}}"#;

        let response = app.oneshot(post_webhook(body, None)).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["received"], true);
    }

    #[tokio::test]
    async fn unparseable_body_is_acknowledged_without_processing() {
        // The Unreachable gateway turns any fetch into a 500, so the 200
        // here proves classification stopped before the gateway.
        let app = app(GatewayScript::Unreachable, None);

        let response = app.oneshot(post_webhook("not json", None)).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["received"], true);
    }

    #[tokio::test]
    async fn non_payment_event_is_acknowledged_without_processing() {
        let app = app(GatewayScript::Unreachable, None);

        let response = app
            .oneshot(post_webhook(r#"{"type":"test"}"#, None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["received"], true);
    }
}
