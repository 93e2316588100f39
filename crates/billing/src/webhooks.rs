//! Payment webhook handling
//!
//! Entry point of the reconciliation flow. A verified notification is
//! classified, the payment's authoritative status is fetched from the
//! provider, and the event is dispatched to the renewal or signup path.
//!
//! Acknowledgement policy: once an event has been classified the caller
//! answers 200 even if side effects partially fail (otherwise the
//! provider retries forever); errors are logged instead. The two
//! exceptions are signature failures (rejected before any processing)
//! and status-fetch failures (propagated so the provider redelivers).

use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;
use sqlx::PgPool;
use std::sync::Arc;
use subtle::ConstantTimeEq;

use crate::auth::{AuthDirectory, HttpAuthDirectory};
use crate::email::{EmailSender, HttpEmailSender};
use crate::error::{BillingError, BillingResult};
use crate::events::PaymentEvent;
use crate::gateway::{HttpPaymentGateway, PaymentGateway, PaymentRecord};
use crate::provisioning::ProvisioningService;
use crate::reference::CheckoutReference;
use crate::store::{AccountStore, PgAccountStore};
use crate::subscriptions::SubscriptionService;

type HmacSha256 = Hmac<Sha256>;

/// Signature timestamps older than this are rejected.
const SIGNATURE_TOLERANCE_SECS: i64 = 300;

/// How a notification was resolved, for the HTTP layer's response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// Payment event classified and dispatched (side effects may still
    /// have failed; those are logged, not surfaced).
    Received,
    /// Non-payment or unrecognized notification; acknowledged, no writes.
    Ignored,
}

pub struct WebhookHandler {
    gateway: Arc<dyn PaymentGateway>,
    subscriptions: SubscriptionService,
    provisioning: ProvisioningService,
    webhook_secret: Option<String>,
}

impl WebhookHandler {
    pub fn new(
        gateway: Arc<dyn PaymentGateway>,
        store: Arc<dyn AccountStore>,
        auth: Arc<dyn AuthDirectory>,
        email: Arc<dyn EmailSender>,
        webhook_secret: Option<String>,
    ) -> Self {
        Self {
            gateway,
            subscriptions: SubscriptionService::new(store.clone()),
            provisioning: ProvisioningService::new(store, auth, email),
            webhook_secret,
        }
    }

    /// Build a handler with the production HTTP adapters, configured from
    /// the environment.
    pub fn from_env(pool: PgPool) -> BillingResult<Self> {
        let gateway = HttpPaymentGateway::from_env()?;
        let auth = HttpAuthDirectory::from_env()?;
        let email = HttpEmailSender::from_env();
        if !email.is_enabled() {
            tracing::warn!("Welcome emails disabled (missing RESEND_API_KEY)");
        }

        let webhook_secret = std::env::var("PAYMENT_WEBHOOK_SECRET")
            .ok()
            .filter(|s| !s.is_empty());
        if webhook_secret.is_none() {
            tracing::warn!(
                "PAYMENT_WEBHOOK_SECRET not configured - webhook signatures will not be verified"
            );
        }

        Ok(Self::new(
            Arc::new(gateway),
            Arc::new(PgAccountStore::new(pool)),
            Arc::new(auth),
            Arc::new(email),
            webhook_secret,
        ))
    }

    /// Verify the `x-signature` header against the raw payload.
    ///
    /// Header format is `ts=<unix>,v1=<hex hmac-sha256>` where the signed
    /// content is `"{ts}.{payload}"`. Verification only runs when a
    /// signing secret is configured; failures reject the request before
    /// any processing.
    pub fn verify_signature(
        &self,
        payload: &str,
        signature_header: Option<&str>,
    ) -> BillingResult<()> {
        let secret = match &self.webhook_secret {
            Some(secret) => secret,
            None => return Ok(()),
        };

        let header = signature_header.ok_or(BillingError::SignatureInvalid)?;

        let mut timestamp: Option<i64> = None;
        let mut v1_signature: Option<&str> = None;
        for part in header.split(',') {
            match part.trim().split_once('=') {
                Some(("ts", value)) => timestamp = value.parse().ok(),
                Some(("v1", value)) => v1_signature = Some(value),
                _ => {}
            }
        }

        let timestamp = timestamp.ok_or(BillingError::SignatureInvalid)?;
        let v1_signature = v1_signature.ok_or(BillingError::SignatureInvalid)?;

        let now = time::OffsetDateTime::now_utc().unix_timestamp();
        if (now - timestamp).abs() > SIGNATURE_TOLERANCE_SECS {
            tracing::warn!(
                timestamp = timestamp,
                now = now,
                "Webhook signature timestamp outside tolerance"
            );
            return Err(BillingError::SignatureInvalid);
        }

        let provided = hex::decode(v1_signature).map_err(|_| BillingError::SignatureInvalid)?;

        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|_| BillingError::SignatureInvalid)?;
        mac.update(format!("{}.{}", timestamp, payload).as_bytes());
        let computed = mac.finalize().into_bytes();

        if computed.ct_eq(provided.as_slice()).into() {
            Ok(())
        } else {
            tracing::warn!("Webhook signature mismatch");
            Err(BillingError::SignatureInvalid)
        }
    }

    /// Classify a notification body and reconcile the referenced payment.
    ///
    /// Errors returned from here are the ones the endpoint surfaces as
    /// HTTP 5xx (status-fetch failures); everything downstream of
    /// classification is logged and swallowed.
    pub async fn handle(&self, body: &Value) -> BillingResult<WebhookOutcome> {
        let payment_id = match PaymentEvent::parse(body) {
            PaymentEvent::Payment { payment_id } => payment_id,
            PaymentEvent::Ignored { kind } => {
                tracing::info!(kind = ?kind, "Ignoring non-payment notification");
                return Ok(WebhookOutcome::Ignored);
            }
        };

        // Always re-fetch: the notification body only proves "something
        // happened to payment X".
        let payment = self.gateway.fetch_payment(&payment_id).await?;

        tracing::info!(
            payment_id = %payment_id,
            status = ?payment.status,
            "Processing payment notification"
        );

        if payment.status == crate::gateway::PaymentStatus::Approved {
            self.apply_approved(&payment_id, &payment).await;
        } else if payment.status.is_revocation() {
            self.apply_revocation(&payment_id, &payment).await;
        } else {
            tracing::info!(
                payment_id = %payment_id,
                status = ?payment.status,
                "Payment status requires no action"
            );
        }

        Ok(WebhookOutcome::Received)
    }

    async fn apply_approved(&self, payment_id: &str, payment: &PaymentRecord) {
        let raw_reference = match payment.external_reference.as_deref() {
            Some(raw) => raw,
            None => {
                tracing::warn!(
                    payment_id = %payment_id,
                    "Approved payment has no external reference - cannot reconcile"
                );
                return;
            }
        };

        match CheckoutReference::decode(raw_reference) {
            Ok(CheckoutReference::Renewal { account_id }) => {
                match self
                    .subscriptions
                    .extend(&account_id, payment.provider_subscription_id.as_deref())
                    .await
                {
                    Ok(new_expiration) => {
                        tracing::info!(
                            payment_id = %payment_id,
                            account_id = %account_id,
                            new_expiration = %new_expiration,
                            "Renewal reconciled"
                        );
                    }
                    Err(e) => {
                        tracing::error!(
                            payment_id = %payment_id,
                            account_id = %account_id,
                            error = %e,
                            "Failed to extend subscription for approved renewal"
                        );
                    }
                }
            }
            Ok(CheckoutReference::Signup { name, email }) => {
                if let Err(e) = self
                    .provisioning
                    .provision(&name, &email, payment.provider_subscription_id.as_deref())
                    .await
                {
                    tracing::error!(
                        payment_id = %payment_id,
                        email = %email,
                        error = %e,
                        "Failed to provision account for approved signup"
                    );
                }
            }
            Err(e) => {
                tracing::warn!(
                    payment_id = %payment_id,
                    error = %e,
                    "Could not decode external reference on approved payment"
                );
            }
        }
    }

    async fn apply_revocation(&self, payment_id: &str, payment: &PaymentRecord) {
        let raw_reference = match payment.external_reference.as_deref() {
            Some(raw) => raw,
            None => {
                tracing::warn!(
                    payment_id = %payment_id,
                    status = ?payment.status,
                    "Revoked payment has no external reference - cannot reconcile"
                );
                return;
            }
        };

        match CheckoutReference::decode(raw_reference) {
            Ok(CheckoutReference::Renewal { account_id }) => {
                if let Err(e) = self.subscriptions.cancel(&account_id).await {
                    tracing::error!(
                        payment_id = %payment_id,
                        account_id = %account_id,
                        error = %e,
                        "Failed to deactivate account on revoked payment"
                    );
                }
            }
            Ok(CheckoutReference::Signup { email, .. }) => {
                // No account exists yet for a revoked signup payment.
                tracing::info!(
                    payment_id = %payment_id,
                    email = %email,
                    status = ?payment.status,
                    "Revocation for a signup reference is not actionable - skipping"
                );
            }
            Err(e) => {
                tracing::warn!(
                    payment_id = %payment_id,
                    error = %e,
                    "Could not decode external reference on revoked payment"
                );
            }
        }
    }
}

#[cfg(test)]
mod signature_tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::auth::AuthDirectory;
    use crate::email::{EmailSender, OutboundEmail};
    use crate::gateway::PaymentGateway;
    use crate::store::{AccountStore, LedgerEntry};
    use async_trait::async_trait;
    use time::OffsetDateTime;

    struct NoopGateway;

    #[async_trait]
    impl PaymentGateway for NoopGateway {
        async fn fetch_payment(&self, _payment_id: &str) -> BillingResult<PaymentRecord> {
            Err(BillingError::Internal("not under test".to_string()))
        }
    }

    struct NoopStore;

    #[async_trait]
    impl AccountStore for NoopStore {
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

    fn handler_with_secret(secret: Option<&str>) -> WebhookHandler {
        WebhookHandler::new(
            Arc::new(NoopGateway),
            Arc::new(NoopStore),
            Arc::new(NoopAuth),
            Arc::new(NoopMailer),
            secret.map(str::to_string),
        )
    }

    fn sign(secret: &str, timestamp: i64, payload: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(format!("{}.{}", timestamp, payload).as_bytes());
        format!("ts={},v1={}", timestamp, hex::encode(mac.finalize().into_bytes()))
    }

    #[test]
    fn valid_signature_passes() {
        let handler = handler_with_secret(Some("whsec_test"));
        let payload = r#"{"type":"payment","data":{"id":"1"}}"#;
        let now = time::OffsetDateTime::now_utc().unix_timestamp();
        let header = sign("whsec_test", now, payload);

        assert!(handler.verify_signature(payload, Some(&header)).is_ok());
    }

    #[test]
    fn tampered_payload_is_rejected() {
        let handler = handler_with_secret(Some("whsec_test"));
        let now = time::OffsetDateTime::now_utc().unix_timestamp();
        let header = sign("whsec_test", now, r#"{"type":"payment"}"#);

        let result = handler.verify_signature(r#"{"type":"evil"}"#, Some(&header));
        assert!(matches!(result, Err(BillingError::SignatureInvalid)));
    }

    #[test]
    fn stale_timestamp_is_rejected() {
        let handler = handler_with_secret(Some("whsec_test"));
        let payload = "{}";
        let stale = time::OffsetDateTime::now_utc().unix_timestamp() - 3600;
        let header = sign("whsec_test", stale, payload);

        let result = handler.verify_signature(payload, Some(&header));
        assert!(matches!(result, Err(BillingError::SignatureInvalid)));
    }

    #[test]
    fn missing_header_is_rejected_when_secret_configured() {
        let handler = handler_with_secret(Some("whsec_test"));
        let result = handler.verify_signature("{}", None);
        assert!(matches!(result, Err(BillingError::SignatureInvalid)));
    }

    #[test]
    fn verification_skipped_without_secret() {
        let handler = handler_with_secret(None);
        assert!(handler.verify_signature("{}", None).is_ok());
        assert!(handler.verify_signature("{}", Some("garbage")).is_ok());
    }
}
