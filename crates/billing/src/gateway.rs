//! Payment gateway client
//!
//! Fetches authoritative payment status from the provider's read API.
//! The inbound webhook body is never trusted for status: a spoofed
//! callback can only make us re-query a real payment.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tokio_retry::strategy::FixedInterval;
use tokio_retry::RetryIf;

use crate::error::{BillingError, BillingResult};

/// Authoritative payment status as reported by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Approved,
    Pending,
    InProcess,
    InMediation,
    Authorized,
    Rejected,
    Cancelled,
    Refunded,
    ChargedBack,
    #[serde(other)]
    Unknown,
}

impl PaymentStatus {
    /// Statuses that revoke an active subscription.
    pub fn is_revocation(&self) -> bool {
        matches!(
            self,
            PaymentStatus::Cancelled | PaymentStatus::Refunded | PaymentStatus::ChargedBack
        )
    }
}

/// Payment details fetched from the provider for a given payment id.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentRecord {
    pub status: PaymentStatus,
    #[serde(default)]
    pub external_reference: Option<String>,
    #[serde(default, alias = "subscription_id", alias = "preapproval_id")]
    pub provider_subscription_id: Option<String>,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn fetch_payment(&self, payment_id: &str) -> BillingResult<PaymentRecord>;
}

/// Configuration for the HTTP gateway adapter.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub base_url: String,
    pub access_token: String,
}

impl GatewayConfig {
    pub fn from_env() -> BillingResult<Self> {
        let access_token = std::env::var("PAYMENT_ACCESS_TOKEN").map_err(|_| {
            BillingError::Config("PAYMENT_ACCESS_TOKEN not configured".to_string())
        })?;

        let base_url = std::env::var("PAYMENT_API_BASE")
            .unwrap_or_else(|_| "https://api.mercadopago.com".to_string());

        Ok(Self {
            base_url,
            access_token,
        })
    }
}

/// HTTP adapter for the payment provider's read API.
pub struct HttpPaymentGateway {
    client: reqwest::Client,
    config: GatewayConfig,
}

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

impl HttpPaymentGateway {
    pub fn new(config: GatewayConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    pub fn from_env() -> BillingResult<Self> {
        Ok(Self::new(GatewayConfig::from_env()?))
    }

    async fn request_once(&self, payment_id: &str) -> BillingResult<PaymentRecord> {
        let url = format!(
            "{}/v1/payments/{}",
            self.config.base_url.trim_end_matches('/'),
            payment_id
        );

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.config.access_token)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|e| BillingError::GatewayUnavailable(e.to_string()))?;

        let status = response.status();
        if status.is_server_error() {
            return Err(BillingError::GatewayUnavailable(format!(
                "provider returned {} for payment {}",
                status, payment_id
            )));
        }
        if !status.is_success() {
            return Err(BillingError::Gateway(format!(
                "provider returned {} for payment {}",
                status, payment_id
            )));
        }

        response
            .json::<PaymentRecord>()
            .await
            .map_err(|e| BillingError::Gateway(format!("invalid payment payload: {}", e)))
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    /// Fetch payment status with a single retry for transport/5xx
    /// failures. The GET is idempotent; mutating calls are never retried.
    async fn fetch_payment(&self, payment_id: &str) -> BillingResult<PaymentRecord> {
        let strategy = FixedInterval::from_millis(500).take(1);

        RetryIf::start(
            strategy,
            || self.request_once(payment_id),
            BillingError::is_retryable,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn deserializes_known_statuses() {
        let record: PaymentRecord = serde_json::from_str(
            r#"{ "status": "approved", "external_reference": "acct-1" }"#,
        )
        .unwrap();
        assert_eq!(record.status, PaymentStatus::Approved);
        assert_eq!(record.external_reference.as_deref(), Some("acct-1"));
        assert!(record.provider_subscription_id.is_none());
    }

    #[test]
    fn unknown_status_maps_to_unknown() {
        let record: PaymentRecord =
            serde_json::from_str(r#"{ "status": "some_future_state" }"#).unwrap();
        assert_eq!(record.status, PaymentStatus::Unknown);
    }

    #[test]
    fn revocation_statuses() {
        assert!(PaymentStatus::Refunded.is_revocation());
        assert!(PaymentStatus::ChargedBack.is_revocation());
        assert!(PaymentStatus::Cancelled.is_revocation());
        assert!(!PaymentStatus::Approved.is_revocation());
        assert!(!PaymentStatus::Pending.is_revocation());
    }

    #[test]
    fn subscription_id_aliases_are_accepted() {
        let record: PaymentRecord = serde_json::from_str(
            r#"{ "status": "approved", "preapproval_id": "sub-9" }"#,
        )
        .unwrap();
        assert_eq!(record.provider_subscription_id.as_deref(), Some("sub-9"));
    }
}
