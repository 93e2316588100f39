//! Error types for the reconciliation core

use thiserror::Error;

pub type BillingResult<T> = Result<T, BillingError>;

#[derive(Debug, Error)]
pub enum BillingError {
    /// Missing or invalid server-side configuration. Not retryable;
    /// raised at construction time so operators notice at startup.
    #[error("configuration error: {0}")]
    Config(String),

    /// The payment provider rejected the status-fetch request (4xx or an
    /// unparseable body). Redelivery will not help by itself, but the
    /// endpoint still answers 500 so the provider retries later.
    #[error("payment gateway error: {0}")]
    Gateway(String),

    /// Transport failure or 5xx from the payment provider. Retried once
    /// in-process, then surfaced so the provider's own retries kick in.
    #[error("payment gateway unavailable: {0}")]
    GatewayUnavailable(String),

    #[error("webhook signature invalid")]
    SignatureInvalid,

    /// The external reference on a payment could not be decoded. The
    /// event is acknowledged but not acted on.
    #[error("malformed checkout reference: {0}")]
    MalformedReference(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("auth directory error: {0}")]
    AuthDirectory(String),

    #[error("email dispatch failed: {0}")]
    Email(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl BillingError {
    /// True for failures where an immediate identical retry can succeed.
    /// Only the idempotent payment status GET is ever retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, BillingError::GatewayUnavailable(_))
    }
}

impl From<sqlx::Error> for BillingError {
    fn from(e: sqlx::Error) -> Self {
        BillingError::Database(e.to_string())
    }
}
