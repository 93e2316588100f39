//! Application state

use oliver_billing::{BillingResult, WebhookHandler};
use sqlx::PgPool;
use std::sync::Arc;

use crate::config::Config;

/// Shared application state
///
/// All collaborators are constructed explicitly here and injected into
/// the webhook handler, so tests can substitute doubles for the gateway,
/// store, auth directory, and mailer.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Config,
    pub webhooks: Arc<WebhookHandler>,
}

impl AppState {
    pub fn new(pool: PgPool, config: Config) -> BillingResult<Self> {
        let webhooks = Arc::new(WebhookHandler::from_env(pool.clone())?);
        tracing::info!("Payment reconciliation handler initialized");

        Ok(Self {
            pool,
            config,
            webhooks,
        })
    }
}
