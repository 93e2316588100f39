//! Account provisioning for the signup path
//!
//! A first-time subscriber pays before any account exists. Once the
//! payment is approved we create the auth identity, the profile row, and
//! the first billing period, then send a welcome email with a one-time
//! credential-setup link.
//!
//! The email-idempotency guard is the critical correctness property here:
//! the payment provider redelivers notifications at least once, and a
//! redelivery must never create a second account for the same email.

use std::sync::Arc;
use time::OffsetDateTime;

use crate::auth::AuthDirectory;
use crate::email::{welcome_email, EmailSender};
use crate::error::BillingResult;
use crate::store::{AccountStore, LedgerEntry, LedgerStatus, DEFAULT_PLAN_ID};
use crate::subscriptions::add_billing_period;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProvisionOutcome {
    /// A new account was created and its first period opened.
    Created {
        account_id: String,
        expires_at: OffsetDateTime,
    },
    /// An account for this email already exists; nothing was created.
    /// Usually a redelivered notification, or a renewal misclassified as
    /// a signup by a stale reference.
    AlreadyExists { account_id: String },
}

pub struct ProvisioningService {
    store: Arc<dyn AccountStore>,
    auth: Arc<dyn AuthDirectory>,
    email: Arc<dyn EmailSender>,
}

impl ProvisioningService {
    pub fn new(
        store: Arc<dyn AccountStore>,
        auth: Arc<dyn AuthDirectory>,
        email: Arc<dyn EmailSender>,
    ) -> Self {
        Self { store, auth, email }
    }

    pub async fn provision(
        &self,
        name: &str,
        email: &str,
        provider_subscription_id: Option<&str>,
    ) -> BillingResult<ProvisionOutcome> {
        // Idempotency guard: the profile lookup catches the common case,
        // the auth lookup the window where the identity exists but the
        // profile write was lost.
        if let Some(account_id) = self.store.find_account_by_email(email).await? {
            tracing::warn!(
                email = %email,
                account_id = %account_id,
                "Signup notification for an existing account - skipping provisioning"
            );
            return Ok(ProvisionOutcome::AlreadyExists { account_id });
        }
        if let Some(account_id) = self.auth.find_user_by_email(email).await? {
            tracing::warn!(
                email = %email,
                account_id = %account_id,
                "Auth identity already exists for signup email - skipping provisioning"
            );
            return Ok(ProvisionOutcome::AlreadyExists { account_id });
        }

        let account_id = self.auth.create_user(email, name).await?;

        // Setup-link failure is non-fatal: the user can still reach the
        // account via the standard password-recovery flow.
        let setup_link = match self.auth.generate_setup_link(email).await {
            Ok(link) => Some(link),
            Err(e) => {
                tracing::warn!(
                    email = %email,
                    error = %e,
                    "Failed to generate credential-setup link, continuing without it"
                );
                None
            }
        };

        let expires_at = add_billing_period(OffsetDateTime::now_utc());

        self.store.upsert_profile(&account_id, name, email).await?;
        self.store.activate(&account_id, expires_at).await?;
        self.store
            .upsert_ledger(&LedgerEntry {
                account_id: account_id.clone(),
                status: LedgerStatus::Active,
                provider_subscription_id: provider_subscription_id.map(str::to_string),
                current_period_end: expires_at,
                plan_id: DEFAULT_PLAN_ID.to_string(),
            })
            .await?;

        // Payment is already captured; a lost email must not roll back
        // account creation.
        if let Err(e) = self
            .email
            .send(&welcome_email(email, name, setup_link.as_deref()))
            .await
        {
            tracing::error!(
                email = %email,
                account_id = %account_id,
                error = %e,
                "Failed to send welcome email"
            );
        }

        tracing::info!(
            email = %email,
            account_id = %account_id,
            expires_at = %expires_at,
            "New account provisioned from approved payment"
        );

        Ok(ProvisionOutcome::Created {
            account_id,
            expires_at,
        })
    }
}
