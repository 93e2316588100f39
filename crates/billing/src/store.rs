//! Account and subscription ledger storage
//!
//! The hosted relational store carries two tables this subsystem writes:
//! `profiles` (account row with `is_active` + `expiration_date`) and
//! `subscriptions` (the billing-history ledger keyed by account id).
//! Writes are idempotent per key so at-least-once webhook delivery never
//! duplicates rows; there is deliberately no cross-statement transaction
//! between the account update and the ledger upsert.

use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;

use crate::error::BillingResult;

/// Default plan for monthly subscriptions.
pub const DEFAULT_PLAN_ID: &str = "monthly";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerStatus {
    Active,
    Cancelled,
}

impl LedgerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerStatus::Active => "active",
            LedgerStatus::Cancelled => "cancelled",
        }
    }
}

/// One row of the subscription ledger, keyed by account id.
#[derive(Debug, Clone)]
pub struct LedgerEntry {
    pub account_id: String,
    pub status: LedgerStatus,
    pub provider_subscription_id: Option<String>,
    pub current_period_end: OffsetDateTime,
    pub plan_id: String,
}

/// Storage seam for account and ledger writes.
///
/// The production implementation talks to Postgres; tests substitute an
/// in-memory double so reconciliation logic runs without a database.
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Look up an existing account by email. The signup-path idempotency
    /// guard: redelivered notifications must never create a second
    /// account for one email.
    async fn find_account_by_email(&self, email: &str) -> BillingResult<Option<String>>;

    /// Current subscription expiration for an account, if any.
    async fn expiration_of(&self, account_id: &str) -> BillingResult<Option<OffsetDateTime>>;

    /// Mark the account active with a new expiration timestamp.
    async fn activate(&self, account_id: &str, expires_at: OffsetDateTime) -> BillingResult<()>;

    /// Mark the account inactive. Expiration is left untouched as a
    /// historical record.
    async fn deactivate(&self, account_id: &str) -> BillingResult<()>;

    /// Create or refresh the profile row for a newly provisioned account.
    async fn upsert_profile(&self, account_id: &str, name: &str, email: &str)
        -> BillingResult<()>;

    /// Create or update the ledger row for an account. Conflict key is
    /// the account id; a row may already exist from a prior cycle.
    async fn upsert_ledger(&self, entry: &LedgerEntry) -> BillingResult<()>;

    /// Mark the ledger row cancelled without touching period fields.
    async fn cancel_ledger(&self, account_id: &str) -> BillingResult<()>;
}

/// Postgres-backed store.
#[derive(Clone)]
pub struct PgAccountStore {
    pool: PgPool,
}

impl PgAccountStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AccountStore for PgAccountStore {
    async fn find_account_by_email(&self, email: &str) -> BillingResult<Option<String>> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT id FROM profiles WHERE lower(email) = lower($1)")
                .bind(email)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(|(id,)| id))
    }

    async fn expiration_of(&self, account_id: &str) -> BillingResult<Option<OffsetDateTime>> {
        let row: Option<(Option<OffsetDateTime>,)> =
            sqlx::query_as("SELECT expiration_date FROM profiles WHERE id = $1")
                .bind(account_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.and_then(|(expiration,)| expiration))
    }

    async fn activate(&self, account_id: &str, expires_at: OffsetDateTime) -> BillingResult<()> {
        sqlx::query(
            r#"
            UPDATE profiles
            SET is_active = TRUE, expiration_date = $2, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(account_id)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn deactivate(&self, account_id: &str) -> BillingResult<()> {
        sqlx::query(
            r#"
            UPDATE profiles
            SET is_active = FALSE, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(account_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn upsert_profile(
        &self,
        account_id: &str,
        name: &str,
        email: &str,
    ) -> BillingResult<()> {
        sqlx::query(
            r#"
            INSERT INTO profiles (id, full_name, email, is_active, created_at, updated_at)
            VALUES ($1, $2, $3, FALSE, NOW(), NOW())
            ON CONFLICT (id) DO UPDATE SET
                full_name = EXCLUDED.full_name,
                email = EXCLUDED.email,
                updated_at = NOW()
            "#,
        )
        .bind(account_id)
        .bind(name)
        .bind(email)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn upsert_ledger(&self, entry: &LedgerEntry) -> BillingResult<()> {
        sqlx::query(
            r#"
            INSERT INTO subscriptions (
                account_id, status, provider_subscription_id,
                current_period_end, plan_id, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, NOW(), NOW())
            ON CONFLICT (account_id) DO UPDATE SET
                status = EXCLUDED.status,
                provider_subscription_id = COALESCE(
                    EXCLUDED.provider_subscription_id,
                    subscriptions.provider_subscription_id
                ),
                current_period_end = EXCLUDED.current_period_end,
                plan_id = EXCLUDED.plan_id,
                updated_at = NOW()
            "#,
        )
        .bind(&entry.account_id)
        .bind(entry.status.as_str())
        .bind(entry.provider_subscription_id.as_ref())
        .bind(entry.current_period_end)
        .bind(&entry.plan_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn cancel_ledger(&self, account_id: &str) -> BillingResult<()> {
        sqlx::query(
            r#"
            UPDATE subscriptions
            SET status = 'cancelled', updated_at = NOW()
            WHERE account_id = $1
            "#,
        )
        .bind(account_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
