//! Subscription ledger updates
//!
//! Renewal path: extend the account's expiration by one billing period
//! from `max(now, current_expiration)`. The max keeps extension monotonic
//! in both directions - a renewal processed late never shrinks remaining
//! entitlement, and an already-expired account is credited from now, not
//! from its stale past expiration.

use std::sync::Arc;
use time::{Date, Duration, Month, OffsetDateTime};

use crate::error::BillingResult;
use crate::store::{AccountStore, LedgerEntry, LedgerStatus, DEFAULT_PLAN_ID};

/// Add one calendar month, clamping the day to the target month's length
/// (Jan 31 -> Feb 28, or Feb 29 in a leap year).
pub fn add_billing_period(from: OffsetDateTime) -> OffsetDateTime {
    let date = from.date();
    let mut year = date.year();
    let month = date.month().next();
    if month == Month::January {
        year += 1;
    }
    let day = date.day().min(month.length(year));

    match Date::from_calendar_date(year, month, day) {
        Ok(next) => from.replace_date(next),
        // Unreachable with a clamped day; fall back to a plain period.
        Err(_) => from + Duration::days(30),
    }
}

pub struct SubscriptionService {
    store: Arc<dyn AccountStore>,
}

impl SubscriptionService {
    pub fn new(store: Arc<dyn AccountStore>) -> Self {
        Self { store }
    }

    /// Apply an approved renewal: activate the account with the extended
    /// expiration and upsert the ledger row. The two writes are separate
    /// store calls; a partial failure is surfaced to the caller for
    /// logging and is healed by redelivery or manual reconciliation.
    pub async fn extend(
        &self,
        account_id: &str,
        provider_subscription_id: Option<&str>,
    ) -> BillingResult<OffsetDateTime> {
        let now = OffsetDateTime::now_utc();
        let current = self.store.expiration_of(account_id).await?;
        let base = current
            .filter(|expiration| *expiration > now)
            .unwrap_or(now);
        let new_expiration = add_billing_period(base);

        self.store.activate(account_id, new_expiration).await?;

        self.store
            .upsert_ledger(&LedgerEntry {
                account_id: account_id.to_string(),
                status: LedgerStatus::Active,
                provider_subscription_id: provider_subscription_id.map(str::to_string),
                current_period_end: new_expiration,
                plan_id: DEFAULT_PLAN_ID.to_string(),
            })
            .await?;

        tracing::info!(
            account_id = %account_id,
            previous_expiration = ?current,
            new_expiration = %new_expiration,
            "Subscription extended"
        );

        Ok(new_expiration)
    }

    /// Cancellation mirror for cancel/refund/chargeback events: the
    /// account stops being usable going forward, but the historical
    /// expiration stays as a record.
    pub async fn cancel(&self, account_id: &str) -> BillingResult<()> {
        self.store.deactivate(account_id).await?;
        self.store.cancel_ledger(account_id).await?;

        tracing::info!(account_id = %account_id, "Subscription cancelled");

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn adds_one_month_mid_month() {
        let from = datetime!(2026-03-15 10:30:00 UTC);
        assert_eq!(add_billing_period(from), datetime!(2026-04-15 10:30:00 UTC));
    }

    #[test]
    fn clamps_to_end_of_shorter_month() {
        let from = datetime!(2026-01-31 00:00:00 UTC);
        assert_eq!(add_billing_period(from), datetime!(2026-02-28 00:00:00 UTC));
    }

    #[test]
    fn clamps_to_leap_day_in_leap_year() {
        let from = datetime!(2028-01-31 00:00:00 UTC);
        assert_eq!(add_billing_period(from), datetime!(2028-02-29 00:00:00 UTC));
    }

    #[test]
    fn rolls_over_year_boundary() {
        let from = datetime!(2026-12-10 23:59:59 UTC);
        assert_eq!(add_billing_period(from), datetime!(2027-01-10 23:59:59 UTC));
    }

    #[test]
    fn preserves_time_of_day() {
        let from = datetime!(2026-06-01 04:05:06.789 UTC);
        let extended = add_billing_period(from);
        assert_eq!(extended.time(), from.time());
    }
}
