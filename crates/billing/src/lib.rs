#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Oliver Billing Module
//!
//! Subscription reconciliation for the Oliver repair-shop budgeting app:
//! turns asynchronous payment-provider notifications into account and
//! subscription state.
//!
//! ## Flow
//!
//! - **Webhooks**: classify inbound notifications (two historical shapes)
//! - **Gateway**: re-fetch authoritative payment status per event
//! - **Reference codec**: renewal (existing account) vs signup (new user)
//! - **Subscriptions**: monotonic one-month expiration extension, cancellation
//! - **Provisioning**: idempotent account creation for first-time subscribers
//! - **Email**: welcome email with a one-time credential-setup link

pub mod auth;
pub mod email;
pub mod error;
pub mod events;
pub mod gateway;
pub mod provisioning;
pub mod reference;
pub mod store;
pub mod subscriptions;
pub mod webhooks;


// Auth directory
pub use auth::{AuthConfig, AuthDirectory, HttpAuthDirectory};

// Email
pub use email::{welcome_email, EmailSender, HttpEmailSender, OutboundEmail, PRODUCT_NAME};

// Error
pub use error::{BillingError, BillingResult};

// Inbound events
pub use events::PaymentEvent;

// Gateway
pub use gateway::{
    GatewayConfig, HttpPaymentGateway, PaymentGateway, PaymentRecord, PaymentStatus,
};

// Provisioning
pub use provisioning::{ProvisionOutcome, ProvisioningService};

// Reference codec
pub use reference::CheckoutReference;

// Store
pub use store::{
    AccountStore, LedgerEntry, LedgerStatus, PgAccountStore, DEFAULT_PLAN_ID,
};

// Subscriptions
pub use subscriptions::{add_billing_period, SubscriptionService};

// Webhooks
pub use webhooks::{WebhookHandler, WebhookOutcome};
