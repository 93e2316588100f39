//! Transactional email dispatch
//!
//! Welcome emails carry the one-time credential-setup link for newly
//! provisioned accounts. Delivery failure never blocks account usability:
//! the standard password-recovery flow remains available, so failures are
//! logged and swallowed by callers.

use async_trait::async_trait;
use serde_json::json;

use crate::error::{BillingError, BillingResult};

pub const PRODUCT_NAME: &str = "Oliver";

#[derive(Debug, Clone)]
pub struct OutboundEmail {
    pub to: String,
    pub subject: String,
    pub html: String,
}

#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, email: &OutboundEmail) -> BillingResult<()>;
}

/// Resend-style transactional email adapter.
///
/// Unconfigured (no API key) means sends are skipped with a log line,
/// matching the non-fatal delivery policy.
pub struct HttpEmailSender {
    client: reqwest::Client,
    api_key: Option<String>,
    from: String,
}

const EMAIL_API_URL: &str = "https://api.resend.com/emails";

impl HttpEmailSender {
    pub fn from_env() -> Self {
        let api_key = std::env::var("RESEND_API_KEY").ok().filter(|k| !k.is_empty());
        let from = std::env::var("EMAIL_FROM")
            .unwrap_or_else(|_| format!("{} <no-reply@oliverapp.com>", PRODUCT_NAME));

        Self {
            client: reqwest::Client::new(),
            api_key,
            from,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.api_key.is_some()
    }
}

#[async_trait]
impl EmailSender for HttpEmailSender {
    async fn send(&self, email: &OutboundEmail) -> BillingResult<()> {
        let api_key = match &self.api_key {
            Some(key) => key,
            None => {
                tracing::warn!(
                    to = %email.to,
                    subject = %email.subject,
                    "Email service not configured (missing RESEND_API_KEY) - skipping send"
                );
                return Ok(());
            }
        };

        let response = self
            .client
            .post(EMAIL_API_URL)
            .bearer_auth(api_key)
            .json(&json!({
                "from": self.from,
                "to": email.to,
                "subject": email.subject,
                "html": email.html,
            }))
            .send()
            .await
            .map_err(|e| BillingError::Email(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(BillingError::Email(format!(
                "email API returned {}: {}",
                status, detail
            )));
        }

        tracing::info!(to = %email.to, subject = %email.subject, "Email dispatched");
        Ok(())
    }
}

/// Render the welcome email for a newly provisioned account.
///
/// When no setup link could be generated the email still goes out and
/// points the user at the standard password-recovery flow instead.
pub fn welcome_email(to: &str, name: &str, setup_link: Option<&str>) -> OutboundEmail {
    let cta = match setup_link {
        Some(link) => format!(
            "<a href=\"{}\" style=\"display:inline-block;padding:12px 24px;\
background-color:#2563eb;color:#ffffff;text-decoration:none;\
border-radius:6px;font-weight:bold;\">Set your password</a>",
            link
        ),
        None => "<p>Use the \"forgot password\" option on the sign-in page \
to set your password.</p>"
            .to_string(),
    };

    let html = format!(
        r#"<div style="font-family:sans-serif;max-width:480px;margin:0 auto;">
  <h1>Welcome to {product}!</h1>
  <p>Hi {name},</p>
  <p>Your subscription is active. Set your password to start creating
  budgets for your repair shop:</p>
  <p style="margin:24px 0;">{cta}</p>
  <p>— the {product} team</p>
</div>"#,
        product = PRODUCT_NAME,
        name = name,
        cta = cta,
    );

    OutboundEmail {
        to: to.to_string(),
        subject: format!("Welcome to {}", PRODUCT_NAME),
        html,
    }
}
