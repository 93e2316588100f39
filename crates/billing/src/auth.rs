//! Auth directory integration
//!
//! New subscribers pay before they have an account, so the webhook path
//! provisions the auth identity itself: a user with a random password it
//! never communicates, an auto-confirmed email (payment proves
//! contactability), and a one-time recovery-style link to set the first
//! real credential.

use async_trait::async_trait;
use rand::{distr::Alphanumeric, Rng};
use serde_json::{json, Value};

use crate::error::{BillingError, BillingResult};

#[async_trait]
pub trait AuthDirectory: Send + Sync {
    /// Look up an existing identity by email.
    async fn find_user_by_email(&self, email: &str) -> BillingResult<Option<String>>;

    /// Create an identity with a random, never-communicated password and
    /// an auto-confirmed email. Returns the new user id.
    async fn create_user(&self, email: &str, name: &str) -> BillingResult<String>;

    /// Generate a one-time credential-setup link for the identity.
    async fn generate_setup_link(&self, email: &str) -> BillingResult<String>;
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub base_url: String,
    pub service_role_key: String,
    /// Where the setup link lands after the credential is set.
    pub redirect_to: Option<String>,
}

impl AuthConfig {
    pub fn from_env() -> BillingResult<Self> {
        let base_url = std::env::var("AUTH_API_URL")
            .map_err(|_| BillingError::Config("AUTH_API_URL not configured".to_string()))?;
        let service_role_key = std::env::var("AUTH_SERVICE_ROLE_KEY").map_err(|_| {
            BillingError::Config("AUTH_SERVICE_ROLE_KEY not configured".to_string())
        })?;
        let redirect_to = std::env::var("APP_BASE_URL").ok();

        Ok(Self {
            base_url,
            service_role_key,
            redirect_to,
        })
    }
}

/// Admin REST adapter for the hosted auth service.
pub struct HttpAuthDirectory {
    client: reqwest::Client,
    config: AuthConfig,
}

impl HttpAuthDirectory {
    pub fn new(config: AuthConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    pub fn from_env() -> BillingResult<Self> {
        Ok(Self::new(AuthConfig::from_env()?))
    }

    fn admin_url(&self, path: &str) -> String {
        format!(
            "{}/auth/v1/admin/{}",
            self.config.base_url.trim_end_matches('/'),
            path
        )
    }

    async fn post(&self, url: &str, body: Value) -> BillingResult<Value> {
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.config.service_role_key)
            .header("apikey", &self.config.service_role_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| BillingError::AuthDirectory(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(BillingError::AuthDirectory(format!(
                "auth service returned {}: {}",
                status, detail
            )));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| BillingError::AuthDirectory(e.to_string()))
    }
}

/// 32 alphanumeric characters, generated per identity and discarded.
fn random_password() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect()
}

#[async_trait]
impl AuthDirectory for HttpAuthDirectory {
    async fn find_user_by_email(&self, email: &str) -> BillingResult<Option<String>> {
        let url = self.admin_url("users");
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.config.service_role_key)
            .header("apikey", &self.config.service_role_key)
            .query(&[("email", email)])
            .send()
            .await
            .map_err(|e| BillingError::AuthDirectory(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(BillingError::AuthDirectory(format!(
                "auth service returned {} listing users",
                status
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| BillingError::AuthDirectory(e.to_string()))?;

        let id = body
            .get("users")
            .and_then(Value::as_array)
            .and_then(|users| {
                users.iter().find(|u| {
                    u.get("email")
                        .and_then(Value::as_str)
                        .is_some_and(|e| e.eq_ignore_ascii_case(email))
                })
            })
            .and_then(|u| u.get("id"))
            .and_then(Value::as_str)
            .map(str::to_string);

        Ok(id)
    }

    async fn create_user(&self, email: &str, name: &str) -> BillingResult<String> {
        let body = json!({
            "email": email,
            "password": random_password(),
            "email_confirm": true,
            "user_metadata": { "full_name": name },
        });

        let created = self.post(&self.admin_url("users"), body).await?;

        created
            .get("id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| {
                BillingError::AuthDirectory("create user response missing id".to_string())
            })
    }

    async fn generate_setup_link(&self, email: &str) -> BillingResult<String> {
        let mut body = json!({
            "type": "recovery",
            "email": email,
        });
        if let Some(redirect) = &self.config.redirect_to {
            body["redirect_to"] = json!(redirect);
        }

        let link = self.post(&self.admin_url("generate_link"), body).await?;

        link.get("action_link")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| {
                BillingError::AuthDirectory(
                    "generate_link response missing action_link".to_string(),
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_passwords_are_long_and_distinct() {
        let a = random_password();
        let b = random_password();
        assert_eq!(a.len(), 32);
        assert_ne!(a, b);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
    }
}
