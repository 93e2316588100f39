//! Checkout reference codec
//!
//! Every checkout session carries an opaque `external_reference` string
//! that comes back on the webhook and correlates the payment to either an
//! existing account (renewal) or pending signup details. The contract is
//! explicit: a renewal reference is the bare account id, a signup
//! reference is a JSON object with `name` and `email`.

use serde_json::Value;

use crate::error::{BillingError, BillingResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckoutReference {
    /// Checkout initiated by an authenticated existing account.
    Renewal { account_id: String },
    /// Checkout initiated by an anonymous visitor with no account yet.
    Signup { name: String, email: String },
}

impl CheckoutReference {
    /// Serialize into the wire form attached at checkout-creation time.
    pub fn encode(&self) -> String {
        match self {
            CheckoutReference::Renewal { account_id } => account_id.clone(),
            CheckoutReference::Signup { name, email } => {
                serde_json::json!({ "name": name, "email": email }).to_string()
            }
        }
    }

    /// Decode a reference string coming back on a webhook.
    ///
    /// A JSON object carrying both `name` and `email` classifies as a
    /// signup; any other non-empty string is taken as an account id.
    /// Empty references fail decoding and the event is not acted on.
    pub fn decode(raw: &str) -> BillingResult<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(BillingError::MalformedReference(
                "empty external reference".to_string(),
            ));
        }

        if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(trimmed) {
            if let (Some(name), Some(email)) = (
                map.get("name").and_then(Value::as_str),
                map.get("email").and_then(Value::as_str),
            ) {
                return Ok(CheckoutReference::Signup {
                    name: name.to_string(),
                    email: email.to_string(),
                });
            }
        }

        Ok(CheckoutReference::Renewal {
            account_id: trimmed.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn signup_reference_round_trips() {
        let reference = CheckoutReference::Signup {
            name: "Ana".to_string(),
            email: "a@x.com".to_string(),
        };
        let decoded = CheckoutReference::decode(&reference.encode()).unwrap();
        assert_eq!(decoded, reference);
    }

    #[test]
    fn renewal_reference_round_trips() {
        let reference = CheckoutReference::Renewal {
            account_id: "acct-123".to_string(),
        };
        let decoded = CheckoutReference::decode(&reference.encode()).unwrap();
        assert_eq!(decoded, reference);
    }

    #[test]
    fn bare_string_decodes_as_renewal() {
        match CheckoutReference::decode("8f14e45f-ceea-467f-a8d5-91be13a5a3c1").unwrap() {
            CheckoutReference::Renewal { account_id } => {
                assert_eq!(account_id, "8f14e45f-ceea-467f-a8d5-91be13a5a3c1");
            }
            other => panic!("expected renewal, got {:?}", other),
        }
    }

    #[test]
    fn json_object_without_email_decodes_as_renewal() {
        // Not a valid signup payload, so the raw string stands as an id.
        let raw = r#"{"name":"Ana"}"#;
        match CheckoutReference::decode(raw).unwrap() {
            CheckoutReference::Renewal { account_id } => assert_eq!(account_id, raw),
            other => panic!("expected renewal, got {:?}", other),
        }
    }

    #[test]
    fn empty_reference_fails_to_decode() {
        assert!(CheckoutReference::decode("").is_err());
        assert!(CheckoutReference::decode("   ").is_err());
    }
}
