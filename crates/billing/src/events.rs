//! Inbound webhook notification decoding
//!
//! The payment provider has shipped two notification shapes over time:
//! a current one carrying `type` + `data.id`, and a legacy one carrying
//! `topic` + a `resource` URL whose last path segment is the payment id.
//! Both only prove "something happened to payment X"; the authoritative
//! status is always re-fetched from the provider afterwards.

use serde_json::Value;

/// A classified inbound notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentEvent {
    /// A payment-related notification with a resolvable payment id.
    Payment { payment_id: String },
    /// Anything we do not act on (merchant orders, test pings, unknown
    /// shapes). Acknowledged with 200 and otherwise ignored.
    Ignored { kind: Option<String> },
}

impl PaymentEvent {
    pub fn parse(body: &Value) -> Self {
        // Current shape: { "type": "payment", "data": { "id": .. } }
        if body.get("type").and_then(Value::as_str) == Some("payment") {
            if let Some(id) = body.pointer("/data/id").and_then(json_id) {
                return PaymentEvent::Payment { payment_id: id };
            }
        }

        // Legacy shape: { "topic": "payment", "resource": "<url-or-id>" }
        if body.get("topic").and_then(Value::as_str) == Some("payment") {
            if let Some(id) = body.get("resource").and_then(json_id) {
                return PaymentEvent::Payment { payment_id: id };
            }
        }

        let kind = body
            .get("type")
            .or_else(|| body.get("topic"))
            .and_then(Value::as_str)
            .map(str::to_string);

        PaymentEvent::Ignored { kind }
    }
}

/// Extract a payment id from a JSON string, number, or resource URL.
fn json_id(value: &Value) -> Option<String> {
    let raw = match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };

    // A resource URL like "https://api.example.com/v1/payments/123" - the
    // id is the last non-empty path segment.
    let id = raw
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or("")
        .to_string();

    if id.is_empty() {
        None
    } else {
        Some(id)
    }
}
