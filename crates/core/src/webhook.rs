//! Signed vendor webhooks.
//!
//! Signatures are hex HMACs over the raw request body and are checked before
//! the body is parsed. A bad signature is an error; a well-signed event that
//! cannot be used (unknown kind, no usable user id, unknown reference) is
//! acknowledged as [`WebhookOutcome::Ignored`] and writes nothing.

use hmac::{Hmac, Mac};
use serde::Serialize;
use serde_json::Value;
use sha2::{Sha256, Sha512};
use uuid::Uuid;

use crate::error::{ErrorKind, MarketError, MarketResult};
use crate::market::Marketplace;
use crate::models::KycStatus;

pub const YOUVERIFY_SIGNATURE_HEADER: &str = "x-youverify-signature";
pub const PAYSTACK_SIGNATURE_HEADER: &str = "x-paystack-signature";

type HmacSha256 = Hmac<Sha256>;
type HmacSha512 = Hmac<Sha512>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum WebhookOutcome {
    Applied { event: String },
    Ignored { event: String, reason: String },
}

impl WebhookOutcome {
    fn ignored(event: &str, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        tracing::info!(event, %reason, "webhook ignored");
        WebhookOutcome::Ignored {
            event: event.to_string(),
            reason,
        }
    }

    fn applied(event: &str) -> Self {
        WebhookOutcome::Applied {
            event: event.to_string(),
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, WebhookOutcome::Applied { .. })
    }
}

fn verify_mac<M: Mac + hmac::digest::KeyInit>(
    secret: &str,
    signature: Option<&str>,
    body: &[u8],
) -> MarketResult<()> {
    if secret.is_empty() {
        tracing::warn!("webhook secret is not configured; rejecting");
        return Err(MarketError::InvalidSignature);
    }
    let signature = signature.ok_or(MarketError::InvalidSignature)?;
    let provided = hex::decode(signature.trim()).map_err(|_| MarketError::InvalidSignature)?;
    let mut mac = <M as Mac>::new_from_slice(secret.as_bytes())
        .map_err(|_| MarketError::InvalidSignature)?;
    mac.update(body);
    mac.verify_slice(&provided)
        .map_err(|_| MarketError::InvalidSignature)
}

/// `x-youverify-signature`: hex HMAC-SHA256 of the body.
pub fn verify_youverify_signature(
    secret: &str,
    signature: Option<&str>,
    body: &[u8],
) -> MarketResult<()> {
    verify_mac::<HmacSha256>(secret, signature, body)
}

/// `x-paystack-signature`: hex HMAC-SHA512 of the body.
pub fn verify_paystack_signature(
    secret: &str,
    signature: Option<&str>,
    body: &[u8],
) -> MarketResult<()> {
    verify_mac::<HmacSha512>(secret, signature, body)
}

/// Only a canonical hyphenated UUID is accepted as a user reference.
fn parse_user_id(raw: &str) -> Option<Uuid> {
    if raw.len() != 36 {
        return None;
    }
    Uuid::parse_str(raw).ok()
}

fn metadata_user_id(payload: &Value) -> Option<&str> {
    payload
        .pointer("/data/metadata/userId")
        .or_else(|| payload.pointer("/metadata/userId"))
        .and_then(Value::as_str)
}

fn kyc_status_for(status: &str) -> KycStatus {
    match status.to_ascii_lowercase().as_str() {
        "found" | "verified" | "success" | "completed" => KycStatus::Verified,
        "failed" | "not_found" | "rejected" => KycStatus::Rejected,
        _ => KycStatus::Pending,
    }
}

fn parse_body(body: &[u8]) -> Option<(Value, String)> {
    let payload: Value = serde_json::from_slice(body).ok()?;
    let event = payload.get("event").and_then(Value::as_str)?.to_string();
    Some((payload, event))
}

impl Marketplace {
    /// Identity verification result from YouVerify.
    pub fn handle_youverify_webhook(
        &self,
        secret: &str,
        signature: Option<&str>,
        body: &[u8],
    ) -> MarketResult<WebhookOutcome> {
        verify_youverify_signature(secret, signature, body)?;
        let Some((payload, event)) = parse_body(body) else {
            return Ok(WebhookOutcome::ignored("unknown", "unreadable payload"));
        };
        let Some(kind) = event.strip_prefix("verification.") else {
            return Ok(WebhookOutcome::ignored(&event, "unhandled event"));
        };
        let Some(user_id) = metadata_user_id(&payload).and_then(parse_user_id) else {
            return Ok(WebhookOutcome::ignored(&event, "no valid metadata.userId"));
        };
        let status = payload
            .pointer("/data/status")
            .or_else(|| payload.get("status"))
            .and_then(Value::as_str)
            .unwrap_or(kind);
        let kyc_status = kyc_status_for(status);

        let mut tables = self.store.write();
        if tables.user(user_id).is_err() {
            return Ok(WebhookOutcome::ignored(&event, "unknown user"));
        }
        Self::apply_verification(&mut tables, user_id, kyc_status)?;
        Ok(WebhookOutcome::applied(&event))
    }

    /// Payment and transfer notifications from Paystack.
    pub fn handle_paystack_webhook(
        &self,
        secret: &str,
        signature: Option<&str>,
        body: &[u8],
    ) -> MarketResult<WebhookOutcome> {
        verify_paystack_signature(secret, signature, body)?;
        let Some((payload, event)) = parse_body(body) else {
            return Ok(WebhookOutcome::ignored("unknown", "unreadable payload"));
        };
        let Some(reference) = payload.pointer("/data/reference").and_then(Value::as_str) else {
            return Ok(WebhookOutcome::ignored(&event, "no reference"));
        };

        let result = match event.as_str() {
            "charge.success" => {
                let Some(paid) = payload.pointer("/data/amount").and_then(Value::as_i64) else {
                    return Ok(WebhookOutcome::ignored(&event, "no amount"));
                };
                self.confirm_funding(reference, paid).map(|_| ())
            }
            "transfer.success" => self
                .withdrawal_by_reference(reference)
                .and_then(|w| self.complete_withdrawal(w.id))
                .map(|_| ()),
            "transfer.failed" | "transfer.reversed" => {
                let reason = payload
                    .pointer("/data/reason")
                    .and_then(Value::as_str)
                    .unwrap_or(event.as_str());
                self.withdrawal_by_reference(reference)
                    .and_then(|w| self.fail_withdrawal(w.id, reason))
                    .map(|_| ())
            }
            _ => return Ok(WebhookOutcome::ignored(&event, "unhandled event")),
        };

        match result {
            Ok(()) => Ok(WebhookOutcome::applied(&event)),
            Err(e) if e.kind() == ErrorKind::Internal => Err(e),
            Err(e) => Ok(WebhookOutcome::ignored(&event, e.to_string())),
        }
    }
}
