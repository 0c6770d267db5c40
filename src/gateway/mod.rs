//! Payment gateway integration.
//!
//! Deposits are collected through a hosted checkout (initialize, then verify
//! or receive a `charge.success` webhook). Payouts are a two-step call:
//! register a transfer recipient, then initiate a transfer to it.
//!
//! Two backends exist:
//! - [`PaystackClient`]: the real Paystack REST API
//! - [`DemoGateway`]: a random-outcome simulator for demos and local runs
//!
//! Both sign webhooks with HMAC-SHA512 over the raw request body, sent in
//! the `x-paystack-signature` header as lowercase hex.

mod demo;
mod paystack;

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha512;

use crate::config::{Config, PaymentProvider};

pub use demo::DemoGateway;
pub use paystack::PaystackClient;

type HmacSha512 = Hmac<Sha512>;

/// Header carrying the webhook signature.
pub const SIGNATURE_HEADER: &str = "x-paystack-signature";

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("gateway rejected the request: {0}")]
    Rejected(String),

    #[error("unexpected gateway response: {0}")]
    Decode(String),

    #[error("invalid gateway configuration: {0}")]
    Config(String),
}

/// Hosted checkout created for a deposit.
#[derive(Debug, Clone)]
pub struct InitializedCharge {
    pub authorization_url: String,
    pub access_code: Option<String>,
    pub reference: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChargeStatus {
    Success,
    Failed,
    Abandoned,
    /// Customer has not completed checkout yet
    Pending,
}

impl ChargeStatus {
    pub fn from_gateway(status: &str) -> Self {
        match status {
            "success" => ChargeStatus::Success,
            "failed" | "reversed" => ChargeStatus::Failed,
            "abandoned" => ChargeStatus::Abandoned,
            _ => ChargeStatus::Pending,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChargeVerification {
    pub reference: String,
    pub status: ChargeStatus,
    /// Amount actually charged, when the gateway reports it
    pub amount_cents: Option<i64>,
    pub gateway_response: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayoutStatus {
    /// Settled synchronously
    Success,
    /// Accepted; the outcome arrives by webhook
    Pending,
    Failed,
}

impl PayoutStatus {
    pub fn from_gateway(status: &str) -> Self {
        match status {
            "success" => PayoutStatus::Success,
            "failed" | "reversed" | "abandoned" => PayoutStatus::Failed,
            _ => PayoutStatus::Pending,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PayoutReceipt {
    pub transfer_code: String,
    pub status: PayoutStatus,
}

/// Beneficiary details for a payout.
#[derive(Debug, Clone)]
pub struct PayoutBeneficiary<'a> {
    pub account_name: &'a str,
    pub account_number: &'a str,
    pub bank_code: &'a str,
    pub currency: &'a str,
}

/// Configured payment backend.
pub enum PaymentGateway {
    Paystack(PaystackClient),
    Demo(DemoGateway),
}

impl PaymentGateway {
    /// Build the gateway selected by `PAYMENT_PROVIDER`.
    pub fn from_config(config: &Config) -> Result<Self, GatewayError> {
        match config.payment_provider {
            PaymentProvider::Paystack => {
                let secret = config.paystack_secret_key.clone().ok_or_else(|| {
                    GatewayError::Config("PAYSTACK_SECRET_KEY is not set".to_string())
                })?;
                Ok(PaymentGateway::Paystack(PaystackClient::new(
                    &config.paystack_base_url,
                    secret,
                    config.payment_callback_url.clone(),
                )?))
            }
            PaymentProvider::Demo => Ok(PaymentGateway::Demo(DemoGateway::new(
                config.demo_success_rate,
                config.demo_webhook_secret.clone(),
            ))),
        }
    }

    /// Value stored in the `provider` column.
    pub fn provider_name(&self) -> &'static str {
        match self {
            PaymentGateway::Paystack(_) => "paystack",
            PaymentGateway::Demo(_) => "demo",
        }
    }

    pub async fn initialize_charge(
        &self,
        email: &str,
        amount_cents: i64,
        currency: &str,
        reference: &str,
    ) -> Result<InitializedCharge, GatewayError> {
        match self {
            PaymentGateway::Paystack(client) => {
                client
                    .initialize_charge(email, amount_cents, currency, reference)
                    .await
            }
            PaymentGateway::Demo(demo) => Ok(demo.initialize_charge(reference)),
        }
    }

    pub async fn verify_charge(&self, reference: &str) -> Result<ChargeVerification, GatewayError> {
        match self {
            PaymentGateway::Paystack(client) => client.verify_charge(reference).await,
            PaymentGateway::Demo(demo) => Ok(demo.verify_charge(reference)),
        }
    }

    /// Register the beneficiary and start the payout in one call.
    ///
    /// Returns the recipient code alongside the receipt so it can be stored.
    pub async fn send_payout(
        &self,
        beneficiary: PayoutBeneficiary<'_>,
        amount_cents: i64,
        reference: &str,
        reason: &str,
    ) -> Result<(String, PayoutReceipt), GatewayError> {
        match self {
            PaymentGateway::Paystack(client) => {
                let recipient_code = client.create_recipient(&beneficiary).await?;
                let receipt = client
                    .initiate_transfer(amount_cents, &recipient_code, reference, reason)
                    .await?;
                Ok((recipient_code, receipt))
            }
            PaymentGateway::Demo(demo) => {
                let recipient_code = demo.create_recipient(&beneficiary);
                Ok((recipient_code, demo.initiate_transfer()))
            }
        }
    }

    /// Check the `x-paystack-signature` header against the raw body.
    pub fn verify_webhook_signature(&self, body: &[u8], signature: &str) -> bool {
        let secret = match self {
            PaymentGateway::Paystack(client) => client.secret_key(),
            PaymentGateway::Demo(demo) => demo.webhook_secret(),
        };
        verify_signature(secret, body, signature)
    }
}

/// Lowercase hex HMAC-SHA512 of `body` keyed with `secret`, as the gateway
/// sends it.
#[cfg(test)]
pub fn sign_payload(secret: &str, body: &[u8]) -> String {
    // HMAC accepts keys of any length.
    let mut mac = HmacSha512::new_from_slice(secret.as_bytes()).expect("HMAC key length is valid");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Constant-time signature check.
pub fn verify_signature(secret: &str, body: &[u8], signature: &str) -> bool {
    let Ok(expected) = hex::decode(signature.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha512::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

/// Webhook envelope: `{"event": "...", "data": {...}}`.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    pub event: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

/// `data` of `charge.success`.
#[derive(Debug, Clone, Deserialize)]
pub struct ChargeEventData {
    pub reference: String,
    pub amount: Option<i64>,
    pub gateway_response: Option<String>,
}

/// `data` of `transfer.success`, `transfer.failed` and `transfer.reversed`.
#[derive(Debug, Clone, Deserialize)]
pub struct TransferEventData {
    pub reference: String,
    pub transfer_code: Option<String>,
    pub reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_roundtrip_and_tamper_detection() {
        let body = br#"{"event":"charge.success","data":{"reference":"DEP_1"}}"#;
        let signature = sign_payload("sk_test_secret", body);

        assert_eq!(signature.len(), 128);
        assert!(verify_signature("sk_test_secret", body, &signature));
        assert!(!verify_signature("sk_other", body, &signature));
        assert!(!verify_signature(
            "sk_test_secret",
            br#"{"event":"charge.success","data":{"reference":"DEP_2"}}"#,
            &signature
        ));
        assert!(!verify_signature("sk_test_secret", body, "not-hex"));
    }

    #[test]
    fn maps_gateway_statuses() {
        assert_eq!(ChargeStatus::from_gateway("success"), ChargeStatus::Success);
        assert_eq!(ChargeStatus::from_gateway("abandoned"), ChargeStatus::Abandoned);
        assert_eq!(ChargeStatus::from_gateway("ongoing"), ChargeStatus::Pending);
        assert_eq!(PayoutStatus::from_gateway("otp"), PayoutStatus::Pending);
        assert_eq!(PayoutStatus::from_gateway("failed"), PayoutStatus::Failed);
    }

    #[test]
    fn parses_webhook_payloads() {
        let event: WebhookEvent = serde_json::from_str(
            r#"{"event":"transfer.failed","data":{"reference":"WDR_1","transfer_code":"TRF_x","reason":"Account closed"}}"#,
        )
        .unwrap();
        assert_eq!(event.event, "transfer.failed");

        let data: TransferEventData = serde_json::from_value(event.data).unwrap();
        assert_eq!(data.reference, "WDR_1");
        assert_eq!(data.reason.as_deref(), Some("Account closed"));
    }

    #[test]
    fn demo_gateway_uses_its_webhook_secret() {
        let gateway = PaymentGateway::Demo(DemoGateway::new(1.0, "whsec".into()));
        let body = b"{}";
        assert!(gateway.verify_webhook_signature(body, &sign_payload("whsec", body)));
        assert_eq!(gateway.provider_name(), "demo");
    }
}
