//! Paystack REST client.
//!
//! Every response uses the envelope `{"status": bool, "message": str, "data": ...}`.
//! A non-2xx status or `status: false` is reported as [`GatewayError::Rejected`].

use std::time::Duration;

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::json;
use url::Url;

use super::{
    ChargeStatus, ChargeVerification, GatewayError, InitializedCharge, PayoutBeneficiary,
    PayoutReceipt, PayoutStatus,
};

pub struct PaystackClient {
    http: reqwest::Client,
    base_url: Url,
    secret_key: String,
    callback_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    status: bool,
    message: String,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct InitializeData {
    authorization_url: String,
    access_code: Option<String>,
    reference: String,
}

#[derive(Debug, Deserialize)]
struct VerifyData {
    status: String,
    reference: String,
    amount: Option<i64>,
    gateway_response: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RecipientData {
    recipient_code: String,
}

#[derive(Debug, Deserialize)]
struct TransferData {
    transfer_code: String,
    status: String,
}

impl PaystackClient {
    pub fn new(
        base_url: &str,
        secret_key: String,
        callback_url: Option<String>,
    ) -> Result<Self, GatewayError> {
        // Trailing slash so `join` appends instead of replacing the last segment.
        let normalized = format!("{}/", base_url.trim_end_matches('/'));
        let base_url = Url::parse(&normalized)
            .map_err(|e| GatewayError::Config(format!("invalid base URL: {e}")))?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()?;

        Ok(Self {
            http,
            base_url,
            secret_key,
            callback_url,
        })
    }

    pub(super) fn secret_key(&self) -> &str {
        &self.secret_key
    }

    fn endpoint(&self, path: &str) -> Result<Url, GatewayError> {
        self.base_url
            .join(path)
            .map_err(|e| GatewayError::Config(format!("invalid endpoint {path}: {e}")))
    }

    async fn post<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, GatewayError> {
        let response = self
            .http
            .post(self.endpoint(path)?)
            .bearer_auth(&self.secret_key)
            .json(body)
            .send()
            .await?;
        Self::unwrap_envelope(path, response).await
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, GatewayError> {
        let response = self
            .http
            .get(self.endpoint(path)?)
            .bearer_auth(&self.secret_key)
            .send()
            .await?;
        Self::unwrap_envelope(path, response).await
    }

    async fn unwrap_envelope<T: DeserializeOwned>(
        path: &str,
        response: reqwest::Response,
    ) -> Result<T, GatewayError> {
        let status = response.status();
        let text = response.text().await?;

        let envelope: Envelope<T> = serde_json::from_str(&text).map_err(|e| {
            if status.is_success() {
                GatewayError::Decode(format!("{path}: {e}"))
            } else {
                GatewayError::Rejected(format!("{path} returned HTTP {status}"))
            }
        })?;

        if !status.is_success() || !envelope.status {
            tracing::warn!(%status, path, message = %envelope.message, "paystack rejected request");
            return Err(GatewayError::Rejected(envelope.message));
        }

        envelope
            .data
            .ok_or_else(|| GatewayError::Decode(format!("{path}: missing data")))
    }

    pub async fn initialize_charge(
        &self,
        email: &str,
        amount_cents: i64,
        currency: &str,
        reference: &str,
    ) -> Result<InitializedCharge, GatewayError> {
        let mut body = json!({
            "email": email,
            "amount": amount_cents,
            "currency": currency,
            "reference": reference,
        });
        if let Some(callback_url) = &self.callback_url {
            body["callback_url"] = json!(callback_url);
        }

        let data: InitializeData = self.post("transaction/initialize", &body).await?;

        Ok(InitializedCharge {
            authorization_url: data.authorization_url,
            access_code: data.access_code,
            reference: data.reference,
        })
    }

    pub async fn verify_charge(&self, reference: &str) -> Result<ChargeVerification, GatewayError> {
        let data: VerifyData = self
            .get(&format!("transaction/verify/{reference}"))
            .await?;

        Ok(ChargeVerification {
            reference: data.reference,
            status: ChargeStatus::from_gateway(&data.status),
            amount_cents: data.amount,
            gateway_response: data.gateway_response,
        })
    }

    pub async fn create_recipient(
        &self,
        beneficiary: &PayoutBeneficiary<'_>,
    ) -> Result<String, GatewayError> {
        let body = json!({
            "type": "nuban",
            "name": beneficiary.account_name,
            "account_number": beneficiary.account_number,
            "bank_code": beneficiary.bank_code,
            "currency": beneficiary.currency,
        });

        let data: RecipientData = self.post("transferrecipient", &body).await?;
        Ok(data.recipient_code)
    }

    pub async fn initiate_transfer(
        &self,
        amount_cents: i64,
        recipient_code: &str,
        reference: &str,
        reason: &str,
    ) -> Result<PayoutReceipt, GatewayError> {
        let body = json!({
            "source": "balance",
            "amount": amount_cents,
            "recipient": recipient_code,
            "reference": reference,
            "reason": reason,
        });

        let data: TransferData = self.post("transfer", &body).await?;

        Ok(PayoutReceipt {
            transfer_code: data.transfer_code,
            status: PayoutStatus::from_gateway(&data.status),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_endpoints_onto_base_path() {
        let client =
            PaystackClient::new("https://gateway.example/v1/", "sk_test".into(), None).unwrap();
        assert_eq!(
            client.endpoint("transaction/verify/DEP_1").unwrap().as_str(),
            "https://gateway.example/v1/transaction/verify/DEP_1"
        );
    }

    #[test]
    fn rejects_invalid_base_url() {
        assert!(matches!(
            PaystackClient::new("not a url", "sk_test".into(), None),
            Err(GatewayError::Config(_))
        ));
    }

    #[test]
    fn decodes_envelopes() {
        let envelope: Envelope<VerifyData> = serde_json::from_str(
            r#"{"status":true,"message":"Verification successful","data":{"status":"success","reference":"DEP_1","amount":50000,"gateway_response":"Approved"}}"#,
        )
        .unwrap();
        let data = envelope.data.unwrap();
        assert_eq!(data.amount, Some(50000));
        assert_eq!(ChargeStatus::from_gateway(&data.status), ChargeStatus::Success);
    }
}
