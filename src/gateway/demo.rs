//! Simulated gateway for demos: outcomes are drawn at random with a
//! configurable success rate and no network calls are made.

use rand::Rng;

use super::{
    ChargeStatus, ChargeVerification, InitializedCharge, PayoutBeneficiary, PayoutReceipt,
    PayoutStatus,
};

const CHECKOUT_BASE: &str = "https://checkout.demo.invalid/pay";

pub struct DemoGateway {
    success_rate: f64,
    webhook_secret: String,
}

impl DemoGateway {
    pub fn new(success_rate: f64, webhook_secret: String) -> Self {
        Self {
            success_rate: success_rate.clamp(0.0, 1.0),
            webhook_secret,
        }
    }

    pub(super) fn webhook_secret(&self) -> &str {
        &self.webhook_secret
    }

    fn succeeds(&self) -> bool {
        rand::rng().random_bool(self.success_rate)
    }

    fn code(prefix: &str) -> String {
        let bytes: [u8; 8] = rand::random();
        format!("{prefix}_{}", hex::encode(bytes))
    }

    pub fn initialize_charge(&self, reference: &str) -> InitializedCharge {
        InitializedCharge {
            authorization_url: format!("{CHECKOUT_BASE}/{reference}"),
            access_code: Some(Self::code("ACC")),
            reference: reference.to_string(),
        }
    }

    pub fn verify_charge(&self, reference: &str) -> ChargeVerification {
        let (status, message) = if self.succeeds() {
            (ChargeStatus::Success, "Approved (demo)")
        } else {
            (ChargeStatus::Failed, "Declined (demo)")
        };

        tracing::debug!(reference, ?status, "demo charge verified");

        ChargeVerification {
            reference: reference.to_string(),
            status,
            amount_cents: None,
            gateway_response: Some(message.to_string()),
        }
    }

    pub fn create_recipient(&self, beneficiary: &PayoutBeneficiary<'_>) -> String {
        tracing::debug!(
            bank_code = beneficiary.bank_code,
            account_number = beneficiary.account_number,
            "demo recipient created"
        );
        Self::code("RCP")
    }

    /// Demo payouts settle synchronously.
    pub fn initiate_transfer(&self) -> PayoutReceipt {
        let status = if self.succeeds() {
            PayoutStatus::Success
        } else {
            PayoutStatus::Failed
        };

        PayoutReceipt {
            transfer_code: Self::code("TRF"),
            status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn beneficiary() -> PayoutBeneficiary<'static> {
        PayoutBeneficiary {
            account_name: "Ada Obi",
            account_number: "0123456789",
            bank_code: "058",
            currency: "NGN",
        }
    }

    #[test]
    fn always_succeeds_at_rate_one() {
        let demo = DemoGateway::new(1.0, "secret".into());
        for _ in 0..20 {
            assert_eq!(demo.verify_charge("DEP_1").status, ChargeStatus::Success);
            assert_eq!(demo.initiate_transfer().status, PayoutStatus::Success);
        }
    }

    #[test]
    fn always_fails_at_rate_zero() {
        let demo = DemoGateway::new(0.0, "secret".into());
        for _ in 0..20 {
            assert_eq!(demo.verify_charge("DEP_1").status, ChargeStatus::Failed);
            assert_eq!(demo.initiate_transfer().status, PayoutStatus::Failed);
        }
    }

    #[test]
    fn clamps_out_of_range_rates() {
        let demo = DemoGateway::new(7.5, "secret".into());
        assert!(demo.succeeds());
    }

    #[test]
    fn checkout_url_embeds_reference() {
        let demo = DemoGateway::new(1.0, "secret".into());
        let charge = demo.initialize_charge("DEP_ABC");
        assert!(charge.authorization_url.ends_with("/DEP_ABC"));
        assert_eq!(charge.reference, "DEP_ABC");
        assert!(demo.create_recipient(&beneficiary()).starts_with("RCP_"));
    }
}
