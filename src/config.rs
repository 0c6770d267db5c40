//! Application configuration management.
//!
//! Configuration is read from environment variables (optionally seeded from a
//! `.env` file) and deserialized with `envy` into a type-safe struct.

use serde::Deserialize;

/// Which payment gateway backs deposits and withdrawals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentProvider {
    Paystack,
    Demo,
}

/// Application configuration loaded from environment variables.
///
/// # Environment Variables
///
/// - `DATABASE_URL` (required): PostgreSQL connection string
/// - `SERVER_PORT`: HTTP server port, defaults to 3000
/// - `DATABASE_MAX_CONNECTIONS`: pool size, defaults to 5
/// - `DEFAULT_CURRENCY`: currency for new wallets, defaults to NGN
/// - `PAYMENT_PROVIDER`: `paystack` or `demo` (default)
/// - `PAYSTACK_SECRET_KEY`: required for the Paystack provider
/// - `PAYSTACK_BASE_URL`: defaults to `https://api.paystack.co`
/// - `PAYMENT_CALLBACK_URL`: optional checkout callback
/// - `DEMO_SUCCESS_RATE`: probability a demo charge or payout succeeds
/// - `DEMO_MODE`: echo OTPs in API responses, defaults to true
/// - `DEMO_WEBHOOK_SECRET`: webhook signing key for the demo provider
/// - `BOOTSTRAP_ADMIN_KEY`: ensures an admin user with this API key exists
/// - `OTP_TTL_SECONDS`: transfer OTP lifetime, defaults to 900
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,

    #[serde(default = "default_port")]
    pub server_port: u16,

    #[serde(default = "default_max_connections")]
    pub database_max_connections: u32,

    #[serde(default = "default_currency")]
    pub default_currency: String,

    #[serde(default = "default_provider")]
    pub payment_provider: PaymentProvider,

    pub paystack_secret_key: Option<String>,

    #[serde(default = "default_paystack_base_url")]
    pub paystack_base_url: String,

    pub payment_callback_url: Option<String>,

    #[serde(default = "default_success_rate")]
    pub demo_success_rate: f64,

    #[serde(default = "default_true")]
    pub demo_mode: bool,

    #[serde(default = "default_demo_webhook_secret")]
    pub demo_webhook_secret: String,

    pub bootstrap_admin_key: Option<String>,

    #[serde(default = "default_otp_ttl")]
    pub otp_ttl_seconds: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error(transparent)]
    Env(#[from] envy::Error),

    #[error("PAYSTACK_SECRET_KEY is required when PAYMENT_PROVIDER=paystack")]
    MissingPaystackKey,

    #[error("DEMO_SUCCESS_RATE must be between 0 and 1, got {0}")]
    InvalidSuccessRate(f64),

    #[error("OTP_TTL_SECONDS must be positive")]
    InvalidOtpTtl,
}

fn default_port() -> u16 {
    3000
}

fn default_max_connections() -> u32 {
    5
}

fn default_currency() -> String {
    "NGN".to_string()
}

fn default_provider() -> PaymentProvider {
    PaymentProvider::Demo
}

fn default_paystack_base_url() -> String {
    "https://api.paystack.co".to_string()
}

fn default_success_rate() -> f64 {
    0.9
}

fn default_true() -> bool {
    true
}

fn default_demo_webhook_secret() -> String {
    "demo_webhook_secret".to_string()
}

fn default_otp_ttl() -> i64 {
    900
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// A `.env` file is loaded first if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        // Field names map to upper-case variables: database_url -> DATABASE_URL
        let config = envy::from_env::<Config>()?;
        config.validate()?;
        Ok(config)
    }

    /// Cross-field checks that serde defaults cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.payment_provider == PaymentProvider::Paystack
            && self
                .paystack_secret_key
                .as_deref()
                .is_none_or(|key| key.trim().is_empty())
        {
            return Err(ConfigError::MissingPaystackKey);
        }

        if !(0.0..=1.0).contains(&self.demo_success_rate) {
            return Err(ConfigError::InvalidSuccessRate(self.demo_success_rate));
        }

        if self.otp_ttl_seconds <= 0 {
            return Err(ConfigError::InvalidOtpTtl);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn applies_defaults() {
        let config: Config =
            envy::from_iter(vars(&[("DATABASE_URL", "postgres://localhost/bank")])).unwrap();

        assert_eq!(config.server_port, 3000);
        assert_eq!(config.database_max_connections, 5);
        assert_eq!(config.default_currency, "NGN");
        assert_eq!(config.payment_provider, PaymentProvider::Demo);
        assert_eq!(config.paystack_base_url, "https://api.paystack.co");
        assert!(config.demo_mode);
        assert_eq!(config.otp_ttl_seconds, 900);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn paystack_requires_secret_key() {
        let config: Config = envy::from_iter(vars(&[
            ("DATABASE_URL", "postgres://localhost/bank"),
            ("PAYMENT_PROVIDER", "paystack"),
        ]))
        .unwrap();

        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingPaystackKey)
        ));
    }

    #[test]
    fn rejects_out_of_range_success_rate() {
        let config: Config = envy::from_iter(vars(&[
            ("DATABASE_URL", "postgres://localhost/bank"),
            ("DEMO_SUCCESS_RATE", "1.5"),
        ]))
        .unwrap();

        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidSuccessRate(_))
        ));
    }
}
