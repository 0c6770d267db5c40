//! Data models representing database entities and API payloads.

use serde::Deserialize;
use validator::ValidationError;

pub mod card;
pub mod kyc;
pub mod notification;
pub mod payment;
pub mod support;
pub mod transaction;
pub mod transfer;
pub mod user;
pub mod wallet;

/// NUBAN-style account number: exactly ten ASCII digits, no padding.
pub fn is_account_number(value: &str) -> bool {
    value.len() == 10 && value.bytes().all(|b| b.is_ascii_digit())
}

/// ISO 3166-1 alpha-2 code in upper case, e.g. `NG`.
pub fn is_country_code(value: &str) -> bool {
    value.len() == 2 && value.bytes().all(|b| b.is_ascii_uppercase())
}

pub fn validate_account_number(value: &str) -> Result<(), ValidationError> {
    if is_account_number(value) {
        Ok(())
    } else {
        Err(ValidationError::new("account_number")
            .with_message("Account number must be exactly 10 digits".into()))
    }
}

pub fn validate_country_code(value: &str) -> Result<(), ValidationError> {
    if is_country_code(value) {
        Ok(())
    } else {
        Err(ValidationError::new("country")
            .with_message("Country must be a two-letter upper-case ISO code".into()))
    }
}

const DEFAULT_PER_PAGE: u32 = 20;
const MAX_PER_PAGE: u32 = 100;

/// `?page=&per_page=` query parameters. Pages are 1-based.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PageParams {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl PageParams {
    pub fn new(page: Option<u32>, per_page: Option<u32>) -> Self {
        Self { page, per_page }
    }

    pub fn limit(&self) -> i64 {
        i64::from(self.per_page.unwrap_or(DEFAULT_PER_PAGE).clamp(1, MAX_PER_PAGE))
    }

    pub fn offset(&self) -> i64 {
        let page = self.page.unwrap_or(1).max(1);
        i64::from(page - 1) * self.limit()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn account_numbers_are_exactly_ten_digits() {
        assert!(is_account_number("0123456789"));
        assert!(!is_account_number(" 123456789"));
        assert!(!is_account_number("123456789 "));
        assert!(!is_account_number("012345678"));
        assert!(!is_account_number("01234567890"));
        assert!(!is_account_number("01234S6789"));
        assert!(validate_account_number(" 123456789").is_err());
    }

    #[test]
    fn country_codes_are_two_upper_case_letters() {
        assert!(is_country_code("NG"));
        assert!(!is_country_code("ng"));
        assert!(!is_country_code("1!"));
        assert!(!is_country_code("NGA"));
        assert!(validate_country_code("1!").is_err());
    }

    #[test]
    fn defaults_to_first_page_of_twenty() {
        let params = PageParams::default();
        assert_eq!(params.limit(), 20);
        assert_eq!(params.offset(), 0);
    }

    #[test]
    fn clamps_page_size_and_computes_offset() {
        let params = PageParams::new(Some(3), Some(500));
        assert_eq!(params.limit(), 100);
        assert_eq!(params.offset(), 200);

        let zero = PageParams::new(Some(0), Some(0));
        assert_eq!(zero.limit(), 1);
        assert_eq!(zero.offset(), 0);
    }
}
