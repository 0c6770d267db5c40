//! Business logic services.
//!
//! Services contain core business logic separated from HTTP handlers.
//! They own database transactions: money-moving operations lock wallet rows
//! and write ledger entries through [`ledger`] so every balance change is
//! recorded atomically.

pub mod card_service;
pub mod kyc_service;
pub mod ledger;
pub mod limits;
pub mod notification_service;
pub mod payment_service;
pub mod support_service;
pub mod transfer_service;
pub mod user_service;
pub mod verification;
pub mod wallet_service;
