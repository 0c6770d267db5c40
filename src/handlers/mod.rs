//! HTTP request handlers (route handlers).
//!
//! Each handler is an async function that:
//! 1. Extracts and validates request data (JSON body, path, query)
//! 2. Checks the caller may perform the operation
//! 3. Delegates to a service and maps the result to a JSON response

/// Admin tooling under `/api/v1/admin`
pub mod admin;
pub mod cards;
pub mod health;
pub mod kyc;
pub mod notifications;
/// Gateway deposits, withdrawals and the payment webhook
pub mod payments;
pub mod support;
pub mod transfers;
pub mod users;
pub mod wallet;
