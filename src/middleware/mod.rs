//! HTTP middleware components.
//!
//! Middleware run before route handlers. They authenticate requests,
//! enforce roles and short-circuit unauthorized calls.

/// API key authentication and admin role check
pub mod auth;
