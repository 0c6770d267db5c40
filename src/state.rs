//! Shared application state handed to every handler.

use std::sync::Arc;

use axum::extract::FromRef;

use crate::{config::Config, db::DbPool, gateway::PaymentGateway};

#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub gateway: Arc<PaymentGateway>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(pool: DbPool, gateway: PaymentGateway, config: Config) -> Self {
        Self {
            pool,
            gateway: Arc::new(gateway),
            config: Arc::new(config),
        }
    }
}

// Lets handlers and middleware that only need the pool keep extracting
// `State<DbPool>`.
impl FromRef<AppState> for DbPool {
    fn from_ref(state: &AppState) -> Self {
        state.pool.clone()
    }
}
