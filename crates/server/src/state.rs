use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use taskmarket_core::{MarketError, MarketResult, Marketplace};
use uuid::Uuid;

use crate::config::Config;
use crate::error::ApiResult;

/// Opaque bearer tokens issued at signup.
#[derive(Debug, Default)]
pub struct SessionStore {
    tokens: RwLock<HashMap<String, Uuid>>,
}

impl SessionStore {
    pub fn issue(&self, user_id: Uuid) -> String {
        let token = format!("tm_{}", Uuid::new_v4().simple());
        self.tokens.write().insert(token.clone(), user_id);
        token
    }

    pub fn resolve(&self, token: &str) -> Option<Uuid> {
        self.tokens.read().get(token).copied()
    }
}

#[derive(Clone)]
pub struct AppState {
    pub market: Arc<Marketplace>,
    pub sessions: Arc<SessionStore>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(config: Config) -> MarketResult<Self> {
        let directory = Arc::new(config.account_directory());
        let market = Marketplace::with_account_lookup(config.market.clone(), directory)?;
        Ok(Self {
            market: Arc::new(market),
            sessions: Arc::new(SessionStore::default()),
            config: Arc::new(config),
        })
    }

    /// Run a marketplace call on the blocking pool. Used for anything that
    /// hashes or verifies a PIN.
    pub async fn blocking<T, F>(&self, call: F) -> ApiResult<T>
    where
        F: FnOnce(&Marketplace) -> MarketResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let market = Arc::clone(&self.market);
        let result = tokio::task::spawn_blocking(move || call(&market))
            .await
            .map_err(|e| MarketError::Internal(format!("blocking task failed: {e}")))?;
        Ok(result?)
    }
}
