use std::sync::Arc;
use std::time::Duration;

use log::warn;
use tokio::time::timeout;

use crate::config::GateConfig;
use crate::identity::{IdentityRecord, IdentityStore};
use crate::session::SessionResolver;
use crate::zone::ZoneRules;

/// Per-process state shared by every request the gate handles. The identity
/// store is injected here so tests can swap in an in-memory fake.
pub struct GateContext {
    pub store: Arc<dyn IdentityStore>,
    pub rules: ZoneRules,
    pub session: SessionResolver,

    pub cookie_name: String,
    pub store_timeout: Duration,
}

impl GateContext {
    pub fn new(cfg: &GateConfig, store: Arc<dyn IdentityStore>) -> Self {
        let store_timeout = Duration::from_secs(cfg.store_timeout_secs);
        let session = SessionResolver::new(
            store.clone(),
            cfg.session_cookie.clone(),
            store_timeout,
        );
        Self {
            store,
            rules: cfg.zones.build_rules(),
            session,
            cookie_name: cfg.session_cookie.clone(),
            store_timeout,
        }
    }

    #[cfg(test)]
    pub fn new_test(store: Arc<dyn IdentityStore>) -> Self {
        Self::new(&GateConfig::default(), store)
    }

    /// Fetches the identity record for a caller. The record is looked up on
    /// every request on purpose: the activation flag can flip between
    /// navigations and must be re-checked each time. A lookup failure maps
    /// to `None`, the same as a missing record.
    pub async fn fetch_identity(&self, caller_id: &str) -> Option<IdentityRecord> {
        match timeout(self.store_timeout, self.store.get_identity(caller_id)).await {
            Ok(Ok(record)) => record,
            Ok(Err(err)) => {
                warn!("Identity lookup for {caller_id} failed: {err:#}");
                None
            }
            Err(_) => {
                warn!(
                    "Identity lookup for {caller_id} timed out after {:?}",
                    self.store_timeout
                );
                None
            }
        }
    }
}
