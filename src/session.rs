use std::sync::Arc;
use std::time::Duration;

use actix_web::dev::ServiceRequest;
use log::warn;
use tokio::time::timeout;

use crate::identity::{IdentityStore, SessionState};

/// Resolves the session cookie on an incoming request against the identity
/// backend. Every failure path collapses to [`SessionState::Absent`]: a
/// broken auth backend must never grant access.
pub struct SessionResolver {
    store: Arc<dyn IdentityStore>,
    cookie_name: String,
    store_timeout: Duration,
}

impl SessionResolver {
    pub fn new(store: Arc<dyn IdentityStore>, cookie_name: String, store_timeout: Duration) -> Self {
        Self {
            store,
            cookie_name,
            store_timeout,
        }
    }

    pub async fn resolve(&self, req: &ServiceRequest) -> SessionState {
        let cookie = match req.request().cookie(&self.cookie_name) {
            Some(cookie) => cookie,
            None => return SessionState::Absent,
        };

        match timeout(self.store_timeout, self.store.verify_session(cookie.value())).await {
            Ok(Ok(Some(session))) => SessionState::Present(session),
            Ok(Ok(None)) => SessionState::Absent,
            Ok(Err(err)) => {
                warn!("Session verification failed, treating caller as anonymous: {err:#}");
                SessionState::Absent
            }
            Err(_) => {
                warn!(
                    "Session verification timed out after {:?}, treating caller as anonymous",
                    self.store_timeout
                );
                SessionState::Absent
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use actix_web::cookie::Cookie;
    use actix_web::test::TestRequest;
    use anyhow::Result;
    use async_trait::async_trait;

    use crate::identity::{IdentityRecord, MemoryIdentityStore, VerifiedSession};

    use super::*;

    const COOKIE: &str = "dashboard_session";

    fn resolver(store: Arc<dyn IdentityStore>) -> SessionResolver {
        SessionResolver::new(store, COOKIE.to_string(), Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_resolve() {
        let store = Arc::new(MemoryIdentityStore::new());
        store.put_session("sid-1", "u1");
        let resolver = resolver(store);

        // No cookie at all.
        let req = TestRequest::default().to_srv_request();
        assert_eq!(resolver.resolve(&req).await, SessionState::Absent);

        // Cookie the backend does not recognize.
        let req = TestRequest::default()
            .cookie(Cookie::new(COOKIE, "sid-unknown"))
            .to_srv_request();
        assert_eq!(resolver.resolve(&req).await, SessionState::Absent);

        // Live session.
        let req = TestRequest::default()
            .cookie(Cookie::new(COOKIE, "sid-1"))
            .to_srv_request();
        match resolver.resolve(&req).await {
            SessionState::Present(session) => assert_eq!(session.caller_id, "u1"),
            state => panic!("expected present session, got {state:?}"),
        }
    }

    #[tokio::test]
    async fn test_resolve_fails_closed_on_backend_error() {
        let store = Arc::new(MemoryIdentityStore::new());
        store.put_session("sid-1", "u1");
        store.set_unreachable(true);
        let resolver = resolver(store);

        let req = TestRequest::default()
            .cookie(Cookie::new(COOKIE, "sid-1"))
            .to_srv_request();
        assert_eq!(resolver.resolve(&req).await, SessionState::Absent);
    }

    struct SlowStore;

    #[async_trait]
    impl IdentityStore for SlowStore {
        async fn verify_session(&self, _cookie: &str) -> Result<Option<VerifiedSession>> {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(Some(VerifiedSession {
                caller_id: String::from("u1"),
                refreshed_cookie: None,
            }))
        }

        async fn get_identity(&self, _caller_id: &str) -> Result<Option<IdentityRecord>> {
            Ok(None)
        }

        async fn invalidate_session(&self, _caller_id: &str) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_resolve_fails_closed_on_timeout() {
        let resolver =
            SessionResolver::new(Arc::new(SlowStore), COOKIE.to_string(), Duration::from_millis(10));

        let req = TestRequest::default()
            .cookie(Cookie::new(COOKIE, "sid-1"))
            .to_srv_request();
        assert_eq!(resolver.resolve(&req).await, SessionState::Absent);
    }
}
