use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Role attached to an identity record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Customer,
    User,
}

/// Role and activation flag for an authenticated caller. Fetched from the
/// identity backend on every request, never cached, because the activation
/// flag can flip between navigations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityRecord {
    pub role: Role,
    pub is_active: bool,
}

/// A session cookie the backend accepted. The backend may hand back a
/// refreshed cookie value, which the gate forwards on allowed requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifiedSession {
    pub caller_id: String,
    #[serde(default)]
    pub refreshed_cookie: Option<String>,
}

/// Whether the request carries a session the backend recognizes. A present
/// session does not guarantee that an identity record still exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Absent,
    Present(VerifiedSession),
}

/// Interface to the hosted identity backend. Injected into the gate at
/// construction so tests can substitute [`MemoryIdentityStore`].
#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Verifies an opaque session cookie. `None` means the cookie does not
    /// resolve to a live session.
    async fn verify_session(&self, cookie: &str) -> Result<Option<VerifiedSession>>;

    /// Fetches the role and activation flag for a caller. `None` when no
    /// record exists.
    async fn get_identity(&self, caller_id: &str) -> Result<Option<IdentityRecord>>;

    /// Invalidates every session belonging to the caller. Must be safe to
    /// call when no session is live.
    async fn invalidate_session(&self, caller_id: &str) -> Result<()>;
}

/// Identity backend reached over HTTP. All calls share one reqwest client
/// with a request timeout, so a slow backend cannot hang the gate.
pub struct RestIdentityStore {
    url: String,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct VerifySessionRequest<'a> {
    cookie: &'a str,
}

/// Response envelope used by the identity backend.
#[derive(Debug, Deserialize)]
struct StoreResponse<T> {
    code: u16,
    message: Option<String>,
    data: Option<T>,
}

impl RestIdentityStore {
    pub fn new(url: &str, timeout: Duration, accept_invalid_certs: bool) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(accept_invalid_certs)
            .build()
            .context("build identity store client")?;
        Ok(Self {
            url: url.trim_end_matches('/').to_string(),
            client,
        })
    }

    async fn parse<T: DeserializeOwned>(resp: reqwest::Response) -> Result<Option<T>> {
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            bail!("identity store returned status {}", resp.status());
        }

        let body: StoreResponse<T> = resp.json().await.context("decode identity store response")?;
        if body.code != 200 {
            bail!(
                "identity store error: {}",
                body.message.unwrap_or_else(|| String::from("<none>"))
            );
        }
        Ok(body.data)
    }
}

#[async_trait]
impl IdentityStore for RestIdentityStore {
    async fn verify_session(&self, cookie: &str) -> Result<Option<VerifiedSession>> {
        let url = format!("{}/v1/sessions/verify", self.url);
        let resp = self
            .client
            .post(&url)
            .json(&VerifySessionRequest { cookie })
            .send()
            .await
            .context("verify session request")?;
        Self::parse(resp).await
    }

    async fn get_identity(&self, caller_id: &str) -> Result<Option<IdentityRecord>> {
        let url = format!("{}/v1/identities/{caller_id}", self.url);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .context("get identity request")?;
        Self::parse(resp).await
    }

    async fn invalidate_session(&self, caller_id: &str) -> Result<()> {
        let url = format!("{}/v1/sessions/{caller_id}", self.url);
        let resp = self
            .client
            .delete(&url)
            .send()
            .await
            .context("invalidate session request")?;
        // Deleting an already-dead session is not an error.
        let _: Option<serde_json::Value> = Self::parse(resp).await?;
        Ok(())
    }
}

/// In-memory identity backend for tests and local development.
#[derive(Default)]
pub struct MemoryIdentityStore {
    state: Mutex<MemoryState>,
}

#[derive(Default)]
struct MemoryState {
    /// Cookie value -> caller id.
    sessions: HashMap<String, String>,
    /// Cookie value -> refreshed cookie value handed back on verification.
    refreshed: HashMap<String, String>,
    identities: HashMap<String, IdentityRecord>,
    invalidated: Vec<String>,
    unreachable: bool,
    identity_unreachable: bool,
}

impl MemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_session(&self, cookie: &str, caller_id: &str) {
        let mut state = self.state.lock().unwrap();
        state.sessions.insert(cookie.to_string(), caller_id.to_string());
    }

    pub fn put_identity(&self, caller_id: &str, record: IdentityRecord) {
        let mut state = self.state.lock().unwrap();
        state.identities.insert(caller_id.to_string(), record);
    }

    pub fn set_refreshed_cookie(&self, cookie: &str, refreshed: &str) {
        let mut state = self.state.lock().unwrap();
        state.refreshed.insert(cookie.to_string(), refreshed.to_string());
    }

    /// Makes every call fail, simulating an unreachable backend.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.state.lock().unwrap().unreachable = unreachable;
    }

    /// Makes only identity lookups fail, leaving session verification up.
    pub fn set_identity_unreachable(&self, unreachable: bool) {
        self.state.lock().unwrap().identity_unreachable = unreachable;
    }

    /// Caller ids whose sessions were torn down, in teardown order.
    pub fn invalidated(&self) -> Vec<String> {
        self.state.lock().unwrap().invalidated.clone()
    }
}

#[async_trait]
impl IdentityStore for MemoryIdentityStore {
    async fn verify_session(&self, cookie: &str) -> Result<Option<VerifiedSession>> {
        let state = self.state.lock().unwrap();
        if state.unreachable {
            bail!("identity store unreachable");
        }
        Ok(state.sessions.get(cookie).map(|caller_id| VerifiedSession {
            caller_id: caller_id.clone(),
            refreshed_cookie: state.refreshed.get(cookie).cloned(),
        }))
    }

    async fn get_identity(&self, caller_id: &str) -> Result<Option<IdentityRecord>> {
        let state = self.state.lock().unwrap();
        if state.unreachable || state.identity_unreachable {
            bail!("identity store unreachable");
        }
        Ok(state.identities.get(caller_id).copied())
    }

    async fn invalidate_session(&self, caller_id: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.unreachable {
            bail!("identity store unreachable");
        }
        state.sessions.retain(|_, id| id != caller_id);
        state.invalidated.push(caller_id.to_string());
        Ok(())
    }
}
