use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use std::{env, fs, io};

use anyhow::{bail, Context, Result};
use clap::Args;
use log::warn;
use openssl::ssl::{SslAcceptor, SslAcceptorBuilder, SslMethod};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::context::GateContext;
use crate::identity::{IdentityStore, RestIdentityStore};
use crate::logs::LogsConfig;
use crate::server::GateServer;
use crate::zone::ZoneRules;

/// Resolved filesystem locations for configuration and data.
pub struct PathSet {
    pub config_dir: PathBuf,
    pub data_dir: PathBuf,
}

impl PathSet {
    pub fn new(config_dir: Option<PathBuf>, data_dir: Option<PathBuf>) -> Result<Self> {
        let config_dir = if let Some(dir) = config_dir {
            dir
        } else if let Ok(dir) = env::var("DASHGATE_CONFIG") {
            PathBuf::from(dir)
        } else {
            Self::home_dir()?.join(".config").join("dashgate")
        };

        let data_dir = if let Some(dir) = data_dir {
            dir
        } else if let Ok(dir) = env::var("DASHGATE_DATA") {
            PathBuf::from(dir)
        } else {
            Self::home_dir()?
                .join(".local")
                .join("share")
                .join("dashgate")
        };

        ensure_dir_exists(&config_dir)
            .with_context(|| format!("ensure config directory: {}", config_dir.display()))?;
        ensure_dir_exists(&data_dir)
            .with_context(|| format!("ensure data directory: {}", data_dir.display()))?;

        Ok(Self {
            config_dir,
            data_dir,
        })
    }

    pub fn load_config<T>(&self, name: &str) -> Result<T>
    where
        T: CommonConfig + DeserializeOwned + Default,
    {
        let path = self.config_dir.join(format!("{name}.toml"));
        let mut cfg: T = match fs::read_to_string(&path) {
            Ok(s) => toml::from_str(&s).context("parse config toml")?,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                warn!("Config file for {name} not found, using defaults");
                T::default()
            }
            Err(err) => {
                return Err(err).context(format!("read config file: {}", path.display()));
            }
        };

        cfg.complete(self).context("validate config")?;
        Ok(cfg)
    }

    fn home_dir() -> Result<PathBuf> {
        let dir = env::var_os("HOME")
            .or_else(|| env::var_os("USERPROFILE"))
            .map(PathBuf::from);
        match dir {
            Some(dir) => Ok(dir),
            None => {
                bail!("could not determine home directory, please specify config path manually")
            }
        }
    }
}

pub trait CommonConfig {
    fn complete(&mut self, ps: &PathSet) -> Result<()>;
}

pub fn ensure_dir_exists(path: &Path) -> Result<()> {
    if path.exists() {
        return Ok(());
    }
    fs::create_dir_all(path).with_context(|| format!("create directory: {}", path.display()))?;
    Ok(())
}

#[derive(Args, Debug, Clone)]
pub struct ConfigArgs {
    /// Config directory to use, defaults to ~/.config/dashgate.
    #[arg(long, short = 'c')]
    pub config_dir: Option<PathBuf>,

    /// Data directory (logs), defaults to ~/.local/share/dashgate.
    #[arg(long)]
    pub data_dir: Option<PathBuf>,
}

impl ConfigArgs {
    pub fn load<T>(&self, name: &str) -> Result<T>
    where
        T: CommonConfig + DeserializeOwned + Default,
    {
        let ps = PathSet::new(self.config_dir.clone(), self.data_dir.clone())?;
        ps.load_config(name)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GateConfig {
    #[serde(default = "GateConfig::default_bind")]
    pub bind: String,

    #[serde(default)]
    pub ssl: bool,

    /// Name of the cookie carrying the opaque session.
    #[serde(default = "GateConfig::default_session_cookie")]
    pub session_cookie: String,

    /// Upper bound for each identity backend call. Failure maps to the
    /// degraded outcome of the zone, never to a hung request.
    #[serde(default = "GateConfig::default_store_timeout_secs")]
    pub store_timeout_secs: u64,

    pub keep_alive_secs: Option<u64>,

    pub workers: Option<u64>,

    #[serde(default)]
    pub zones: ZonesConfig,

    #[serde(default)]
    pub identity: IdentityConfig,

    #[serde(default)]
    pub logs: LogsConfig,

    #[serde(skip)]
    pki_dir: PathBuf,
}

impl Default for GateConfig {
    fn default() -> Self {
        GateConfig {
            bind: Self::default_bind(),
            ssl: false,
            session_cookie: Self::default_session_cookie(),
            store_timeout_secs: Self::default_store_timeout_secs(),
            keep_alive_secs: None,
            workers: None,
            zones: ZonesConfig::default(),
            identity: IdentityConfig::default(),
            logs: LogsConfig::default(),
            pki_dir: PathBuf::new(),
        }
    }
}

impl CommonConfig for GateConfig {
    fn complete(&mut self, ps: &PathSet) -> Result<()> {
        if self.bind.is_empty() {
            bail!("bind is required");
        }

        if self.session_cookie.is_empty() {
            bail!("session_cookie is required");
        }

        if self.store_timeout_secs < Self::MIN_STORE_TIMEOUT_SECS
            || self.store_timeout_secs > Self::MAX_STORE_TIMEOUT_SECS
        {
            bail!(
                "store_timeout_secs must be in range [{}, {}]",
                Self::MIN_STORE_TIMEOUT_SECS,
                Self::MAX_STORE_TIMEOUT_SECS
            );
        }

        if let Some(keep_alive_secs) = self.keep_alive_secs {
            if keep_alive_secs == 0 {
                bail!("keep_alive_secs must be greater than 0");
            }
        }

        if let Some(workers) = self.workers {
            if workers == 0 {
                bail!("workers must be greater than 0");
            }
        }

        self.zones.complete(ps).context("zones")?;
        self.identity.complete(ps).context("identity")?;
        self.logs.complete(ps).context("logs")?;

        if self.ssl {
            self.pki_dir = ps.config_dir.join("pki");
            ensure_dir_exists(&self.pki_dir).context("ensure pki dir")?;
        }

        Ok(())
    }
}

impl GateConfig {
    const MIN_STORE_TIMEOUT_SECS: u64 = 1;
    const MAX_STORE_TIMEOUT_SECS: u64 = 60;

    pub fn build_store(&self) -> Result<Arc<dyn IdentityStore>> {
        let store = RestIdentityStore::new(
            &self.identity.url,
            Duration::from_secs(self.store_timeout_secs),
            self.identity.accept_invalid_certs,
        )
        .context("init identity store client")?;
        Ok(Arc::new(store))
    }

    pub fn build_ctx(&self, store: Arc<dyn IdentityStore>) -> Arc<GateContext> {
        Arc::new(GateContext::new(self, store))
    }

    pub fn build_server(&self, ctx: Arc<GateContext>) -> Result<GateServer> {
        let mut srv = GateServer::new(self.bind.clone(), ctx);
        if self.ssl {
            srv.set_ssl(self.build_ssl()?);
        }

        if let Some(keep_alive_secs) = self.keep_alive_secs {
            srv.set_keep_alive_secs(keep_alive_secs);
        }

        if let Some(workers) = self.workers {
            srv.set_workers(workers);
        }

        Ok(srv)
    }

    fn build_ssl(&self) -> Result<SslAcceptorBuilder> {
        let key_path = self.pki_dir.join("key.pem");
        if !key_path.exists() {
            bail!("ssl key file not exists: {:?}", key_path);
        }

        let cert_path = self.pki_dir.join("cert.pem");
        if !cert_path.exists() {
            bail!("ssl cert file not exists: {:?}", cert_path);
        }

        let mut builder =
            SslAcceptor::mozilla_intermediate(SslMethod::tls()).context("init ssl acceptor")?;

        builder
            .set_private_key_file(&key_path, openssl::ssl::SslFiletype::PEM)
            .context("load ssl key file")?;
        builder
            .set_certificate_chain_file(&cert_path)
            .context("load ssl cert file")?;

        Ok(builder)
    }

    fn default_bind() -> String {
        String::from("127.0.0.1:8370")
    }

    fn default_session_cookie() -> String {
        String::from("dashboard_session")
    }

    fn default_store_timeout_secs() -> u64 {
        5
    }
}

/// The zone prefix table. These are startup constants for the whole
/// process, never runtime input.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ZonesConfig {
    #[serde(default = "ZonesConfig::default_admin_api_prefix")]
    pub admin_api_prefix: String,

    #[serde(default = "ZonesConfig::default_customer_api_prefix")]
    pub customer_api_prefix: String,

    #[serde(default = "ZonesConfig::default_api_prefix")]
    pub api_prefix: String,

    /// Page-section prefix reserved for admins; also their landing page.
    #[serde(default = "ZonesConfig::default_admin_section")]
    pub admin_section: String,

    #[serde(default = "ZonesConfig::default_login_path")]
    pub login_path: String,

    /// Non-API paths reachable without a session, matched by prefix. The
    /// root path is always public but only by exact match.
    #[serde(default = "ZonesConfig::default_public_prefixes")]
    pub public_prefixes: Vec<String>,
}

impl Default for ZonesConfig {
    fn default() -> Self {
        ZonesConfig {
            admin_api_prefix: Self::default_admin_api_prefix(),
            customer_api_prefix: Self::default_customer_api_prefix(),
            api_prefix: Self::default_api_prefix(),
            admin_section: Self::default_admin_section(),
            login_path: Self::default_login_path(),
            public_prefixes: Self::default_public_prefixes(),
        }
    }
}

impl CommonConfig for ZonesConfig {
    fn complete(&mut self, _ps: &PathSet) -> Result<()> {
        for (name, value) in [
            ("admin_api_prefix", &self.admin_api_prefix),
            ("customer_api_prefix", &self.customer_api_prefix),
            ("api_prefix", &self.api_prefix),
            ("admin_section", &self.admin_section),
            ("login_path", &self.login_path),
        ] {
            if value.is_empty() {
                bail!("{name} is required");
            }
            if !value.starts_with('/') {
                bail!("{name} must start with '/'");
            }
        }

        if !self.admin_api_prefix.starts_with(&self.api_prefix) {
            bail!("admin_api_prefix must be under api_prefix");
        }
        if !self.customer_api_prefix.starts_with(&self.api_prefix) {
            bail!("customer_api_prefix must be under api_prefix");
        }
        if self.admin_section == "/" {
            bail!("admin_section cannot be the root path");
        }

        for prefix in &self.public_prefixes {
            if prefix.is_empty() || !prefix.starts_with('/') {
                bail!("public prefix {prefix:?} must start with '/'");
            }
        }

        Ok(())
    }
}

impl ZonesConfig {
    pub fn build_rules(&self) -> ZoneRules {
        ZoneRules {
            admin_api_prefix: self.admin_api_prefix.clone(),
            customer_api_prefix: self.customer_api_prefix.clone(),
            api_prefix: self.api_prefix.clone(),
            admin_section: self.admin_section.clone(),
            login_path: self.login_path.clone(),
            public_prefixes: self.public_prefixes.clone(),
        }
    }

    fn default_admin_api_prefix() -> String {
        String::from("/api/admin")
    }

    fn default_customer_api_prefix() -> String {
        String::from("/api/customer")
    }

    fn default_api_prefix() -> String {
        String::from("/api")
    }

    fn default_admin_section() -> String {
        String::from("/admin")
    }

    fn default_login_path() -> String {
        String::from("/")
    }

    fn default_public_prefixes() -> Vec<String> {
        vec![
            String::from("/auth/callback"),
            String::from("/signup"),
            String::from("/password-reset"),
            String::from("/password-change"),
            String::from("/error"),
        ]
    }
}

/// Where and how to reach the hosted identity backend.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct IdentityConfig {
    #[serde(default = "IdentityConfig::default_url")]
    pub url: String,

    #[serde(default)]
    pub accept_invalid_certs: bool,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        IdentityConfig {
            url: Self::default_url(),
            accept_invalid_certs: false,
        }
    }
}

impl CommonConfig for IdentityConfig {
    fn complete(&mut self, _ps: &PathSet) -> Result<()> {
        if self.url.is_empty() {
            bail!("url is required");
        }
        if !self.url.starts_with("http://") && !self.url.starts_with("https://") {
            bail!("url must be an http(s) endpoint");
        }
        Ok(())
    }
}

impl IdentityConfig {
    fn default_url() -> String {
        String::from("http://127.0.0.1:8371")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_path_set() -> PathSet {
        let base = env::temp_dir().join("dashgate-config-tests");
        PathSet {
            config_dir: base.join("config"),
            data_dir: base.join("data"),
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        let mut cfg = GateConfig::default();
        cfg.complete(&test_path_set()).unwrap();
        assert_eq!(cfg.bind, "127.0.0.1:8370");
        assert_eq!(cfg.session_cookie, "dashboard_session");
    }

    #[test]
    fn test_config_from_toml() {
        let cfg: GateConfig = toml::from_str(
            r#"
            bind = "0.0.0.0:9000"
            store_timeout_secs = 2

            [zones]
            admin_section = "/backoffice"

            [identity]
            url = "https://identity.internal:8443"
            "#,
        )
        .unwrap();

        let mut cfg = cfg;
        cfg.complete(&test_path_set()).unwrap();

        assert_eq!(cfg.bind, "0.0.0.0:9000");
        assert_eq!(cfg.store_timeout_secs, 2);
        assert_eq!(cfg.zones.admin_section, "/backoffice");
        // Untouched sections keep their defaults.
        assert_eq!(cfg.zones.api_prefix, "/api");
        assert_eq!(cfg.identity.url, "https://identity.internal:8443");
    }

    #[test]
    fn test_zone_validation() {
        let ps = test_path_set();

        let mut zones = ZonesConfig {
            admin_api_prefix: String::from("admin"),
            ..Default::default()
        };
        assert!(zones.complete(&ps).is_err());

        let mut zones = ZonesConfig {
            admin_api_prefix: String::from("/admin-api"),
            ..Default::default()
        };
        assert!(zones.complete(&ps).is_err(), "must be under api_prefix");

        let mut zones = ZonesConfig {
            admin_section: String::from("/"),
            ..Default::default()
        };
        assert!(zones.complete(&ps).is_err());
    }

    #[test]
    fn test_store_timeout_bounds() {
        let ps = test_path_set();

        let mut cfg = GateConfig {
            store_timeout_secs: 0,
            ..Default::default()
        };
        assert!(cfg.complete(&ps).is_err());

        let mut cfg = GateConfig {
            store_timeout_secs: 3600,
            ..Default::default()
        };
        assert!(cfg.complete(&ps).is_err());
    }
}
