//! Adapter configuration: where the store lives and which list key holds the policy.
//! Values come from defaults, a JSON document, or `POLICY_ADAPTER_*` environment variables.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AdapterError, Result};

pub const DEFAULT_POLICY_KEY: &str = "casbin:policy";

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct AdapterConfig {
    /// Full connection descriptor; when set, the individual connection fields are ignored.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "AdapterConfig::default_host")]
    pub host: String,
    #[serde(default = "AdapterConfig::default_port")]
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub database: i64,
    #[serde(default)]
    pub tls: bool,
    #[serde(default = "AdapterConfig::default_policy_key")]
    pub policy_key: String,
}

impl AdapterConfig {
    fn default_host() -> String { "127.0.0.1".to_string() }
    fn default_port() -> u16 { 6379 }
    fn default_policy_key() -> String { DEFAULT_POLICY_KEY.to_string() }

    /// Defaults overlaid with any `POLICY_ADAPTER_*` variables present in the environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`AdapterConfig::from_env`] but reads variables through `lookup`.
    pub fn from_lookup<F: Fn(&str) -> Option<String>>(lookup: F) -> Result<Self> {
        let mut cfg = Self::default();
        if let Some(v) = lookup("POLICY_ADAPTER_URL") { cfg.url = Some(v); }
        if let Some(v) = lookup("POLICY_ADAPTER_HOST") { cfg.host = v; }
        if let Some(v) = lookup("POLICY_ADAPTER_PORT") {
            cfg.port = v.parse().map_err(|_| AdapterError::config(format!("POLICY_ADAPTER_PORT is not a port: {:?}", v)))?;
        }
        if let Some(v) = lookup("POLICY_ADAPTER_DB") {
            cfg.database = v.parse().map_err(|_| AdapterError::config(format!("POLICY_ADAPTER_DB is not a database index: {:?}", v)))?;
        }
        if let Some(v) = lookup("POLICY_ADAPTER_USERNAME") { cfg.username = Some(v); }
        if let Some(v) = lookup("POLICY_ADAPTER_PASSWORD") { cfg.password = Some(v); }
        if let Some(v) = lookup("POLICY_ADAPTER_TLS") {
            cfg.tls = matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on");
        }
        if let Some(v) = lookup("POLICY_ADAPTER_KEY") { cfg.policy_key = v; }
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)
            .map_err(|e| AdapterError::config(format!("cannot read {}: {}", path.display(), e)))?;
        let cfg: Self = serde_json::from_slice(&bytes)
            .map_err(|e| AdapterError::config(format!("cannot parse {}: {}", path.display(), e)))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.policy_key.is_empty() { return Err(AdapterError::config("policy_key must not be empty")); }
        Ok(())
    }

    /// Connection descriptor: `redis[s]://[user][:password@]host:port/db`.
    pub fn connection_url(&self) -> String {
        if let Some(url) = &self.url { return url.clone(); }
        let scheme = if self.tls { "rediss" } else { "redis" };
        let mut url = format!("{}://", scheme);
        match (&self.username, &self.password) {
            (Some(u), Some(p)) => url.push_str(&format!("{}:{}@", urlencoding::encode(u), urlencoding::encode(p))),
            (Some(u), None) => url.push_str(&format!("{}@", urlencoding::encode(u))),
            (None, Some(p)) => url.push_str(&format!(":{}@", urlencoding::encode(p))),
            (None, None) => {}
        }
        // IPv6 literals need brackets to keep their colons apart from the port
        if self.host.contains(':') && !self.host.starts_with('[') {
            url.push_str(&format!("[{}]", self.host));
        } else {
            url.push_str(&self.host);
        }
        url.push_str(&format!(":{}/{}", self.port, self.database));
        url
    }
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            url: None,
            host: Self::default_host(),
            port: Self::default_port(),
            username: None,
            password: None,
            database: 0,
            tls: false,
            policy_key: Self::default_policy_key(),
        }
    }
}
