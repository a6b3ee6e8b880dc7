// jmap-engine/src/config.rs
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use url::Url;

use crate::http::RequestContext;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
    /// Well-known session endpoint, e.g. `https://mail.example.org/.well-known/jmap`
    pub session_url: String,
    /// Master user for impersonating end users; bearer auth is used when unset
    #[serde(default)]
    pub master_user: Option<String>,
    #[serde(default)]
    pub master_password: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Seconds; 0 disables the per-call deadline
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,
    #[serde(default)]
    pub default_language: Option<String>,
    #[serde(default)]
    pub session_cache: SessionCacheConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SessionCacheConfig {
    #[serde(default = "default_ttl")]
    pub ttl: u64,
    #[serde(default)]
    pub failure_ttl: u64,
    #[serde(default = "default_max_capacity")]
    pub max_capacity: usize,
    #[serde(default = "default_reap_interval")]
    pub reap_interval: u64,
}

impl Default for SessionCacheConfig {
    fn default() -> Self {
        Self {
            ttl: default_ttl(),
            failure_ttl: 0,
            max_capacity: default_max_capacity(),
            reap_interval: default_reap_interval(),
        }
    }
}

fn default_user_agent() -> String {
    concat!("jmap-engine/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_ttl() -> u64 {
    300
}

fn default_max_capacity() -> usize {
    1024
}

fn default_reap_interval() -> u64 {
    60
}

impl SessionCacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl)
    }

    pub fn failure_ttl(&self) -> Duration {
        Duration::from_secs(self.failure_ttl)
    }

    pub fn reap_interval(&self) -> Duration {
        Duration::from_secs(self.reap_interval)
    }
}

impl EngineConfig {
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: EngineConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Cannot read config file {}", path.display()))?;
        Self::from_toml(&content)
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    fn validate(&self) -> Result<()> {
        Url::parse(&self.session_url)
            .map_err(|e| anyhow!("Invalid session_url '{}': {}", self.session_url, e))?;
        if self.master_user.is_some() != self.master_password.is_some() {
            return Err(anyhow!(
                "master_user and master_password must be set together"
            ));
        }
        if self.session_cache.ttl == 0 {
            return Err(anyhow!("session_cache.ttl must be greater than zero"));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout > 0).then(|| Duration::from_secs(self.request_timeout))
    }

    /// A fresh per-call context carrying the configured deadline and language
    pub fn context(&self) -> RequestContext {
        let mut ctx = RequestContext::new();
        if let Some(timeout) = self.request_timeout() {
            ctx = ctx.with_timeout(timeout);
        }
        if let Some(language) = &self.default_language {
            ctx = ctx.with_accept_language(language.clone());
        }
        ctx
    }

    /// Transport configured with the credentials and user agent from this config
    #[cfg(feature = "reqwest")]
    pub fn http_client(&self) -> crate::http::ReqwestClient {
        let client = crate::http::ReqwestClient::new().with_user_agent(self.user_agent.clone());
        match (&self.master_user, &self.master_password, &self.token) {
            (Some(user), Some(password), _) => {
                client.with_master_credentials(user.clone(), password.clone())
            }
            (_, _, Some(token)) => client.with_token(token.clone()),
            _ => client,
        }
    }

    /// Engine client over the configured transport; session fetches share the request deadline
    #[cfg(feature = "reqwest")]
    pub fn jmap_client(&self) -> crate::client::JmapClient<crate::http::ReqwestClient> {
        let client = crate::client::JmapClient::new(self.http_client(), self.session_url.clone());
        match self.request_timeout() {
            Some(timeout) => client.with_session_timeout(timeout),
            None => client,
        }
    }
}
