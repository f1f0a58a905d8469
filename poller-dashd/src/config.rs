use std::path::Path;
use std::time::Duration;
use anyhow::{bail, Context, Result};
use poller_client::{EngineConfig, ReconnectPolicy, SubscriberConfig};
use serde::Deserialize;
use shared::protocol::{EVENTBUS_WS_PATH, STATUS_ADDRESS};
use url::Url;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub registry: RegistryConfig,
    #[serde(default)]
    pub push: PushConfig,
    #[serde(default)]
    pub engine: EngineSection,
    #[serde(default)]
    pub api: ApiConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegistryConfig {
    /// Base URL of the registry, e.g. "http://localhost:8090/"
    pub base_url: String,
    /// Per-request timeout; none by default
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PushConfig {
    /// Websocket endpoint of the event-bus bridge. Derived from the registry
    /// base URL when absent.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_address")]
    pub address: String,
    #[serde(default = "default_ping_interval")]
    pub ping_interval_secs: u64,
    #[serde(default)]
    pub reconnect: ReconnectPolicy,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EngineSection {
    #[serde(default = "default_resync_retries")]
    pub resync_retries: u32,
    #[serde(default = "default_resync_retry_delay")]
    pub resync_retry_delay_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
}

fn default_address() -> String {
    STATUS_ADDRESS.to_string()
}

fn default_ping_interval() -> u64 {
    5
}

fn default_resync_retries() -> u32 {
    2
}

fn default_resync_retry_delay() -> u64 {
    500
}

fn default_listen() -> String {
    "127.0.0.1:8091".to_string()
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            url: None,
            address: default_address(),
            ping_interval_secs: default_ping_interval(),
            reconnect: ReconnectPolicy::default(),
        }
    }
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            resync_retries: default_resync_retries(),
            resync_retry_delay_ms: default_resync_retry_delay(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        self.registry_url()?;
        self.push_url()?;

        let policy = &self.push.reconnect;
        if policy.min_delay_ms == 0 {
            bail!("push.reconnect.min_delay_ms must be positive");
        }
        if policy.min_delay_ms > policy.max_delay_ms {
            bail!(
                "push.reconnect.min_delay_ms ({}) exceeds max_delay_ms ({})",
                policy.min_delay_ms,
                policy.max_delay_ms
            );
        }
        if !(0.0..=1.0).contains(&policy.jitter) {
            bail!("push.reconnect.jitter must be within 0.0..=1.0, got {}", policy.jitter);
        }
        if policy.exponent < 1.0 {
            bail!("push.reconnect.exponent must be at least 1.0, got {}", policy.exponent);
        }
        if self.push.ping_interval_secs == 0 {
            bail!("push.ping_interval_secs must be positive");
        }
        Ok(())
    }

    pub fn registry_url(&self) -> Result<Url> {
        Url::parse(&self.registry.base_url)
            .with_context(|| format!("Invalid registry.base_url: {}", self.registry.base_url))
    }

    /// Configured push URL, or the bridge endpoint next to the registry with
    /// the scheme switched to ws/wss.
    pub fn push_url(&self) -> Result<Url> {
        if let Some(url) = &self.push.url {
            return Url::parse(url).with_context(|| format!("Invalid push.url: {url}"));
        }

        let mut base = self.registry_url()?;
        let scheme = match base.scheme() {
            "https" => "wss",
            _ => "ws",
        };
        base.set_scheme(scheme)
            .map_err(|_| anyhow::anyhow!("Cannot derive push URL from {}", self.registry.base_url))?;
        if !base.path().ends_with('/') {
            let with_slash = format!("{}/", base.path());
            base.set_path(&with_slash);
        }
        base.join(EVENTBUS_WS_PATH)
            .context("Failed to derive push URL from registry.base_url")
    }

    pub fn registry_timeout(&self) -> Option<Duration> {
        self.registry.timeout_secs.map(Duration::from_secs)
    }

    pub fn subscriber_config(&self) -> SubscriberConfig {
        SubscriberConfig {
            address: self.push.address.clone(),
            reconnect: self.push.reconnect.clone(),
            ping_interval: Duration::from_secs(self.push.ping_interval_secs),
        }
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            resync_retries: self.engine.resync_retries,
            resync_retry_delay: Duration::from_millis(self.engine.resync_retry_delay_ms),
        }
    }
}
