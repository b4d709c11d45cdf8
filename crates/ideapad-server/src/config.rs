//! Server configuration.

use anyhow::Context;
use ideapad_core::{SamplingConfig, SessionOptions};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Server configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// File the configuration was read from, if any
    #[serde(skip)]
    pub config_path: Option<PathBuf>,
    /// Listen address
    pub bind: BindAddr,
    pub backend: BackendConfig,
    /// Default sampling configuration for new conversations
    pub sampling: SamplingConfig,
    pub session: SessionConfig,
}

/// Listen address, `127.0.0.1:8000` unless configured
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BindAddr(pub String);

impl Default for BindAddr {
    fn default() -> Self {
        Self("127.0.0.1:8000".to_string())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// OpenAI-compatible completion server
    #[default]
    Http,
    /// Offline echo backend
    Stub,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BackendConfig {
    pub kind: BackendKind,
    pub base_url: String,
    pub api_key: Option<String>,
    pub request_timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: BackendKind::default(),
            base_url: "http://127.0.0.1:8080".to_string(),
            api_key: None,
            request_timeout_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
    pub warm_up_prompt: String,
    pub generate_timeout_secs: u64,
    /// Conversations idle this long are ended; unset disables reaping
    pub idle_timeout_secs: Option<u64>,
    pub reap_interval_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        let options = SessionOptions::default();
        Self {
            warm_up_prompt: options.warm_up_prompt,
            generate_timeout_secs: options.generate_timeout.as_secs(),
            idle_timeout_secs: None,
            reap_interval_secs: 60,
        }
    }
}

impl SessionConfig {
    pub fn options(&self) -> SessionOptions {
        SessionOptions {
            warm_up_prompt: self.warm_up_prompt.clone(),
            generate_timeout: Duration::from_secs(self.generate_timeout_secs),
        }
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout_secs.map(Duration::from_secs)
    }

    pub fn reap_interval(&self) -> Duration {
        Duration::from_secs(self.reap_interval_secs)
    }
}

impl Config {
    /// Default location of the configuration file
    ///
    /// ```text
    /// ~/.ideapad/
    /// └── config.toml
    /// ```
    pub fn default_path() -> PathBuf {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        home.join(".ideapad").join("config.toml")
    }

    /// Load configuration.
    ///
    /// An explicit path must exist. Without one, `~/.ideapad/config.toml` is
    /// used when present and built-in defaults otherwise.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => {
                let path = Self::default_path();
                if path.is_file() {
                    Self::from_file(&path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    fn from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let mut config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.config_path = Some(path.to_path_buf());
        Ok(config)
    }

    /// Apply command-line overrides
    pub fn with_overrides(mut self, bind: Option<String>, model_path: Option<String>) -> Self {
        if let Some(bind) = bind {
            self.bind = BindAddr(bind);
        }
        if let Some(model_path) = model_path {
            self.sampling.model_path = model_path;
        }
        self
    }

    /// Reject configurations the server cannot start with
    pub fn validate(&self) -> anyhow::Result<()> {
        self.bind_addr()?;
        self.sampling
            .validate()
            .context("Invalid [sampling] configuration")?;

        if self.session.warm_up_prompt.trim().is_empty() {
            anyhow::bail!("session.warm_up_prompt must not be empty");
        }
        if self.session.generate_timeout_secs == 0 {
            anyhow::bail!("session.generate_timeout_secs must be at least 1");
        }
        if self.session.idle_timeout_secs.is_some() && self.session.reap_interval_secs == 0 {
            anyhow::bail!("session.reap_interval_secs must be at least 1 when idle_timeout_secs is set");
        }
        if self.backend.kind == BackendKind::Http {
            if !self.backend.base_url.starts_with("http://")
                && !self.backend.base_url.starts_with("https://")
            {
                anyhow::bail!("backend.base_url must be an http(s) URL");
            }
            if self.backend.request_timeout_secs == 0 {
                anyhow::bail!("backend.request_timeout_secs must be at least 1");
            }
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> anyhow::Result<SocketAddr> {
        self.bind
            .0
            .parse()
            .with_context(|| format!("Invalid bind address {:?}", self.bind.0))
    }
}
