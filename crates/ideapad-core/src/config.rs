//! Sampling and session configuration.
//!
//! A [`SamplingConfig`] is validated once at the boundary and then copied into
//! every session it configures; later changes to the server's default never
//! reach sessions that are already running.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Generation parameters bound to a session at creation time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SamplingConfig {
    /// Model source location (GGUF path or served model name)
    pub model_path: String,

    /// Context window size in tokens (default: 2048)
    pub n_ctx: u32,

    /// Maximum generated tokens per call (default: 512)
    pub max_tokens: u32,

    /// Sampling temperature (default: 0.7)
    pub temperature: f32,

    /// Nucleus sampling probability (default: 0.95)
    pub top_p: f32,

    /// Top-k sampling, 0 disables (default: 40)
    pub top_k: u32,

    /// Repeat penalty (default: 1.1)
    pub repeat_penalty: f32,

    /// Window of recent tokens the repeat penalty looks at (default: 64)
    pub repeat_last_n: u32,

    /// Inference thread count (default: 4)
    pub n_threads: u32,

    /// Predict batch size (default: 512)
    pub n_batch: u32,

    /// Stop sequences (default: newline)
    pub stop: Vec<String>,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            model_path: "models/default.gguf".to_string(),
            n_ctx: 2048,
            max_tokens: 512,
            temperature: 0.7,
            top_p: 0.95,
            top_k: 40,
            repeat_penalty: 1.1,
            repeat_last_n: 64,
            n_threads: 4,
            n_batch: 512,
            stop: vec!["\n".to_string()],
        }
    }
}

impl SamplingConfig {
    /// Create a config for the given model with default sampling
    pub fn new(model_path: impl Into<String>) -> Self {
        Self {
            model_path: model_path.into(),
            ..Default::default()
        }
    }

    /// Copy of this config pointing at a different model
    pub fn with_model(&self, model_path: impl Into<String>) -> Self {
        Self {
            model_path: model_path.into(),
            ..self.clone()
        }
    }

    /// Set the temperature
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Set the maximum generated tokens
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.model_path.trim().is_empty() {
            return Err(ConfigValidationError::MissingModelPath);
        }

        if self.n_ctx == 0 {
            return Err(ConfigValidationError::invalid("n_ctx", "must be greater than 0"));
        }

        if self.max_tokens == 0 {
            return Err(ConfigValidationError::invalid(
                "max_tokens",
                "must be greater than 0",
            ));
        }

        if self.max_tokens > self.n_ctx {
            return Err(ConfigValidationError::invalid(
                "max_tokens",
                format!("must not exceed n_ctx ({})", self.n_ctx),
            ));
        }

        if !self.temperature.is_finite() || self.temperature < 0.0 {
            return Err(ConfigValidationError::invalid(
                "temperature",
                "must be a non-negative number",
            ));
        }

        if !(self.top_p > 0.0 && self.top_p <= 1.0) {
            return Err(ConfigValidationError::invalid("top_p", "must be in (0, 1]"));
        }

        if !self.repeat_penalty.is_finite() || self.repeat_penalty <= 0.0 {
            return Err(ConfigValidationError::invalid(
                "repeat_penalty",
                "must be greater than 0",
            ));
        }

        if self.n_threads == 0 {
            return Err(ConfigValidationError::invalid(
                "n_threads",
                "must be greater than 0",
            ));
        }

        if self.n_batch == 0 {
            return Err(ConfigValidationError::invalid("n_batch", "must be greater than 0"));
        }

        Ok(())
    }
}

/// Per-request adjustments layered over a base [`SamplingConfig`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SamplingOverrides {
    pub model_path: Option<String>,
    pub n_ctx: Option<u32>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub top_k: Option<u32>,
    pub repeat_penalty: Option<f32>,
    pub repeat_last_n: Option<u32>,
    pub n_threads: Option<u32>,
    pub n_batch: Option<u32>,
    pub stop: Option<Vec<String>>,
}

impl SamplingOverrides {
    /// Merge onto `base` and validate the result
    pub fn apply(&self, base: &SamplingConfig) -> Result<SamplingConfig, ConfigValidationError> {
        let mut config = base.clone();
        if let Some(ref model_path) = self.model_path {
            config.model_path = model_path.clone();
        }
        if let Some(n_ctx) = self.n_ctx {
            config.n_ctx = n_ctx;
        }
        if let Some(max_tokens) = self.max_tokens {
            config.max_tokens = max_tokens;
        }
        if let Some(temperature) = self.temperature {
            config.temperature = temperature;
        }
        if let Some(top_p) = self.top_p {
            config.top_p = top_p;
        }
        if let Some(top_k) = self.top_k {
            config.top_k = top_k;
        }
        if let Some(repeat_penalty) = self.repeat_penalty {
            config.repeat_penalty = repeat_penalty;
        }
        if let Some(repeat_last_n) = self.repeat_last_n {
            config.repeat_last_n = repeat_last_n;
        }
        if let Some(n_threads) = self.n_threads {
            config.n_threads = n_threads;
        }
        if let Some(n_batch) = self.n_batch {
            config.n_batch = n_batch;
        }
        if let Some(ref stop) = self.stop {
            config.stop = stop.clone();
        }
        config.validate()?;
        Ok(config)
    }
}

/// Session behavior shared by every conversation
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Throwaway prompt sent once at session creation (default: "Warm up")
    pub warm_up_prompt: String,

    /// Upper bound on a single generate call (default: 120s)
    pub generate_timeout: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            warm_up_prompt: "Warm up".to_string(),
            generate_timeout: Duration::from_secs(120),
        }
    }
}

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("model_path is required")]
    MissingModelPath,

    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

impl ConfigValidationError {
    fn invalid(field: &str, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.to_string(),
            message: message.into(),
        }
    }
}
