//! OpenAI-compatible completion backend.
//!
//! Talks to any server exposing `GET /v1/models` and `POST /v1/completions`
//! (llama.cpp server, Ollama, vLLM). Loading a model means confirming the
//! server serves it; the handle then names the served model in requests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

use super::{EngineHandle, HandleTable, InferenceBackend, parse_completion};
use crate::config::SamplingConfig;
use crate::error::{Error, Result};

/// Connection settings for [`HttpBackend`]
#[derive(Debug, Clone)]
pub struct HttpBackendConfig {
    /// Server root, e.g. `http://127.0.0.1:8080`
    pub base_url: String,
    /// Bearer token, if the server wants one
    pub api_key: Option<String>,
    /// Per-request timeout
    pub request_timeout: Duration,
}

impl Default for HttpBackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080".to_string(),
            api_key: None,
            request_timeout: Duration::from_secs(300),
        }
    }
}

/// Backend for an OpenAI-compatible completion server
#[derive(Debug)]
pub struct HttpBackend {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
    handles: HandleTable,
}

#[derive(Debug, Deserialize)]
struct ModelList {
    #[serde(default)]
    data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: String,
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    max_tokens: u32,
    temperature: f32,
    top_p: f32,
    top_k: u32,
    repeat_penalty: f32,
    repeat_last_n: u32,
    n_threads: u32,
    n_batch: u32,
    stop: &'a [String],
    stream: bool,
}

impl<'a> CompletionRequest<'a> {
    fn new(model: &'a str, prompt: &'a str, params: &'a SamplingConfig) -> Self {
        Self {
            model,
            prompt,
            max_tokens: params.max_tokens,
            temperature: params.temperature,
            top_p: params.top_p,
            top_k: params.top_k,
            repeat_penalty: params.repeat_penalty,
            repeat_last_n: params.repeat_last_n,
            n_threads: params.n_threads,
            n_batch: params.n_batch,
            stop: &params.stop,
            stream: false,
        }
    }
}

/// Find the served model matching a configured source.
///
/// Accepts an exact id, or a path whose file name or stem is the id.
fn match_served_model<'a>(model_source: &str, served: &'a [ModelEntry]) -> Option<&'a str> {
    let path = Path::new(model_source);
    let file_name = path.file_name().and_then(|s| s.to_str());
    let stem = path.file_stem().and_then(|s| s.to_str());

    served
        .iter()
        .map(|m| m.id.as_str())
        .find(|id| {
            *id == model_source
                || Some(*id) == file_name
                || Some(*id) == stem
                || Path::new(id).file_name().and_then(|s| s.to_str()) == file_name
        })
}

impl HttpBackend {
    /// Create a backend for the given server
    pub fn new(config: HttpBackendConfig) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key,
            client,
            handles: HandleTable::default(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        debug!("Engine request: {} {}", method, url);

        let mut req = self.client.request(method, &url);
        if let Some(ref key) = self.api_key {
            req = req.bearer_auth(key);
        }
        req
    }
}

#[async_trait]
impl InferenceBackend for HttpBackend {
    fn name(&self) -> &str {
        "http"
    }

    async fn load(&self, model_source: &str, context_size: u32) -> Result<EngineHandle> {
        if context_size == 0 {
            return Err(Error::engine_init(model_source, "context size must be positive"));
        }

        let resp = self
            .request(reqwest::Method::GET, "/v1/models")
            .send()
            .await
            .map_err(|e| Error::engine_init(model_source, format!("server unreachable: {}", e)))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(Error::engine_init(
                model_source,
                format!("model listing returned {}", status),
            ));
        }

        let listing: ModelList = resp
            .json()
            .await
            .map_err(|e| Error::engine_init(model_source, format!("bad model listing: {}", e)))?;

        let served = match_served_model(model_source, &listing.data).ok_or_else(|| {
            Error::engine_init(model_source, "model is not served by the backend")
        })?;

        Ok(self.handles.acquire(served, context_size).await)
    }

    async fn complete(
        &self,
        handle: &EngineHandle,
        prompt: &str,
        params: &SamplingConfig,
    ) -> Result<String> {
        if !self.handles.is_live(handle).await {
            return Err(Error::engine_inference(format!(
                "handle {} is not loaded",
                handle.id()
            )));
        }

        let body = CompletionRequest::new(handle.model(), prompt, params);
        let resp = self
            .request(reqwest::Method::POST, "/v1/completions")
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::engine_inference(format!("request failed: {}", e)))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(Error::engine_inference(format!("backend error {}: {}", status, text)));
        }

        let value: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| Error::invalid_response(format!("body is not JSON: {}", e)))?;

        parse_completion(&value)
    }

    async fn release(&self, handle: &EngineHandle) -> Result<()> {
        self.handles.release(handle).await
    }
}
