//! HTTP chat backends: Ollama, OpenAI-compatible servers and Anthropic.

use std::sync::Arc;
use std::time::Duration;

use llmbench_backend::BackendRegistry;
use llmbench_common::config::BenchConfig;
use llmbench_common::{BenchError, Result};

mod anthropic;
mod ollama;
mod openai;
mod stream;

pub use anthropic::AnthropicBackend;
pub use ollama::OllamaBackend;
pub use openai::OpenAiBackend;

pub fn build_client(connect_timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .connect_timeout(connect_timeout)
        .tcp_nodelay(true)
        .build()
        .map_err(|e| BenchError::Config(format!("building http client: {e}")))
}

/// Ollama is always present and is the default; the hosted APIs only when configured.
pub fn registry_from_config(cfg: &BenchConfig) -> Result<BackendRegistry> {
    let client = build_client(cfg.connect_timeout())?;
    let mut registry = BackendRegistry::new();
    registry.register(Arc::new(OllamaBackend::new(client.clone(), &cfg.ollama.base_url)));
    if cfg.openai.is_enabled() {
        let base = cfg.openai.base_url.as_deref().unwrap_or(openai::DEFAULT_BASE_URL);
        registry.register(Arc::new(OpenAiBackend::new(client.clone(), base, cfg.openai.api_key.clone())));
    }
    if cfg.anthropic.is_enabled() {
        let key = cfg.anthropic.api_key.clone().unwrap_or_default();
        let base = cfg.anthropic.base_url.as_deref().unwrap_or(anthropic::DEFAULT_BASE_URL);
        let mut backend = AnthropicBackend::new(client, base, key);
        if let Some(v) = &cfg.anthropic.version { backend = backend.with_version(v); }
        registry.register(Arc::new(backend));
    }
    tracing::info!(target: "backend", providers = ?registry.providers(), "backends registered");
    Ok(registry)
}

pub(crate) fn http_error(e: reqwest::Error) -> BenchError {
    if e.is_connect() {
        BenchError::Http(format!("connection failed: {e}"))
    } else {
        BenchError::Http(e.to_string())
    }
}

/// Turns a non-2xx response into `BenchError::Status` carrying the body text.
pub(crate) async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(BenchError::Status { status: status.as_u16(), body })
}

pub(crate) fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}
