use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::{BenchError, Result};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BenchConfig {
    pub bind: String,
    pub store_path: PathBuf,
    pub default_models: Vec<String>,
    pub request_timeout_secs: Option<u64>,
    pub connect_timeout_secs: u64,
    pub capture_system_info: bool,
    pub sampling: SamplingConfig,
    pub ollama: OllamaConfig,
    pub openai: OpenAiConfig,
    pub anthropic: AnthropicConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    pub enabled: bool,
    pub interval_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OllamaConfig {
    pub base_url: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct OpenAiConfig {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AnthropicConfig {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub version: Option<String>,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8000".into(),
            store_path: PathBuf::from("data/benchmarks.jsonl"),
            default_models: vec!["wizardlm2".into(), "nemotron-mini".into(), "llama3.2".into()],
            request_timeout_secs: Some(300),
            connect_timeout_secs: 10,
            capture_system_info: true,
            sampling: SamplingConfig::default(),
            ollama: OllamaConfig::default(),
            openai: OpenAiConfig::default(),
            anthropic: AnthropicConfig::default(),
        }
    }
}

impl Default for SamplingConfig {
    fn default() -> Self { Self { enabled: true, interval_ms: 250 } }
}

impl Default for OllamaConfig {
    fn default() -> Self { Self { base_url: "http://localhost:11434".into() } }
}

impl OpenAiConfig {
    /// Registered when pointed at a server or given a key.
    pub fn is_enabled(&self) -> bool { self.api_key.is_some() || self.base_url.is_some() }
}

impl AnthropicConfig {
    pub fn is_enabled(&self) -> bool { self.api_key.is_some() }
}

impl SamplingConfig {
    pub fn interval(&self) -> Duration { Duration::from_millis(self.interval_ms) }
}

impl BenchConfig {
    /// Defaults, then the YAML file named by `LLMBENCH_CONFIG`, then environment overrides.
    pub fn load() -> Result<Self> {
        let mut cfg = match env::var("LLMBENCH_CONFIG") {
            Ok(path) => {
                let text = std::fs::read_to_string(&path)
                    .map_err(|e| BenchError::Config(format!("reading {path}: {e}")))?;
                Self::from_yaml_str(&text)?
            }
            Err(_) => Self::default(),
        };
        cfg.apply_overrides(|key| env::var(key).ok());
        Ok(cfg)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self> {
        serde_yaml::from_str(text).map_err(|e| BenchError::Config(e.to_string()))
    }

    pub fn apply_overrides<F: Fn(&str) -> Option<String>>(&mut self, lookup: F) {
        if let Some(v) = lookup("LLMBENCH_BIND") { self.bind = v; }
        if let Some(v) = lookup("LLMBENCH_STORE_PATH") { self.store_path = PathBuf::from(v); }
        if let Some(v) = lookup("LLMBENCH_MODELS") {
            let models: Vec<String> = v.split(',').map(str::trim).filter(|m| !m.is_empty()).map(String::from).collect();
            if !models.is_empty() { self.default_models = models; }
        }
        if let Some(v) = lookup("LLMBENCH_REQUEST_TIMEOUT_SECS").and_then(|v| v.parse::<u64>().ok()) {
            self.request_timeout_secs = if v == 0 { None } else { Some(v) };
        }
        if let Some(v) = lookup("LLMBENCH_SAMPLE_INTERVAL_MS").and_then(|v| v.parse().ok()) { self.sampling.interval_ms = v; }
        if let Some(v) = lookup("LLMBENCH_SAMPLING") { self.sampling.enabled = !matches!(v.as_str(), "0" | "false" | "off"); }
        if let Some(v) = lookup("OLLAMA_HOST") { self.ollama.base_url = normalize_host(&v); }
        if let Some(v) = lookup("OPENAI_API_KEY") { self.openai.api_key = Some(v); }
        if let Some(v) = lookup("OPENAI_BASE_URL") { self.openai.base_url = Some(v); }
        if let Some(v) = lookup("ANTHROPIC_API_KEY") { self.anthropic.api_key = Some(v); }
        if let Some(v) = lookup("ANTHROPIC_BASE_URL") { self.anthropic.base_url = Some(v); }
    }

    pub fn request_timeout(&self) -> Option<Duration> { self.request_timeout_secs.map(Duration::from_secs) }

    pub fn connect_timeout(&self) -> Duration { Duration::from_secs(self.connect_timeout_secs) }
}

// OLLAMA_HOST is commonly given as bare host:port.
fn normalize_host(v: &str) -> String {
    let v = v.trim_end_matches('/');
    if v.starts_with("http://") || v.starts_with("https://") { v.to_string() } else { format!("http://{v}") }
}
