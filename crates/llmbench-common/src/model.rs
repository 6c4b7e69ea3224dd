//! Records produced by a benchmark run and the request that starts one.

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingMode {
    #[default]
    Parallel,
    Sequential,
}

impl std::fmt::Display for ProcessingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProcessingMode::Parallel => f.pad("parallel"),
            ProcessingMode::Sequential => f.pad("sequential"),
        }
    }
}

fn default_stream() -> bool { true }

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// System prompt sent ahead of the user message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    #[serde(default = "default_stream")]
    pub stream: bool,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self { temperature: None, top_p: None, max_tokens: None, system: None, stream: true }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BenchmarkRequest {
    pub prompt: String,
    #[serde(default)]
    pub models: Vec<String>,
    #[serde(default)]
    pub parameters: GenerationParams,
    #[serde(default)]
    pub mode: ProcessingMode,
    /// Older clients send a boolean instead of `mode`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parallel_processing: Option<bool>,
}

impl BenchmarkRequest {
    pub fn new(prompt: impl Into<String>, models: Vec<String>) -> Self {
        Self { prompt: prompt.into(), models, ..Self::default() }
    }

    pub fn with_mode(mut self, mode: ProcessingMode) -> Self {
        self.mode = mode;
        self.parallel_processing = None;
        self
    }

    pub fn effective_mode(&self) -> ProcessingMode {
        match self.parallel_processing {
            Some(true) => ProcessingMode::Parallel,
            Some(false) => ProcessingMode::Sequential,
            None => self.mode,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_tokens: Option<u64>,
}

impl TokenUsage {
    /// Later reports win field by field; backends split usage across frames.
    pub fn merge(&mut self, other: TokenUsage) {
        if other.prompt_tokens.is_some() { self.prompt_tokens = other.prompt_tokens; }
        if other.output_tokens.is_some() { self.output_tokens = other.output_tokens; }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Timing {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_to_first_token: Option<f64>,
    pub total_time: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Throughput {
    pub total_chunks: u64,
    pub total_bytes: u64,
    pub average_chunk_size: f64,
    pub bytes_per_second: f64,
    pub chunks_per_second: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens_per_second: Option<f64>,
}

impl Throughput {
    /// Derives rates from raw counters. Output tokens are divided by the
    /// generation window (total minus time to first token) when it is known.
    pub fn compute(chunks: u64, bytes: u64, total_time: f64, ttft: Option<f64>, usage: TokenUsage) -> Self {
        let per_sec = |n: f64, secs: f64| if secs > 0.0 { n / secs } else { 0.0 };
        let generation = ttft.map(|t| total_time - t).filter(|g| *g > 0.0).unwrap_or(total_time);
        Self {
            total_chunks: chunks,
            total_bytes: bytes,
            average_chunk_size: if chunks > 0 { bytes as f64 / chunks as f64 } else { 0.0 },
            bytes_per_second: per_sec(bytes as f64, total_time),
            chunks_per_second: per_sec(chunks as f64, total_time),
            prompt_tokens: usage.prompt_tokens,
            output_tokens: usage.output_tokens,
            tokens_per_second: usage.output_tokens.map(|n| per_sec(n as f64, generation)),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GpuUsage {
    pub utilization_avg: f32,
    pub utilization_peak: f32,
    pub memory_delta_bytes: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceUsage {
    pub samples: usize,
    pub cpu_percent_avg: f32,
    pub cpu_percent_peak: f32,
    /// Per-core change between the first and the last sample.
    pub cpu_delta: Vec<f32>,
    pub memory_start_bytes: u64,
    pub memory_end_bytes: u64,
    pub memory_peak_bytes: u64,
    pub memory_delta_bytes: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpu: Option<GpuUsage>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelResult {
    pub model: String,
    pub provider: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timing: Timing,
    pub throughput: Throughput,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_usage: Option<ResourceUsage>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GpuInfo {
    pub index: u32,
    pub name: String,
    pub utilization_percent: Option<f32>,
    pub memory_total_bytes: Option<u64>,
    pub memory_used_bytes: Option<u64>,
    pub temperature_celsius: Option<f32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemInfo {
    pub os: String,
    pub os_version: String,
    pub kernel: String,
    pub host_name: String,
    pub cpu_brand: String,
    pub logical_cores: usize,
    pub cpu_frequency_mhz: u64,
    pub memory_total_bytes: u64,
    pub memory_available_bytes: u64,
    pub memory_used_bytes: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpu: Option<Vec<GpuInfo>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkRun {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub prompt: String,
    pub models: Vec<String>,
    pub mode: ProcessingMode,
    #[serde(default)]
    pub parameters: GenerationParams,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_info: Option<SystemInfo>,
    /// Seconds from the first request to the last result.
    pub wall_time: f64,
    pub results: Vec<ModelResult>,
}

impl BenchmarkRun {
    pub fn succeeded(&self) -> usize { self.results.iter().filter(|r| r.success).count() }
    pub fn failed(&self) -> usize { self.results.len() - self.succeeded() }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub prompt: String,
    pub models: Vec<String>,
    pub mode: ProcessingMode,
    pub succeeded: usize,
    pub failed: usize,
}

impl From<&BenchmarkRun> for RunSummary {
    fn from(run: &BenchmarkRun) -> Self {
        Self {
            id: run.id.clone(),
            timestamp: run.timestamp,
            prompt: run.prompt.clone(),
            models: run.models.clone(),
            mode: run.mode,
            succeeded: run.succeeded(),
            failed: run.failed(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ProgressEvent {
    Starting { model: String },
    FirstToken { model: String, time_to_first_token: f64 },
    Generating {
        model: String,
        chunk: String,
        chunks_received: u64,
        total_bytes: u64,
        time_elapsed: f64,
        chunks_per_second: f64,
    },
    Completed { model: String, total_time: f64, total_chunks: u64, total_bytes: u64 },
    Error { model: String, error: String, time_elapsed: f64 },
    RunFinished,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub run_id: String,
    #[serde(flatten)]
    pub event: ProgressEvent,
}

/// Models one provider offers, or why they could not be listed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderModels {
    pub provider: String,
    #[serde(default)]
    pub models: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// `YYYYMMDD_HHMMSS_xxxx`: the start time plus a random suffix.
pub fn new_run_id(at: DateTime<Utc>) -> String {
    let suffix: u16 = rand::thread_rng().gen();
    format!("{}_{:04x}", at.format("%Y%m%d_%H%M%S"), suffix)
}
