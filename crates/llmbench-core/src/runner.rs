use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use llmbench_backend::{BackendRegistry, StreamEvent};
use llmbench_common::config::BenchConfig;
use llmbench_common::model::{
    new_run_id, BenchmarkRequest, BenchmarkRun, GenerationParams, ModelResult, ProcessingMode, ProgressEvent,
    ProgressUpdate, ProviderModels, Throughput, Timing, TokenUsage,
};
use llmbench_common::{BenchError, Result};
use tokio::sync::broadcast;
use tokio::time::Instant;
use tokio_stream::StreamExt as _;

use crate::sampler::{ResourceProbe, ResourceSampler};

pub type ProbeFactory = Arc<dyn Fn() -> Box<dyn ResourceProbe> + Send + Sync>;

const DEFAULT_SAMPLE_INTERVAL: Duration = Duration::from_millis(250);

/// Counters for one model attempt. Lives outside the request future so a
/// timeout still reports what arrived before it.
#[derive(Debug, Default)]
struct Attempt {
    first_token: Option<f64>,
    chunks: u64,
    bytes: u64,
    text: String,
    usage: TokenUsage,
}

pub struct BenchmarkRunner {
    backends: BackendRegistry,
    default_models: Vec<String>,
    sample_interval: Option<Duration>,
    request_timeout: Option<Duration>,
    capture_system_info: bool,
    probe_factory: ProbeFactory,
    progress: Option<broadcast::Sender<ProgressUpdate>>,
}

impl BenchmarkRunner {
    pub fn new(backends: BackendRegistry) -> Self {
        Self {
            backends,
            default_models: Vec::new(),
            sample_interval: Some(DEFAULT_SAMPLE_INTERVAL),
            request_timeout: None,
            capture_system_info: true,
            probe_factory: Arc::new(|| Box::new(llmbench_obs::SystemProbe::new()) as Box<dyn ResourceProbe>),
            progress: None,
        }
    }

    pub fn from_config(backends: BackendRegistry, cfg: &BenchConfig) -> Self {
        let sampling = cfg
            .sampling
            .enabled
            .then(|| cfg.sampling.interval().max(llmbench_obs::MIN_SAMPLE_INTERVAL));
        Self::new(backends)
            .with_default_models(cfg.default_models.clone())
            .with_sampling(sampling)
            .with_request_timeout(cfg.request_timeout())
            .with_system_info(cfg.capture_system_info)
    }

    pub fn with_default_models(mut self, models: Vec<String>) -> Self { self.default_models = models; self }
    /// `None` disables resource sampling.
    pub fn with_sampling(mut self, interval: Option<Duration>) -> Self { self.sample_interval = interval; self }
    pub fn with_request_timeout(mut self, limit: Option<Duration>) -> Self { self.request_timeout = limit; self }
    pub fn with_system_info(mut self, capture: bool) -> Self { self.capture_system_info = capture; self }
    pub fn with_progress(mut self, tx: broadcast::Sender<ProgressUpdate>) -> Self { self.progress = Some(tx); self }

    pub fn with_probe<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Box<dyn ResourceProbe> + Send + Sync + 'static,
    {
        self.probe_factory = Arc::new(factory);
        self
    }

    pub fn backends(&self) -> &BackendRegistry { &self.backends }
    pub fn default_models(&self) -> &[String] { &self.default_models }

    /// Asks every registered provider for its models concurrently. A
    /// provider that cannot answer is reported with its error.
    pub async fn available_models(&self) -> Vec<ProviderModels> {
        let providers = self.backends.providers();
        join_all(providers.into_iter().map(|provider| async move {
            let Some(backend) = self.backends.get(&provider) else {
                return ProviderModels { provider, models: Vec::new(), error: Some("not registered".into()) };
            };
            match backend.list_models().await {
                Ok(models) => ProviderModels { provider, models, error: None },
                Err(e) => {
                    tracing::warn!(target: "runner", %provider, error = %e, "listing models failed");
                    ProviderModels { provider, models: Vec::new(), error: Some(e.to_string()) }
                }
            }
        }))
        .await
    }

    /// Benchmarks every requested model and returns one result per model in
    /// request order. Only a malformed request is an error; model failures
    /// are recorded in their results.
    pub async fn run(&self, request: &BenchmarkRequest) -> Result<BenchmarkRun> {
        if request.prompt.trim().is_empty() {
            return Err(BenchError::InvalidRequest("prompt must not be empty".into()));
        }
        let models = if request.models.is_empty() { self.default_models.clone() } else { request.models.clone() };
        if models.is_empty() {
            return Err(BenchError::InvalidRequest("no models given and no defaults configured".into()));
        }
        let mode = request.effective_mode();
        let timestamp = Utc::now();
        let id = new_run_id(timestamp);
        tracing::info!(target: "runner", run_id = %id, %mode, ?models, "benchmark run started");

        let system_info = if self.capture_system_info {
            tokio::task::spawn_blocking(llmbench_obs::system_info).await.ok()
        } else {
            None
        };

        let started = Instant::now();
        let prompt = request.prompt.as_str();
        let params = &request.parameters;
        let results = match mode {
            ProcessingMode::Parallel => {
                join_all(models.iter().map(|m| self.benchmark_model(&id, m, prompt, params))).await
            }
            ProcessingMode::Sequential => {
                let mut out = Vec::with_capacity(models.len());
                for m in &models {
                    out.push(self.benchmark_model(&id, m, prompt, params).await);
                }
                out
            }
        };
        let wall_time = started.elapsed().as_secs_f64();

        let run = BenchmarkRun {
            id,
            timestamp,
            prompt: request.prompt.clone(),
            models,
            mode,
            parameters: request.parameters.clone(),
            system_info,
            wall_time,
            results,
        };
        llmbench_obs::metrics::record_run();
        tracing::info!(
            target: "runner",
            run_id = %run.id,
            succeeded = run.succeeded(),
            failed = run.failed(),
            wall_time = run.wall_time,
            "benchmark run finished"
        );
        Ok(run)
    }

    /// One attempt against one model. Never fails: errors become a result
    /// with `success == false`.
    pub async fn benchmark_model(
        &self,
        run_id: &str,
        model: &str,
        prompt: &str,
        params: &GenerationParams,
    ) -> ModelResult {
        let timestamp = Utc::now();
        let started = Instant::now();
        let target = self.backends.target(model);
        self.emit(run_id, || ProgressEvent::Starting { model: model.to_string() });

        let sampler = self.sample_interval.map(|i| ResourceSampler::start((self.probe_factory)(), i));
        let mut attempt = Attempt::default();
        let outcome = match self.request_timeout {
            Some(limit) => {
                match tokio::time::timeout(limit, self.consume(run_id, model, prompt, params, started, &mut attempt)).await {
                    Ok(r) => r,
                    Err(_) => Err(BenchError::Timeout(limit)),
                }
            }
            None => self.consume(run_id, model, prompt, params, started, &mut attempt).await,
        };
        let total_time = started.elapsed().as_secs_f64();
        let resource_usage = match sampler {
            Some(s) => s.finish().await,
            None => None,
        };
        let outcome = outcome.and_then(|()| if attempt.chunks == 0 { Err(BenchError::EmptyResponse) } else { Ok(()) });

        let error = match outcome {
            Ok(()) => {
                tracing::info!(
                    target: "runner",
                    %model,
                    ttft = ?attempt.first_token,
                    total_time,
                    chunks = attempt.chunks,
                    bytes = attempt.bytes,
                    "model benchmark completed"
                );
                self.emit(run_id, || ProgressEvent::Completed {
                    model: model.to_string(),
                    total_time,
                    total_chunks: attempt.chunks,
                    total_bytes: attempt.bytes,
                });
                None
            }
            Err(e) => {
                let msg = e.to_string();
                tracing::warn!(target: "runner", %model, error = %msg, chunks = attempt.chunks, "model benchmark failed");
                self.emit(run_id, || ProgressEvent::Error {
                    model: model.to_string(),
                    error: msg.clone(),
                    time_elapsed: total_time,
                });
                Some(msg)
            }
        };
        let success = error.is_none();
        llmbench_obs::metrics::record_attempt(&target.provider, success, attempt.first_token, total_time);

        ModelResult {
            model: model.to_string(),
            provider: target.provider,
            success,
            throughput: Throughput::compute(attempt.chunks, attempt.bytes, total_time, attempt.first_token, attempt.usage),
            timing: Timing { time_to_first_token: attempt.first_token, total_time },
            response: (!attempt.text.is_empty()).then_some(attempt.text),
            error,
            resource_usage,
            timestamp,
        }
    }

    async fn consume(
        &self,
        run_id: &str,
        model: &str,
        prompt: &str,
        params: &GenerationParams,
        started: Instant,
        attempt: &mut Attempt,
    ) -> Result<()> {
        let (backend, target) = self.backends.resolve(model)?;
        let mut stream = backend.chat(&target.model, prompt, params).await?;
        while let Some(item) = stream.next().await {
            match item? {
                StreamEvent::Chunk(text) if text.is_empty() => {}
                StreamEvent::Chunk(text) => {
                    let elapsed = started.elapsed().as_secs_f64();
                    if attempt.first_token.is_none() {
                        attempt.first_token = Some(elapsed);
                        self.emit(run_id, || ProgressEvent::FirstToken { model: model.to_string(), time_to_first_token: elapsed });
                    }
                    attempt.chunks += 1;
                    attempt.bytes += text.len() as u64;
                    attempt.text.push_str(&text);
                    let (chunks, bytes) = (attempt.chunks, attempt.bytes);
                    self.emit(run_id, move || ProgressEvent::Generating {
                        model: model.to_string(),
                        chunk: text,
                        chunks_received: chunks,
                        total_bytes: bytes,
                        time_elapsed: elapsed,
                        chunks_per_second: if elapsed > 0.0 { chunks as f64 / elapsed } else { 0.0 },
                    });
                }
                StreamEvent::Usage(usage) => attempt.usage.merge(usage),
            }
        }
        Ok(())
    }

    // Progress is best effort: no subscribers is not an error.
    fn emit(&self, run_id: &str, event: impl FnOnce() -> ProgressEvent) {
        if let Some(tx) = &self.progress {
            let _ = tx.send(ProgressUpdate { run_id: run_id.to_string(), event: event() });
        }
    }
}
