use once_cell::sync::Lazy;
use prometheus::{Encoder, Gauge, HistogramVec, IntCounter, IntCounterVec, IntGauge, TextEncoder};

static RUNS_TOTAL: Lazy<IntCounter> =
    Lazy::new(|| prometheus::register_int_counter!("llmbench_runs_total", "Benchmark runs executed").unwrap());
static MODEL_ATTEMPTS: Lazy<IntCounterVec> = Lazy::new(|| {
    prometheus::register_int_counter_vec!(
        "llmbench_model_attempts_total",
        "Per-model benchmark attempts",
        &["provider", "outcome"]
    )
    .unwrap()
});
static TTFT_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    prometheus::register_histogram_vec!(
        "llmbench_ttft_seconds",
        "Time to first content chunk",
        &["provider"],
        vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
    )
    .unwrap()
});
static TOTAL_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    prometheus::register_histogram_vec!(
        "llmbench_model_total_seconds",
        "Wall time of one model attempt",
        &["provider"],
        vec![0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0]
    )
    .unwrap()
});

pub(crate) static GPU_UTIL: Lazy<Gauge> =
    Lazy::new(|| prometheus::register_gauge!("llmbench_gpu_utilization", "GPU utilization percent").unwrap());
pub(crate) static GPU_MEM_USED: Lazy<IntGauge> =
    Lazy::new(|| prometheus::register_int_gauge!("llmbench_gpu_memory_bytes", "GPU memory used (bytes)").unwrap());
pub(crate) static GPU_TEMP: Lazy<Gauge> =
    Lazy::new(|| prometheus::register_gauge!("llmbench_gpu_temperature_celsius", "GPU temperature in C").unwrap());

static ENCODER: Lazy<TextEncoder> = Lazy::new(TextEncoder::new);

/// Registers every metric so `/metrics` lists them before the first run.
pub fn init() {
    let _ = &*RUNS_TOTAL;
    let _ = &*MODEL_ATTEMPTS;
    let _ = &*TTFT_SECONDS;
    let _ = &*TOTAL_SECONDS;
    let _ = &*GPU_UTIL;
    let _ = &*GPU_MEM_USED;
    let _ = &*GPU_TEMP;
}

pub fn record_run() { RUNS_TOTAL.inc(); }

pub fn record_attempt(provider: &str, success: bool, ttft: Option<f64>, total: f64) {
    let outcome = if success { "success" } else { "failure" };
    MODEL_ATTEMPTS.with_label_values(&[provider, outcome]).inc();
    if let Some(t) = ttft { TTFT_SECONDS.with_label_values(&[provider]).observe(t); }
    TOTAL_SECONDS.with_label_values(&[provider]).observe(total);
}

#[cfg(test)]
fn attempts(provider: &str, success: bool) -> u64 {
    let outcome = if success { "success" } else { "failure" };
    MODEL_ATTEMPTS.with_label_values(&[provider, outcome]).get()
}

/// Text exposition of the global registry and its content type.
pub fn render() -> (String, Vec<u8>) {
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = ENCODER.encode(&metric_families, &mut buffer) {
        tracing::warn!(target: "obs", "encoding metrics failed: {e}");
    }
    (ENCODER.format_type().to_string(), buffer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attempts_are_labelled_by_outcome() {
        init();
        let before = attempts("metrics-test", false);
        record_attempt("metrics-test", false, None, 0.2);
        record_attempt("metrics-test", true, Some(0.1), 0.3);
        assert_eq!(attempts("metrics-test", false), before + 1);
        let (content_type, body) = render();
        assert!(content_type.starts_with("text/plain"));
        let text = String::from_utf8(body).unwrap();
        assert!(text.contains("llmbench_model_attempts_total"));
    }
}
