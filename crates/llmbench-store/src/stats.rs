use std::collections::BTreeMap;

use llmbench_common::model::BenchmarkRun;
use serde::Serialize;

/// Aggregate over every stored attempt of one model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelStats {
    pub model: String,
    pub attempts: usize,
    pub successes: usize,
    /// Means over successful attempts only.
    pub avg_ttft: Option<f64>,
    pub avg_total_time: Option<f64>,
    pub avg_bytes_per_second: Option<f64>,
    pub avg_tokens_per_second: Option<f64>,
}

impl ModelStats {
    pub fn success_rate(&self) -> f64 {
        if self.attempts == 0 { 0.0 } else { self.successes as f64 / self.attempts as f64 }
    }
}

#[derive(Default)]
struct Acc {
    attempts: usize,
    successes: usize,
    ttft: Vec<f64>,
    total: Vec<f64>,
    bps: Vec<f64>,
    tps: Vec<f64>,
}

fn mean(v: &[f64]) -> Option<f64> {
    (!v.is_empty()).then(|| v.iter().sum::<f64>() / v.len() as f64)
}

/// Per-model statistics, ordered by model name.
pub fn model_stats(runs: &[BenchmarkRun]) -> Vec<ModelStats> {
    let mut by_model: BTreeMap<&str, Acc> = BTreeMap::new();
    for result in runs.iter().flat_map(|r| &r.results) {
        let acc = by_model.entry(result.model.as_str()).or_default();
        acc.attempts += 1;
        if !result.success { continue; }
        acc.successes += 1;
        acc.ttft.extend(result.timing.time_to_first_token);
        acc.total.push(result.timing.total_time);
        acc.bps.push(result.throughput.bytes_per_second);
        acc.tps.extend(result.throughput.tokens_per_second);
    }
    by_model
        .into_iter()
        .map(|(model, acc)| ModelStats {
            model: model.to_string(),
            attempts: acc.attempts,
            successes: acc.successes,
            avg_ttft: mean(&acc.ttft),
            avg_total_time: mean(&acc.total),
            avg_bytes_per_second: mean(&acc.bps),
            avg_tokens_per_second: mean(&acc.tps),
        })
        .collect()
}
