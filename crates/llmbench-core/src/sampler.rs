use std::time::Duration;

use llmbench_common::model::{GpuUsage, ResourceUsage};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

pub use llmbench_obs::ResourceSample;

/// Source of resource readings. Implementations must be cheap: the sampler
/// calls `sample` on its polling task.
pub trait ResourceProbe: Send + 'static {
    fn sample(&mut self) -> ResourceSample;
}

impl ResourceProbe for llmbench_obs::SystemProbe {
    fn sample(&mut self) -> ResourceSample { llmbench_obs::SystemProbe::sample(self) }
}

pub struct ResourceSampler;

impl ResourceSampler {
    /// Samples once now, then every `interval` until the handle is finished
    /// or dropped, then once more.
    pub fn start(mut probe: Box<dyn ResourceProbe>, interval: Duration) -> SamplerHandle {
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let interval = interval.max(Duration::from_millis(1));
        let task = tokio::spawn(async move {
            let mut samples = vec![probe.sample()];
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            ticker.tick().await;
            loop {
                tokio::select! {
                    biased;
                    _ = &mut stop_rx => break,
                    _ = ticker.tick() => samples.push(probe.sample()),
                }
            }
            samples.push(probe.sample());
            samples
        });
        SamplerHandle { stop: stop_tx, task }
    }
}

pub struct SamplerHandle {
    stop: oneshot::Sender<()>,
    task: JoinHandle<Vec<ResourceSample>>,
}

impl SamplerHandle {
    pub async fn finish(self) -> Option<ResourceUsage> {
        let _ = self.stop.send(());
        match self.task.await {
            Ok(samples) => summarize(&samples),
            Err(e) => {
                tracing::warn!(target: "runner", "resource sampler task failed: {e}");
                None
            }
        }
    }
}

fn mean(values: &[f32]) -> f32 {
    if values.is_empty() { 0.0 } else { values.iter().sum::<f32>() / values.len() as f32 }
}

fn peak(values: impl Iterator<Item = f32>) -> f32 { values.fold(0.0_f32, f32::max) }

pub fn summarize(samples: &[ResourceSample]) -> Option<ResourceUsage> {
    let first = samples.first()?;
    let last = samples.last()?;

    let cpu: Vec<f32> = samples.iter().map(|s| mean(&s.cpu_per_core)).collect();
    let cpu_delta = last.cpu_per_core.iter().zip(&first.cpu_per_core).map(|(l, f)| l - f).collect();

    let gpu_util: Vec<f32> = samples.iter().filter_map(|s| s.gpu_utilization).collect();
    let gpu = (!gpu_util.is_empty()).then(|| GpuUsage {
        utilization_avg: mean(&gpu_util),
        utilization_peak: peak(gpu_util.iter().copied()),
        memory_delta_bytes: match (first.gpu_memory_used_bytes, last.gpu_memory_used_bytes) {
            (Some(a), Some(b)) => b as i64 - a as i64,
            _ => 0,
        },
    });

    Some(ResourceUsage {
        samples: samples.len(),
        cpu_percent_avg: mean(&cpu),
        cpu_percent_peak: peak(cpu.iter().copied()),
        cpu_delta,
        memory_start_bytes: first.memory_used_bytes,
        memory_end_bytes: last.memory_used_bytes,
        memory_peak_bytes: samples.iter().map(|s| s.memory_used_bytes).max().unwrap_or(0),
        memory_delta_bytes: last.memory_used_bytes as i64 - first.memory_used_bytes as i64,
        gpu,
    })
}
