use std::time::Duration;

use llmbench_core::{summarize, ResourceProbe, ResourceSample, ResourceSampler};

/// Memory grows by one MiB per reading.
struct Ramp {
    n: u64,
}

impl ResourceProbe for Ramp {
    fn sample(&mut self) -> ResourceSample {
        self.n += 1;
        ResourceSample {
            cpu_per_core: vec![10.0 * self.n as f32, 0.0],
            memory_used_bytes: self.n << 20,
            gpu_utilization: None,
            gpu_memory_used_bytes: None,
        }
    }
}

fn sample(cpu: &[f32], mem: u64, gpu: Option<(f32, u64)>) -> ResourceSample {
    ResourceSample {
        cpu_per_core: cpu.to_vec(),
        memory_used_bytes: mem,
        gpu_utilization: gpu.map(|g| g.0),
        gpu_memory_used_bytes: gpu.map(|g| g.1),
    }
}

#[tokio::test]
async fn sampler_polls_until_finished() {
    let handle = ResourceSampler::start(Box::new(Ramp { n: 0 }), Duration::from_millis(10));
    tokio::time::sleep(Duration::from_millis(60)).await;
    let usage = handle.finish().await.expect("usage");
    assert!(usage.samples >= 3, "samples {}", usage.samples);
    assert_eq!(usage.memory_start_bytes, 1 << 20);
    assert_eq!(usage.memory_end_bytes, (usage.samples as u64) << 20);
    assert_eq!(usage.memory_peak_bytes, usage.memory_end_bytes);
    assert!(usage.memory_delta_bytes > 0);
    assert_eq!(usage.cpu_delta.len(), 2);
    assert_eq!(usage.cpu_delta[1], 0.0);
    assert!(usage.gpu.is_none());
}

#[tokio::test]
async fn immediate_finish_still_brackets_the_attempt() {
    let handle = ResourceSampler::start(Box::new(Ramp { n: 0 }), Duration::from_secs(60));
    let usage = handle.finish().await.expect("usage");
    assert_eq!(usage.samples, 2);
    assert_eq!(usage.memory_delta_bytes, 1 << 20);
}

#[test]
fn summary_statistics() {
    let samples = vec![
        sample(&[10.0, 30.0], 100, Some((50.0, 1_000))),
        sample(&[50.0, 70.0], 300, Some((90.0, 1_500))),
        sample(&[20.0, 20.0], 200, Some((10.0, 1_200))),
    ];
    let u = summarize(&samples).unwrap();
    assert_eq!(u.samples, 3);
    // per-sample means: 20, 60, 20
    assert!((u.cpu_percent_avg - 100.0 / 3.0).abs() < 1e-4);
    assert_eq!(u.cpu_percent_peak, 60.0);
    assert_eq!(u.cpu_delta, vec![10.0, -10.0]);
    assert_eq!(u.memory_start_bytes, 100);
    assert_eq!(u.memory_end_bytes, 200);
    assert_eq!(u.memory_peak_bytes, 300);
    assert_eq!(u.memory_delta_bytes, 100);
    let gpu = u.gpu.unwrap();
    assert!((gpu.utilization_avg - 50.0).abs() < 1e-4);
    assert_eq!(gpu.utilization_peak, 90.0);
    assert_eq!(gpu.memory_delta_bytes, 200);
}

#[test]
fn empty_samples_summarize_to_none() {
    assert!(summarize(&[]).is_none());
}

#[test]
fn shrinking_memory_gives_negative_delta() {
    let u = summarize(&[sample(&[], 500, None), sample(&[], 200, None)]).unwrap();
    assert_eq!(u.memory_delta_bytes, -300);
    assert_eq!(u.cpu_percent_avg, 0.0);
    assert!(u.cpu_delta.is_empty());
}
