//! NVIDIA GPU readings through NVML. Without the `nvidia` feature every
//! reading is `None`.

use llmbench_common::model::GpuInfo;

#[cfg(feature = "nvidia")]
mod nvml {
    use nvml_wrapper::enum_wrappers::device::TemperatureSensor;
    use nvml_wrapper::Nvml;
    use once_cell::sync::Lazy;

    use llmbench_common::model::GpuInfo;

    static NVML: Lazy<Option<Nvml>> = Lazy::new(|| match Nvml::init() {
        Ok(n) => Some(n),
        Err(e) => {
            tracing::debug!(target: "obs", "nvml unavailable: {e}");
            None
        }
    });

    pub(super) fn snapshot() -> Option<Vec<GpuInfo>> {
        let nvml = NVML.as_ref()?;
        let count = nvml.device_count().ok()?;
        let gpus: Vec<GpuInfo> = (0..count)
            .filter_map(|i| {
                let device = nvml.device_by_index(i).ok()?;
                let mem = device.memory_info().ok();
                Some(GpuInfo {
                    index: i,
                    name: device.name().unwrap_or_default(),
                    utilization_percent: device.utilization_rates().ok().map(|u| u.gpu as f32),
                    memory_total_bytes: mem.as_ref().map(|m| m.total),
                    memory_used_bytes: mem.as_ref().map(|m| m.used),
                    temperature_celsius: device.temperature(TemperatureSensor::Gpu).ok().map(|t| t as f32),
                })
            })
            .collect();
        (!gpus.is_empty()).then_some(gpus)
    }

    pub(super) fn utilization() -> Option<(f32, u64)> {
        let device = NVML.as_ref()?.device_by_index(0).ok()?;
        let util = device.utilization_rates().ok()?;
        let mem = device.memory_info().ok()?;
        Some((util.gpu as f32, mem.used))
    }
}

pub fn gpu_snapshot() -> Option<Vec<GpuInfo>> {
    #[cfg(feature = "nvidia")]
    { nvml::snapshot() }
    #[cfg(not(feature = "nvidia"))]
    { None }
}

/// Utilization percent and used bytes of GPU 0.
pub fn gpu_utilization() -> Option<(f32, u64)> {
    #[cfg(feature = "nvidia")]
    { nvml::utilization() }
    #[cfg(not(feature = "nvidia"))]
    { None }
}

/// Keeps the GPU gauges on `/metrics` fresh.
pub fn spawn_gpu_polling() {
    #[cfg(feature = "nvidia")]
    tokio::spawn(async move {
        loop {
            if let Some(gpus) = nvml::snapshot() {
                if let Some(g) = gpus.first() {
                    if let Some(u) = g.utilization_percent { crate::metrics::GPU_UTIL.set(u as f64); }
                    if let Some(m) = g.memory_used_bytes { crate::metrics::GPU_MEM_USED.set(m as i64); }
                    if let Some(t) = g.temperature_celsius { crate::metrics::GPU_TEMP.set(t as f64); }
                }
            } else {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_secs(1)).await;
        }
    });
}
