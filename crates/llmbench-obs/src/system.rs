use llmbench_common::model::SystemInfo;
use sysinfo::{CpuRefreshKind, MemoryRefreshKind, RefreshKind, System};

use crate::gpu;

/// Shortest polling interval that still yields meaningful CPU figures.
pub const MIN_SAMPLE_INTERVAL: std::time::Duration = sysinfo::MINIMUM_CPU_UPDATE_INTERVAL;

/// One reading of the host counters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceSample {
    pub cpu_per_core: Vec<f32>,
    pub memory_used_bytes: u64,
    pub gpu_utilization: Option<f32>,
    pub gpu_memory_used_bytes: Option<u64>,
}

/// Snapshot of the machine a run executes on.
pub fn system_info() -> SystemInfo {
    let sys = System::new_with_specifics(
        RefreshKind::new()
            .with_cpu(CpuRefreshKind::everything())
            .with_memory(MemoryRefreshKind::everything()),
    );
    let cpus = sys.cpus();
    SystemInfo {
        os: System::name().unwrap_or_else(|| "Unknown".into()),
        os_version: System::long_os_version().or_else(System::os_version).unwrap_or_else(|| "Unknown".into()),
        kernel: System::kernel_version().unwrap_or_else(|| "Unknown".into()),
        host_name: System::host_name().unwrap_or_default(),
        cpu_brand: cpus.first().map(|c| c.brand().trim().to_string()).unwrap_or_else(|| "Unknown".into()),
        logical_cores: cpus.len(),
        cpu_frequency_mhz: cpus.first().map(|c| c.frequency()).unwrap_or(0),
        memory_total_bytes: sys.total_memory(),
        memory_available_bytes: sys.available_memory(),
        memory_used_bytes: sys.used_memory(),
        gpu: gpu::gpu_snapshot(),
    }
}

/// Polls CPU and memory through sysinfo, and GPU 0 through NVML when the
/// `nvidia` feature is on. CPU figures need two refreshes at least
/// `sysinfo::MINIMUM_CPU_UPDATE_INTERVAL` apart before they mean anything.
pub struct SystemProbe {
    sys: System,
}

impl Default for SystemProbe {
    fn default() -> Self { Self::new() }
}

impl SystemProbe {
    pub fn new() -> Self {
        let mut sys = System::new_with_specifics(
            RefreshKind::new()
                .with_cpu(CpuRefreshKind::new().with_cpu_usage())
                .with_memory(MemoryRefreshKind::new().with_ram()),
        );
        sys.refresh_cpu_usage();
        Self { sys }
    }

    pub fn sample(&mut self) -> ResourceSample {
        self.sys.refresh_cpu_usage();
        self.sys.refresh_memory();
        let gpu = gpu::gpu_utilization();
        ResourceSample {
            cpu_per_core: self.sys.cpus().iter().map(|c| c.cpu_usage()).collect(),
            memory_used_bytes: self.sys.used_memory(),
            gpu_utilization: gpu.map(|g| g.0),
            gpu_memory_used_bytes: gpu.map(|g| g.1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_reports_every_core() {
        let mut probe = SystemProbe::new();
        let s = probe.sample();
        assert!(!s.cpu_per_core.is_empty());
        assert!(s.memory_used_bytes > 0);
        assert!(s.cpu_per_core.iter().all(|c| *c >= 0.0));
    }

    #[test]
    fn system_info_has_memory_and_cores() {
        let info = system_info();
        assert!(info.logical_cores > 0);
        assert!(info.memory_total_bytes >= info.memory_used_bytes);
    }
}
