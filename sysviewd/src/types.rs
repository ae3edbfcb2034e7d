use crate::utils::mounts::canonical_mountpoint;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Per-category failure marker, serialized in place of the category object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CategoryError {
    pub error: String,
}

impl CategoryError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}

/// Outcome of one category capture: the value, or `{"error": "..."}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Captured<T> {
    Failed(CategoryError),
    Ok(T),
}

impl<T> Captured<T> {
    pub fn cancelled() -> Self {
        Self::Failed(CategoryError::new("capture cancelled"))
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok(_))
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            Self::Ok(value) => Some(value),
            Self::Failed(_) => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Ok(_) => None,
            Self::Failed(err) => Some(err.error.as_str()),
        }
    }
}

impl<T, E: std::fmt::Display> From<Result<T, E>> for Captured<T> {
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(value) => Self::Ok(value),
            Err(err) => Self::Failed(CategoryError::new(err.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CpuSnapshot {
    pub usage_percent: f64,
    pub frequency_mhz: Option<f64>,
    /// Physical cores, falling back to the logical count.
    pub cores: usize,
    pub logical_cores: usize,
    pub per_core_percent: Vec<f64>,
    pub temperature_celsius: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemorySnapshot {
    pub usage_percent: f64,
    pub used_bytes: u64,
    pub available_bytes: u64,
    pub total_bytes: u64,
    /// Unused by anything, including caches. Lower than `available_bytes`.
    #[serde(default)]
    pub free_bytes: u64,
    pub swap_usage_percent: f64,
    pub swap_used_bytes: u64,
    pub swap_total_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitionUsage {
    pub device: String,
    pub mountpoint: String,
    pub filesystem: String,
    pub used_bytes: u64,
    pub free_bytes: u64,
    pub total_bytes: u64,
    pub usage_percent: f64,
}

/// A partition whose usage query failed and was left out of the listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedPartition {
    pub mountpoint: String,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiskSnapshot {
    pub partitions: Vec<PartitionUsage>,
    pub read_rate_bytes_per_sec: Option<f64>,
    pub write_rate_bytes_per_sec: Option<f64>,
    /// Completed read operations since boot, where the platform counts them.
    #[serde(default)]
    pub read_count: Option<u64>,
    #[serde(default)]
    pub write_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<SkippedPartition>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkSnapshot {
    pub upload_rate_bytes_per_sec: Option<f64>,
    pub download_rate_bytes_per_sec: Option<f64>,
    pub connection_count: Option<usize>,
    // Cumulative since boot, summed over all interfaces.
    pub packets_sent: u64,
    pub packets_received: u64,
    pub errors_in: u64,
    pub errors_out: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemSnapshot {
    /// Unix seconds.
    pub boot_time: u64,
    pub uptime_seconds: u64,
    pub process_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GpuUsage {
    pub id: u32,
    pub name: String,
    pub load_percent: f64,
    pub memory_used_bytes: u64,
    pub memory_total_bytes: u64,
    pub memory_free_bytes: u64,
    pub memory_usage_percent: f64,
    pub temperature_celsius: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GpuSnapshot {
    pub devices: Vec<GpuUsage>,
}

/// One full poll cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub cpu: Captured<CpuSnapshot>,
    pub memory: Captured<MemorySnapshot>,
    pub disk: Captured<DiskSnapshot>,
    pub network: Captured<NetworkSnapshot>,
    pub system: Captured<SystemSnapshot>,
    pub gpu: Captured<GpuSnapshot>,
    /// ISO-8601, local time.
    pub timestamp: String,
}

/// Static-ish description of the host, served by `/api/system/info`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostInfo {
    pub hostname: Option<String>,
    pub platform: Option<String>,
    pub release: Option<String>,
    pub os_version: Option<String>,
    pub arch: String,
    pub cpu_count: usize,
    pub cpu_count_physical: Option<usize>,
    pub total_memory_bytes: Option<u64>,
    pub uptime_seconds: u64,
    pub load_average: [f64; 3],
    pub timestamp: String,
}

/// The core categories as one flat record, served by
/// `/api/performance/resources`. Fields of a failed category are `null` and
/// its message is listed under `errors`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceResources {
    pub cpu_usage_percent: Option<f64>,
    pub cpu_frequency_mhz: Option<f64>,
    pub cpu_per_core_percent: Vec<f64>,
    pub memory_usage_percent: Option<f64>,
    pub memory_used_bytes: Option<u64>,
    pub memory_available_bytes: Option<u64>,
    pub memory_free_bytes: Option<u64>,
    pub swap_usage_percent: Option<f64>,
    pub swap_used_bytes: Option<u64>,
    pub swap_total_bytes: Option<u64>,
    /// Root filesystem, or the first partition when there is no `/`.
    pub disk_usage_percent: Option<f64>,
    pub disk_used_bytes: Option<u64>,
    pub disk_total_bytes: Option<u64>,
    pub disk_read_rate_bytes_per_sec: Option<f64>,
    pub disk_write_rate_bytes_per_sec: Option<f64>,
    pub disk_read_count: Option<u64>,
    pub disk_write_count: Option<u64>,
    pub network_download_rate_bytes_per_sec: Option<f64>,
    pub network_upload_rate_bytes_per_sec: Option<f64>,
    pub network_packets_received: Option<u64>,
    pub network_packets_sent: Option<u64>,
    pub network_errors_in: Option<u64>,
    pub network_errors_out: Option<u64>,
    pub process_count: Option<usize>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub errors: BTreeMap<String, String>,
    pub timestamp: String,
}

impl PerformanceResources {
    pub fn flatten(
        cpu: &Captured<CpuSnapshot>,
        memory: &Captured<MemorySnapshot>,
        disk: &Captured<DiskSnapshot>,
        network: &Captured<NetworkSnapshot>,
        system: &Captured<SystemSnapshot>,
        timestamp: String,
    ) -> Self {
        let mut out = Self {
            timestamp,
            ..Self::default()
        };

        match cpu {
            Captured::Ok(cpu) => {
                out.cpu_usage_percent = Some(cpu.usage_percent);
                out.cpu_frequency_mhz = cpu.frequency_mhz;
                out.cpu_per_core_percent = cpu.per_core_percent.clone();
            }
            Captured::Failed(err) => out.note("cpu", err),
        }

        match memory {
            Captured::Ok(mem) => {
                out.memory_usage_percent = Some(mem.usage_percent);
                out.memory_used_bytes = Some(mem.used_bytes);
                out.memory_available_bytes = Some(mem.available_bytes);
                out.memory_free_bytes = Some(mem.free_bytes);
                out.swap_usage_percent = Some(mem.swap_usage_percent);
                out.swap_used_bytes = Some(mem.swap_used_bytes);
                out.swap_total_bytes = Some(mem.swap_total_bytes);
            }
            Captured::Failed(err) => out.note("memory", err),
        }

        match disk {
            Captured::Ok(disk) => {
                let primary = disk
                    .partitions
                    .iter()
                    .find(|p| canonical_mountpoint(&p.mountpoint) == "/")
                    .or_else(|| disk.partitions.first());
                if let Some(primary) = primary {
                    out.disk_usage_percent = Some(primary.usage_percent);
                    out.disk_used_bytes = Some(primary.used_bytes);
                    out.disk_total_bytes = Some(primary.total_bytes);
                }
                out.disk_read_rate_bytes_per_sec = disk.read_rate_bytes_per_sec;
                out.disk_write_rate_bytes_per_sec = disk.write_rate_bytes_per_sec;
                out.disk_read_count = disk.read_count;
                out.disk_write_count = disk.write_count;
            }
            Captured::Failed(err) => out.note("disk", err),
        }

        match network {
            Captured::Ok(net) => {
                out.network_download_rate_bytes_per_sec = net.download_rate_bytes_per_sec;
                out.network_upload_rate_bytes_per_sec = net.upload_rate_bytes_per_sec;
                out.network_packets_received = Some(net.packets_received);
                out.network_packets_sent = Some(net.packets_sent);
                out.network_errors_in = Some(net.errors_in);
                out.network_errors_out = Some(net.errors_out);
            }
            Captured::Failed(err) => out.note("network", err),
        }

        match system {
            Captured::Ok(sys) => out.process_count = Some(sys.process_count),
            Captured::Failed(err) => out.note("system", err),
        }

        out
    }

    fn note(&mut self, category: &str, err: &CategoryError) {
        self.errors.insert(category.to_string(), err.error.clone());
    }
}
