//! Metric sources.
//!
//! [`MetricsProvider`] is the seam between the aggregator and the operating
//! system: every read is point-in-time and may fail on its own. GPUs sit
//! behind a separate [`GpuBackend`] because their availability depends on a
//! vendor driver rather than the platform.

pub mod gpu;
pub mod host;

#[cfg(test)]
pub mod fake;

pub use gpu::{NoGpu, select_gpu_backend};
pub use host::HostProvider;

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("{0} is unavailable")]
    Unavailable(String),
    #[error("{0} is not supported on this platform")]
    Unsupported(&'static str),
    #[error("permission denied reading {0}")]
    PermissionDenied(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Backend(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CpuLoad {
    pub global_percent: f64,
    pub per_core_percent: Vec<f64>,
}

/// A temperature sensor. `label` is prefixed by its hardware group on
/// platforms that expose one, e.g. `coretemp Package id 0`.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorReading {
    pub label: String,
    pub celsius: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MemoryCounters {
    pub total: u64,
    pub used: u64,
    pub available: u64,
    pub free: u64,
    pub swap_total: u64,
    pub swap_used: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    pub device: String,
    pub mountpoint: String,
    pub filesystem: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SpaceUsage {
    pub total: u64,
    pub used: u64,
    pub free: u64,
}

/// Cumulative bytes since boot, summed over physical disks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DiskIoCounters {
    pub read_bytes: u64,
    pub written_bytes: u64,
    /// Completed operations. `None` where the platform does not count them.
    pub read_count: Option<u64>,
    pub write_count: Option<u64>,
}

/// Cumulative totals since boot, summed over interfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NetIoCounters {
    pub bytes_sent: u64,
    pub bytes_recv: u64,
    pub packets_sent: u64,
    pub packets_recv: u64,
    pub errors_in: u64,
    pub errors_out: u64,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct HostDescription {
    pub hostname: Option<String>,
    pub os_name: Option<String>,
    pub kernel_version: Option<String>,
    pub os_version: Option<String>,
    pub arch: String,
    pub logical_cores: usize,
    pub load_average: [f64; 3],
}

#[derive(Debug, Clone, PartialEq)]
pub struct GpuDevice {
    pub index: u32,
    pub name: String,
    pub load_percent: f64,
    pub memory_used: u64,
    pub memory_total: u64,
    pub memory_free: u64,
    pub temperature_celsius: Option<f64>,
}

pub trait MetricsProvider: Send + Sync {
    /// Utilization over `window`. Blocks the caller for the whole window.
    fn cpu_load(&self, window: Duration) -> Result<CpuLoad, ProviderError>;

    /// Current frequency in MHz, `None` when the platform does not report it.
    fn cpu_frequency_mhz(&self) -> Result<Option<f64>, ProviderError>;

    fn physical_cores(&self) -> Option<usize>;

    fn temperatures(&self) -> Result<Vec<SensorReading>, ProviderError>;

    fn memory(&self) -> Result<MemoryCounters, ProviderError>;

    fn partitions(&self) -> Result<Vec<Partition>, ProviderError>;

    /// Space usage of the filesystem mounted at `mountpoint` (canonical form).
    fn partition_usage(&self, mountpoint: &str) -> Result<SpaceUsage, ProviderError>;

    fn disk_io(&self) -> Result<DiskIoCounters, ProviderError>;

    fn network_io(&self) -> Result<NetIoCounters, ProviderError>;

    /// Open inet sockets.
    fn connection_count(&self) -> Result<usize, ProviderError>;

    /// Boot time, unix seconds.
    fn boot_time(&self) -> u64;

    fn process_count(&self) -> usize;

    fn host(&self) -> HostDescription;
}

pub trait GpuBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Zero devices is a valid answer, not a failure.
    fn devices(&self) -> Result<Vec<GpuDevice>, ProviderError>;
}
