//! One poll cycle: query every category, derive percentages and rates, and
//! assemble a [`Snapshot`].
//!
//! Every category has its own failure boundary. A provider error becomes that
//! category's `{"error": ...}` marker and the others carry on. The only state
//! kept between polls is the [`RateTracker`] baselines for the network and
//! disk counters, so the first poll of a fresh process reports no rates.

use crate::cancel::CancelToken;
use crate::collectors::{GpuBackend, MetricsProvider, ProviderError, SensorReading};
use crate::rate::{Clock, CounterSample, MonotonicClock, RateTracker};
use crate::types::{
    Captured, CpuSnapshot, DiskSnapshot, GpuSnapshot, GpuUsage, HostInfo,
    MemorySnapshot, NetworkSnapshot, PartitionUsage, PerformanceResources, SkippedPartition,
    Snapshot, SystemSnapshot,
};
use crate::utils::mounts::{canonical_mountpoint, is_pseudo_filesystem};
use crate::utils::time::{iso_now, unix_now_secs};
use crate::utils::units::{clamp_percent, percent};
use log::{debug, error, warn};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;

pub const NETWORK_SENT: &str = "network.sent";
pub const NETWORK_RECV: &str = "network.recv";
pub const DISK_READ: &str = "disk.read";
pub const DISK_WRITE: &str = "disk.write";

/// Sensor groups that report the CPU package, in order of preference.
const CPU_SENSOR_GROUPS: &[&str] = &[
    "coretemp",
    "k10temp",
    "zenpower",
    "cpu_thermal",
    "cpu-thermal",
    "cpu",
];

/// The capture machinery itself failed; no snapshot could be produced.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("capture task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Cpu,
    Memory,
    Disk,
    Network,
    System,
    Gpu,
    Host,
}

impl Category {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cpu => "cpu",
            Self::Memory => "memory",
            Self::Disk => "disk",
            Self::Network => "network",
            Self::System => "system",
            Self::Gpu => "gpu",
            Self::Host => "host",
        }
    }
}

pub struct SnapshotAggregator {
    provider: Arc<dyn MetricsProvider>,
    gpu: Arc<dyn GpuBackend>,
    rates: RateTracker,
    clock: Arc<dyn Clock>,
    cpu_window: Duration,
    // Held from counter read to `observe`, so a slow reader cannot record an
    // older counter after a faster poll stored a newer one.
    network_gate: Mutex<()>,
    disk_gate: Mutex<()>,
}

impl SnapshotAggregator {
    pub fn new(
        provider: Arc<dyn MetricsProvider>,
        gpu: Arc<dyn GpuBackend>,
        cpu_window: Duration,
    ) -> Self {
        Self {
            provider,
            gpu,
            rates: RateTracker::new(),
            clock: Arc::new(MonotonicClock),
            cpu_window,
            network_gate: Mutex::new(()),
            disk_gate: Mutex::new(()),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn rates(&self) -> &RateTracker {
        &self.rates
    }

    pub fn gpu_backend(&self) -> &'static str {
        self.gpu.name()
    }

    /// Blocks for the CPU sampling window.
    pub fn capture_cpu(&self) -> Captured<CpuSnapshot> {
        settle(Category::Cpu, self.cpu())
    }

    pub fn capture_memory(&self) -> Captured<MemorySnapshot> {
        settle(Category::Memory, self.memory())
    }

    pub fn capture_disk(&self) -> Captured<DiskSnapshot> {
        settle(Category::Disk, self.disk())
    }

    pub fn capture_network(&self) -> Captured<NetworkSnapshot> {
        settle(Category::Network, self.network())
    }

    pub fn capture_system(&self) -> Captured<SystemSnapshot> {
        let boot_time = self.provider.boot_time();
        Captured::Ok(SystemSnapshot {
            boot_time,
            uptime_seconds: unix_now_secs().saturating_sub(boot_time),
            process_count: self.provider.process_count(),
        })
    }

    pub fn capture_gpu(&self) -> Captured<GpuSnapshot> {
        settle(Category::Gpu, self.gpu())
    }

    /// Partition listing without touching the disk rate baselines.
    pub fn capture_partitions(&self) -> Captured<Vec<PartitionUsage>> {
        settle(
            Category::Disk,
            self.partitions().map(|(partitions, _)| partitions),
        )
    }

    pub fn capture_host(&self) -> Captured<HostInfo> {
        let host = self.provider.host();
        let total_memory_bytes = match self.provider.memory() {
            Ok(memory) => Some(memory.total),
            Err(err) => {
                debug!("[aggregator] host memory total unavailable: {err}");
                None
            }
        };
        Captured::Ok(HostInfo {
            hostname: host.hostname,
            platform: host.os_name,
            release: host.kernel_version,
            os_version: host.os_version,
            arch: host.arch,
            cpu_count: host.logical_cores.max(1),
            cpu_count_physical: self.provider.physical_cores(),
            total_memory_bytes,
            uptime_seconds: unix_now_secs().saturating_sub(self.provider.boot_time()),
            load_average: host.load_average,
            timestamp: iso_now(),
        })
    }

    /// Runs `capture` on the blocking pool, resolving to a cancelled marker
    /// as soon as `cancel` fires. A capture that is already running keeps
    /// going in the background; its result is discarded.
    pub async fn capture<T, F>(
        self: &Arc<Self>,
        category: Category,
        cancel: &CancelToken,
        capture: F,
    ) -> Result<Captured<T>, CaptureError>
    where
        T: Send + 'static,
        F: FnOnce(&SnapshotAggregator) -> Captured<T> + Send + 'static,
    {
        if cancel.is_cancelled() {
            return Ok(Captured::cancelled());
        }
        let this = Arc::clone(self);
        let task = tokio::task::spawn_blocking(move || capture(&this));
        tokio::select! {
            joined = task => joined.map_err(|err| {
                error!("[aggregator] {} capture task failed: {err}", category.as_str());
                CaptureError::from(err)
            }),
            () = cancel.cancelled() => {
                warn!("[aggregator] {} capture cancelled", category.as_str());
                Ok(Captured::cancelled())
            }
        }
    }

    /// All six categories, captured concurrently.
    pub async fn capture_snapshot(
        self: &Arc<Self>,
        cancel: &CancelToken,
    ) -> Result<Snapshot, CaptureError> {
        let (cpu, memory, disk, network, system, gpu) = tokio::join!(
            self.capture(Category::Cpu, cancel, Self::capture_cpu),
            self.capture(Category::Memory, cancel, Self::capture_memory),
            self.capture(Category::Disk, cancel, Self::capture_disk),
            self.capture(Category::Network, cancel, Self::capture_network),
            self.capture(Category::System, cancel, Self::capture_system),
            self.capture(Category::Gpu, cancel, Self::capture_gpu),
        );
        Ok(Snapshot {
            cpu: cpu?,
            memory: memory?,
            disk: disk?,
            network: network?,
            system: system?,
            gpu: gpu?,
            timestamp: iso_now(),
        })
    }

    /// The core categories without GPUs, flattened into one record.
    pub async fn capture_resources(
        self: &Arc<Self>,
        cancel: &CancelToken,
    ) -> Result<PerformanceResources, CaptureError> {
        let (cpu, memory, disk, network, system) = tokio::join!(
            self.capture(Category::Cpu, cancel, Self::capture_cpu),
            self.capture(Category::Memory, cancel, Self::capture_memory),
            self.capture(Category::Disk, cancel, Self::capture_disk),
            self.capture(Category::Network, cancel, Self::capture_network),
            self.capture(Category::System, cancel, Self::capture_system),
        );
        Ok(PerformanceResources::flatten(
            &cpu?,
            &memory?,
            &disk?,
            &network?,
            &system?,
            iso_now(),
        ))
    }

    fn cpu(&self) -> Result<CpuSnapshot, ProviderError> {
        let load = self.provider.cpu_load(self.cpu_window)?;

        let frequency_mhz = match self.provider.cpu_frequency_mhz() {
            Ok(mhz) => mhz.filter(|mhz| mhz.is_finite() && *mhz > 0.0),
            Err(err) => {
                debug!("[aggregator] cpu frequency unavailable: {err}");
                None
            }
        };
        let temperature_celsius = match self.provider.temperatures() {
            Ok(readings) => cpu_temperature(&readings),
            Err(err) => {
                debug!("[aggregator] sensors unavailable: {err}");
                None
            }
        };

        let logical_cores = load.per_core_percent.len().max(1);
        let cores = self
            .provider
            .physical_cores()
            .filter(|cores| *cores > 0)
            .unwrap_or(logical_cores);

        Ok(CpuSnapshot {
            usage_percent: clamp_percent(load.global_percent),
            frequency_mhz,
            cores,
            logical_cores,
            per_core_percent: load
                .per_core_percent
                .into_iter()
                .map(clamp_percent)
                .collect(),
            temperature_celsius,
        })
    }

    fn memory(&self) -> Result<MemorySnapshot, ProviderError> {
        let memory = self.provider.memory()?;
        Ok(MemorySnapshot {
            usage_percent: percent(memory.used, memory.total),
            used_bytes: memory.used,
            available_bytes: memory.available,
            total_bytes: memory.total,
            free_bytes: memory.free,
            swap_usage_percent: percent(memory.swap_used, memory.swap_total),
            swap_used_bytes: memory.swap_used,
            swap_total_bytes: memory.swap_total,
        })
    }

    fn partitions(&self) -> Result<(Vec<PartitionUsage>, Vec<SkippedPartition>), ProviderError> {
        let mut seen = HashSet::new();
        let mut usage = Vec::new();
        let mut skipped = Vec::new();

        for partition in self.provider.partitions()? {
            if partition.device.is_empty()
                || partition.mountpoint.is_empty()
                || is_pseudo_filesystem(&partition.filesystem)
            {
                continue;
            }
            let canonical = canonical_mountpoint(&partition.mountpoint);
            if !seen.insert(canonical.clone()) {
                continue;
            }

            match self.provider.partition_usage(&canonical) {
                Ok(space) if space.total == 0 => {}
                Ok(space) => usage.push(PartitionUsage {
                    device: partition.device,
                    mountpoint: partition.mountpoint,
                    filesystem: partition.filesystem,
                    used_bytes: space.used,
                    free_bytes: space.free,
                    total_bytes: space.total,
                    usage_percent: percent(space.used, space.total),
                }),
                Err(err) => {
                    debug!(
                        "[aggregator] skipping partition {} ({}): {err}",
                        partition.device, partition.mountpoint
                    );
                    skipped.push(SkippedPartition {
                        mountpoint: partition.mountpoint,
                        error: err.to_string(),
                    });
                }
            }
        }
        Ok((usage, skipped))
    }

    fn disk(&self) -> Result<DiskSnapshot, ProviderError> {
        // Counters first so the baselines advance even if the listing fails.
        let io = {
            let _gate = hold(&self.disk_gate);
            self.provider.disk_io().map(|counters| {
                let now = self.clock.now();
                let read_rate = self
                    .rates
                    .observe(DISK_READ, CounterSample::new(counters.read_bytes, now));
                let write_rate = self
                    .rates
                    .observe(DISK_WRITE, CounterSample::new(counters.written_bytes, now));
                (counters, read_rate, write_rate)
            })
        };
        let (counters, read_rate, write_rate) = match io {
            Ok((counters, read_rate, write_rate)) => (Some(counters), read_rate, write_rate),
            Err(err) => {
                warn!("[aggregator] disk I/O counters unavailable: {err}");
                (None, None, None)
            }
        };

        let (partitions, skipped) = self.partitions()?;
        Ok(DiskSnapshot {
            partitions,
            read_rate_bytes_per_sec: read_rate,
            write_rate_bytes_per_sec: write_rate,
            read_count: counters.and_then(|c| c.read_count),
            write_count: counters.and_then(|c| c.write_count),
            skipped,
        })
    }

    fn network(&self) -> Result<NetworkSnapshot, ProviderError> {
        let (counters, upload, download) = {
            let _gate = hold(&self.network_gate);
            let counters = self.provider.network_io()?;
            let now = self.clock.now();
            let upload = self
                .rates
                .observe(NETWORK_SENT, CounterSample::new(counters.bytes_sent, now));
            let download = self
                .rates
                .observe(NETWORK_RECV, CounterSample::new(counters.bytes_recv, now));
            (counters, upload, download)
        };

        let connection_count = match self.provider.connection_count() {
            Ok(count) => Some(count),
            Err(err) => {
                debug!("[aggregator] connection count unavailable: {err}");
                None
            }
        };

        Ok(NetworkSnapshot {
            upload_rate_bytes_per_sec: upload,
            download_rate_bytes_per_sec: download,
            connection_count,
            packets_sent: counters.packets_sent,
            packets_received: counters.packets_recv,
            errors_in: counters.errors_in,
            errors_out: counters.errors_out,
        })
    }

    fn gpu(&self) -> Result<GpuSnapshot, ProviderError> {
        let devices = self
            .gpu
            .devices()?
            .into_iter()
            .map(|device| GpuUsage {
                id: device.index,
                name: device.name,
                load_percent: clamp_percent(device.load_percent),
                memory_used_bytes: device.memory_used,
                memory_total_bytes: device.memory_total,
                memory_free_bytes: device.memory_free,
                memory_usage_percent: percent(device.memory_used, device.memory_total),
                temperature_celsius: device.temperature_celsius,
            })
            .collect();
        Ok(GpuSnapshot { devices })
    }
}

fn settle<T>(category: Category, result: Result<T, ProviderError>) -> Captured<T> {
    if let Err(err) = &result {
        warn!("[aggregator] {} capture failed: {err}", category.as_str());
    }
    result.into()
}

/// A panicked capture never leaves the guarded counters half-updated, so a
/// poisoned gate is still usable.
fn hold(gate: &Mutex<()>) -> MutexGuard<'_, ()> {
    gate.lock().unwrap_or_else(PoisonError::into_inner)
}

/// First reading under the most preferred recognised CPU sensor group.
fn cpu_temperature(readings: &[SensorReading]) -> Option<f64> {
    CPU_SENSOR_GROUPS.iter().find_map(|group| {
        readings
            .iter()
            .find(|reading| reading.label.to_ascii_lowercase().starts_with(group))
            .map(|reading| reading.celsius)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collectors::GpuDevice;
    use crate::collectors::fake::{FakeGpu, FakeProvider, ManualClock, Read};

    fn aggregator(provider: FakeProvider) -> Arc<SnapshotAggregator> {
        aggregator_with(provider, FakeGpu::default()).0
    }

    fn aggregator_with(
        provider: FakeProvider,
        gpu: FakeGpu,
    ) -> (Arc<SnapshotAggregator>, Arc<FakeProvider>, Arc<ManualClock>) {
        let provider = Arc::new(provider);
        let clock = Arc::new(ManualClock::new());
        let aggregator = SnapshotAggregator::new(
            provider.clone(),
            Arc::new(gpu),
            Duration::from_millis(500),
        )
        .with_clock(clock.clone());
        (Arc::new(aggregator), provider, clock)
    }

    fn healthy_categories(snapshot: &Snapshot) -> Vec<&'static str> {
        let mut ok = Vec::new();
        if snapshot.cpu.is_ok() {
            ok.push("cpu");
        }
        if snapshot.memory.is_ok() {
            ok.push("memory");
        }
        if snapshot.disk.is_ok() {
            ok.push("disk");
        }
        if snapshot.network.is_ok() {
            ok.push("network");
        }
        if snapshot.system.is_ok() {
            ok.push("system");
        }
        if snapshot.gpu.is_ok() {
            ok.push("gpu");
        }
        ok
    }

    #[tokio::test]
    async fn healthy_snapshot_populates_every_category() {
        let aggregator = aggregator(FakeProvider::new());
        let snapshot = aggregator
            .capture_snapshot(&CancelToken::new())
            .await
            .unwrap();

        assert_eq!(healthy_categories(&snapshot).len(), 6);

        let cpu = snapshot.cpu.value().unwrap();
        assert_eq!(cpu.usage_percent, 37.5);
        assert_eq!(cpu.cores, 2);
        assert_eq!(cpu.logical_cores, 4);
        assert_eq!(cpu.frequency_mhz, Some(2_400.0));
        assert_eq!(cpu.temperature_celsius, Some(48.0));

        let memory = snapshot.memory.value().unwrap();
        assert_eq!(memory.usage_percent, 25.0);
        assert_eq!(memory.total_bytes, 16_000);
        assert_eq!(memory.swap_usage_percent, 0.0);

        let system = snapshot.system.value().unwrap();
        assert_eq!(system.process_count, 321);
        assert_eq!(system.boot_time, 1_600_000_000);
        assert!(system.uptime_seconds > 0);

        assert_eq!(snapshot.network.value().unwrap().connection_count, Some(12));
        assert!(chrono::DateTime::parse_from_rfc3339(&snapshot.timestamp).is_ok());
    }

    #[tokio::test]
    async fn first_poll_has_no_rates() {
        let aggregator = aggregator(FakeProvider::new());
        let snapshot = aggregator
            .capture_snapshot(&CancelToken::new())
            .await
            .unwrap();

        let network = snapshot.network.value().unwrap();
        assert_eq!(network.upload_rate_bytes_per_sec, None);
        assert_eq!(network.download_rate_bytes_per_sec, None);
        let disk = snapshot.disk.value().unwrap();
        assert_eq!(disk.read_rate_bytes_per_sec, None);
        assert_eq!(disk.write_rate_bytes_per_sec, None);
        assert_eq!(aggregator.rates().channels(), 4);
    }

    #[tokio::test]
    async fn one_failing_category_leaves_the_rest_intact() {
        let cases = [
            (Read::Cpu, "cpu"),
            (Read::Memory, "memory"),
            (Read::Partitions, "disk"),
            (Read::Network, "network"),
        ];
        for (read, category) in cases {
            let aggregator = aggregator(FakeProvider::new().failing(read));
            let snapshot = aggregator
                .capture_snapshot(&CancelToken::new())
                .await
                .unwrap();

            let healthy = healthy_categories(&snapshot);
            assert_eq!(healthy.len(), 5, "{category} failure: {healthy:?}");
            assert!(!healthy.contains(&category));
        }
    }

    #[tokio::test]
    async fn failing_gpu_backend_only_marks_gpu() {
        let gpu = FakeGpu {
            devices: Vec::new(),
            fail: true,
        };
        let (aggregator, _, _) = aggregator_with(FakeProvider::new(), gpu);
        let snapshot = aggregator
            .capture_snapshot(&CancelToken::new())
            .await
            .unwrap();

        assert_eq!(snapshot.gpu.error(), Some("driver crashed"));
        assert_eq!(healthy_categories(&snapshot).len(), 5);
    }

    #[test]
    fn zero_gpus_is_an_empty_list() {
        let aggregator = aggregator(FakeProvider::new());
        let gpu = aggregator.capture_gpu();
        assert_eq!(gpu, Captured::Ok(GpuSnapshot { devices: Vec::new() }));
    }

    #[test]
    fn gpu_devices_are_converted() {
        let gpu = FakeGpu {
            devices: vec![GpuDevice {
                index: 0,
                name: "Test GPU".to_string(),
                load_percent: 120.0,
                memory_used: 2_048,
                memory_total: 8_192,
                memory_free: 6_144,
                temperature_celsius: Some(61.0),
            }],
            fail: false,
        };
        let (aggregator, _, _) = aggregator_with(FakeProvider::new(), gpu);
        let devices = aggregator.capture_gpu().value().unwrap().devices.clone();

        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].load_percent, 100.0, "load is clamped");
        assert_eq!(devices[0].memory_usage_percent, 25.0);
        assert_eq!(devices[0].temperature_celsius, Some(61.0));
    }

    #[test]
    fn download_rate_over_two_second_polls() {
        let (aggregator, provider, clock) =
            aggregator_with(FakeProvider::new(), FakeGpu::default());

        provider.set_network(500_000, 1_000_000);
        let first = aggregator.capture_network();
        assert_eq!(
            first.value().unwrap().download_rate_bytes_per_sec,
            None
        );

        clock.advance(Duration::from_secs(2));
        provider.set_network(500_000, 3_048_576);
        let second = aggregator.capture_network();
        let network = second.value().unwrap();
        assert_eq!(network.download_rate_bytes_per_sec, Some(1_024_288.0));
        assert_eq!(network.upload_rate_bytes_per_sec, Some(0.0));
    }

    #[test]
    fn disk_write_counter_reset_reports_no_rate() {
        let (aggregator, provider, clock) =
            aggregator_with(FakeProvider::new(), FakeGpu::default());

        provider.set_disk(2_000_000, 500_000);
        aggregator.capture_disk();

        clock.advance(Duration::from_secs(1));
        provider.set_disk(2_100_000, 0);
        let disk = aggregator.capture_disk();
        let disk = disk.value().unwrap();

        assert_eq!(disk.write_rate_bytes_per_sec, None);
        assert_eq!(disk.read_rate_bytes_per_sec, Some(100_000.0));
        assert_eq!(aggregator.rates().baseline(DISK_WRITE).unwrap().value, 0);
    }

    #[test]
    fn overlapping_network_polls_keep_newest_baseline() {
        let mut provider = FakeProvider::new();
        provider.net_growth = 1_000;
        provider.network_stall = Some((1, Duration::from_millis(200)));
        let aggregator = Arc::new(SnapshotAggregator::new(
            Arc::new(provider),
            Arc::new(FakeGpu::default()),
            Duration::from_millis(500),
        ));
        aggregator.capture_network();

        let (slow, fast) = std::thread::scope(|scope| {
            let slow = scope.spawn(|| aggregator.capture_network());
            std::thread::sleep(Duration::from_millis(50));
            let fast = scope.spawn(|| aggregator.capture_network());
            (slow.join().unwrap(), fast.join().unwrap())
        });

        for network in [slow.value().unwrap(), fast.value().unwrap()] {
            let download = network.download_rate_bytes_per_sec;
            assert!(download.is_some_and(|rate| rate >= 0.0), "{download:?}");
        }
        assert_eq!(
            aggregator.rates().baseline(NETWORK_RECV).unwrap().value,
            1_002_000
        );
    }

    #[test]
    fn disk_operation_counts_pass_through() {
        let aggregator = aggregator(FakeProvider::new());
        let disk = aggregator.capture_disk();
        let disk = disk.value().unwrap();
        assert_eq!(disk.read_count, Some(120));
        assert_eq!(disk.write_count, Some(45));
    }

    #[test]
    fn memory_reports_free_bytes() {
        let memory = aggregator(FakeProvider::new()).capture_memory();
        let memory = memory.value().unwrap();
        assert_eq!(memory.free_bytes, 8_000);
        assert!(memory.free_bytes <= memory.available_bytes);
    }

    #[tokio::test]
    async fn resources_flatten_core_categories() {
        let aggregator = aggregator(FakeProvider::new().failing(Read::Network));
        let resources = aggregator
            .capture_resources(&CancelToken::new())
            .await
            .unwrap();

        assert_eq!(resources.cpu_usage_percent, Some(37.5));
        assert_eq!(resources.memory_free_bytes, Some(8_000));
        assert_eq!(resources.disk_total_bytes, Some(1_000));
        assert_eq!(resources.disk_read_count, Some(120));
        assert_eq!(resources.disk_read_rate_bytes_per_sec, None);
        assert_eq!(resources.network_packets_sent, None);
        assert!(resources.process_count.is_some());
        assert_eq!(resources.errors.len(), 1);
        assert!(resources.errors.contains_key("network"));
    }

    #[test]
    fn repoll_at_same_instant_reports_zero_rate() {
        let (aggregator, provider, _clock) =
            aggregator_with(FakeProvider::new(), FakeGpu::default());
        aggregator.capture_network();
        provider.set_network(900_000, 2_000_000);
        let network = aggregator.capture_network();
        assert_eq!(
            network.value().unwrap().download_rate_bytes_per_sec,
            Some(0.0)
        );
    }

    #[test]
    fn failing_partition_is_skipped_not_fatal() {
        let aggregator = aggregator(FakeProvider::new().failing_mount("/home"));
        let disk = aggregator.capture_disk();
        let disk = disk.value().unwrap();

        assert_eq!(disk.partitions.len(), 1);
        assert_eq!(disk.partitions[0].mountpoint, "/");
        assert_eq!(disk.partitions[0].usage_percent, 25.0);
        assert_eq!(disk.skipped.len(), 1);
        assert_eq!(disk.skipped[0].mountpoint, "/home/");
    }

    #[test]
    fn partitions_are_queried_by_canonical_path() {
        let (aggregator, provider, _) = aggregator_with(FakeProvider::new(), FakeGpu::default());
        let partitions = aggregator.capture_partitions();

        assert_eq!(partitions.value().unwrap().len(), 2, "tmpfs is not a disk");
        assert_eq!(provider.queried_mounts(), vec!["/", "/home"]);
    }

    #[test]
    fn duplicate_and_blank_partitions_are_ignored() {
        let mut provider = FakeProvider::new();
        provider.partitions.push(crate::collectors::Partition {
            device: "/dev/sda2".to_string(),
            mountpoint: "/home".to_string(),
            filesystem: "ext4".to_string(),
        });
        provider.partitions.push(crate::collectors::Partition {
            device: String::new(),
            mountpoint: "/mnt/ghost".to_string(),
            filesystem: "ext4".to_string(),
        });
        let (aggregator, provider, _) = aggregator_with(provider, FakeGpu::default());

        assert_eq!(aggregator.capture_partitions().value().unwrap().len(), 2);
        assert_eq!(provider.queried_mounts().len(), 2);
    }

    #[test]
    fn missing_disk_counters_keep_partitions() {
        let aggregator = aggregator(FakeProvider::new().failing(Read::DiskIo));
        let disk = aggregator.capture_disk();
        let disk = disk.value().unwrap();

        assert_eq!(disk.partitions.len(), 2);
        assert_eq!(disk.read_rate_bytes_per_sec, None);
        assert_eq!(disk.write_rate_bytes_per_sec, None);
    }

    #[test]
    fn connection_failure_keeps_rates() {
        let (aggregator, provider, clock) = aggregator_with(
            FakeProvider::new().failing(Read::Connections),
            FakeGpu::default(),
        );
        aggregator.capture_network();
        clock.advance(Duration::from_secs(1));
        provider.set_network(501_000, 1_004_000);

        let network = aggregator.capture_network();
        let network = network.value().unwrap();
        assert_eq!(network.connection_count, None);
        assert_eq!(network.upload_rate_bytes_per_sec, Some(1_000.0));
        assert_eq!(network.download_rate_bytes_per_sec, Some(4_000.0));
    }

    #[test]
    fn missing_sensors_and_frequency_do_not_fail_cpu() {
        let aggregator = aggregator(
            FakeProvider::new()
                .failing(Read::Temperatures)
                .failing(Read::Frequency),
        );
        let cpu = aggregator.capture_cpu();
        let cpu = cpu.value().unwrap();
        assert_eq!(cpu.temperature_celsius, None);
        assert_eq!(cpu.frequency_mhz, None);
        assert_eq!(cpu.usage_percent, 37.5);
    }

    #[test]
    fn unrecognised_sensors_leave_temperature_absent() {
        let mut provider = FakeProvider::new();
        provider.sensors = vec![SensorReading {
            label: "nvme Composite".to_string(),
            celsius: 35.0,
        }];
        let aggregator = aggregator(provider);
        assert_eq!(
            aggregator.capture_cpu().value().unwrap().temperature_celsius,
            None
        );
    }

    #[test]
    fn cpu_temperature_prefers_known_groups() {
        let readings = vec![
            SensorReading {
                label: "CPU Die".to_string(),
                celsius: 55.0,
            },
            SensorReading {
                label: "k10temp Tctl".to_string(),
                celsius: 61.5,
            },
        ];
        assert_eq!(cpu_temperature(&readings), Some(61.5));
        assert_eq!(cpu_temperature(&readings[..1]), Some(55.0));
        assert_eq!(cpu_temperature(&[]), None);
    }

    #[test]
    fn host_info_combines_provider_reads() {
        let aggregator = aggregator(FakeProvider::new());
        let host = aggregator.capture_host();
        let host = host.value().unwrap();
        assert_eq!(host.hostname.as_deref(), Some("testhost"));
        assert_eq!(host.cpu_count, 4);
        assert_eq!(host.cpu_count_physical, Some(2));
        assert_eq!(host.total_memory_bytes, Some(16_000));
        assert_eq!(host.load_average, [0.5, 0.25, 0.125]);
    }

    #[tokio::test]
    async fn cancellation_returns_completed_categories() {
        let mut provider = FakeProvider::new();
        provider.cpu_delay = Duration::from_millis(600);
        let aggregator = aggregator(provider);

        let cancel = CancelToken::new();
        let _guard = cancel.cancel_after(Duration::from_millis(150));
        let snapshot = aggregator.capture_snapshot(&cancel).await.unwrap();

        assert_eq!(snapshot.cpu.error(), Some("capture cancelled"));
        assert!(snapshot.memory.is_ok());
        assert!(snapshot.disk.is_ok());
        assert!(snapshot.network.is_ok());
        assert!(snapshot.system.is_ok());
        assert!(snapshot.gpu.is_ok());
    }

    #[tokio::test]
    async fn cancelled_token_skips_every_capture() {
        let aggregator = aggregator(FakeProvider::new());
        let cancel = CancelToken::new();
        cancel.cancel();
        let snapshot = aggregator.capture_snapshot(&cancel).await.unwrap();

        assert!(healthy_categories(&snapshot).is_empty());
        assert_eq!(aggregator.rates().channels(), 0);
    }

    #[tokio::test]
    async fn crashed_capture_is_a_total_failure() {
        let mut provider = FakeProvider::new();
        provider.panic_on_memory = true;
        let aggregator = aggregator(provider);

        let result = aggregator.capture_snapshot(&CancelToken::new()).await;
        assert!(matches!(result, Err(CaptureError::Task(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_snapshots_share_one_tracker() {
        let aggregator = Arc::new(SnapshotAggregator::new(
            Arc::new(FakeProvider::new()),
            Arc::new(FakeGpu::default()),
            Duration::from_millis(500),
        ));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let aggregator = Arc::clone(&aggregator);
            handles.push(tokio::spawn(async move {
                aggregator.capture_snapshot(&CancelToken::new()).await
            }));
        }

        for handle in handles {
            let snapshot = handle.await.unwrap().unwrap();
            let network = snapshot.network.value().unwrap();
            for rate in [
                network.upload_rate_bytes_per_sec,
                network.download_rate_bytes_per_sec,
            ]
            .into_iter()
            .flatten()
            {
                assert!(rate >= 0.0 && rate.is_finite());
            }
        }

        let baseline = aggregator.rates().baseline(NETWORK_RECV).unwrap();
        assert_eq!(baseline.value, 1_000_000);
        assert_eq!(aggregator.rates().channels(), 4);
    }
}
