//! Host metrics through `sysinfo`, with `procfs` for the Linux-only tables
//! (per-device I/O, socket counts).

use super::{
    CpuLoad, DiskIoCounters, HostDescription, MemoryCounters, MetricsProvider, NetIoCounters,
    Partition, ProviderError, SensorReading, SpaceUsage,
};
use crate::utils::mounts::canonical_mountpoint;
use log::debug;
use std::time::Duration;
use sysinfo::{
    Components, Disks, MINIMUM_CPU_UPDATE_INTERVAL, Networks, ProcessesToUpdate, System,
};

/// Stateless: every call builds the `sysinfo` handles it needs, so
/// concurrent polls never contend on a shared `System`.
#[derive(Debug, Default, Clone, Copy)]
pub struct HostProvider;

impl HostProvider {
    pub fn new() -> Self {
        Self
    }
}

impl MetricsProvider for HostProvider {
    fn cpu_load(&self, window: Duration) -> Result<CpuLoad, ProviderError> {
        let window = window.max(MINIMUM_CPU_UPDATE_INTERVAL);
        let mut sys = System::new();
        sys.refresh_cpu_usage();
        std::thread::sleep(window);
        sys.refresh_cpu_usage();

        let cpus = sys.cpus();
        if cpus.is_empty() {
            return Err(ProviderError::Unavailable("CPU usage counters".to_string()));
        }
        Ok(CpuLoad {
            global_percent: f64::from(sys.global_cpu_usage()),
            per_core_percent: cpus.iter().map(|cpu| f64::from(cpu.cpu_usage())).collect(),
        })
    }

    fn cpu_frequency_mhz(&self) -> Result<Option<f64>, ProviderError> {
        let mut sys = System::new();
        sys.refresh_cpu_frequency();
        Ok(sys
            .cpus()
            .first()
            .map(|cpu| cpu.frequency())
            .filter(|mhz| *mhz > 0)
            .map(|mhz| mhz as f64))
    }

    fn physical_cores(&self) -> Option<usize> {
        System::physical_core_count()
    }

    fn temperatures(&self) -> Result<Vec<SensorReading>, ProviderError> {
        let components = Components::new_with_refreshed_list();
        Ok(components
            .list()
            .iter()
            .filter_map(|component| {
                let celsius = f64::from(component.temperature()?);
                celsius.is_finite().then(|| SensorReading {
                    label: component.label().to_string(),
                    celsius,
                })
            })
            .collect())
    }

    fn memory(&self) -> Result<MemoryCounters, ProviderError> {
        let mut sys = System::new();
        sys.refresh_memory();
        let total = sys.total_memory();
        if total == 0 {
            return Err(ProviderError::Unavailable("memory counters".to_string()));
        }
        Ok(MemoryCounters {
            total,
            used: sys.used_memory(),
            available: sys.available_memory(),
            free: sys.free_memory(),
            swap_total: sys.total_swap(),
            swap_used: sys.used_swap(),
        })
    }

    fn partitions(&self) -> Result<Vec<Partition>, ProviderError> {
        let disks = Disks::new_with_refreshed_list();
        Ok(disks
            .list()
            .iter()
            .map(|disk| Partition {
                device: disk.name().to_string_lossy().into_owned(),
                mountpoint: disk.mount_point().to_string_lossy().into_owned(),
                filesystem: disk.file_system().to_string_lossy().into_owned(),
            })
            .collect())
    }

    fn partition_usage(&self, mountpoint: &str) -> Result<SpaceUsage, ProviderError> {
        let disks = Disks::new_with_refreshed_list();
        disks
            .list()
            .iter()
            .find(|disk| canonical_mountpoint(&disk.mount_point().to_string_lossy()) == mountpoint)
            .map(|disk| {
                let total = disk.total_space();
                let free = disk.available_space();
                SpaceUsage {
                    total,
                    used: total.saturating_sub(free),
                    free,
                }
            })
            .ok_or_else(|| ProviderError::Unavailable(format!("filesystem at {mountpoint}")))
    }

    fn disk_io(&self) -> Result<DiskIoCounters, ProviderError> {
        #[cfg(target_os = "linux")]
        {
            linux_disk_io()
        }
        #[cfg(not(target_os = "linux"))]
        {
            sysinfo_disk_io()
        }
    }

    fn network_io(&self) -> Result<NetIoCounters, ProviderError> {
        let networks = Networks::new_with_refreshed_list();
        if networks.list().is_empty() {
            return Err(ProviderError::Unavailable("network interfaces".to_string()));
        }
        Ok(networks
            .list()
            .values()
            .fold(NetIoCounters::default(), |acc, data| NetIoCounters {
                bytes_sent: acc.bytes_sent.saturating_add(data.total_transmitted()),
                bytes_recv: acc.bytes_recv.saturating_add(data.total_received()),
                packets_sent: acc
                    .packets_sent
                    .saturating_add(data.total_packets_transmitted()),
                packets_recv: acc
                    .packets_recv
                    .saturating_add(data.total_packets_received()),
                errors_in: acc
                    .errors_in
                    .saturating_add(data.total_errors_on_received()),
                errors_out: acc
                    .errors_out
                    .saturating_add(data.total_errors_on_transmitted()),
            }))
    }

    fn connection_count(&self) -> Result<usize, ProviderError> {
        #[cfg(target_os = "linux")]
        {
            let tcp = procfs::net::tcp()?.len();
            let udp = procfs::net::udp()?.len();
            // Missing when IPv6 is disabled.
            let tcp6 = procfs::net::tcp6().map(|v| v.len()).unwrap_or(0);
            let udp6 = procfs::net::udp6().map(|v| v.len()).unwrap_or(0);
            Ok(tcp + udp + tcp6 + udp6)
        }
        #[cfg(not(target_os = "linux"))]
        {
            Err(ProviderError::Unsupported("socket table"))
        }
    }

    fn boot_time(&self) -> u64 {
        System::boot_time()
    }

    fn process_count(&self) -> usize {
        let mut sys = System::new();
        sys.refresh_processes(ProcessesToUpdate::All, true);
        sys.processes().len()
    }

    fn host(&self) -> HostDescription {
        let load = System::load_average();
        HostDescription {
            hostname: System::host_name(),
            os_name: System::name(),
            kernel_version: System::kernel_version(),
            os_version: System::long_os_version(),
            arch: std::env::consts::ARCH.to_string(),
            logical_cores: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            load_average: [load.one, load.five, load.fifteen],
        }
    }
}

#[cfg(target_os = "linux")]
impl From<procfs::ProcError> for ProviderError {
    fn from(err: procfs::ProcError) -> Self {
        match err {
            procfs::ProcError::PermissionDenied(path) => Self::PermissionDenied(
                path.map(|p| p.display().to_string())
                    .unwrap_or_else(|| "procfs".to_string()),
            ),
            procfs::ProcError::NotFound(path) => Self::Unavailable(
                path.map(|p| p.display().to_string())
                    .unwrap_or_else(|| "procfs entry".to_string()),
            ),
            other => Self::Backend(other.to_string()),
        }
    }
}

/// /proc/diskstats counts in 512-byte sectors regardless of the device.
#[cfg(target_os = "linux")]
const DISKSTATS_SECTOR_BYTES: u64 = 512;

#[cfg(target_os = "linux")]
fn linux_disk_io() -> Result<DiskIoCounters, ProviderError> {
    let stats = procfs::diskstats()?;
    let mut counters = DiskIoCounters {
        read_count: Some(0),
        write_count: Some(0),
        ..DiskIoCounters::default()
    };
    let mut devices = 0usize;
    for stat in stats.iter().filter(|s| is_whole_disk(&s.name)) {
        counters.read_bytes = counters
            .read_bytes
            .saturating_add(stat.sectors_read as u64 * DISKSTATS_SECTOR_BYTES);
        counters.written_bytes = counters
            .written_bytes
            .saturating_add(stat.sectors_written as u64 * DISKSTATS_SECTOR_BYTES);
        counters.read_count = counters.read_count.map(|n| n.saturating_add(stat.reads as u64));
        counters.write_count = counters.write_count.map(|n| n.saturating_add(stat.writes as u64));
        devices += 1;
    }
    if devices == 0 {
        return Err(ProviderError::Unavailable("block device counters".to_string()));
    }
    debug!("[collector] summed I/O over {devices} block devices");
    Ok(counters)
}

#[cfg(not(target_os = "linux"))]
fn sysinfo_disk_io() -> Result<DiskIoCounters, ProviderError> {
    let disks = Disks::new_with_refreshed_list();
    if disks.list().is_empty() {
        return Err(ProviderError::Unavailable("disk I/O counters".to_string()));
    }
    Ok(disks
        .list()
        .iter()
        .fold(DiskIoCounters::default(), |acc, disk| {
            let usage = disk.usage();
            DiskIoCounters {
                read_bytes: acc.read_bytes.saturating_add(usage.total_read_bytes),
                written_bytes: acc.written_bytes.saturating_add(usage.total_written_bytes),
                ..acc
            }
        }))
}

/// Whole physical disks only; partitions and virtual devices would double count.
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn is_whole_disk(name: &str) -> bool {
    const VIRTUAL_PREFIXES: &[&str] = &["loop", "ram", "dm-", "md", "zram", "sr", "fd", "nbd"];
    if VIRTUAL_PREFIXES.iter().any(|prefix| name.starts_with(prefix)) {
        return false;
    }
    if name.starts_with("nvme") || name.starts_with("mmcblk") {
        // nvme0n1 is a disk, nvme0n1p2 a partition.
        return !name.contains('p');
    }
    !name.chars().last().is_some_and(|c| c.is_ascii_digit())
}
