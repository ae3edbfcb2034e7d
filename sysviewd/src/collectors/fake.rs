//! Deterministic provider and clock for tests.

use super::{
    CpuLoad, DiskIoCounters, GpuBackend, GpuDevice, HostDescription, MemoryCounters,
    MetricsProvider, NetIoCounters, Partition, ProviderError, SensorReading, SpaceUsage,
};
use crate::rate::Clock;
use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Provider reads that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Read {
    Cpu,
    Frequency,
    Temperatures,
    Memory,
    Partitions,
    DiskIo,
    Network,
    Connections,
}

pub struct FakeProvider {
    failing: HashSet<Read>,
    failing_mounts: HashSet<String>,
    pub cpu_delay: Duration,
    pub panic_on_memory: bool,
    pub sensors: Vec<SensorReading>,
    pub partitions: Vec<Partition>,
    /// Added to both byte counters after every network read.
    pub net_growth: u64,
    /// Sleep after the network read with this index (0-based).
    pub network_stall: Option<(usize, Duration)>,
    net: Mutex<NetIoCounters>,
    network_reads: AtomicUsize,
    disk: Mutex<DiskIoCounters>,
    queried_mounts: Mutex<Vec<String>>,
}

fn partition(device: &str, mountpoint: &str, filesystem: &str) -> Partition {
    Partition {
        device: device.to_string(),
        mountpoint: mountpoint.to_string(),
        filesystem: filesystem.to_string(),
    }
}

impl FakeProvider {
    pub fn new() -> Self {
        Self {
            failing: HashSet::new(),
            failing_mounts: HashSet::new(),
            cpu_delay: Duration::ZERO,
            panic_on_memory: false,
            sensors: vec![
                SensorReading {
                    label: "acpitz temp1".to_string(),
                    celsius: 27.8,
                },
                SensorReading {
                    label: "coretemp Package id 0".to_string(),
                    celsius: 48.0,
                },
                SensorReading {
                    label: "coretemp Core 0".to_string(),
                    celsius: 46.0,
                },
            ],
            partitions: vec![
                partition("/dev/sda1", "/", "ext4"),
                partition("/dev/sda2", "/home/", "ext4"),
                partition("tmpfs", "/run", "tmpfs"),
            ],
            net_growth: 0,
            network_stall: None,
            net: Mutex::new(NetIoCounters {
                bytes_sent: 500_000,
                bytes_recv: 1_000_000,
                packets_sent: 40,
                packets_recv: 90,
                errors_in: 1,
                errors_out: 0,
            }),
            network_reads: AtomicUsize::new(0),
            disk: Mutex::new(DiskIoCounters {
                read_bytes: 2_000_000,
                written_bytes: 500_000,
                read_count: Some(120),
                write_count: Some(45),
            }),
            queried_mounts: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(mut self, read: Read) -> Self {
        self.failing.insert(read);
        self
    }

    pub fn failing_mount(mut self, mountpoint: &str) -> Self {
        self.failing_mounts.insert(mountpoint.to_string());
        self
    }

    pub fn set_network(&self, bytes_sent: u64, bytes_recv: u64) {
        let mut net = self.net.lock().unwrap();
        net.bytes_sent = bytes_sent;
        net.bytes_recv = bytes_recv;
    }

    pub fn set_disk(&self, read_bytes: u64, written_bytes: u64) {
        let mut disk = self.disk.lock().unwrap();
        disk.read_bytes = read_bytes;
        disk.written_bytes = written_bytes;
    }

    pub fn queried_mounts(&self) -> Vec<String> {
        self.queried_mounts.lock().unwrap().clone()
    }

    fn check(&self, read: Read) -> Result<(), ProviderError> {
        if self.failing.contains(&read) {
            Err(ProviderError::PermissionDenied(format!("{read:?}")))
        } else {
            Ok(())
        }
    }
}

impl MetricsProvider for FakeProvider {
    fn cpu_load(&self, _window: Duration) -> Result<CpuLoad, ProviderError> {
        if !self.cpu_delay.is_zero() {
            std::thread::sleep(self.cpu_delay);
        }
        self.check(Read::Cpu)?;
        Ok(CpuLoad {
            global_percent: 37.5,
            per_core_percent: vec![25.0, 50.0, 30.0, 45.0],
        })
    }

    fn cpu_frequency_mhz(&self) -> Result<Option<f64>, ProviderError> {
        self.check(Read::Frequency)?;
        Ok(Some(2_400.0))
    }

    fn physical_cores(&self) -> Option<usize> {
        Some(2)
    }

    fn temperatures(&self) -> Result<Vec<SensorReading>, ProviderError> {
        self.check(Read::Temperatures)?;
        Ok(self.sensors.clone())
    }

    fn memory(&self) -> Result<MemoryCounters, ProviderError> {
        if self.panic_on_memory {
            panic!("memory backend crashed");
        }
        self.check(Read::Memory)?;
        Ok(MemoryCounters {
            total: 16_000,
            used: 4_000,
            available: 12_000,
            free: 8_000,
            swap_total: 0,
            swap_used: 0,
        })
    }

    fn partitions(&self) -> Result<Vec<Partition>, ProviderError> {
        self.check(Read::Partitions)?;
        Ok(self.partitions.clone())
    }

    fn partition_usage(&self, mountpoint: &str) -> Result<SpaceUsage, ProviderError> {
        self.queried_mounts
            .lock()
            .unwrap()
            .push(mountpoint.to_string());
        if self.failing_mounts.contains(mountpoint) {
            return Err(ProviderError::PermissionDenied(mountpoint.to_string()));
        }
        Ok(SpaceUsage {
            total: 1_000,
            used: 250,
            free: 750,
        })
    }

    fn disk_io(&self) -> Result<DiskIoCounters, ProviderError> {
        self.check(Read::DiskIo)?;
        Ok(*self.disk.lock().unwrap())
    }

    fn network_io(&self) -> Result<NetIoCounters, ProviderError> {
        self.check(Read::Network)?;
        let read = {
            let mut net = self.net.lock().unwrap();
            let read = *net;
            net.bytes_sent += self.net_growth;
            net.bytes_recv += self.net_growth;
            read
        };
        let call = self.network_reads.fetch_add(1, Ordering::SeqCst);
        if let Some((stalled, delay)) = self.network_stall
            && stalled == call
        {
            std::thread::sleep(delay);
        }
        Ok(read)
    }

    fn connection_count(&self) -> Result<usize, ProviderError> {
        self.check(Read::Connections)?;
        Ok(12)
    }

    fn boot_time(&self) -> u64 {
        1_600_000_000
    }

    fn process_count(&self) -> usize {
        321
    }

    fn host(&self) -> HostDescription {
        HostDescription {
            hostname: Some("testhost".to_string()),
            os_name: Some("Linux".to_string()),
            kernel_version: Some("6.1.0".to_string()),
            os_version: Some("Linux 12 Debian".to_string()),
            arch: "x86_64".to_string(),
            logical_cores: 4,
            load_average: [0.5, 0.25, 0.125],
        }
    }
}

#[derive(Default)]
pub struct FakeGpu {
    pub devices: Vec<GpuDevice>,
    pub fail: bool,
}

impl GpuBackend for FakeGpu {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn devices(&self) -> Result<Vec<GpuDevice>, ProviderError> {
        if self.fail {
            return Err(ProviderError::Backend("driver crashed".to_string()));
        }
        Ok(self.devices.clone())
    }
}

/// Clock that only moves when told to.
pub struct ManualClock {
    now: Mutex<Instant>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Mutex::new(Instant::now()),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.now.lock().unwrap() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock().unwrap()
    }
}
