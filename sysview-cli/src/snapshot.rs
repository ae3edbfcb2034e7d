use colored::*;
use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::error::Error;

const KB: f64 = 1024.0;
const MB: f64 = 1024.0 * 1024.0;
const GB: f64 = 1024.0 * 1024.0 * 1024.0;

/// A category as served by sysviewd: either its values or an error marker.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum Section<T> {
    Failed { error: String },
    Ok(T),
}

#[derive(Debug, Deserialize)]
pub struct Cpu {
    pub usage_percent: f64,
    pub frequency_mhz: Option<f64>,
    pub cores: usize,
    pub temperature_celsius: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct Memory {
    pub usage_percent: f64,
    pub used_bytes: u64,
    pub total_bytes: u64,
}

#[derive(Debug, Deserialize)]
pub struct Partition {
    pub device: String,
    pub mountpoint: String,
    #[serde(default)]
    pub filesystem: String,
    pub used_bytes: u64,
    pub total_bytes: u64,
    pub usage_percent: f64,
}

#[derive(Debug, Deserialize)]
pub struct Disk {
    pub partitions: Vec<Partition>,
    pub read_rate_bytes_per_sec: Option<f64>,
    pub write_rate_bytes_per_sec: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct Network {
    pub upload_rate_bytes_per_sec: Option<f64>,
    pub download_rate_bytes_per_sec: Option<f64>,
    pub connection_count: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct System {
    pub uptime_seconds: u64,
    pub process_count: usize,
}

#[derive(Debug, Deserialize)]
pub struct GpuDevice {
    pub id: u32,
    pub name: String,
    pub load_percent: f64,
    pub memory_used_bytes: u64,
    pub memory_total_bytes: u64,
    pub temperature_celsius: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct Gpu {
    pub devices: Vec<GpuDevice>,
}

#[derive(Debug, Deserialize)]
pub struct Snapshot {
    pub cpu: Section<Cpu>,
    pub memory: Section<Memory>,
    pub disk: Section<Disk>,
    pub network: Section<Network>,
    pub system: Section<System>,
    pub gpu: Section<Gpu>,
    pub timestamp: String,
}

pub async fn run_snapshot(client: &Client, url: &str, json: bool) -> Result<(), Box<dyn Error>> {
    if json {
        let body: serde_json::Value = fetch(client, &format!("{url}/api/system-info")).await?;
        println!("{}", serde_json::to_string_pretty(&body)?);
        return Ok(());
    }

    let snapshot: Snapshot = fetch(client, &format!("{url}/api/system-info")).await?;
    println!("{}", snapshot.timestamp.dimmed());
    for line in render(&snapshot) {
        println!("{line}");
    }
    Ok(())
}

/// GETs `url` and decodes the body, turning a non-2xx reply into an error
/// that carries the server's message.
pub async fn fetch<T: DeserializeOwned>(client: &Client, url: &str) -> Result<T, Box<dyn Error>> {
    let resp = client.get(url).send().await?;
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(format!("{url} returned {status}: {body}").into());
    }
    Ok(resp.json().await?)
}

pub fn render(snapshot: &Snapshot) -> Vec<String> {
    vec![
        section("CPU", &snapshot.cpu, |cpu| {
            let mut line = format!(
                "{}  {} cores",
                format_pct(cpu.usage_percent),
                cpu.cores
            );
            if let Some(mhz) = cpu.frequency_mhz {
                line.push_str(&format!("  {mhz:.0} MHz"));
            }
            if let Some(celsius) = cpu.temperature_celsius {
                line.push_str(&format!("  {celsius:.1}°C"));
            }
            line
        }),
        section("Memory", &snapshot.memory, |mem| {
            format!(
                "{}  {} / {}",
                format_pct(mem.usage_percent),
                format_gb(mem.used_bytes),
                format_gb(mem.total_bytes)
            )
        }),
        section("Disk", &snapshot.disk, |disk| {
            format!(
                "read {}  write {}  ({} partitions)",
                format_rate(disk.read_rate_bytes_per_sec),
                format_rate(disk.write_rate_bytes_per_sec),
                disk.partitions.len()
            )
        }),
        section("Network", &snapshot.network, |net| {
            let connections = match net.connection_count {
                Some(count) => format!("{count} connections"),
                None => "connections n/a".to_string(),
            };
            format!(
                "up {}  down {}  {}",
                format_rate(net.upload_rate_bytes_per_sec),
                format_rate(net.download_rate_bytes_per_sec),
                connections
            )
        }),
        section("System", &snapshot.system, |sys| {
            format!(
                "up {}  {} processes",
                format_uptime(sys.uptime_seconds),
                sys.process_count
            )
        }),
        section("GPU", &snapshot.gpu, |gpu| {
            if gpu.devices.is_empty() {
                return "none".dimmed().to_string();
            }
            gpu.devices
                .iter()
                .map(|dev| {
                    let mut line = format!(
                        "#{} {} {:.0}%  {} / {}",
                        dev.id,
                        dev.name,
                        dev.load_percent,
                        format_gb(dev.memory_used_bytes),
                        format_gb(dev.memory_total_bytes)
                    );
                    if let Some(celsius) = dev.temperature_celsius {
                        line.push_str(&format!("  {celsius:.0}°C"));
                    }
                    line
                })
                .collect::<Vec<_>>()
                .join("; ")
        }),
    ]
}

fn section<T>(label: &str, section: &Section<T>, describe: impl Fn(&T) -> String) -> String {
    let body = match section {
        Section::Ok(value) => describe(value),
        Section::Failed { error } => format!("error: {error}").red().to_string(),
    };
    format!("{:<8} {}", label.bold(), body)
}

fn format_pct(value: f64) -> String {
    let text = format!("{value:.1}%");
    if value >= 90.0 {
        text.red().to_string()
    } else if value >= 75.0 {
        text.yellow().to_string()
    } else {
        text.green().to_string()
    }
}

/// Per-second rate in B/s, KB/s or MB/s; `-` before the second poll.
pub fn format_rate(rate: Option<f64>) -> String {
    match rate {
        None => "-".to_string(),
        Some(bps) if bps < KB => format!("{bps:.0} B/s"),
        Some(bps) if bps < MB => format!("{:.1} KB/s", bps / KB),
        Some(bps) => format!("{:.1} MB/s", bps / MB),
    }
}

pub fn format_gb(bytes: u64) -> String {
    format!("{:.1} GB", bytes as f64 / GB)
}

pub fn format_uptime(seconds: u64) -> String {
    let days = seconds / 86_400;
    let hours = seconds % 86_400 / 3_600;
    let minutes = seconds % 3_600 / 60;
    if days > 0 {
        format!("{days}d {hours}h {minutes}m")
    } else if hours > 0 {
        format!("{hours}h {minutes}m")
    } else {
        format!("{minutes}m")
    }
}
