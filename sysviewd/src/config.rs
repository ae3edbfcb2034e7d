use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/sysview/sysview.toml";
pub const CONFIG_ENV: &str = "SYSVIEW_CONFIG";

const MAX_CPU_WINDOW: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub sampling: SamplingConfig,
    pub gpu: GpuConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: String,
    pub port: u16,
    /// Per-request capture deadline. Categories still running when it
    /// expires are reported as cancelled.
    pub request_timeout_ms: u64,
    /// Send `Access-Control-Allow-Origin: *` so dashboards on another origin
    /// can poll the API.
    pub cors_allow_any: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0".to_string(),
            port: 5000,
            request_timeout_ms: 5_000,
            cors_allow_any: true,
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.listen_addr, self.port)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    pub cpu_window_ms: u64,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self { cpu_window_ms: 500 }
    }
}

impl SamplingConfig {
    /// CPU sampling window, kept between sysinfo's minimum refresh interval
    /// and one second.
    pub fn cpu_window(&self) -> Duration {
        Duration::from_millis(self.cpu_window_ms)
            .clamp(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL, MAX_CPU_WINDOW)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GpuConfig {
    pub enabled: bool,
}

impl Default for GpuConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Loads the config from `explicit`, `$SYSVIEW_CONFIG`, or the default
    /// path, in that order. Falls back to built-in defaults when none exists.
    ///
    /// Returns the file that was read, if any. Nothing is logged here since
    /// the logger is configured from the result.
    pub fn load(explicit: Option<&Path>) -> Result<(Self, Option<PathBuf>)> {
        let from_env = std::env::var_os(CONFIG_ENV).map(PathBuf::from);
        let path = resolve_path_with(
            explicit,
            from_env.as_deref(),
            Path::new(DEFAULT_CONFIG_PATH),
        );
        match path {
            Some(path) => Ok((Self::from_file(&path)?, Some(path))),
            None => Ok((Self::default(), None)),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let config = Self::from_toml(&text)
            .with_context(|| format!("invalid config {}", path.display()))?;
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            !self.server.listen_addr.trim().is_empty(),
            "server.listen_addr must not be empty"
        );
        ensure!(self.server.port != 0, "server.port must be non-zero");
        ensure!(
            self.server.request_timeout_ms != 0,
            "server.request_timeout_ms must be non-zero"
        );
        self.logging
            .level
            .parse::<log::LevelFilter>()
            .with_context(|| format!("unknown logging.level {:?}", self.logging.level))?;
        Ok(())
    }

    /// Applies command-line overrides on top of the file values.
    pub fn apply_overrides(
        &mut self,
        listen_addr: Option<String>,
        port: Option<u16>,
        cpu_window_ms: Option<u64>,
    ) -> Result<()> {
        if let Some(listen_addr) = listen_addr {
            self.server.listen_addr = listen_addr;
        }
        if let Some(port) = port {
            self.server.port = port;
        }
        if let Some(cpu_window_ms) = cpu_window_ms {
            self.sampling.cpu_window_ms = cpu_window_ms;
        }
        self.validate()
    }
}

/// Picks the config file to read. `default` is only used when it exists.
pub fn resolve_path_with(
    explicit: Option<&Path>,
    from_env: Option<&Path>,
    default: &Path,
) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    if let Some(path) = from_env
        && !path.as_os_str().is_empty()
    {
        return Some(path.to_path_buf());
    }
    default.exists().then(|| default.to_path_buf())
}
