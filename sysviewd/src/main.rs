use anyhow::Result;
use clap::Parser;
use log::info;
use std::path::PathBuf;
use std::sync::Arc;
use sysviewd::collectors::{HostProvider, select_gpu_backend};
use sysviewd::{Config, SnapshotAggregator, api};

#[derive(clap::Parser, Debug)]
#[clap(version, about = "Host telemetry snapshot service")]
struct Args {
    /// Path to the TOML config file
    #[clap(long)]
    config: Option<PathBuf>,

    /// Address to listen on (overrides server.listen_addr)
    #[clap(long)]
    listen: Option<String>,

    /// Port to listen on (overrides server.port)
    #[clap(long)]
    port: Option<u16>,

    /// CPU sampling window in milliseconds (overrides sampling.cpu_window_ms)
    #[clap(long)]
    cpu_window_ms: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let (mut config, source) = Config::load(args.config.as_deref())?;
    config.apply_overrides(args.listen, args.port, args.cpu_window_ms)?;

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.logging.level.as_str()),
    )
    .init();
    match &source {
        Some(path) => info!("[config] loaded {}", path.display()),
        None => info!("[config] no config file found, using defaults"),
    }

    let gpu = select_gpu_backend(config.gpu.enabled);
    let cpu_window = config.sampling.cpu_window();
    info!(
        "[sysviewd] starting v{} (cpu window {} ms, gpu backend {})",
        env!("CARGO_PKG_VERSION"),
        cpu_window.as_millis(),
        gpu.name()
    );

    let aggregator = Arc::new(SnapshotAggregator::new(
        Arc::new(HostProvider::new()),
        gpu,
        cpu_window,
    ));
    api::serve(&config, aggregator).await
}
