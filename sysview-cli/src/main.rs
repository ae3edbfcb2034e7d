use clap::{Parser, Subcommand};
use reqwest::Client;
use std::error::Error;

mod disks;
mod doctor;
mod snapshot;

#[derive(clap::Parser, Debug)]
#[clap(version, about = "Terminal client for sysviewd")]
struct Args {
    /// Base URL of the sysviewd service
    #[clap(long, default_value = "http://127.0.0.1:5000")]
    url: String,

    /// Disable colorized output
    #[clap(long)]
    no_color: bool,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, Clone)]
enum Command {
    /// Print one line per metric category
    Snapshot {
        /// Print the raw JSON document instead
        #[clap(long)]
        json: bool,
    },
    /// List mounted partitions and their usage
    Disks,
    /// Check service health and every category endpoint
    Doctor,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    if args.no_color {
        colored::control::set_override(false);
    }

    let client = Client::new();
    let url = args.url.trim_end_matches('/');

    match args.command {
        Command::Snapshot { json } => snapshot::run_snapshot(&client, url, json).await?,
        Command::Disks => disks::run_disks(&client, url).await?,
        Command::Doctor => doctor::run_doctor(&client, url).await?,
    }
    Ok(())
}
