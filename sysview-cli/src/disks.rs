use crate::snapshot::{Partition, Section, fetch, format_gb};
use colored::*;
use reqwest::Client;
use serde::Deserialize;
use std::error::Error;

#[derive(Debug, Deserialize)]
pub struct DisksResponse {
    pub disks: Vec<Partition>,
    pub count: usize,
}

pub async fn run_disks(client: &Client, url: &str) -> Result<(), Box<dyn Error>> {
    let listing: Section<DisksResponse> = fetch(client, &format!("{url}/api/disks/all")).await?;
    let listing = match listing {
        Section::Ok(listing) => listing,
        Section::Failed { error } => return Err(format!("disk listing failed: {error}").into()),
    };

    println!(
        "{:<20} {:<24} {:<8} {:>10} {:>10} {:>6}",
        "DEVICE", "MOUNT", "FS", "SIZE", "USED", "USE%"
    );
    for disk in &listing.disks {
        println!(
            "{:<20} {:<24} {:<8} {:>10} {:>10} {:>6}",
            disk.device,
            disk.mountpoint,
            disk.filesystem,
            format_gb(disk.total_bytes),
            format_gb(disk.used_bytes),
            usage_colored(disk.usage_percent)
        );
    }
    println!("{}", format!("{} partitions", listing.count).dimmed());
    Ok(())
}

fn usage_colored(percent: f64) -> ColoredString {
    let text = format!("{percent:.1}");
    if percent >= 90.0 {
        text.red()
    } else if percent >= 75.0 {
        text.yellow()
    } else {
        text.normal()
    }
}
