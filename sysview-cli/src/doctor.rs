use crate::snapshot::fetch;
use colored::*;
use reqwest::Client;
use serde::Deserialize;
use std::error::Error;

const CATEGORIES: [&str; 6] = ["cpu", "memory", "disk", "network", "system", "gpu"];

#[derive(Deserialize, Debug)]
struct HealthResponse {
    status: String,
}

/// Reports on the service and each category. Problems are printed, never
/// returned, so the command succeeds whenever it could run.
pub async fn run_doctor(client: &Client, url: &str) -> Result<(), Box<dyn Error>> {
    println!("{}", "sysview doctor".bold().cyan());
    println!("{}", format!("Checking {url} ...").dimmed());
    println!();

    let mut all_good = true;

    print!("• {:<10} ", "service");
    match fetch::<HealthResponse>(client, &format!("{url}/health")).await {
        Ok(health) if health.status == "healthy" => println!("{}", "OK".green()),
        Ok(health) => {
            println!("{}", format!("WARN (status {})", health.status).yellow());
            all_good = false;
        }
        Err(e) => {
            println!("{}", format!("FAIL ({e})").red());
            println!("  → Is sysviewd running? Try 'systemctl status sysviewd'");
            return Ok(());
        }
    }

    for category in CATEGORIES {
        print!("• {category:<10} ");
        match fetch::<serde_json::Value>(client, &format!("{url}/api/{category}")).await {
            Ok(body) => match body.get("error").and_then(|e| e.as_str()) {
                Some(error) => {
                    println!("{}", format!("FAIL ({error})").red());
                    all_good = false;
                }
                None => println!("{}", "OK".green()),
            },
            Err(e) => {
                println!("{}", format!("FAIL ({e})").red());
                all_good = false;
            }
        }
    }

    println!();
    if all_good {
        println!("{}", "All categories are reporting.".bold().green());
    } else {
        println!("{}", "Some checks failed. See above.".bold().yellow());
    }
    Ok(())
}
