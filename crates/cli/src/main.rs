//! SendFlow CLI - operator controls for running broadcasts
//!
//! Talks JSON-RPC to the daemon, so it acts as a second session: anything it
//! does is picked up by the loop through the shared job record.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tabled::{Table, Tabled};

const DEFAULT_RPC_URL: &str = "http://127.0.0.1:9630";
const PROGRESS_BAR_WIDTH: usize = 30;

#[derive(Parser)]
#[command(name = "sendflow")]
#[command(about = "SendFlow broadcast engine CLI", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// RPC server URL
    #[arg(long, env = "SENDFLOW_RPC_URL", default_value = DEFAULT_RPC_URL)]
    rpc_url: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a broadcast
    Start {
        /// Item ids in priority order (repeat or comma-separate)
        #[arg(short, long = "item", required = true, value_delimiter = ',')]
        items: Vec<String>,

        /// Destination ids (repeat or comma-separate)
        #[arg(short, long = "destination", required = true, value_delimiter = ',')]
        destinations: Vec<String>,

        /// Message template, e.g. "{name} - {price}"
        #[arg(short, long)]
        template: String,

        /// Seconds between two destinations of the same item
        #[arg(long, default_value = "0")]
        destination_delay: u64,

        /// Minutes between two items
        #[arg(long, default_value = "0")]
        item_delay: u64,
    },

    /// Pause a broadcast
    Pause { job_id: String },

    /// Resume a paused or failed broadcast from its checkpoint
    Resume { job_id: String },

    /// Cancel a broadcast
    Cancel { job_id: String },

    /// Show progress of a broadcast
    Progress {
        job_id: String,

        /// Keep refreshing until the broadcast stops running
        #[arg(short, long)]
        watch: bool,

        /// Refresh interval in seconds
        #[arg(long, default_value = "2")]
        interval: u64,
    },

    /// Show the broadcast that can be resumed or is running
    Active,
}

#[derive(Serialize)]
struct JsonRpcRequest {
    jsonrpc: String,
    method: String,
    params: serde_json::Value,
    id: u64,
}

#[derive(Deserialize)]
struct JsonRpcResponse {
    result: Option<serde_json::Value>,
    error: Option<JsonRpcError>,
}

#[derive(Deserialize)]
struct JsonRpcError {
    code: i32,
    message: String,
}

#[derive(Deserialize, Tabled)]
struct StartResult {
    job_id: String,
    status: String,
    total_units: u64,
}

#[derive(Deserialize, Tabled)]
struct ActiveJob {
    job_id: String,
    status: String,
    processed_units: u64,
    total_units: u64,
    sent_count: u64,
    error_count: u64,
}

#[derive(Debug, Deserialize)]
struct ProgressView {
    status: String,
    sent_count: u64,
    error_count: u64,
    total_units: u64,
    processed_units: u64,
    current_item_index: usize,
    item_count: usize,
    is_waiting: bool,
    countdown_seconds: u64,
    estimated_remaining_seconds: u64,
}

impl ProgressView {
    fn is_running(&self) -> bool {
        self.status == "running"
    }
}

async fn call_rpc(url: &str, method: &str, params: serde_json::Value) -> Result<serde_json::Value> {
    let request = JsonRpcRequest {
        jsonrpc: "2.0".to_string(),
        method: method.to_string(),
        params,
        id: 1,
    };

    let client = reqwest::Client::new();
    let response: JsonRpcResponse = client
        .post(url)
        .json(&request)
        .send()
        .await
        .context("Failed to connect to daemon")?
        .json()
        .await
        .context("Failed to parse response")?;

    if let Some(error) = response.error {
        anyhow::bail!("RPC error ({}): {}", error.code, error.message);
    }

    response
        .result
        .ok_or_else(|| anyhow::anyhow!("No result in response"))
}

fn format_duration(seconds: u64) -> String {
    let (h, m, s) = (seconds / 3600, (seconds % 3600) / 60, seconds % 60);
    if h > 0 {
        format!("{}h{:02}m{:02}s", h, m, s)
    } else if m > 0 {
        format!("{}m{:02}s", m, s)
    } else {
        format!("{}s", s)
    }
}

fn progress_bar(processed: u64, total: u64) -> String {
    let filled = if total == 0 {
        PROGRESS_BAR_WIDTH
    } else {
        (processed.min(total) as usize * PROGRESS_BAR_WIDTH) / total as usize
    };
    format!(
        "[{}{}]",
        "#".repeat(filled),
        "-".repeat(PROGRESS_BAR_WIDTH - filled)
    )
}

fn format_progress(p: &ProgressView) -> String {
    let mut line = format!(
        "{} {}/{}  sent {}  errors {}  item {}/{}  [{}]",
        progress_bar(p.processed_units, p.total_units),
        p.processed_units,
        p.total_units,
        p.sent_count,
        p.error_count,
        (p.current_item_index + 1).min(p.item_count),
        p.item_count,
        p.status,
    );
    if p.is_waiting {
        line.push_str(&format!("  next in {}", format_duration(p.countdown_seconds)));
    }
    if p.is_running() && p.estimated_remaining_seconds > 0 {
        line.push_str(&format!(
            "  ~{} left",
            format_duration(p.estimated_remaining_seconds)
        ));
    }
    line
}

async fn control(url: &str, method: &str, job_id: &str, verb: &str) -> Result<()> {
    let result = call_rpc(url, method, json!({ "job_id": job_id })).await?;
    let status = result["status"].as_str().unwrap_or("unknown");
    println!(
        "{} {}",
        format!("✓ Broadcast {} {}", job_id, verb).green().bold(),
        format!("(status: {})", status).dimmed()
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Start {
            items,
            destinations,
            template,
            destination_delay,
            item_delay,
        } => {
            let params = json!({
                "item_ids": items,
                "destination_ids": destinations,
                "template": template,
                "inter_destination_delay_seconds": destination_delay,
                "inter_item_delay_minutes": item_delay,
            });

            let result = call_rpc(&cli.rpc_url, "broadcast.start.v1", params).await?;
            let started: StartResult = serde_json::from_value(result)?;

            println!("{}", "✓ Broadcast started".green().bold());
            println!();
            println!("{}", Table::new(vec![started]));
        }

        Commands::Pause { job_id } => {
            control(&cli.rpc_url, "broadcast.pause.v1", &job_id, "paused").await?;
        }

        Commands::Resume { job_id } => {
            control(&cli.rpc_url, "broadcast.resume.v1", &job_id, "resumed").await?;
        }

        Commands::Cancel { job_id } => {
            control(&cli.rpc_url, "broadcast.cancel.v1", &job_id, "cancelled").await?;
        }

        Commands::Progress {
            job_id,
            watch,
            interval,
        } => loop {
            let result =
                call_rpc(&cli.rpc_url, "broadcast.progress.v1", json!({ "job_id": job_id }))
                    .await?;
            let progress: ProgressView = serde_json::from_value(result)?;
            println!("{}", format_progress(&progress));

            if !watch || !progress.is_running() {
                if progress.error_count > 0 && !progress.is_running() {
                    println!(
                        "{}",
                        format!("{} send(s) failed", progress.error_count).yellow()
                    );
                }
                break;
            }
            tokio::time::sleep(Duration::from_secs(interval.max(1))).await;
        },

        Commands::Active => {
            let result = call_rpc(&cli.rpc_url, "broadcast.active.v1", json!({})).await?;
            match result.get("job").filter(|job| !job.is_null()) {
                Some(job) => {
                    let job: ActiveJob = serde_json::from_value(job.clone())?;
                    println!("{}", Table::new(vec![job]));
                }
                None => println!("{}", "No active broadcast".yellow()),
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view(status: &str, processed: u64, waiting: bool) -> ProgressView {
        ProgressView {
            status: status.to_string(),
            sent_count: processed.saturating_sub(1),
            error_count: processed.min(1),
            total_units: 6,
            processed_units: processed,
            current_item_index: 1,
            item_count: 3,
            is_waiting: waiting,
            countdown_seconds: 75,
            estimated_remaining_seconds: 3700,
        }
    }

    #[test]
    fn test_parse_start() {
        let cli = Cli::try_parse_from([
            "sendflow",
            "start",
            "--item",
            "shoe,bag",
            "-d",
            "g1",
            "-d",
            "g2",
            "--template",
            "{name}",
            "--item-delay",
            "5",
        ])
        .unwrap();

        match cli.command {
            Commands::Start {
                items,
                destinations,
                item_delay,
                destination_delay,
                ..
            } => {
                assert_eq!(items, vec!["shoe", "bag"]);
                assert_eq!(destinations, vec!["g1", "g2"]);
                assert_eq!(item_delay, 5);
                assert_eq!(destination_delay, 0);
            }
            _ => panic!("expected start"),
        }
    }

    #[test]
    fn test_start_requires_items() {
        assert!(Cli::try_parse_from(["sendflow", "start", "-d", "g1", "-t", "x"]).is_err());
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(0), "0s");
        assert_eq!(format_duration(75), "1m15s");
        assert_eq!(format_duration(3700), "1h01m40s");
    }

    #[test]
    fn test_progress_bar() {
        assert_eq!(progress_bar(0, 6), format!("[{}]", "-".repeat(30)));
        assert_eq!(progress_bar(3, 6), format!("[{}{}]", "#".repeat(15), "-".repeat(15)));
        assert_eq!(progress_bar(0, 0), format!("[{}]", "#".repeat(30)));
    }

    #[test]
    fn test_format_progress() {
        let line = format_progress(&view("running", 3, true));
        assert!(line.contains("3/6"));
        assert!(line.contains("item 2/3"));
        assert!(line.contains("next in 1m15s"));
        assert!(line.contains("~1h01m40s left"));

        let line = format_progress(&view("paused", 3, false));
        assert!(!line.contains("next in"));
        assert!(!line.contains("left"));
        assert!(line.contains("[paused]"));
    }
}
