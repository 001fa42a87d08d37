//! CLI wiring for the warptune developer toolkit.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "warptune", about = "warptune developer toolkit")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Summarize a tuning cache file: header, record count, best records.
    CacheInfo {
        file: PathBuf,
        /// How many of the best records to print.
        #[arg(long, default_value_t = 5)]
        top: usize,
    },
}

pub fn init_tracing() {
    tracing_subscriber::fmt::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
}

pub fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::CacheInfo { file, top } => cache_info(&file, top),
    }
}

fn cache_info(file: &PathBuf, top: usize) -> Result<()> {
    let contents = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;

    let mut lines = contents.lines().filter(|line| !line.trim().is_empty());
    let header_line = match lines.next() {
        Some(line) => line,
        None => bail!("{} is empty", file.display()),
    };

    let header: serde_json::Value = serde_json::from_str(header_line)
        .with_context(|| format!("{} does not start with a JSON header", file.display()))?;

    println!("kernel:   {}", header["kernel_name"].as_str().unwrap_or("?"));
    println!("source:   {}", header["kernel_source"].as_str().unwrap_or("?"));
    println!("device:   {}", header["device"].as_str().unwrap_or("?"));
    println!("host:     {}", header["hostname"].as_str().unwrap_or("?"));
    println!("written:  {}", header["date"].as_str().unwrap_or("?"));

    if let Some(params) = header["parameters"].as_array() {
        let names: Vec<&str> = params
            .iter()
            .filter_map(|p| p["name"].as_str())
            .collect();
        println!("params:   {}", names.join(", "));
    }

    let mut records: Vec<(f64, String)> = Vec::new();
    let mut skipped = 0usize;
    for line in lines {
        match serde_json::from_str::<serde_json::Value>(line) {
            Ok(record) => {
                let performance = record["performance"].as_f64().unwrap_or(f64::NEG_INFINITY);
                let key = record["key"].as_str().unwrap_or("?").to_string();
                records.push((performance, key));
            }
            Err(_) => skipped += 1,
        }
    }

    println!("records:  {}", records.len());
    if skipped > 0 {
        info!(skipped, "some records could not be parsed");
    }

    records.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    for (performance, key) in records.iter().take(top) {
        println!("  {performance:>14.4}  {key}");
    }

    Ok(())
}
