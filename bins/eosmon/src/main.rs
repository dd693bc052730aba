//! eosmon - watch a console synchronize its show database.

use std::io::{self, Write};
use std::thread;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use eosync::{EosConsole, SyncData};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "eosmon", version, about = "Console show-database monitor")]
struct Cli {
    /// Console address.
    #[arg(default_value = "127.0.0.1")]
    host: String,

    /// Console OSC/TCP port.
    #[arg(short, long, default_value_t = EosConsole::DEFAULT_PORT)]
    port: u16,

    /// Tick interval in milliseconds.
    #[arg(long, default_value_t = 10)]
    interval: u64,

    /// Print the summary as JSON.
    #[arg(short, long)]
    json: bool,

    /// Show library log records (wire traffic at RUST_LOG=debug).
    #[arg(short, long)]
    verbose: bool,

    /// Exit after the first successful synchronization.
    #[arg(long)]
    once: bool,
}

#[derive(Serialize)]
struct SummaryEntry {
    #[serde(rename = "type")]
    target_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    list: Option<i32>,
    targets: usize,
}

fn summarize(data: &SyncData) -> Vec<SummaryEntry> {
    data.show_data()
        .iter()
        .flat_map(|(ttype, lists)| {
            lists.iter().map(|(list_id, list)| SummaryEntry {
                target_type: ttype.name(),
                list: (*list_id > 0).then_some(*list_id),
                targets: list.num_targets(),
            })
        })
        .collect()
}

fn print_summary(data: &SyncData, json: bool) -> Result<()> {
    let entries = summarize(data);
    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
    } else {
        for entry in &entries {
            match entry.list {
                Some(id) => println!("{} list {}:\t{}", entry.target_type, id, entry.targets),
                None => println!("{}:\t{}", entry.target_type, entry.targets),
            }
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(if cli.verbose { "info" } else { "warn" })
        }))
        .init();

    let mut console = EosConsole::new();
    println!("Connecting to {}:{}...", cli.host, cli.port);
    console.initialize(&cli.host, cli.port)?;

    let mut was_connected = false;
    let mut was_synchronized = false;

    while console.is_running() {
        console.tick();
        // records are mirrored to tracing as they are appended; draining
        // just keeps the queue bounded
        console.drain_log();

        let is_connected = console.is_connected();
        let is_synchronized = console.is_synchronized();

        if was_connected != is_connected {
            if is_connected {
                println!("Connected");
                println!("Synchronizing");
            } else {
                println!("Disconnected");
                break;
            }
        }

        if is_connected {
            if !is_synchronized && console.data().status().dirty() {
                print!(".");
                io::stdout().flush().ok();
            }

            if was_synchronized != is_synchronized {
                if is_synchronized {
                    println!();
                    println!("Synchronized");
                    print_summary(console.data(), cli.json)?;
                    if cli.once {
                        break;
                    }
                } else {
                    println!("Not synchronized...");
                }
            }

            console.clear_dirty();
        }

        was_connected = is_connected;
        was_synchronized = is_synchronized;

        thread::sleep(Duration::from_millis(cli.interval));
    }

    console.shutdown();
    Ok(())
}
