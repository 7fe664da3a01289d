// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! HADOCK VMU packet archiver.
//!
//! # Usage
//!
//! ```bash
//! # Store packets arriving over TCP into the configured archives
//! hadock listen hdk.json
//!
//! # Send VMU packets from an HRDP archive over the network
//! hadock replay -r 8M 10.0.0.1:9090 /archive/hrdp
//!
//! # Print notification messages broadcast by the pool
//! hadock monitor 239.0.0.1:5555
//! ```

mod config;
mod listen;
mod monitor;
mod replay;
mod stats;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Process VMU packets.
#[derive(Parser, Debug)]
#[command(name = "hadock")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Store packets arriving over TCP into the configured archives
    Listen {
        /// Configuration file (JSON)
        config: PathBuf,
    },
    /// Send VMU packets from HRDP archives over the network
    Replay {
        /// Byte rate, e.g. 8M
        #[arg(short, long, default_value = "8M")]
        rate: String,
        /// v2 fragment size; 0 sends whole v1 frames
        #[arg(short = 's', long, default_value_t = 0)]
        chunk: usize,
        /// VMU protocol version
        #[arg(short = 't', long, default_value_t = 2)]
        vmu: u8,
        /// Instance byte
        #[arg(short = 'm', long, default_value_t = 255)]
        instance: u8,
        /// Stop after this many packets; 0 replays everything
        #[arg(short = 'n', long, default_value_t = 0)]
        count: u64,
        /// Peer address
        addr: String,
        /// HRDP archives (files or directories)
        #[arg(required = true)]
        archives: Vec<PathBuf>,
    },
    /// Print notification messages broadcast by the pool
    Monitor {
        /// UDP addresses to listen on
        #[arg(required = true)]
        groups: Vec<String>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = match cli.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Command::Listen { config } => {
            let cfg = config::Config::from_file(&config)?;
            listen::run(&cfg)
        }
        Command::Replay {
            rate,
            chunk,
            vmu,
            instance,
            count,
            addr,
            archives,
        } => replay::run(&replay::ReplayOptions {
            addr,
            archives,
            rate,
            chunk,
            vmu_version: vmu,
            instance,
            count,
        }),
        Command::Monitor { groups } => monitor::run(&groups),
    }
}
