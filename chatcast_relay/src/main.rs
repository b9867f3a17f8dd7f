// CLI entry point for the chatcast broadcast relay.
//
// Starts the relay, forwards stdin lines to it as operator messages, and
// blocks until the event loop ends. Setup failures (bad config, bind
// failure) exit with status 1. See `server.rs` for the event loop.
//
// Usage:
//   relay [PORT] [OPTIONS]
//     --config <FILE>         JSON config file (flags override it)
//     --host <ADDR>           Bind address (default: 0.0.0.0)
//     --capacity <N>          Max concurrent clients (default: 5)
//     --buffer-size <BYTES>   Max inbound message size (default: 1024)
//     --framing <MODE>        `lines` or `raw` (default: lines)
//     --outbox-limit <BYTES>  Per-client queued output cap (default: 65536)
//
// Log verbosity follows `RUST_LOG` (default `info`).

use std::io::BufReader;
use std::net::IpAddr;
use std::path::PathBuf;

use anyhow::Context;
use chatcast_protocol::Framing;
use chatcast_relay::operator::spawn_line_reader;
use chatcast_relay::{RelayConfig, start_relay};
use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "relay", about = "Broadcast every message to every connected client")]
struct Args {
    /// Listen port (default: 7878)
    port: Option<u16>,

    /// JSON config file; command-line flags take precedence
    #[arg(long)]
    config: Option<PathBuf>,

    /// Listen port (same as the positional argument)
    #[arg(long = "port", conflicts_with = "port")]
    port_flag: Option<u16>,

    #[arg(long)]
    host: Option<IpAddr>,

    #[arg(long)]
    capacity: Option<usize>,

    #[arg(long)]
    buffer_size: Option<usize>,

    /// `lines` (newline-delimited) or `raw` (one message per read)
    #[arg(long)]
    framing: Option<Framing>,

    #[arg(long)]
    outbox_limit: Option<usize>,
}

impl Args {
    /// Defaults, then the config file, then flags.
    fn into_config(self) -> anyhow::Result<RelayConfig> {
        let mut config = match &self.config {
            Some(path) => RelayConfig::from_json_file(path)?,
            None => RelayConfig::default(),
        };
        if let Some(port) = self.port.or(self.port_flag) {
            config.port = port;
        }
        if let Some(host) = self.host {
            config.host = host;
        }
        if let Some(capacity) = self.capacity {
            config.capacity = capacity;
        }
        if let Some(buffer_size) = self.buffer_size {
            config.buffer_size = buffer_size;
        }
        if let Some(framing) = self.framing {
            config.framing = framing;
        }
        if let Some(outbox_limit) = self.outbox_limit {
            config.outbox_limit = outbox_limit;
        }
        Ok(config)
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(Args::parse()) {
        error!("{e:#}");
        std::process::exit(1);
    }
}

fn run(args: Args) -> anyhow::Result<()> {
    let config = args.into_config()?;
    let (handle, addr) = start_relay(config).context("failed to start relay")?;
    println!("Server is listening on port {}...", addr.port());

    // Detached: stdin EOF ends the reader, not the relay.
    let _stdin_reader = spawn_line_reader(BufReader::new(std::io::stdin()), handle.operator());

    handle.wait().context("relay stopped")?;
    Ok(())
}
