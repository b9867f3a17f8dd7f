// Interactive line client for the chatcast relay.
//
// Connects to a relay, sends every stdin line, and prints every broadcast it
// receives. Stdin is read on a helper thread and handed over an `mpsc`
// channel so the main loop can interleave typing with incoming lines.
//
// Usage:
//   chat <PORT> [--host <ADDR>]

use std::io::{BufRead, Write};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::mpsc::{self, TryRecvError};
use std::thread;
use std::time::Duration;

use anyhow::Context;
use chatcast_relay::client::{ClientEvent, RelayClient};
use clap::Parser;
use tracing_subscriber::EnvFilter;

const PROMPT: &str = "Enter message: ";
const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Parser)]
#[command(name = "chat", about = "Talk to a chatcast relay")]
struct Args {
    /// Relay port
    port: u16,

    #[arg(long, default_value_t = IpAddr::V4(Ipv4Addr::LOCALHOST))]
    host: IpAddr,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(Args::parse()) {
        eprintln!("{e:#}");
        std::process::exit(1);
    }
}

fn run(args: Args) -> anyhow::Result<()> {
    let addr = SocketAddr::new(args.host, args.port);
    let mut client = RelayClient::connect(addr).context("connect failed")?;

    println!("Connected to server on port {}", args.port);
    prompt();

    let (line_tx, line_rx) = mpsc::channel();
    thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if line_tx.send(line).is_err() {
                break;
            }
        }
    });

    let mut stdin_open = true;
    loop {
        if stdin_open {
            match line_rx.try_recv() {
                Ok(line) => {
                    client.send_line(&line).context("send failed")?;
                    prompt();
                }
                Err(TryRecvError::Empty) => {}
                Err(TryRecvError::Disconnected) => stdin_open = false,
            }
        }

        let events = client.poll();
        if events.is_empty() {
            thread::sleep(POLL_INTERVAL);
        }
        for event in events {
            match event {
                ClientEvent::Line(line) => {
                    println!("\nReceived broadcast message: {line}");
                    prompt();
                }
                ClientEvent::Closed => {
                    println!("\nServer closed the connection");
                    return Ok(());
                }
            }
        }
    }
}

fn prompt() {
    print!("{PROMPT}");
    let _ = std::io::stdout().flush();
}
