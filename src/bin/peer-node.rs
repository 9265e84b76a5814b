//! Peer node binary
//!
//! Starts a node and drives it from an interactive console: connect to
//! peers, store payloads, request blocks by address.

use anyhow::{bail, Context, Result};
use blockmesh::block::BlockAddress;
use blockmesh::config::NodeConfig;
use blockmesh::peer::{PeerNode, RequestOutcome};
use clap::Parser;
use env_logger::Env;
use std::io::{self, BufRead};
use std::process;

const USAGE: &str = "Invalid command. Use: connect <host> <port>, store <data>, or request <host> <address>";

#[derive(Parser, Debug)]
#[command(name = "peer-node")]
#[command(about = "Content-addressed block exchange peer", long_about = None)]
struct Args {
    /// Bind address (e.g., 127.0.0.1:9400)
    #[arg(short, long)]
    bind: Option<String>,

    /// Node identifier (random when omitted)
    #[arg(long)]
    id: Option<String>,

    /// Optional TOML configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Log level override
    #[arg(long)]
    log_level: Option<String>,
}

fn main() {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => match NodeConfig::load(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Failed to load config {}: {}", path, e);
                process::exit(1);
            }
        },
        None => NodeConfig::default(),
    };
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }
    if let Some(id) = args.id {
        config.node_id = Some(id);
    }
    if let Some(level) = args.log_level {
        config.log_level = level;
    }

    env_logger::Builder::from_env(Env::default().default_filter_or(config.log_level.as_str()))
        .init();

    log::info!("Starting peer node");
    log::info!("  Bind address: {}", config.bind_addr);

    let node = PeerNode::new(&config);
    if let Err(e) = node.start() {
        log::error!("Failed to start node: {}", e);
        process::exit(1);
    }
    println!("Node {} ready", node.node_id());

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(_) => break,
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line.eq_ignore_ascii_case("quit") || line.eq_ignore_ascii_case("exit") {
            break;
        }
        if let Err(e) = dispatch(&node, line) {
            println!("{}", e);
        }
    }

    node.stop();
}

/// Parse one console command and invoke the node
fn dispatch(node: &PeerNode, line: &str) -> Result<()> {
    let (command, rest) = match line.split_once(' ') {
        Some((command, rest)) => (command, rest.trim()),
        None => (line, ""),
    };

    match command.to_ascii_lowercase().as_str() {
        "connect" => {
            let (host, port) = rest.split_once(' ').context(USAGE)?;
            let port: u16 = port.trim().parse().context("invalid port")?;
            node.connect(host, port)?;
            println!("Connected to peer at {}:{}", host, port);
        }
        "store" => {
            if rest.is_empty() {
                bail!(USAGE);
            }
            let address = node.store_block(rest.as_bytes());
            println!("Stored block {}", address);
        }
        "request" => {
            let (host, address) = rest.split_once(' ').context(USAGE)?;
            let address = BlockAddress::from_hex(address.trim())
                .map_err(|_| anyhow::anyhow!("invalid block address"))?;
            match node.request_block(host, &address)? {
                RequestOutcome::Received(stored) => println!("Received block {}", stored),
                RequestOutcome::NotFound => println!("Block not found at peer: {}", host),
                RequestOutcome::TimedOut => {
                    println!("Request timed out. No response received from peer: {}", host)
                }
                RequestOutcome::NoConnection => println!("No connection to peer: {}", host),
                RequestOutcome::Unexpected(reason) => {
                    println!("Unexpected response from peer: {}", reason)
                }
            }
        }
        _ => bail!(USAGE),
    }
    Ok(())
}
