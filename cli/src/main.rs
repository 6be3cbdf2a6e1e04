// qroute: adaptive packet router CLI
//
// Runs a router node from a JSON config, and offers small tools for probing
// and injecting packets by hand.

mod config;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use qroute_core::{DelayProbe, ProbeConfig, ProbeOutcome, RouterNode};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use config::ConfigFile;

#[derive(Parser)]
#[command(name = "qroute")]
#[command(about = "qroute - adaptive SARSA packet router", long_about = None)]
#[command(version)]
struct Cli {
    /// Config file (defaults to the per-user config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG is set
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default config file
    Init,
    /// Probe neighbors, then route packets until Ctrl-C
    Start,
    /// Inspect or edit the config file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Measure round-trip delay to an address
    Probe {
        addr: SocketAddr,
        #[arg(short, long, default_value = "5")]
        samples: usize,
        #[arg(short, long, default_value = "2000")]
        timeout_ms: u64,
    },
    /// Send one data packet to a router
    Send { addr: SocketAddr, payload: String },
}

#[derive(Subcommand)]
enum ConfigAction {
    Show,
    List,
    Get { key: String },
    Set { key: String, value: String },
    Neighbor {
        #[command(subcommand)]
        action: NeighborAction,
    },
}

#[derive(Subcommand)]
enum NeighborAction {
    Add { id: String, addr: SocketAddr },
    Remove { id: String },
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .init();

    let config_path = ConfigFile::resolve_path(cli.config.as_deref())?;

    match cli.command {
        Commands::Init => cmd_init(config_path),
        Commands::Start => cmd_start(config_path).await,
        Commands::Config { action } => cmd_config(config_path, action),
        Commands::Probe {
            addr,
            samples,
            timeout_ms,
        } => cmd_probe(addr, samples, timeout_ms).await,
        Commands::Send { addr, payload } => cmd_send(addr, payload).await,
    }
}

fn cmd_init(path: PathBuf) -> Result<()> {
    let (file, created) = ConfigFile::init(&path)?;
    if created {
        println!("{} Wrote default config to {}", "✓".green(), file.path.display());
    } else {
        println!("{} Config already exists at {}", "•".yellow(), file.path.display());
    }
    println!();
    println!("{}", "Next steps:".bold());
    println!("  • Add neighbors: {}", "qroute config neighbor add <id> <host:port>".bright_green());
    println!("  • Start router:  {}", "qroute start".bright_green());
    Ok(())
}

async fn cmd_start(path: PathBuf) -> Result<()> {
    let file = ConfigFile::load(&path)?;
    let router = file.router;

    println!("{}", "Starting qroute...".bold());
    println!("  Node:      {}", router.node_id.bright_cyan());
    println!("  Listen:    {}", router.listen_addr);
    println!("  Neighbors: {}", router.neighbors.len());
    println!(
        "  Learning:  alpha={} gamma={} epsilon={}",
        router.learning.alpha, router.learning.gamma, router.learning.epsilon
    );
    println!();

    let node = RouterNode::start(router)
        .await
        .context("Failed to start router node")?;
    let engine = node.engine().clone();
    println!("{} Listening on {}", "✓".green(), node.local_addr()?);

    let stats = node
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for Ctrl-C: {}", e);
            }
        })
        .await?;

    println!();
    println!("{}", "Session summary".bold());
    println!("  Connections:      {}", stats.connections_accepted);
    println!("  Probes answered:  {}", stats.probes_answered);
    println!("  Probe failures:   {}", stats.probe_reply_failures);
    println!("  Packets routed:   {}", stats.packets_routed);
    println!("  Updates applied:  {}", stats.updates_applied);
    println!("  Forward failures: {}", stats.forward_failures);
    println!();
    println!("{}", "Learned values".bold());
    for (state, row) in engine.value_snapshot() {
        for (action, value) in row {
            println!("  Q[{}][{}] = {:.4}", state.to_string().bright_cyan(), action, value);
        }
    }

    Ok(())
}

fn cmd_config(path: PathBuf, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let file = ConfigFile::load(&path)?;
            println!("{}", serde_json::to_string_pretty(&file.router)?);
        }
        ConfigAction::List => {
            let file = ConfigFile::load(&path)?;
            println!("{} ({})", "Configuration".bold(), file.path.display());
            for (key, value) in file.list() {
                println!("  {:<20} {}", key.bright_cyan(), value);
            }
        }
        ConfigAction::Get { key } => {
            let file = ConfigFile::load(&path)?;
            match file.list().into_iter().find(|(k, _)| *k == key) {
                Some((_, value)) => println!("{}", value),
                None => anyhow::bail!("Unknown config key: {}", key),
            }
        }
        ConfigAction::Set { key, value } => {
            let mut file = ConfigFile::load(&path)?;
            file.set(&key, &value)?;
            println!("{} {} = {}", "✓".green(), key, value);
        }
        ConfigAction::Neighbor { action } => {
            let mut file = ConfigFile::load(&path)?;
            match action {
                NeighborAction::Add { id, addr } => {
                    file.add_neighbor(&id, addr)?;
                    println!("{} Neighbor {} at {}", "✓".green(), id.bright_cyan(), addr);
                }
                NeighborAction::Remove { id } => {
                    if file.remove_neighbor(&id)? {
                        println!("{} Removed neighbor {}", "✓".green(), id);
                    } else {
                        println!("{}", format!("No neighbor named {}", id).dimmed());
                    }
                }
                NeighborAction::List => {
                    if file.router.neighbors.is_empty() {
                        println!("{}", "No neighbors configured.".dimmed());
                    }
                    for (id, addr) in &file.router.neighbors {
                        println!("  {} {} {}", "•".bright_green(), id.bright_cyan(), addr);
                    }
                }
            }
        }
    }
    Ok(())
}

async fn cmd_probe(addr: SocketAddr, samples: usize, timeout_ms: u64) -> Result<()> {
    let probe = DelayProbe::new(ProbeConfig {
        samples,
        timeout_ms,
        ..Default::default()
    });
    let report = probe.measure(addr).await;

    for (i, sample) in report.samples.iter().enumerate() {
        if sample.is_measured() {
            println!("  {} sample {}: {:.2} ms", "✓".green(), i + 1, sample.millis());
        } else {
            println!("  {} sample {}: {:.0} ms (penalty, {:?})", "✗".red(), i + 1, sample.millis(), sample);
        }
    }

    let mean = format!("{:.2} ms", report.mean_ms());
    match report.outcome() {
        ProbeOutcome::Measured => println!("{} average {}", addr, mean.bright_green()),
        ProbeOutcome::Penalized => println!("{} unreachable, penalty {}", addr, mean.bright_red()),
    }
    Ok(())
}

async fn cmd_send(addr: SocketAddr, payload: String) -> Result<()> {
    let mut stream = tokio::time::timeout(Duration::from_secs(5), TcpStream::connect(addr))
        .await
        .context("Connect timed out")?
        .with_context(|| format!("Failed to connect to {}", addr))?;
    stream.write_all(payload.as_bytes()).await?;
    stream.shutdown().await?;

    // Routers reply only to probes; a `ping` payload shows the reply
    let mut reply = Vec::new();
    let _ = tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut reply)).await;

    println!("{} Sent {} bytes to {}", "✓".green(), payload.len(), addr);
    if !reply.is_empty() {
        println!("  Reply: {}", String::from_utf8_lossy(&reply).bright_yellow());
    }
    Ok(())
}
