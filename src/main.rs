//! wirehook: a line-based TCP lobby built on cached channel contexts.
//!
//! Every connection's handler keeps the context it was attached with and
//! the server writes through those cached handles: greetings, relayed
//! lines, operator broadcasts and the final goodbye.
//!
//! Usage:
//!   wirehook serve                              # Listen on 127.0.0.1:7171
//!   wirehook serve --port 0 --verbose           # OS-assigned port, debug logs
//!   wirehook serve --idle-timeout-ms 60000      # Drop silent peers
//!   wirehook connect 127.0.0.1:7171             # Chat from the terminal

mod console;

use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use wirehook_handler::Lobby;
use wirehook_protocol::{DEFAULT_MAX_FRAME_LEN, WireEvent};
use wirehook_transport::{TransportClient, TransportConfig, TransportServer};

use crate::console::ConsoleHandler;

#[derive(Parser, Debug)]
#[command(name = "wirehook", about = "wirehook: line lobby over cached channel contexts")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable verbose logging
    #[arg(long, global = true)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    /// Write logs to a file instead of stderr
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the lobby server
    Serve(ServeArgs),
    /// Connect to a lobby server from the terminal
    Connect(ConnectArgs),
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// Port to listen on (0 for OS-assigned)
    #[arg(long, default_value = "7171")]
    port: u16,

    /// Hostname to bind to
    #[arg(long, default_value = "127.0.0.1")]
    hostname: String,

    /// Maximum concurrent connections
    #[arg(long, default_value = "64")]
    max_connections: usize,

    /// Longest accepted line in bytes
    #[arg(long, default_value_t = DEFAULT_MAX_FRAME_LEN)]
    max_frame_len: usize,

    /// Close connections that stay silent this long
    #[arg(long)]
    idle_timeout_ms: Option<u64>,
}

#[derive(Args, Debug)]
struct ConnectArgs {
    /// Server address, e.g. 127.0.0.1:7171
    addr: String,

    /// Longest accepted line in bytes
    #[arg(long, default_value_t = DEFAULT_MAX_FRAME_LEN)]
    max_frame_len: usize,
}

fn init_tracing(cli: &Cli) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });

    let (writer, ansi) = match &cli.log_file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                let _ = std::fs::create_dir_all(parent);
            }
            let file = match std::fs::OpenOptions::new().create(true).append(true).open(path) {
                Ok(file) => file,
                Err(e) => {
                    eprintln!("Failed to open log file {}: {e}", path.display());
                    std::process::exit(1);
                }
            };
            eprintln!("Logging to {}", path.display());
            (BoxMakeWriter::new(std::sync::Mutex::new(file)), false)
        }
        None => (BoxMakeWriter::new(std::io::stderr), true),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(ansi);

    if cli.log_json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Read stdin on a plain thread so a pending read never blocks shutdown.
fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(&cli);

    match cli.command {
        Command::Serve(args) => serve(args, cli.verbose).await,
        Command::Connect(args) => connect(args).await,
    }
}

async fn serve(args: ServeArgs, verbose: bool) {
    let config = TransportConfig {
        port: args.port,
        hostname: args.hostname.clone(),
        max_connections: Some(args.max_connections),
        max_frame_len: args.max_frame_len,
        idle_timeout_ms: args.idle_timeout_ms,
        verbose_logging: verbose,
    };

    let lobby = Lobby::new();
    let factory_lobby = lobby.clone();
    let mut transport = match TransportServer::start(config, move || factory_lobby.handler()).await {
        Ok(t) => t,
        Err(e) => {
            error!("Failed to start transport: {e}");
            std::process::exit(1);
        }
    };

    println!();
    println!("  wirehook lobby");
    println!("  Listening:  {}", transport.local_addr());
    println!("  Max conns:  {}", args.max_connections);
    match args.idle_timeout_ms {
        Some(ms) => println!("  Idle after: {ms} ms"),
        None => println!("  Idle after: never"),
    }
    println!();
    println!("  Lines typed here are broadcast to every peer.");
    println!("  Press Ctrl+C to stop.");
    println!();

    let mut stdin_rx = spawn_stdin_reader();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = stdin_rx.recv(), if stdin_open => match line {
                Some(line) => {
                    let text = line.trim();
                    if text.is_empty() {
                        continue;
                    }
                    let queued = lobby.broadcast(&WireEvent::message("server", text));
                    info!("Broadcast to {queued} peer(s)");
                }
                None => stdin_open = false,
            },
        }
    }

    println!();
    println!("  Shutting down...");
    let notified = lobby.broadcast(&WireEvent::goodbye("server shutting down"));
    info!("Sent goodbye to {notified} peer(s)");
    transport.stop().await;
    println!("  Server stopped.");
}

async fn connect(args: ConnectArgs) {
    let config = TransportConfig {
        max_frame_len: args.max_frame_len,
        ..TransportConfig::default()
    };

    let handler = Arc::new(ConsoleHandler::new());
    let client = match TransportClient::connect(args.addr.as_str(), &config, handler.clone()).await {
        Ok(c) => c,
        Err(e) => {
            error!("Failed to connect to {}: {e}", args.addr);
            std::process::exit(1);
        }
    };
    info!("Connected to {}", args.addr);

    let ctx = client.context().clone();
    let closed = client.closed();
    tokio::pin!(closed);

    let mut stdin_rx = spawn_stdin_reader();

    loop {
        tokio::select! {
            _ = &mut closed => {
                info!("Connection closed");
                return;
            }
            line = stdin_rx.recv() => match line {
                Some(line) => {
                    if let Err(e) = handler.writer().send_and_flush(line).await {
                        warn!(code = e.code(), "Send failed: {e}");
                    }
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    ctx.close();
    closed.await;
}
