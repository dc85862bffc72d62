//! Command line interface for the `toolwire` binary.
//!
//! Also compiled by the build script to render the manual page, so it only
//! depends on `clap` and the standard library.

use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    path::PathBuf,
};

use clap::{Args, Parser, Subcommand};

/// Port used by both `serve` and `client` unless overridden.
pub const DEFAULT_PORT: u16 = 7071;

/// Command line arguments for the `toolwire` binary.
#[derive(Debug, Parser)]
#[command(
    name = "toolwire",
    version,
    about = "Tool host and client speaking bidirectional JSON-RPC"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Host the file tools for remote clients.
    Serve(ServeArgs),
    /// Connect to a tool host and run one operation.
    Client(ClientArgs),
}

#[derive(Debug, Args)]
pub struct ServeArgs {
    /// Address to listen on.
    #[arg(long, default_value_t = IpAddr::V4(Ipv4Addr::LOCALHOST))]
    pub bind: IpAddr,
    #[arg(long, default_value_t = DEFAULT_PORT)]
    pub port: u16,
    /// Directory the file tools are confined to. Defaults to
    /// `$HOME/toolwire-play`.
    #[arg(long, env = "TOOLWIRE_BASE_DIR")]
    pub base_dir: Option<PathBuf>,
    /// Accept WebSocket connections instead of length-prefixed frames.
    #[arg(long)]
    pub websocket: bool,
    /// Serve Prometheus metrics on this address.
    #[arg(long)]
    pub metrics_listen: Option<SocketAddr>,
    /// Seconds to wait for answers to confirmation prompts.
    #[arg(long, default_value_t = 300)]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Args)]
pub struct ClientArgs {
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,
    #[arg(long, default_value_t = DEFAULT_PORT)]
    pub port: u16,
    /// Decline every confirmation prompt from the host.
    #[arg(long)]
    pub decline: bool,
    /// Connect over WebSocket.
    #[arg(long)]
    pub websocket: bool,
    #[command(subcommand)]
    pub action: ClientAction,
}

#[derive(Debug, Subcommand)]
pub enum ClientAction {
    /// Perform the handshake and print the host's reply.
    Init,
    /// List the host's tools.
    Tools,
    /// List a directory.
    List { dir: Option<String> },
    /// Print a text file.
    Read { path: String },
    /// Write a text file.
    Write {
        path: String,
        content: String,
        /// Replace an existing file without asking.
        #[arg(long)]
        overwrite: bool,
    },
    /// Delete a file.
    Delete {
        path: String,
        /// Delete without asking.
        #[arg(long)]
        force: bool,
    },
}
