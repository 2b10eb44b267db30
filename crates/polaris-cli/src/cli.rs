use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "polaris",
    about = "Polaris: logical object tree store for multi-device sync",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start the Polaris server
    Serve(ServeArgs),
    /// Print the root store id of a user
    RootStore(RootStoreArgs),
    /// Decode an identifier and show what it names
    Inspect(InspectArgs),
}

#[derive(Args)]
pub struct ServeArgs {
    /// TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// Address to listen on, overriding the config file
    #[arg(short, long)]
    pub bind: Option<SocketAddr>,
}

#[derive(Args)]
pub struct RootStoreArgs {
    pub user: String,
}

#[derive(Args)]
pub struct InspectArgs {
    /// 32 hex characters
    pub id: String,
}
