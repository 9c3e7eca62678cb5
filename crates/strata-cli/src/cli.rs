use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "strata",
    about = "Strata: sharded filesystem object storage",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Server/store configuration file (TOML)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Store root folder, overriding the configuration file
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start the HTTP server
    Serve(ServeArgs),
    /// Store a file as a new object and print its identifier
    Put(PutArgs),
    /// Print or save an object's content
    Get(GetArgs),
    /// Replace an object's content
    Update(UpdateArgs),
    /// Delete every copy of an object
    Rm(RmArgs),
    /// List every on-disk copy of an object
    Locate(LocateArgs),
    /// Show or change the shard depth
    Depth(DepthArgs),
    /// Run one maintenance pass in the foreground
    Rebalance(RebalanceArgs),
}

#[derive(Args)]
pub struct ServeArgs {
    #[arg(long)]
    pub bind: Option<SocketAddr>,
    /// Route prefix for the API, e.g. /api
    #[arg(long)]
    pub base_path: Option<String>,
}

#[derive(Args)]
pub struct PutArgs {
    /// File to store; `-` reads standard input
    pub file: PathBuf,
}

#[derive(Args)]
pub struct GetArgs {
    pub id: String,
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Args)]
pub struct UpdateArgs {
    pub id: String,
    /// File with the new content; `-` reads standard input
    pub file: PathBuf,
}

#[derive(Args)]
pub struct RmArgs {
    pub id: String,
}

#[derive(Args)]
pub struct LocateArgs {
    pub id: String,
}

#[derive(Args)]
pub struct DepthArgs {
    #[command(subcommand)]
    pub action: Option<DepthAction>,
}

#[derive(Subcommand)]
pub enum DepthAction {
    /// Write the depth control file
    Set { depth: usize },
    /// Remove the depth control file, reverting to the configured default
    Clear,
}

#[derive(Args)]
pub struct RebalanceArgs {
    /// Worker count, overriding the configuration
    #[arg(long)]
    pub concurrency: Option<usize>,
}
