//! Command-line interface for the `dumplings` binary.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Run a mesh of tool-calling chat agents.
#[derive(Parser, Debug)]
#[command(name = "dumplings", version, about = "Multi-agent tool-calling mesh")]
pub struct Cli {
    /// Log level used when RUST_LOG is unset
    #[arg(long, global = true, default_value = "warn")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Send one message to an agent and print its answer
    Run(RunArgs),
    /// List the agents a mesh file declares
    Agents(AgentsArgs),
}

/// Arguments for `dumplings run`.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Mesh file (TOML); environment-only config when omitted
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Name or uuid of the agent that receives the message
    #[arg(short, long)]
    pub agent: String,

    /// Image URL or base64 PNG to attach (repeatable)
    #[arg(long = "image")]
    pub images: Vec<String>,

    /// Agents allowed to call the demo `get_time` tool (repeatable; everyone when omitted)
    #[arg(long = "get-time-agent")]
    pub get_time_agents: Vec<String>,

    /// Message for the agent
    pub message: String,
}

/// Arguments for `dumplings agents`.
#[derive(Args, Debug)]
pub struct AgentsArgs {
    /// Mesh file (TOML)
    #[arg(short, long)]
    pub config: PathBuf,
}
