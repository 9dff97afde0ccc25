//! pullsync — pull-based backup server and client.
//!
//! # Usage
//!
//! ```text
//! pullsync server [--config ./serverConfig] [--no-console]
//! pullsync client [--config ./clientConfig]
//! pullsync check-config --role server|client [--config <path>] [--json]
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{check_config::CheckConfigArgs, client::ClientArgs, server::ServerArgs};

#[derive(Parser, Debug)]
#[command(
    name = "pullsync",
    version,
    about = "Server-initiated backups triggered by client-side file changes",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the backup server in the foreground.
    Server(ServerArgs),

    /// Run the backup client: watch a directory and request pulls.
    Client(ClientArgs),

    /// Validate a settings file and print the resolved values.
    CheckConfig(CheckConfigArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Server(args) => args.run(),
        Commands::Client(args) => args.run(),
        Commands::CheckConfig(args) => args.run(),
    }
}
