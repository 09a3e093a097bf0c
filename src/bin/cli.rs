//! RepoGraph CLI - line-level dependency graph of a source tree.
//!
//! Usage:
//!   repograph build                  # Index the tree and save it
//!   repograph update <file>          # Re-index one changed file
//!   repograph stats                  # Graph statistics
//!   repograph symbol <name>          # Nodes named <name>
//!   repograph file <path>            # Nodes of one file
//!   repograph related <id>           # One-hop neighbours
//!   repograph egograph <keyword>...  # Bounded context around keywords
//!   repograph stale                  # Is the saved index stale?
//!   repograph clean                  # Delete the saved index

use clap::Parser;
use repograph::cli::{run, Cli};

fn main() {
    // Logs go to stderr so stdout stays parseable with --json.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
