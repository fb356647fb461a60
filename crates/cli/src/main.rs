//! StepVault CLI: the main entry point.
//!
//! Commands:
//! - `init`     Write the default config file
//! - `chat`     Run a session in-process, answering human-assistance prompts on stdin
//! - `gateway`  Start the HTTP/SSE server
//! - `session`  Inspect checkpointed sessions

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "stepvault",
    about = "StepVault — durable tool-using agent sessions",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write ~/.stepvault/config.toml with defaults
    Init {
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },

    /// Chat with the agent
    Chat {
        /// Send a single task instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,

        /// Continue an existing session
        #[arg(short, long)]
        session: Option<String>,
    },

    /// Start the HTTP gateway server
    Gateway {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// List sessions, or show one session's checkpoint
    Session {
        id: Option<String>,

        /// Print the full checkpoint as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    match cli.command {
        Commands::Init { force } => commands::init::run(force)?,
        Commands::Chat { message, session } => commands::chat::run(message, session).await?,
        Commands::Gateway { port } => commands::gateway::run(port).await?,
        Commands::Session { id, json } => commands::session::run(id, json).await?,
    }

    Ok(())
}
