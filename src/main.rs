/*!
 * Recall CLI - Command Line Interface
 *
 * Thin command surface over the resilient memory client. Configuration
 * comes from RECALL_* environment variables or a TOML file; every
 * subcommand prints its result as JSON.
 */

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use recall::{
    client::MemoryClient,
    config::ClientConfig,
    error::{ApiError, Result, EXIT_SUCCESS},
    logging, monitor, AddMemoryRequest, SearchRequest,
};

#[derive(Parser)]
#[command(name = "recall")]
#[command(version, about = "Resilient client for a remote memory-storage API", long_about = None)]
struct Cli {
    /// Load configuration from a TOML file instead of the environment
    #[arg(short = 'c', long = "config", value_name = "PATH", global = true)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short = 'v', long = "verbose", global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Store a new memory
    Add {
        /// Memory content
        content: String,

        /// Owner of the memory
        #[arg(short = 'u', long = "user")]
        user: Option<String>,

        /// Arbitrary JSON metadata
        #[arg(short = 'm', long = "metadata", value_name = "JSON")]
        metadata: Option<String>,
    },

    /// Search stored memories
    Search {
        /// Search query
        query: String,

        /// Restrict to one user's memories
        #[arg(short = 'u', long = "user")]
        user: Option<String>,

        /// Maximum number of results
        #[arg(short = 'l', long = "limit")]
        limit: Option<u32>,
    },

    /// List stored memories
    List {
        /// Restrict to one user's memories
        #[arg(short = 'u', long = "user")]
        user: Option<String>,
    },

    /// Delete a memory by id
    Delete {
        /// Memory id
        id: String,
    },

    /// Show breaker state, cache size and active configuration
    Status,

    /// Run the periodic health monitor in the foreground until Ctrl-C
    Watch,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = logging::init_logging(cli.verbose) {
        eprintln!("error: {}", e);
        std::process::exit(e.exit_code());
    }

    match run(cli).await {
        Ok(()) => std::process::exit(EXIT_SUCCESS),
        Err(e) => {
            tracing::error!("{}", e);
            std::process::exit(e.exit_code());
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => ClientConfig::from_file(path)?,
        None => ClientConfig::from_env()?,
    };
    let client = MemoryClient::new(config)?;

    match cli.command {
        Command::Add {
            content,
            user,
            metadata,
        } => {
            let metadata = metadata
                .map(|raw| {
                    serde_json::from_str(&raw)
                        .map_err(|e| ApiError::Validation(format!("metadata is not JSON: {}", e)))
                })
                .transpose()?;
            let record = client
                .add_memory(AddMemoryRequest {
                    content,
                    user_id: user,
                    metadata,
                })
                .await?;
            print_json(&record)
        }

        Command::Search { query, user, limit } => {
            let result = client
                .search_memories(SearchRequest {
                    query,
                    user_id: user,
                    limit,
                })
                .await?;
            if result.from_cache {
                eprintln!("note: live call failed, showing cached results");
            }
            print_json(&result.value)
        }

        Command::List { user } => {
            let result = client.list_memories(user.as_deref()).await?;
            if result.from_cache {
                eprintln!("note: live call failed, showing cached results");
            }
            print_json(&result.value)
        }

        Command::Delete { id } => {
            client.delete_memory(&id).await?;
            tracing::info!(id = %id, "memory deleted");
            Ok(())
        }

        Command::Status => {
            let status = client.status().await;
            print_json(&status)
        }

        Command::Watch => {
            let client = Arc::new(client);
            let handle = monitor::spawn(Arc::clone(&client))
                .ok_or_else(|| ApiError::Config("health checks are disabled".to_string()))?;

            tokio::signal::ctrl_c()
                .await
                .map_err(|e| ApiError::Config(format!("failed to listen for Ctrl-C: {}", e)))?;
            handle.stop().await;

            let status = client.status().await;
            print_json(&status)
        }
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| ApiError::Validation(format!("unprintable result: {}", e)))?;
    println!("{}", json);
    Ok(())
}
