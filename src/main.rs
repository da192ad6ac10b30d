//! SafeClaw Memory - command line front-end
//!
//! Opens the memory store in the configured data directory, runs one
//! operation, prints the result as JSON and closes the store.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use safeclaw_memory::{memory::ExportOptions, MemoryConfig, MemoryStore};
use serde::Serialize;
use serde_json::{json, Value};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "safeclaw-memory")]
#[command(author = "A3S Lab Team")]
#[command(version)]
#[command(about = "Tiered conversational memory store")]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "SAFECLAW_MEMORY_CONFIG")]
    config: Option<PathBuf>,

    /// Override the data directory
    #[arg(short, long, env = "SAFECLAW_MEMORY_DIR")]
    data_dir: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record one user/assistant exchange
    Remember {
        /// What the user said
        user: String,

        /// What the assistant replied
        assistant: String,

        /// Store in episodic memory regardless of importance
        #[arg(short, long)]
        force: bool,
    },

    /// Search episodic memory
    Recall {
        /// Query text
        query: String,

        /// Maximum number of results
        #[arg(short, long)]
        limit: Option<usize>,

        /// Drop results below this similarity
        #[arg(short, long, default_value = "0.0")]
        min_similarity: f32,

        /// Only memories at or after this RFC 3339 timestamp
        #[arg(long, requires = "until")]
        since: Option<DateTime<Utc>>,

        /// Only memories at or before this RFC 3339 timestamp
        #[arg(long, requires = "since")]
        until: Option<DateTime<Utc>>,
    },

    /// Read a core fact (or the whole tree), or set one with --set
    Know {
        /// Dotted key
        key: Option<String>,

        /// JSON value to store (bare words are stored as strings)
        #[arg(long, requires = "key")]
        set: Option<String>,
    },

    /// Delete a core fact or sub-tree
    Forget {
        /// Dotted key
        key: String,
    },

    /// Show memory statistics
    Stats,

    /// Run one consolidation pass
    Consolidate,

    /// Export episodic memory to a JSON file
    Export {
        /// Destination path (overwritten)
        path: PathBuf,

        /// Include embedding vectors
        #[arg(long)]
        embeddings: bool,
    },

    /// Show configuration
    Config {
        /// Show default configuration
        #[arg(long)]
        default: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging; stdout is reserved for command output
    let log_level = if cli.verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("safeclaw_memory={}", log_level).into());
    let registry = tracing_subscriber::registry().with(filter);
    if cli.log_json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    // Load configuration
    let mut config = match cli.config {
        Some(ref path) => MemoryConfig::from_file(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => MemoryConfig::default(),
    };
    if let Some(dir) = cli.data_dir {
        config.storage.base_dir = dir;
    }

    if let Commands::Config { default } = cli.command {
        let shown = if default { MemoryConfig::default() } else { config };
        println!("{}", toml::to_string_pretty(&shown)?);
        return Ok(());
    }

    let store = MemoryStore::open_default(config)
        .await
        .context("failed to open memory store")?;
    let outcome = run(&store, cli.command).await;
    let closed = store.close().await;

    let output = outcome?;
    closed?;
    print_json(&output)
}

async fn run(store: &MemoryStore, command: Commands) -> Result<Value> {
    let output = match command {
        Commands::Remember {
            user,
            assistant,
            force,
        } => {
            let id = store.remember(&user, &assistant, force).await?;
            json!({ "id": id })
        }
        Commands::Recall {
            query,
            limit,
            min_similarity,
            since,
            until,
        } => {
            let mut options = store.search_options().min_similarity(min_similarity);
            if let Some(limit) = limit {
                options = options.limit(limit);
            }
            if let (Some(start), Some(end)) = (since, until) {
                options = options.time_range(start, end);
            }

            let results = store.recall(&query, &options).await?;
            Value::Array(
                results
                    .iter()
                    .map(|hit| {
                        let i = &hit.memory.interaction;
                        json!({
                            "id": i.id(),
                            "similarity": hit.similarity,
                            "user_msg": i.user_msg(),
                            "assistant_msg": i.assistant_msg(),
                            "timestamp": i.timestamp(),
                            "importance_score": i.importance_score(),
                            "tags": hit.memory.tags,
                        })
                    })
                    .collect(),
            )
        }
        Commands::Know { key, set: None } => {
            let value = store.know(key.as_deref())?;
            fact_output(key.as_deref(), value)
        }
        Commands::Know {
            key: Some(key),
            set: Some(raw),
        } => {
            let value = serde_json::from_str(&raw).unwrap_or(Value::String(raw));
            store.set_fact(&key, value.clone()).await?;
            json!({ "key": key, "value": value })
        }
        Commands::Know { key: None, .. } => anyhow::bail!("--set requires a key"),
        Commands::Forget { key } => {
            let removed = store.forget(&key).await?;
            json!({ "key": key, "removed": removed })
        }
        Commands::Stats => to_value(&store.stats()?)?,
        Commands::Consolidate => to_value(&store.consolidate().await?)?,
        Commands::Export { path, embeddings } => {
            let options = ExportOptions {
                include_embeddings: embeddings,
            };
            let count = store.export_with(&path, &options).await?;
            json!({ "path": path, "count": count })
        }
        Commands::Config { .. } => Value::Null,
    };
    Ok(output)
}

/// Lookup result that keeps an absent key apart from a stored `null`.
fn fact_output(key: Option<&str>, value: Option<Value>) -> Value {
    match value {
        Some(value) => json!({ "key": key, "found": true, "value": value }),
        None => json!({ "key": key, "found": false }),
    }
}

fn to_value<T: Serialize>(value: &T) -> Result<Value> {
    Ok(serde_json::to_value(value)?)
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fact_output_absent_differs_from_null() {
        let absent = fact_output(Some("pet"), None);
        let stored_null = fact_output(Some("pet"), Some(Value::Null));

        assert_eq!(absent, json!({ "key": "pet", "found": false }));
        assert_eq!(stored_null, json!({ "key": "pet", "found": true, "value": null }));
        assert_ne!(absent, stored_null);
    }

    #[test]
    fn test_fact_output_whole_tree() {
        let tree = json!({ "name": "Ada" });
        assert_eq!(
            fact_output(None, Some(tree.clone())),
            json!({ "key": null, "found": true, "value": tree })
        );
    }

    #[test]
    fn test_cli_parses_know_set() {
        let cli = Cli::try_parse_from([
            "safeclaw-memory",
            "know",
            "preferences.color",
            "--set",
            "\"blue\"",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Commands::Know { key: Some(_), set: Some(_) }
        ));
    }
}
