//! confstore CLI
//!
//! Usage:
//!   confstore get <id>                     Print one document
//!   confstore create <id> <json>           Store a new document
//!   confstore update <id> <json> [--from]  Overwrite or move a document
//!   confstore delete <id>                  Remove a document
//!   confstore delete-all <pattern>...      Remove every matching document
//!   confstore list <pattern>... [--page N] List matching documents
//!   confstore count <pattern>...           Count matching documents
//!   confstore export <pattern>...          Write matches as NDJSON
//!   confstore import [file] [--replace]    Read NDJSON documents
//!
//! The store is configured from `--config <file.yaml>` or, when absent, from
//! CONFSTORE_* environment variables.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use futures::TryStreamExt;
use tokio::io::{AsyncBufRead, AsyncWriteExt, BufReader};
use tracing::{debug, info, Level};
use tracing_subscriber::EnvFilter;

use confstore::{
    export_ndjson, import_ndjson, DataStore, ExportLine, ImportStrategy, JsonDataStore, Key,
    Pattern, StoreConfig, StoreFactory,
};

#[derive(Parser, Debug)]
#[command(name = "confstore")]
#[command(about = "Hierarchical JSON document store", long_about = None)]
#[command(version)]
struct Cli {
    /// YAML configuration file (defaults to CONFSTORE_* environment variables)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Namespace the ids are relative to, e.g. "cfg:flags"
    #[arg(short, long, global = true, default_value = "")]
    namespace: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true, default_value = "warn")]
    log_level: Level,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the document stored at an id
    Get { id: String },

    /// Store a new document; fails if the id is taken
    Create {
        id: String,
        /// Document as JSON
        value: String,
    },

    /// Overwrite a document, or move it when --from names another id
    Update {
        id: String,
        /// Document as JSON
        value: String,
        /// Current id of the document to move
        #[arg(long)]
        from: Option<String>,
    },

    /// Remove a document and print it
    Delete { id: String },

    /// Remove every document matching any pattern
    DeleteAll {
        #[arg(required = true)]
        patterns: Vec<String>,
    },

    /// List documents matching any pattern
    List {
        #[arg(required = true)]
        patterns: Vec<String>,
        /// Print one page (1-indexed) with the total count
        #[arg(long)]
        page: Option<usize>,
        #[arg(long, default_value = "20")]
        page_size: usize,
    },

    /// Count documents matching any pattern
    Count {
        #[arg(required = true)]
        patterns: Vec<String>,
    },

    /// Write matching documents as NDJSON to stdout
    Export {
        #[arg(required = true)]
        patterns: Vec<String>,
    },

    /// Read NDJSON documents from a file or stdin
    Import {
        file: Option<PathBuf>,
        /// Overwrite documents that already exist
        #[arg(long)]
        replace: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.log_level.to_string()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = match &cli.config {
        Some(path) => StoreConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => StoreConfig::from_env().context("Failed to load config from environment")?,
    };
    debug!(?config, "Loaded configuration");

    let factory = StoreFactory::connect(config)
        .await
        .context("Failed to connect store")?;
    let store = factory
        .build(Key::parse(&cli.namespace))
        .await
        .context("Failed to build store")?;

    run(cli.command, store).await
}

async fn run(command: Commands, store: Arc<JsonDataStore>) -> Result<()> {
    match command {
        Commands::Get { id } => match store.get_by_id(&Key::parse(&id)).await? {
            Some(value) => print_json(&value)?,
            None => bail!("No document at {}", id),
        },

        Commands::Create { id, value } => {
            let created = store.create(Key::parse(&id), parse_value(&value)?).await?;
            print_json(&created)?;
        }

        Commands::Update { id, value, from } => {
            let old_id = Key::parse(from.as_deref().unwrap_or(&id));
            let updated = store
                .update(old_id, Key::parse(&id), parse_value(&value)?)
                .await?;
            print_json(&updated)?;
        }

        Commands::Delete { id } => {
            let deleted = store.delete(Key::parse(&id)).await?;
            print_json(&deleted)?;
        }

        Commands::DeleteAll { patterns } => {
            store.delete_all(&Pattern::parse_all(&patterns)).await?;
        }

        Commands::List {
            patterns,
            page,
            page_size,
        } => {
            let patterns = Pattern::parse_all(&patterns);
            match page {
                Some(page) => {
                    let page = store
                        .get_by_id_like_paged(&patterns, page, page_size)
                        .await?
                        .map(|(id, value)| ExportLine { id, value });
                    print_json(&page)?;
                }
                None => {
                    let all: Vec<ExportLine> = store
                        .get_by_id_like(&patterns)
                        .map_ok(|(id, value)| ExportLine { id, value })
                        .try_collect()
                        .await?;
                    print_json(&all)?;
                }
            }
        }

        Commands::Count { patterns } => {
            let count = store.count(&Pattern::parse_all(&patterns)).await?;
            println!("{}", count);
        }

        Commands::Export { patterns } => {
            let mut lines = export_ndjson(&*store, &Pattern::parse_all(&patterns));
            let mut stdout = tokio::io::stdout();
            let mut exported = 0usize;
            while let Some(line) = lines.try_next().await? {
                stdout.write_all(line.as_bytes()).await?;
                stdout.write_all(b"\n").await?;
                exported += 1;
            }
            stdout.flush().await?;
            info!(exported, "Export finished");
        }

        Commands::Import { file, replace } => {
            let strategy = if replace {
                ImportStrategy::Replace
            } else {
                ImportStrategy::Keep
            };
            let reader: Box<dyn AsyncBufRead + Unpin + Send> = match &file {
                Some(path) => Box::new(BufReader::new(
                    tokio::fs::File::open(path)
                        .await
                        .with_context(|| format!("Failed to open {}", path.display()))?,
                )),
                None => Box::new(BufReader::new(tokio::io::stdin())),
            };

            let result = import_ndjson(&*store, reader, strategy).await?;
            print_json(&serde_json::json!({
                "imported": result.success.len(),
                "errors": result.errors,
            }))?;
            if !result.errors.is_empty() {
                bail!("Some lines were rejected");
            }
        }
    }
    Ok(())
}

fn parse_value(raw: &str) -> Result<serde_json::Value> {
    serde_json::from_str(raw).context("Document is not valid JSON")
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
