//! graph-rag-sync command line.
//!
//! Operator tooling around the store clients: connectivity checks through
//! the full resilience path, ad-hoc queries, and the identifier and
//! redaction checks used on every request.
//!
//! ```text
//! graph-rag-sync --config sync.toml ping
//! graph-rag-sync query "MATCH (n:Customer) RETURN count(n) AS c"
//! graph-rag-sync check-identifier label "Customer"
//! ```

use clap::{Parser, Subcommand, ValueEnum};
use serde_json::Value;
use std::path::PathBuf;

use graph_rag_sync::config::loader::apply_overrides_from;
use graph_rag_sync::config::validation::validate_config;
use graph_rag_sync::config::{load_config, AppConfig, ConfigError};
use graph_rag_sync::observability::{logging, metrics};
use graph_rag_sync::resilience::BreakerRegistry;
use graph_rag_sync::security::identifier::{escape, validate_collection_name, IdentifierKind};
use graph_rag_sync::security::SensitiveDataRedactor;
use graph_rag_sync::store::{GraphStoreClient, VectorStoreClient};

#[derive(Parser)]
#[command(name = "graph-rag-sync")]
#[command(about = "Graph and vector store sync tooling", long_about = None)]
struct Cli {
    /// TOML config file. Defaults plus environment overrides when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ping both stores and print breaker state
    Ping,
    /// Run a graph statement and print the rows
    Query {
        statement: String,
        /// Statement parameters as a JSON object
        #[arg(short, long, default_value = "{}")]
        params: String,
    },
    /// Count nodes with a label
    CountNodes { label: String },
    /// List vector collections
    Collections,
    /// Nearest-neighbour search with a comma-separated vector
    Search {
        collection: String,
        #[arg(short, long, value_delimiter = ',')]
        vector: Vec<f32>,
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },
    /// Validate and escape an identifier
    CheckIdentifier { kind: KindArg, identifier: String },
    /// Redact credentials from text
    Redact { text: String },
    /// Validate the configuration and exit
    ValidateConfig,
}

#[derive(Clone, Copy, ValueEnum)]
enum KindArg {
    Label,
    RelationshipType,
    PropertyKey,
    Collection,
}

impl From<KindArg> for IdentifierKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Label => IdentifierKind::Label,
            KindArg::RelationshipType => IdentifierKind::RelationshipType,
            KindArg::PropertyKey => IdentifierKind::PropertyKey,
            KindArg::Collection => IdentifierKind::Collection,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load(cli.config.as_deref())?;

    logging::init_tracing(&config.observability);
    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr)?,
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let registry = BreakerRegistry::global();
    let redactor = SensitiveDataRedactor::from_config(&config.redaction);

    match cli.command {
        Commands::Ping => {
            let graph = GraphStoreClient::from_app_config(&config, registry)?;
            let vector = VectorStoreClient::from_app_config(&config, registry)?;
            report("graph", graph.ping().await);
            report("vector", vector.ping().await);
            for snapshot in registry.snapshot() {
                println!("{}", serde_json::to_string(&snapshot)?);
            }
        }
        Commands::Query { statement, params } => {
            let params: Value = serde_json::from_str(&params)?;
            let graph = GraphStoreClient::from_app_config(&config, registry)?;
            for row in graph.query(&statement, params).await? {
                println!("{}", Value::Object(redactor.redact_map(&row)));
            }
        }
        Commands::CountNodes { label } => {
            let graph = GraphStoreClient::from_app_config(&config, registry)?;
            println!("{}", graph.count_nodes(&label).await?);
        }
        Commands::Collections => {
            let vector = VectorStoreClient::from_app_config(&config, registry)?;
            for name in vector.list_collections().await? {
                println!("{name}");
            }
        }
        Commands::Search { collection, vector: query, limit } => {
            let vector = VectorStoreClient::from_app_config(&config, registry)?;
            for hit in vector.search(&collection, &query, limit, None).await? {
                let payload = hit.payload.as_ref().map(|p| redactor.redact_map(p)).unwrap_or_default();
                println!("{}\t{:.4}\t{}", hit.id, hit.score, Value::Object(payload));
            }
        }
        Commands::CheckIdentifier { kind, identifier } => match IdentifierKind::from(kind) {
            IdentifierKind::Collection => println!("{}", validate_collection_name(&identifier)?),
            kind => println!("{}", escape(&identifier, kind)?),
        },
        Commands::Redact { text } => println!("{}", redactor.redact_str(&text)),
        Commands::ValidateConfig => println!("configuration ok"),
    }

    Ok(())
}

fn load(path: Option<&std::path::Path>) -> Result<AppConfig, ConfigError> {
    if let Some(path) = path {
        return load_config(path);
    }
    let mut config = AppConfig::default();
    apply_overrides_from(&mut config, |key| std::env::var(key).ok());
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

fn report(store: &str, result: Result<(), graph_rag_sync::StoreError>) {
    match result {
        Ok(()) => println!("{store}: ok"),
        Err(e) => println!("{store}: {e}"),
    }
}
