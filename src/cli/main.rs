//! Command-line access to the query façade.
//!
//! Runs one operation against a cluster and prints the result as JSON.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing::{info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use esquery::elasticsearch::EsClient;
use esquery::models::parse_document;
use esquery::{EsConfig, EsQueries, Query, SortOrder, Target};

#[derive(Parser, Debug)]
#[command(name = "esq")]
#[command(about = "Run document and index operations against an Elasticsearch cluster")]
struct Cli {
    /// TOML config file; flags below override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Cluster name the node must report
    #[arg(long)]
    cluster_name: Option<String>,

    /// Coordinating node host
    #[arg(long)]
    host: Option<String>,

    /// Coordinating node port
    #[arg(long)]
    port: Option<u16>,

    /// Maximum hits returned by a non-scroll search
    #[arg(long)]
    max_hits: Option<usize>,

    /// Log debug output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct TargetArgs {
    /// Index name
    index: String,

    /// Document type
    #[arg(long = "type", default_value = "_doc")]
    doc_type: String,
}

impl TargetArgs {
    fn target(&self) -> Target {
        Target::new(&self.index, &self.doc_type)
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check cluster health
    Health,

    /// Index a JSON document
    Index {
        #[command(flatten)]
        target: TargetArgs,
        /// JSON object
        document: String,
        /// Document id (generated when omitted)
        #[arg(long)]
        id: Option<String>,
    },

    /// Fetch a document by id
    Get {
        #[command(flatten)]
        target: TargetArgs,
        id: String,
    },

    /// Search (capped at max hits)
    Search {
        #[command(flatten)]
        target: TargetArgs,
        /// Query DSL JSON
        #[arg(default_value = r#"{"match_all": {}}"#)]
        query: String,
        /// Comma-separated source fields to return
        #[arg(long, value_delimiter = ',')]
        fields: Vec<String>,
        /// Field to sort on
        #[arg(long)]
        sort: Option<String>,
        /// asc or desc
        #[arg(long, default_value = "asc")]
        order: SortOrder,
        /// Print the full response instead of the sources
        #[arg(long)]
        raw: bool,
    },

    /// Fetch every matching document through a scroll
    Scroll {
        #[command(flatten)]
        target: TargetArgs,
        #[arg(default_value = r#"{"match_all": {}}"#)]
        query: String,
    },

    /// Run aggregations
    Aggregate {
        #[command(flatten)]
        target: TargetArgs,
        /// Aggregations JSON
        aggs: String,
        #[arg(long, default_value = r#"{"match_all": {}}"#)]
        query: String,
    },

    /// Check whether any document matches
    Exists {
        #[command(flatten)]
        target: TargetArgs,
        query: String,
    },

    /// Delete a document by id
    Delete {
        #[command(flatten)]
        target: TargetArgs,
        id: String,
    },

    /// Delete every matching document
    DeleteByQuery {
        #[command(flatten)]
        target: TargetArgs,
        query: String,
    },

    /// Merge fields into a document
    Update {
        #[command(flatten)]
        target: TargetArgs,
        id: String,
        /// JSON object of fields
        fields: String,
    },

    /// Set fields on every matching document
    UpdateByQuery {
        #[command(flatten)]
        target: TargetArgs,
        query: String,
        fields: String,
    },

    /// Create the index with a mapping, or add the mapping to it
    Mapping {
        #[command(flatten)]
        target: TargetArgs,
        /// Mapping JSON, or @path to read it from a file
        schema: String,
    },

    /// Count the documents in an index
    Count { index: String },

    /// Refresh an index
    Refresh { index: String },

    /// Delete an index
    DropIndex { index: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = build_config(&cli)?;
    info!(
        "Connecting to cluster '{}' at {}:{}",
        config.cluster_name, config.host, config.port
    );

    let client = EsClient::connect(&config)
        .await
        .context("Failed to connect to Elasticsearch")?;
    let es = EsQueries::from_config(client, &config)?;

    run(&es, cli.command).await
}

fn build_config(cli: &Cli) -> Result<EsConfig> {
    let mut config = match &cli.config {
        Some(path) => EsConfig::load_from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => EsConfig::new(
            cli.cluster_name.as_deref().unwrap_or("elasticsearch"),
            cli.host.as_deref().unwrap_or("localhost"),
            cli.port.unwrap_or(esquery::config::DEFAULT_PORT),
        ),
    };

    if let Some(ref name) = cli.cluster_name {
        config.cluster_name = name.clone();
    }
    if let Some(ref host) = cli.host {
        config.host = host.clone();
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(max_hits) = cli.max_hits {
        config.max_hits = max_hits;
    }
    config.validate()?;
    Ok(config)
}

async fn run(es: &EsQueries<EsClient>, command: Command) -> Result<()> {
    match command {
        Command::Health => {
            let healthy = es.backend().health_check().await?;
            print_json(&serde_json::json!({
                "cluster": es.backend().cluster_name(),
                "healthy": healthy
            }))
        }
        Command::Index {
            target,
            document,
            id,
        } => {
            let ok = es
                .index_json(&target.target(), id.as_deref(), &document)
                .await?;
            print_json(&ok)
        }
        Command::Get { target, id } => print_json(&es.get_json_for_id(&target.target(), &id).await?),
        Command::Search {
            target,
            query,
            fields,
            sort,
            order,
            raw,
        } => {
            let target = target.target();
            let query = parse_query(&query)?;
            let response = match sort {
                Some(field) => {
                    es.get_sorted_search_response(&target, &query, &field, order)
                        .await?
                }
                None if !fields.is_empty() => {
                    es.get_search_response_with_fields(&target, &query, &fields)
                        .await?
                }
                None => es.get_search_response_for_query(&target, &query).await?,
            };
            if raw {
                print_json(&response)
            } else {
                print_json(&response.into_sources())
            }
        }
        Command::Scroll { target, query } => {
            let documents = es
                .get_bulk_json_array_for_query(&target.target(), &parse_query(&query)?)
                .await?;
            info!("Fetched {} documents", documents.len());
            print_json(&documents)
        }
        Command::Aggregate {
            target,
            aggs,
            query,
        } => {
            let aggs = serde_json::from_str(&aggs).context("Invalid aggregations JSON")?;
            let response = es
                .get_search_response_for_aggregation(&target.target(), &parse_query(&query)?, aggs)
                .await?;
            print_json(&response.aggregations)
        }
        Command::Exists { target, query } => {
            print_json(&es.check_if_exists(&target.target(), &parse_query(&query)?).await?)
        }
        Command::Delete { target, id } => print_json(&es.delete_document(&target.target(), &id).await?),
        Command::DeleteByQuery { target, query } => print_json(
            &es.delete_on_query_match(&target.target(), &parse_query(&query)?)
                .await?,
        ),
        Command::Update { target, id, fields } => {
            print_json(&es.update_json(&target.target(), &id, &fields).await?)
        }
        Command::UpdateByQuery {
            target,
            query,
            fields,
        } => {
            let fields = parse_document(&fields).context("Invalid fields JSON")?;
            print_json(
                &es.update_on_query_match(&target.target(), &parse_query(&query)?, &fields)
                    .await?,
            )
        }
        Command::Mapping { target, schema } => {
            let schema = match schema.strip_prefix('@') {
                Some(path) => std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read mapping file {}", path))?,
                None => schema,
            };
            es.create_mapping(&target.target(), &schema).await?;
            print_json(&true)
        }
        Command::Count { index } => {
            let count = es.backend().doc_count(&index).await?;
            print_json(&serde_json::json!({ "index": index, "count": count }))
        }
        Command::Refresh { index } => {
            es.refresh_index(&index).await?;
            print_json(&true)
        }
        Command::DropIndex { index } => {
            es.delete_index(&index).await?;
            print_json(&true)
        }
    }
}

fn parse_query(json: &str) -> Result<Query> {
    Query::parse(json).context("Invalid query JSON")
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_count_subcommand() {
        let cli = Cli::try_parse_from(["esq", "--host", "es.internal", "count", "logs"]).unwrap();
        assert!(matches!(cli.command, Command::Count { ref index } if index == "logs"));

        let config = build_config(&cli).unwrap();
        assert_eq!(config.host, "es.internal");
    }

    #[test]
    fn test_search_order_parses() {
        let cli = Cli::try_parse_from(["esq", "search", "logs", "--sort", "ts", "--order", "desc"])
            .unwrap();
        match cli.command {
            Command::Search { sort, order, .. } => {
                assert_eq!(sort.as_deref(), Some("ts"));
                assert_eq!(order, SortOrder::Desc);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_zero_max_hits_rejected() {
        let cli = Cli::try_parse_from(["esq", "--max-hits", "0", "health"]).unwrap();
        assert!(build_config(&cli).is_err());
    }
}
