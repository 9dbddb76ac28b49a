use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::json;
use sms_platform_search::{
    config::Config,
    search::{EngineBackend, SearchService},
    telemetry, AppError,
};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "sms-search-admin")]
#[command(about = "SMS platform search administration", long_about = None)]
struct Cli {
    /// Configuration file (overrides SMS_SEARCH_CONFIG)
    #[arg(short, long, env = "SMS_SEARCH_CONFIG")]
    config: Option<String>,

    /// Elasticsearch URL (overrides configuration)
    #[arg(short, long)]
    url: Option<String>,

    /// Use the embedded engine with indices stored under this directory
    #[arg(long, value_name = "DIR")]
    embedded: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the configured index if it does not exist
    CreateIndex,

    /// Delete an index (defaults to the configured one)
    DeleteIndex {
        #[arg(value_name = "NAME")]
        name: Option<String>,
    },

    /// Check whether an index exists
    Exists {
        #[arg(value_name = "NAME")]
        name: Option<String>,
    },

    /// Insert a document given as JSON
    Add {
        #[arg(value_name = "DOCUMENT")]
        document: String,
    },

    /// Search with a JSON query descriptor
    Search {
        #[arg(value_name = "QUERY")]
        query: String,
    },

    /// Count matches of a JSON query descriptor
    Count {
        #[arg(value_name = "QUERY")]
        query: String,
    },

    /// Partially update the document with the given business key
    Update {
        #[arg(value_name = "KEY")]
        key: String,

        #[arg(value_name = "PARTIAL")]
        partial: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            return ExitCode::from(e.exit_code() as u8);
        }
    };
    telemetry::init_tracing(&config.observability);

    match run(cli.command, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error_code = e.error_code(), "{}", e);
            eprintln!("{}: {}", e.error_code(), e);
            ExitCode::from(e.exit_code() as u8)
        }
    }
}

fn load_config(cli: &Cli) -> Result<Config, AppError> {
    let mut config = match cli.config {
        Some(ref path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    if let Some(ref url) = cli.url {
        config.search.backend = EngineBackend::Elasticsearch;
        config.search.elasticsearch.url = url.clone();
    }
    if let Some(ref dir) = cli.embedded {
        config.search.backend = EngineBackend::Embedded;
        config.search.embedded.data_dir = Some(dir.clone());
    }

    Ok(config)
}

async fn run(command: Commands, config: Config) -> Result<(), AppError> {
    let service = SearchService::from_config(config.search)?;
    let index_name = service.config().index_name.clone();

    match command {
        Commands::CreateIndex => {
            let outcome = service.create_index().await?;
            print_json(&json!({ "index": index_name, "outcome": outcome }))?;
        }

        Commands::DeleteIndex { name } => {
            let name = name.unwrap_or(index_name);
            let outcome = service.delete_index(&name).await?;
            print_json(&json!({ "index": name, "result": outcome }))?;
        }

        Commands::Exists { name } => {
            let name = name.unwrap_or(index_name);
            let exists = service.exists_index(&name).await?;
            print_json(&json!({ "index": name, "exists": exists }))?;
        }

        Commands::Add { document } => {
            let id = service.add_json(&document).await?;
            print_json(&json!({ "id": id }))?;
        }

        Commands::Search { query } => {
            let response = service.search_json(&query).await?;
            print_json(&response)?;
        }

        Commands::Count { query } => {
            let count = service.count_json(&query).await?;
            print_json(&json!({ "count": count }))?;
        }

        Commands::Update { key, partial } => {
            let id = service.update_json(&key, &partial).await?;
            print_json(&json!({ "key": key, "id": id }))?;
        }
    }

    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<(), AppError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
