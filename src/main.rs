use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tablerag::Result;
use tablerag::commands::{
    delete_connection, encode_file, ingest_file, list_connections, query_connection,
    reconstruct_file, show_status,
};
use tablerag::config::{run_interactive_config, show_config};
use tablerag::indexer::IngestRequest;
use tablerag::source::DbType;

#[derive(Parser)]
#[command(name = "tablerag")]
#[command(about = "Chunk, embed and retrieve database rows as context for language models")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure Ollama connection and settings
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Encode a JSON table dump into chunks and print them
    Encode {
        /// JSON file holding a list of tables
        file: PathBuf,
        /// Byte budget per chunk, defaults to the configured budget
        #[arg(long)]
        budget: Option<usize>,
    },
    /// Rebuild rows from a JSON list of chunks and print them
    Reconstruct {
        /// JSON file holding a list of chunks
        file: PathBuf,
        /// Only print rows of this table
        #[arg(long)]
        table: Option<String>,
    },
    /// Embed a JSON table dump and store it for a connection
    Ingest {
        /// JSON file holding a list of tables
        file: PathBuf,
        /// Connection identifier the tables belong to
        #[arg(long)]
        connection: String,
        /// Display name of the connection
        #[arg(long)]
        name: Option<String>,
        /// Kind of database the dump came from (postgresql or mongodb)
        #[arg(long, default_value = "postgresql")]
        db_type: DbType,
        /// Only index rows added since the last sync
        #[arg(long)]
        incremental: bool,
    },
    /// Retrieve schema and rows relevant to a question
    Query {
        /// Connection identifier to search
        connection: String,
        /// Natural language question
        question: String,
        /// Number of nearest records to fetch
        #[arg(long)]
        top_k: Option<usize>,
    },
    /// List all ingested connections
    List,
    /// Show sync state of a connection
    Status {
        /// Connection identifier
        connection: String,
    },
    /// Delete a connection and everything stored for it
    Delete {
        /// Connection identifier
        connection: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Config { show } => {
            if show {
                show_config()?;
            } else {
                run_interactive_config()?;
            }
        }
        Commands::Encode { file, budget } => {
            encode_file(&file, budget)?;
        }
        Commands::Reconstruct { file, table } => {
            reconstruct_file(&file, table.as_deref())?;
        }
        Commands::Ingest {
            file,
            connection,
            name,
            db_type,
            incremental,
        } => {
            let mut request = IngestRequest::full(connection, db_type);
            if let Some(name) = name {
                request = request.with_name(name);
            }
            if incremental {
                request = request.incremental();
            }
            ingest_file(&file, &request).await?;
        }
        Commands::Query {
            connection,
            question,
            top_k,
        } => {
            query_connection(&connection, &question, top_k).await?;
        }
        Commands::List => {
            list_connections().await?;
        }
        Commands::Status { connection } => {
            show_status(&connection).await?;
        }
        Commands::Delete { connection } => {
            delete_connection(&connection).await?;
        }
    }

    Ok(())
}
