use std::path::Path;

use anyhow::{Context, Result, anyhow};
use console::style;
use tracing::{info, warn};

use crate::chunking::{Chunk, ChunkEncoder, Table, TableSample, reconstruct_tables};
use crate::config::Config;
use crate::database::lancedb::VectorStore;
use crate::database::sqlite::Database;
use crate::embeddings::OllamaClient;
use crate::indexer::{IngestRequest, Indexer};
use crate::retrieval::Retriever;
use crate::source::{load_chunks, load_tables};

/// Encode every table of a dump into chunks, numbering each table from zero
#[inline]
pub fn encode_tables(tables: &[Table], byte_budget: usize) -> Vec<Chunk> {
    let encoder = ChunkEncoder::new(byte_budget);
    tables.iter().flat_map(|table| encoder.encode(table)).collect()
}

/// Rebuild rows from chunks, optionally keeping a single table
#[inline]
pub fn reconstruct_chunks(chunks: &[Chunk], table: Option<&str>) -> Vec<TableSample> {
    reconstruct_tables(chunks)
        .into_iter()
        .filter(|sample| table.is_none_or(|name| sample.table_name == name))
        .collect()
}

/// Print the chunks of a table dump as JSON
#[inline]
pub fn encode_file(path: &Path, byte_budget: Option<usize>) -> Result<()> {
    let mut config = Config::load_default().context("Failed to load configuration")?;
    if let Some(budget) = byte_budget {
        config.chunking.set_byte_budget(budget)?;
    }
    let byte_budget = config.chunking.byte_budget;

    let tables = load_tables(path)
        .with_context(|| format!("Failed to load tables from {}", path.display()))?;
    let chunks = encode_tables(&tables, byte_budget);
    info!(
        "Encoded {} tables into {} chunks (budget {} bytes)",
        tables.len(),
        chunks.len(),
        byte_budget
    );

    println!("{}", serde_json::to_string_pretty(&chunks)?);
    Ok(())
}

/// Print the rows rebuilt from a file of chunks as JSON
#[inline]
pub fn reconstruct_file(path: &Path, table: Option<&str>) -> Result<()> {
    let chunks = load_chunks(path)
        .with_context(|| format!("Failed to load chunks from {}", path.display()))?;
    let samples = reconstruct_chunks(&chunks, table);

    if let Some(name) = table {
        if samples.is_empty() {
            warn!("No chunks found for table {}", name);
        }
    }

    println!("{}", serde_json::to_string_pretty(&samples)?);
    Ok(())
}

/// Embed a table dump and store it for a connection
#[inline]
pub async fn ingest_file(path: &Path, request: &IngestRequest) -> Result<()> {
    let config = Config::load_default()?;
    let tables = load_tables(path)
        .with_context(|| format!("Failed to load tables from {}", path.display()))?;

    let client = OllamaClient::new(&config)?;
    client
        .health_check()
        .context("Ollama is not ready, run 'tablerag config' to check the connection")?;

    let mut indexer = Indexer::new(config, client).await?;
    let stats = indexer.ingest(&tables, request).await?;

    let mode = if request.incremental {
        "Incremental sync"
    } else {
        "Full sync"
    };
    println!(
        "{} {} of {} ({})",
        style("✓").green(),
        mode,
        style(&request.connection_name).bold(),
        request.connection_id
    );
    println!(
        "  Tables: {} indexed, {} skipped",
        stats.tables_indexed, stats.tables_skipped
    );
    println!("  Rows encoded: {}", stats.rows_encoded);
    println!("  Chunks created: {}", stats.chunks_created);
    println!("  Records stored: {}", stats.records_stored);
    Ok(())
}

/// Print the context retrieved for a question as JSON
#[inline]
pub async fn query_connection(
    connection_id: &str,
    question: &str,
    top_k: Option<usize>,
) -> Result<()> {
    let config = Config::load_default()?;
    let database = Database::initialize_from_config(&config).await?;
    if database.get_connection(connection_id).await?.is_none() {
        return Err(anyhow!("Connection not found: {}", connection_id));
    }

    let top_k = top_k.unwrap_or(config.retrieval.top_k);
    let client = OllamaClient::new(&config)?;
    let vector_store = VectorStore::new(&config).await?;

    let context = Retriever::new(vector_store, client, top_k)
        .retrieve(connection_id, question)
        .await?;

    println!("{}", serde_json::to_string_pretty(&context)?);
    Ok(())
}

/// List every connection that has been ingested
#[inline]
pub async fn list_connections() -> Result<()> {
    let config = Config::load_default()?;
    let database = Database::initialize_from_config(&config).await?;
    let connections = database.list_connections().await?;

    if connections.is_empty() {
        println!("No connections have been ingested yet.");
        println!("Use 'tablerag ingest <file> --connection <id>' to add one.");
        return Ok(());
    }

    println!("Connections ({} total):", connections.len());
    println!();

    for connection in &connections {
        println!(
            "{} ({})",
            style(&connection.name).bold(),
            style(&connection.id).dim()
        );
        println!("   Type: {}", connection.db_type);
        println!("   Tables: {}", connection.schema_items().len());
        match connection.last_synced {
            Some(synced) => println!("   Last Synced: {}", synced.format("%Y-%m-%d %H:%M:%S")),
            None => println!("   Last Synced: never"),
        }
        println!();
    }

    Ok(())
}

/// Show per-table sync state and stored records of one connection
#[inline]
pub async fn show_status(connection_id: &str) -> Result<()> {
    let config = Config::load_default()?;
    let database = Database::initialize_from_config(&config).await?;
    let connection = database
        .get_connection(connection_id)
        .await?
        .ok_or_else(|| anyhow!("Connection not found: {}", connection_id))?;

    println!(
        "{} {} ({})",
        style("Connection").bold(),
        connection.name,
        connection.id
    );
    println!("   Type: {}", connection.db_type);
    println!(
        "   Created: {}",
        connection.created_date.format("%Y-%m-%d %H:%M:%S")
    );

    match VectorStore::new(&config).await {
        Ok(store) => match store.count_records(Some(connection_id)).await {
            Ok(count) => println!("   Records: {}", count),
            Err(e) => println!("   Records: unavailable - {}", e),
        },
        Err(e) => println!("   {} Vector store unavailable - {}", style("⚠").yellow(), e),
    }

    let statuses = database.list_sync_status(connection_id).await?;
    println!();
    if statuses.is_empty() {
        println!("No tables have been synced.");
        return Ok(());
    }

    println!("Tables:");
    for status in &statuses {
        println!(
            "   {}: {} rows, next chunk {}, synced {}",
            status.table_name,
            status.last_sync_row_count,
            status.next_chunk_index,
            status.last_sync_timestamp.format("%Y-%m-%d %H:%M:%S")
        );
    }

    Ok(())
}

/// Remove a connection with its sync state and records
#[inline]
pub async fn delete_connection(connection_id: &str) -> Result<()> {
    let config = Config::load_default()?;
    let client = OllamaClient::new(&config)?;
    let mut indexer = Indexer::new(config, client).await?;

    if indexer.delete_connection(connection_id).await? {
        println!("{} Deleted connection {}", style("✓").green(), connection_id);
        Ok(())
    } else {
        Err(anyhow!("Connection not found: {}", connection_id))
    }
}
