// Row source module
// Loads table dumps produced by relational and document connectors


use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::chunking::{Chunk, Table};
use crate::{Result, TableRagError};

/// Kind of database the tables were read from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
pub enum DbType {
    #[default]
    Postgresql,
    Mongodb,
}

impl fmt::Display for DbType {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            DbType::Postgresql => write!(f, "postgresql"),
            DbType::Mongodb => write!(f, "mongodb"),
        }
    }
}

impl FromStr for DbType {
    type Err = TableRagError;

    #[inline]
    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "postgresql" | "postgres" | "pg" => Ok(DbType::Postgresql),
            "mongodb" | "mongo" => Ok(DbType::Mongodb),
            other => Err(TableRagError::InvalidInput(format!(
                "Unsupported database type: {}",
                other
            ))),
        }
    }
}

/// Parse a JSON array of tables: `[{tableName, columns, data}]`
#[inline]
pub fn parse_tables(json: &str) -> Result<Vec<Table>> {
    let tables: Vec<Table> = serde_json::from_str(json).map_err(|e| {
        TableRagError::InvalidInput(format!("Row source is not a list of tables: {}", e))
    })?;

    for table in &tables {
        if table.table_name.trim().is_empty() {
            return Err(TableRagError::InvalidInput(
                "Row source contains a table without a name".to_string(),
            ));
        }
    }

    debug!("Parsed {} tables from row source", tables.len());
    Ok(tables)
}

/// Read and parse a table dump from disk
#[inline]
pub fn load_tables(path: &Path) -> Result<Vec<Table>> {
    let content = std::fs::read_to_string(path)?;
    parse_tables(&content)
}

/// Read a JSON array of previously emitted chunks
#[inline]
pub fn load_chunks(path: &Path) -> Result<Vec<Chunk>> {
    let content = std::fs::read_to_string(path)?;
    serde_json::from_str(&content).map_err(|e| {
        TableRagError::InvalidInput(format!("File is not a list of chunks: {}", e))
    })
}
