use super::*;
use crate::source::DbType;
use anyhow::Result;
use sqlx::sqlite::SqlitePoolOptions;

async fn memory_pool() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(&pool)
        .await?;
    sqlx::migrate!("src/database/sqlite/migrations")
        .run(&pool)
        .await?;
    Ok(pool)
}

fn new_connection(id: &str, db_type: DbType) -> NewConnection {
    NewConnection {
        id: id.to_string(),
        name: id.to_uppercase(),
        db_type,
        table_schema: "[]".to_string(),
    }
}

#[tokio::test]
async fn db_type_is_stored_lowercase() -> Result<()> {
    let pool = memory_pool().await?;
    ConnectionQueries::upsert(&pool, &new_connection("docs", DbType::Mongodb)).await?;

    let raw: String = sqlx::query_scalar("SELECT db_type FROM connections WHERE id = 'docs'")
        .fetch_one(&pool)
        .await?;

    assert_eq!(raw, "mongodb");
    Ok(())
}

#[tokio::test]
async fn list_returns_every_connection() -> Result<()> {
    let pool = memory_pool().await?;
    ConnectionQueries::upsert(&pool, &new_connection("a", DbType::Postgresql)).await?;
    ConnectionQueries::upsert(&pool, &new_connection("b", DbType::Mongodb)).await?;

    let ids: Vec<String> = ConnectionQueries::list_all(&pool)
        .await?
        .into_iter()
        .map(|c| c.id)
        .collect();

    assert_eq!(ids.len(), 2);
    assert!(ids.contains(&"a".to_string()));
    assert!(ids.contains(&"b".to_string()));
    Ok(())
}

#[tokio::test]
async fn missing_rows_are_none() -> Result<()> {
    let pool = memory_pool().await?;

    assert!(ConnectionQueries::get_by_id(&pool, "nope").await?.is_none());
    assert!(SyncStatusQueries::get(&pool, "nope", "t").await?.is_none());
    assert!(
        SyncStatusQueries::list_for_connection(&pool, "nope")
            .await?
            .is_empty()
    );
    Ok(())
}
