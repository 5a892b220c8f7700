//! SQLite implementation of the CursorRepository.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;

use crate::adapters::sqlite::{parse_datetime, parse_optional_datetime};
use crate::domain::errors::DomainResult;
use crate::domain::models::CursorRecord;
use crate::domain::ports::CursorRepository;

#[derive(Clone)]
pub struct SqliteCursorRepository {
    pool: SqlitePool,
}

impl SqliteCursorRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct CursorRow {
    service_name: String,
    position: i64,
    events_processed: i64,
    last_error: Option<String>,
    last_error_at: Option<String>,
    updated_at: String,
}

fn row_to_cursor(row: CursorRow) -> DomainResult<CursorRecord> {
    Ok(CursorRecord {
        service_name: row.service_name,
        position: row.position,
        events_processed: row.events_processed,
        last_error: row.last_error,
        last_error_at: parse_optional_datetime(row.last_error_at)?,
        updated_at: parse_datetime(&row.updated_at)?,
    })
}

#[async_trait]
impl CursorRepository for SqliteCursorRepository {
    async fn load(&self, service: &str) -> DomainResult<Option<CursorRecord>> {
        let row: Option<CursorRow> =
            sqlx::query_as("SELECT * FROM stream_cursors WHERE service_name = ?")
                .bind(service)
                .fetch_optional(&self.pool)
                .await?;

        row.map(row_to_cursor).transpose()
    }

    async fn save(&self, service: &str, position: i64, events_processed: i64) -> DomainResult<()> {
        sqlx::query(
            r#"INSERT INTO stream_cursors (service_name, position, events_processed, updated_at)
               VALUES (?, ?, ?, ?)
               ON CONFLICT(service_name) DO UPDATE SET
                   position = MAX(position, excluded.position),
                   events_processed = MAX(events_processed, excluded.events_processed),
                   updated_at = excluded.updated_at"#,
        )
        .bind(service)
        .bind(position)
        .bind(events_processed)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn record_error(&self, service: &str, message: &str) -> DomainResult<()> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            r#"INSERT INTO stream_cursors (service_name, position, events_processed, last_error, last_error_at, updated_at)
               VALUES (?, 0, 0, ?, ?, ?)
               ON CONFLICT(service_name) DO UPDATE SET
                   last_error = excluded.last_error,
                   last_error_at = excluded.last_error_at,
                   updated_at = excluded.updated_at"#,
        )
        .bind(service)
        .bind(message)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list(&self) -> DomainResult<Vec<CursorRecord>> {
        let rows: Vec<CursorRow> =
            sqlx::query_as("SELECT * FROM stream_cursors ORDER BY service_name")
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter().map(row_to_cursor).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::create_migrated_test_pool;

    async fn setup() -> SqliteCursorRepository {
        SqliteCursorRepository::new(create_migrated_test_pool().await.unwrap())
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let repo = setup().await;
        assert!(repo.load("firehose").await.unwrap().is_none());

        repo.save("firehose", 42, 10).await.unwrap();
        let cursor = repo.load("firehose").await.unwrap().unwrap();
        assert_eq!(cursor.position, 42);
        assert_eq!(cursor.events_processed, 10);
        assert!(cursor.last_error.is_none());
    }

    #[tokio::test]
    async fn test_position_never_moves_backwards() {
        let repo = setup().await;
        repo.save("jetstream", 500, 5).await.unwrap();
        repo.save("jetstream", 300, 3).await.unwrap();

        let cursor = repo.load("jetstream").await.unwrap().unwrap();
        assert_eq!(cursor.position, 500);
        assert_eq!(cursor.events_processed, 5);
    }

    #[tokio::test]
    async fn test_record_error_keeps_position() {
        let repo = setup().await;
        repo.save("firehose", 7, 1).await.unwrap();
        repo.record_error("firehose", "connection reset").await.unwrap();

        let cursor = repo.load("firehose").await.unwrap().unwrap();
        assert_eq!(cursor.position, 7);
        assert_eq!(cursor.last_error.as_deref(), Some("connection reset"));
        assert!(cursor.last_error_at.is_some());
        assert_eq!(repo.list().await.unwrap().len(), 1);
    }
}
