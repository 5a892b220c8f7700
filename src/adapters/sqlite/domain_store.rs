//! SQLite implementation of the DomainStore.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;

use crate::adapters::sqlite::parse_datetime;
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{NameClaim, NewUser, TimelineEntry, User};
use crate::domain::ports::DomainStore;

#[derive(Clone)]
pub struct SqliteDomainStore {
    pool: SqlitePool,
}

impl SqliteDomainStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    did: String,
    handle: String,
    name: String,
    pds: Option<String>,
    created_at: String,
}

#[derive(Debug, sqlx::FromRow)]
struct TimelineRow {
    did: String,
    entry_type: String,
    key: String,
    text: String,
    uri: Option<String>,
    created_at: String,
}

fn row_to_timeline(row: TimelineRow) -> DomainResult<TimelineEntry> {
    Ok(TimelineEntry {
        did: row.did,
        key: row.key,
        entry_type: row.entry_type,
        text: row.text,
        uri: row.uri,
        created_at: parse_datetime(&row.created_at)?,
    })
}

fn kindred_pair<'a>(a: &'a str, b: &'a str) -> (&'a str, &'a str) {
    if a < b {
        (a, b)
    } else {
        (b, a)
    }
}

#[async_trait]
impl DomainStore for SqliteDomainStore {
    async fn get_user(&self, did: &str) -> DomainResult<Option<User>> {
        let row: Option<UserRow> = sqlx::query_as("SELECT * FROM users WHERE did = ?")
            .bind(did)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let alternates: Vec<(String,)> =
            sqlx::query_as("SELECT name FROM user_names WHERE did = ? AND name <> ? ORDER BY claimed_at, name")
                .bind(did)
                .bind(&row.name)
                .fetch_all(&self.pool)
                .await?;

        Ok(Some(User {
            did: row.did,
            handle: row.handle,
            name: row.name,
            alternates: alternates.into_iter().map(|(n,)| n).collect(),
            pds: row.pds,
            created_at: parse_datetime(&row.created_at)?,
        }))
    }

    async fn insert_user_if_absent(&self, user: &NewUser) -> DomainResult<bool> {
        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            "INSERT OR IGNORE INTO users (did, handle, name, pds, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&user.did)
        .bind(&user.handle)
        .bind(&user.name)
        .bind(&user.pds)
        .bind(&now)
        .execute(&mut *tx)
        .await?
        .rows_affected()
            == 1;

        if !inserted {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query("INSERT OR IGNORE INTO user_names (name, did, claimed_at) VALUES (?, ?, ?)")
            .bind(&user.name)
            .bind(&user.did)
            .bind(&now)
            .execute(&mut *tx)
            .await?;

        let owner: Option<(String,)> = sqlx::query_as("SELECT did FROM user_names WHERE name = ?")
            .bind(&user.name)
            .fetch_optional(&mut *tx)
            .await?;

        match owner {
            Some((owner,)) if owner != user.did => {
                tx.rollback().await?;
                Err(DomainError::NameTaken {
                    name: user.name.clone(),
                    owner,
                })
            }
            _ => {
                tx.commit().await?;
                Ok(true)
            }
        }
    }

    async fn user_dids(&self) -> DomainResult<HashSet<String>> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT did FROM users")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|(d,)| d).collect())
    }

    async fn name_owner(&self, name: &str) -> DomainResult<Option<String>> {
        let row: Option<(String,)> = sqlx::query_as("SELECT did FROM user_names WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(d,)| d))
    }

    async fn claim_name(&self, did: &str, name: &str) -> DomainResult<NameClaim> {
        let inserted = sqlx::query("INSERT OR IGNORE INTO user_names (name, did, claimed_at) VALUES (?, ?, ?)")
            .bind(name)
            .bind(did)
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await?
            .rows_affected()
            == 1;

        if inserted {
            return Ok(NameClaim::Claimed);
        }

        match self.name_owner(name).await? {
            Some(owner) if owner == did => Ok(NameClaim::AlreadyOwned),
            Some(owner) => Ok(NameClaim::TakenBy(owner)),
            None => Err(DomainError::DatabaseError(format!(
                "name '{name}' neither claimed nor owned"
            ))),
        }
    }

    async fn set_primary_name(
        &self,
        did: &str,
        expected_current: &str,
        new_name: &str,
    ) -> DomainResult<bool> {
        let result = sqlx::query(
            r#"UPDATE users SET name = ?
               WHERE did = ? AND name = ?
               AND EXISTS (SELECT 1 FROM user_names WHERE name = ? AND did = ?)"#,
        )
        .bind(new_name)
        .bind(did)
        .bind(expected_current)
        .bind(new_name)
        .bind(did)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn has_timeline_key(&self, did: &str, key: &str) -> DomainResult<bool> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT 1 FROM timeline_entries WHERE did = ? AND key = ? LIMIT 1")
                .bind(did)
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.is_some())
    }

    async fn count_users_with_timeline_key(&self, key: &str) -> DomainResult<u64> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(DISTINCT did) FROM timeline_entries WHERE key = ?")
                .bind(key)
                .fetch_one(&self.pool)
                .await?;
        Ok(count.max(0) as u64)
    }

    async fn insert_timeline_if_absent(&self, entry: &TimelineEntry) -> DomainResult<bool> {
        let result = sqlx::query(
            r#"INSERT OR IGNORE INTO timeline_entries (did, entry_type, key, text, uri, created_at)
               VALUES (?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&entry.did)
        .bind(&entry.entry_type)
        .bind(&entry.key)
        .bind(&entry.text)
        .bind(&entry.uri)
        .bind(entry.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn timeline(&self, did: &str) -> DomainResult<Vec<TimelineEntry>> {
        let rows: Vec<TimelineRow> = sqlx::query_as(
            "SELECT did, entry_type, key, text, uri, created_at FROM timeline_entries WHERE did = ? ORDER BY id",
        )
        .bind(did)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(row_to_timeline).collect()
    }

    async fn has_collectible(&self, did: &str, key: &str) -> DomainResult<bool> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT 1 FROM collectibles WHERE did = ? AND item_key = ?")
                .bind(did)
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.is_some())
    }

    async fn grant_collectible_if_absent(&self, did: &str, key: &str) -> DomainResult<bool> {
        let result =
            sqlx::query("INSERT OR IGNORE INTO collectibles (did, item_key, awarded_at) VALUES (?, ?, ?)")
                .bind(did)
                .bind(key)
                .bind(Utc::now().to_rfc3339())
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn collectibles(&self, did: &str) -> DomainResult<Vec<String>> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT item_key FROM collectibles WHERE did = ? ORDER BY awarded_at, item_key")
                .bind(did)
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(|(k,)| k).collect())
    }

    async fn link_kindred_if_absent(&self, a: &str, b: &str) -> DomainResult<bool> {
        if a == b {
            return Ok(false);
        }
        let (low, high) = kindred_pair(a, b);
        let result =
            sqlx::query("INSERT OR IGNORE INTO kindred (did_a, did_b, created_at) VALUES (?, ?, ?)")
                .bind(low)
                .bind(high)
                .bind(Utc::now().to_rfc3339())
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn kindred(&self, did: &str) -> DomainResult<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"SELECT did_b FROM kindred WHERE did_a = ?
               UNION SELECT did_a FROM kindred WHERE did_b = ?
               ORDER BY 1"#,
        )
        .bind(did)
        .bind(did)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(d,)| d).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::create_migrated_test_pool;

    async fn setup() -> SqliteDomainStore {
        SqliteDomainStore::new(create_migrated_test_pool().await.unwrap())
    }

    fn new_user(did: &str, name: &str) -> NewUser {
        NewUser {
            did: did.into(),
            handle: format!("{name}.test"),
            name: name.into(),
            pds: Some("https://pds.test".into()),
        }
    }

    #[tokio::test]
    async fn test_insert_user_is_idempotent() {
        let store = setup().await;
        assert!(store.insert_user_if_absent(&new_user("did:plc:a", "ash")).await.unwrap());
        assert!(!store.insert_user_if_absent(&new_user("did:plc:a", "ash")).await.unwrap());

        let user = store.get_user("did:plc:a").await.unwrap().unwrap();
        assert_eq!(user.name, "ash");
        assert!(user.alternates.is_empty());
        assert_eq!(store.name_owner("ASH").await.unwrap().as_deref(), Some("did:plc:a"));
        assert_eq!(store.user_dids().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_insert_user_with_taken_name_rolls_back() {
        let store = setup().await;
        store.insert_user_if_absent(&new_user("did:plc:a", "ash")).await.unwrap();

        let err = store.insert_user_if_absent(&new_user("did:plc:b", "ash")).await.unwrap_err();
        assert!(matches!(err, DomainError::NameTaken { .. }));
        assert!(store.get_user("did:plc:b").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_claim_and_switch_primary_name() {
        let store = setup().await;
        store.insert_user_if_absent(&new_user("did:plc:a", "ash")).await.unwrap();
        store.insert_user_if_absent(&new_user("did:plc:b", "birch")).await.unwrap();

        assert_eq!(store.claim_name("did:plc:a", "cedar").await.unwrap(), NameClaim::Claimed);
        assert_eq!(store.claim_name("did:plc:a", "cedar").await.unwrap(), NameClaim::AlreadyOwned);
        assert_eq!(
            store.claim_name("did:plc:a", "birch").await.unwrap(),
            NameClaim::TakenBy("did:plc:b".into())
        );

        assert!(store.set_primary_name("did:plc:a", "ash", "cedar").await.unwrap());
        assert!(!store.set_primary_name("did:plc:a", "ash", "cedar").await.unwrap());
        assert!(!store.set_primary_name("did:plc:a", "cedar", "birch").await.unwrap());

        let user = store.get_user("did:plc:a").await.unwrap().unwrap();
        assert_eq!(user.name, "cedar");
        assert_eq!(user.alternates, vec!["ash"]);
    }

    #[tokio::test]
    async fn test_timeline_insert_if_absent_and_count() {
        let store = setup().await;
        let entry = TimelineEntry::new("did:plc:a", "greeted", "event", "said hello");
        assert!(store.insert_timeline_if_absent(&entry).await.unwrap());
        assert!(!store.insert_timeline_if_absent(&entry).await.unwrap());
        store
            .insert_timeline_if_absent(&TimelineEntry::new("did:plc:b", "greeted", "event", "hi"))
            .await
            .unwrap();

        assert!(store.has_timeline_key("did:plc:a", "greeted").await.unwrap());
        assert!(!store.has_timeline_key("did:plc:c", "greeted").await.unwrap());
        assert_eq!(store.count_users_with_timeline_key("greeted").await.unwrap(), 2);
        assert_eq!(store.timeline("did:plc:a").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_collectibles_and_kindred() {
        let store = setup().await;
        assert!(store.grant_collectible_if_absent("did:plc:a", "lantern").await.unwrap());
        assert!(!store.grant_collectible_if_absent("did:plc:a", "lantern").await.unwrap());
        assert!(store.has_collectible("did:plc:a", "lantern").await.unwrap());
        assert_eq!(store.collectibles("did:plc:a").await.unwrap(), vec!["lantern"]);

        assert!(store.link_kindred_if_absent("did:plc:b", "did:plc:a").await.unwrap());
        assert!(!store.link_kindred_if_absent("did:plc:a", "did:plc:b").await.unwrap());
        assert!(!store.link_kindred_if_absent("did:plc:a", "did:plc:a").await.unwrap());
        assert_eq!(store.kindred("did:plc:a").await.unwrap(), vec!["did:plc:b"]);
        assert_eq!(store.kindred("did:plc:b").await.unwrap(), vec!["did:plc:a"]);
    }
}
