//! SQLite implementation of the QuestRepository.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::adapters::sqlite::{parse_datetime, parse_uuid};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{Condition, Command, Quest, QuestUpdate, TriggerConfig};
use crate::domain::ports::QuestRepository;

#[derive(Clone)]
pub struct SqliteQuestRepository {
    pool: SqlitePool,
}

impl SqliteQuestRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn write(&self, quest: &Quest) -> DomainResult<()> {
        let trigger_config = serde_json::to_string(&quest.trigger)?;
        let conditions = serde_json::to_string(&quest.conditions)?;
        let commands = serde_json::to_string(&quest.commands)?;
        let operator = serde_json::to_value(quest.condition_operator)?;

        sqlx::query(
            r#"UPDATE quests SET
               description = ?, trigger_type = ?, trigger_config = ?,
               conditions = ?, condition_operator = ?, commands = ?,
               enabled = ?, updated_at = ?
               WHERE title = ?"#,
        )
        .bind(&quest.description)
        .bind(quest.trigger_type().as_str())
        .bind(&trigger_config)
        .bind(&conditions)
        .bind(operator.as_str().unwrap_or("AND"))
        .bind(&commands)
        .bind(i32::from(quest.enabled))
        .bind(quest.updated_at.to_rfc3339())
        .bind(&quest.title)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn require(&self, title: &str) -> DomainResult<Quest> {
        self.get(title)
            .await?
            .ok_or_else(|| DomainError::QuestNotFound(title.to_string()))
    }
}

#[derive(Debug, sqlx::FromRow)]
struct QuestRow {
    id: String,
    title: String,
    description: String,
    trigger_config: String,
    conditions: String,
    condition_operator: String,
    commands: String,
    enabled: i32,
    created_at: String,
    updated_at: String,
}

fn row_to_quest(row: QuestRow) -> DomainResult<Quest> {
    let trigger: TriggerConfig = serde_json::from_str(&row.trigger_config)
        .map_err(|e| DomainError::SerializationError(format!("quest '{}': {}", row.title, e)))?;
    let conditions: Vec<Condition> = serde_json::from_str(&row.conditions)
        .map_err(|e| DomainError::SerializationError(format!("quest '{}': {}", row.title, e)))?;
    let commands: Vec<Command> = serde_json::from_str(&row.commands)
        .map_err(|e| DomainError::SerializationError(format!("quest '{}': {}", row.title, e)))?;

    Ok(Quest {
        id: parse_uuid(&row.id)?,
        title: row.title,
        description: row.description,
        trigger,
        conditions,
        condition_operator: row.condition_operator.parse()?,
        commands,
        enabled: row.enabled != 0,
        created_at: parse_datetime(&row.created_at)?,
        updated_at: parse_datetime(&row.updated_at)?,
    })
}

#[async_trait]
impl QuestRepository for SqliteQuestRepository {
    async fn create(&self, quest: &Quest) -> DomainResult<()> {
        let trigger_config = serde_json::to_string(&quest.trigger)?;
        let conditions = serde_json::to_string(&quest.conditions)?;
        let commands = serde_json::to_string(&quest.commands)?;
        let operator = serde_json::to_value(quest.condition_operator)?;

        let result = sqlx::query(
            r#"INSERT INTO quests
               (id, title, description, trigger_type, trigger_config, conditions,
                condition_operator, commands, enabled, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
               ON CONFLICT(title) DO NOTHING"#,
        )
        .bind(quest.id.to_string())
        .bind(&quest.title)
        .bind(&quest.description)
        .bind(quest.trigger_type().as_str())
        .bind(&trigger_config)
        .bind(&conditions)
        .bind(operator.as_str().unwrap_or("AND"))
        .bind(&commands)
        .bind(i32::from(quest.enabled))
        .bind(quest.created_at.to_rfc3339())
        .bind(quest.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DomainError::QuestExists(quest.title.clone()));
        }
        Ok(())
    }

    async fn get(&self, title: &str) -> DomainResult<Option<Quest>> {
        let row: Option<QuestRow> = sqlx::query_as("SELECT * FROM quests WHERE title = ?")
            .bind(title)
            .fetch_optional(&self.pool)
            .await?;

        row.map(row_to_quest).transpose()
    }

    async fn update(&self, title: &str, update: QuestUpdate) -> DomainResult<Quest> {
        let mut quest = self.require(title).await?;
        update.apply(&mut quest);
        self.write(&quest).await?;
        Ok(quest)
    }

    async fn disable(&self, title: &str) -> DomainResult<()> {
        let result = sqlx::query("UPDATE quests SET enabled = 0, updated_at = ? WHERE title = ?")
            .bind(chrono::Utc::now().to_rfc3339())
            .bind(title)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DomainError::QuestNotFound(title.to_string()));
        }
        Ok(())
    }

    async fn disable_conditions(&self, title: &str, indices: &[usize]) -> DomainResult<()> {
        let mut quest = self.require(title).await?;
        let mut changed = false;
        for &index in indices {
            match quest.conditions.get_mut(index) {
                Some(condition) if !condition.disabled => {
                    condition.disabled = true;
                    changed = true;
                }
                Some(_) => {}
                None => {
                    tracing::warn!(quest = %title, index, "condition index out of range");
                }
            }
        }
        if changed {
            quest.updated_at = chrono::Utc::now();
            self.write(&quest).await?;
        }
        Ok(())
    }

    async fn delete(&self, title: &str) -> DomainResult<()> {
        let result = sqlx::query("DELETE FROM quests WHERE title = ?")
            .bind(title)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DomainError::QuestNotFound(title.to_string()));
        }
        Ok(())
    }

    async fn list(&self) -> DomainResult<Vec<Quest>> {
        let rows: Vec<QuestRow> = sqlx::query_as("SELECT * FROM quests ORDER BY title")
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(row_to_quest).collect()
    }

    async fn list_enabled(&self) -> DomainResult<Vec<Quest>> {
        let rows: Vec<QuestRow> =
            sqlx::query_as("SELECT * FROM quests WHERE enabled = 1 ORDER BY title")
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter().map(row_to_quest).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::create_migrated_test_pool;
    use crate::domain::models::ConditionOperator;

    async fn setup() -> SqliteQuestRepository {
        let pool = create_migrated_test_pool().await.unwrap();
        SqliteQuestRepository::new(pool)
    }

    fn greet_quest() -> Quest {
        Quest::new(
            "greet",
            TriggerConfig::ReplyToPost {
                post_uri: "at://did:plc:quest/app.bsky.feed.post/1".into(),
                known_authors_only: true,
            },
        )
        .with_condition(Condition::new("hasnt-milestone", vec!["greeted".into()]))
        .with_condition(Condition::new("is-registered", vec![]).with_operator(ConditionOperator::Or))
        .with_command(Command::new(
            "record-timeline-entry",
            vec!["greeted".into(), "said hello".into(), "event".into()],
        ))
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let repo = setup().await;
        let quest = greet_quest();
        repo.create(&quest).await.unwrap();

        let loaded = repo.get("greet").await.unwrap().unwrap();
        assert_eq!(loaded.id, quest.id);
        assert_eq!(loaded.trigger, quest.trigger);
        assert_eq!(loaded.conditions, quest.conditions);
        assert_eq!(loaded.commands, quest.commands);
        assert!(loaded.enabled);
    }

    #[tokio::test]
    async fn test_duplicate_title_rejected() {
        let repo = setup().await;
        repo.create(&greet_quest()).await.unwrap();

        let err = repo.create(&greet_quest()).await.unwrap_err();
        assert!(matches!(err, DomainError::QuestExists(t) if t == "greet"));
    }

    #[tokio::test]
    async fn test_legacy_encoded_rows_load() {
        let repo = setup().await;
        sqlx::query(
            r#"INSERT INTO quests (id, title, trigger_type, trigger_config, conditions, commands, created_at, updated_at)
               VALUES (?, 'legacy', 'reply-to-post', ?, ?, ?, ?, ?)"#,
        )
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(r#"{"type":"reply-to-post","post_uri":"at://x/app.bsky.feed.post/1"}"#)
        .bind(r#"["hasnt_canon:greeted"]"#)
        .bind(r#"["add_canon:greeted:said hello:event"]"#)
        .bind(chrono::Utc::now().to_rfc3339())
        .bind(chrono::Utc::now().to_rfc3339())
        .execute(&repo.pool)
        .await
        .unwrap();

        let quest = repo.get("legacy").await.unwrap().unwrap();
        assert_eq!(quest.conditions[0].args, vec!["greeted"]);
        assert_eq!(quest.commands[0].args, vec!["greeted", "said hello", "event"]);
    }

    #[tokio::test]
    async fn test_disable_removes_from_enabled_list() {
        let repo = setup().await;
        repo.create(&greet_quest()).await.unwrap();
        assert_eq!(repo.list_enabled().await.unwrap().len(), 1);

        repo.disable("greet").await.unwrap();
        assert!(repo.list_enabled().await.unwrap().is_empty());
        assert_eq!(repo.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_disable_conditions_marks_indices() {
        let repo = setup().await;
        repo.create(&greet_quest()).await.unwrap();

        repo.disable_conditions("greet", &[1, 7]).await.unwrap();
        let quest = repo.get("greet").await.unwrap().unwrap();
        assert!(!quest.conditions[0].disabled);
        assert!(quest.conditions[1].disabled);
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let repo = setup().await;
        repo.create(&greet_quest()).await.unwrap();

        let updated = repo
            .update(
                "greet",
                QuestUpdate {
                    description: Some("say hi".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.description, "say hi");
        assert_eq!(repo.get("greet").await.unwrap().unwrap().description, "say hi");

        repo.delete("greet").await.unwrap();
        assert!(repo.get("greet").await.unwrap().is_none());
        assert!(matches!(repo.delete("greet").await, Err(DomainError::QuestNotFound(_))));
    }
}
