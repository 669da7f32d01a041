//! PostgreSQL storage implementation over deadpool-postgres.

use crate::{GlobalStats, Storage, ThreadStats, TurnRecord};
use async_trait::async_trait;
use colloquy_core::{
    AgentRole, CollabMessage, CollabRun, CollabStep, ColloquyError, ColloquyResult, Conversation,
    EntityId, MessageRole, PipelineMode, RunStatus, StepFailure, StepStatus, StorageError,
    Timestamp,
};
use deadpool_postgres::{Config, ManagerConfig, Pool, RecyclingMethod, Runtime};
use std::time::Duration;
use tokio_postgres::{NoTls, Row};

/// Schema applied by [`PgStorage::apply_schema`].
pub const SCHEMA_SQL: &str = include_str!("../schema.sql");

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Connection pool configuration.
#[derive(Debug, Clone)]
pub struct PgConfig {
    pub host: String,
    pub port: u16,
    pub dbname: String,
    pub user: String,
    pub password: String,
    pub max_size: usize,
    pub timeout: Duration,
}

impl Default for PgConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            dbname: "colloquy".to_string(),
            user: "postgres".to_string(),
            password: String::new(),
            max_size: 16,
            timeout: Duration::from_secs(30),
        }
    }
}

impl PgConfig {
    /// Read configuration from `COLLOQUY_DB_*` environment variables,
    /// falling back to defaults.
    pub fn from_env() -> Self {
        Self {
            host: std::env::var("COLLOQUY_DB_HOST").unwrap_or_else(|_| "localhost".to_string()),
            port: std::env::var("COLLOQUY_DB_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(5432),
            dbname: std::env::var("COLLOQUY_DB_NAME").unwrap_or_else(|_| "colloquy".to_string()),
            user: std::env::var("COLLOQUY_DB_USER").unwrap_or_else(|_| "postgres".to_string()),
            password: std::env::var("COLLOQUY_DB_PASSWORD").unwrap_or_default(),
            max_size: std::env::var("COLLOQUY_DB_POOL_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(16),
            timeout: Duration::from_secs(
                std::env::var("COLLOQUY_DB_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
        }
    }

    /// Create a connection pool from this configuration.
    pub fn create_pool(&self) -> ColloquyResult<Pool> {
        let mut cfg = Config::new();
        cfg.host = Some(self.host.clone());
        cfg.port = Some(self.port);
        cfg.dbname = Some(self.dbname.clone());
        cfg.user = Some(self.user.clone());
        cfg.password = Some(self.password.clone());
        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });

        cfg.create_pool(Some(Runtime::Tokio1), NoTls).map_err(|e| {
            StorageError::ConnectionFailed {
                reason: format!("failed to create pool: {}", e),
            }
            .into()
        })
    }
}

// ============================================================================
// ROW CONVERSION
// ============================================================================

fn parse_failed(what: &str, err: impl std::fmt::Display) -> ColloquyError {
    StorageError::QueryFailed {
        reason: format!("bad {} in row: {}", what, err),
    }
    .into()
}

fn row_to_conversation(row: &Row) -> Conversation {
    Conversation {
        id: row.get("id"),
        title: row.get("title"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn row_to_message(row: &Row) -> ColloquyResult<CollabMessage> {
    let role: String = row.get("role");
    let agent_role: Option<String> = row.get("agent_role");
    Ok(CollabMessage {
        id: row.get("id"),
        conversation_id: row.get("conversation_id"),
        role: MessageRole::from_db_str(&role).map_err(|e| parse_failed("role", e))?,
        agent_role: agent_role
            .map(|r| AgentRole::from_db_str(&r))
            .transpose()
            .map_err(|e| parse_failed("agent_role", e))?,
        content: row.get("content"),
        created_at: row.get("created_at"),
    })
}

fn failure_from_columns(
    message: Option<String>,
    error_type: Option<String>,
    provider: Option<String>,
) -> Option<StepFailure> {
    message.map(|message| StepFailure {
        message,
        error_type: error_type.unwrap_or_default(),
        provider: provider.unwrap_or_default(),
    })
}

fn row_to_run(row: &Row) -> ColloquyResult<CollabRun> {
    let mode: String = row.get("mode");
    let status: String = row.get("status");
    Ok(CollabRun {
        id: row.get("id"),
        conversation_id: row.get("conversation_id"),
        trigger_message_id: row.get("trigger_message_id"),
        mode: PipelineMode::from_db_str(&mode).map_err(|e| parse_failed("mode", e))?,
        status: RunStatus::from_db_str(&status).map_err(|e| parse_failed("status", e))?,
        final_output: row.get("final_output"),
        error: failure_from_columns(
            row.get("error_message"),
            row.get("error_type"),
            row.get("error_provider"),
        ),
        total_time_ms: row.get("total_time_ms"),
        created_at: row.get("created_at"),
        finished_at: row.get("finished_at"),
    })
}

fn row_to_step(row: &Row) -> ColloquyResult<CollabStep> {
    let role: String = row.get("role");
    let status: String = row.get("status");
    Ok(CollabStep {
        id: row.get("id"),
        run_id: row.get("run_id"),
        position: row.get("step_index"),
        role: AgentRole::from_db_str(&role).map_err(|e| parse_failed("role", e))?,
        provider: row.get("provider"),
        model: row.get("model"),
        status: StepStatus::from_db_str(&status).map_err(|e| parse_failed("status", e))?,
        content: row.get("content"),
        error: failure_from_columns(
            row.get("error_message"),
            row.get("error_type"),
            row.get("error_provider"),
        ),
        latency_ms: row.get("latency_ms"),
        message_id: row.get("message_id"),
        created_at: row.get("created_at"),
    })
}

// ============================================================================
// STORAGE IMPLEMENTATION
// ============================================================================

/// PostgreSQL-backed [`Storage`].
#[derive(Clone)]
pub struct PgStorage {
    pool: Pool,
}

impl PgStorage {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    pub fn from_config(config: &PgConfig) -> ColloquyResult<Self> {
        Ok(Self::new(config.create_pool()?))
    }

    /// Apply the schema (idempotent; every statement is `IF NOT EXISTS`).
    pub async fn apply_schema(&self) -> ColloquyResult<()> {
        let conn = self.conn().await?;
        conn.batch_execute(SCHEMA_SQL).await.map_err(query_failed)?;
        tracing::info!("schema applied");
        Ok(())
    }

    async fn conn(&self) -> ColloquyResult<deadpool_postgres::Object> {
        self.pool.get().await.map_err(|e| {
            StorageError::ConnectionFailed {
                reason: e.to_string(),
            }
            .into()
        })
    }
}

fn query_failed(err: tokio_postgres::Error) -> ColloquyError {
    StorageError::QueryFailed {
        reason: err.to_string(),
    }
    .into()
}

#[async_trait]
impl Storage for PgStorage {
    async fn create_conversation(&self, conversation: &Conversation) -> ColloquyResult<()> {
        let conn = self.conn().await?;
        conn.execute(
            "INSERT INTO conversations (id, title, created_at, updated_at)
             VALUES ($1, $2, $3, $4)",
            &[
                &conversation.id,
                &conversation.title,
                &conversation.created_at,
                &conversation.updated_at,
            ],
        )
        .await
        .map_err(query_failed)?;
        Ok(())
    }

    async fn get_conversation(&self, id: EntityId) -> ColloquyResult<Conversation> {
        let conn = self.conn().await?;
        let row = conn
            .query_opt("SELECT * FROM conversations WHERE id = $1", &[&id])
            .await
            .map_err(query_failed)?
            .ok_or(StorageError::ConversationNotFound { id })?;
        Ok(row_to_conversation(&row))
    }

    async fn touch_conversation(&self, id: EntityId) -> ColloquyResult<()> {
        let conn = self.conn().await?;
        let updated = conn
            .execute(
                "UPDATE conversations SET updated_at = NOW() WHERE id = $1",
                &[&id],
            )
            .await
            .map_err(query_failed)?;
        if updated == 0 {
            return Err(StorageError::ConversationNotFound { id }.into());
        }
        Ok(())
    }

    async fn delete_conversation(&self, id: EntityId) -> ColloquyResult<()> {
        let conn = self.conn().await?;
        let deleted = conn
            .execute("DELETE FROM conversations WHERE id = $1", &[&id])
            .await
            .map_err(query_failed)?;
        if deleted == 0 {
            return Err(StorageError::ConversationNotFound { id }.into());
        }
        Ok(())
    }

    async fn insert_message(&self, message: &CollabMessage) -> ColloquyResult<()> {
        let conn = self.conn().await?;
        conn.execute(
            "INSERT INTO collab_messages
                 (id, conversation_id, role, agent_role, content, created_at)
             VALUES ($1, $2, $3, $4, $5, $6)",
            &[
                &message.id,
                &message.conversation_id,
                &message.role.as_db_str(),
                &message.agent_role.map(|r| r.as_db_str()),
                &message.content,
                &message.created_at,
            ],
        )
        .await
        .map_err(query_failed)?;
        Ok(())
    }

    async fn get_message(&self, id: EntityId) -> ColloquyResult<CollabMessage> {
        let conn = self.conn().await?;
        let row = conn
            .query_opt("SELECT * FROM collab_messages WHERE id = $1", &[&id])
            .await
            .map_err(query_failed)?
            .ok_or(StorageError::MessageNotFound { id })?;
        row_to_message(&row)
    }

    async fn list_messages(
        &self,
        conversation_id: EntityId,
    ) -> ColloquyResult<Vec<CollabMessage>> {
        let conn = self.conn().await?;
        let rows = conn
            .query(
                "SELECT * FROM collab_messages
                 WHERE conversation_id = $1
                 ORDER BY created_at, id",
                &[&conversation_id],
            )
            .await
            .map_err(query_failed)?;
        rows.iter().map(row_to_message).collect()
    }

    async fn insert_run(&self, run: &CollabRun) -> ColloquyResult<()> {
        let conn = self.conn().await?;
        conn.execute(
            "INSERT INTO collab_runs
                 (id, conversation_id, trigger_message_id, mode, status, final_output,
                  error_message, error_type, error_provider, total_time_ms,
                  created_at, finished_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
            &[
                &run.id,
                &run.conversation_id,
                &run.trigger_message_id,
                &run.mode.as_db_str(),
                &run.status.as_db_str(),
                &run.final_output,
                &run.error.as_ref().map(|e| e.message.clone()),
                &run.error.as_ref().map(|e| e.error_type.clone()),
                &run.error.as_ref().map(|e| e.provider.clone()),
                &run.total_time_ms,
                &run.created_at,
                &run.finished_at,
            ],
        )
        .await
        .map_err(query_failed)?;
        Ok(())
    }

    async fn get_run(&self, id: EntityId) -> ColloquyResult<CollabRun> {
        let conn = self.conn().await?;
        let row = conn
            .query_opt("SELECT * FROM collab_runs WHERE id = $1", &[&id])
            .await
            .map_err(query_failed)?
            .ok_or(StorageError::RunNotFound { id })?;
        row_to_run(&row)
    }

    async fn update_run(&self, run: &CollabRun) -> ColloquyResult<()> {
        let existing = self.get_run(run.id).await?;
        if existing.status != run.status && !existing.status.can_transition_to(run.status) {
            return Err(StorageError::InsertFailed {
                entity: "collab_run".to_string(),
                reason: format!(
                    "illegal status transition {} -> {}",
                    existing.status, run.status
                ),
            }
            .into());
        }

        let conn = self.conn().await?;
        conn.execute(
            "UPDATE collab_runs SET
                 status = $2, final_output = $3, error_message = $4, error_type = $5,
                 error_provider = $6, total_time_ms = $7, finished_at = $8
             WHERE id = $1",
            &[
                &run.id,
                &run.status.as_db_str(),
                &run.final_output,
                &run.error.as_ref().map(|e| e.message.clone()),
                &run.error.as_ref().map(|e| e.error_type.clone()),
                &run.error.as_ref().map(|e| e.provider.clone()),
                &run.total_time_ms,
                &run.finished_at,
            ],
        )
        .await
        .map_err(query_failed)?;
        Ok(())
    }

    async fn list_runs(&self, conversation_id: EntityId) -> ColloquyResult<Vec<CollabRun>> {
        let conn = self.conn().await?;
        let rows = conn
            .query(
                "SELECT * FROM collab_runs
                 WHERE conversation_id = $1
                 ORDER BY created_at, id",
                &[&conversation_id],
            )
            .await
            .map_err(query_failed)?;
        rows.iter().map(row_to_run).collect()
    }

    async fn insert_step(&self, step: &CollabStep) -> ColloquyResult<()> {
        let conn = self.conn().await?;
        conn.execute(
            "INSERT INTO collab_steps
                 (id, run_id, step_index, role, provider, model, status, content,
                  error_message, error_type, error_provider, latency_ms, message_id,
                  created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)",
            &[
                &step.id,
                &step.run_id,
                &step.position,
                &step.role.as_db_str(),
                &step.provider,
                &step.model,
                &step.status.as_db_str(),
                &step.content,
                &step.error.as_ref().map(|e| e.message.clone()),
                &step.error.as_ref().map(|e| e.error_type.clone()),
                &step.error.as_ref().map(|e| e.provider.clone()),
                &step.latency_ms,
                &step.message_id,
                &step.created_at,
            ],
        )
        .await
        .map_err(query_failed)?;
        Ok(())
    }

    async fn update_step(&self, step: &CollabStep) -> ColloquyResult<()> {
        let conn = self.conn().await?;
        let existing = conn
            .query_opt("SELECT status FROM collab_steps WHERE id = $1", &[&step.id])
            .await
            .map_err(query_failed)?
            .ok_or(StorageError::StepNotFound { id: step.id })?;

        let status: String = existing.get("status");
        let status =
            StepStatus::from_db_str(&status).map_err(|e| parse_failed("status", e))?;
        if status != step.status && !status.can_transition_to(step.status) {
            return Err(StorageError::InsertFailed {
                entity: "collab_step".to_string(),
                reason: format!("illegal status transition {} -> {}", status, step.status),
            }
            .into());
        }

        conn.execute(
            "UPDATE collab_steps SET
                 status = $2, content = $3, error_message = $4, error_type = $5,
                 error_provider = $6, latency_ms = $7, message_id = $8
             WHERE id = $1",
            &[
                &step.id,
                &step.status.as_db_str(),
                &step.content,
                &step.error.as_ref().map(|e| e.message.clone()),
                &step.error.as_ref().map(|e| e.error_type.clone()),
                &step.error.as_ref().map(|e| e.provider.clone()),
                &step.latency_ms,
                &step.message_id,
            ],
        )
        .await
        .map_err(query_failed)?;
        Ok(())
    }

    async fn list_steps(&self, run_id: EntityId) -> ColloquyResult<Vec<CollabStep>> {
        let conn = self.conn().await?;
        let rows = conn
            .query(
                "SELECT * FROM collab_steps WHERE run_id = $1 ORDER BY step_index",
                &[&run_id],
            )
            .await
            .map_err(query_failed)?;
        rows.iter().map(row_to_step).collect()
    }

    async fn list_agent_steps(
        &self,
        conversation_id: EntityId,
    ) -> ColloquyResult<Vec<CollabStep>> {
        let conn = self.conn().await?;
        let rows = conn
            .query(
                "SELECT s.* FROM collab_steps s
                 JOIN collab_runs r ON r.id = s.run_id
                 WHERE r.conversation_id = $1
                 ORDER BY r.created_at, r.id, s.step_index",
                &[&conversation_id],
            )
            .await
            .map_err(query_failed)?;
        rows.iter().map(row_to_step).collect()
    }

    async fn get_turn(&self, message_id: EntityId) -> ColloquyResult<TurnRecord> {
        let message = self.get_message(message_id).await?;

        let conn = self.conn().await?;
        let run = conn
            .query_opt(
                "SELECT * FROM collab_runs WHERE trigger_message_id = $1
                 ORDER BY created_at DESC LIMIT 1",
                &[&message_id],
            )
            .await
            .map_err(query_failed)?
            .map(|row| row_to_run(&row))
            .transpose()?;

        let steps = match &run {
            Some(run) => self.list_steps(run.id).await?,
            None => Vec::new(),
        };
        Ok(TurnRecord {
            message,
            run,
            steps,
        })
    }

    async fn thread_stats(&self, conversation_id: EntityId) -> ColloquyResult<ThreadStats> {
        self.get_conversation(conversation_id).await?;

        let conn = self.conn().await?;
        let row = conn
            .query_one(
                "SELECT
                     (SELECT COUNT(*) FROM collab_messages WHERE conversation_id = $1)
                         AS message_count,
                     (SELECT COUNT(*) FROM collab_runs WHERE conversation_id = $1)
                         AS run_count,
                     (SELECT COUNT(*) FROM collab_runs
                          WHERE conversation_id = $1 AND status = 'done') AS completed_runs,
                     (SELECT COUNT(*) FROM collab_runs
                          WHERE conversation_id = $1 AND status = 'error') AS error_runs,
                     (SELECT AVG(total_time_ms) FROM collab_runs
                          WHERE conversation_id = $1 AND status = 'done') AS avg_run_time_ms,
                     (SELECT MAX(created_at) FROM collab_messages
                          WHERE conversation_id = $1) AS last_activity",
                &[&conversation_id],
            )
            .await
            .map_err(query_failed)?;

        let last_activity: Option<Timestamp> = row.get("last_activity");
        Ok(ThreadStats {
            conversation_id,
            message_count: row.get("message_count"),
            run_count: row.get("run_count"),
            completed_runs: row.get("completed_runs"),
            error_runs: row.get("error_runs"),
            avg_run_time_ms: row.get("avg_run_time_ms"),
            last_activity,
        })
    }

    async fn global_stats(&self) -> ColloquyResult<GlobalStats> {
        let conn = self.conn().await?;
        let row = conn
            .query_one(
                "SELECT
                     (SELECT COUNT(*) FROM conversations) AS conversations,
                     (SELECT COUNT(*) FROM collab_messages) AS messages,
                     (SELECT COUNT(*) FROM collab_runs) AS runs,
                     (SELECT COUNT(*) FROM collab_steps) AS steps,
                     (SELECT COUNT(*) FROM collab_runs WHERE status = 'done')
                         AS completed_runs,
                     (SELECT COUNT(*) FROM collab_runs WHERE status = 'error')
                         AS error_runs",
                &[],
            )
            .await
            .map_err(query_failed)?;

        Ok(GlobalStats {
            conversations: row.get("conversations"),
            messages: row.get("messages"),
            runs: row.get("runs"),
            steps: row.get("steps"),
            completed_runs: row.get("completed_runs"),
            error_runs: row.get("error_runs"),
        })
    }
}

impl std::fmt::Debug for PgStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = self.pool.status();
        f.debug_struct("PgStorage")
            .field("pool_size", &status.size)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_covers_all_tables() {
        for table in [
            "conversations",
            "collab_messages",
            "collab_runs",
            "collab_steps",
        ] {
            assert!(SCHEMA_SQL.contains(table), "schema missing {}", table);
        }
        assert!(SCHEMA_SQL.contains("ON DELETE CASCADE"));
    }

    #[test]
    fn test_default_config() {
        let config = PgConfig::default();
        assert_eq!(config.port, 5432);
        assert_eq!(config.dbname, "colloquy");
    }

    #[test]
    fn test_failure_from_columns() {
        assert!(failure_from_columns(None, None, None).is_none());
        let failure = failure_from_columns(
            Some("boom".to_string()),
            Some("request_failed".to_string()),
            Some("openai".to_string()),
        )
        .expect("failure");
        assert_eq!(failure.message, "boom");
        assert_eq!(failure.provider, "openai");
    }
}
