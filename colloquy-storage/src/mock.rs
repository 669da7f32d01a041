//! In-memory storage for tests and keyless local runs.

use crate::{GlobalStats, Storage, ThreadStats, TurnRecord};
use async_trait::async_trait;
use colloquy_core::{
    CollabMessage, CollabRun, CollabStep, ColloquyResult, Conversation, EntityId, RunStatus,
    StorageError,
};
use std::collections::HashMap;
use std::sync::RwLock;

#[derive(Debug, Default)]
struct MockTables {
    conversations: HashMap<EntityId, Conversation>,
    messages: HashMap<EntityId, CollabMessage>,
    runs: HashMap<EntityId, CollabRun>,
    steps: HashMap<EntityId, CollabStep>,
}

/// HashMap-backed [`Storage`] with the same state-machine enforcement and
/// cascade semantics as the PostgreSQL implementation.
#[derive(Debug, Default)]
pub struct MockStorage {
    tables: RwLock<MockTables>,
}

impl MockStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, MockTables>, StorageError> {
        self.tables.read().map_err(|_| StorageError::LockPoisoned)
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, MockTables>, StorageError> {
        self.tables.write().map_err(|_| StorageError::LockPoisoned)
    }
}

#[async_trait]
impl Storage for MockStorage {
    async fn create_conversation(&self, conversation: &Conversation) -> ColloquyResult<()> {
        let mut tables = self.write()?;
        tables
            .conversations
            .insert(conversation.id, conversation.clone());
        Ok(())
    }

    async fn get_conversation(&self, id: EntityId) -> ColloquyResult<Conversation> {
        let tables = self.read()?;
        tables
            .conversations
            .get(&id)
            .cloned()
            .ok_or_else(|| StorageError::ConversationNotFound { id }.into())
    }

    async fn touch_conversation(&self, id: EntityId) -> ColloquyResult<()> {
        let mut tables = self.write()?;
        let conversation = tables
            .conversations
            .get_mut(&id)
            .ok_or(StorageError::ConversationNotFound { id })?;
        conversation.updated_at = chrono::Utc::now();
        Ok(())
    }

    async fn delete_conversation(&self, id: EntityId) -> ColloquyResult<()> {
        let mut tables = self.write()?;
        if tables.conversations.remove(&id).is_none() {
            return Err(StorageError::ConversationNotFound { id }.into());
        }

        let run_ids: Vec<EntityId> = tables
            .runs
            .values()
            .filter(|r| r.conversation_id == id)
            .map(|r| r.id)
            .collect();
        tables.steps.retain(|_, s| !run_ids.contains(&s.run_id));
        tables.runs.retain(|_, r| r.conversation_id != id);
        tables.messages.retain(|_, m| m.conversation_id != id);
        Ok(())
    }

    async fn insert_message(&self, message: &CollabMessage) -> ColloquyResult<()> {
        let mut tables = self.write()?;
        if !tables.conversations.contains_key(&message.conversation_id) {
            return Err(StorageError::ConversationNotFound {
                id: message.conversation_id,
            }
            .into());
        }
        tables.messages.insert(message.id, message.clone());
        Ok(())
    }

    async fn get_message(&self, id: EntityId) -> ColloquyResult<CollabMessage> {
        let tables = self.read()?;
        tables
            .messages
            .get(&id)
            .cloned()
            .ok_or_else(|| StorageError::MessageNotFound { id }.into())
    }

    async fn list_messages(
        &self,
        conversation_id: EntityId,
    ) -> ColloquyResult<Vec<CollabMessage>> {
        let tables = self.read()?;
        let mut messages: Vec<CollabMessage> = tables
            .messages
            .values()
            .filter(|m| m.conversation_id == conversation_id)
            .cloned()
            .collect();
        messages.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(messages)
    }

    async fn insert_run(&self, run: &CollabRun) -> ColloquyResult<()> {
        let mut tables = self.write()?;
        if !tables.conversations.contains_key(&run.conversation_id) {
            return Err(StorageError::ConversationNotFound {
                id: run.conversation_id,
            }
            .into());
        }
        tables.runs.insert(run.id, run.clone());
        Ok(())
    }

    async fn get_run(&self, id: EntityId) -> ColloquyResult<CollabRun> {
        let tables = self.read()?;
        tables
            .runs
            .get(&id)
            .cloned()
            .ok_or_else(|| StorageError::RunNotFound { id }.into())
    }

    async fn update_run(&self, run: &CollabRun) -> ColloquyResult<()> {
        let mut tables = self.write()?;
        let existing = tables
            .runs
            .get(&run.id)
            .ok_or(StorageError::RunNotFound { id: run.id })?;

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
        tables.runs.insert(run.id, run.clone());
        Ok(())
    }

    async fn list_runs(&self, conversation_id: EntityId) -> ColloquyResult<Vec<CollabRun>> {
        let tables = self.read()?;
        let mut runs: Vec<CollabRun> = tables
            .runs
            .values()
            .filter(|r| r.conversation_id == conversation_id)
            .cloned()
            .collect();
        runs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(runs)
    }

    async fn insert_step(&self, step: &CollabStep) -> ColloquyResult<()> {
        let mut tables = self.write()?;
        if !tables.runs.contains_key(&step.run_id) {
            return Err(StorageError::RunNotFound { id: step.run_id }.into());
        }
        tables.steps.insert(step.id, step.clone());
        Ok(())
    }

    async fn update_step(&self, step: &CollabStep) -> ColloquyResult<()> {
        let mut tables = self.write()?;
        let existing = tables
            .steps
            .get(&step.id)
            .ok_or(StorageError::StepNotFound { id: step.id })?;

        if existing.status != step.status && !existing.status.can_transition_to(step.status) {
            return Err(StorageError::InsertFailed {
                entity: "collab_step".to_string(),
                reason: format!(
                    "illegal status transition {} -> {}",
                    existing.status, step.status
                ),
            }
            .into());
        }
        tables.steps.insert(step.id, step.clone());
        Ok(())
    }

    async fn list_steps(&self, run_id: EntityId) -> ColloquyResult<Vec<CollabStep>> {
        let tables = self.read()?;
        let mut steps: Vec<CollabStep> = tables
            .steps
            .values()
            .filter(|s| s.run_id == run_id)
            .cloned()
            .collect();
        steps.sort_by_key(|s| s.position);
        Ok(steps)
    }

    async fn list_agent_steps(
        &self,
        conversation_id: EntityId,
    ) -> ColloquyResult<Vec<CollabStep>> {
        let runs = self.list_runs(conversation_id).await?;
        let mut steps = Vec::new();
        for run in runs {
            steps.extend(self.list_steps(run.id).await?);
        }
        Ok(steps)
    }

    async fn get_turn(&self, message_id: EntityId) -> ColloquyResult<TurnRecord> {
        let message = self.get_message(message_id).await?;
        let run = {
            let tables = self.read()?;
            tables
                .runs
                .values()
                .find(|r| r.trigger_message_id == message_id)
                .cloned()
        };
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
        // Existence check first so an unknown thread 404s.
        self.get_conversation(conversation_id).await?;
        let messages = self.list_messages(conversation_id).await?;
        let runs = self.list_runs(conversation_id).await?;

        let completed: Vec<&CollabRun> = runs
            .iter()
            .filter(|r| r.status == RunStatus::Done)
            .collect();
        let times: Vec<f64> = completed.iter().filter_map(|r| r.total_time_ms).collect();
        let avg_run_time_ms = if times.is_empty() {
            None
        } else {
            Some(times.iter().sum::<f64>() / times.len() as f64)
        };

        Ok(ThreadStats {
            conversation_id,
            message_count: messages.len() as i64,
            run_count: runs.len() as i64,
            completed_runs: completed.len() as i64,
            error_runs: runs.iter().filter(|r| r.status == RunStatus::Error).count() as i64,
            avg_run_time_ms,
            last_activity: messages.last().map(|m| m.created_at),
        })
    }

    async fn global_stats(&self) -> ColloquyResult<GlobalStats> {
        let tables = self.read()?;
        Ok(GlobalStats {
            conversations: tables.conversations.len() as i64,
            messages: tables.messages.len() as i64,
            runs: tables.runs.len() as i64,
            steps: tables.steps.len() as i64,
            completed_runs: tables
                .runs
                .values()
                .filter(|r| r.status == RunStatus::Done)
                .count() as i64,
            error_runs: tables
                .runs
                .values()
                .filter(|r| r.status == RunStatus::Error)
                .count() as i64,
        })
    }
}
