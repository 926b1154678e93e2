//! Per-thread conversation state persisted between turns.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::OptionalExtension;
use tracing::{debug, instrument};

use inteliome_core::ids::{ThreadId, UserId};
use inteliome_core::state::ConversationState;

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers;

#[async_trait]
pub trait Checkpointer: Send + Sync {
    /// Latest saved state of `thread_id`, if any. A thread saved by another
    /// user is an error, never silently shared.
    async fn load(
        &self,
        thread_id: &ThreadId,
        user_id: &UserId,
    ) -> Result<Option<ConversationState>, StoreError>;

    /// Replace the saved state of `state.thread_id`.
    async fn save(&self, state: &ConversationState) -> Result<(), StoreError>;
}

fn ensure_owner(thread_id: &ThreadId, owner: &str, requested: &UserId) -> Result<(), StoreError> {
    if owner == requested.as_str() {
        Ok(())
    } else {
        Err(StoreError::ThreadOwnerMismatch {
            thread_id: thread_id.to_string(),
            owner: owner.to_string(),
            requested: requested.to_string(),
        })
    }
}

/// Process-lifetime checkpoints.
#[derive(Default)]
pub struct InMemoryCheckpointer {
    threads: Mutex<HashMap<ThreadId, ConversationState>>,
}

impl InMemoryCheckpointer {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Checkpointer for InMemoryCheckpointer {
    async fn load(
        &self,
        thread_id: &ThreadId,
        user_id: &UserId,
    ) -> Result<Option<ConversationState>, StoreError> {
        match self.threads.lock().get(thread_id) {
            Some(state) => {
                ensure_owner(thread_id, state.user_id.as_str(), user_id)?;
                Ok(Some(state.clone()))
            }
            None => Ok(None),
        }
    }

    async fn save(&self, state: &ConversationState) -> Result<(), StoreError> {
        let mut threads = self.threads.lock();
        if let Some(existing) = threads.get(&state.thread_id) {
            ensure_owner(&state.thread_id, existing.user_id.as_str(), &state.user_id)?;
        }
        let _ = threads.insert(state.thread_id.clone(), state.clone());
        Ok(())
    }
}

/// Checkpoints stored as JSON in the `checkpoints` table.
pub struct SqliteCheckpointer {
    db: Database,
}

impl SqliteCheckpointer {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    fn owner_of(&self, thread_id: &ThreadId) -> Result<Option<String>, StoreError> {
        self.db.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT user_id FROM checkpoints WHERE thread_id = ?1",
                    [thread_id.as_str()],
                    |row| row.get(0),
                )
                .optional()?)
        })
    }
}

#[async_trait]
impl Checkpointer for SqliteCheckpointer {
    #[instrument(skip(self), fields(thread_id = %thread_id, user_id = %user_id))]
    async fn load(
        &self,
        thread_id: &ThreadId,
        user_id: &UserId,
    ) -> Result<Option<ConversationState>, StoreError> {
        let row: Option<(String, String)> = self.db.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT user_id, state FROM checkpoints WHERE thread_id = ?1",
                    [thread_id.as_str()],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?)
        })?;

        let Some((owner, raw)) = row else {
            debug!("no checkpoint");
            return Ok(None);
        };
        ensure_owner(thread_id, &owner, user_id)?;
        let state: ConversationState = row_helpers::parse_json(&raw, "checkpoints", "state")?;
        debug!(turns = state.transcript.len(), "checkpoint loaded");
        Ok(Some(state))
    }

    #[instrument(skip(self, state), fields(thread_id = %state.thread_id, user_id = %state.user_id))]
    async fn save(&self, state: &ConversationState) -> Result<(), StoreError> {
        let json = serde_json::to_string(state)?;
        let now = Utc::now().to_rfc3339();

        let written = self.db.with_conn(|conn| {
            Ok(conn.execute(
                "INSERT INTO checkpoints (thread_id, user_id, state, updated_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(thread_id) DO UPDATE
                     SET state = excluded.state, updated_at = excluded.updated_at
                     WHERE checkpoints.user_id = excluded.user_id",
                rusqlite::params![state.thread_id.as_str(), state.user_id.as_str(), json, now],
            )?)
        })?;

        if written == 0 {
            let owner = self.owner_of(&state.thread_id)?.unwrap_or_default();
            return ensure_owner(&state.thread_id, &owner, &state.user_id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inteliome_core::messages::Turn;

    fn state(thread: &str, user: &str) -> ConversationState {
        let mut s = ConversationState::new(ThreadId::from_raw(thread), UserId::from_raw(user));
        s.transcript.push(Turn::user("what is profit"));
        s.transcript.push(Turn::assistant("revenue minus cost"));
        s.running_summary = "user asked about profit".into();
        s
    }

    async fn exercise_roundtrip(cp: &dyn Checkpointer) {
        let s = state("t-1", "1");
        assert!(cp.load(&s.thread_id, &s.user_id).await.unwrap().is_none());
        cp.save(&s).await.unwrap();
        let loaded = cp.load(&s.thread_id, &s.user_id).await.unwrap().unwrap();
        assert_eq!(loaded, s);
    }

    async fn exercise_overwrite(cp: &dyn Checkpointer) {
        let mut s = state("t-1", "1");
        cp.save(&s).await.unwrap();
        s.transcript.push(Turn::user("and margin?"));
        s.running_summary = "profit, then margin".into();
        cp.save(&s).await.unwrap();
        let loaded = cp.load(&s.thread_id, &s.user_id).await.unwrap().unwrap();
        assert_eq!(loaded.transcript.len(), 3);
        assert_eq!(loaded.running_summary, "profit, then margin");
    }

    async fn exercise_owner_mismatch(cp: &dyn Checkpointer) {
        cp.save(&state("shared", "1")).await.unwrap();

        let err = cp
            .load(&ThreadId::from_raw("shared"), &UserId::from_raw("2"))
            .await
            .unwrap_err();
        assert!(err.is_configuration());

        let err = cp.save(&state("shared", "2")).await.unwrap_err();
        assert!(matches!(err, StoreError::ThreadOwnerMismatch { ref owner, .. } if owner == "1"));

        let kept = cp
            .load(&ThreadId::from_raw("shared"), &UserId::from_raw("1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(kept.user_id.as_str(), "1");
    }

    #[tokio::test]
    async fn in_memory_roundtrip() {
        exercise_roundtrip(&InMemoryCheckpointer::new()).await;
    }

    #[tokio::test]
    async fn in_memory_overwrite() {
        exercise_overwrite(&InMemoryCheckpointer::new()).await;
    }

    #[tokio::test]
    async fn in_memory_owner_mismatch() {
        exercise_owner_mismatch(&InMemoryCheckpointer::new()).await;
    }

    #[tokio::test]
    async fn sqlite_roundtrip() {
        exercise_roundtrip(&SqliteCheckpointer::new(Database::in_memory().unwrap())).await;
    }

    #[tokio::test]
    async fn sqlite_overwrite() {
        exercise_overwrite(&SqliteCheckpointer::new(Database::in_memory().unwrap())).await;
    }

    #[tokio::test]
    async fn sqlite_owner_mismatch() {
        exercise_owner_mismatch(&SqliteCheckpointer::new(Database::in_memory().unwrap())).await;
    }

    #[tokio::test]
    async fn sqlite_state_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("inteliome.db");
        let s = state("t-durable", "7");
        SqliteCheckpointer::new(Database::open(&path).unwrap())
            .save(&s)
            .await
            .unwrap();

        let reopened = SqliteCheckpointer::new(Database::open(&path).unwrap());
        let loaded = reopened.load(&s.thread_id, &s.user_id).await.unwrap().unwrap();
        assert_eq!(loaded, s);
    }
}
