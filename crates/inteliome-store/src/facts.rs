//! Long-term fact memory, scoped by a hierarchical namespace.
//!
//! Every accepted user turn is written once under `["memories", user_id]`
//! with a fresh key; reads return every value in the namespace in insertion
//! order. Nothing is ever updated or deleted by the pipeline.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use inteliome_core::ids::{FactKey, UserId};

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers;

/// Root segment for per-user memories.
pub const MEMORIES: &str = "memories";

/// Hierarchical key prefix, e.g. `["memories", "42"]`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Namespace(Vec<String>);

impl Namespace {
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    /// `["memories", user_id]`.
    pub fn memories(user_id: &UserId) -> Self {
        Self::new([MEMORIES, user_id.as_str()])
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// A namespace is usable when it has at least one segment and none of
    /// them is blank.
    pub fn validate(&self) -> Result<(), StoreError> {
        if self.0.is_empty() || self.0.iter().any(|s| s.trim().is_empty()) {
            return Err(StoreError::InvalidNamespace(self.0.clone()));
        }
        Ok(())
    }

    /// Stable text form used as the SQLite column value.
    fn storage_key(&self) -> Result<String, StoreError> {
        Ok(serde_json::to_string(&self.0)?)
    }
}

/// Stored value of one fact.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactValue {
    pub data: String,
}

impl FactValue {
    pub fn new(data: impl Into<String>) -> Self {
        Self { data: data.into() }
    }
}

/// Key/value memory keyed by namespace.
#[async_trait]
pub trait FactStore: Send + Sync {
    /// Store `value` under `key`. Writing an existing key replaces the value
    /// in place.
    async fn put(
        &self,
        namespace: &Namespace,
        key: &FactKey,
        value: &FactValue,
    ) -> Result<(), StoreError>;

    /// Every value in the namespace, oldest first.
    async fn search(&self, namespace: &Namespace) -> Result<Vec<FactValue>, StoreError>;
}

/// Process-lifetime fact store.
#[derive(Default)]
pub struct InMemoryFactStore {
    entries: Mutex<HashMap<Namespace, Vec<(FactKey, FactValue)>>>,
}

impl InMemoryFactStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self, namespace: &Namespace) -> usize {
        self.entries.lock().get(namespace).map_or(0, Vec::len)
    }

    pub fn is_empty(&self, namespace: &Namespace) -> bool {
        self.len(namespace) == 0
    }
}

#[async_trait]
impl FactStore for InMemoryFactStore {
    async fn put(
        &self,
        namespace: &Namespace,
        key: &FactKey,
        value: &FactValue,
    ) -> Result<(), StoreError> {
        namespace.validate()?;
        let mut entries = self.entries.lock();
        let bucket = entries.entry(namespace.clone()).or_default();
        match bucket.iter_mut().find(|(k, _)| k == key) {
            Some((_, existing)) => *existing = value.clone(),
            None => bucket.push((key.clone(), value.clone())),
        }
        Ok(())
    }

    async fn search(&self, namespace: &Namespace) -> Result<Vec<FactValue>, StoreError> {
        namespace.validate()?;
        Ok(self
            .entries
            .lock()
            .get(namespace)
            .map(|bucket| bucket.iter().map(|(_, v)| v.clone()).collect())
            .unwrap_or_default())
    }
}

/// Durable fact store over the shared [`Database`].
pub struct SqliteFactStore {
    db: Database,
}

impl SqliteFactStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn count(&self, namespace: &Namespace) -> Result<i64, StoreError> {
        let ns = namespace.storage_key()?;
        self.db.with_conn(|conn| {
            Ok(conn.query_row("SELECT COUNT(*) FROM facts WHERE namespace = ?1", [ns], |row| {
                row.get(0)
            })?)
        })
    }
}

#[async_trait]
impl FactStore for SqliteFactStore {
    #[instrument(skip(self, value), fields(namespace = ?namespace.segments(), key = %key))]
    async fn put(
        &self,
        namespace: &Namespace,
        key: &FactKey,
        value: &FactValue,
    ) -> Result<(), StoreError> {
        namespace.validate()?;
        let ns = namespace.storage_key()?;
        let json = serde_json::to_string(value)?;
        let now = Utc::now().to_rfc3339();

        self.db.with_conn(|conn| {
            let _ = conn.execute(
                "INSERT INTO facts (namespace, key, value, created_at) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(namespace, key) DO UPDATE SET value = excluded.value",
                rusqlite::params![ns, key.as_str(), json, now],
            )?;
            Ok(())
        })?;
        debug!("fact stored");
        Ok(())
    }

    #[instrument(skip(self), fields(namespace = ?namespace.segments()))]
    async fn search(&self, namespace: &Namespace) -> Result<Vec<FactValue>, StoreError> {
        namespace.validate()?;
        let ns = namespace.storage_key()?;

        self.db.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT value FROM facts WHERE namespace = ?1 ORDER BY seq ASC")?;
            let raw = stmt
                .query_map([ns], |row| Ok(row_helpers::get::<String>(row, 0, "facts", "value")))?
                .collect::<Result<Vec<_>, _>>()?;
            raw.into_iter()
                .map(|r| row_helpers::parse_json::<FactValue>(&r?, "facts", "value"))
                .collect()
        })
    }
}
