#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("corrupt row in {table}.{column}: {detail}")]
    CorruptRow {
        table: &'static str,
        column: &'static str,
        detail: String,
    },

    /// Namespace is empty or has a blank segment (usually a missing user id).
    #[error("invalid namespace {0:?}")]
    InvalidNamespace(Vec<String>),

    /// A thread id was reused by a different user.
    #[error("thread {thread_id} belongs to user {owner}, not {requested}")]
    ThreadOwnerMismatch {
        thread_id: String,
        owner: String,
        requested: String,
    },
}

impl StoreError {
    /// Errors caused by how the store was called rather than by the store.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::InvalidNamespace(_) | Self::ThreadOwnerMismatch { .. }
        )
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}
