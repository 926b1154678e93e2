pub mod checkpoints;
pub mod database;
pub mod error;
pub mod facts;
pub mod row_helpers;
pub mod schema;

pub use checkpoints::{Checkpointer, InMemoryCheckpointer, SqliteCheckpointer};
pub use database::Database;
pub use error::StoreError;
pub use facts::{FactStore, FactValue, InMemoryFactStore, Namespace, SqliteFactStore};
