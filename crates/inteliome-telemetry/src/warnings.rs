//! Persistence of warn+ events, so failed turns can be inspected after the
//! session has ended.

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::field::{Field, Visit};
use tracing::span;
use tracing_subscriber::layer::Context;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

/// A persisted warning or error.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WarningRecord {
    pub id: i64,
    pub timestamp: String,
    pub level: String,
    pub target: String,
    pub message: String,
    pub fields: Option<String>,
    pub thread_id: Option<String>,
    pub user_id: Option<String>,
}

impl std::fmt::Display for WarningRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {:<5}", self.timestamp, self.level)?;
        if let Some(thread_id) = &self.thread_id {
            write!(f, " [{thread_id}]")?;
        }
        write!(f, " {}: {}", self.target, self.message)
    }
}

#[derive(Clone, Debug, Default)]
pub struct WarningQuery {
    pub level: Option<String>,
    pub thread_id: Option<String>,
    pub limit: Option<u32>,
}

pub struct WarningSink {
    conn: Mutex<Connection>,
}

impl WarningSink {
    pub fn open(db_path: &Path) -> Result<Self, rusqlite::Error> {
        if let Some(parent) = db_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        Self::init(Connection::open(db_path)?)
    }

    pub fn in_memory() -> Result<Self, rusqlite::Error> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, rusqlite::Error> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS warnings (
                 id INTEGER PRIMARY KEY AUTOINCREMENT,
                 timestamp TEXT NOT NULL,
                 level TEXT NOT NULL,
                 target TEXT NOT NULL,
                 message TEXT NOT NULL,
                 fields TEXT,
                 thread_id TEXT,
                 user_id TEXT
             );
             CREATE INDEX IF NOT EXISTS idx_warnings_thread ON warnings(thread_id);",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn insert(&self, row: &NewWarning) {
        let conn = self.conn.lock();
        let _ = conn.execute(
            "INSERT INTO warnings (timestamp, level, target, message, fields, thread_id, user_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            rusqlite::params![
                row.timestamp,
                row.level,
                row.target,
                row.message,
                row.fields,
                row.thread_id,
                row.user_id,
            ],
        );
    }

    /// Newest first.
    pub fn query(&self, q: &WarningQuery) -> Result<Vec<WarningRecord>, rusqlite::Error> {
        let conn = self.conn.lock();
        let mut sql = String::from(
            "SELECT id, timestamp, level, target, message, fields, thread_id, user_id
             FROM warnings WHERE 1=1",
        );
        let mut params: Vec<String> = Vec::new();
        if let Some(level) = &q.level {
            params.push(level.to_uppercase());
            sql.push_str(&format!(" AND level = ?{}", params.len()));
        }
        if let Some(thread_id) = &q.thread_id {
            params.push(thread_id.clone());
            sql.push_str(&format!(" AND thread_id = ?{}", params.len()));
        }
        sql.push_str(&format!(" ORDER BY id DESC LIMIT {}", q.limit.unwrap_or(100)));

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(params.iter()), |row| {
            Ok(WarningRecord {
                id: row.get(0)?,
                timestamp: row.get(1)?,
                level: row.get(2)?,
                target: row.get(3)?,
                message: row.get(4)?,
                fields: row.get(5)?,
                thread_id: row.get(6)?,
                user_id: row.get(7)?,
            })
        })?;
        rows.collect()
    }

    pub fn count(&self) -> Result<i64, rusqlite::Error> {
        self.conn
            .lock()
            .query_row("SELECT COUNT(*) FROM warnings", [], |row| row.get(0))
    }
}

struct NewWarning {
    timestamp: String,
    level: String,
    target: String,
    message: String,
    fields: Option<String>,
    thread_id: Option<String>,
    user_id: Option<String>,
}

/// `tracing` layer writing warn+ events into a [`WarningSink`].
pub struct WarningLayer {
    sink: Arc<WarningSink>,
}

impl WarningLayer {
    pub fn new(sink: Arc<WarningSink>) -> Self {
        Self { sink }
    }
}

#[derive(Default)]
struct Fields {
    message: Option<String>,
    thread_id: Option<String>,
    user_id: Option<String>,
    rest: Map<String, Value>,
}

impl Fields {
    fn put(&mut self, name: &str, value: Value) {
        let as_text = || match &value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        match name {
            "message" => self.message = Some(as_text()),
            "thread_id" => self.thread_id = Some(as_text()),
            "user_id" => self.user_id = Some(as_text()),
            _ => {
                let _ = self.rest.insert(name.to_string(), value);
            }
        }
    }
}

impl Visit for Fields {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        let text = format!("{value:?}");
        self.put(field.name(), Value::String(text.trim_matches('"').to_string()));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.put(field.name(), Value::String(value.to_string()));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.put(field.name(), Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.put(field.name(), Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.put(field.name(), Value::Bool(value));
    }
}

/// Thread/user ids recorded on a span, inherited by events inside it.
struct Scope {
    thread_id: Option<String>,
    user_id: Option<String>,
}

impl<S> Layer<S> for WarningLayer
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &span::Attributes<'_>, id: &span::Id, ctx: Context<'_, S>) {
        let mut fields = Fields::default();
        attrs.record(&mut fields);
        if fields.thread_id.is_none() && fields.user_id.is_none() {
            return;
        }
        if let Some(span) = ctx.span(id) {
            span.extensions_mut().insert(Scope {
                thread_id: fields.thread_id,
                user_id: fields.user_id,
            });
        }
    }

    fn on_event(&self, event: &tracing::Event<'_>, ctx: Context<'_, S>) {
        let level = *event.metadata().level();
        if level > tracing::Level::WARN {
            return;
        }

        let mut fields = Fields::default();
        event.record(&mut fields);

        if let Some(scope) = ctx.event_scope(event) {
            for span in scope {
                if let Some(ids) = span.extensions().get::<Scope>() {
                    if fields.thread_id.is_none() {
                        fields.thread_id.clone_from(&ids.thread_id);
                    }
                    if fields.user_id.is_none() {
                        fields.user_id.clone_from(&ids.user_id);
                    }
                }
            }
        }

        let extra = (!fields.rest.is_empty())
            .then(|| serde_json::to_string(&fields.rest).ok())
            .flatten();

        self.sink.insert(&NewWarning {
            timestamp: Utc::now().to_rfc3339(),
            level: level.to_string().to_uppercase(),
            target: event.metadata().target().to_string(),
            message: fields.message.unwrap_or_default(),
            fields: extra,
            thread_id: fields.thread_id,
            user_id: fields.user_id,
        });
    }
}
