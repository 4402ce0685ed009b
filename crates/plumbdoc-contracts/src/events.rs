use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};
use uuid::Uuid;

pub type EventPayload = Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    GenerationStarted,
    GenerationRetry,
    GenerationFailed,
    DocumentSaved,
    DocumentDeleted,
    VoucherIssued,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::GenerationStarted => "generation_started",
            EventKind::GenerationRetry => "generation_retry",
            EventKind::GenerationFailed => "generation_failed",
            EventKind::DocumentSaved => "document_saved",
            EventKind::DocumentDeleted => "document_deleted",
            EventKind::VoucherIssued => "voucher_issued",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Activity log kept next to the store as `events.jsonl`.
///
/// One compact JSON object per line: `type`, `session_id`, `ts`, then the
/// payload fields.
#[derive(Debug, Clone)]
pub struct EventWriter {
    shared: Arc<Shared>,
}

#[derive(Debug)]
struct Shared {
    path: PathBuf,
    session_id: String,
    append: Mutex<()>,
}

impl EventWriter {
    pub fn new(path: impl Into<PathBuf>, session_id: impl Into<String>) -> Self {
        Self {
            shared: Arc::new(Shared {
                path: path.into(),
                session_id: session_id.into(),
                append: Mutex::new(()),
            }),
        }
    }

    pub fn for_new_session(path: impl Into<PathBuf>) -> Self {
        Self::new(path, Uuid::new_v4().to_string())
    }

    pub fn path(&self) -> &Path {
        &self.shared.path
    }

    pub fn session_id(&self) -> &str {
        &self.shared.session_id
    }

    pub fn emit(&self, kind: EventKind, payload: EventPayload) -> anyhow::Result<Value> {
        let mut event = Map::new();
        event.insert("type".to_string(), Value::from(kind.as_str()));
        event.insert("session_id".to_string(), Value::from(self.session_id()));
        event.insert(
            "ts".to_string(),
            Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)),
        );
        event.extend(payload);
        let line = serde_json::to_string(&event)?;

        if let Some(parent) = self.shared.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let _guard = self
            .shared
            .append
            .lock()
            .map_err(|_| anyhow::anyhow!("event log lock poisoned"))?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.shared.path)?;
        writeln!(file, "{line}")?;
        Ok(Value::Object(event))
    }

    /// Best-effort variant of [`EventWriter::emit`]: a failed append is
    /// logged and otherwise ignored.
    pub fn record(&self, kind: EventKind, payload: EventPayload) {
        if let Err(err) = self.emit(kind, payload) {
            tracing::warn!(event = %kind, error = %err, "failed to append event");
        }
    }

    /// Reads every event logged so far, oldest first.
    pub fn read_all(&self) -> anyhow::Result<Vec<Value>> {
        let content = match std::fs::read_to_string(&self.shared.path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };
        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(anyhow::Error::from))
            .collect()
    }
}
