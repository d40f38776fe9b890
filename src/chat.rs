//! Chat relay storage.
//!
//! The chat log is a single JSON object mapping a timestamp key
//! (`"<unix seconds>.<micros>"`) to a message. It is rewritten as a whole on
//! every accepted message.

use crate::error::Result;
use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

pub const TIME_FORMAT: &str = "%H:%M %d/%m/%Y";

/// Inbound event name on the push channel
pub const INBOUND_EVENT: &str = "my event";
/// Outbound broadcast event name
pub const OUTBOUND_EVENT: &str = "my response";

/// A chat message as shown in the history view.
///
/// The log itself keeps whatever JSON the client sent; this is a lenient
/// reading of it where non-string fields are shown as their JSON text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ChatMessage {
    pub fn new(user_name: &str, message: &str) -> Self {
        Self {
            user_name: Some(user_name.to_string()),
            message: Some(message.to_string()),
            ..Self::default()
        }
    }

    /// Read a logged entry of any shape
    pub fn from_value(value: &Value) -> Self {
        let Some(object) = value.as_object() else {
            return Self {
                message: display_text(value),
                ..Self::default()
            };
        };

        let mut extra = object.clone();
        let user_name = extra.remove("user_name");
        let message = extra.remove("message");
        let time = extra.remove("time");
        Self {
            user_name: user_name.as_ref().and_then(display_text),
            message: message.as_ref().and_then(display_text),
            time: time.as_ref().and_then(display_text),
            extra,
        }
    }
}

fn display_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// JSON truthiness: null, false, zero and empty values are false
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// Only events with a sender and a non-empty message are kept in the log
pub fn is_persistable(data: &Value) -> bool {
    data.get("user_name").is_some_and(|name| !name.is_null())
        && data.get("message").is_some_and(is_truthy)
}

/// Socket envelope: `{"event": "...", "data": {...}}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

/// Timestamp key to the event data exactly as received and stamped
pub type ChatLog = BTreeMap<String, Value>;

/// Result of relaying one inbound event
#[derive(Debug, Clone)]
pub struct RelayOutcome {
    /// Event data to broadcast, stamped with the server time when it is an object
    pub data: Value,
    /// Log key when the event was persisted
    pub persisted_key: Option<String>,
}

#[derive(Clone)]
pub struct ChatStore {
    path: PathBuf,
    write_lock: Arc<Mutex<()>>,
}

impl ChatStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the whole log. A missing file is an empty log.
    pub async fn load(&self) -> Result<ChatLog> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(text) if text.trim().is_empty() => Ok(ChatLog::new()),
            Ok(text) => Ok(serde_json::from_str(&text)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ChatLog::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Messages in the order they were received
    pub async fn messages(&self) -> Result<Vec<(String, ChatMessage)>> {
        let mut entries: Vec<(String, ChatMessage)> = self
            .load()
            .await?
            .into_iter()
            .map(|(key, value)| {
                let message = ChatMessage::from_value(&value);
                (key, message)
            })
            .collect();
        entries.sort_by(|a, b| key_value(&a.0).total_cmp(&key_value(&b.0)));
        Ok(entries)
    }

    /// Append a message under a fresh timestamp key and rewrite the file.
    pub async fn append<T: Serialize>(&self, message: &T, at: DateTime<Utc>) -> Result<String> {
        let value = serde_json::to_value(message)?;
        let _guard = self.write_lock.lock().await;

        let mut log = self.load().await?;
        let mut micros = at.timestamp_micros();
        let mut key = timestamp_key(micros);
        while log.contains_key(&key) {
            micros += 1;
            key = timestamp_key(micros);
        }
        log.insert(key.clone(), value);

        self.write(&log).await?;
        Ok(key)
    }

    async fn write(&self, log: &ChatLog) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let text = serde_json::to_string_pretty(log)?;
        let tmp_path = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, text).await?;
        tokio::fs::rename(&tmp_path, &self.path).await?;
        Ok(())
    }

    /// Stamp inbound event data with the server time and persist it when it
    /// qualifies. Persistence failures are logged, never returned: the data
    /// is broadcast either way.
    pub async fn relay(&self, mut data: Value) -> RelayOutcome {
        let now = Utc::now();
        if let Some(object) = data.as_object_mut() {
            let time = now.with_timezone(&Local).format(TIME_FORMAT).to_string();
            object.insert("time".to_string(), Value::String(time));
        }

        let persisted_key = if is_persistable(&data) {
            match self.append(&data, now).await {
                Ok(key) => {
                    crate::log_chat_operation!("persist", key.as_str());
                    Some(key)
                },
                Err(e) => {
                    crate::log_error!(e, "persisting chat message");
                    None
                },
            }
        } else {
            crate::log_chat_operation!("skip_persist");
            None
        };

        RelayOutcome {
            data,
            persisted_key,
        }
    }
}

fn timestamp_key(micros: i64) -> String {
    format!("{}.{:06}", micros.div_euclid(1_000_000), micros.rem_euclid(1_000_000))
}

fn key_value(key: &str) -> f64 {
    key.parse().unwrap_or(f64::MAX)
}
