//! Response envelope and the per-query log

use crate::types::{Message, QueryOptions};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

pub const STATUS_OK: &str = "OK";

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "UPPERCASE")]
pub enum Level {
    Debug,
    Info,
    Warning,
    Error,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: Level,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    pub message: String,
}

/// What is returned to the caller, stored, or posted to a callback.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Envelope {
    pub status: String,
    pub description: String,
    #[serde(default)]
    pub logs: Vec<LogEntry>,
    #[serde(default)]
    pub message: Message,
    #[serde(default)]
    pub query_options: QueryOptions,
    /// URI or id of the stored response, once stored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl Default for Envelope {
    fn default() -> Self {
        Self {
            status: STATUS_OK.into(),
            description: String::new(),
            logs: Vec::new(),
            message: Message::default(),
            query_options: QueryOptions::default(),
            id: None,
        }
    }
}

/// Response being built by a pipeline: status, log and the message state.
///
/// Status stays `OK` until `error()` is called, after which it carries the
/// most recent error code.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Default)]
pub struct Response {
    pub envelope: Envelope,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n_results: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracker_id: Option<String>,
}

impl Response {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_message(message: Message) -> Self {
        let mut response = Self::new();
        response.envelope.message = message;
        response
    }

    pub fn status(&self) -> &str {
        &self.envelope.status
    }

    pub fn is_ok(&self) -> bool {
        self.envelope.status == STATUS_OK
    }

    pub fn message(&self) -> &Message {
        &self.envelope.message
    }

    pub fn message_mut(&mut self) -> &mut Message {
        &mut self.envelope.message
    }

    pub fn logs(&self) -> &[LogEntry] {
        &self.envelope.logs
    }

    /// Human-readable summary line.
    pub fn description(&self) -> &str {
        &self.envelope.description
    }

    pub fn set_description(&mut self, description: impl Into<String>) {
        self.envelope.description = description.into();
    }

    pub fn debug(&mut self, message: impl Into<String>) {
        let message = message.into();
        debug!(target: "arax::response", "{}", message);
        self.push(Level::Debug, None, message);
    }

    pub fn info(&mut self, message: impl Into<String>) {
        let message = message.into();
        info!(target: "arax::response", "{}", message);
        self.push(Level::Info, None, message);
    }

    pub fn warning(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!(target: "arax::response", "{}", message);
        self.push(Level::Warning, None, message);
    }

    /// Record an error and flip the status to `code`.
    pub fn error(&mut self, message: impl Into<String>, code: impl Into<String>) {
        let message = message.into();
        let code = code.into();
        error!(target: "arax::response", code = %code, "{}", message);
        self.envelope.status = code.clone();
        self.envelope.description = message.clone();
        self.push(Level::Error, Some(code), message);
    }

    /// Append another response's log and adopt its error status, if any.
    pub fn merge(&mut self, other: Response) {
        if !other.is_ok() {
            self.envelope.status = other.envelope.status;
            self.envelope.description = other.envelope.description;
        }
        self.envelope.logs.extend(other.envelope.logs);
    }

    /// Log entries at or above `level`.
    pub fn entries_at_least(&self, level: Level) -> impl Iterator<Item = &LogEntry> {
        self.envelope.logs.iter().filter(move |e| e.level >= level)
    }

    fn push(&mut self, level: Level, code: Option<String>, message: String) {
        self.envelope.logs.push(LogEntry {
            timestamp: Utc::now(),
            level,
            code,
            message,
        });
    }
}
