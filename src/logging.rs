//! Request log.
//!
//! Every entry goes through `tracing`. When a log file is configured the entry is
//! also appended to it as one JSON object per line, so a run can be inspected
//! after the fact.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub component: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub message: String,
}

impl LogEntry {
    pub fn new(level: LogLevel, component: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            component: component.into(),
            request_id: None,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn with_request_id(mut self, request_id: Option<&str>) -> Self {
        self.request_id = request_id.map(str::to_string);
        self
    }

    fn trace(&self) {
        let id = self.request_id.as_deref().unwrap_or("-");
        match self.level {
            LogLevel::Debug => {
                tracing::debug!(component = %self.component, request_id = %id, "{}", self.message);
            }
            LogLevel::Info => {
                tracing::info!(component = %self.component, request_id = %id, "{}", self.message);
            }
            LogLevel::Warn => {
                tracing::warn!(component = %self.component, request_id = %id, "{}", self.message);
            }
            LogLevel::Error => {
                tracing::error!(component = %self.component, request_id = %id, "{}", self.message);
            }
        }
    }
}

/// Cloneable handle shared by every request task. Each clone may carry its own
/// request id; the file sink is shared.
#[derive(Clone, Default)]
pub struct RequestLog {
    sink: Option<Arc<Mutex<BufWriter<File>>>>,
    request_id: Option<Arc<str>>,
}

impl RequestLog {
    /// Log through `tracing` and append JSON lines to `file_path`.
    pub fn with_file(file_path: impl AsRef<Path>) -> std::io::Result<Self> {
        let file_path = file_path.as_ref();
        if let Some(parent) = file_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(file_path)?;

        Ok(Self {
            sink: Some(Arc::new(Mutex::new(BufWriter::new(file)))),
            request_id: None,
        })
    }

    /// Log through `tracing` only.
    #[must_use]
    pub fn tracing_only() -> Self {
        Self::default()
    }

    /// A handle that tags every entry with `request_id`.
    #[must_use]
    pub fn for_request(&self, request_id: &str) -> Self {
        Self {
            sink: self.sink.clone(),
            request_id: Some(Arc::from(request_id)),
        }
    }

    #[must_use]
    pub fn request_id(&self) -> Option<&str> {
        self.request_id.as_deref()
    }

    pub fn log(&self, entry: LogEntry) {
        let entry = entry.with_request_id(self.request_id());
        entry.trace();

        if let Some(ref sink) = self.sink {
            if let (Ok(mut writer), Ok(json)) = (sink.lock(), serde_json::to_string(&entry)) {
                let _ = writeln!(writer, "{json}");
                let _ = writer.flush();
            }
        }
    }

    pub fn info(&self, component: impl Into<String>, message: impl Into<String>) {
        self.log(LogEntry::new(LogLevel::Info, component, message));
    }

    pub fn warn(&self, component: impl Into<String>, message: impl Into<String>) {
        self.log(LogEntry::new(LogLevel::Warn, component, message));
    }

    pub fn error(&self, component: impl Into<String>, message: impl Into<String>) {
        self.log(LogEntry::new(LogLevel::Error, component, message));
    }

    pub fn debug(&self, component: impl Into<String>, message: impl Into<String>) {
        self.log(LogEntry::new(LogLevel::Debug, component, message));
    }
}
