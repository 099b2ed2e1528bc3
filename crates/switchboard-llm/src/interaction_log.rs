//! Chat interaction log.
//!
//! Each handled chat appends one [`ChatRecord`] as a JSON line to
//! `<dir>/<model>-<YYYY-MM-DD>.jsonl`, so every model gets its own daily
//! file. Files past the retention window are removed when the logger starts.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{NaiveDate, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// File stem used when a model name sanitizes to nothing.
pub const UNKNOWN_MODEL: &str = "unknown_model";

// ─────────────────────────────────────────────────────────────────────────────
// Record
// ─────────────────────────────────────────────────────────────────────────────

/// One handled chat request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRecord {
    /// Unique identifier for this chat.
    pub id: String,

    /// ISO-8601 timestamp when the chat finished.
    pub timestamp: String,

    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,

    pub model: String,
    pub user_query: String,
    pub reply: String,

    /// Outcome status (`completed`, `truncated`, `model_failed`, ...).
    pub status: String,

    /// Model round-trips made.
    #[serde(default)]
    pub iterations: u32,

    /// Tool calls dispatched.
    #[serde(default)]
    pub tool_calls: usize,

    #[serde(default)]
    pub web_search: bool,
}

impl ChatRecord {
    pub fn new(
        model: impl Into<String>,
        user_query: impl Into<String>,
        reply: impl Into<String>,
        status: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now().to_rfc3339(),
            duration_ms: 0,
            model: model.into(),
            user_query: user_query.into(),
            reply: reply.into(),
            status: status.into(),
            iterations: 0,
            tool_calls: 0,
            web_search: false,
        }
    }

    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    pub fn with_counts(mut self, iterations: u32, tool_calls: usize) -> Self {
        self.iterations = iterations;
        self.tool_calls = tool_calls;
        self
    }

    pub fn with_web_search(mut self, enabled: bool) -> Self {
        self.web_search = enabled;
        self
    }
}

/// Make a model name safe to use as a file stem.
///
/// Anything outside `[A-Za-z0-9_.-]` becomes `_` and trailing dots are
/// trimmed; an empty result becomes [`UNKNOWN_MODEL`].
pub fn sanitize_model_name(model: &str) -> String {
    let replaced: String = model
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let trimmed = replaced.trim_end_matches('.');
    if trimmed.is_empty() {
        UNKNOWN_MODEL.to_string()
    } else {
        trimmed.to_string()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Logger
// ─────────────────────────────────────────────────────────────────────────────

/// Configuration for the chat interaction log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InteractionLogConfig {
    /// Whether logging is enabled.
    pub enabled: bool,

    /// Directory for JSONL files. Defaults to `<config dir>/switchboard/interactions/`.
    pub path: Option<PathBuf>,

    /// Days to retain log files.
    pub retention_days: u32,
}

impl Default for InteractionLogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: None,
            retention_days: 90,
        }
    }
}

impl InteractionLogConfig {
    /// Resolve the log directory, falling back to the platform config dir.
    pub fn resolved_path(&self) -> PathBuf {
        self.path.clone().unwrap_or_else(|| {
            dirs::config_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("switchboard")
                .join("interactions")
        })
    }
}

/// Thread-safe JSONL writer, one file per model per day.
pub struct InteractionLogger {
    config: InteractionLogConfig,
    state: Mutex<WriterState>,
}

#[derive(Default)]
struct WriterState {
    current: Option<(NaiveDate, String)>,
    writer: Option<BufWriter<File>>,
}

impl InteractionLogger {
    /// Create a new logger. Runs retention cleanup on init.
    pub fn new(config: InteractionLogConfig) -> std::io::Result<Self> {
        if config.enabled {
            let dir = config.resolved_path();
            fs::create_dir_all(&dir)?;
            cleanup_old_files(&dir, config.retention_days)?;
        }
        Ok(Self {
            config,
            state: Mutex::new(WriterState::default()),
        })
    }

    /// A logger that writes nothing.
    pub fn disabled() -> Self {
        Self {
            config: InteractionLogConfig {
                enabled: false,
                ..InteractionLogConfig::default()
            },
            state: Mutex::new(WriterState::default()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Path of the file a record for `model` would be written to today.
    pub fn file_for(&self, model: &str) -> PathBuf {
        let today = Utc::now().date_naive();
        self.config
            .resolved_path()
            .join(format!("{}-{}.jsonl", sanitize_model_name(model), today))
    }

    /// Append a record. No-op if disabled.
    pub fn log(&self, record: &ChatRecord) -> std::io::Result<()> {
        if !self.config.enabled {
            return Ok(());
        }

        let line = serde_json::to_string(record)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        let key = (Utc::now().date_naive(), sanitize_model_name(&record.model));

        let mut state = self.state.lock();

        // Reopen when the day or the model changes.
        if state.current.as_ref() != Some(&key) {
            let path = self
                .config
                .resolved_path()
                .join(format!("{}-{}.jsonl", key.1, key.0));
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            state.writer = Some(BufWriter::new(file));
            state.current = Some(key);
        }

        if let Some(ref mut w) = state.writer {
            writeln!(w, "{}", line)?;
            w.flush()?;
        }

        tracing::debug!(
            chat_id = %record.id,
            model = %record.model,
            status = %record.status,
            duration_ms = record.duration_ms,
            "chat logged"
        );

        Ok(())
    }
}

/// Delete JSONL files older than `retention_days`.
///
/// Only files named `<stem>-YYYY-MM-DD.jsonl` are considered.
fn cleanup_old_files(dir: &Path, retention_days: u32) -> std::io::Result<()> {
    let cutoff = Utc::now().date_naive() - chrono::Duration::days(retention_days as i64);

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_string_lossy();

        if let Some(file_date) = file_date(&name)
            && file_date < cutoff
        {
            fs::remove_file(entry.path())?;
            tracing::info!(file = %name, "removed expired chat log");
        }
    }

    Ok(())
}

fn file_date(name: &str) -> Option<NaiveDate> {
    let stem = name.strip_suffix(".jsonl")?;
    let split = stem.len().checked_sub(10)?;
    if !stem.is_char_boundary(split) || !stem[..split].ends_with('-') {
        return None;
    }
    NaiveDate::parse_from_str(&stem[split..], "%Y-%m-%d").ok()
}
