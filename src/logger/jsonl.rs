//! JSONL logger: append-only line-delimited JSON for `-vv`/`-vvv` tracing.
//!
//! Each line is a self-contained JSON object, written with a single
//! `write_all` call so a reader tailing the file never sees a torn line.
//!
//! Two-level fallback: the primary path (`<data>/events.jsonl`), then
//! stderr with an `[dotk-jsonl]` prefix if the primary can't be opened or a
//! write fails. A CLI run that can't log is still a CLI run that should
//! finish its actual work.

#![allow(missing_docs)]

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::errors::{DotkError, Result};

/// Severity level for log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// Event types emitted across a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    PipelineStart,
    PipelineComplete,
    PackDiscovered,
    RuleMatched,
    OperationApplied,
    OperationSimulated,
    OperationSkipped,
    HandlerError,
    StateCleared,
}

/// One line of the event log. All fields are optional except `ts`,
/// `event`, and `severity`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEvent {
    pub ts: String,
    pub event: EventType,
    pub severity: Severity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pack: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handler: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl LogEvent {
    #[must_use]
    pub fn new(event: EventType, severity: Severity) -> Self {
        Self {
            ts: format_utc_now(),
            event,
            severity,
            pack: None,
            handler: None,
            path: None,
            message: None,
        }
    }

    #[must_use]
    pub fn pack(mut self, pack: impl Into<String>) -> Self {
        self.pack = Some(pack.into());
        self
    }

    #[must_use]
    pub fn handler(mut self, handler: impl Into<String>) -> Self {
        self.handler = Some(handler.into());
        self
    }

    #[must_use]
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    #[must_use]
    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriterState {
    Normal,
    Stderr,
    Discard,
}

/// Append-only JSONL event writer for one pipeline invocation.
pub struct JsonlWriter {
    path: PathBuf,
    file: Option<File>,
    state: WriterState,
}

impl JsonlWriter {
    /// Open `<data>/events.jsonl` for appending. Falls back to stderr if
    /// the primary path can't be opened.
    #[must_use]
    pub fn open(path: PathBuf) -> Self {
        match open_append(&path) {
            Ok(file) => Self {
                path,
                file: Some(file),
                state: WriterState::Normal,
            },
            Err(_) => {
                let _ = writeln!(
                    io::stderr(),
                    "[dotk-jsonl] could not open event log, writing to stderr"
                );
                Self {
                    path,
                    file: None,
                    state: WriterState::Stderr,
                }
            }
        }
    }

    /// Write one event as a single atomic JSONL line.
    pub fn write_event(&mut self, event: &LogEvent) {
        let line = match serde_json::to_string(event) {
            Ok(json) => format!("{json}\n"),
            Err(e) => {
                let _ = writeln!(io::stderr(), "[dotk-jsonl] serialize error: {e}");
                return;
            }
        };
        self.write_line(&line);
    }

    fn write_line(&mut self, line: &str) {
        match self.state {
            WriterState::Normal => {
                if let Some(file) = self.file.as_mut() {
                    if file.write_all(line.as_bytes()).is_err() {
                        self.degrade();
                        self.write_line(line);
                    }
                } else {
                    self.degrade();
                    self.write_line(line);
                }
            }
            WriterState::Stderr => {
                let _ = write!(io::stderr(), "[dotk-jsonl] {line}");
            }
            WriterState::Discard => {}
        }
    }

    fn degrade(&mut self) {
        self.file = None;
        self.state = match self.state {
            WriterState::Normal => WriterState::Stderr,
            WriterState::Stderr => WriterState::Discard,
            WriterState::Discard => WriterState::Discard,
        };
    }

    #[must_use]
    pub fn state(&self) -> &'static str {
        match self.state {
            WriterState::Normal => "normal",
            WriterState::Stderr => "stderr",
            WriterState::Discard => "discard",
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn open_append(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| DotkError::io(parent, source))?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| DotkError::io(path, source))
}

fn format_utc_now() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_event_produces_valid_json_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        let mut writer = JsonlWriter::open(path.clone());

        let event = LogEvent::new(EventType::PipelineStart, Severity::Info)
            .pack("vim")
            .message("starting on");
        writer.write_event(&event);

        let contents = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 1);
        let parsed: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(parsed["event"], "pipeline_start");
        assert_eq!(parsed["severity"], "info");
        assert_eq!(parsed["pack"], "vim");
    }

    #[test]
    fn multiple_events_are_separate_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        let mut writer = JsonlWriter::open(path.clone());

        for _ in 0..4 {
            writer.write_event(&LogEvent::new(EventType::OperationApplied, Severity::Info));
        }

        let contents = fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 4);
    }

    #[test]
    fn optional_fields_omitted_when_unset() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        let mut writer = JsonlWriter::open(path.clone());

        writer.write_event(&LogEvent::new(EventType::PipelineComplete, Severity::Info));

        let line = fs::read_to_string(&path).unwrap();
        assert!(!line.contains("\"pack\""));
        assert!(!line.contains("\"handler\""));
        assert!(!line.contains("\"path\""));
    }

    #[test]
    fn falls_back_to_stderr_when_primary_dir_unwritable() {
        let bad = PathBuf::from("/nonexistent_dotk_test_dir_12345/events.jsonl");
        let writer = JsonlWriter::open(bad);
        assert_eq!(writer.state(), "stderr");
    }

    #[test]
    fn state_reports_normal_when_open_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let writer = JsonlWriter::open(dir.path().join("events.jsonl"));
        assert_eq!(writer.state(), "normal");
    }
}
