//! Append-only attendance log.
//!
//! A CSV file with the header `Name,DateTime` and one row per recognition:
//! `identity,YYYY-MM-DD HH:MM:SS` in local time. Rows are never rewritten
//! and repeated recognitions of the same person produce repeated rows.

use crate::error::RosterError;
use chrono::Local;
use rollcall_core::Identity;
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

pub const LOG_HEADER: [&str; 2] = ["Name", "DateTime"];
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One row of the attendance log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttendanceEvent {
    pub identity: String,
    pub timestamp: String,
}

pub struct AttendanceRecorder {
    path: PathBuf,
    append_lock: Mutex<()>,
}

impl AttendanceRecorder {
    /// Open the log at `path`, creating it with a header row if it does not exist.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, RosterError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| RosterError::storage(parent, e))?;
        }

        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                file.write_all(csv_row(&LOG_HEADER).as_bytes())
                    .map_err(|e| RosterError::storage(&path, e))?;
                tracing::info!(path = %path.display(), "created attendance log");
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                tracing::debug!(path = %path.display(), "using existing attendance log");
            }
            Err(e) => return Err(RosterError::storage(&path, e)),
        }

        Ok(Self { path, append_lock: Mutex::new(()) })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one event stamped with the current local time, returning the stamp.
    pub fn record(&self, identity: &Identity) -> Result<String, RosterError> {
        let timestamp = Local::now().format(TIMESTAMP_FORMAT).to_string();
        self.append(identity.as_str(), &timestamp)?;
        tracing::info!(identity = %identity, timestamp = %timestamp, "attendance recorded");
        Ok(timestamp)
    }

    /// Read every event back, oldest first.
    pub fn events(&self) -> Result<Vec<AttendanceEvent>, RosterError> {
        read_events(&self.path)
    }

    fn append(&self, identity: &str, timestamp: &str) -> Result<(), RosterError> {
        let row = csv_row(&[identity, timestamp]);

        let _guard = self.append_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| RosterError::storage(&self.path, e))?;
        file.write_all(row.as_bytes())
            .map_err(|e| RosterError::storage(&self.path, e))
    }
}

/// Parse an attendance log file. Malformed rows are skipped with a warning.
pub fn read_events(path: &Path) -> Result<Vec<AttendanceEvent>, RosterError> {
    let content = std::fs::read_to_string(path).map_err(|e| RosterError::storage(path, e))?;

    let mut events = Vec::new();
    for (line_no, line) in content.lines().enumerate() {
        if line.is_empty() {
            continue;
        }
        let fields = parse_csv_line(line);
        if line_no == 0 && fields == LOG_HEADER {
            continue;
        }
        match <[String; 2]>::try_from(fields) {
            Ok([identity, timestamp]) => events.push(AttendanceEvent { identity, timestamp }),
            Err(fields) => {
                tracing::warn!(line = line_no + 1, fields = fields.len(), "malformed attendance row");
            }
        }
    }
    Ok(events)
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn csv_row(fields: &[&str]) -> String {
    let mut row = fields.iter().map(|f| csv_field(f)).collect::<Vec<_>>().join(",");
    row.push('\n');
    row
}

/// Split one CSV line, honouring double-quoted fields.
fn parse_csv_line(line: &str) -> Vec<String> {
    let line = line.strip_suffix('\r').unwrap_or(line);
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut quoted = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match (c, quoted) {
            ('"', true) if chars.peek() == Some(&'"') => {
                field.push('"');
                chars.next();
            }
            ('"', true) => quoted = false,
            ('"', false) if field.is_empty() => quoted = true,
            (',', false) => fields.push(std::mem::take(&mut field)),
            _ => field.push(c),
        }
    }
    fields.push(field);
    fields
}
