//! Pluggable event sinks for durable export.
//!
//! The store always keeps its own in-memory record; sinks are best-effort
//! exports (files, shippers). A failing sink never propagates to the caller,
//! the store counts the loss instead.

use crate::AuditEvent;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use toolgate_error::{AuditError, AuditErrorKind};

/// Destination for serialized audit events.
pub trait EventSink: Send + Sync {
    /// Write one event. Errors are recovered by the store, not the caller.
    fn write(&self, event: &AuditEvent) -> Result<(), AuditError>;
}

/// Line-delimited JSON file sink, one event per line.
pub struct JsonlSink {
    file: Mutex<std::fs::File>,
}

impl JsonlSink {
    /// Open (or create) a JSONL file for appending.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, AuditError> {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path.as_ref())
            .map_err(|e| AuditError::new(AuditErrorKind::SinkWrite(e.to_string())))?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl EventSink for JsonlSink {
    fn write(&self, event: &AuditEvent) -> Result<(), AuditError> {
        let line = serde_json::to_string(event)
            .map_err(|e| AuditError::new(AuditErrorKind::Serialization(e.to_string())))?;

        let mut file = self
            .file
            .lock()
            .map_err(|_| AuditError::new(AuditErrorKind::SinkWrite("poisoned file lock".into())))?;
        writeln!(file, "{line}")
            .map_err(|e| AuditError::new(AuditErrorKind::SinkWrite(e.to_string())))?;
        Ok(())
    }
}
