//! Startup status reporting.
//!
//! A write-only sink for human-readable startup lines (chosen backend,
//! bound ports, detected cores). Nothing reads a value back from it.

use std::sync::Mutex;

pub trait StatusSink: Send + Sync {
    fn report(&self, line: &str);
}

/// Emits each status line as an `info` event on the `status` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingStatusSink;

impl StatusSink for TracingStatusSink {
    fn report(&self, line: &str) {
        tracing::info!(target: "status", "{}", line);
    }
}

/// Keeps status lines in memory.
#[derive(Debug, Default)]
pub struct MemoryStatusSink {
    lines: Mutex<Vec<String>>,
}

impl MemoryStatusSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl StatusSink for MemoryStatusSink {
    fn report(&self, line: &str) {
        self.lines
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(line.to_string());
    }
}
