//! Drainable log queue.
//!
//! The library never prints; every noteworthy event becomes a [`LogRecord`]
//! in a FIFO the host drains after each tick. Each appended record is also
//! emitted as a `tracing` event at the matching level, so hosts that run a
//! subscriber see library activity without draining the queue themselves.

use std::time::SystemTime;

/// Severity / direction of a log record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogKind {
    Debug,
    Info,
    Warning,
    Error,
    /// Inbound wire traffic.
    Recv,
    /// Outbound wire traffic.
    Send,
}

impl LogKind {
    /// Short display label, e.g. for a console monitor.
    pub fn label(self) -> &'static str {
        match self {
            LogKind::Debug => "Debug",
            LogKind::Info => "Info",
            LogKind::Warning => "Warning",
            LogKind::Error => "Error",
            LogKind::Recv => "Recv",
            LogKind::Send => "Send",
        }
    }
}

/// One log entry.
#[derive(Debug, Clone)]
pub struct LogRecord {
    pub kind: LogKind,
    pub timestamp: SystemTime,
    pub text: String,
}

/// FIFO of log records owned by the facade.
#[derive(Debug, Default)]
pub struct Log {
    queue: Vec<LogRecord>,
}

impl Log {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record and mirror it to `tracing`.
    pub fn add(&mut self, kind: LogKind, text: impl Into<String>) {
        let text = text.into();
        match kind {
            LogKind::Debug | LogKind::Recv | LogKind::Send => tracing::debug!("{text}"),
            LogKind::Info => tracing::info!("{text}"),
            LogKind::Warning => tracing::warn!("{text}"),
            LogKind::Error => tracing::error!("{text}"),
        }
        self.queue.push(LogRecord {
            kind,
            timestamp: SystemTime::now(),
            text,
        });
    }

    pub fn debug(&mut self, text: impl Into<String>) {
        self.add(LogKind::Debug, text);
    }

    pub fn info(&mut self, text: impl Into<String>) {
        self.add(LogKind::Info, text);
    }

    pub fn warning(&mut self, text: impl Into<String>) {
        self.add(LogKind::Warning, text);
    }

    pub fn error(&mut self, text: impl Into<String>) {
        self.add(LogKind::Error, text);
    }

    /// Number of queued records.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Take every queued record, leaving the queue empty.
    pub fn drain(&mut self) -> Vec<LogRecord> {
        std::mem::take(&mut self.queue)
    }

    /// Discard all queued records.
    pub fn clear(&mut self) {
        self.queue.clear();
    }
}
