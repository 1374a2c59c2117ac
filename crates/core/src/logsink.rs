// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-job log ring and the logger handle threaded through executors
//!
//! The ring is the only per-job resource written from multiple tasks, so it
//! is synchronized internally. Every write also publishes `job:log` through
//! the event bus. The ring freezes when the job reaches a terminal state.

use crate::event::Event;
use crate::events::EventBus;
use crate::job::{LogEntry, LogLevel, LogSource};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Default bound of the per-job log ring
pub const LOG_RING_CAP: usize = 100;

/// Bounded ring of the most recent log entries for one job
#[derive(Debug)]
pub struct LogRing {
    entries: VecDeque<LogEntry>,
    cap: usize,
    frozen: bool,
}

impl LogRing {
    pub fn new(cap: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(cap.min(64)),
            cap,
            frozen: false,
        }
    }

    /// Append an entry, dropping the oldest when full. No-op once frozen.
    pub fn push(&mut self, entry: LogEntry) {
        if self.frozen {
            return;
        }
        if self.entries.len() == self.cap {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn snapshot(&self) -> Vec<LogEntry> {
        self.entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for LogRing {
    fn default() -> Self {
        Self::new(LOG_RING_CAP)
    }
}

/// Cloneable per-job logger handed to executors
///
/// Replaces the ambient console redirection of the original design: all
/// job-scoped output goes through this handle, so concurrent workers never
/// cross-contaminate.
#[derive(Clone)]
pub struct JobLogger {
    ring: Arc<Mutex<LogRing>>,
    bus: EventBus,
    tenant_id: String,
    job_id: String,
    parent_id: Option<String>,
}

impl JobLogger {
    pub fn new(
        bus: EventBus,
        tenant_id: impl Into<String>,
        job_id: impl Into<String>,
        parent_id: Option<String>,
    ) -> Self {
        Self {
            ring: Arc::new(Mutex::new(LogRing::default())),
            bus,
            tenant_id: tenant_id.into(),
            job_id: job_id.into(),
            parent_id,
        }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    fn write(&self, entry: LogEntry) {
        {
            let mut ring = self.ring.lock().unwrap_or_else(|e| e.into_inner());
            if ring.is_frozen() {
                return;
            }
            ring.push(entry.clone());
        }
        self.bus.publish(Event::JobLog {
            tenant_id: self.tenant_id.clone(),
            job_id: self.job_id.clone(),
            parent_id: self.parent_id.clone(),
            entry,
        });
    }

    pub fn log(&self, level: LogLevel, message: impl Into<String>) {
        self.write(LogEntry::new(level, message));
    }

    pub fn error(&self, message: impl Into<String>) {
        self.log(LogLevel::Error, message);
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.log(LogLevel::Warn, message);
    }

    pub fn info(&self, message: impl Into<String>) {
        self.log(LogLevel::Info, message);
    }

    pub fn debug(&self, message: impl Into<String>) {
        self.log(LogLevel::Debug, message);
    }

    /// Record a line captured from ambient output rather than the
    /// structured logger.
    pub fn captured(&self, message: impl Into<String>) {
        let mut entry = LogEntry::new(LogLevel::Info, message);
        entry.source = LogSource::Captured;
        self.write(entry);
    }

    /// Freeze the ring; further writes are dropped
    pub fn freeze(&self) {
        let mut ring = self.ring.lock().unwrap_or_else(|e| e.into_inner());
        ring.freeze();
    }

    pub fn snapshot(&self) -> Vec<LogEntry> {
        self.ring
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{BusSubscription, EventPattern};

    fn logger(bus: &EventBus) -> JobLogger {
        JobLogger::new(bus.clone(), "t1", "j1", None)
    }

    #[test]
    fn ring_drops_oldest_when_full() {
        let mut ring = LogRing::new(3);
        for i in 0..5 {
            ring.push(LogEntry::new(LogLevel::Info, format!("line {}", i)));
        }
        let snapshot = ring.snapshot();
        assert_eq!(snapshot.len(), 3);
        assert_eq!(snapshot[0].message, "line 2");
        assert_eq!(snapshot[2].message, "line 4");
    }

    #[test]
    fn frozen_ring_ignores_writes() {
        let mut ring = LogRing::new(3);
        ring.push(LogEntry::new(LogLevel::Info, "kept"));
        ring.freeze();
        ring.push(LogEntry::new(LogLevel::Info, "dropped"));
        assert_eq!(ring.len(), 1);
    }

    #[tokio::test]
    async fn writes_publish_job_log_events() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe(BusSubscription::new(
            "tail",
            vec![EventPattern::new("job:log")],
        ));

        let logger = logger(&bus);
        logger.warn("token expired");

        let event = rx.try_recv().unwrap();
        match event {
            Event::JobLog { entry, job_id, .. } => {
                assert_eq!(job_id, "j1");
                assert_eq!(entry.level, LogLevel::Warn);
                assert_eq!(entry.message, "token expired");
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn frozen_logger_publishes_nothing() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe(BusSubscription::new(
            "tail",
            vec![EventPattern::new("job:log")],
        ));

        let logger = logger(&bus);
        logger.freeze();
        logger.info("late line");

        assert!(rx.try_recv().is_err());
        assert!(logger.snapshot().is_empty());
    }

    #[test]
    fn captured_lines_are_marked() {
        let bus = EventBus::new();
        let logger = logger(&bus);
        logger.captured("stray println");

        let snapshot = logger.snapshot();
        assert_eq!(snapshot[0].source, LogSource::Captured);
    }

    #[test]
    fn clones_share_the_ring() {
        let bus = EventBus::new();
        let a = logger(&bus);
        let b = a.clone();
        a.info("one");
        b.info("two");
        assert_eq!(a.snapshot().len(), 2);
    }
}
