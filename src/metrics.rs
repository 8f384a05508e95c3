//! Rebuild and fault bookkeeping.
//!
//! `Metrics` is written by the shrink engine; callers read a
//! `MetricsSnapshot` copied out under the read lock.

use parking_lot::RwLock;
use std::collections::VecDeque;
use std::time::{Duration, SystemTime};

/// Upper bound on retained error records; the oldest is evicted first.
pub const ERROR_HISTORY_LIMIT: usize = 10;

/// One recorded error or background panic.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ErrorRecord {
    pub timestamp: SystemTime,
    pub message: String,
    pub backtrace: String,
}

#[derive(Clone, Debug, Default)]
struct MetricsState {
    total_shrinks: u64,
    last_shrink_duration: Duration,
    total_items_processed: u64,
    peak_size: usize,
    shrink_panics: u64,
    last_panic_time: Option<SystemTime>,
    last_error: Option<ErrorRecord>,
    error_history: VecDeque<ErrorRecord>,
    total_errors: u64,
}

#[derive(Debug, Default)]
pub(crate) struct Metrics {
    state: RwLock<MetricsState>,
}

impl Metrics {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_shrink(&self, duration: Duration) {
        let mut s = self.state.write();
        s.total_shrinks += 1;
        s.last_shrink_duration = duration;
    }

    /// Counts `processed` newly inserted items and raises the peak to `size`.
    pub(crate) fn record_inserts(&self, processed: u64, size: usize) {
        let mut s = self.state.write();
        s.total_items_processed += processed;
        if size > s.peak_size {
            s.peak_size = size;
        }
    }

    pub(crate) fn record_error(&self, message: impl Into<String>, backtrace: impl Into<String>) {
        let record = ErrorRecord {
            timestamp: SystemTime::now(),
            message: message.into(),
            backtrace: backtrace.into(),
        };
        let mut s = self.state.write();
        s.total_errors += 1;
        push_history(&mut s, record);
    }

    pub(crate) fn record_panic(&self, message: impl Into<String>, backtrace: impl Into<String>) {
        let record = ErrorRecord {
            timestamp: SystemTime::now(),
            message: message.into(),
            backtrace: backtrace.into(),
        };
        let mut s = self.state.write();
        s.shrink_panics += 1;
        s.last_panic_time = Some(record.timestamp);
        push_history(&mut s, record);
    }

    pub(crate) fn reset(&self) {
        *self.state.write() = MetricsState::default();
    }

    pub(crate) fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            state: self.state.read().clone(),
        }
    }
}

fn push_history(s: &mut MetricsState, record: ErrorRecord) {
    if s.error_history.len() >= ERROR_HISTORY_LIMIT {
        s.error_history.pop_front();
    }
    s.last_error = Some(record.clone());
    s.error_history.push_back(record);
}

/// Point-in-time copy of a map's metrics.
#[derive(Clone, Debug)]
pub struct MetricsSnapshot {
    state: MetricsState,
}

impl MetricsSnapshot {
    /// Number of completed rebuilds.
    pub fn total_shrinks(&self) -> u64 {
        self.state.total_shrinks
    }

    pub fn last_shrink_duration(&self) -> Duration {
        self.state.last_shrink_duration
    }

    /// Number of new keys inserted over the map's lifetime.
    pub fn total_items_processed(&self) -> u64 {
        self.state.total_items_processed
    }

    pub fn peak_size(&self) -> usize {
        self.state.peak_size
    }

    /// Panics caught by the background worker.
    pub fn total_panics(&self) -> u64 {
        self.state.shrink_panics
    }

    pub fn last_panic_time(&self) -> Option<SystemTime> {
        self.state.last_panic_time
    }

    pub fn last_error(&self) -> Option<&ErrorRecord> {
        self.state.last_error.as_ref()
    }

    /// Retained records, oldest first. At most [`ERROR_HISTORY_LIMIT`].
    pub fn error_history(&self) -> Vec<ErrorRecord> {
        self.state.error_history.iter().cloned().collect()
    }

    pub fn total_errors(&self) -> u64 {
        self.state.total_errors
    }
}
