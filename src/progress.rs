//! Upload progress observers. Observers never influence the transfer.

use std::{
    io::{self, Write},
    sync::atomic::{AtomicU64, Ordering},
};

/// Receives byte counts as an upload streams. Called once per chunk.
pub trait ProgressObserver: Send + Sync {
    fn on_bytes_transferred(&self, count: u64);
}

/// Discards progress.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressObserver for NoProgress {
    fn on_bytes_transferred(&self, _count: u64) {}
}

/// Renders `name  seen / total  (pct%)` on stderr, rewriting one line.
#[derive(Debug)]
pub struct ProgressPercentage {
    label: String,
    total: u64,
    seen: AtomicU64,
}

impl ProgressPercentage {
    pub fn new(label: impl Into<String>, total: u64) -> Self {
        Self {
            label: label.into(),
            total,
            seen: AtomicU64::new(0),
        }
    }

    pub fn seen(&self) -> u64 {
        self.seen.load(Ordering::Relaxed)
    }

    pub fn percentage(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        (self.seen() as f64 / self.total as f64) * 100.0
    }
}

impl ProgressObserver for ProgressPercentage {
    fn on_bytes_transferred(&self, count: u64) {
        let seen = self.seen.fetch_add(count, Ordering::Relaxed) + count;
        let mut stderr = io::stderr().lock();
        // progress output is best-effort
        let _ = write!(
            stderr,
            "\r{}  {} / {}  ({:.2}%)",
            self.label,
            seen,
            self.total,
            self.percentage()
        );
        let _ = stderr.flush();
    }
}
