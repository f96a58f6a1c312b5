//! Per-world block-change history.
//!
//! Every world owns a [`ChangeLog`]: an append-only `<world>.fbdb` file of
//! fixed 16-byte [`ChangeRecord`]s plus a bounded in-memory cache. Records are
//! buffered in the cache by the tick thread and written out periodically by the
//! [`FlushScheduler`], which also gives retention limits a chance to run.
//!
//! Logging is gated twice: by the process-wide switch held in [`BlockDb`] and
//! by each world's own switch. Both must be on for a record to be kept.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;

pub mod file;
mod change_log;
pub mod record;
pub mod retention;
mod scheduler;

pub use change_log::ChangeLog;
pub use record::{ChangeRecord, RECORD_SIZE};
pub use scheduler::FlushScheduler;

pub const FILE_EXTENSION: &str = "fbdb";

/// Seconds since the unix epoch, as stored in change records.
pub fn unix_now() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs().min(u32::MAX as u64) as u32)
}

pub fn log_path(dir: &Path, world: &str) -> PathBuf {
    dir.join(format!("{world}.{FILE_EXTENSION}"))
}

/// The process-wide side of block logging: the global switch and the set of
/// every world's log, so they can all be flushed together.
#[derive(Debug)]
pub struct BlockDb {
    dir: PathBuf,
    enabled: Arc<AtomicBool>,
    logs: Mutex<Vec<Arc<ChangeLog>>>,
}

impl BlockDb {
    pub fn new(dir: impl Into<PathBuf>, enabled: bool) -> Self {
        Self {
            dir: dir.into(),
            enabled: Arc::new(AtomicBool::new(enabled)),
            logs: Mutex::new(vec![]),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    /// The log for `world`, created (disabled) on first use.
    pub fn log(&self, world: &str) -> Arc<ChangeLog> {
        let mut logs = self.logs.lock();
        if let Some(log) = logs.iter().find(|l| l.world() == world) {
            return Arc::clone(log);
        }
        let log = Arc::new(ChangeLog::new(log_path(&self.dir, world), world, Arc::clone(&self.enabled)));
        logs.push(Arc::clone(&log));
        log
    }

    pub fn logs(&self) -> Vec<Arc<ChangeLog>> {
        self.logs.lock().clone()
    }

    /// Flushes every enabled log. Failures are logged and left for the next
    /// pass; returns how many records were written in total.
    pub fn flush_all(&self) -> usize {
        let mut written = 0;
        // the registry lock is not held while flushing
        for world_log in self.logs() {
            if !world_log.is_enabled() {
                continue;
            }
            match world_log.flush() {
                Ok(n) => written += n,
                Err(e) => log::error!("could not flush change log for {}: {e}", world_log.world()),
            }
        }
        if written > 0 {
            log::debug!("flushed {written} block changes");
        }
        written
    }
}
