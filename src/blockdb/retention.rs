//! Count- and age-based trimming of a change log, applied to both the cache
//! and the file.

use std::path::Path;
use std::time::{Duration, Instant};

use super::file;
use super::change_log::LogState;
use super::record::ChangeRecord;
use super::unix_now;
use crate::collections::growable::LINEAR_GROWTH_THRESHOLD;
use crate::error::Result;

/// Minimum time between two automatic count-limit passes.
pub const COUNT_ENFORCEMENT_DELAY: Duration = Duration::from_secs(5 * 60);
/// Minimum time between two automatic age-limit passes.
pub const AGE_ENFORCEMENT_DELAY: Duration = Duration::from_secs(10 * 60);

fn is_due(last: Option<Instant>, delay: Duration) -> bool {
    last.map_or(true, |at| at.elapsed() >= delay)
}

/// How many trailing records are at or after `cutoff`. Relies on timestamps
/// being non-decreasing.
pub fn count_newer(records: &[ChangeRecord], cutoff: u32) -> usize {
    records.iter().rev().take_while(|r| r.timestamp >= cutoff).count()
}

impl LogState {
    /// Runs whichever limits are set, overdue and (for the count limit)
    /// exceeded by a wide enough margin to be worth rewriting the file.
    pub(super) fn enforce_due_limits(&mut self, path: &Path, world: &str) -> Result<()> {
        if self.count_limit > 0 && is_due(self.last_count_enforced, COUNT_ENFORCEMENT_DELAY) {
            let limit = self.count_limit as usize;
            let size = self.size(path)?;
            if size > limit + limit / 10 || size > limit + LINEAR_GROWTH_THRESHOLD {
                log::info!("{world}: trimming change log from {size} to {limit} records");
                self.enforce_count(path, limit)?;
            }
        }
        if !self.age_limit.is_zero() && is_due(self.last_age_enforced, AGE_ENFORCEMENT_DELAY) {
            log::info!("{world}: dropping changes older than {}s", self.age_limit.as_secs());
            self.enforce_age(path, self.age_limit)?;
        }
        Ok(())
    }

    pub(super) fn enforce_count(&mut self, path: &Path, limit: usize) -> Result<()> {
        self.flush(path)?;
        self.keep_newest(path, limit)?;
        self.last_count_enforced = Some(Instant::now());
        Ok(())
    }

    pub(super) fn enforce_age(&mut self, path: &Path, age: Duration) -> Result<()> {
        self.flush(path)?;
        let cutoff = unix_now().saturating_sub(age.as_secs().min(u32::MAX as u64) as u32);
        let keep = if self.preloaded && self.enabled {
            count_newer(self.cache.as_slice(), cutoff)
        } else {
            count_newer(&file::read_all(path)?, cutoff)
        };
        self.keep_newest(path, keep)?;
        self.last_age_enforced = Some(Instant::now());
        Ok(())
    }

    /// Total records, on disk and still buffered.
    fn size(&self, path: &Path) -> Result<usize> {
        if self.preloaded && self.enabled {
            Ok(self.cache.len())
        } else {
            Ok(file::record_count(path)? + self.cache.len())
        }
    }

    // The file goes first so a failed rewrite leaves the cache untouched.
    fn keep_newest(&mut self, path: &Path, keep: usize) -> Result<()> {
        file::truncate_to_last(path, keep)?;
        if self.preloaded {
            self.cache.trim_to_max(keep);
            self.last_flushed = self.cache.len();
        }
        Ok(())
    }
}
