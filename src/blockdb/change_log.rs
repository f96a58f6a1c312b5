use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use super::file;
use super::record::ChangeRecord;
use super::unix_now;
use crate::collections::GrowableCache;
use crate::error::{Error, Result};
use crate::types::*;

/// The block-change history of one world: an append-only `.fbdb` file plus an
/// in-memory cache of records that have not been written yet (or, when
/// preloaded, of the whole file).
///
/// Every operation takes the same lock, so appends are serialized and the
/// records of one world are always in non-decreasing timestamp order.
#[derive(Debug)]
pub struct ChangeLog {
    world: String,
    path: PathBuf,
    // process-wide switch shared by every log
    globally_enabled: Arc<AtomicBool>,
    state: Mutex<LogState>,
}

#[derive(Debug)]
pub(super) struct LogState {
    pub(super) enabled: bool,
    pub(super) preloaded: bool,
    pub(super) cache: GrowableCache<ChangeRecord>,
    /// Records before this cache index are already on disk.
    pub(super) last_flushed: usize,
    /// Newest timestamp buffered or on disk. New stamps never go below it.
    pub(super) newest: u32,
    pub(super) count_limit: u32,
    pub(super) age_limit: Duration,
    pub(super) durable: bool,
    pub(super) last_count_enforced: Option<Instant>,
    pub(super) last_age_enforced: Option<Instant>,
}

impl ChangeLog {
    pub(super) fn new(path: PathBuf, world: &str, globally_enabled: Arc<AtomicBool>) -> Self {
        Self {
            world: world.to_owned(),
            path,
            globally_enabled,
            state: Mutex::new(LogState {
                enabled: false,
                preloaded: false,
                cache: GrowableCache::new(),
                last_flushed: 0,
                newest: 0,
                count_limit: 0,
                age_limit: Duration::ZERO,
                durable: false,
                last_count_enforced: None,
                last_age_enforced: None,
            }),
        }
    }

    /// A standalone, disabled log for `<dir>/<world>.fbdb`.
    pub fn open(dir: impl AsRef<Path>, world: &str) -> Self {
        Self::new(super::log_path(dir.as_ref(), world), world, Arc::new(AtomicBool::new(true)))
    }

    pub fn world(&self) -> &str {
        &self.world
    }
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether this world's own switch is on.
    pub fn is_enabled(&self) -> bool {
        self.state.lock().enabled
    }
    /// Whether new records are accepted right now: both this world's switch and
    /// the process-wide one must be on.
    pub fn is_accepting(&self) -> bool {
        self.globally_enabled.load(Ordering::Relaxed) && self.is_enabled()
    }

    /// Enabling a preload-configured log loads the file. Disabling flushes and
    /// drops the cache; if that flush fails the log stays enabled.
    pub fn set_enabled(&self, enabled: bool) -> Result<()> {
        let mut state = self.state.lock();
        if state.enabled == enabled {
            return Ok(());
        }
        if enabled {
            state.newest = file::last_record(&self.path)?.map_or(0, |r| r.timestamp).max(state.newest);
            state.enabled = true;
            if state.preloaded {
                if let Err(e) = state.load(&self.path) {
                    state.preloaded = false;
                    return Err(e);
                }
            }
        } else {
            state.flush(&self.path)?;
            state.cache.reset();
            state.last_flushed = 0;
            state.enabled = false;
        }
        log::info!("change log for {} {}", self.world, if enabled { "enabled" } else { "disabled" });
        Ok(())
    }

    pub fn is_preloaded(&self) -> bool {
        self.state.lock().preloaded
    }

    /// Mirrors the whole file in memory (or stops doing so). A disabled log
    /// only remembers the setting and loads once it is enabled.
    pub fn set_preloaded(&self, preloaded: bool) -> Result<()> {
        let mut state = self.state.lock();
        if state.preloaded == preloaded {
            return Ok(());
        }
        state.flush(&self.path)?;
        if preloaded {
            if state.enabled {
                state.load(&self.path)?;
            }
        } else {
            state.cache.reset();
            state.last_flushed = 0;
        }
        state.preloaded = preloaded;
        Ok(())
    }

    /// 0 disables count-based retention.
    pub fn set_count_limit(&self, limit: u32) {
        self.state.lock().count_limit = limit;
    }
    pub fn count_limit(&self) -> u32 {
        self.state.lock().count_limit
    }

    /// Zero disables age-based retention.
    pub fn set_age_limit(&self, age: Duration) -> Result<()> {
        if age.as_secs() > u32::MAX as u64 {
            return Err(Error::InvalidLimit(format!("age limit of {}s exceeds the timestamp range", age.as_secs())));
        }
        self.state.lock().age_limit = age;
        Ok(())
    }
    pub fn age_limit(&self) -> Duration {
        self.state.lock().age_limit
    }

    /// Sync file data to the device after each flush.
    pub fn set_durable(&self, durable: bool) {
        self.state.lock().durable = durable;
    }

    /// Buffers `record`. Returns `false` if logging is switched off.
    pub fn add_entry(&self, record: ChangeRecord) -> bool {
        if !self.globally_enabled.load(Ordering::Relaxed) {
            return false;
        }
        let mut state = self.state.lock();
        if !state.enabled {
            return false;
        }
        state.newest = state.newest.max(record.timestamp);
        state.cache.append(record);
        true
    }

    /// Builds and buffers a record stamped with the current time. The stamp is
    /// taken under the lock and never goes backwards within this log.
    pub fn record_change(&self, player: PlayerId, pos: V3<i16>, old_block: Block, new_block: Block) -> bool {
        if !self.globally_enabled.load(Ordering::Relaxed) {
            return false;
        }
        let mut state = self.state.lock();
        if !state.enabled {
            return false;
        }
        let timestamp = unix_now().max(state.newest);
        state.newest = timestamp;
        state.cache.append(ChangeRecord {
            timestamp,
            player,
            pos,
            old_block,
            new_block,
        });
        true
    }

    /// Writes buffered records to disk and returns how many were written.
    /// Retention runs afterwards if a limit is overdue; if it fails the
    /// records are still on disk, so that is only logged.
    pub fn flush(&self) -> Result<usize> {
        let mut state = self.state.lock();
        let written = state.flush(&self.path)?;
        if let Err(e) = state.enforce_due_limits(&self.path, &self.world) {
            log::error!("retention for {} failed after flushing: {e}", self.world);
        }
        Ok(written)
    }

    /// Forgets all history, in memory and on disk.
    pub fn clear(&self) -> Result<()> {
        let mut state = self.state.lock();
        state.cache.reset();
        state.last_flushed = 0;
        file::remove(&self.path)?;
        log::info!("change log for {} cleared", self.world);
        Ok(())
    }

    /// Keeps the `limit` newest records. 0 means "no limit" and does nothing.
    pub fn enforce_count_limit(&self, limit: u32) -> Result<()> {
        if limit == 0 {
            return Ok(());
        }
        self.state.lock().enforce_count(&self.path, limit as usize)
    }

    /// Drops every record older than `now - age`. Zero does nothing.
    pub fn enforce_age_limit(&self, age: Duration) -> Result<()> {
        if age.is_zero() {
            return Ok(());
        }
        self.state.lock().enforce_age(&self.path, age)
    }

    /// Every change at `pos`, oldest first.
    pub fn lookup_by_coordinate(&self, pos: V3<i16>) -> Result<Vec<ChangeRecord>> {
        self.with_records(|records| records.iter().filter(|r| r.pos == pos).copied().collect())
    }

    /// The newest change `player` made at each coordinate, newest first, for at
    /// most `max_results` coordinates.
    pub fn lookup_by_player(&self, player: PlayerId, max_results: usize) -> Result<Vec<ChangeRecord>> {
        self.with_records(|records| newest_per_coordinate(records, player, max_results, 0))
    }

    /// Like [`lookup_by_player`](Self::lookup_by_player) but bounded by time
    /// instead of count: the scan stops at the first record older than
    /// `now - within`.
    pub fn lookup_by_player_within(&self, player: PlayerId, within: Duration) -> Result<Vec<ChangeRecord>> {
        let cutoff = unix_now().saturating_sub(within.as_secs().min(u32::MAX as u64) as u32);
        self.with_records(|records| newest_per_coordinate(records, player, usize::MAX, cutoff))
    }

    /// Runs `f` over the whole history: the cache if it mirrors the file,
    /// otherwise a fresh read after flushing.
    fn with_records<R>(&self, f: impl FnOnce(&[ChangeRecord]) -> R) -> Result<R> {
        let mut state = self.state.lock();
        if state.preloaded && state.enabled {
            return Ok(f(state.cache.as_slice()));
        }
        state.flush(&self.path)?;
        let records = file::read_all(&self.path)?;
        Ok(f(&records))
    }
}

fn newest_per_coordinate(records: &[ChangeRecord], player: PlayerId, max: usize, cutoff: u32) -> Vec<ChangeRecord> {
    let mut seen = HashSet::new();
    let mut found = vec![];
    if max == 0 {
        return found;
    }
    for record in records.iter().rev() {
        if record.timestamp < cutoff {
            break;
        }
        if record.player == player && seen.insert(record.pos) {
            found.push(*record);
            if found.len() >= max {
                break;
            }
        }
    }
    found
}

impl LogState {
    /// Appends everything past `last_flushed` to the file. On failure nothing
    /// in memory changes.
    pub(super) fn flush(&mut self, path: &Path) -> Result<usize> {
        let pending = &self.cache.as_slice()[self.last_flushed..];
        let written = pending.len();
        file::append(path, pending, self.durable)?;
        if self.preloaded {
            self.last_flushed = self.cache.len();
        } else {
            self.cache.clear();
            self.last_flushed = 0;
        }
        Ok(written)
    }

    /// Replaces the cache with the file's contents.
    fn load(&mut self, path: &Path) -> Result<()> {
        let records = file::read_all(path)?;
        self.cache.reset();
        self.cache.extend_from_slice(&records);
        self.last_flushed = self.cache.len();
        if let Some(last) = records.last() {
            self.newest = self.newest.max(last.timestamp);
        }
        Ok(())
    }
}
