//! Server configuration, read from a JSON file. Every field is optional.
//!
//! ```json
//! {
//!     "listen": "0.0.0.0:25565",
//!     "data_dir": "data",
//!     "worlds": [{ "name": "main", "width": 128, "length": 128, "height": 64 }],
//!     "blockdb": {
//!         "enabled": true,
//!         "worlds": { "main": { "enabled": true, "preload": true, "count_limit": 100000 } }
//!     }
//! }
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::blockdb::ChangeLog;
use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub listen: String,
    /// Where `<world>.fbdb` files and the player directory live.
    pub data_dir: PathBuf,
    pub worlds: Vec<WorldConfig>,
    pub blockdb: BlockDbConfig,
    pub throttling: Throttling,
}
impl Default for Config {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:25565".into(),
            data_dir: "data".into(),
            worlds: vec![WorldConfig::default()],
            blockdb: BlockDbConfig::default(),
            throttling: Throttling::default(),
        }
    }
}
impl Config {
    /// Reads `path`, or returns the defaults if there is none.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        match std::fs::read(path) {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::warn!("{} not found, using the default configuration", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldConfig {
    pub name: String,
    pub width: i32,
    pub length: i32,
    pub height: i32,
}
impl Default for WorldConfig {
    fn default() -> Self {
        Self { name: "main".into(), width: 64, length: 64, height: 64 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlockDbConfig {
    /// The process-wide switch.
    pub enabled: bool,
    pub flush_interval_secs: u64,
    /// Sync every flush to stable storage before it counts as done.
    pub durable_flush: bool,
    pub worlds: BTreeMap<String, WorldLogConfig>,
}
impl Default for BlockDbConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            flush_interval_secs: 90,
            durable_flush: false,
            worlds: BTreeMap::new(),
        }
    }
}
impl BlockDbConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_secs.max(1))
    }
    /// Settings for `world`'s log; worlds not listed get the defaults.
    pub fn world(&self, world: &str) -> WorldLogConfig {
        self.worlds.get(world).cloned().unwrap_or_default()
    }
}

/// Per-world logging settings. Limits of zero mean unlimited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldLogConfig {
    pub enabled: bool,
    pub preload: bool,
    pub count_limit: u32,
    pub age_limit_secs: u64,
}
impl Default for WorldLogConfig {
    fn default() -> Self {
        Self { enabled: true, preload: false, count_limit: 0, age_limit_secs: 0 }
    }
}
impl WorldLogConfig {
    /// Preload and limits are set before enabling, so enabling loads the file
    /// once with everything in place.
    pub fn apply(&self, log: &ChangeLog, durable: bool) -> Result<()> {
        log.set_durable(durable);
        log.set_count_limit(self.count_limit);
        log.set_age_limit(Duration::from_secs(self.age_limit_secs))?;
        log.set_preloaded(self.preload)?;
        log.set_enabled(self.enabled)
    }
}

/// Bytes a single block update takes on the wire.
const BLOCK_UPDATE_BYTES: u32 = 9;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Throttling {
    pub ticks_per_second: u32,
    /// Most block updates a single world sends per second while players are on.
    pub block_updates_per_second: u32,
    /// Upload allowance per second, shared by everyone in a world.
    pub max_upload_bytes_per_second: u32,
    /// Per-tick ceiling when nobody would see the updates (no players, or the
    /// whole map is being resent anyway).
    pub max_block_updates_per_tick: u32,
}
impl Default for Throttling {
    fn default() -> Self {
        Self {
            ticks_per_second: 20,
            block_updates_per_second: 2048,
            max_upload_bytes_per_second: 100 * 1024,
            max_block_updates_per_tick: 32 * 1024,
        }
    }
}
impl Throttling {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(1) / self.ticks_per_second.max(1)
    }
    /// How many block updates a world may apply this tick.
    pub fn tick_budget(&self, players: usize, flushing: bool) -> u32 {
        let tps = self.ticks_per_second.max(1);
        if players == 0 || flushing {
            return self.max_block_updates_per_tick;
        }
        let players = u32::try_from(players).unwrap_or(u32::MAX);
        let bandwidth = self.max_upload_bytes_per_second / tps / BLOCK_UPDATE_BYTES / players;
        bandwidth.min(self.block_updates_per_second / tps).max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_files_fill_in_defaults() {
        let config: Config = serde_json::from_str(r#"{
            "listen": "127.0.0.1:0",
            "blockdb": { "durable_flush": true, "worlds": { "main": { "preload": true, "count_limit": 10 } } }
        }"#).unwrap();
        assert_eq!(config.listen, "127.0.0.1:0");
        assert_eq!(config.worlds, vec![WorldConfig::default()]);
        assert!(config.blockdb.enabled && config.blockdb.durable_flush);
        assert_eq!(config.blockdb.flush_interval(), Duration::from_secs(90));
        let main = config.blockdb.world("main");
        assert!(main.enabled && main.preload);
        assert_eq!(main.count_limit, 10);
        assert_eq!(config.blockdb.world("other"), WorldLogConfig::default());
    }

    #[test]
    fn load_missing_and_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("server.json");
        assert_eq!(Config::load(Some(&missing)).unwrap(), Config::default());

        std::fs::write(&missing, "{ not json").unwrap();
        assert!(matches!(Config::load(Some(&missing)), Err(crate::Error::Config(_))));
    }

    #[test]
    fn budget_shrinks_with_players() {
        let throttling = Throttling::default();
        assert_eq!(throttling.tick_budget(0, false), 32 * 1024);
        assert_eq!(throttling.tick_budget(5, true), 32 * 1024);
        // 2048 per second over 20 ticks
        assert_eq!(throttling.tick_budget(1, false), 102);
        // 102400 / 20 / 9 / 10
        assert_eq!(throttling.tick_budget(10, false), 56);
        assert_eq!(throttling.tick_budget(100_000, false), 1);
    }

    #[test]
    fn applying_world_settings() {
        let dir = tempfile::tempdir().unwrap();
        let log = ChangeLog::open(dir.path(), "main");
        let settings = WorldLogConfig { enabled: true, preload: true, count_limit: 50, age_limit_secs: 60 };
        settings.apply(&log, false).unwrap();
        assert!(log.is_enabled() && log.is_preloaded());
        assert_eq!(log.count_limit(), 50);
        assert_eq!(log.age_limit(), Duration::from_secs(60));

        let too_old = WorldLogConfig { age_limit_secs: u64::MAX, ..settings };
        assert!(too_old.apply(&log, false).is_err());
    }
}
