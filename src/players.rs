use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::PlayerId;

/// Persistent mapping from player names to the ids stored in change records.
/// Ids are handed out in order and never reused.
#[derive(Debug)]
pub struct PlayerDirectory {
    path: PathBuf,
    file: DirectoryFile,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct DirectoryFile {
    next_id: i32,
    players: BTreeMap<String, PlayerId>,
}

impl PlayerDirectory {
    /// Loads `path`, starting empty if it doesn't exist yet.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let file = match std::fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => DirectoryFile::default(),
            Err(e) => return Err(e.into()),
        };
        log::debug!("{} known players", file.players.len());
        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn id_of(&self, name: &str) -> Option<PlayerId> {
        self.file.players.get(name).copied()
    }

    pub fn name_of(&self, id: PlayerId) -> Option<&str> {
        self.file.players.iter().find(|(_, &p)| p == id).map(|(name, _)| name.as_str())
    }

    /// The id for `name`, registering and saving it if it's new.
    pub fn get_or_insert(&mut self, name: &str) -> Result<PlayerId> {
        if let Some(id) = self.id_of(name) {
            return Ok(id);
        }
        let id = PlayerId(self.file.next_id);
        self.file.next_id += 1;
        self.file.players.insert(name.to_owned(), id);
        if let Err(e) = self.save() {
            self.file.players.remove(name);
            self.file.next_id -= 1;
            return Err(e);
        }
        log::info!("registered {name} as player {}", id.0);
        Ok(id)
    }

    pub fn len(&self) -> usize {
        self.file.players.len()
    }
    pub fn is_empty(&self) -> bool {
        self.file.players.is_empty()
    }

    /// Replaces the file in one step so a crash never leaves half a directory.
    fn save(&self) -> Result<()> {
        let dir = self.path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        serde_json::to_writer_pretty(&mut tmp, &self.file)?;
        tmp.flush()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }
}
