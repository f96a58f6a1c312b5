//! Raw access to `.fbdb` files: a flat sequence of 16-byte records with no
//! header, footer or checksum.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

use super::record::{decode_all, ChangeRecord, RECORD_SIZE};
use crate::error::Result;

/// Every whole record in the file. A missing file is an empty log; a partial
/// record at the end is dropped with a warning.
pub fn read_all(path: &Path) -> Result<Vec<ChangeRecord>> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(vec![]),
        Err(e) => return Err(e.into()),
    };
    let (records, tail) = decode_all(&bytes);
    if tail != 0 {
        log::warn!("{}: ignoring {tail} trailing bytes of a truncated record", path.display());
    }
    Ok(records)
}

/// Number of whole records on disk.
pub fn record_count(path: &Path) -> Result<usize> {
    match fs::metadata(path) {
        Ok(meta) => Ok(meta.len() as usize / RECORD_SIZE),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(0),
        Err(e) => Err(e.into()),
    }
}

/// The newest whole record on disk, read without loading the rest.
pub fn last_record(path: &Path) -> Result<Option<ChangeRecord>> {
    let mut file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let count = file.metadata()?.len() / RECORD_SIZE as u64;
    if count == 0 {
        return Ok(None);
    }
    file.seek(SeekFrom::Start((count - 1) * RECORD_SIZE as u64))?;
    let mut buf = [0; RECORD_SIZE];
    file.read_exact(&mut buf)?;
    Ok(Some(ChangeRecord::decode(&buf)?))
}

/// Appends `records` in one buffered write. If the write fails part-way the
/// file is cut back to its previous length, so a retry does not duplicate.
pub fn append(path: &Path, records: &[ChangeRecord], durable: bool) -> Result<()> {
    if records.is_empty() {
        return Ok(());
    }
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let previous_len = file.metadata()?.len();
    let written = (|| {
        let mut writer = BufWriter::with_capacity(records.len() * RECORD_SIZE, &file);
        for record in records {
            writer.write_all(&record.encode())?;
        }
        writer.flush()?;
        if durable {
            file.sync_data()?;
        }
        io::Result::Ok(())
    })();
    if let Err(e) = written {
        if let Err(undo) = file.set_len(previous_len) {
            log::error!("{}: could not roll back partial append: {undo}", path.display());
        }
        return Err(e.into());
    }
    Ok(())
}

/// Keeps only the last `keep` records. The survivors are copied to a
/// temporary file which then atomically replaces the original. `keep == 0`
/// leaves an empty file behind.
pub fn truncate_to_last(path: &Path, keep: usize) -> Result<()> {
    if keep == 0 {
        remove(path)?;
        File::create(path)?;
        return Ok(());
    }
    let mut file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };
    let total = file.metadata()?.len() as usize / RECORD_SIZE;
    if total <= keep {
        return Ok(());
    }
    file.seek(SeekFrom::Start(((total - keep) * RECORD_SIZE) as u64))?;

    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    io::copy(&mut (&file).take((keep * RECORD_SIZE) as u64), tmp.as_file_mut())?;
    tmp.as_file_mut().flush()?;
    drop(file);
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Deletes the file; a file that is already gone is fine.
pub fn remove(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e.into()),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::*;

    fn record(timestamp: u32) -> ChangeRecord {
        ChangeRecord {
            timestamp,
            player: PlayerId(1),
            pos: V3(0, 0, 0),
            old_block: Block::AIR,
            new_block: Block::STONE,
        }
    }

    #[test]
    fn missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("none.fbdb");
        assert!(read_all(&path).unwrap().is_empty());
        assert_eq!(record_count(&path).unwrap(), 0);
        assert_eq!(last_record(&path).unwrap(), None);
        remove(&path).unwrap();
    }

    #[test]
    fn partial_tail_is_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("w.fbdb");
        append(&path, &[record(1), record(2)], false).unwrap();
        let mut f = OpenOptions::new().append(true).open(&path).unwrap();
        f.write_all(&[9; 5]).unwrap();
        assert_eq!(read_all(&path).unwrap(), [record(1), record(2)]);
        assert_eq!(record_count(&path).unwrap(), 2);
        assert_eq!(last_record(&path).unwrap(), Some(record(2)));
    }

    #[test]
    fn truncate_keeps_tail() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("w.fbdb");
        let records: Vec<_> = (0..10).map(record).collect();
        append(&path, &records, true).unwrap();

        truncate_to_last(&path, 20).unwrap();
        assert_eq!(read_all(&path).unwrap(), records);

        truncate_to_last(&path, 3).unwrap();
        assert_eq!(read_all(&path).unwrap(), &records[7..]);

        truncate_to_last(&path, 0).unwrap();
        assert!(path.exists());
        assert_eq!(fs::metadata(&path).unwrap().len(), 0);
    }
}
