use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{self, RecvTimeoutError, Sender};

use super::BlockDb;

/// Background thread that flushes every enabled change log on a fixed
/// interval, and once more when it is shut down.
#[derive(Debug)]
pub struct FlushScheduler {
    stop: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl FlushScheduler {
    pub fn spawn(db: Arc<BlockDb>, interval: Duration) -> std::io::Result<Self> {
        let (stop, stopped) = channel::bounded::<()>(1);
        let thread = thread::Builder::new()
            .name("blockdb-flush".into())
            .spawn(move || loop {
                let stopping = match stopped.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => false,
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => true,
                };
                db.flush_all();
                if stopping {
                    log::debug!("change log flusher stopped");
                    break;
                }
            })?;
        Ok(Self {
            stop: Some(stop),
            thread: Some(thread),
        })
    }

    /// Stops the thread after a final flush and waits for it.
    pub fn shutdown(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::error!("change log flusher panicked");
            }
        }
    }
}

impl Drop for FlushScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockdb::file;
    use crate::types::*;

    #[test]
    fn flushes_periodically_and_on_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let db = Arc::new(BlockDb::new(dir.path(), true));
        let log = db.log("main");
        log.set_enabled(true).unwrap();

        let mut flusher = FlushScheduler::spawn(Arc::clone(&db), Duration::from_millis(20)).unwrap();
        log.record_change(PlayerId(1), V3(1, 2, 3), Block::AIR, Block::SAND);
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while file::record_count(log.path()).unwrap() == 0 && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(file::record_count(log.path()).unwrap(), 1);

        log.record_change(PlayerId(1), V3(1, 2, 3), Block::SAND, Block::AIR);
        flusher.shutdown();
        assert_eq!(file::record_count(log.path()).unwrap(), 2);
    }
}
