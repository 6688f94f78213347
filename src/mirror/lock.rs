//! Advisory lock serializing mirror refreshes across processes.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use fs2::FileExt;

/// How long a refresh waits for another process before giving up.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5 * 60);

const FIRST_RETRY: Duration = Duration::from_millis(10);
const MAX_RETRY: Duration = Duration::from_millis(500);

/// Exclusive `flock` on the data directory's lock file, held until dropped.
#[derive(Debug)]
pub struct MirrorLock {
    file: File,
}

/// Retry delays doubling from `FIRST_RETRY` up to `MAX_RETRY`.
fn retry_delays() -> impl Iterator<Item = Duration> {
    std::iter::successors(Some(FIRST_RETRY), |d| Some((*d * 2).min(MAX_RETRY)))
}

impl MirrorLock {
    fn open(lock_path: &Path) -> io::Result<File> {
        if let Some(parent) = lock_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(lock_path)
    }

    fn lock(file: File) -> io::Result<Result<Self, File>> {
        match file.try_lock_exclusive() {
            Ok(()) => Ok(Ok(Self { file })),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(Err(file)),
            Err(e) => Err(e),
        }
    }

    /// Wait up to `timeout` for the lock, creating the file if needed.
    ///
    /// Fails with `ErrorKind::TimedOut` when another holder keeps it.
    pub fn acquire(lock_path: &Path, timeout: Duration) -> io::Result<Self> {
        let deadline = Instant::now() + timeout;
        let mut file = Self::open(lock_path)?;

        for delay in retry_delays() {
            file = match Self::lock(file)? {
                Ok(held) => return Ok(held),
                Err(file) => file,
            };
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            thread::sleep(delay.min(deadline - now));
        }

        Err(io::Error::new(
            io::ErrorKind::TimedOut,
            format!("{} still locked after {:?}", lock_path.display(), timeout),
        ))
    }

    /// Take the lock only if it is free right now.
    pub fn try_acquire(lock_path: &Path) -> io::Result<Option<Self>> {
        Ok(Self::lock(Self::open(lock_path)?)?.ok())
    }
}

impl Drop for MirrorLock {
    fn drop(&mut self) {
        if let Err(e) = self.file.unlock() {
            log::debug!("Failed to release mirror lock: {}", e);
        }
    }
}
