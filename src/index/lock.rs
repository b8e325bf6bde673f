//! Writer lock for index runs.
//!
//! The CLI assumes exclusive use of a repository's index; this advisory
//! lock turns a violated assumption into a clean error instead of
//! interleaved writes. Searches never take the lock.

use std::fs::File;
use std::path::Path;

use fs2::FileExt;
use tracing::debug;

use crate::constants::WRITER_LOCK_FILE;
use crate::error::{PampaxError, Result};

/// Acquire the writer lock inside the index directory.
///
/// Returns the open handle; the lock is released when it drops. Fails
/// with a configuration error when another process holds it.
pub fn acquire_writer_lock(index_dir: &Path) -> Result<File> {
    let lock_path = index_dir.join(WRITER_LOCK_FILE);

    let file = File::options()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(&lock_path)?;

    match file.try_lock_exclusive() {
        Ok(()) => {
            debug!("writer lock acquired at {}", lock_path.display());
            Ok(file)
        }
        Err(_) => Err(PampaxError::Config(format!(
            "another pampax process is writing to this index ({})",
            lock_path.display()
        ))),
    }
}
