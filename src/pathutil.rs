//! Path normalization and atomic file writes.
//!
//! Every path stored in the database or codemap is repository-relative and
//! forward-slashed, regardless of the host platform. Artifact files are
//! replaced atomically so readers never observe a partial write.

use std::fs;
use std::io::Write;
use std::path::Path;

use crate::error::Result;

/// Normalize a repository-relative path for storage.
///
/// Backslashes become forward slashes, leading `./` and `/` are stripped,
/// and empty segments are collapsed. UTF-8 bytes are preserved verbatim.
pub fn normalize_rel_path(path: &str) -> String {
    let mut p = path.replace('\\', "/");
    while let Some(rest) = p.strip_prefix("./") {
        p = rest.to_string();
    }
    while let Some(rest) = p.strip_prefix('/') {
        p = rest.to_string();
    }
    // Collapse accidental doubled separators without touching the rest.
    while p.contains("//") {
        p = p.replace("//", "/");
    }
    p
}

/// Join a repo root and a normalized relative path into a host path.
pub fn to_host_path(root: &Path, rel: &str) -> std::path::PathBuf {
    let mut out = root.to_path_buf();
    for seg in rel.split('/').filter(|s| !s.is_empty()) {
        out.push(seg);
    }
    out
}

/// Compute the normalized repo-relative form of `abs` under `root`.
///
/// Returns `None` when `abs` is not under `root`.
pub fn relative_to_root(root: &Path, abs: &Path) -> Option<String> {
    let rel = abs.strip_prefix(root).ok()?;
    let s = rel.to_string_lossy().to_string();
    Some(normalize_rel_path(&s))
}

/// Run an I/O operation, retrying transient failures with bounded backoff.
///
/// Covers EINTR/EAGAIN-style conditions and short-lived lock contention;
/// anything still failing after the last attempt is returned as-is.
pub fn with_io_retry<T>(mut op: impl FnMut() -> std::io::Result<T>) -> std::io::Result<T> {
    const ATTEMPTS: u32 = 3;
    let mut last_err = None;
    for attempt in 0..ATTEMPTS {
        match op() {
            Ok(v) => return Ok(v),
            Err(e)
                if matches!(
                    e.kind(),
                    std::io::ErrorKind::Interrupted | std::io::ErrorKind::WouldBlock
                ) =>
            {
                std::thread::sleep(std::time::Duration::from_millis(10 * (attempt as u64 + 1)));
                last_err = Some(e);
            }
            Err(e) => return Err(e),
        }
    }
    Err(last_err.expect("retry loop always records an error before exhausting"))
}

/// Write `bytes` to `path` atomically.
///
/// The data goes to a uniquely named temp file in the same directory and is
/// moved into place with `rename`, so concurrent readers see either the old
/// content or the new content, never a prefix.
pub fn atomic_write(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| crate::error::PampaxError::Internal(format!(
            "cannot write {}: no parent directory",
            path.display()
        )))?;
    fs::create_dir_all(dir)?;

    let tmp_name = format!(
        ".{}.{}.tmp",
        path.file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "artifact".to_string()),
        uuid::Uuid::new_v4().simple()
    );
    let tmp_path = dir.join(tmp_name);

    let mut file = fs::File::create(&tmp_path)?;
    file.write_all(bytes)?;
    file.flush()?;
    drop(file);

    if let Err(e) = with_io_retry(|| fs::rename(&tmp_path, path)) {
        // Leave nothing behind on failure.
        let _ = fs::remove_file(&tmp_path);
        return Err(e.into());
    }
    Ok(())
}
