//! Parallel repository walker with deterministic output.
//!
//! Breadth-first traversal over directories: each BFS level fans out over
//! the rayon pool (sized to host parallelism), each worker reads one
//! directory, classifies its entries, consults the ignore engine, and
//! reports files, subdirectories and warnings. Results are collected and
//! sorted before returning, so the output is independent of scheduling.
//!
//! Policy:
//! - symbolic links are never traversed; broken ones produce a warning
//! - permission errors warn and skip the subtree, they never abort
//! - hidden files receive no special treatment beyond ignore rules

use std::fs;
use std::path::Path;

use rayon::prelude::*;
use tokio_util::sync::CancellationToken;

use crate::chunker;
use crate::constants::check_shutdown;
use crate::error::{PampaxError, Result};
use crate::ignore_rules::IgnoreEngine;
use crate::pathutil;

/// Machine-readable warning category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningCode {
    BrokenSymlink,
    PermissionDenied,
    ReadDirFailed,
    StatFailed,
}

impl WarningCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            WarningCode::BrokenSymlink => "broken_symlink",
            WarningCode::PermissionDenied => "permission_denied",
            WarningCode::ReadDirFailed => "read_dir_failed",
            WarningCode::StatFailed => "stat_failed",
        }
    }
}

/// One non-fatal traversal problem.
#[derive(Debug, Clone, serde::Serialize)]
pub struct WalkWarning {
    pub path: String,
    pub code: WarningCode,
    pub message: String,
}

/// Outcome of a full traversal.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct WalkReport {
    /// Repo-relative forward-slash paths, sorted ascending byte-wise,
    /// deduplicated, restricted to supported language extensions.
    pub paths: Vec<String>,
    /// Warnings sorted by (path, code, message).
    pub warnings: Vec<WalkWarning>,
}

#[derive(Debug, Default)]
struct DirScan {
    files: Vec<String>,
    dirs: Vec<String>,
    warnings: Vec<WalkWarning>,
}

/// Walk `root` and return every indexable file plus traversal warnings.
pub fn walk_repository(
    root: &Path,
    engine: &IgnoreEngine,
    cancel: &CancellationToken,
) -> Result<WalkReport> {
    let mut files: Vec<String> = Vec::new();
    let mut warnings: Vec<WalkWarning> = Vec::new();

    // "" stands for the repository root itself.
    let mut frontier: Vec<String> = vec![String::new()];

    while !frontier.is_empty() {
        if check_shutdown(cancel) {
            return Err(PampaxError::Internal("walk cancelled".to_string()));
        }

        let scans: Vec<DirScan> = frontier
            .par_iter()
            .map(|dir| scan_directory(root, dir, engine))
            .collect();

        frontier = Vec::new();
        for scan in scans {
            files.extend(scan.files);
            frontier.extend(scan.dirs);
            warnings.extend(scan.warnings);
        }
    }

    files.sort();
    files.dedup();
    warnings.sort_by(|a, b| {
        (a.path.as_str(), a.code.as_str(), a.message.as_str())
            .cmp(&(b.path.as_str(), b.code.as_str(), b.message.as_str()))
    });

    Ok(WalkReport {
        paths: files,
        warnings,
    })
}

/// Read one directory, classify entries, and apply ignore decisions.
fn scan_directory(root: &Path, rel_dir: &str, engine: &IgnoreEngine) -> DirScan {
    let mut scan = DirScan::default();
    let host_dir = if rel_dir.is_empty() {
        root.to_path_buf()
    } else {
        pathutil::to_host_path(root, rel_dir)
    };

    let read = match fs::read_dir(&host_dir) {
        Ok(r) => r,
        Err(e) => {
            let code = if e.kind() == std::io::ErrorKind::PermissionDenied {
                WarningCode::PermissionDenied
            } else {
                WarningCode::ReadDirFailed
            };
            scan.warnings.push(WalkWarning {
                path: rel_dir.to_string(),
                code,
                message: e.to_string(),
            });
            return scan;
        }
    };

    let mut entries: Vec<(String, fs::DirEntry)> = Vec::new();
    for entry in read {
        match entry {
            Ok(e) => {
                let name = e.file_name().to_string_lossy().to_string();
                entries.push((name, e));
            }
            Err(e) => {
                scan.warnings.push(WalkWarning {
                    path: rel_dir.to_string(),
                    code: WarningCode::ReadDirFailed,
                    message: e.to_string(),
                });
            }
        }
    }
    entries.sort_by(|a, b| a.0.cmp(&b.0));

    for (name, entry) in entries {
        let rel = if rel_dir.is_empty() {
            name.clone()
        } else {
            format!("{rel_dir}/{name}")
        };

        let file_type = match entry.file_type() {
            Ok(ft) => ft,
            Err(e) => {
                scan.warnings.push(WalkWarning {
                    path: rel,
                    code: WarningCode::StatFailed,
                    message: e.to_string(),
                });
                continue;
            }
        };

        if file_type.is_symlink() {
            // Never traversed, file or directory. Only report the ones
            // whose target is gone.
            if fs::metadata(entry.path()).is_err() {
                scan.warnings.push(WalkWarning {
                    path: rel,
                    code: WarningCode::BrokenSymlink,
                    message: "symlink target does not exist".to_string(),
                });
            }
            continue;
        }

        if file_type.is_dir() {
            if !engine.is_excluded(&rel, true) {
                scan.dirs.push(rel);
            }
        } else if file_type.is_file() {
            if engine.is_excluded(&rel, false) {
                continue;
            }
            if chunker::language_for_path(&rel).is_some() {
                scan.files.push(rel);
            }
        }
        // Sockets, fifos and other special files are skipped silently.
    }

    scan
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn write(root: &Path, rel: &str, content: &str) {
        let p = root.join(rel);
        fs::create_dir_all(p.parent().unwrap()).unwrap();
        fs::write(p, content).unwrap();
    }

    fn walk(root: &Path) -> WalkReport {
        let engine = IgnoreEngine::build(root).unwrap();
        walk_repository(root, &engine, &CancellationToken::new()).unwrap()
    }

    #[test]
    fn test_walk_is_sorted_and_filtered() {
        let dir = tempdir().unwrap();
        write(dir.path(), "src/zebra.rs", "fn z() {}");
        write(dir.path(), "src/alpha.rs", "fn a() {}");
        write(dir.path(), "src/notes.txt", "not code");
        write(dir.path(), "lib/util.py", "def u(): pass");

        let report = walk(dir.path());
        assert_eq!(
            report.paths,
            vec!["lib/util.py", "src/alpha.rs", "src/zebra.rs"]
        );
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn test_walk_skips_default_ignored_dirs() {
        let dir = tempdir().unwrap();
        write(dir.path(), "node_modules/pkg/index.js", "x");
        write(dir.path(), "vendor/lib.php", "<?php");
        write(dir.path(), "app/main.go", "package main");

        let report = walk(dir.path());
        assert_eq!(report.paths, vec!["app/main.go"]);
    }

    #[test]
    fn test_walk_output_is_stable_across_runs() {
        let dir = tempdir().unwrap();
        for i in 0..40 {
            write(dir.path(), &format!("src/m{i}/mod.rs"), "pub fn f() {}");
        }

        let first = walk(dir.path());
        for _ in 0..3 {
            let again = walk(dir.path());
            assert_eq!(first.paths, again.paths);
        }
        // Strict sort, no duplicates.
        let mut sorted = first.paths.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(first.paths, sorted);
    }

    #[cfg(unix)]
    #[test]
    fn test_walk_reports_broken_symlink_and_skips_links() {
        let dir = tempdir().unwrap();
        write(dir.path(), "real/target.rs", "fn t() {}");
        std::os::unix::fs::symlink(
            dir.path().join("real"),
            dir.path().join("linked_dir"),
        )
        .unwrap();
        std::os::unix::fs::symlink(
            dir.path().join("missing.rs"),
            dir.path().join("dangling.rs"),
        )
        .unwrap();

        let report = walk(dir.path());
        // The symlinked directory is not traversed: the file is seen once.
        assert_eq!(report.paths, vec!["real/target.rs"]);
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.warnings[0].code, WarningCode::BrokenSymlink);
        assert_eq!(report.warnings[0].path, "dangling.rs");
    }

    #[test]
    fn test_walk_cancelled() {
        let dir = tempdir().unwrap();
        write(dir.path(), "src/a.rs", "fn a() {}");
        let engine = IgnoreEngine::build(dir.path()).unwrap();
        let token = CancellationToken::new();
        token.cancel();
        assert!(walk_repository(dir.path(), &engine, &token).is_err());
    }
}
