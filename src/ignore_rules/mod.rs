//! Layered ignore engine.
//!
//! Three pattern layers decide whether a repository-relative path is
//! excluded, lowest to highest precedence:
//!
//! 1. the frozen built-in defaults ([`crate::constants::DEFAULT_IGNORE_PATTERNS`]),
//! 2. every `.gitignore` in the tree,
//! 3. every `.pampignore` in the tree.
//!
//! A match from a higher layer overrides any decision from a lower layer,
//! including re-inclusions: a `.pampignore` rule beats a `.gitignore`
//! negation for the same path. Within one layer the standard gitignore
//! semantics apply (last matching rule wins, `!pattern` re-includes,
//! `foo/` matches directories only, patterns anchor at the declaring
//! file's directory).
//!
//! Nested ignore files are collected with a raw filesystem walk that does
//! not consult the engine being built, so ignore files living inside
//! ignored directories are still honoured.

use std::path::{Path, PathBuf};

use ignore::gitignore::{Gitignore, GitignoreBuilder};
use ignore::Match;
use tracing::warn;

use crate::constants::{DEFAULT_IGNORE_PATTERNS, GITIGNORE_FILE_NAME, PAMPIGNORE_FILE_NAME};
use crate::error::{PampaxError, Result};

/// The layer a decision came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IgnoreLayer {
    Defaults,
    Gitignore,
    Pampignore,
}

impl IgnoreLayer {
    pub fn as_str(&self) -> &'static str {
        match self {
            IgnoreLayer::Defaults => "defaults",
            IgnoreLayer::Gitignore => "gitignore",
            IgnoreLayer::Pampignore => "pampignore",
        }
    }
}

/// Why a path was included or excluded.
///
/// Carries enough context to explain the decision: the winning layer, the
/// matched pattern as written, the declaring ignore file (`None` for the
/// built-in defaults), and whether the match was a `!` re-inclusion.
#[derive(Debug, Clone)]
pub struct IgnoreDecision {
    pub excluded: bool,
    pub layer: Option<IgnoreLayer>,
    pub pattern: Option<String>,
    pub origin: Option<PathBuf>,
    pub negated: bool,
}

impl IgnoreDecision {
    fn included_by_default() -> Self {
        IgnoreDecision {
            excluded: false,
            layer: None,
            pattern: None,
            origin: None,
            negated: false,
        }
    }
}

/// Compiled three-layer matcher for one repository root.
pub struct IgnoreEngine {
    defaults: Gitignore,
    gitignore: Gitignore,
    pampignore: Gitignore,
}

impl IgnoreEngine {
    /// Build the engine for `root`, collecting every nested ignore file.
    pub fn build(root: &Path) -> Result<Self> {
        let defaults = build_defaults(root)?;
        let gitignore = build_layer(root, GITIGNORE_FILE_NAME)?;
        let pampignore = build_layer(root, PAMPIGNORE_FILE_NAME)?;
        Ok(Self {
            defaults,
            gitignore,
            pampignore,
        })
    }

    /// Decide whether the repo-relative `rel_path` is excluded.
    ///
    /// `is_dir` must reflect the real file type; directory-only patterns
    /// depend on it.
    pub fn decide(&self, rel_path: &str, is_dir: bool) -> IgnoreDecision {
        let layers = [
            (IgnoreLayer::Pampignore, &self.pampignore),
            (IgnoreLayer::Gitignore, &self.gitignore),
            (IgnoreLayer::Defaults, &self.defaults),
        ];

        for (layer, matcher) in layers {
            match matcher.matched_path_or_any_parents(rel_path, is_dir) {
                Match::Ignore(glob) => {
                    return IgnoreDecision {
                        excluded: true,
                        layer: Some(layer),
                        pattern: Some(glob.original().to_string()),
                        origin: glob.from().map(|p| p.to_path_buf()),
                        negated: false,
                    };
                }
                Match::Whitelist(glob) => {
                    // An explicit re-inclusion in a higher layer overrides
                    // exclusions from every lower layer.
                    return IgnoreDecision {
                        excluded: false,
                        layer: Some(layer),
                        pattern: Some(glob.original().to_string()),
                        origin: glob.from().map(|p| p.to_path_buf()),
                        negated: true,
                    };
                }
                Match::None => {}
            }
        }

        IgnoreDecision::included_by_default()
    }

    /// Shorthand for callers that only need the verdict.
    pub fn is_excluded(&self, rel_path: &str, is_dir: bool) -> bool {
        self.decide(rel_path, is_dir).excluded
    }
}

fn build_defaults(root: &Path) -> Result<Gitignore> {
    let mut builder = GitignoreBuilder::new(root);
    for pattern in DEFAULT_IGNORE_PATTERNS {
        builder
            .add_line(None, pattern)
            .map_err(|e| PampaxError::Internal(format!("bad default ignore pattern {pattern}: {e}")))?;
    }
    builder
        .build()
        .map_err(|e| PampaxError::Internal(format!("default ignore layer: {e}")))
}

/// Build one layer from every `file_name` found under `root`.
///
/// Files are added root-first in sorted order so that deeper files take
/// precedence within the layer, matching git behavior.
fn build_layer(root: &Path, file_name: &str) -> Result<Gitignore> {
    let mut builder = GitignoreBuilder::new(root);

    let mut ignore_files: Vec<PathBuf> = walkdir::WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && e.file_name() == file_name)
        .map(|e| e.into_path())
        .collect();
    ignore_files.sort();

    for file in &ignore_files {
        if let Some(e) = builder.add(file) {
            warn!("skipping unreadable ignore file {}: {}", file.display(), e);
        }
    }

    builder
        .build()
        .map_err(|e| PampaxError::Internal(format!("{file_name} layer: {e}")))
}
