//! Central constants for pampax configuration
//!
//! All string literals for paths, filenames, and configuration should be defined here
//! to avoid duplication and ensure consistency across the codebase.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

/// Global shutdown flag, set by the CTRL-C handler.
///
/// This uses a raw `AtomicBool` instead of relying solely on `CancellationToken`
/// because large parts of the indexing pipeline are synchronous (file I/O,
/// chunking, SQLite writes) and the flag must be visible from any thread
/// without async polling.
///
/// Checked between files and between embedding batches so that CTRL-C
/// is honoured within a few seconds even during heavy work.
pub static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);

/// Check whether a graceful shutdown has been requested (CTRL-C).
#[inline]
pub fn is_shutdown_requested() -> bool {
    SHUTDOWN_REQUESTED.load(Ordering::SeqCst)
}

/// Check whether a graceful shutdown has been requested via either
/// the global AtomicBool (OS signal) or a CancellationToken.
#[inline]
pub fn check_shutdown(cancel_token: &tokio_util::sync::CancellationToken) -> bool {
    is_shutdown_requested() || cancel_token.is_cancelled()
}

/// Name of the index directory in repository roots
pub const INDEX_DIR_NAME: &str = ".pampa";

/// Name of the SQLite database inside the index directory
pub const DB_FILE_NAME: &str = "pampa.db";

/// Name of the chunk store directory inside the index directory
pub const CHUNKS_DIR_NAME: &str = "chunks";

/// Name of the codemap file at the repository root
pub const CODEMAP_FILE_NAME: &str = "pampa.codemap.json";

/// Name of the repo-level override ignore file
pub const PAMPIGNORE_FILE_NAME: &str = ".pampignore";

/// Name of the standard git ignore file
pub const GITIGNORE_FILE_NAME: &str = ".gitignore";

/// Lock file name to indicate an active writer instance.
/// This prevents two index runs from writing to the same repository.
pub const WRITER_LOCK_FILE: &str = ".writer.lock";

/// Log directory name within the index directory
pub const LOG_DIR_NAME: &str = "logs";

/// Default log file name
pub const LOG_FILE_NAME: &str = "pampax.log";

/// Name of the global config directory in user home
pub const CONFIG_DIR_NAME: &str = ".pampax";

/// Subdirectory name for embedding models within the global config dir
const MODELS_SUBDIR: &str = "models";

/// HKDF info string binding derived chunk keys to this format version
pub const CHUNK_KEY_INFO: &[u8] = b"pampa-chunk-v1";

/// Magic header identifying the encrypted chunk payload format
pub const ENCRYPTED_CHUNK_MAGIC: &[u8] = b"PAMPAE1";

/// Environment variable holding the chunk-store master key (base64 or hex, 32 bytes)
pub const ENV_ENCRYPTION_KEY: &str = "PAMPAX_ENCRYPTION_KEY";

/// Default embedding batch size when the provider does not say otherwise
pub const DEFAULT_EMBED_BATCH_SIZE: usize = 32;

/// Default result limit for search
pub const DEFAULT_SEARCH_LIMIT: usize = 10;

/// Reciprocal Rank Fusion constant
pub const RRF_K: f64 = 60.0;

/// Multiplier applied to `limit` to size the candidate set handed to a reranker
pub const RERANK_CANDIDATE_FACTOR: usize = 3;

/// Default set of ignore patterns, frozen for v1.
///
/// These form the lowest-precedence layer; `.gitignore` entries override
/// them and `.pampignore` entries override both.
pub const DEFAULT_IGNORE_PATTERNS: &[&str] = &[
    "**/vendor/**",
    "**/node_modules/**",
    "**/.git/**",
    "**/storage/**",
    "**/dist/**",
    "**/build/**",
    "**/tmp/**",
    "**/temp/**",
    "**/.npm/**",
    "**/.yarn/**",
    "**/Library/**",
    "**/System/**",
    "**/.Trash/**",
    "**/.pampa/**",
    "**/pampa.codemap.json",
    "**/pampa.codemap.json.backup-*",
    "**/package-lock.json",
    "**/yarn.lock",
    "**/pnpm-lock.yaml",
    "**/*.json",
    "**/*.sh",
    "**/examples/**",
    "**/assets/**",
];

/// Get the global models cache directory (~/.pampax/models/).
///
/// This centralizes embedding model downloads so they are shared across all
/// indexed repositories instead of being duplicated per-project. The directory
/// is created if it does not exist.
pub fn get_global_models_cache_dir() -> anyhow::Result<PathBuf> {
    let base =
        dirs::home_dir().ok_or_else(|| anyhow::anyhow!("Could not determine home directory"))?;

    let models_dir = base.join(CONFIG_DIR_NAME).join(MODELS_SUBDIR);

    if !models_dir.exists() {
        std::fs::create_dir_all(&models_dir).map_err(|e| {
            anyhow::anyhow!(
                "Failed to create global models cache directory {}: {}",
                models_dir.display(),
                e
            )
        })?;
    }

    Ok(models_dir)
}
