#![allow(dead_code)] // not every test binary uses every helper

//! Test helpers for pampax integration tests.
//!
//! Provides a scratch repository builder and an AppContext wired to the
//! deterministic mock provider, so end-to-end runs need no network and
//! no model downloads.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use pampax::chunkstore::ChunkStore;
use pampax::config::Config;
use pampax::db::Database;
use pampax::index::IndexLayout;
use pampax::provider::mock::MockProvider;
use pampax::AppContext;
use tempfile::TempDir;

/// A scratch repository with a few source files in different languages.
pub struct TestRepo {
    /// Temporary directory containing the repository
    pub dir: TempDir,
    /// Canonicalized repository root
    pub path: PathBuf,
}

impl TestRepo {
    /// Create a repository with sample Rust, JavaScript and Python code.
    pub fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let path = dir.path().canonicalize().expect("canonicalize temp dir");

        let repo = Self { dir, path };
        repo.write(
            "src/lib.rs",
            r#"/// A simple function to add two numbers
pub fn add(a: i32, b: i32) -> i32 {
    a + b
}

/// A function to multiply two numbers
pub fn multiply(a: i32, b: i32) -> i32 {
    add(a, 0) * b
}

/// A struct to hold user data
pub struct User {
    pub name: String,
    pub age: u32,
}
"#,
        );
        repo.write(
            "src/utils.js",
            r#"// Utility function to format dates
function formatDate(date) {
    return date.toISOString();
}

// Function to validate email addresses
function validateEmail(email) {
    return /^[^\s@]+@[^\s@]+\.[^\s@]+$/.test(email);
}
"#,
        );
        repo.write(
            "lib/session.py",
            r#"class SessionManager:
    def __init__(self):
        self.sessions = {}

    def create_session(self, user_id):
        session_id = make_id()
        self.sessions[session_id] = user_id
        return session_id
"#,
        );
        repo
    }

    /// Create an empty repository.
    pub fn empty() -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let path = dir.path().canonicalize().expect("canonicalize temp dir");
        Self { dir, path }
    }

    /// Write a file under the repository root, creating parents.
    pub fn write(&self, rel: &str, content: &str) {
        let target = self.path.join(rel);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent dirs");
        }
        fs::write(target, content).expect("Failed to write test file");
    }

    /// Remove a file under the repository root.
    pub fn remove(&self, rel: &str) {
        fs::remove_file(self.path.join(rel)).expect("Failed to remove test file");
    }

    pub fn codemap_path(&self) -> PathBuf {
        self.path.join("pampa.codemap.json")
    }

    pub fn db_path(&self) -> PathBuf {
        self.path.join(".pampa").join("pampa.db")
    }

    pub fn chunks_dir(&self) -> PathBuf {
        self.path.join(".pampa").join("chunks")
    }
}

/// Build an AppContext over `root` using the mock provider.
pub fn mock_context(root: &Path) -> AppContext {
    mock_context_with_config(root, Config::default())
}

/// Same, with an explicit config (e.g. encryption enabled).
pub fn mock_context_with_config(root: &Path, config: Config) -> AppContext {
    let layout = IndexLayout::for_root(root);
    let key = config
        .encryption_key
        .as_deref()
        .map(|raw| pampax::chunkstore::MasterKey::parse(raw).expect("valid test key"));
    let store =
        ChunkStore::open(layout.chunks_dir, key, config.encrypt).expect("open chunk store");
    let db = Database::open(&layout.db_path).expect("open database");

    AppContext {
        config,
        db,
        store,
        provider: Arc::new(MockProvider::new(32)),
    }
}

/// A 32-byte test key in hex form.
pub fn test_key_hex() -> String {
    hex_encode((0u8..32).collect::<Vec<u8>>())
}

fn hex_encode(bytes: Vec<u8>) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
