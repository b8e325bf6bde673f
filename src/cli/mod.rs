//! CLI surface and command handlers.
//!
//! Every command writes a single JSON object to stdout: the
//! command-specific result on success, `{"error":{code,message,hint}}`
//! on failure. Logs and progress go to stderr so the envelope stays
//! machine-readable.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::chunkstore::{ChunkStore, MasterKey};
use crate::config::{Config, ProviderChoice};
use crate::db::Database;
use crate::error::{PampaxError, Result};
use crate::index::{self, IndexLayout};
use crate::provider;
use crate::search::{self, RerankerKind, SearchOptions};
use crate::AppContext;

/// pampax - local semantic code indexing with hybrid search
#[derive(Debug, Parser)]
#[command(name = "pampax", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Human-readable console logging instead of JSON lines
    #[arg(long, global = true)]
    pub pretty: bool,

    /// Suppress progress output on stderr
    #[arg(long, global = true)]
    pub quiet: bool,
}

/// Explicit on/off toggles for search features.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Toggle {
    On,
    Off,
}

impl Toggle {
    fn as_bool(self) -> bool {
        matches!(self, Toggle::On)
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Index a repository (full walk, chunk, embed, persist)
    Index {
        /// Repository root (defaults to the current directory)
        path: Option<PathBuf>,
        #[command(flatten)]
        common: CommonArgs,
    },
    /// Re-index a repository (full reindex in v1)
    Update {
        path: Option<PathBuf>,
        #[command(flatten)]
        common: CommonArgs,
    },
    /// Search the index
    Search {
        /// Natural-language or identifier query
        query: String,
        /// Repository root (defaults to the current directory)
        path: Option<PathBuf>,
        #[command(flatten)]
        common: CommonArgs,
        /// Maximum number of results
        #[arg(long, alias = "top", default_value_t = crate::constants::DEFAULT_SEARCH_LIMIT)]
        limit: usize,
        /// Restrict to languages (repeatable)
        #[arg(long)]
        lang: Vec<String>,
        /// Restrict to paths matching these globs (repeatable)
        #[arg(long)]
        path_glob: Vec<String>,
        /// Require these tags (repeatable)
        #[arg(long)]
        tags: Vec<String>,
        /// Fuse BM25 and vector rankings (default on)
        #[arg(long, value_enum)]
        hybrid: Option<Toggle>,
        /// Lexical BM25 scoring (default on)
        #[arg(long, value_enum)]
        bm25: Option<Toggle>,
        /// Symbol/tag boosting (default on)
        #[arg(long, value_enum)]
        symbol_boost: Option<Toggle>,
        /// Reranker: off, transformers, or api
        #[arg(long, default_value = "off")]
        reranker: String,
    },
    /// Show project and index statistics
    Info {
        path: Option<PathBuf>,
    },
}

/// Flags shared by the commands that touch the provider or the store.
#[derive(Debug, clap::Args)]
pub struct CommonArgs {
    /// Embedding provider: auto, openai, cohere, ollama, local
    #[arg(long)]
    pub provider: Option<String>,

    /// 32-byte master key (base64 or hex); overrides PAMPAX_ENCRYPTION_KEY
    #[arg(long)]
    pub encryption_key: Option<String>,

    /// Write chunk files encrypted
    #[arg(long, value_enum)]
    pub encrypt: Option<Toggle>,
}

/// Execute a parsed CLI invocation; returns the process exit code.
pub async fn execute(cli: Cli) -> i32 {
    let outcome = dispatch(cli).await;
    match outcome {
        Ok(value) => {
            println!("{}", value);
            0
        }
        Err(err) => {
            emit_error(&err);
            1
        }
    }
}

/// Print the error envelope to stdout.
pub fn emit_error(err: &PampaxError) {
    let envelope = json!({
        "error": {
            "code": err.code().as_str(),
            "message": err.to_string(),
            "hint": err.hint(),
        }
    });
    println!("{}", envelope);
}

async fn dispatch(cli: Cli) -> Result<serde_json::Value> {
    match cli.command {
        Command::Index { path, common } => run_index_command(path, common).await,
        Command::Update { path, common } => run_index_command(path, common).await,
        Command::Search {
            query,
            path,
            common,
            limit,
            lang,
            path_glob,
            tags,
            hybrid,
            bm25,
            symbol_boost,
            reranker,
        } => {
            let reranker = RerankerKind::parse(&reranker).ok_or_else(|| {
                PampaxError::InvalidInput(format!(
                    "unknown reranker {reranker:?} (expected off, transformers, or api)"
                ))
            })?;
            let options = SearchOptions {
                limit,
                path_glob,
                langs: lang,
                tags,
                hybrid: hybrid.map(Toggle::as_bool).unwrap_or(true),
                bm25: bm25.map(Toggle::as_bool).unwrap_or(true),
                symbol_boost: symbol_boost.map(Toggle::as_bool).unwrap_or(true),
                reranker,
            };
            run_search_command(query, path, common, options).await
        }
        Command::Info { path } => run_info_command(path),
    }
}

fn resolve_root(path: Option<PathBuf>) -> Result<PathBuf> {
    let root = path.unwrap_or_else(|| PathBuf::from("."));
    root.canonicalize().map_err(|_| {
        PampaxError::InvalidInput(format!("{} does not exist", root.display()))
    })
}

/// Layer CLI flags over the environment config.
fn resolve_config(common: &CommonArgs) -> Result<Config> {
    let mut config = Config::from_env();
    if let Some(provider) = &common.provider {
        config.provider = ProviderChoice::parse(provider).ok_or_else(|| {
            PampaxError::InvalidInput(format!(
                "unknown provider {provider:?} (expected auto, openai, cohere, ollama, local)"
            ))
        })?;
    }
    if let Some(key) = &common.encryption_key {
        config.encryption_key = Some(key.clone());
    }
    if let Some(toggle) = common.encrypt {
        config.encrypt = toggle.as_bool();
    }
    Ok(config)
}

fn build_context(root: &Path, config: Config, require_index: bool) -> Result<AppContext> {
    let layout = IndexLayout::for_root(root);
    if require_index && !layout.db_path.exists() {
        return Err(PampaxError::IndexMissing(root.to_path_buf()));
    }

    let key = match &config.encryption_key {
        Some(raw) => Some(MasterKey::parse(raw)?),
        None => None,
    };
    let store = ChunkStore::open(layout.chunks_dir, key, config.encrypt)?;
    let db = Database::open(&layout.db_path)?;
    let provider: Arc<dyn provider::EmbeddingProvider> = provider::create_provider(&config)?;

    Ok(AppContext {
        config,
        db,
        store,
        provider,
    })
}

async fn run_index_command(
    path: Option<PathBuf>,
    common: CommonArgs,
) -> Result<serde_json::Value> {
    let root = resolve_root(path)?;
    let config = resolve_config(&common)?;
    let mut ctx = build_context(&root, config, false)?;

    let cancel = CancellationToken::new();
    let summary = index::run_index(&mut ctx, &root, &cancel).await?;

    Ok(serde_json::to_value(&summary)?)
}

async fn run_search_command(
    query: String,
    path: Option<PathBuf>,
    common: CommonArgs,
    options: SearchOptions,
) -> Result<serde_json::Value> {
    let root = resolve_root(path)?;
    let config = resolve_config(&common)?;
    let ctx = build_context(&root, config, true)?;

    let outcome = search::search(&ctx, &query, &options).await?;

    Ok(json!({
        "query": query,
        "results": outcome.results,
        "total": outcome.results.len(),
        "filters": {
            "lang": options.langs,
            "path_glob": options.path_glob,
            "tags": options.tags,
            "hybrid": options.hybrid,
            "bm25": options.bm25,
            "symbol_boost": options.symbol_boost,
        },
        "warnings": outcome.warnings,
    }))
}

fn run_info_command(path: Option<PathBuf>) -> Result<serde_json::Value> {
    let root = resolve_root(path)?;
    let layout = IndexLayout::for_root(&root);
    if !layout.db_path.exists() {
        return Err(PampaxError::IndexMissing(root));
    }

    let db = Database::open(&layout.db_path)?;
    let stats = db.stats()?;

    // No key needed to enumerate the store.
    let store = ChunkStore::open(layout.chunks_dir.clone(), None, false)?;
    let shas = store.list_shas()?;
    let encrypted_present = shas
        .iter()
        .any(|sha| layout.chunks_dir.join(format!("{sha}.gz.enc")).exists());

    Ok(json!({
        "project": {
            "root": root.display().to_string(),
            "db_path": layout.db_path.display().to_string(),
            "codemap_path": layout.codemap_path.display().to_string(),
            "chunk_files": shas.len(),
            "encrypted": encrypted_present,
        },
        "stats": {
            "chunks": stats.chunks,
            "files": stats.files,
            "languages": stats.languages.iter()
                .map(|(lang, n)| json!({"lang": lang, "chunks": n}))
                .collect::<Vec<_>>(),
            "providers": stats.providers.iter()
                .map(|(name, n, dims)| json!({"provider": name, "chunks": n, "dimensions": dims}))
                .collect::<Vec<_>>(),
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_parses() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_search_flags() {
        let cli = Cli::parse_from([
            "pampax", "search", "auth flow", "--limit", "5", "--lang", "rust",
            "--hybrid", "off", "--bm25", "on", "--reranker", "off",
        ]);
        match cli.command {
            Command::Search {
                query,
                limit,
                lang,
                hybrid,
                bm25,
                ..
            } => {
                assert_eq!(query, "auth flow");
                assert_eq!(limit, 5);
                assert_eq!(lang, vec!["rust"]);
                assert_eq!(hybrid, Some(Toggle::Off));
                assert_eq!(bm25, Some(Toggle::On));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_top_alias_for_limit() {
        let cli = Cli::parse_from(["pampax", "search", "q", "--top", "3"]);
        match cli.command {
            Command::Search { limit, .. } => assert_eq!(limit, 3),
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_unknown_reranker_is_invalid_input() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let cli = Cli::parse_from(["pampax", "search", "q", "--reranker", "banana"]);
        let err = runtime.block_on(dispatch(cli)).unwrap_err();
        assert_eq!(err.code().as_str(), "INVALID_INPUT");
    }

    #[test]
    fn test_info_without_index_is_index_missing() {
        let dir = tempfile::tempdir().unwrap();
        let err = run_info_command(Some(dir.path().to_path_buf())).unwrap_err();
        assert_eq!(err.code().as_str(), "INDEX_MISSING");
    }
}
