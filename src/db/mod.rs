//! SQLite storage layer (schema v1, frozen).
//!
//! One writer, many readers, one process. The embedding column stores the
//! UTF-8 bytes of a compact JSON array of doubles; consumers re-parse it
//! and check the element count against `embedding_dimensions`.
//!
//! JSON-typed metadata columns are validated on write: a syntactically
//! invalid value (or one of the wrong shape) is warned about and stored as
//! NULL. A bad metadata field never aborts the containing insert.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use rusqlite::{params, Connection, OptionalExtension};
use tracing::warn;

use crate::error::{PampaxError, Result};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS code_chunks (
    id TEXT PRIMARY KEY,
    file_path TEXT NOT NULL,
    symbol TEXT NOT NULL DEFAULT '',
    sha TEXT NOT NULL,
    lang TEXT NOT NULL,
    chunk_type TEXT NOT NULL DEFAULT 'function',
    embedding BLOB,
    embedding_provider TEXT,
    embedding_dimensions INTEGER,
    pampa_tags TEXT,
    pampa_intent TEXT,
    pampa_description TEXT,
    doc_comments TEXT,
    variables_used TEXT,
    context_info TEXT,
    created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
    updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
);

CREATE INDEX IF NOT EXISTS idx_code_chunks_file_path ON code_chunks(file_path);
CREATE INDEX IF NOT EXISTS idx_code_chunks_symbol ON code_chunks(symbol);
CREATE INDEX IF NOT EXISTS idx_code_chunks_lang ON code_chunks(lang);
CREATE INDEX IF NOT EXISTS idx_code_chunks_provider ON code_chunks(embedding_provider);
CREATE INDEX IF NOT EXISTS idx_code_chunks_chunk_type ON code_chunks(chunk_type);
CREATE INDEX IF NOT EXISTS idx_code_chunks_tags ON code_chunks(pampa_tags);
CREATE INDEX IF NOT EXISTS idx_code_chunks_intent ON code_chunks(pampa_intent);
CREATE INDEX IF NOT EXISTS idx_code_chunks_lang_provider_dims
    ON code_chunks(lang, embedding_provider, embedding_dimensions);

CREATE TABLE IF NOT EXISTS intention_cache (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    original_query TEXT NOT NULL,
    normalized_query TEXT NOT NULL UNIQUE,
    target_sha TEXT NOT NULL,
    confidence REAL NOT NULL DEFAULT 1.0,
    usage_count INTEGER NOT NULL DEFAULT 1,
    created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
    last_used_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
);

CREATE INDEX IF NOT EXISTS idx_intention_cache_query ON intention_cache(normalized_query);
CREATE INDEX IF NOT EXISTS idx_intention_cache_sha ON intention_cache(target_sha);

CREATE TABLE IF NOT EXISTS query_patterns (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    pattern TEXT NOT NULL UNIQUE,
    frequency INTEGER NOT NULL DEFAULT 1,
    last_used_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
);

CREATE INDEX IF NOT EXISTS idx_query_patterns_pattern ON query_patterns(pattern);
"#;

/// Encode an embedding vector as the BLOB contract bytes.
///
/// Compact JSON, no whitespace, shortest round-trip float formatting.
/// Non-finite values are rejected before they can poison the column.
pub fn encode_embedding(vector: &[f64]) -> Result<Vec<u8>> {
    if let Some(bad) = vector.iter().find(|v| !v.is_finite()) {
        return Err(PampaxError::Embedding(format!(
            "embedding contains non-finite value {bad}"
        )));
    }
    Ok(serde_json::to_vec(vector)?)
}

/// Decode a BLOB back into a vector, verifying the dimension contract.
pub fn decode_embedding(blob: &[u8], expected_dims: Option<usize>) -> Result<Vec<f64>> {
    let text = std::str::from_utf8(blob)
        .map_err(|_| PampaxError::Db("embedding blob is not UTF-8".to_string()))?;
    let vector: Vec<f64> = serde_json::from_str(text)
        .map_err(|e| PampaxError::Db(format!("embedding blob is not a JSON number array: {e}")))?;
    if let Some(dims) = expected_dims {
        if vector.len() != dims {
            return Err(PampaxError::Db(format!(
                "embedding has {} elements, expected {dims}",
                vector.len()
            )));
        }
    }
    Ok(vector)
}

/// A chunk row ready for insertion.
///
/// JSON-typed fields arrive as raw JSON text and are shape-validated at
/// write time; `symbol` is the empty string when the chunk has none.
#[derive(Debug, Clone, Default)]
pub struct ChunkRecord {
    pub id: String,
    pub file_path: String,
    pub symbol: String,
    pub sha: String,
    pub lang: String,
    pub chunk_type: String,
    pub embedding: Option<Vec<f64>>,
    pub embedding_provider: Option<String>,
    pub embedding_dimensions: Option<usize>,
    pub pampa_tags: Option<String>,
    pub pampa_intent: Option<String>,
    pub pampa_description: Option<String>,
    pub doc_comments: Option<String>,
    pub variables_used: Option<String>,
    pub context_info: Option<String>,
}

/// A chunk row as read back for search.
#[derive(Debug, Clone)]
pub struct StoredChunk {
    pub id: String,
    pub file_path: String,
    pub symbol: String,
    pub sha: String,
    pub lang: String,
    pub chunk_type: String,
    pub embedding: Option<Vec<f64>>,
    pub embedding_provider: Option<String>,
    pub embedding_dimensions: Option<usize>,
    pub tags: Vec<String>,
    pub intent: Option<String>,
    pub description: Option<String>,
    pub doc_comments: Option<String>,
    pub variables_used: Vec<String>,
    pub context_info: Option<serde_json::Value>,
}

impl StoredChunk {
    /// Line range recorded by the indexer inside `context_info`.
    pub fn line_range(&self) -> Option<(u32, u32)> {
        let info = self.context_info.as_ref()?;
        let start = info.get("start_line")?.as_u64()?;
        let end = info.get("end_line")?.as_u64()?;
        Some((start as u32, end as u32))
    }
}

/// A JSON field that failed validation and was stored as NULL.
#[derive(Debug, Clone, serde::Serialize)]
pub struct FieldWarning {
    pub chunk_id: String,
    pub field: &'static str,
    pub message: String,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct DbStats {
    pub chunks: usize,
    pub files: usize,
    pub languages: Vec<(String, usize)>,
    pub providers: Vec<(String, usize, Option<usize>)>,
}

/// A cached intention entry (normalized query -> chunk SHA).
#[derive(Debug, Clone)]
pub struct IntentionHit {
    pub target_sha: String,
    pub confidence: f64,
    pub usage_count: i64,
}

/// Single-connection SQLite database for one repository index.
pub struct Database {
    conn: Connection,
    path: PathBuf,
}

impl Database {
    /// Open or create the database at `path`.
    ///
    /// Creation pragmas are applied before the schema so `page_size`
    /// takes effect on fresh files; existing databases keep whatever page
    /// size they were created with and remain readable.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let is_new = !path.exists();
        let conn = Connection::open(path)?;

        if is_new {
            conn.pragma_update(None, "page_size", 4096)?;
            conn.pragma_update(None, "encoding", "UTF-8")?;
        }
        // journal_mode returns the resulting mode as a row.
        let _mode: String =
            conn.query_row("PRAGMA journal_mode=delete", [], |row| row.get(0))?;
        conn.pragma_update(None, "foreign_keys", false)?;

        conn.execute_batch(SCHEMA)?;

        Ok(Self {
            conn,
            path: path.to_path_buf(),
        })
    }

    /// Open an in-memory database (tests).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn,
            path: PathBuf::from(":memory:"),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Validate a JSON-typed field, downgrading bad values to NULL.
    ///
    /// `expect_array`/`expect_object` pick the accepted shape. The empty
    /// string is not a JSON value and is treated as invalid.
    fn validate_json_field(
        chunk_id: &str,
        field: &'static str,
        value: Option<&str>,
        expect_array: bool,
        warnings: &mut Vec<FieldWarning>,
    ) -> Option<String> {
        let raw = value?;
        let fail = |msg: String, warnings: &mut Vec<FieldWarning>| {
            warn!(chunk = chunk_id, field, "{msg}");
            warnings.push(FieldWarning {
                chunk_id: chunk_id.to_string(),
                field,
                message: msg,
            });
            None
        };

        if raw.is_empty() {
            return fail("empty string is not valid JSON, storing NULL".to_string(), warnings);
        }
        match serde_json::from_str::<serde_json::Value>(raw) {
            Ok(serde_json::Value::Array(_)) if expect_array => Some(raw.to_string()),
            Ok(serde_json::Value::Object(_)) if !expect_array => Some(raw.to_string()),
            Ok(other) => fail(
                format!(
                    "expected JSON {}, got {}, storing NULL",
                    if expect_array { "array" } else { "object" },
                    json_kind(&other)
                ),
                warnings,
            ),
            Err(e) => fail(format!("invalid JSON ({e}), storing NULL"), warnings),
        }
    }

    /// Upsert a single chunk row. Returns warnings for skipped fields.
    pub fn insert_chunk(&self, rec: &ChunkRecord) -> Result<Vec<FieldWarning>> {
        let mut warnings = Vec::new();
        let tags = Self::validate_json_field(
            &rec.id,
            "pampa_tags",
            rec.pampa_tags.as_deref(),
            true,
            &mut warnings,
        );
        let variables = Self::validate_json_field(
            &rec.id,
            "variables_used",
            rec.variables_used.as_deref(),
            true,
            &mut warnings,
        );
        let context = Self::validate_json_field(
            &rec.id,
            "context_info",
            rec.context_info.as_deref(),
            false,
            &mut warnings,
        );

        let blob = match &rec.embedding {
            Some(v) => Some(encode_embedding(v)?),
            None => None,
        };

        self.conn.execute(
            "INSERT INTO code_chunks (
                 id, file_path, symbol, sha, lang, chunk_type,
                 embedding, embedding_provider, embedding_dimensions,
                 pampa_tags, pampa_intent, pampa_description,
                 doc_comments, variables_used, context_info
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
             ON CONFLICT(id) DO UPDATE SET
                 file_path = excluded.file_path,
                 symbol = excluded.symbol,
                 sha = excluded.sha,
                 lang = excluded.lang,
                 chunk_type = excluded.chunk_type,
                 embedding = excluded.embedding,
                 embedding_provider = excluded.embedding_provider,
                 embedding_dimensions = excluded.embedding_dimensions,
                 pampa_tags = excluded.pampa_tags,
                 pampa_intent = excluded.pampa_intent,
                 pampa_description = excluded.pampa_description,
                 doc_comments = excluded.doc_comments,
                 variables_used = excluded.variables_used,
                 context_info = excluded.context_info,
                 updated_at = CURRENT_TIMESTAMP",
            params![
                rec.id,
                rec.file_path,
                rec.symbol,
                rec.sha,
                rec.lang,
                rec.chunk_type,
                blob,
                rec.embedding_provider,
                rec.embedding_dimensions.map(|d| d as i64),
                tags,
                rec.pampa_intent,
                rec.pampa_description,
                rec.doc_comments,
                variables,
                context,
            ],
        )?;

        Ok(warnings)
    }

    /// Insert a whole run's rows inside one transaction, then delete rows
    /// whose ids are no longer part of the run.
    pub fn commit_run(
        &mut self,
        records: &[ChunkRecord],
    ) -> Result<(Vec<FieldWarning>, usize)> {
        // unchecked_transaction keeps the connection borrowable through
        // &self for the shared insert path; commit or rollback covers the lot.
        let tx = self.conn.unchecked_transaction()?;
        let mut warnings = Vec::new();

        for rec in records {
            warnings.extend(self.insert_chunk(rec)?);
        }

        let keep: HashSet<&str> = records.iter().map(|r| r.id.as_str()).collect();
        let existing: Vec<String> = {
            let mut stmt = self.conn.prepare("SELECT id FROM code_chunks")?;
            let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
            rows.collect::<std::result::Result<Vec<_>, _>>()?
        };
        let stale: Vec<&String> = existing
            .iter()
            .filter(|id| !keep.contains(id.as_str()))
            .collect();
        for id in &stale {
            self.conn
                .execute("DELETE FROM code_chunks WHERE id = ?1", params![id])?;
        }
        let removed = stale.len();

        tx.commit()?;
        Ok((warnings, removed))
    }

    /// Load every chunk row, decoding embeddings.
    ///
    /// A row whose blob fails the dimension check is returned without an
    /// embedding (and logged) rather than failing the whole load.
    pub fn all_chunks(&self) -> Result<Vec<StoredChunk>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, file_path, symbol, sha, lang, chunk_type,
                    embedding, embedding_provider, embedding_dimensions,
                    pampa_tags, pampa_intent, pampa_description,
                    doc_comments, variables_used, context_info
             FROM code_chunks
             ORDER BY file_path, id",
        )?;

        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, Option<Vec<u8>>>(6)?,
                row.get::<_, Option<String>>(7)?,
                row.get::<_, Option<i64>>(8)?,
                row.get::<_, Option<String>>(9)?,
                row.get::<_, Option<String>>(10)?,
                row.get::<_, Option<String>>(11)?,
                row.get::<_, Option<String>>(12)?,
                row.get::<_, Option<String>>(13)?,
                row.get::<_, Option<String>>(14)?,
            ))
        })?;

        let mut chunks = Vec::new();
        for row in rows {
            let (
                id,
                file_path,
                symbol,
                sha,
                lang,
                chunk_type,
                blob,
                provider,
                dims,
                tags,
                intent,
                description,
                doc_comments,
                variables,
                context,
            ) = row?;

            let dims = dims.map(|d| d as usize);
            let embedding = match blob {
                Some(bytes) => match decode_embedding(&bytes, dims) {
                    Ok(v) => Some(v),
                    Err(e) => {
                        warn!(chunk = %id, "dropping undecodable embedding: {e}");
                        None
                    }
                },
                None => None,
            };

            chunks.push(StoredChunk {
                id,
                file_path,
                symbol,
                sha,
                lang,
                chunk_type,
                embedding,
                embedding_provider: provider,
                embedding_dimensions: dims,
                tags: parse_string_array(tags.as_deref()),
                intent,
                description,
                doc_comments,
                variables_used: parse_string_array(variables.as_deref()),
                context_info: context.and_then(|c| serde_json::from_str(&c).ok()),
            });
        }
        Ok(chunks)
    }

    /// SHAs referenced by any chunk row (for orphan cleanup).
    pub fn referenced_shas(&self) -> Result<HashSet<String>> {
        let mut stmt = self.conn.prepare("SELECT DISTINCT sha FROM code_chunks")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut shas = HashSet::new();
        for row in rows {
            shas.insert(row?);
        }
        Ok(shas)
    }

    pub fn chunk_count(&self) -> Result<usize> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM code_chunks", [], |row| row.get(0))?;
        Ok(n as usize)
    }

    pub fn stats(&self) -> Result<DbStats> {
        let chunks = self.chunk_count()?;
        let files: i64 = self.conn.query_row(
            "SELECT COUNT(DISTINCT file_path) FROM code_chunks",
            [],
            |row| row.get(0),
        )?;

        let mut languages = Vec::new();
        {
            let mut stmt = self.conn.prepare(
                "SELECT lang, COUNT(*) FROM code_chunks GROUP BY lang ORDER BY lang",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as usize))
            })?;
            for row in rows {
                languages.push(row?);
            }
        }

        let mut providers = Vec::new();
        {
            let mut stmt = self.conn.prepare(
                "SELECT embedding_provider, COUNT(*), embedding_dimensions
                 FROM code_chunks
                 WHERE embedding_provider IS NOT NULL
                 GROUP BY embedding_provider, embedding_dimensions
                 ORDER BY embedding_provider",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)? as usize,
                    row.get::<_, Option<i64>>(2)?.map(|d| d as usize),
                ))
            })?;
            for row in rows {
                providers.push(row?);
            }
        }

        Ok(DbStats {
            chunks,
            files: files as usize,
            languages,
            providers,
        })
    }

    // --- learning signals -------------------------------------------------

    /// Bump the frequency counter for a search pattern.
    pub fn record_query_pattern(&self, pattern: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO query_patterns (pattern, frequency)
             VALUES (?1, 1)
             ON CONFLICT(pattern) DO UPDATE SET
                 frequency = frequency + 1,
                 last_used_at = CURRENT_TIMESTAMP",
            params![pattern],
        )?;
        Ok(())
    }

    /// Look up a cached intention for a normalized query.
    pub fn intention_for(&self, normalized_query: &str) -> Result<Option<IntentionHit>> {
        let hit = self
            .conn
            .query_row(
                "SELECT target_sha, confidence, usage_count
                 FROM intention_cache WHERE normalized_query = ?1",
                params![normalized_query],
                |row| {
                    Ok(IntentionHit {
                        target_sha: row.get(0)?,
                        confidence: row.get(1)?,
                        usage_count: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(hit)
    }

    /// Record (or reinforce) an intention mapping.
    pub fn upsert_intention(
        &self,
        original_query: &str,
        normalized_query: &str,
        target_sha: &str,
        confidence: f64,
    ) -> Result<()> {
        self.conn.execute(
            "INSERT INTO intention_cache
                 (original_query, normalized_query, target_sha, confidence)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(normalized_query) DO UPDATE SET
                 target_sha = excluded.target_sha,
                 confidence = excluded.confidence,
                 usage_count = usage_count + 1,
                 last_used_at = CURRENT_TIMESTAMP",
            params![original_query, normalized_query, target_sha, confidence],
        )?;
        Ok(())
    }
}

fn parse_string_array(raw: Option<&str>) -> Vec<String> {
    raw.and_then(|r| serde_json::from_str::<Vec<String>>(r).ok())
        .unwrap_or_default()
}

fn json_kind(v: &serde_json::Value) -> &'static str {
    match v {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, sha: &str) -> ChunkRecord {
        ChunkRecord {
            id: id.to_string(),
            file_path: "src/app.rs".to_string(),
            symbol: "handle".to_string(),
            sha: sha.to_string(),
            lang: "rust".to_string(),
            chunk_type: "function".to_string(),
            embedding: Some(vec![0.25, -0.5, 0.125]),
            embedding_provider: Some("mock".to_string()),
            embedding_dimensions: Some(3),
            pampa_tags: Some(r#"["auth","api"]"#.to_string()),
            pampa_intent: Some("handle requests".to_string()),
            pampa_description: None,
            doc_comments: None,
            variables_used: Some(r#"["req","ctx"]"#.to_string()),
            context_info: Some(r#"{"start_line":1,"end_line":9}"#.to_string()),
        }
    }

    #[test]
    fn test_encode_embedding_compact() {
        let blob = encode_embedding(&[0.25, -0.5, 1.0]).unwrap();
        assert_eq!(std::str::from_utf8(&blob).unwrap(), "[0.25,-0.5,1.0]");
    }

    #[test]
    fn test_encode_embedding_rejects_non_finite() {
        assert!(encode_embedding(&[f64::NAN]).is_err());
        assert!(encode_embedding(&[f64::INFINITY]).is_err());
        assert!(encode_embedding(&[f64::NEG_INFINITY]).is_err());
    }

    #[test]
    fn test_decode_embedding_checks_dimensions() {
        let blob = encode_embedding(&[1.0, 2.0]).unwrap();
        assert_eq!(decode_embedding(&blob, Some(2)).unwrap(), vec![1.0, 2.0]);
        assert!(decode_embedding(&blob, Some(3)).is_err());
        assert!(decode_embedding(b"not json", None).is_err());
    }

    #[test]
    fn test_embedding_roundtrip_preserves_values() {
        let v = vec![0.123456789, -1.5e-7, 42.0, 0.1 + 0.2];
        let blob = encode_embedding(&v).unwrap();
        assert_eq!(decode_embedding(&blob, Some(4)).unwrap(), v);
    }

    #[test]
    fn test_insert_and_read_back() {
        let db = Database::open_in_memory().unwrap();
        let warnings = db.insert_chunk(&record("src/app.rs:handle:abcd1234", "a".repeat(40).as_str())).unwrap();
        assert!(warnings.is_empty());

        let chunks = db.all_chunks().unwrap();
        assert_eq!(chunks.len(), 1);
        let c = &chunks[0];
        assert_eq!(c.symbol, "handle");
        assert_eq!(c.embedding.as_ref().unwrap().len(), 3);
        assert_eq!(c.tags, vec!["auth", "api"]);
        assert_eq!(c.line_range(), Some((1, 9)));
    }

    #[test]
    fn test_invalid_json_field_warns_and_stores_null() {
        let db = Database::open_in_memory().unwrap();
        let mut rec = record("id1", &"b".repeat(40));
        rec.pampa_tags = Some("{not json".to_string());
        rec.context_info = Some(r#"["wrong","shape"]"#.to_string());
        rec.variables_used = Some(String::new());

        let warnings = db.insert_chunk(&rec).unwrap();
        assert_eq!(warnings.len(), 3);

        // The insert itself survives, with the bad fields nulled out.
        let chunks = db.all_chunks().unwrap();
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].tags.is_empty());
        assert!(chunks[0].context_info.is_none());
        assert!(chunks[0].variables_used.is_empty());
    }

    #[test]
    fn test_upsert_overwrites_same_id() {
        let db = Database::open_in_memory().unwrap();
        let mut rec = record("same-id", &"c".repeat(40));
        db.insert_chunk(&rec).unwrap();

        rec.symbol = "renamed".to_string();
        db.insert_chunk(&rec).unwrap();

        let chunks = db.all_chunks().unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].symbol, "renamed");
    }

    #[test]
    fn test_commit_run_removes_stale_rows() {
        let mut db = Database::open_in_memory().unwrap();
        db.insert_chunk(&record("old-id", &"d".repeat(40))).unwrap();

        let (warnings, removed) = db.commit_run(&[record("new-id", &"e".repeat(40))]).unwrap();
        assert!(warnings.is_empty());
        assert_eq!(removed, 1);

        let ids: Vec<String> = db.all_chunks().unwrap().into_iter().map(|c| c.id).collect();
        assert_eq!(ids, vec!["new-id"]);
    }

    #[test]
    fn test_empty_symbol_is_stored_not_null() {
        let db = Database::open_in_memory().unwrap();
        let mut rec = record("no-symbol", &"f".repeat(40));
        rec.symbol = String::new();
        db.insert_chunk(&rec).unwrap();

        let chunks = db.all_chunks().unwrap();
        assert_eq!(chunks[0].symbol, "");
    }

    #[test]
    fn test_query_patterns_frequency() {
        let db = Database::open_in_memory().unwrap();
        db.record_query_pattern("auth flow").unwrap();
        db.record_query_pattern("auth flow").unwrap();
        db.record_query_pattern("other").unwrap();

        let freq: i64 = db
            .conn
            .query_row(
                "SELECT frequency FROM query_patterns WHERE pattern = 'auth flow'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(freq, 2);
    }

    #[test]
    fn test_intention_cache_roundtrip() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.intention_for("find auth").unwrap().is_none());

        db.upsert_intention("Find Auth!", "find auth", &"a".repeat(40), 0.9)
            .unwrap();
        let hit = db.intention_for("find auth").unwrap().unwrap();
        assert_eq!(hit.target_sha, "a".repeat(40));
        assert!((hit.confidence - 0.9).abs() < 1e-9);
        assert_eq!(hit.usage_count, 1);

        db.upsert_intention("find auth", "find auth", &"a".repeat(40), 0.95)
            .unwrap();
        let hit = db.intention_for("find auth").unwrap().unwrap();
        assert_eq!(hit.usage_count, 2);
    }

    #[test]
    fn test_open_sets_pragmas_on_fresh_db() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pampa.db");
        let db = Database::open(&path).unwrap();

        let page_size: i64 = db
            .conn
            .query_row("PRAGMA page_size", [], |row| row.get(0))
            .unwrap();
        assert_eq!(page_size, 4096);

        let journal: String = db
            .conn
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap();
        assert_eq!(journal.to_lowercase(), "delete");

        let fk: i64 = db
            .conn
            .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
            .unwrap();
        assert_eq!(fk, 0);
    }

    #[test]
    fn test_timestamps_use_sqlite_default_format() {
        let db = Database::open_in_memory().unwrap();
        db.insert_chunk(&record("ts-check", &"0".repeat(40))).unwrap();

        let created: String = db
            .conn
            .query_row(
                "SELECT created_at FROM code_chunks WHERE id = 'ts-check'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        // YYYY-MM-DD HH:MM:SS, UTC, no trailing Z.
        assert_eq!(created.len(), 19);
        assert_eq!(created.as_bytes()[10], b' ');
        assert!(!created.ends_with('Z'));
    }
}
