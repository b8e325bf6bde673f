//! Codemap model and serializer.
//!
//! The codemap is the human-readable manifest mapping chunk IDs to chunk
//! metadata. Its byte layout is a contract shared with the Node and Go
//! implementations:
//!
//! - top-level keys appear in insertion order, never alphabetized
//! - each value object's keys appear in ascending lexicographic order
//!   (the struct below declares its fields in exactly that order, which
//!   is what the derive-based encoder emits)
//! - two-space indentation, LF newlines, trailing newline
//! - `symbol` is always present and `null` when absent; the five graph
//!   arrays are always present; `symbol_parameters` disappears entirely
//!   when empty; optional strings disappear when empty
//!
//! Entries are normalized before serialization: strings trimmed, arrays
//! deduplicated preserving first occurrence, `success_rate` clamped to
//! [0, 1], `path_weight` defaulted to 1.

use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::pathutil;

fn default_path_weight() -> f64 {
    1.0
}

/// Metadata for one chunk.
///
/// Field declaration order is load-bearing: it must stay ascending by the
/// serialized key name so the emitted object keys honour the contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodemapEntry {
    #[serde(rename = "chunkType", default, skip_serializing_if = "Option::is_none")]
    pub chunk_type: Option<String>,
    pub file: String,
    pub lang: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<String>,
    #[serde(default = "default_path_weight")]
    pub path_weight: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    pub sha: String,
    #[serde(default)]
    pub success_rate: f64,
    pub symbol: Option<String>,
    #[serde(default)]
    pub symbol_call_targets: Vec<String>,
    #[serde(default)]
    pub symbol_callers: Vec<String>,
    #[serde(default)]
    pub symbol_calls: Vec<String>,
    #[serde(default)]
    pub symbol_neighbors: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol_parameters: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol_return: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol_signature: Option<String>,
    #[serde(default)]
    pub synonyms: Vec<String>,
}

impl CodemapEntry {
    /// A minimal entry for the given location.
    pub fn new(file: impl Into<String>, lang: impl Into<String>, sha: impl Into<String>) -> Self {
        CodemapEntry {
            chunk_type: None,
            file: file.into(),
            lang: lang.into(),
            last_used_at: None,
            path_weight: 1.0,
            provider: None,
            sha: sha.into(),
            success_rate: 0.0,
            symbol: None,
            symbol_call_targets: Vec::new(),
            symbol_callers: Vec::new(),
            symbol_calls: Vec::new(),
            symbol_neighbors: Vec::new(),
            symbol_parameters: None,
            symbol_return: None,
            symbol_signature: None,
            synonyms: Vec::new(),
        }
    }

    /// Apply the serializer's normalization rules in place.
    pub fn normalize(&mut self) {
        self.file = pathutil::normalize_rel_path(self.file.trim());
        self.lang = self.lang.trim().to_string();
        self.sha = self.sha.trim().to_string();

        normalize_opt_string(&mut self.chunk_type);
        normalize_opt_string(&mut self.last_used_at);
        normalize_opt_string(&mut self.provider);
        normalize_opt_string(&mut self.symbol);
        normalize_opt_string(&mut self.symbol_return);
        normalize_opt_string(&mut self.symbol_signature);

        dedup_array(&mut self.symbol_call_targets);
        dedup_array(&mut self.symbol_callers);
        dedup_array(&mut self.symbol_calls);
        dedup_array(&mut self.symbol_neighbors);
        dedup_array(&mut self.synonyms);

        if let Some(params) = &mut self.symbol_parameters {
            dedup_array(params);
            if params.is_empty() {
                self.symbol_parameters = None;
            }
        }

        if !self.path_weight.is_finite() {
            self.path_weight = 1.0;
        }
        if !self.success_rate.is_finite() || self.success_rate < 0.0 {
            self.success_rate = 0.0;
        } else if self.success_rate > 1.0 {
            self.success_rate = 1.0;
        }
    }
}

fn normalize_opt_string(slot: &mut Option<String>) {
    if let Some(s) = slot {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            *slot = None;
        } else if trimmed.len() != s.len() {
            *slot = Some(trimmed.to_string());
        }
    }
}

/// Trim entries, drop empties, keep the first occurrence of duplicates.
fn dedup_array(values: &mut Vec<String>) {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::with_capacity(values.len());
    for v in values.drain(..) {
        let t = v.trim().to_string();
        if t.is_empty() {
            continue;
        }
        if seen.insert(t.clone()) {
            out.push(t);
        }
    }
    *values = out;
}

/// Insertion-ordered map of chunk ID to metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Codemap {
    entries: IndexMap<String, CodemapEntry>,
}

impl Codemap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entry, normalizing it first. Re-inserting an existing ID
    /// overwrites the value but keeps the original position.
    pub fn insert(&mut self, id: impl Into<String>, mut entry: CodemapEntry) {
        entry.normalize();
        self.entries.insert(id.into(), entry);
    }

    pub fn get(&self, id: &str) -> Option<&CodemapEntry> {
        self.entries.get(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &CodemapEntry)> {
        self.entries.iter()
    }

    /// Serialize to the contract bytes: two-space pretty JSON, LF only,
    /// trailing newline.
    pub fn to_json_bytes(&self) -> Result<Vec<u8>> {
        let mut text = serde_json::to_string_pretty(&self.entries)?;
        text.push('\n');
        Ok(text.into_bytes())
    }

    /// Parse codemap bytes, preserving top-level order.
    pub fn parse(text: &str) -> Result<Self> {
        let entries: IndexMap<String, CodemapEntry> = serde_json::from_str(text)?;
        Ok(Codemap { entries })
    }

    /// Load a codemap file; a missing file yields an empty map.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Codemap::new());
        }
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }

    /// Atomically replace the codemap file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let bytes = self.to_json_bytes()?;
        pathutil::atomic_write(path, &bytes)
    }
}

/// Codemap timestamp format: `YYYY-MM-DDTHH:MM:SS.sssZ`.
pub fn codemap_timestamp(t: chrono::DateTime<chrono::Utc>) -> String {
    t.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn entry(file: &str, symbol: Option<&str>) -> CodemapEntry {
        let mut e = CodemapEntry::new(file, "rust", "a".repeat(40));
        e.symbol = symbol.map(|s| s.to_string());
        e
    }

    #[test]
    fn test_top_level_insertion_order_preserved() {
        let mut map = Codemap::new();
        map.insert("z-chunk", entry("src/z.rs", Some("z")));
        map.insert("a-chunk", entry("src/a.rs", Some("a")));

        let text = String::from_utf8(map.to_json_bytes().unwrap()).unwrap();
        let z_pos = text.find("\"z-chunk\"").unwrap();
        let a_pos = text.find("\"a-chunk\"").unwrap();
        assert!(z_pos < a_pos, "insertion order must be preserved");
    }

    #[test]
    fn test_value_keys_are_lexicographic() {
        let mut map = Codemap::new();
        map.insert("only", entry("src/a.rs", Some("f")));

        let text = String::from_utf8(map.to_json_bytes().unwrap()).unwrap();
        let file_pos = text.find("\"file\"").unwrap();
        let lang_pos = text.find("\"lang\"").unwrap();
        let sha_pos = text.find("\"sha\"").unwrap();
        assert!(file_pos < lang_pos && lang_pos < sha_pos);

        // Full ordering check over the emitted keys of the value object.
        let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();
        let obj = parsed.get("only").unwrap().as_object().unwrap();
        let keys: Vec<&String> = obj.keys().collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
    }

    #[test]
    fn test_symbol_null_never_empty_string() {
        let mut map = Codemap::new();
        map.insert("anon", entry("src/a.rs", None));
        map.insert("empty", entry("src/b.rs", Some("   ")));

        let text = String::from_utf8(map.to_json_bytes().unwrap()).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert!(parsed["anon"]["symbol"].is_null());
        // Whitespace-only symbols normalize to null too.
        assert!(parsed["empty"]["symbol"].is_null());
    }

    #[test]
    fn test_always_present_arrays_and_omitted_parameters() {
        let mut map = Codemap::new();
        let mut e = entry("src/a.rs", Some("f"));
        e.symbol_parameters = Some(Vec::new());
        map.insert("c", e);

        let text = String::from_utf8(map.to_json_bytes().unwrap()).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();
        let obj = parsed.get("c").unwrap().as_object().unwrap();

        for key in [
            "synonyms",
            "symbol_calls",
            "symbol_call_targets",
            "symbol_callers",
            "symbol_neighbors",
        ] {
            assert!(obj.get(key).unwrap().is_array(), "{key} must be present");
        }
        assert!(!obj.contains_key("symbol_parameters"));

        // Optional strings absent when empty.
        assert!(!obj.contains_key("symbol_signature"));
        assert!(!obj.contains_key("chunkType"));
        assert!(!obj.contains_key("provider"));
        assert!(!obj.contains_key("last_used_at"));
    }

    #[test]
    fn test_parameters_present_when_nonempty() {
        let mut map = Codemap::new();
        let mut e = entry("src/a.rs", Some("f"));
        e.symbol_parameters = Some(vec!["a".into(), "b".into()]);
        map.insert("c", e);

        let text = String::from_utf8(map.to_json_bytes().unwrap()).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(
            parsed["c"]["symbol_parameters"],
            serde_json::json!(["a", "b"])
        );
    }

    #[test]
    fn test_numeric_normalization() {
        let mut map = Codemap::new();
        let mut e = entry("src/a.rs", Some("f"));
        e.success_rate = -0.5;
        map.insert("neg", e);

        let mut e = entry("src/b.rs", Some("g"));
        e.success_rate = 1.7;
        map.insert("big", e);

        assert_eq!(map.get("neg").unwrap().success_rate, 0.0);
        assert_eq!(map.get("big").unwrap().success_rate, 1.0);
        assert_eq!(map.get("neg").unwrap().path_weight, 1.0);
    }

    #[test]
    fn test_array_dedup_preserves_first_occurrence() {
        let mut map = Codemap::new();
        let mut e = entry("src/a.rs", Some("f"));
        e.synonyms = vec![
            "login".into(),
            " auth ".into(),
            "login".into(),
            "auth".into(),
            "  ".into(),
        ];
        map.insert("c", e);

        assert_eq!(map.get("c").unwrap().synonyms, vec!["login", "auth"]);
    }

    #[test]
    fn test_backslash_paths_normalized() {
        let mut map = Codemap::new();
        map.insert("c", entry("src\\win\\mod.rs", Some("f")));
        assert_eq!(map.get("c").unwrap().file, "src/win/mod.rs");
    }

    #[test]
    fn test_serialization_format() {
        let mut map = Codemap::new();
        map.insert("c", entry("src/a.rs", Some("f")));
        let bytes = map.to_json_bytes().unwrap();
        let text = std::str::from_utf8(&bytes).unwrap();

        assert!(text.ends_with("}\n"), "must end with a trailing newline");
        assert!(!text.contains('\r'), "LF only");
        assert!(text.contains("\n  \""), "two-space indentation");
    }

    #[test]
    fn test_roundtrip_is_byte_identical() {
        let mut map = Codemap::new();
        map.insert("z-chunk", entry("src/z.rs", Some("z")));
        let mut e = entry("src/a.rs", None);
        e.symbol_parameters = Some(vec!["x".into()]);
        e.symbol_signature = Some("fn a(x: u8)".into());
        e.synonyms = vec!["alpha".into()];
        map.insert("a-chunk", e);

        let first = map.to_json_bytes().unwrap();
        let reparsed = Codemap::parse(std::str::from_utf8(&first).unwrap()).unwrap();
        let second = reparsed.to_json_bytes().unwrap();
        assert_eq!(first, second);
        assert_eq!(map, reparsed);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pampa.codemap.json");

        let mut map = Codemap::new();
        map.insert("c", entry("src/a.rs", Some("f")));
        map.save(&path).unwrap();

        let loaded = Codemap::load(&path).unwrap();
        assert_eq!(map, loaded);

        // Missing file is an empty map, not an error.
        let empty = Codemap::load(&dir.path().join("nope.json")).unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn test_codemap_timestamp_format() {
        use chrono::TimeZone;
        let t = chrono::Utc.with_ymd_and_hms(2024, 3, 5, 7, 9, 11).unwrap();
        assert_eq!(codemap_timestamp(t), "2024-03-05T07:09:11.000Z");
    }
}
