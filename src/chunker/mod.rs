//! Language detection and deterministic symbol-aware chunking.
//!
//! The splitter is line-oriented: declaration regexes open a symbol chunk
//! whose extent is tracked by brace depth (or indentation for Python-like
//! languages); leftover regions between symbols become generated chunks
//! (`group_N`, `section_*`, `assignment`). Chunk text is always a
//! byte-exact slice of the file, so the SHA-1 over a chunk's UTF-8 bytes
//! is reproducible across runs and platforms.
//!
//! The rest of the system treats this module as a black box; the only
//! hard requirement is determinism for identical input.

mod languages;
mod meta;

pub use languages::{language_for_extension, language_for_path, supported_extensions};
pub use meta::SymbolMeta;

use crate::chunkstore::sha1_hex;

/// One chunk of a source file.
#[derive(Debug, Clone)]
pub struct Chunk {
    /// Byte-exact slice of the file content.
    pub text: String,
    /// Declared symbol name, when the chunk has one.
    pub symbol: Option<String>,
    /// Identifier used in the chunk ID: the symbol, or a generated id.
    pub name: String,
    /// Chunk classification ("function", "class", "block", ...).
    pub chunk_type: String,
    pub lang: &'static str,
    /// 1-based inclusive line range within the file.
    pub start_line: u32,
    pub end_line: u32,
    /// SHA-1 over the chunk's exact UTF-8 bytes.
    pub sha: String,
    pub meta: SymbolMeta,
}

impl Chunk {
    /// Composite chunk ID: `{relpath}:{symbol-or-generated}:{sha8}`.
    pub fn id(&self, rel_path: &str) -> String {
        format!("{rel_path}:{}:{}", self.name, &self.sha[..8])
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum BlockStyle {
    Braces,
    Indent,
}

fn block_style(lang: &str) -> BlockStyle {
    match lang {
        "python" => BlockStyle::Indent,
        _ => BlockStyle::Braces,
    }
}

/// Split one file into chunks.
///
/// Deterministic for identical input: the same file always yields the
/// same chunk list, names and SHAs.
pub fn chunk_file(lang: &'static str, content: &str) -> Vec<Chunk> {
    if content.is_empty() {
        return Vec::new();
    }

    let lines = split_lines(content);
    let decls = languages::declarations(lang);
    let style = block_style(lang);

    // Pass 1: locate symbol chunks as line ranges.
    let mut regions: Vec<SymbolRegion> = Vec::new();
    let mut line = 0usize;
    while line < lines.len() {
        let text = lines[line].text;
        if let Some((kind, symbol)) = match_declaration(decls, text) {
            let doc_start = doc_comment_start(&lines, line, lang);
            let end = match style {
                BlockStyle::Braces => brace_block_end(&lines, line),
                BlockStyle::Indent => indent_block_end(&lines, line),
            };
            regions.push(SymbolRegion {
                start: doc_start,
                decl: line,
                end,
                kind,
                symbol,
            });
            line = end + 1;
        } else {
            line += 1;
        }
    }

    // Pass 2: emit chunks, filling the gaps between symbol regions.
    let mut chunks = Vec::new();
    let mut group_counter = 0usize;
    let mut cursor = 0usize;
    for region in &regions {
        if region.start > cursor {
            emit_gap_chunks(
                content,
                &lines,
                cursor,
                region.start - 1,
                lang,
                &mut group_counter,
                &mut chunks,
            );
        }
        chunks.push(make_symbol_chunk(content, &lines, region, lang));
        cursor = region.end + 1;
    }
    if cursor < lines.len() {
        emit_gap_chunks(
            content,
            &lines,
            cursor,
            lines.len() - 1,
            lang,
            &mut group_counter,
            &mut chunks,
        );
    }

    meta::link_symbols(&mut chunks);
    chunks
}

struct SymbolRegion {
    /// First line of the chunk (doc comments included).
    start: usize,
    /// Line holding the declaration itself.
    decl: usize,
    end: usize,
    kind: &'static str,
    symbol: String,
}

struct Line<'a> {
    text: &'a str,
    /// Byte offset of the line start within the file.
    offset: usize,
    /// Byte length including the line terminator.
    len: usize,
}

fn split_lines(content: &str) -> Vec<Line<'_>> {
    let mut lines = Vec::new();
    let mut offset = 0usize;
    for raw in content.split_inclusive('\n') {
        lines.push(Line {
            text: raw.trim_end_matches(['\n', '\r']),
            offset,
            len: raw.len(),
        });
        offset += raw.len();
    }
    lines
}

fn slice_lines<'a>(content: &'a str, lines: &[Line<'_>], start: usize, end: usize) -> &'a str {
    let begin = lines[start].offset;
    let finish = lines[end].offset + lines[end].len;
    &content[begin..finish]
}

fn match_declaration(
    decls: &[languages::Declaration],
    line: &str,
) -> Option<(&'static str, String)> {
    for decl in decls {
        if let Some(caps) = decl.regex.captures(line) {
            if let Some(name) = caps.get(1) {
                return Some((decl.kind, name.as_str().to_string()));
            }
        }
    }
    None
}

/// Walk upwards from a declaration to include its doc comment block.
fn doc_comment_start(lines: &[Line<'_>], decl: usize, lang: &str) -> usize {
    let mut start = decl;
    while start > 0 {
        let prev = lines[start - 1].text.trim_start();
        if languages::is_comment_line(lang, prev) || languages::is_attribute_line(lang, prev) {
            start -= 1;
        } else {
            break;
        }
    }
    start
}

/// End line of a brace-delimited block starting at `decl`.
///
/// Brace counting is intentionally naive about string literals; chunk
/// boundaries only need to be deterministic, not parser-grade.
fn brace_block_end(lines: &[Line<'_>], decl: usize) -> usize {
    let mut depth: i32 = 0;
    let mut opened = false;

    for (idx, line) in lines.iter().enumerate().skip(decl) {
        for ch in line.text.chars() {
            match ch {
                '{' => {
                    depth += 1;
                    opened = true;
                }
                '}' => depth -= 1,
                _ => {}
            }
        }
        if opened && depth <= 0 {
            return idx;
        }
        if !opened {
            // Single-line declarations (e.g. trait method signatures,
            // C prototypes) close at the terminating semicolon.
            if line.text.trim_end().ends_with(';') {
                return idx;
            }
            // Give the opening brace a few lines to appear.
            if idx >= decl + 4 {
                return idx;
            }
        }
    }
    lines.len() - 1
}

/// End line of an indentation-delimited block starting at `decl`.
fn indent_block_end(lines: &[Line<'_>], decl: usize) -> usize {
    let base_indent = indent_of(lines[decl].text);
    let mut last_code = decl;

    for (idx, line) in lines.iter().enumerate().skip(decl + 1) {
        let text = line.text;
        if text.trim().is_empty() {
            continue;
        }
        if indent_of(text) <= base_indent {
            return last_code;
        }
        last_code = idx;
    }
    last_code
}

fn indent_of(line: &str) -> usize {
    line.chars().take_while(|c| *c == ' ' || *c == '\t').count()
}

fn make_symbol_chunk(
    content: &str,
    lines: &[Line<'_>],
    region: &SymbolRegion,
    lang: &'static str,
) -> Chunk {
    let text = slice_lines(content, lines, region.start, region.end);
    let decl_line = lines[region.decl].text;
    let meta = meta::extract(lang, decl_line, text, region.start, region.decl, lines);

    Chunk {
        text: text.to_string(),
        symbol: Some(region.symbol.clone()),
        name: region.symbol.clone(),
        chunk_type: region.kind.to_string(),
        lang,
        start_line: (region.start + 1) as u32,
        end_line: (region.end + 1) as u32,
        sha: sha1_hex(text.as_bytes()),
        meta,
    }
}

/// Emit chunks for a region between symbols.
///
/// A region that is a single top-level assignment becomes an `assignment`
/// chunk; one opening with a comment banner becomes `section_<slug>`;
/// anything else is `group_N` with N increasing in file order.
fn emit_gap_chunks(
    content: &str,
    lines: &[Line<'_>],
    start: usize,
    end: usize,
    lang: &'static str,
    group_counter: &mut usize,
    chunks: &mut Vec<Chunk>,
) {
    // Trim blank edges off the region.
    let mut first = start;
    while first <= end && lines[first].text.trim().is_empty() {
        first += 1;
    }
    let mut last = end;
    while last > first && lines[last].text.trim().is_empty() {
        last -= 1;
    }
    if first > end {
        return;
    }

    let text = slice_lines(content, lines, first, last);
    let head = lines[first].text.trim();

    let (name, chunk_type) = if let Some(var) = languages::match_assignment(lang, head) {
        if first == last || region_is_single_statement(lines, first, last) {
            (format!("assignment_{var}"), "assignment".to_string())
        } else {
            *group_counter += 1;
            (format!("group_{group_counter}"), "block".to_string())
        }
    } else if let Some(slug) = section_slug(lang, head) {
        (format!("section_{slug}"), "section".to_string())
    } else {
        *group_counter += 1;
        (format!("group_{group_counter}"), "block".to_string())
    };

    let meta = meta::extract_plain(lang, text);
    chunks.push(Chunk {
        text: text.to_string(),
        symbol: None,
        name,
        chunk_type,
        lang,
        start_line: (first + 1) as u32,
        end_line: (last + 1) as u32,
        sha: sha1_hex(text.as_bytes()),
        meta,
    });
}

fn region_is_single_statement(lines: &[Line<'_>], first: usize, last: usize) -> bool {
    last - first <= 3 && lines[first..=last].iter().all(|l| !l.text.trim().is_empty())
}

/// Slug for comment-banner regions: first word of the banner, lowercased.
fn section_slug(lang: &str, head: &str) -> Option<String> {
    if !languages::is_comment_line(lang, head) {
        return None;
    }
    let stripped: String = head
        .chars()
        .skip_while(|c| !c.is_alphanumeric())
        .collect();
    let word: String = stripped
        .chars()
        .take_while(|c| c.is_alphanumeric() || *c == '_')
        .collect();
    if word.is_empty() {
        None
    } else {
        Some(word.to_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_detection() {
        assert_eq!(language_for_path("src/main.rs"), Some("rust"));
        assert_eq!(language_for_path("a/b/app.py"), Some("python"));
        assert_eq!(language_for_path("web/index.tsx"), Some("typescript"));
        assert_eq!(language_for_path("notes.txt"), None);
        assert_eq!(language_for_path("Makefile"), None);
    }

    #[test]
    fn test_rust_functions_become_symbol_chunks() {
        let src = "pub fn alpha(a: i32) -> i32 {\n    a + 1\n}\n\nfn beta() {\n    alpha(2);\n}\n";
        let chunks = chunk_file("rust", src);
        assert_eq!(chunks.len(), 2);

        assert_eq!(chunks[0].symbol.as_deref(), Some("alpha"));
        assert_eq!(chunks[0].chunk_type, "function");
        assert_eq!(chunks[0].start_line, 1);
        assert_eq!(chunks[0].end_line, 3);
        assert_eq!(chunks[0].text, "pub fn alpha(a: i32) -> i32 {\n    a + 1\n}\n");

        assert_eq!(chunks[1].symbol.as_deref(), Some("beta"));
        // beta calls alpha; the link pass materializes both directions.
        assert!(chunks[1].meta.call_targets.contains(&"alpha".to_string()));
        assert!(chunks[0].meta.callers.contains(&"beta".to_string()));
    }

    #[test]
    fn test_chunk_text_is_byte_exact_with_crlf() {
        let src = "fn a() {\r\n    1;\r\n}\r\nfn b() {\r\n    2;\r\n}\r\n";
        let chunks = chunk_file("rust", src);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].text, "fn a() {\r\n    1;\r\n}\r\n");
        assert_eq!(chunks[0].sha, sha1_hex(chunks[0].text.as_bytes()));
    }

    #[test]
    fn test_python_indent_blocks() {
        let src = "def top():\n    x = 1\n    return x\n\nclass Thing:\n    def method(self):\n        return 2\n";
        let chunks = chunk_file("python", src);
        assert_eq!(chunks[0].symbol.as_deref(), Some("top"));
        assert_eq!(chunks[0].end_line, 3);
        let class_chunk = chunks.iter().find(|c| c.symbol.as_deref() == Some("Thing")).unwrap();
        assert_eq!(class_chunk.chunk_type, "class");
        assert_eq!(class_chunk.end_line, 7);
    }

    #[test]
    fn test_doc_comments_attach_to_symbol() {
        let src = "/// Adds numbers.\n/// Really.\npub fn add(a: i32, b: i32) -> i32 {\n    a + b\n}\n";
        let chunks = chunk_file("rust", src);
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].text.starts_with("/// Adds numbers."));
        assert_eq!(
            chunks[0].meta.doc_comments.as_deref(),
            Some("Adds numbers.\nReally.")
        );
    }

    #[test]
    fn test_gap_regions_generate_stable_ids() {
        let src = "use std::fs;\nuse std::io;\n\nfn only() {}\n";
        let chunks = chunk_file("rust", src);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].name, "group_1");
        assert!(chunks[0].symbol.is_none());
        assert_eq!(chunks[0].chunk_type, "block");

        // Same input, same ids.
        let again = chunk_file("rust", src);
        assert_eq!(again[0].name, "group_1");
        assert_eq!(again[0].sha, chunks[0].sha);
    }

    #[test]
    fn test_assignment_chunk() {
        let src = "const LIMIT = 10;\n\nfunction work() {\n    return LIMIT;\n}\n";
        let chunks = chunk_file("javascript", src);
        assert_eq!(chunks[0].chunk_type, "assignment");
        assert_eq!(chunks[0].name, "assignment_LIMIT");
    }

    #[test]
    fn test_chunk_id_format() {
        let src = "fn solo() {}\n";
        let chunks = chunk_file("rust", src);
        let id = chunks[0].id("src/solo.rs");
        assert!(id.starts_with("src/solo.rs:solo:"));
        let sha8 = id.rsplit(':').next().unwrap();
        assert_eq!(sha8.len(), 8);
        assert_eq!(sha8, &chunks[0].sha[..8]);
    }

    #[test]
    fn test_signature_and_parameters() {
        let src = "pub fn add(a: i32, b: i32) -> i32 {\n    a + b\n}\n";
        let chunks = chunk_file("rust", src);
        let meta = &chunks[0].meta;
        assert_eq!(meta.signature.as_deref(), Some("pub fn add(a: i32, b: i32) -> i32"));
        assert_eq!(meta.parameters, vec!["a", "b"]);
        assert_eq!(meta.returns.as_deref(), Some("i32"));
    }

    #[test]
    fn test_neighbors_are_adjacent_symbols() {
        let src = "fn one() {}\nfn two() {}\nfn three() {}\n";
        let chunks = chunk_file("rust", src);
        assert_eq!(chunks[1].meta.neighbors, vec!["one", "three"]);
        assert_eq!(chunks[0].meta.neighbors, vec!["two"]);
    }

    #[test]
    fn test_determinism_over_repeated_runs() {
        let src = "const A = 1;\n\n// Helpers\nfunction f(x) {\n    return g(x);\n}\n\nfunction g(y) {\n    return y;\n}\n";
        let first = chunk_file("javascript", src);
        for _ in 0..3 {
            let again = chunk_file("javascript", src);
            assert_eq!(first.len(), again.len());
            for (a, b) in first.iter().zip(again.iter()) {
                assert_eq!(a.sha, b.sha);
                assert_eq!(a.name, b.name);
                assert_eq!(a.text, b.text);
            }
        }
    }
}
