//! Symbol metadata extraction: signatures, parameters, call edges.
//!
//! All extraction is regex- and string-based and therefore deterministic;
//! the call graph is materialized as name arrays in both directions so no
//! object cycles exist (adjacency via stable identifiers).

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;

use super::languages;
use super::{Chunk, Line};

/// Cap on extracted calls/variables per chunk to keep metadata bounded.
const MAX_EDGES: usize = 32;

#[derive(Debug, Clone, Default)]
pub struct SymbolMeta {
    pub signature: Option<String>,
    pub parameters: Vec<String>,
    pub returns: Option<String>,
    /// Called identifiers in order of first occurrence.
    pub calls: Vec<String>,
    /// Subset of `calls` that resolve to symbols in the same file.
    pub call_targets: Vec<String>,
    /// Symbols in the same file that call this one (filled by link pass).
    pub callers: Vec<String>,
    /// Adjacent symbol names in file order (filled by link pass).
    pub neighbors: Vec<String>,
    pub doc_comments: Option<String>,
    pub variables: Vec<String>,
}

/// Extract metadata for a symbol chunk.
pub fn extract(
    lang: &str,
    decl_line: &str,
    chunk_text: &str,
    start: usize,
    decl_idx: usize,
    lines: &[Line<'_>],
) -> SymbolMeta {
    let mut meta = extract_plain(lang, chunk_text);
    meta.signature = Some(signature_of(lang, decl_line));
    meta.parameters = parse_parameters(lang, decl_line);
    meta.returns = parse_return(lang, decl_line);
    meta.doc_comments = doc_comments(lang, lines, start, decl_idx);
    meta
}

/// Extract the metadata that applies to any chunk (calls, variables).
pub fn extract_plain(lang: &str, text: &str) -> SymbolMeta {
    SymbolMeta {
        calls: collect_calls(text),
        variables: collect_variables(lang, text),
        ..SymbolMeta::default()
    }
}

/// Fill `call_targets`, `callers` and `neighbors` across a file's chunks.
pub fn link_symbols(chunks: &mut [Chunk]) {
    let symbols: Vec<Option<String>> = chunks.iter().map(|c| c.symbol.clone()).collect();
    let symbol_set: HashSet<&str> = symbols
        .iter()
        .filter_map(|s| s.as_deref())
        .collect();

    // Resolve call targets against the file's own symbols.
    for chunk in chunks.iter_mut() {
        let own = chunk.symbol.as_deref().map(str::to_string);
        chunk.meta.call_targets = chunk
            .meta
            .calls
            .iter()
            .filter(|name| symbol_set.contains(name.as_str()))
            .filter(|name| own.as_deref() != Some(name.as_str()))
            .cloned()
            .collect();
    }

    // Invert the edges for callers.
    let mut edges: Vec<(String, String)> = Vec::new();
    for chunk in chunks.iter() {
        if let Some(caller) = &chunk.symbol {
            for target in &chunk.meta.call_targets {
                edges.push((target.clone(), caller.clone()));
            }
        }
    }
    for chunk in chunks.iter_mut() {
        if let Some(symbol) = &chunk.symbol {
            let mut callers: Vec<String> = edges
                .iter()
                .filter(|(target, _)| target == symbol)
                .map(|(_, caller)| caller.clone())
                .collect();
            callers.dedup();
            chunk.meta.callers = callers;
        }
    }

    // Neighbors: previous and next named symbol in file order.
    let named_positions: Vec<usize> = chunks
        .iter()
        .enumerate()
        .filter(|(_, c)| c.symbol.is_some())
        .map(|(i, _)| i)
        .collect();
    for (pos, &idx) in named_positions.iter().enumerate() {
        let mut neighbors = Vec::new();
        if pos > 0 {
            if let Some(s) = &chunks[named_positions[pos - 1]].symbol {
                neighbors.push(s.clone());
            }
        }
        if pos + 1 < named_positions.len() {
            if let Some(s) = &chunks[named_positions[pos + 1]].symbol {
                neighbors.push(s.clone());
            }
        }
        chunks[idx].meta.neighbors = neighbors;
    }
}

/// Declaration line with the block opener stripped.
fn signature_of(lang: &str, decl_line: &str) -> String {
    let mut sig = decl_line.trim();
    if let Some(idx) = sig.find('{') {
        sig = sig[..idx].trim_end();
    }
    if lang == "python" {
        sig = sig.trim_end_matches(':').trim_end();
    }
    sig.to_string()
}

/// Parameter names from the first parenthesized group of the declaration.
fn parse_parameters(lang: &str, decl_line: &str) -> Vec<String> {
    let open = match decl_line.find('(') {
        Some(i) => i,
        None => return Vec::new(),
    };
    let rest = &decl_line[open + 1..];
    let mut depth = 0i32;
    let mut close = rest.len();
    for (i, ch) in rest.char_indices() {
        match ch {
            '(' | '<' | '[' => depth += 1,
            '>' | ']' => depth -= 1,
            ')' => {
                if depth == 0 {
                    close = i;
                    break;
                }
                depth -= 1;
            }
            _ => {}
        }
    }
    let inner = &rest[..close];
    if inner.trim().is_empty() {
        return Vec::new();
    }

    split_top_level(inner)
        .into_iter()
        .filter_map(|piece| parameter_name(lang, &piece))
        .filter(|name| !matches!(name.as_str(), "self" | "this" | "cls"))
        .take(MAX_EDGES)
        .collect()
}

fn split_top_level(s: &str) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut depth = 0i32;
    let mut current = String::new();
    for ch in s.chars() {
        match ch {
            '(' | '<' | '[' | '{' => {
                depth += 1;
                current.push(ch);
            }
            ')' | '>' | ']' | '}' => {
                depth -= 1;
                current.push(ch);
            }
            ',' if depth == 0 => {
                pieces.push(current.trim().to_string());
                current = String::new();
            }
            _ => current.push(ch),
        }
    }
    if !current.trim().is_empty() {
        pieces.push(current.trim().to_string());
    }
    pieces
}

fn parameter_name(lang: &str, piece: &str) -> Option<String> {
    let piece = piece.split('=').next().unwrap_or(piece).trim();
    if piece.is_empty() || piece == "..." {
        return None;
    }

    let candidate = if lang == "go" {
        // Go writes `name type`.
        piece.split_whitespace().next()?.to_string()
    } else if let Some(before_colon) = piece.split(':').next().filter(|_| piece.contains(':')) {
        // `name: Type` style; the name is the last token before the colon.
        before_colon.split_whitespace().last()?.to_string()
    } else {
        // `Type name` style (Java, C) or a bare name.
        piece.split_whitespace().last()?.to_string()
    };

    let cleaned: String = candidate
        .trim_start_matches(['&', '*', '$'])
        .chars()
        .take_while(|c| c.is_alphanumeric() || *c == '_')
        .collect();
    if cleaned.is_empty() || cleaned == "mut" {
        None
    } else {
        Some(cleaned)
    }
}

fn parse_return(lang: &str, decl_line: &str) -> Option<String> {
    static ARROW: OnceLock<Regex> = OnceLock::new();
    static TS_COLON: OnceLock<Regex> = OnceLock::new();
    static GO_SUFFIX: OnceLock<Regex> = OnceLock::new();

    let arrow = ARROW.get_or_init(|| Regex::new(r"->\s*([^{:;]+)").expect("valid return regex"));
    if let Some(caps) = arrow.captures(decl_line) {
        let r = caps[1].trim().to_string();
        if !r.is_empty() {
            return Some(r);
        }
    }

    if lang == "typescript" || lang == "javascript" {
        let re = TS_COLON
            .get_or_init(|| Regex::new(r"\)\s*:\s*([^{;=]+)").expect("valid return regex"));
        if let Some(caps) = re.captures(decl_line) {
            let r = caps[1].trim().to_string();
            if !r.is_empty() {
                return Some(r);
            }
        }
    }

    if lang == "go" {
        let re = GO_SUFFIX
            .get_or_init(|| Regex::new(r"\)\s*([\w\[\]\*\.]+)\s*\{\s*$").expect("valid return regex"));
        if let Some(caps) = re.captures(decl_line) {
            return Some(caps[1].trim().to_string());
        }
    }

    None
}

fn doc_comments(
    lang: &str,
    lines: &[Line<'_>],
    start: usize,
    decl_idx: usize,
) -> Option<String> {
    if start >= decl_idx {
        return None;
    }
    let mut parts = Vec::new();
    for line in &lines[start..decl_idx] {
        let trimmed = line.text.trim();
        if languages::is_attribute_line(lang, trimmed) {
            continue;
        }
        let stripped = trimmed
            .trim_start_matches("///")
            .trim_start_matches("//!")
            .trim_start_matches("//")
            .trim_start_matches("/**")
            .trim_start_matches("/*")
            .trim_start_matches('*')
            .trim_start_matches('#')
            .trim()
            .trim_end_matches("*/")
            .trim_end();
        if !stripped.is_empty() {
            parts.push(stripped.to_string());
        }
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("\n"))
    }
}

fn call_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"([A-Za-z_][A-Za-z0-9_]*)\s*\(").expect("valid call regex"))
}

const CALL_KEYWORDS: &[&str] = &[
    "if", "for", "while", "switch", "match", "return", "catch", "new", "do", "else",
    "loop", "defer", "go", "await", "yield", "assert", "sizeof", "typeof", "fn",
    "function", "def", "func", "super", "print", "println", "use", "let",
];

fn collect_calls(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut calls = Vec::new();
    for caps in call_regex().captures_iter(text) {
        let name = &caps[1];
        if CALL_KEYWORDS.contains(&name) {
            continue;
        }
        if seen.insert(name.to_string()) {
            calls.push(name.to_string());
            if calls.len() >= MAX_EDGES {
                break;
            }
        }
    }
    calls
}

fn variable_regexes(lang: &str) -> &'static [Regex] {
    static RUSTLIKE: OnceLock<Vec<Regex>> = OnceLock::new();
    static JSLIKE: OnceLock<Vec<Regex>> = OnceLock::new();
    static PYTHON: OnceLock<Vec<Regex>> = OnceLock::new();
    static GO: OnceLock<Vec<Regex>> = OnceLock::new();
    static GENERIC: OnceLock<Vec<Regex>> = OnceLock::new();

    match lang {
        "rust" => RUSTLIKE.get_or_init(|| {
            vec![Regex::new(r"(?:let|static|const)\s+(?:mut\s+)?([A-Za-z_]\w*)")
                .expect("valid variable regex")]
        }),
        "javascript" | "typescript" => JSLIKE.get_or_init(|| {
            vec![Regex::new(r"(?:let|const|var)\s+([A-Za-z_$][\w$]*)")
                .expect("valid variable regex")]
        }),
        "python" => PYTHON.get_or_init(|| {
            vec![Regex::new(r"(?m)^\s*([A-Za-z_]\w*)\s*=[^=]").expect("valid variable regex")]
        }),
        "go" => GO.get_or_init(|| {
            vec![
                Regex::new(r"var\s+([A-Za-z_]\w*)").expect("valid variable regex"),
                Regex::new(r"([A-Za-z_]\w*)\s*:=").expect("valid variable regex"),
            ]
        }),
        _ => GENERIC.get_or_init(|| {
            vec![Regex::new(r"(?:let|var|const)\s+([A-Za-z_$][\w$]*)")
                .expect("valid variable regex")]
        }),
    }
}

fn collect_variables(lang: &str, text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut vars = Vec::new();
    for re in variable_regexes(lang) {
        for caps in re.captures_iter(text) {
            let name = caps[1].to_string();
            if seen.insert(name.clone()) {
                vars.push(name);
                if vars.len() >= MAX_EDGES {
                    return vars;
                }
            }
        }
    }
    vars
}
