//! Supported languages, extension mapping and declaration patterns.
//!
//! Pattern tables are compiled once per process. A cheap prefilter is not
//! needed here: declaration regexes are anchored and only run once per
//! line during chunking.

use std::sync::OnceLock;

use regex::Regex;

/// Extension (without dot) to language tag. Frozen for v1.
const EXTENSIONS: &[(&str, &str)] = &[
    ("rs", "rust"),
    ("py", "python"),
    ("js", "javascript"),
    ("mjs", "javascript"),
    ("cjs", "javascript"),
    ("jsx", "javascript"),
    ("ts", "typescript"),
    ("tsx", "typescript"),
    ("go", "go"),
    ("java", "java"),
    ("php", "php"),
    ("c", "c"),
    ("h", "c"),
    ("cpp", "cpp"),
    ("cc", "cpp"),
    ("cxx", "cpp"),
    ("hpp", "cpp"),
    ("cs", "csharp"),
    ("kt", "kotlin"),
    ("kts", "kotlin"),
    ("swift", "swift"),
    ("scala", "scala"),
];

/// Language tag for a file extension, if supported.
pub fn language_for_extension(ext: &str) -> Option<&'static str> {
    let lower = ext.to_ascii_lowercase();
    EXTENSIONS
        .iter()
        .find(|(e, _)| *e == lower)
        .map(|(_, lang)| *lang)
}

/// Language tag for a path, if its extension is supported.
pub fn language_for_path(path: &str) -> Option<&'static str> {
    let file_name = path.rsplit('/').next()?;
    let ext = file_name.rsplit_once('.')?.1;
    language_for_extension(ext)
}

/// Every supported extension, for diagnostics.
pub fn supported_extensions() -> Vec<&'static str> {
    EXTENSIONS.iter().map(|(e, _)| *e).collect()
}

/// One declaration pattern: group 1 captures the symbol name.
pub struct Declaration {
    pub regex: Regex,
    pub kind: &'static str,
}

fn decl(pattern: &str, kind: &'static str) -> Declaration {
    Declaration {
        regex: Regex::new(pattern).expect("valid declaration regex"),
        kind,
    }
}

macro_rules! decl_table {
    ($name:ident, $init:expr) => {
        fn $name() -> &'static [Declaration] {
            static TABLE: OnceLock<Vec<Declaration>> = OnceLock::new();
            TABLE.get_or_init(|| $init)
        }
    };
}

decl_table!(rust_decls, vec![
    decl(
        r#"^\s*(?:pub(?:\([^)]*\))?\s+)?(?:default\s+)?(?:const\s+)?(?:async\s+)?(?:unsafe\s+)?(?:extern\s+"[^"]*"\s+)?fn\s+([A-Za-z_][A-Za-z0-9_]*)"#,
        "function",
    ),
    decl(r"^\s*(?:pub(?:\([^)]*\))?\s+)?struct\s+([A-Za-z_][A-Za-z0-9_]*)", "struct"),
    decl(r"^\s*(?:pub(?:\([^)]*\))?\s+)?enum\s+([A-Za-z_][A-Za-z0-9_]*)", "enum"),
    decl(
        r"^\s*(?:pub(?:\([^)]*\))?\s+)?(?:unsafe\s+)?trait\s+([A-Za-z_][A-Za-z0-9_]*)",
        "trait",
    ),
    decl(
        r"^\s*(?:unsafe\s+)?impl(?:\s*<[^>]*>)?\s+(?:[A-Za-z_][\w:]*(?:<[^>]*>)?\s+for\s+)?([A-Za-z_][A-Za-z0-9_]*)",
        "impl",
    ),
    decl(r"^\s*(?:pub\s+)?mod\s+([A-Za-z_][A-Za-z0-9_]*)\s*\{", "module"),
    decl(r"^\s*macro_rules!\s+([A-Za-z_][A-Za-z0-9_]*)", "macro"),
]);

decl_table!(javascript_decls, vec![
    decl(
        r"^\s*(?:export\s+)?(?:default\s+)?(?:async\s+)?function\s*\*?\s*([A-Za-z_$][\w$]*)",
        "function",
    ),
    decl(
        r"^\s*(?:export\s+)?(?:default\s+)?(?:abstract\s+)?class\s+([A-Za-z_$][\w$]*)",
        "class",
    ),
    decl(
        r"^\s*(?:export\s+)?(?:const|let|var)\s+([A-Za-z_$][\w$]*)\s*=\s*(?:async\s+)?(?:\([^)]*\)|[A-Za-z_$][\w$]*)\s*=>",
        "function",
    ),
]);

decl_table!(typescript_decls, vec![
    decl(
        r"^\s*(?:export\s+)?(?:default\s+)?(?:async\s+)?function\s*\*?\s*([A-Za-z_$][\w$]*)",
        "function",
    ),
    decl(
        r"^\s*(?:export\s+)?(?:default\s+)?(?:abstract\s+)?class\s+([A-Za-z_$][\w$]*)",
        "class",
    ),
    decl(r"^\s*(?:export\s+)?interface\s+([A-Za-z_$][\w$]*)", "interface"),
    decl(r"^\s*(?:export\s+)?(?:const\s+)?enum\s+([A-Za-z_$][\w$]*)", "enum"),
    decl(
        r"^\s*(?:export\s+)?(?:const|let|var)\s+([A-Za-z_$][\w$]*)\s*=\s*(?:async\s+)?(?:\([^)]*\)|[A-Za-z_$][\w$]*)\s*=>",
        "function",
    ),
]);

decl_table!(python_decls, vec![
    decl(r"^\s*(?:async\s+)?def\s+([A-Za-z_]\w*)", "function"),
    decl(r"^\s*class\s+([A-Za-z_]\w*)", "class"),
]);

decl_table!(go_decls, vec![
    decl(r"^func\s+(?:\([^)]*\)\s+)?([A-Za-z_]\w*)\s*\(", "function"),
    decl(r"^type\s+([A-Za-z_]\w*)\s+struct\b", "struct"),
    decl(r"^type\s+([A-Za-z_]\w*)\s+interface\b", "interface"),
]);

decl_table!(java_decls, vec![
    decl(
        r"^\s*(?:public\s+|private\s+|protected\s+|static\s+|final\s+|abstract\s+)*class\s+([A-Za-z_]\w*)",
        "class",
    ),
    decl(
        r"^\s*(?:public\s+|private\s+|protected\s+)*interface\s+([A-Za-z_]\w*)",
        "interface",
    ),
    decl(r"^\s*(?:public\s+|private\s+|protected\s+)*enum\s+([A-Za-z_]\w*)", "enum"),
]);

decl_table!(csharp_decls, vec![
    decl(
        r"^\s*(?:public\s+|private\s+|protected\s+|internal\s+|static\s+|sealed\s+|abstract\s+|partial\s+)*class\s+([A-Za-z_]\w*)",
        "class",
    ),
    decl(
        r"^\s*(?:public\s+|private\s+|internal\s+)*interface\s+([A-Za-z_]\w*)",
        "interface",
    ),
    decl(
        r"^\s*(?:public\s+|private\s+|internal\s+)*(?:readonly\s+)?struct\s+([A-Za-z_]\w*)",
        "struct",
    ),
    decl(r"^\s*(?:public\s+|private\s+|internal\s+)*enum\s+([A-Za-z_]\w*)", "enum"),
    decl(
        r"^\s*(?:public\s+|private\s+|internal\s+|sealed\s+)*record\s+([A-Za-z_]\w*)",
        "class",
    ),
]);

decl_table!(php_decls, vec![
    decl(r"^\s*(?:abstract\s+|final\s+)?class\s+(\w+)", "class"),
    decl(r"^\s*(?:interface|trait)\s+(\w+)", "interface"),
    decl(
        r"^\s*(?:public\s+|private\s+|protected\s+|static\s+)*function\s+&?(\w+)",
        "function",
    ),
]);

decl_table!(c_decls, vec![
    decl(r"^(?:typedef\s+)?struct\s+([A-Za-z_]\w*)", "struct"),
    decl(r"^(?:typedef\s+)?enum\s+([A-Za-z_]\w*)", "enum"),
    // Function definitions: a return type, a name, an open paren, and no
    // semicolon on the line (prototypes stay in their surrounding group).
    decl(r"^(?:[A-Za-z_][\w\*]*[\s\*]+)+([A-Za-z_]\w*)\s*\([^;]*$", "function"),
]);

decl_table!(cpp_decls, vec![
    decl(r"^\s*class\s+([A-Za-z_]\w*)", "class"),
    decl(r"^(?:typedef\s+)?struct\s+([A-Za-z_]\w*)", "struct"),
    decl(r"^(?:typedef\s+)?enum\s+(?:class\s+)?([A-Za-z_]\w*)", "enum"),
    decl(r"^(?:[A-Za-z_][\w\*:<>]*[\s\*]+)+([A-Za-z_]\w*)\s*\([^;]*$", "function"),
]);

decl_table!(kotlin_decls, vec![
    decl(
        r"^\s*(?:private\s+|public\s+|internal\s+|protected\s+|open\s+|override\s+|suspend\s+|inline\s+)*fun\s+(?:<[^>]*>\s*)?([A-Za-z_]\w*)",
        "function",
    ),
    decl(
        r"^\s*(?:data\s+|open\s+|sealed\s+|abstract\s+|final\s+|enum\s+)*class\s+([A-Za-z_]\w*)",
        "class",
    ),
    decl(r"^\s*object\s+([A-Za-z_]\w*)", "class"),
    decl(r"^\s*interface\s+([A-Za-z_]\w*)", "interface"),
]);

decl_table!(swift_decls, vec![
    decl(
        r"^\s*(?:public\s+|private\s+|internal\s+|open\s+|static\s+|override\s+)*func\s+([A-Za-z_]\w*)",
        "function",
    ),
    decl(
        r"^\s*(?:public\s+|private\s+|internal\s+|open\s+)*(?:final\s+)?class\s+([A-Za-z_]\w*)",
        "class",
    ),
    decl(r"^\s*(?:public\s+|private\s+|internal\s+)*struct\s+([A-Za-z_]\w*)", "struct"),
    decl(r"^\s*(?:public\s+|private\s+|internal\s+)*enum\s+([A-Za-z_]\w*)", "enum"),
    decl(r"^\s*(?:public\s+|private\s+|internal\s+)*protocol\s+([A-Za-z_]\w*)", "interface"),
]);

decl_table!(scala_decls, vec![
    decl(r"^\s*(?:override\s+|private\s+|protected\s+|final\s+)*def\s+([A-Za-z_]\w*)", "function"),
    decl(r"^\s*(?:case\s+|abstract\s+|final\s+|sealed\s+)*class\s+([A-Za-z_]\w*)", "class"),
    decl(r"^\s*(?:case\s+)?object\s+([A-Za-z_]\w*)", "class"),
    decl(r"^\s*(?:sealed\s+)?trait\s+([A-Za-z_]\w*)", "trait"),
]);

/// Declaration table for a language tag.
pub fn declarations(lang: &str) -> &'static [Declaration] {
    match lang {
        "rust" => rust_decls(),
        "javascript" => javascript_decls(),
        "typescript" => typescript_decls(),
        "python" => python_decls(),
        "go" => go_decls(),
        "java" => java_decls(),
        "csharp" => csharp_decls(),
        "php" => php_decls(),
        "c" => c_decls(),
        "cpp" => cpp_decls(),
        "kotlin" => kotlin_decls(),
        "swift" => swift_decls(),
        "scala" => scala_decls(),
        _ => &[],
    }
}

/// Whether a (trimmed) line is a comment in the given language.
pub fn is_comment_line(lang: &str, trimmed: &str) -> bool {
    match lang {
        "python" => trimmed.starts_with('#') || trimmed.starts_with("\"\"\""),
        "php" => {
            trimmed.starts_with("//")
                || trimmed.starts_with('#')
                || trimmed.starts_with("/*")
                || trimmed.starts_with('*')
        }
        _ => {
            trimmed.starts_with("//")
                || trimmed.starts_with("/*")
                || trimmed.starts_with('*')
        }
    }
}

/// Whether a (trimmed) line is an attribute/decorator that belongs to the
/// declaration below it.
pub fn is_attribute_line(lang: &str, trimmed: &str) -> bool {
    match lang {
        "rust" => trimmed.starts_with("#["),
        "python" | "javascript" | "typescript" | "java" | "kotlin" | "scala" => {
            trimmed.starts_with('@')
        }
        "csharp" => trimmed.starts_with('[') || trimmed.starts_with('@'),
        _ => false,
    }
}

fn assignment_regexes() -> &'static [Regex] {
    static TABLE: OnceLock<Vec<Regex>> = OnceLock::new();
    TABLE.get_or_init(|| {
        vec![
            Regex::new(r"^(?:export\s+)?(?:const|let|var)\s+([A-Za-z_$][\w$]*)\s*=")
                .expect("valid assignment regex"),
            Regex::new(r"^(?:pub\s+)?(?:static|const)\s+(?:mut\s+)?([A-Za-z_][A-Za-z0-9_]*)\s*:")
                .expect("valid assignment regex"),
            Regex::new(r"^([A-Za-z_]\w*)\s*=[^=]").expect("valid assignment regex"),
        ]
    })
}

/// If the first line of a region is a top-level assignment, its name.
pub fn match_assignment(_lang: &str, head: &str) -> Option<String> {
    for re in assignment_regexes() {
        if let Some(caps) = re.captures(head) {
            return caps.get(1).map(|m| m.as_str().to_string());
        }
    }
    None
}
