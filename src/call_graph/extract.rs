//! Per-file extraction of functions, call sites, and imports
//!
//! The regex path used by every language except Rust (which gets a real
//! AST pass in `rust_ast`). This is AST-lite by design: soundness is
//! traded for breadth, and the resolver compensates by refusing to bind
//! ambiguous names.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use crate::detectors::{CommentMap, LineIndex};
use crate::language::Language;

use super::node::NodeKind;
use super::rust_ast;

/// A function/method declaration found in a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionDecl {
    /// Short name as written
    pub name: String,
    /// Declaration line (1-based)
    pub line: usize,
    /// Kind of callable
    pub kind: NodeKind,
}

/// A call site found in a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallSite {
    /// Callee name as written
    pub callee_name: String,
    /// Receiver expression for `recv.method(...)` calls
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receiver: Option<String>,
    /// Call line (1-based)
    pub line: usize,
    /// Short name of the enclosing function, when one precedes the site
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enclosing: Option<String>,
}

/// A module-level import/alias.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ImportDecl {
    /// Name the import is bound to locally
    pub local_name: String,
    /// Module specifier as written
    pub source: String,
}

/// Everything extracted from one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileExtraction {
    /// File, relative to the project root
    pub file: PathBuf,
    /// Source language
    pub language: Language,
    /// Declarations
    pub functions: Vec<FunctionDecl>,
    /// Call sites
    pub calls: Vec<CallSite>,
    /// Imports
    pub imports: Vec<ImportDecl>,
}

static JS_FUNCTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*(?:export\s+)?(?:default\s+)?(?:async\s+)?function\s+([A-Za-z_$][\w$]*)\s*\(")
        .expect("js function regex")
});

static JS_ARROW: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*(?:export\s+)?(?:const|let|var)\s+([A-Za-z_$][\w$]*)\s*=\s*(?:async\s+)?(?:\([^)\n]*\)|[A-Za-z_$][\w$]*)\s*=>")
        .expect("js arrow regex")
});

static JS_METHOD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s+(?:(?:public|private|protected|static|async|override)\s+)*([A-Za-z_$][\w$]*)\s*\([^)\n]*\)\s*(?::\s*[\w<>\[\],.\s|&]+)?\s*\{")
        .expect("js method regex")
});

static PY_DEF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^(\s*)def\s+([A-Za-z_]\w*)\s*\(").expect("python def regex")
});

static GO_FUNC: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^func\s+(\([^)]*\)\s*)?([A-Za-z_]\w*)\s*\(").expect("go func regex")
});

static JAVA_METHOD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*(?:(?:public|private|protected|internal|static|final|abstract|override|virtual|async|sealed)\s+)+[\w<>\[\],.\s]*?([A-Za-z_]\w*)\s*\([^)\n]*\)\s*\{")
        .expect("java method regex")
});

static RUBY_DEF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*def\s+(?:self\.)?([A-Za-z_]\w*[?!]?)").expect("ruby def regex")
});

static PHP_FUNCTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)function\s+([A-Za-z_]\w*)\s*\(").expect("php function regex")
});

static METHOD_CALL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([A-Za-z_$][\w$]*)\s*\.\s*([A-Za-z_$][\w$]*)\s*\(").expect("method call regex")
});

static BARE_CALL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|[^.\w$])([A-Za-z_$][\w$]*)\s*\(").expect("bare call regex")
});

static CONSTRUCTOR_CALL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bnew\s+([A-Z][\w$]*)\s*\(").expect("constructor call regex")
});

static TS_NAMED_IMPORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"import\s+(?:type\s+)?\{([^}]*)\}\s*from\s*["']([^"']+)["']"#)
        .expect("ts named import regex")
});

static TS_DEFAULT_IMPORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"import\s+([A-Za-z_$][\w$]*)\s+from\s*["']([^"']+)["']"#)
        .expect("ts default import regex")
});

static REQUIRE_IMPORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?:const|let|var)\s+([A-Za-z_$][\w$]*)\s*=\s*require\s*\(\s*["']([^"']+)["']"#)
        .expect("require import regex")
});

static PY_FROM_IMPORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^from\s+([\w.]+)\s+import\s+(.+)$").expect("python from-import regex")
});

static PY_IMPORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^import\s+([\w.]+)(?:\s+as\s+(\w+))?").expect("python import regex")
});

/// Names that look like calls but are control flow or declarations.
const CALL_KEYWORDS: &[&str] = &[
    "if", "for", "while", "switch", "catch", "return", "function", "def", "new", "typeof",
    "await", "yield", "assert", "match", "sizeof", "elif", "with", "print", "super",
    "constructor", "fn", "loop", "unless", "until", "case", "lambda", "do", "else", "try",
    "raise", "throw", "in", "not", "and", "or",
];

/// Extracts declarations, call sites, and imports from one file.
pub fn extract_file(path: &Path, content: &str, language: Language) -> FileExtraction {
    if language == Language::Rust {
        return rust_ast::extract(path, content);
    }

    let comments = CommentMap::build(content, language);
    let lines = LineIndex::build(content);

    let functions = extract_functions(content, language, &comments, &lines);
    let calls = extract_calls(content, &functions, &comments, &lines);
    let imports = extract_imports(content, language, &comments);

    FileExtraction {
        file: path.to_path_buf(),
        language,
        functions,
        calls,
        imports,
    }
}

fn extract_functions(
    content: &str,
    language: Language,
    comments: &CommentMap,
    lines: &LineIndex,
) -> Vec<FunctionDecl> {
    let mut functions: Vec<FunctionDecl> = Vec::new();
    let mut push = |offset: usize, name: &str, kind: NodeKind| {
        if CALL_KEYWORDS.contains(&name) || comments.contains(offset) {
            return;
        }
        let (line, _) = lines.line_col(offset);
        functions.push(FunctionDecl {
            name: name.to_string(),
            line,
            kind,
        });
    };

    match language {
        Language::TypeScript | Language::JavaScript => {
            for caps in JS_FUNCTION.captures_iter(content) {
                push(caps.get(1).unwrap().start(), &caps[1], NodeKind::Function);
            }
            for caps in JS_ARROW.captures_iter(content) {
                push(caps.get(1).unwrap().start(), &caps[1], NodeKind::Closure);
            }
            for caps in JS_METHOD.captures_iter(content) {
                push(caps.get(1).unwrap().start(), &caps[1], NodeKind::Method);
            }
        }
        Language::Python => {
            for caps in PY_DEF.captures_iter(content) {
                let kind = if caps[1].is_empty() {
                    NodeKind::Function
                } else {
                    NodeKind::Method
                };
                push(caps.get(2).unwrap().start(), &caps[2], kind);
            }
        }
        Language::Go => {
            for caps in GO_FUNC.captures_iter(content) {
                let kind = if caps.get(1).is_some() {
                    NodeKind::Method
                } else {
                    NodeKind::Function
                };
                push(caps.get(2).unwrap().start(), &caps[2], kind);
            }
        }
        Language::Java | Language::CSharp => {
            for caps in JAVA_METHOD.captures_iter(content) {
                push(caps.get(1).unwrap().start(), &caps[1], NodeKind::Method);
            }
        }
        Language::Ruby => {
            for caps in RUBY_DEF.captures_iter(content) {
                push(caps.get(1).unwrap().start(), &caps[1], NodeKind::Method);
            }
        }
        Language::Php => {
            for caps in PHP_FUNCTION.captures_iter(content) {
                push(caps.get(1).unwrap().start(), &caps[1], NodeKind::Function);
            }
        }
        Language::Rust | Language::Other => {}
    }

    functions.sort_by_key(|f| f.line);
    functions.dedup_by(|a, b| a.name == b.name && a.line == b.line);
    functions
}

fn enclosing_for<'f>(functions: &'f [FunctionDecl], line: usize) -> Option<&'f str> {
    functions
        .iter()
        .rev()
        .find(|f| f.line <= line)
        .map(|f| f.name.as_str())
}

fn extract_calls(
    content: &str,
    functions: &[FunctionDecl],
    comments: &CommentMap,
    lines: &LineIndex,
) -> Vec<CallSite> {
    let mut calls: Vec<CallSite> = Vec::new();
    let mut seen: HashSet<(usize, String)> = HashSet::new();
    let decl_lines: HashSet<(usize, &str)> = functions
        .iter()
        .map(|f| (f.line, f.name.as_str()))
        .collect();

    let mut push = |offset: usize, name: &str, receiver: Option<String>| {
        if CALL_KEYWORDS.contains(&name) || comments.contains(offset) {
            return;
        }
        let (line, _) = lines.line_col(offset);
        // The declaration itself matches the call shape; skip it.
        if decl_lines.contains(&(line, name)) {
            return;
        }
        if !seen.insert((offset, name.to_string())) {
            return;
        }
        calls.push(CallSite {
            callee_name: name.to_string(),
            receiver,
            line,
            enclosing: enclosing_for(functions, line).map(str::to_string),
        });
    };

    for caps in METHOD_CALL.captures_iter(content) {
        let name = caps.get(2).unwrap();
        push(
            name.start(),
            name.as_str(),
            Some(caps[1].to_string()),
        );
    }
    for caps in CONSTRUCTOR_CALL.captures_iter(content) {
        let name = caps.get(1).unwrap();
        push(name.start(), name.as_str(), None);
    }
    // Method and constructor calls were already recorded; `seen` keeps a
    // bare-call rematch of the same offset from duplicating them.
    for caps in BARE_CALL.captures_iter(content) {
        let name = caps.get(1).unwrap();
        push(name.start(), name.as_str(), None);
    }

    calls.sort_by(|a, b| (a.line, &a.callee_name).cmp(&(b.line, &b.callee_name)));
    calls
}

fn extract_imports(
    content: &str,
    language: Language,
    comments: &CommentMap,
) -> Vec<ImportDecl> {
    let mut imports = Vec::new();
    match language {
        Language::TypeScript | Language::JavaScript => {
            for caps in TS_NAMED_IMPORT.captures_iter(content) {
                if comments.contains(caps.get(0).unwrap().start()) {
                    continue;
                }
                let source = caps[2].to_string();
                for raw in caps[1].split(',') {
                    let name = raw.trim();
                    if name.is_empty() {
                        continue;
                    }
                    // `orig as alias` binds the alias locally.
                    let local = name
                        .rsplit(" as ")
                        .next()
                        .unwrap_or(name)
                        .trim()
                        .to_string();
                    imports.push(ImportDecl {
                        local_name: local,
                        source: source.clone(),
                    });
                }
            }
            for caps in TS_DEFAULT_IMPORT
                .captures_iter(content)
                .chain(REQUIRE_IMPORT.captures_iter(content))
            {
                if comments.contains(caps.get(0).unwrap().start()) {
                    continue;
                }
                imports.push(ImportDecl {
                    local_name: caps[1].to_string(),
                    source: caps[2].to_string(),
                });
            }
        }
        Language::Python => {
            for caps in PY_FROM_IMPORT.captures_iter(content) {
                let source = caps[1].to_string();
                for raw in caps[2].split(',') {
                    let name = raw.trim().trim_end_matches('(').trim();
                    if name.is_empty() || name == "*" {
                        continue;
                    }
                    let local = name.rsplit(" as ").next().unwrap_or(name).trim();
                    imports.push(ImportDecl {
                        local_name: local.to_string(),
                        source: source.clone(),
                    });
                }
            }
            for caps in PY_IMPORT.captures_iter(content) {
                let local = caps
                    .get(2)
                    .map(|m| m.as_str().to_string())
                    .unwrap_or_else(|| caps[1].rsplit('.').next().unwrap().to_string());
                imports.push(ImportDecl {
                    local_name: local,
                    source: caps[1].to_string(),
                });
            }
        }
        _ => {}
    }
    imports.sort();
    imports.dedup();
    imports
}
