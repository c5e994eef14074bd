//! Source language identification
//!
//! Language detection is extension-driven. Content sniffing exists only for
//! extension-less files and only when the caller opts in; it looks at the
//! first line (shebangs) and nothing else.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Languages the scan pipeline understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    /// TypeScript (`.ts`, `.tsx`)
    TypeScript,
    /// JavaScript (`.js`, `.jsx`, `.mjs`, `.cjs`)
    JavaScript,
    /// Python (`.py`)
    Python,
    /// Rust (`.rs`)
    Rust,
    /// Go (`.go`)
    Go,
    /// Java (`.java`)
    Java,
    /// C# (`.cs`)
    CSharp,
    /// Ruby (`.rb`)
    Ruby,
    /// PHP (`.php`)
    Php,
    /// Anything else; skipped by detectors unless they opt in
    Other,
}

impl Language {
    /// Detects a language from a file extension.
    pub fn from_extension(ext: Option<&str>) -> Self {
        match ext {
            Some("ts") | Some("tsx") | Some("mts") | Some("cts") => Language::TypeScript,
            Some("js") | Some("jsx") | Some("mjs") | Some("cjs") => Language::JavaScript,
            Some("py") => Language::Python,
            Some("rs") => Language::Rust,
            Some("go") => Language::Go,
            Some("java") => Language::Java,
            Some("cs") => Language::CSharp,
            Some("rb") => Language::Ruby,
            Some("php") => Language::Php,
            _ => Language::Other,
        }
    }

    /// Detects a language from a path, extension first.
    pub fn from_path(path: &Path) -> Self {
        Self::from_extension(path.extension().and_then(|e| e.to_str()))
    }

    /// Shebang-based sniff for extension-less files. Opt-in only.
    pub fn sniff(first_line: &str) -> Self {
        let line = first_line.trim();
        if !line.starts_with("#!") {
            return Language::Other;
        }
        if line.contains("python") {
            Language::Python
        } else if line.contains("node") {
            Language::JavaScript
        } else if line.contains("ruby") {
            Language::Ruby
        } else if line.contains("php") {
            Language::Php
        } else {
            Language::Other
        }
    }

    /// Whether this language uses C-style `//` and `/* */` comments.
    pub fn has_c_style_comments(self) -> bool {
        !matches!(self, Language::Python | Language::Ruby | Language::Other)
    }

    /// The line-comment token for this language.
    pub fn line_comment(self) -> &'static str {
        match self {
            Language::Python | Language::Ruby => "#",
            Language::Php => "//",
            _ => "//",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Language::TypeScript => "typescript",
            Language::JavaScript => "javascript",
            Language::Python => "python",
            Language::Rust => "rust",
            Language::Go => "go",
            Language::Java => "java",
            Language::CSharp => "csharp",
            Language::Ruby => "ruby",
            Language::Php => "php",
            Language::Other => "other",
        };
        write!(f, "{}", name)
    }
}
