//! Per-file comment map
//!
//! Every detector discards matches that fall inside comments, so the scan
//! precomputes one in-comment predicate per file. The pass is string-literal
//! aware: comment tokens inside `"…"`, `'…'`, and backtick templates do not
//! open a comment, and quotes inside comments do not open a string.

use crate::language::Language;

/// Byte ranges of a file that are inside comments.
#[derive(Debug, Clone, Default)]
pub struct CommentMap {
    /// Sorted, non-overlapping half-open byte ranges
    ranges: Vec<(usize, usize)>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum State {
    Code,
    LineComment,
    BlockComment,
    Str(char),
}

impl CommentMap {
    /// Scans `content` once and records all comment ranges.
    pub fn build(content: &str, language: Language) -> Self {
        let line_token = language.line_comment();
        let c_style = language.has_c_style_comments();
        let python_like = matches!(language, Language::Python | Language::Ruby);

        let bytes = content.as_bytes();
        let mut ranges = Vec::new();
        let mut state = State::Code;
        let mut start = 0usize;
        let mut i = 0usize;

        while i < bytes.len() {
            let rest = &content[i..];
            match state {
                State::Code => {
                    if rest.starts_with(line_token)
                        || (python_like && rest.starts_with('#'))
                    {
                        state = State::LineComment;
                        start = i;
                        i += line_token.len();
                    } else if c_style && rest.starts_with("/*") {
                        state = State::BlockComment;
                        start = i;
                        i += 2;
                    } else if python_like && (rest.starts_with("\"\"\"") || rest.starts_with("'''")) {
                        // Triple-quoted strings double as docstrings; treat
                        // them as strings so SQL heredocs stay visible.
                        let quote = &rest[..3];
                        i += 3;
                        if let Some(end) = content[i..].find(quote) {
                            i += end + 3;
                        } else {
                            i = bytes.len();
                        }
                    } else {
                        let ch = rest.chars().next().unwrap();
                        if ch == '"' || ch == '\'' || ch == '`' {
                            state = State::Str(ch);
                        }
                        i += ch.len_utf8();
                    }
                }
                State::LineComment => {
                    if bytes[i] == b'\n' {
                        ranges.push((start, i));
                        state = State::Code;
                    }
                    i += 1;
                }
                State::BlockComment => {
                    if rest.starts_with("*/") {
                        ranges.push((start, i + 2));
                        state = State::Code;
                        i += 2;
                    } else {
                        i += 1;
                    }
                }
                State::Str(quote) => {
                    let ch = rest.chars().next().unwrap();
                    if ch == '\\' {
                        i += ch.len_utf8();
                        if let Some(next) = content[i..].chars().next() {
                            i += next.len_utf8();
                        }
                    } else {
                        if ch == quote || (ch == '\n' && quote != '`') {
                            state = State::Code;
                        }
                        i += ch.len_utf8();
                    }
                }
            }
        }
        if matches!(state, State::LineComment | State::BlockComment) {
            ranges.push((start, bytes.len()));
        }

        Self { ranges }
    }

    /// Whether the byte offset falls inside a comment.
    pub fn contains(&self, offset: usize) -> bool {
        // Ranges are sorted by construction.
        match self.ranges.binary_search_by(|&(s, e)| {
            if offset < s {
                std::cmp::Ordering::Greater
            } else if offset >= e {
                std::cmp::Ordering::Less
            } else {
                std::cmp::Ordering::Equal
            }
        }) {
            Ok(_) => true,
            Err(_) => false,
        }
    }

    /// Number of comment ranges found.
    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    /// Whether the file contains no comments.
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }
}
