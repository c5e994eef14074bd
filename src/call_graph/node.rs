//! Call graph nodes

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::language::Language;

/// What kind of callable a node represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    /// Free function
    Function,
    /// Method on a class/impl
    Method,
    /// Closure / arrow function bound to a name
    Closure,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NodeKind::Function => "function",
            NodeKind::Method => "method",
            NodeKind::Closure => "closure",
        };
        write!(f, "{}", name)
    }
}

/// One callable in the graph.
///
/// The qualified name is `<relative-path-sans-extension>::<name>`, which is
/// unique within a file's namespace; nodes survive incremental rebuilds as
/// long as their file is unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallNode {
    /// Unique qualified name, also the node id
    pub qualified_name: String,
    /// Short name as written in source
    pub name: String,
    /// Declaring file, relative to the project root
    pub file: PathBuf,
    /// Declaration line (1-based)
    pub line: usize,
    /// Source language
    pub language: Language,
    /// Kind of callable
    pub kind: NodeKind,
    /// Reachable from an external trigger (route, CLI main, job)
    #[serde(default)]
    pub is_entry_point: bool,
    /// Body (or direct call) produces a data-access point
    #[serde(default)]
    pub is_data_accessor: bool,
}

impl CallNode {
    /// Builds the canonical qualified name for a declaration.
    pub fn qualify(file: &Path, name: &str) -> String {
        let stem = file.with_extension("");
        format!("{}::{}", stem.display().to_string().replace('\\', "/"), name)
    }
}

impl fmt::Display for CallNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.qualified_name, self.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qualified_names_embed_the_file() {
        assert_eq!(
            CallNode::qualify(Path::new("src/users/index.ts"), "handler"),
            "src/users/index::handler"
        );
        assert_eq!(
            CallNode::qualify(Path::new("src/orders/index.ts"), "handler"),
            "src/orders/index::handler"
        );
    }
}
