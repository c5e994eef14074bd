//! Call graph construction and storage
//!
//! Per-file extraction (regex for most languages, `syn` for Rust) feeds a
//! cross-file resolver that binds call sites to nodes where it can and
//! leaves honest unresolved edges where it cannot. The persisted graph
//! carries forward and reverse indices so reachability and impact queries
//! run in O(degree) per step.

mod builder;
mod edge;
mod extract;
mod graph;
mod intermediate;
mod node;
mod resolver;
mod rust_ast;

pub use builder::{GraphBuildResult, GraphBuilder};
pub use edge::{CallEdge, ResolutionTier};
pub use extract::{extract_file, CallSite, FileExtraction, FunctionDecl, ImportDecl};
pub use graph::{CallGraph, GraphStats};
pub use intermediate::Intermediate;
pub use node::{CallNode, NodeKind};
pub use resolver::SymbolResolver;
