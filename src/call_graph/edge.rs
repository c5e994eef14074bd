//! Call graph edges
//!
//! Every call site becomes an edge. Unresolved edges are kept, not
//! dropped: the resolution rate stays observable and reachability can
//! optionally traverse by name with reduced confidence. The invariant
//! `resolved ⇔ callee_id is set` is enforced by construction.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Which resolution tier bound an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionTier {
    /// Exact qualified-name match
    Exact,
    /// Import-aware local-name match
    Import,
    /// Method-name heuristic among receiver candidates
    Heuristic,
}

impl ResolutionTier {
    /// Confidence carried into reachability paths.
    pub fn confidence(self) -> f64 {
        match self {
            ResolutionTier::Exact => 1.0,
            ResolutionTier::Import => 0.9,
            ResolutionTier::Heuristic => 0.7,
        }
    }
}

/// One call site in the graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallEdge {
    /// Qualified name of the calling node
    pub caller_id: String,
    /// Callee name as written at the call site
    pub callee_name: String,
    /// Bound callee node, when resolution succeeded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callee_id: Option<String>,
    /// Receiver expression, when the call was `recv.method(...)`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receiver: Option<String>,
    /// File of the call site
    pub call_site_file: PathBuf,
    /// Line of the call site (1-based)
    pub call_site_line: usize,
    /// Whether the edge is bound to a concrete callee
    pub resolved: bool,
    /// Tier that bound the edge; absent while unresolved
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<ResolutionTier>,
}

impl CallEdge {
    /// Creates an unresolved edge for a call site.
    pub fn unresolved(
        caller_id: impl Into<String>,
        callee_name: impl Into<String>,
        receiver: Option<String>,
        call_site_file: impl Into<PathBuf>,
        call_site_line: usize,
    ) -> Self {
        Self {
            caller_id: caller_id.into(),
            callee_name: callee_name.into(),
            callee_id: None,
            receiver,
            call_site_file: call_site_file.into(),
            call_site_line,
            resolved: false,
            resolution: None,
        }
    }

    /// Binds the edge to a callee. Sets `resolved` in the same step so the
    /// edge contract cannot be half-applied.
    pub fn bind(&mut self, callee_id: impl Into<String>, tier: ResolutionTier) {
        self.callee_id = Some(callee_id.into());
        self.resolved = true;
        self.resolution = Some(tier);
    }

    /// Checks the edge contract.
    pub fn check_invariant(&self) -> bool {
        self.resolved == self.callee_id.is_some()
    }
}

impl fmt::Display for CallEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.callee_id {
            Some(callee) => write!(f, "{} -> {}", self.caller_id, callee),
            None => write!(f, "{} -> {}?", self.caller_id, self.callee_name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_keeps_the_contract() {
        let mut edge = CallEdge::unresolved(
            "src/a::caller",
            "helper",
            None,
            "src/a.ts",
            10,
        );
        assert!(edge.check_invariant());
        assert!(!edge.resolved);

        edge.bind("src/b::helper", ResolutionTier::Import);
        assert!(edge.check_invariant());
        assert!(edge.resolved);
        assert_eq!(edge.resolution, Some(ResolutionTier::Import));
    }

    #[test]
    fn tier_confidence_ordering() {
        assert!(ResolutionTier::Exact.confidence() > ResolutionTier::Import.confidence());
        assert!(ResolutionTier::Import.confidence() > ResolutionTier::Heuristic.confidence());
    }
}
