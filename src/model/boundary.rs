//! Data-access structures produced by the boundary analyzer

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// What a data-access point does to its table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessOperation {
    /// SELECT / find / get
    Read,
    /// INSERT / create / save
    Write,
    /// UPDATE / set
    Update,
    /// DELETE / destroy / remove
    Delete,
}

impl fmt::Display for AccessOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AccessOperation::Read => "read",
            AccessOperation::Write => "write",
            AccessOperation::Update => "update",
            AccessOperation::Delete => "delete",
        };
        write!(f, "{}", name)
    }
}

/// A single place where code touches stored data.
///
/// At most one access point exists per `(file, line)` per framework, and
/// `table` is always non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessPoint {
    /// File containing the access
    pub file: PathBuf,
    /// Line of the access (1-based)
    pub line: usize,
    /// Table / collection / model being touched
    pub table: String,
    /// Fields referenced at the site, when extractable
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<String>,
    /// What the access does
    pub operation: AccessOperation,
    /// Framework the extractor recognized ("prisma", "typeorm", "raw-sql", …)
    pub framework: String,
}

/// Sensitivity classes, ordered by precedence: a field matching several
/// classes takes the highest.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Sensitivity {
    /// Publicly displayable
    Public,
    /// Internal-only operational data
    Internal,
    /// Personally identifiable information
    Pii,
    /// Health records
    Health,
    /// Financial data
    Financial,
    /// Passwords, tokens, keys
    Credentials,
}

impl fmt::Display for Sensitivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Sensitivity::Public => "public",
            Sensitivity::Internal => "internal",
            Sensitivity::Pii => "pii",
            Sensitivity::Health => "health",
            Sensitivity::Financial => "financial",
            Sensitivity::Credentials => "credentials",
        };
        write!(f, "{}", name)
    }
}

/// A classified `(table, field)` pair.
///
/// Produced by the boundary analyzer during scan, overwritten on rescan,
/// never mutated out-of-band.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensitiveField {
    /// Owning table
    pub table: String,
    /// Field name
    pub field: String,
    /// Highest-precedence class the field matched
    pub sensitivity: Sensitivity,
}

/// A hard-coded secret flagged by the curated catalogue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretFinding {
    /// File containing the secret
    pub file: PathBuf,
    /// Line of the match (1-based)
    pub line: usize,
    /// Which catalogue rule matched ("aws-access-key", "private-key-pem", …)
    pub rule: String,
    /// Redacted preview of the match (first and last four characters)
    pub preview: String,
}

/// An environment hygiene issue (committed `.env` values, keys referenced
/// in code with no `.env.example` counterpart).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvIssue {
    /// File the issue was observed in
    pub file: PathBuf,
    /// The environment key involved
    pub key: String,
    /// What is wrong
    pub message: String,
}
