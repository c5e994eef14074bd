//! Data-access extraction
//!
//! Framework-specific extractors recognize ORM query calls and raw SQL
//! literals and reduce each to an access point: `(file, line, table,
//! fields, operation, framework)`. One access point per `(file, line)` per
//! framework; later matches on the same line lose.

use regex::Regex;
use std::collections::HashSet;
use std::path::Path;
use std::sync::LazyLock;

use crate::detectors::{CommentMap, LineIndex};
use crate::model::{AccessOperation, AccessPoint};

static PRISMA_CALL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bprisma\.([a-zA-Z_][a-zA-Z0-9_]*)\.(findMany|findUnique|findFirst|create|createMany|update|updateMany|upsert|delete|deleteMany|count|aggregate)\s*\(")
        .expect("prisma regex")
});

static TYPEORM_CALL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:getRepository|getTreeRepository)\s*\(\s*([A-Z][a-zA-Z0-9_]*)\s*\)\s*\.\s*(find|findOne|findBy|save|insert|update|delete|remove|count)\s*\(|\b([a-zA-Z_][a-zA-Z0-9_]*Repository)\s*\.\s*(find|findOne|findBy|save|insert|update|delete|remove|count)\s*\(")
        .expect("typeorm regex")
});

static SEQUELIZE_CALL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b([A-Z][a-zA-Z0-9_]*)\.(findAll|findOne|findByPk|findOrCreate|create|bulkCreate|update|upsert|destroy|count)\s*\(")
        .expect("sequelize regex")
});

static MONGOOSE_CALL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b([A-Z][a-zA-Z0-9_]*)\.(find|findById|insertMany|updateOne|updateMany|deleteOne|deleteMany|countDocuments)\s*\(")
        .expect("mongoose regex")
});

static SQLALCHEMY_CALL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:session|db\.session)\.query\s*\(\s*([A-Z][a-zA-Z0-9_]*)\s*\)")
        .expect("sqlalchemy regex")
});

static DIESEL_CALL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bdiesel::(?:insert_into|update|delete)\s*\(\s*([a-z_][a-z0-9_]*)(?:::table)?\s*\)|\b([a-z_][a-z0-9_]*)::table\s*\.\s*(?:load|first|filter|select)")
        .expect("diesel regex")
});

static RAW_SQL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\b(SELECT)\s+[\w\s,.*()]+?\s+FROM\s+["'`]?([a-zA-Z_][a-zA-Z0-9_.]*)|\b(INSERT)\s+INTO\s+["'`]?([a-zA-Z_][a-zA-Z0-9_.]*)|\b(UPDATE)\s+["'`]?([a-zA-Z_][a-zA-Z0-9_.]*)\s+SET\b|\b(DELETE)\s+FROM\s+["'`]?([a-zA-Z_][a-zA-Z0-9_.]*)"#)
        .expect("raw sql regex")
});

static FIELD_LIST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?:select|data|attributes)\s*:\s*\{([^}]*)\}"#).expect("field list regex")
});

static FIELD_KEY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([a-zA-Z_][a-zA-Z0-9_]*)\s*:").expect("field key regex")
});

fn operation_for(method: &str) -> AccessOperation {
    let lower = method.to_ascii_lowercase();
    if lower.starts_with("find")
        || lower.starts_with("count")
        || lower.starts_with("aggregate")
        || lower.starts_with("load")
        || lower.starts_with("first")
        || lower.starts_with("filter")
        || lower.starts_with("select")
        || lower == "query"
    {
        AccessOperation::Read
    } else if lower.starts_with("update") || lower.starts_with("upsert") || lower == "save" {
        AccessOperation::Update
    } else if lower.starts_with("delete")
        || lower.starts_with("destroy")
        || lower.starts_with("remove")
    {
        AccessOperation::Delete
    } else {
        AccessOperation::Write
    }
}

/// Table name normalization: model identifiers become lower-case table
/// names the way most ORMs pluralize them.
fn table_from_model(model: &str) -> String {
    let lower = model.to_ascii_lowercase();
    if lower.ends_with('s') {
        lower
    } else {
        format!("{}s", lower)
    }
}

/// Fields referenced near the call site, when a `select`/`data` block is
/// present within the same statement.
fn fields_near(content: &str, offset: usize) -> Vec<String> {
    let window_end = content.len().min(offset + 400);
    let window = &content[offset..window_end];
    let Some(caps) = FIELD_LIST.captures(window) else {
        return Vec::new();
    };
    let mut fields: Vec<String> = FIELD_KEY
        .captures_iter(&caps[1])
        .map(|c| c[1].to_string())
        .collect();
    fields.sort();
    fields.dedup();
    fields
}

/// Extracts every access point from one file.
pub fn extract(
    path: &Path,
    content: &str,
    comments: &CommentMap,
    lines: &LineIndex,
) -> Vec<AccessPoint> {
    let mut points = Vec::new();
    let mut seen: HashSet<(usize, String)> = HashSet::new();

    let mut push = |offset: usize, table: String, operation: AccessOperation, framework: &str| {
        if table.is_empty() {
            return;
        }
        let (line, _) = lines.line_col(offset);
        if !seen.insert((line, framework.to_string())) {
            return;
        }
        points.push(AccessPoint {
            file: path.to_path_buf(),
            line,
            table,
            fields: fields_near(content, offset),
            operation,
            framework: framework.to_string(),
        });
    };

    for caps in PRISMA_CALL.captures_iter(content) {
        let m = caps.get(0).expect("whole match");
        if comments.contains(m.start()) {
            continue;
        }
        push(
            m.start(),
            table_from_model(&caps[1]),
            operation_for(&caps[2]),
            "prisma",
        );
    }

    for caps in TYPEORM_CALL.captures_iter(content) {
        let m = caps.get(0).expect("whole match");
        if comments.contains(m.start()) {
            continue;
        }
        let (model, method) = if let (Some(model), Some(method)) = (caps.get(1), caps.get(2)) {
            (model.as_str().to_string(), method.as_str())
        } else if let (Some(repo), Some(method)) = (caps.get(3), caps.get(4)) {
            (
                repo.as_str().trim_end_matches("Repository").to_string(),
                method.as_str(),
            )
        } else {
            continue;
        };
        push(
            m.start(),
            table_from_model(&model),
            operation_for(method),
            "typeorm",
        );
    }

    for caps in SEQUELIZE_CALL.captures_iter(content) {
        let m = caps.get(0).expect("whole match");
        if comments.contains(m.start()) {
            continue;
        }
        push(
            m.start(),
            table_from_model(&caps[1]),
            operation_for(&caps[2]),
            "sequelize",
        );
    }

    for caps in MONGOOSE_CALL.captures_iter(content) {
        let m = caps.get(0).expect("whole match");
        if comments.contains(m.start()) {
            continue;
        }
        push(
            m.start(),
            table_from_model(&caps[1]),
            operation_for(&caps[2]),
            "mongoose",
        );
    }

    for caps in SQLALCHEMY_CALL.captures_iter(content) {
        let m = caps.get(0).expect("whole match");
        if comments.contains(m.start()) {
            continue;
        }
        push(
            m.start(),
            table_from_model(&caps[1]),
            AccessOperation::Read,
            "sqlalchemy",
        );
    }

    for caps in DIESEL_CALL.captures_iter(content) {
        let m = caps.get(0).expect("whole match");
        if comments.contains(m.start()) {
            continue;
        }
        let table = caps
            .get(1)
            .or_else(|| caps.get(2))
            .map(|c| c.as_str().to_string())
            .unwrap_or_default();
        let operation = if m.as_str().contains("insert_into") {
            AccessOperation::Write
        } else if m.as_str().contains("update") {
            AccessOperation::Update
        } else if m.as_str().contains("delete") {
            AccessOperation::Delete
        } else {
            AccessOperation::Read
        };
        push(m.start(), table, operation, "diesel");
    }

    for caps in RAW_SQL.captures_iter(content) {
        let m = caps.get(0).expect("whole match");
        if comments.contains(m.start()) {
            continue;
        }
        let (operation, table) = if caps.get(1).is_some() {
            (AccessOperation::Read, caps.get(2))
        } else if caps.get(3).is_some() {
            (AccessOperation::Write, caps.get(4))
        } else if caps.get(5).is_some() {
            (AccessOperation::Update, caps.get(6))
        } else {
            (AccessOperation::Delete, caps.get(8))
        };
        let Some(table) = table else { continue };
        push(
            m.start(),
            table.as_str().to_ascii_lowercase(),
            operation,
            "raw-sql",
        );
    }

    points.sort_by(|a, b| (a.line, &a.framework).cmp(&(b.line, &b.framework)));
    points
}
