//! Sensitive-field classification
//!
//! A layered dictionary plus regex rules classify `(table, field)` pairs.
//! Precedence runs credentials > financial > health > pii > internal;
//! a field matching several classes takes the highest. Classification is
//! deterministic for a given pair.

use regex::Regex;
use std::sync::LazyLock;

use crate::model::{AccessPoint, SensitiveField, Sensitivity};

struct ClassRule {
    sensitivity: Sensitivity,
    exact: &'static [&'static str],
    pattern: &'static LazyLock<Regex>,
}

static CREDENTIALS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(password|passwd|pwd|secret|token|api_?key|private_?key|credential|salt|hash(ed)?_?password)")
        .expect("credentials regex")
});

static FINANCIAL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(card_?number|cvv|cvc|iban|account_?number|routing_?number|salary|balance|invoice|payment)")
        .expect("financial regex")
});

static HEALTH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(diagnosis|prescription|medical|blood_?type|allergies|insurance_?number|patient)")
        .expect("health regex")
});

static PII_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(email|phone|address|first_?name|last_?name|full_?name|birth|dob|ssn|social_?security|passport|national_?id|ip_?address)")
        .expect("pii regex")
});

static INTERNAL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(internal_?note|admin_?comment|audit|created_by|deleted_at|tenant_?id)")
        .expect("internal regex")
});

static RULES: &[ClassRule] = &[
    ClassRule {
        sensitivity: Sensitivity::Credentials,
        exact: &["password", "secret", "token", "api_key", "refresh_token"],
        pattern: &CREDENTIALS_RE,
    },
    ClassRule {
        sensitivity: Sensitivity::Financial,
        exact: &["iban", "cvv", "balance", "card_number"],
        pattern: &FINANCIAL_RE,
    },
    ClassRule {
        sensitivity: Sensitivity::Health,
        exact: &["diagnosis", "prescription", "blood_type"],
        pattern: &HEALTH_RE,
    },
    ClassRule {
        sensitivity: Sensitivity::Pii,
        exact: &["email", "phone", "ssn", "dob", "address"],
        pattern: &PII_RE,
    },
    ClassRule {
        sensitivity: Sensitivity::Internal,
        exact: &["created_by", "deleted_at", "tenant_id"],
        pattern: &INTERNAL_RE,
    },
];

/// Classifies one field name. `None` means the field is public.
pub fn classify_field(field: &str) -> Option<Sensitivity> {
    let lower = field.to_ascii_lowercase();
    for rule in RULES {
        if rule.exact.contains(&lower.as_str()) || rule.pattern.is_match(&lower) {
            return Some(rule.sensitivity);
        }
    }
    None
}

/// Classifies every field referenced by the given access points.
///
/// The output is deduplicated by `(table, field)` and sorted, so repeated
/// scans of the same project produce identical classifications.
pub fn classify_access_points(points: &[AccessPoint]) -> Vec<SensitiveField> {
    let mut fields: Vec<SensitiveField> = Vec::new();
    for point in points {
        for field in &point.fields {
            if let Some(sensitivity) = classify_field(field) {
                fields.push(SensitiveField {
                    table: point.table.clone(),
                    field: field.clone(),
                    sensitivity,
                });
            }
        }
    }
    fields.sort_by(|a, b| (&a.table, &a.field).cmp(&(&b.table, &b.field)));
    fields.dedup_by(|a, b| a.table == b.table && a.field == b.field);
    fields
}
