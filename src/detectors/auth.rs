//! Access-control detector
//!
//! Classifies the auth primitives a project uses (role definitions, role
//! checks, ownership checks, tenant scoping) and flags sensitive operations
//! in service/repository/controller files that carry no ownership check
//! anywhere in the same file.

use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;

use crate::model::{DetectionMethod, Outlier, PatternCategory, Severity};

use super::{
    DetectContext, DetectorMeta, DetectorOutput, FormObservation, OutlierEvidence,
    PatternEvidence,
};

static ROLE_DEFINITION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)\b(?:enum\s+Role|ROLES\s*=|roles\s*:\s*\[|type\s+Role\s*=|class\s+Role\b)"#,
    )
    .expect("role definition regex")
});

static ROLE_CHECK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"\b(?:hasRole|requireRole|checkRole|is_admin|isAdmin)\b|@Roles\b|\b(?:req\.user|current_user|user)\.role\b"#,
    )
    .expect("role check regex")
});

static OWNERSHIP_CHECK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"\b(?:ownerId|owner_id|checkOwnership|isOwner|belongsTo|canEdit|canDelete|canUpdate|req\.user\.id|current_user\.id|user_id\s*==|userId\s*===)"#,
    )
    .expect("ownership check regex")
});

static TENANT_SCOPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\b(?:tenantId|tenant_id|organizationId|organization_id|orgId|workspaceId)\b"#)
        .expect("tenant scope regex")
});

static SENSITIVE_OP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"\.\s*(?:delete|remove|destroy|update)\s*\(|(?i)\b(?:DELETE\s+FROM|UPDATE\s+\w+\s+SET|TRUNCATE\s+TABLE|DROP\s+TABLE)\b"#,
    )
    .expect("sensitive operation regex")
});

/// Whether a file's name suggests it holds service/repository/controller
/// logic, where sensitive operations are expected to check ownership.
fn has_data_role(path: &Path) -> bool {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    ["service", "repository", "repo", "controller", "handler", "dao"]
        .iter()
        .any(|role| name.contains(role))
}

/// Detector for auth, RBAC, and ownership conventions.
#[derive(Debug)]
pub struct AccessControlDetector {
    /// Shared descriptor
    pub meta: DetectorMeta,
}

impl AccessControlDetector {
    /// Creates the detector with its catalogue descriptor.
    pub fn new() -> Self {
        Self {
            meta: DetectorMeta {
                id: "auth/access-control".into(),
                name: "Access control".into(),
                description: "Role, ownership, and tenant-scoping primitives; sensitive \
                              operations missing ownership checks"
                    .into(),
                category: PatternCategory::Auth,
                subcategory: "access-control".into(),
                method: DetectionMethod::Semantic,
                default_severity: Severity::Error,
                languages: Vec::new(), // applies to every supported language
                include_excluded_files: false,
            },
        }
    }

    /// Observe phase: access control has no competing forms to count.
    pub fn observe(&self, _ctx: &DetectContext<'_>) -> Vec<FormObservation> {
        Vec::new()
    }

    /// Detect phase: evidence for each primitive, violations for unguarded
    /// sensitive operations.
    pub fn detect(&self, ctx: &DetectContext<'_>) -> DetectorOutput {
        let mut out = DetectorOutput::default();

        let primitives: [(&Regex, &str, &str, &str); 4] = [
            (
                &ROLE_DEFINITION,
                "role-definition",
                "Role definitions",
                "Roles are declared as a first-class construct",
            ),
            (
                &ROLE_CHECK,
                "role-check",
                "Role checks",
                "Handlers gate behavior on the caller's role",
            ),
            (
                &OWNERSHIP_CHECK,
                "ownership-check",
                "Ownership checks",
                "Mutations verify the caller owns the row",
            ),
            (
                &TENANT_SCOPE,
                "tenant-scoping",
                "Tenant scoping",
                "Queries are scoped to the caller's tenant",
            ),
        ];

        let mut has_ownership = false;
        for (regex, slug, name, description) in primitives {
            for m in regex.find_iter(ctx.content) {
                if ctx.comments.contains(m.start()) {
                    continue;
                }
                if slug == "ownership-check" {
                    has_ownership = true;
                }
                out.matches.push(PatternEvidence {
                    local_slug: slug.into(),
                    name: name.into(),
                    description: description.into(),
                    location: ctx.lines.location(ctx.path, m.start()),
                });
            }
        }

        if has_data_role(ctx.path) && !has_ownership {
            for m in SENSITIVE_OP.find_iter(ctx.content) {
                if ctx.comments.contains(m.start()) {
                    continue;
                }
                out.outliers.push(OutlierEvidence {
                    local_slug: "ownership-check".into(),
                    outlier: Outlier {
                        location: ctx.lines.location(ctx.path, m.start()),
                        reason: format!(
                            "sensitive operation '{}' in {} with no ownership check in the file",
                            m.as_str().trim(),
                            ctx.path.display()
                        ),
                        deviation_score: 0.8,
                        suggested_fix: None,
                    },
                });
            }
        }

        out
    }
}
