//! Route structure detector
//!
//! Mines route declarations across express/fastify/koa-style call chains,
//! NestJS and Flask/FastAPI decorators, and axum routers. Emits the casing,
//! plurality, versioning, and nesting conventions the project follows and
//! flags the declarations that deviate.

use regex::Regex;
use std::sync::LazyLock;

use crate::language::Language;
use crate::model::{DetectionMethod, Outlier, PatternCategory, Severity};

use super::{
    DetectContext, DetectorMeta, DetectorOutput, FormObservation, OutlierEvidence,
    PatternEvidence,
};

static CALL_ROUTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"\b(?:app|router|server|api|fastify)\s*\.\s*(?:get|post|put|delete|patch|options|head|all)\s*\(\s*["'`](/[^"'`\s]*)["'`]"#,
    )
    .expect("route call regex")
});

static DECORATOR_ROUTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"@(?:Get|Post|Put|Delete|Patch|Head|Options|All)\s*\(\s*["'](/?[^"'\s]*)["']"#,
    )
    .expect("decorator route regex")
});

static PYTHON_ROUTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"@(?:app|router|api|blueprint|bp)\.(?:route|get|post|put|delete|patch)\s*\(\s*["'](/[^"'\s]*)["']"#,
    )
    .expect("python route regex")
});

static AXUM_ROUTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\.route\s*\(\s*"(/[^"\s]*)""#).expect("axum route regex")
});

static VERSION_SEGMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^v\d+$").expect("version segment regex"));

/// Paths exempt from versioning checks: health probes and documentation.
const VERSIONING_EXEMPT: &[&str] = &[
    "/health",
    "/healthz",
    "/ping",
    "/status",
    "/metrics",
    "/docs",
    "/api/docs",
    "/api-docs",
    "/swagger",
    "/openapi.json",
];

/// Maximum non-parameter nesting depth before a route is flagged.
const MAX_DEPTH: usize = 4;

#[derive(Debug, Clone, PartialEq)]
struct RouteDecl {
    path: String,
    /// Byte offset of the path literal (first character after the quote)
    path_offset: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SegmentCase {
    Kebab,
    Camel,
    Snake,
}

impl SegmentCase {
    fn classify(segment: &str) -> Option<Self> {
        if segment.is_empty() || is_param_segment(segment) {
            return None;
        }
        if segment.contains('_') {
            Some(SegmentCase::Snake)
        } else if segment.chars().any(|c| c.is_ascii_uppercase()) {
            Some(SegmentCase::Camel)
        } else {
            Some(SegmentCase::Kebab)
        }
    }

    fn form(self) -> &'static str {
        match self {
            SegmentCase::Kebab => "kebab",
            SegmentCase::Camel => "camel",
            SegmentCase::Snake => "snake",
        }
    }
}

fn is_param_segment(segment: &str) -> bool {
    segment.starts_with(':')
        || segment.starts_with('{')
        || segment.starts_with('<')
        || segment.starts_with('[')
        || segment.starts_with('*')
        || segment.starts_with('$')
}

fn segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

/// Converts a camelCase or snake_case segment to kebab-case.
fn to_kebab(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len() + 4);
    for (i, ch) in segment.chars().enumerate() {
        if ch.is_ascii_uppercase() {
            if i > 0 {
                out.push('-');
            }
            out.push(ch.to_ascii_lowercase());
        } else if ch == '_' {
            out.push('-');
        } else {
            out.push(ch);
        }
    }
    out
}

fn is_plural(segment: &str) -> bool {
    let lower = segment.to_ascii_lowercase();
    lower.ends_with('s') && !lower.ends_with("ss") && lower.len() > 2
}

fn pluralize(segment: &str) -> String {
    if let Some(stem) = segment.strip_suffix('y') {
        format!("{}ies", stem)
    } else {
        format!("{}s", segment)
    }
}

fn singularize(segment: &str) -> String {
    if let Some(stem) = segment.strip_suffix("ies") {
        format!("{}y", stem)
    } else {
        segment.strip_suffix('s').unwrap_or(segment).to_string()
    }
}

fn is_versioned(path: &str) -> bool {
    segments(path).iter().any(|s| VERSION_SEGMENT.is_match(s))
}

fn is_versioning_exempt(path: &str) -> bool {
    VERSIONING_EXEMPT
        .iter()
        .any(|exempt| path == *exempt || path.starts_with(&format!("{}/", exempt)))
}

/// The resource segment of a route: the last non-parameter segment.
fn resource_segment(path: &str) -> Option<(usize, String)> {
    let segs = segments(path);
    let mut offset = 0usize;
    let mut result = None;
    for seg in &segs {
        offset = path[offset..]
            .find(seg)
            .map(|i| offset + i)
            .unwrap_or(offset);
        if !is_param_segment(seg) {
            result = Some((offset, (*seg).to_string()));
        }
        offset += seg.len();
    }
    result
}

/// Detector for route declaration conventions.
#[derive(Debug)]
pub struct RouteStructureDetector {
    /// Shared descriptor
    pub meta: DetectorMeta,
}

impl RouteStructureDetector {
    /// Creates the detector with its catalogue descriptor.
    pub fn new() -> Self {
        Self {
            meta: DetectorMeta {
                id: "api/route-structure".into(),
                name: "Route structure".into(),
                description: "URL casing, resource plurality, versioning, and nesting depth \
                              of route declarations"
                    .into(),
                category: PatternCategory::Api,
                subcategory: "route-structure".into(),
                method: DetectionMethod::Regex,
                default_severity: Severity::Warning,
                languages: vec![
                    Language::TypeScript,
                    Language::JavaScript,
                    Language::Python,
                    Language::Rust,
                ],
                include_excluded_files: false,
            },
        }
    }

    fn extract(&self, ctx: &DetectContext<'_>) -> Vec<RouteDecl> {
        let mut routes = Vec::new();
        let patterns: &[&Regex] = match ctx.language {
            Language::Python => &[&PYTHON_ROUTE],
            Language::Rust => &[&AXUM_ROUTE],
            _ => &[&CALL_ROUTE, &DECORATOR_ROUTE],
        };
        for regex in patterns {
            for caps in regex.captures_iter(ctx.content) {
                let whole = caps.get(0).expect("match group 0");
                if ctx.comments.contains(whole.start()) {
                    continue;
                }
                let path_match = caps.get(1).expect("path capture");
                if path_match.as_str().is_empty() {
                    continue;
                }
                routes.push(RouteDecl {
                    path: path_match.as_str().to_string(),
                    path_offset: path_match.start(),
                });
            }
        }
        routes.sort_by_key(|r| r.path_offset);
        routes.dedup();
        routes
    }

    /// Observe phase: count casing, plurality, and versioning forms.
    pub fn observe(&self, ctx: &DetectContext<'_>) -> Vec<FormObservation> {
        let mut observations = Vec::new();
        for route in self.extract(ctx) {
            for seg in segments(&route.path) {
                if let Some(case) = SegmentCase::classify(seg) {
                    observations.push(FormObservation {
                        key: "route-url-casing".into(),
                        form: case.form().into(),
                    });
                }
            }
            if let Some((_, resource)) = resource_segment(&route.path) {
                observations.push(FormObservation {
                    key: "route-plurality".into(),
                    form: if is_plural(&resource) {
                        "plural"
                    } else {
                        "singular"
                    }
                    .into(),
                });
            }
            if !is_versioning_exempt(&route.path) {
                observations.push(FormObservation {
                    key: "route-versioning".into(),
                    form: if is_versioned(&route.path) {
                        "versioned"
                    } else {
                        "unversioned"
                    }
                    .into(),
                });
            }
        }
        observations
    }

    /// Detect phase: evidence for the dominant conventions, outliers for
    /// the declarations that break them.
    pub fn detect(&self, ctx: &DetectContext<'_>) -> DetectorOutput {
        let routes = self.extract(ctx);
        let mut out = DetectorOutput::default();
        if routes.is_empty() {
            return out;
        }

        let dominant_case = ctx
            .summary
            .dominant("route-url-casing", &["kebab", "snake", "camel"]);
        let dominant_plurality = ctx
            .summary
            .dominant("route-plurality", &["plural", "singular"]);
        let versioned_count = ctx
            .summary
            .form_counts
            .get("route-versioning")
            .and_then(|forms| forms.get("versioned").copied())
            .unwrap_or(0);

        for route in &routes {
            self.check_casing(ctx, route, dominant_case.as_ref(), &mut out);
            self.check_plurality(ctx, route, dominant_plurality.as_ref(), &mut out);
            self.check_versioning(ctx, route, versioned_count, &mut out);
            self.check_nesting(ctx, route, &mut out);
        }
        out
    }

    fn check_casing(
        &self,
        ctx: &DetectContext<'_>,
        route: &RouteDecl,
        dominant: Option<&(String, usize)>,
        out: &mut DetectorOutput,
    ) {
        let Some((dominant_form, _)) = dominant else {
            return;
        };
        let mut clean = true;
        let mut offset = route.path_offset;
        for seg in segments(&route.path) {
            let seg_offset = ctx.content[offset..]
                .find(seg)
                .map(|i| offset + i)
                .unwrap_or(offset);
            offset = seg_offset + seg.len();
            let Some(case) = SegmentCase::classify(seg) else {
                continue;
            };
            if case.form() != dominant_form {
                clean = false;
                let fix = match dominant_form.as_str() {
                    "kebab" => to_kebab(seg),
                    "snake" => to_kebab(seg).replace('-', "_"),
                    _ => seg.to_string(),
                };
                out.outliers.push(OutlierEvidence {
                    local_slug: "url-casing".into(),
                    outlier: Outlier {
                        location: ctx.lines.location(ctx.path, seg_offset),
                        reason: format!(
                            "inconsistent-casing: segment '{}' deviates from the dominant \
                             {} convention",
                            seg, dominant_form
                        ),
                        deviation_score: 0.7,
                        suggested_fix: Some(fix),
                    },
                });
            }
        }
        if clean {
            out.matches.push(self.evidence(
                ctx,
                "url-casing",
                "URL casing",
                "Route segments follow one casing convention",
                route.path_offset,
            ));
        }
    }

    fn check_plurality(
        &self,
        ctx: &DetectContext<'_>,
        route: &RouteDecl,
        dominant: Option<&(String, usize)>,
        out: &mut DetectorOutput,
    ) {
        let Some((dominant_form, _)) = dominant else {
            return;
        };
        let Some((seg_rel_offset, resource)) = resource_segment(&route.path) else {
            return;
        };
        let form = if is_plural(&resource) {
            "plural"
        } else {
            "singular"
        };
        if form == dominant_form {
            out.matches.push(self.evidence(
                ctx,
                "resource-plurality",
                "Resource plurality",
                "Resource segments follow one plurality convention",
                route.path_offset,
            ));
        } else {
            let fix = if dominant_form == "plural" {
                pluralize(&resource)
            } else {
                singularize(&resource)
            };
            out.outliers.push(OutlierEvidence {
                local_slug: "resource-plurality".into(),
                outlier: Outlier {
                    location: ctx
                        .lines
                        .location(ctx.path, route.path_offset + seg_rel_offset),
                    reason: format!(
                        "resource '{}' is {} while the project convention is {}",
                        resource, form, dominant_form
                    ),
                    deviation_score: 0.5,
                    suggested_fix: Some(fix),
                },
            });
        }
    }

    fn check_versioning(
        &self,
        ctx: &DetectContext<'_>,
        route: &RouteDecl,
        versioned_count: usize,
        out: &mut DetectorOutput,
    ) {
        if versioned_count == 0 || is_versioning_exempt(&route.path) {
            return;
        }
        if is_versioned(&route.path) {
            out.matches.push(self.evidence(
                ctx,
                "api-versioning",
                "API versioning",
                "Routes carry a version segment",
                route.path_offset,
            ));
        } else {
            out.outliers.push(OutlierEvidence {
                local_slug: "api-versioning".into(),
                outlier: Outlier {
                    location: ctx.lines.location(ctx.path, route.path_offset),
                    reason: format!(
                        "route '{}' is unversioned while versioned routes exist",
                        route.path
                    ),
                    deviation_score: 0.4,
                    suggested_fix: None,
                },
            });
        }
    }

    fn check_nesting(
        &self,
        ctx: &DetectContext<'_>,
        route: &RouteDecl,
        out: &mut DetectorOutput,
    ) {
        let depth = segments(&route.path)
            .iter()
            .filter(|s| !is_param_segment(s))
            .count();
        if depth > MAX_DEPTH {
            out.outliers.push(OutlierEvidence {
                local_slug: "nesting-depth".into(),
                outlier: Outlier {
                    location: ctx.lines.location(ctx.path, route.path_offset),
                    reason: format!(
                        "route '{}' nests {} non-parameter segments (limit {})",
                        route.path, depth, MAX_DEPTH
                    ),
                    deviation_score: 0.6,
                    suggested_fix: None,
                },
            });
        } else {
            out.matches.push(self.evidence(
                ctx,
                "nesting-depth",
                "Route nesting depth",
                "Routes stay within four non-parameter segments",
                route.path_offset,
            ));
        }
    }

    fn evidence(
        &self,
        ctx: &DetectContext<'_>,
        slug: &str,
        name: &str,
        description: &str,
        offset: usize,
    ) -> PatternEvidence {
        PatternEvidence {
            local_slug: slug.into(),
            name: name.into(),
            description: description.into(),
            location: ctx.lines.location(ctx.path, offset),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detectors::testutil::run_detector;
    use crate::detectors::Detector;

    fn detector() -> Detector {
        Detector::RouteStructure(RouteStructureDetector::new())
    }

    #[test]
    fn flags_camel_segment_in_kebab_project() {
        let src = r#"
app.get('/api/users', listUsers);
app.get('/api/users/:id', getUser);
app.get('/api/userProfile', getProfile);
"#;
        let out = run_detector(&detector(), "src/routes.ts", src, Language::TypeScript);
        let casing: Vec<_> = out
            .outliers
            .iter()
            .filter(|o| o.local_slug == "url-casing")
            .collect();
        assert_eq!(casing.len(), 1);
        let outlier = &casing[0].outlier;
        assert!(outlier.reason.contains("inconsistent-casing"));
        assert_eq!(outlier.suggested_fix.as_deref(), Some("user-profile"));
        // Column points at the offending segment, not the route start.
        let line = src.lines().nth(outlier.location.line - 1).unwrap();
        assert_eq!(
            &line[outlier.location.column - 1..outlier.location.column - 1 + "userProfile".len()],
            "userProfile"
        );
    }

    #[test]
    fn versioning_flagged_only_when_versions_exist() {
        let unversioned = r#"
app.get('/api/users', h);
app.get('/api/orders', h);
"#;
        let out = run_detector(&detector(), "src/a.ts", unversioned, Language::TypeScript);
        assert!(out.outliers.iter().all(|o| o.local_slug != "api-versioning"));

        let mixed = r#"
app.get('/api/v1/users', h);
app.get('/api/orders', h);
app.get('/health', h);
"#;
        let out = run_detector(&detector(), "src/a.ts", mixed, Language::TypeScript);
        let versioning: Vec<_> = out
            .outliers
            .iter()
            .filter(|o| o.local_slug == "api-versioning")
            .collect();
        // /health is exempt; only /api/orders is flagged.
        assert_eq!(versioning.len(), 1);
        assert!(versioning[0].outlier.reason.contains("/api/orders"));
    }

    #[test]
    fn deep_nesting_is_flagged() {
        let src = r#"
app.get('/api/v1/orgs/:orgId/teams/:teamId/members/roles/permissions', h);
app.get('/api/v1/users', h);
"#;
        let out = run_detector(&detector(), "src/a.ts", src, Language::TypeScript);
        assert!(out
            .outliers
            .iter()
            .any(|o| o.local_slug == "nesting-depth"));
    }

    #[test]
    fn python_decorators_are_extracted() {
        let src = r#"
@app.route('/api/users', methods=['GET'])
def list_users():
    pass

@app.get('/api/user_profile')
def profile():
    pass
"#;
        let out = run_detector(&detector(), "app/views.py", src, Language::Python);
        // snake segment vs the lone kebab/lower segments: kebab dominates.
        assert!(out
            .outliers
            .iter()
            .any(|o| o.outlier.suggested_fix.as_deref() == Some("user-profile")));
    }

    #[test]
    fn commented_routes_are_ignored() {
        let src = r#"
// app.get('/api/oldThing', h);
app.get('/api/users', h);
app.get('/api/orders', h);
"#;
        let out = run_detector(&detector(), "src/a.ts", src, Language::TypeScript);
        assert!(out.outliers.is_empty());
        assert!(!out.matches.is_empty());
    }

    #[test]
    fn no_routes_means_neutral_confidence() {
        let out = run_detector(
            &detector(),
            "src/util.ts",
            "export const add = (a, b) => a + b;\n",
            Language::TypeScript,
        );
        assert_eq!(out.confidence, 0.5);
        assert!(out.matches.is_empty());
    }
}
