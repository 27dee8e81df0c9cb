use serde::Serialize;
use std::collections::BTreeMap;

/// Severity of a non-fatal finding attached to an analysis run.
#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        }
    }
}

/// A non-fatal finding recorded during analysis. Parse failures, orphaned
/// foreign keys, truncated searches and capability gaps all land here so the
/// caller always receives either a complete report with diagnostics or a
/// single top-level error, never a silently partial report.
#[derive(Debug, Serialize, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Stable machine-readable category, e.g. "parse-failure",
    /// "depth-limit-exceeded", "orphan-foreign-key", "capability-gap".
    pub category: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    pub message: String,
}

impl Diagnostic {
    pub fn parse_failure(path: &str, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            category: "parse-failure".to_string(),
            path: Some(path.to_string()),
            message: message.into(),
        }
    }

    pub fn depth_limit_exceeded(unit_id: &str, max_depth: usize) -> Self {
        Self {
            severity: Severity::Warning,
            category: "depth-limit-exceeded".to_string(),
            path: None,
            message: format!(
                "cycle search abandoned below '{unit_id}': path length would exceed max_depth {max_depth}"
            ),
        }
    }

    pub fn orphan_foreign_key(table: &str, target: &str) -> Self {
        Self {
            severity: Severity::Warning,
            category: "orphan-foreign-key".to_string(),
            path: None,
            message: format!("table '{table}' references '{target}' which is not in the schema"),
        }
    }

    pub fn capability_gap(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Info,
            category: "capability-gap".to_string(),
            path: None,
            message: message.into(),
        }
    }

    pub fn duplicate_unit(path: &str, qualname: &str) -> Self {
        Self {
            severity: Severity::Info,
            category: "duplicate-unit".to_string(),
            path: Some(path.to_string()),
            message: format!("unit '{qualname}' already declared elsewhere, keeping first"),
        }
    }

    pub fn schema_unavailable(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            category: "schema-unavailable".to_string(),
            path: None,
            message: message.into(),
        }
    }
}

#[derive(Debug, Serialize, Default)]
pub struct DiagnosticsSummary {
    pub total: usize,
    pub by_severity: BTreeMap<String, usize>,
    pub by_category: BTreeMap<String, usize>,
}

impl DiagnosticsSummary {
    pub fn from_diagnostics(diagnostics: &[Diagnostic]) -> Self {
        let mut summary = Self {
            total: diagnostics.len(),
            ..Default::default()
        };
        for diag in diagnostics {
            *summary
                .by_severity
                .entry(diag.severity.as_str().to_string())
                .or_default() += 1;
            *summary.by_category.entry(diag.category.clone()).or_default() += 1;
        }
        summary
    }
}
