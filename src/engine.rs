//! Top-level analysis orchestration.
//!
//! One `AnalysisRequest` in, one `ImpactReport` out. The engine holds no
//! state between requests: every invocation re-scans and re-parses the
//! requested scope, so the report always reflects the source tree as it is
//! on disk. Concurrent requests against the same project are safe because
//! nothing is ever written.

use crate::builder::{BuildOptions, CancelToken, GraphBuilder};
use crate::config::Config;
use crate::diagnostics::Diagnostic;
use crate::error::EngineError;
use crate::report::{self, ImpactReport};
use crate::schema::{self, SchemaGraph, SchemaSource};
use crate::score::ChangeType;
use anyhow::{Result, bail};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct DatabaseRequest {
    pub dialect: String,
    pub source: SchemaSource,
}

#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub project_path: PathBuf,
    pub language: String,
    pub target_files: Vec<String>,
    pub change_type: ChangeType,
    pub change_description: String,
    /// Recursion-path bound for cycle detection; engine default when None.
    pub max_depth: Option<usize>,
    pub no_ignore: bool,
    pub database: Option<DatabaseRequest>,
}

pub fn analyze(request: &AnalysisRequest, cancel: CancelToken) -> Result<ImpactReport> {
    let config = Config::get();
    let builder = GraphBuilder::new(
        BuildOptions {
            no_ignore: request.no_ignore,
        },
        cancel.clone(),
    );
    let graph = builder.build(&request.project_path, &request.language)?;
    if cancel.is_cancelled() {
        bail!("analysis cancelled");
    }

    let targets = normalize_targets(&request.project_path, &request.target_files);
    let target_texts = read_target_texts(&request.project_path, &targets);

    let schema = match &request.database {
        Some(database) => Some(load_schema(database, config)?),
        None => None,
    };
    if cancel.is_cancelled() {
        bail!("analysis cancelled");
    }

    let max_depth = request.max_depth.unwrap_or(config.max_depth);
    report::assemble_report(
        &graph,
        config,
        max_depth,
        &targets,
        &target_texts,
        request.change_type,
        schema.as_ref(),
        &request.change_description,
    )
}

/// An unknown dialect degrades the report (capability gap, database section
/// omitted) rather than aborting the whole request; only project-level
/// preconditions abort.
fn load_schema(database: &DatabaseRequest, config: &Config) -> Result<SchemaGraph> {
    match schema::extract(
        &database.source,
        &database.dialect,
        Duration::from_secs(config.schema_timeout_secs),
    ) {
        Ok(graph) => Ok(graph),
        Err(err) => {
            let unsupported = err
                .downcast_ref::<EngineError>()
                .map(|e| matches!(e, EngineError::UnsupportedDialect(_)))
                .unwrap_or(false);
            if !unsupported {
                return Err(err);
            }
            let mut graph = SchemaGraph {
                dialect: database.dialect.clone(),
                ..Default::default()
            };
            graph.diagnostics.push(Diagnostic::capability_gap(format!(
                "unsupported database dialect '{}'; database impact omitted",
                database.dialect
            )));
            Ok(graph)
        }
    }
}

/// Accept target files as project-relative or absolute paths and normalize
/// both to the forward-slash relative form the graph uses.
fn normalize_targets(project_root: &Path, targets: &[String]) -> Vec<String> {
    targets
        .iter()
        .map(|target| {
            let path = Path::new(target);
            if path.is_absolute() {
                crate::util::normalize_rel_path(project_root, path)
                    .unwrap_or_else(|_| crate::util::normalize_path(path))
            } else {
                crate::util::normalize_path(path)
            }
        })
        .collect()
}

fn read_target_texts(project_root: &Path, targets: &[String]) -> Vec<(String, String)> {
    targets
        .iter()
        .filter_map(|rel| {
            let abs = project_root.join(rel);
            match crate::util::read_to_string(&abs) {
                Ok(text) => Some((rel.clone(), text)),
                Err(err) => {
                    tracing::debug!(path = %rel, "target file unreadable: {err}");
                    None
                }
            }
        })
        .collect()
}
