//! Project graph construction.
//!
//! Scans the project tree, fans per-file extraction out to a bounded worker
//! pool, then merges, de-duplicates and re-sorts everything into a single
//! [`DependencyGraph`]. The merge runs strictly in path order after every
//! worker has finished, so downstream output never depends on scheduling.

use crate::adapter::{AdapterRegistry, EdgeInput, ExtractedFile};
use crate::config::Config;
use crate::diagnostics::Diagnostic;
use crate::error::EngineError;
use crate::model::{DependencyEdge, DependencyGraph, SourceUnit, UnitKind};
use crate::scan::{self, ScanOptions, ScannedFile};
use anyhow::{Result, bail};
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, mpsc};
use std::thread;

/// Cooperative cancellation flag. Workers check it between files, never
/// mid-file; the schema introspection thread checks it before connecting.
#[derive(Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BuildOptions {
    pub no_ignore: bool,
}

enum FileParse {
    Parsed(ExtractedFile),
    Failed(String),
}

pub struct GraphBuilder {
    options: BuildOptions,
    cancel: CancelToken,
}

impl GraphBuilder {
    pub fn new(options: BuildOptions, cancel: CancelToken) -> Self {
        Self { options, cancel }
    }

    /// Parse every matching file under `project_root` and assemble the
    /// dependency graph. Per-file failures become diagnostics; only
    /// project-level preconditions abort.
    pub fn build(&self, project_root: &Path, language_tag: &str) -> Result<DependencyGraph> {
        if !project_root.is_dir() {
            bail!(EngineError::BadProjectPath(project_root.to_path_buf()));
        }
        let languages = scan::expand_language_filter(language_tag)?;
        let files = scan::scan_project(
            project_root,
            &languages,
            ScanOptions {
                no_ignore: self.options.no_ignore,
            },
        )?;
        if files.is_empty() {
            bail!(EngineError::EmptyProject {
                language: language_tag.to_string(),
                path: project_root.to_path_buf(),
            });
        }

        let parses = self.parse_files(&files)?;
        if self.cancel.is_cancelled() {
            bail!("analysis cancelled");
        }

        let mut graph = DependencyGraph {
            language: language_tag.to_string(),
            source_digest: scan::project_digest(&files),
            ..Default::default()
        };
        let mut raw_edges: Vec<(usize, EdgeInput)> = Vec::new();

        for (idx, (file, parse)) in files.iter().zip(parses.into_iter()).enumerate() {
            match parse {
                FileParse::Parsed(extracted) => {
                    for unit in extracted.units {
                        let id = unit.qualname.clone();
                        if graph.units.contains_key(&id) {
                            graph
                                .diagnostics
                                .push(Diagnostic::duplicate_unit(&file.rel_path, &unit.qualname));
                            continue;
                        }
                        graph.units.insert(
                            id.clone(),
                            SourceUnit {
                                id,
                                qualified_name: unit.qualname.clone(),
                                file_path: file.rel_path.clone(),
                                language: file.language.clone(),
                                kind: unit.kind,
                                line_count: unit.line_count(),
                            },
                        );
                    }
                    for edge in extracted.edges {
                        raw_edges.push((idx, edge));
                    }
                }
                FileParse::Failed(message) => {
                    tracing::debug!(path = %file.rel_path, "extraction failed: {message}");
                    graph
                        .diagnostics
                        .push(Diagnostic::parse_failure(&file.rel_path, message));
                }
            }
        }

        self.resolve_edges(&mut graph, &files, raw_edges);

        debug_assert!(graph.check_invariants().is_ok());
        tracing::debug!(
            units = graph.units.len(),
            edges = graph.edges.len(),
            diagnostics = graph.diagnostics.len(),
            "graph built"
        );
        Ok(graph)
    }

    /// Fan extraction out over a bounded pool. Results land in a slot per
    /// file, so collection order is independent of worker scheduling.
    fn parse_files(&self, files: &[ScannedFile]) -> Result<Vec<FileParse>> {
        let pool_size = files.len().min(Config::get().max_workers).max(1);
        let cursor = AtomicUsize::new(0);
        let (tx, rx) = mpsc::channel::<(usize, FileParse)>();
        let mut slots: Vec<Option<FileParse>> = Vec::with_capacity(files.len());
        slots.resize_with(files.len(), || None);

        thread::scope(|pool| {
            for _ in 0..pool_size {
                let tx = tx.clone();
                let cursor = &cursor;
                let cancel = self.cancel.clone();
                pool.spawn(move || {
                    let mut registry = match AdapterRegistry::with_defaults() {
                        Ok(registry) => registry,
                        Err(err) => {
                            tracing::warn!("adapter registry init failed: {err}");
                            return;
                        }
                    };
                    loop {
                        if cancel.is_cancelled() {
                            break;
                        }
                        let idx = cursor.fetch_add(1, Ordering::SeqCst);
                        if idx >= files.len() {
                            break;
                        }
                        let parse = parse_one(&mut registry, &files[idx]);
                        if tx.send((idx, parse)).is_err() {
                            break;
                        }
                    }
                });
            }
            drop(tx);
            for (idx, parse) in rx {
                slots[idx] = Some(parse);
            }
        });

        Ok(slots
            .into_iter()
            .map(|slot| {
                slot.unwrap_or_else(|| FileParse::Failed("worker did not produce a result".into()))
            })
            .collect())
    }

    /// Resolve raw edge candidates against the merged unit map. Unresolved
    /// targets become synthetic external units rather than dropped edges.
    fn resolve_edges(
        &self,
        graph: &mut DependencyGraph,
        files: &[ScannedFile],
        raw_edges: Vec<(usize, EdgeInput)>,
    ) {
        // Units bucketed by their final name segment, for suffix matching.
        let mut by_last_segment: HashMap<String, Vec<String>> = HashMap::new();
        for unit in graph.units.values() {
            by_last_segment
                .entry(last_segment(&unit.id).to_string())
                .or_default()
                .push(unit.id.clone());
        }

        let mut externals: Vec<SourceUnit> = Vec::new();
        for (file_idx, edge) in raw_edges {
            let source_id = edge.source_qualname.clone();
            if !graph.units.contains_key(&source_id) {
                // Source lost to a duplicate-unit skip in another file.
                continue;
            }
            let file_path = &files[file_idx].rel_path;
            let target_id = match self.resolve_target(
                graph,
                &by_last_segment,
                &edge.target_qualname,
                file_path,
            ) {
                Some(id) => id,
                None => {
                    let external = SourceUnit::external(&edge.target_qualname);
                    let id = external.id.clone();
                    externals.push(external);
                    id
                }
            };
            if target_id == source_id {
                continue;
            }
            graph
                .edges
                .insert(DependencyEdge::new(source_id, target_id, edge.kind));
        }
        for external in externals {
            graph.units.entry(external.id.clone()).or_insert(external);
        }
    }

    fn resolve_target(
        &self,
        graph: &DependencyGraph,
        by_last_segment: &HashMap<String, Vec<String>>,
        target: &str,
        source_file: &str,
    ) -> Option<String> {
        if graph.units.contains_key(target) {
            return Some(target.to_string());
        }
        let last = last_segment(target);
        let candidates = by_last_segment.get(last)?;
        if target == last {
            // Single-segment target: unique suffix match project-wide.
            return unique_suffix_match(graph, candidates, target);
        }
        // Multi-segment: try the full dotted/scoped suffix first.
        if let Some(hit) = unique_suffix_match(graph, candidates, target) {
            return Some(hit);
        }
        // Receiver-variable calls ("s.listen") resolve within the same
        // file first, then fall back to a project-wide unique name match
        // (adapters guess module-local qualnames for bare calls, so the
        // prefix is often wrong while the name is right).
        let same_file: Vec<String> = candidates
            .iter()
            .filter(|id| {
                graph
                    .unit(id)
                    .map(|unit| unit.file_path == source_file)
                    .unwrap_or(false)
            })
            .cloned()
            .collect();
        if let Some(hit) = unique_suffix_match(graph, &same_file, last) {
            return Some(hit);
        }
        unique_suffix_match(graph, candidates, last)
    }
}

fn parse_one(registry: &mut AdapterRegistry, file: &ScannedFile) -> FileParse {
    let source = match crate::util::read_to_string(&file.abs_path) {
        Ok(source) => source,
        Err(err) => return FileParse::Failed(err.to_string()),
    };
    let adapter = match registry.for_language(&file.language) {
        Ok(adapter) => adapter,
        Err(err) => return FileParse::Failed(err.to_string()),
    };
    let module_name = adapter.module_name_from_rel_path(&file.rel_path);
    match adapter.extract(&source, &module_name) {
        Ok(extracted) => FileParse::Parsed(extracted),
        Err(err) => FileParse::Failed(err.to_string()),
    }
}

fn unique_suffix_match(
    graph: &DependencyGraph,
    candidates: &[String],
    suffix: &str,
) -> Option<String> {
    let mut hit: Option<&String> = None;
    for id in candidates {
        if !matches_suffix(id, suffix) {
            continue;
        }
        if graph
            .unit(id)
            .map(|unit| unit.kind == UnitKind::External)
            .unwrap_or(true)
        {
            continue;
        }
        if hit.is_some() {
            return None; // ambiguous
        }
        hit = Some(id);
    }
    hit.cloned()
}

fn matches_suffix(qualname: &str, suffix: &str) -> bool {
    if qualname == suffix {
        return true;
    }
    if !qualname.ends_with(suffix) {
        return false;
    }
    let boundary = qualname.as_bytes()[qualname.len() - suffix.len() - 1];
    matches!(boundary, b'.' | b'/' | b':')
}

fn last_segment(qualname: &str) -> &str {
    qualname
        .rsplit(|ch| ch == '.' || ch == '/' || ch == ':')
        .next()
        .unwrap_or(qualname)
}

/// One row of the module-level dependency matrix.
#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct ModuleEdge {
    pub source_module: String,
    pub target_module: String,
    pub call_count: usize,
    pub import_count: usize,
}

/// Collapse the unit graph to file-level modules. Output is sorted by
/// (source, target); `scope` filters displayed rows only, never parsing.
pub fn module_matrix(graph: &DependencyGraph, scope: Option<&str>) -> Vec<ModuleEdge> {
    let mut counts: HashMap<(String, String), (usize, usize)> = HashMap::new();
    for edge in &graph.edges {
        let Some(from) = graph.unit(&edge.from_unit_id) else {
            continue;
        };
        let Some(to) = graph.unit(&edge.to_unit_id) else {
            continue;
        };
        if let Some(scope) = scope {
            if !unit_matches_scope(from, scope) && !unit_matches_scope(to, scope) {
                continue;
            }
        }
        let from_module = module_label(from);
        let to_module = module_label(to);
        if from_module == to_module {
            continue;
        }
        let slot = counts.entry((from_module, to_module)).or_default();
        match edge.edge_kind {
            crate::model::EdgeKind::Call => slot.0 += 1,
            crate::model::EdgeKind::Import => slot.1 += 1,
        }
    }
    let mut rows: Vec<ModuleEdge> = counts
        .into_iter()
        .map(|((source_module, target_module), (calls, imports))| ModuleEdge {
            source_module,
            target_module,
            call_count: calls,
            import_count: imports,
        })
        .collect();
    rows.sort_by(|a, b| {
        (&a.source_module, &a.target_module).cmp(&(&b.source_module, &b.target_module))
    });
    rows
}

pub fn render_matrix_text(rows: &[ModuleEdge]) -> String {
    let mut out = String::new();
    for row in rows {
        out.push_str(&format!(
            "{} -> {} [calls={} imports={}]\n",
            row.source_module, row.target_module, row.call_count, row.import_count
        ));
    }
    out
}

fn module_label(unit: &SourceUnit) -> String {
    if unit.kind == UnitKind::External {
        "<external>".to_string()
    } else {
        unit.file_path.clone()
    }
}

pub fn unit_matches_scope(unit: &SourceUnit, scope: &str) -> bool {
    if unit.qualified_name == scope || unit.file_path == scope {
        return true;
    }
    unit.qualified_name
        .split(|ch| ch == '.' || ch == '/' || ch == ':')
        .any(|segment| segment == scope)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EdgeKind;

    fn unit(id: &str, file: &str, kind: UnitKind) -> SourceUnit {
        SourceUnit {
            id: id.to_string(),
            qualified_name: id.to_string(),
            file_path: file.to_string(),
            language: "python".to_string(),
            kind,
            line_count: 10,
        }
    }

    fn graph_with_units(units: Vec<SourceUnit>) -> DependencyGraph {
        let mut graph = DependencyGraph::default();
        for u in units {
            graph.units.insert(u.id.clone(), u);
        }
        graph
    }

    #[test]
    fn suffix_match_requires_a_segment_boundary() {
        assert!(matches_suffix("pkg.core.run", "run"));
        assert!(matches_suffix("pkg/util.Helper", "util.Helper"));
        assert!(!matches_suffix("pkg.core.rerun", "run"));
    }

    #[test]
    fn matrix_groups_by_file_and_sorts() {
        let mut graph = graph_with_units(vec![
            unit("a.main", "a.py", UnitKind::Function),
            unit("b.helper", "b.py", UnitKind::Function),
            unit("a", "a.py", UnitKind::Module),
            unit("b", "b.py", UnitKind::Module),
        ]);
        graph
            .edges
            .insert(DependencyEdge::new("a.main", "b.helper", EdgeKind::Call));
        graph.edges.insert(DependencyEdge::new("a", "b", EdgeKind::Import));
        let rows = module_matrix(&graph, None);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].source_module, "a.py");
        assert_eq!(rows[0].target_module, "b.py");
        assert_eq!(rows[0].call_count, 1);
        assert_eq!(rows[0].import_count, 1);
    }

    #[test]
    fn scope_filters_matrix_rows_only() {
        let mut graph = graph_with_units(vec![
            unit("a.main", "a.py", UnitKind::Function),
            unit("b.helper", "b.py", UnitKind::Function),
            unit("c.other", "c.py", UnitKind::Function),
        ]);
        graph
            .edges
            .insert(DependencyEdge::new("a.main", "b.helper", EdgeKind::Call));
        graph
            .edges
            .insert(DependencyEdge::new("c.other", "b.helper", EdgeKind::Call));
        let rows = module_matrix(&graph, Some("a"));
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].source_module, "a.py");
    }
}
