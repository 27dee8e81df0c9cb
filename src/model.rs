use crate::diagnostics::Diagnostic;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Kind of a declared source unit. `module` units stand for whole files and
/// anchor import edges; `external` units are synthesized for call targets
/// that resolve outside the project so fan-out counts stay meaningful.
#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum UnitKind {
    Function,
    Method,
    Class,
    Module,
    External,
}

impl UnitKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnitKind::Function => "function",
            UnitKind::Method => "method",
            UnitKind::Class => "class",
            UnitKind::Module => "module",
            UnitKind::External => "external",
        }
    }
}

/// A declared callable or container extracted from one source file.
/// Immutable for the duration of one analysis run; the id is the qualified
/// name, which is unique per project because module paths derive from
/// relative file paths.
#[derive(Debug, Serialize, Clone)]
pub struct SourceUnit {
    pub id: String,
    pub qualified_name: String,
    pub file_path: String,
    pub language: String,
    pub kind: UnitKind,
    pub line_count: i64,
}

impl SourceUnit {
    pub fn external(target: &str) -> Self {
        Self {
            id: format!("external:{target}"),
            qualified_name: target.to_string(),
            file_path: String::new(),
            language: String::new(),
            kind: UnitKind::External,
            line_count: 0,
        }
    }

    pub fn is_external(&self) -> bool {
        self.kind == UnitKind::External
    }
}

#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    Call,
    Import,
}

impl EdgeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeKind::Call => "call",
            EdgeKind::Import => "import",
        }
    }
}

/// Directed dependency between two units. Ordering is (from, to, kind) so a
/// BTreeSet gives both set semantics per ordered pair + kind and a stable
/// iteration order for downstream output.
#[derive(Debug, Serialize, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct DependencyEdge {
    pub from_unit_id: String,
    pub to_unit_id: String,
    pub edge_kind: EdgeKind,
}

impl DependencyEdge {
    pub fn new(from: impl Into<String>, to: impl Into<String>, kind: EdgeKind) -> Self {
        Self {
            from_unit_id: from.into(),
            to_unit_id: to.into(),
            edge_kind: kind,
        }
    }
}

/// The merged project dependency graph. Rebuilt fully per request; every
/// edge endpoint is present in `units`.
#[derive(Debug, Serialize, Default)]
pub struct DependencyGraph {
    pub units: BTreeMap<String, SourceUnit>,
    pub edges: BTreeSet<DependencyEdge>,
    pub language: String,
    /// blake3 digest over the sorted per-file content hashes; identical for
    /// identical source trees, so byte-identical reruns are auditable.
    pub source_digest: String,
    pub diagnostics: Vec<Diagnostic>,
}

impl DependencyGraph {
    pub fn unit(&self, id: &str) -> Option<&SourceUnit> {
        self.units.get(id)
    }

    /// Units declared in one file, in id order.
    pub fn units_in_file(&self, file_path: &str) -> Vec<&SourceUnit> {
        self.units
            .values()
            .filter(|unit| unit.file_path == file_path)
            .collect()
    }

    pub fn out_degree(&self, unit_id: &str) -> usize {
        self.edges
            .iter()
            .filter(|edge| edge.from_unit_id == unit_id)
            .count()
    }

    pub fn in_degree(&self, unit_id: &str) -> usize {
        self.edges
            .iter()
            .filter(|edge| edge.to_unit_id == unit_id)
            .count()
    }

    /// Forward adjacency in deterministic order.
    pub fn adjacency(&self) -> BTreeMap<&str, Vec<&DependencyEdge>> {
        let mut adjacency: BTreeMap<&str, Vec<&DependencyEdge>> = BTreeMap::new();
        for edge in &self.edges {
            adjacency
                .entry(edge.from_unit_id.as_str())
                .or_default()
                .push(edge);
        }
        adjacency
    }

    /// Reverse adjacency in deterministic order.
    pub fn reverse_adjacency(&self) -> BTreeMap<&str, Vec<&DependencyEdge>> {
        let mut adjacency: BTreeMap<&str, Vec<&DependencyEdge>> = BTreeMap::new();
        for edge in &self.edges {
            adjacency
                .entry(edge.to_unit_id.as_str())
                .or_default()
                .push(edge);
        }
        adjacency
    }

    /// Every edge endpoint must exist in the unit map.
    pub fn check_invariants(&self) -> Result<(), String> {
        for edge in &self.edges {
            if !self.units.contains_key(&edge.from_unit_id) {
                return Err(format!("edge source '{}' missing from unit map", edge.from_unit_id));
            }
            if !self.units.contains_key(&edge.to_unit_id) {
                return Err(format!("edge target '{}' missing from unit map", edge.to_unit_id));
            }
        }
        Ok(())
    }
}

/// One elementary cycle. `nodes` excludes the duplicate closing node but
/// implies the closing edge back to `nodes[0]`; the sequence is rotated to
/// start at its lexicographically smallest member.
#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct Cycle {
    pub nodes: Vec<String>,
    pub length: usize,
}

impl Cycle {
    /// Canonicalize by rotating to the smallest member. Direction is
    /// preserved; reversing would describe a different edge set.
    pub fn from_path(path: &[String]) -> Self {
        let smallest = path
            .iter()
            .enumerate()
            .min_by(|a, b| a.1.cmp(b.1))
            .map(|(idx, _)| idx)
            .unwrap_or(0);
        let mut nodes = Vec::with_capacity(path.len());
        for offset in 0..path.len() {
            nodes.push(path[(smallest + offset) % path.len()].clone());
        }
        let length = nodes.len();
        Self { nodes, length }
    }
}

/// Result of a cycle search. `truncated` distinguishes "no cycle found"
/// from "search abandoned at the depth bound".
#[derive(Debug, Serialize, Default)]
pub struct CycleSearch {
    pub cycles: Vec<Cycle>,
    pub truncated: bool,
    pub diagnostics: Vec<Diagnostic>,
}
