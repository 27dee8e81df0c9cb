//! Report assembly.
//!
//! Combines the dependency graph, cycle search, impact score and optional
//! schema impact into one structured report. Every statement in the report
//! is templated from signals already computed; prose embellishment belongs
//! to downstream consumers, which keeps this output deterministic and
//! independently testable.

use crate::config::Config;
use crate::cycles;
use crate::diagnostics::{Diagnostic, DiagnosticsSummary};
use crate::model::{Cycle, CycleSearch, DependencyGraph, EdgeKind, UnitKind};
use crate::schema::SchemaGraph;
use crate::score::{ChangeType, ImpactScore, RiskLevel};
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};

#[derive(Debug, Serialize, Clone)]
pub struct AffectedComponent {
    pub name: String,
    pub file_path: String,
    pub distance: usize,
    pub impact_level: RiskLevel,
    pub reason: String,
}

#[derive(Debug, Serialize, Clone)]
pub struct Risk {
    pub category: String,
    pub description: String,
    pub severity: RiskLevel,
}

#[derive(Debug, Serialize, Clone)]
pub struct DatabaseImpact {
    pub affected_tables: Vec<String>,
    pub migration_required: bool,
    pub backup_recommended: bool,
}

#[derive(Debug, Serialize)]
pub struct ImpactReport {
    pub change_description: String,
    pub language: String,
    pub change_type: ChangeType,
    pub target_files: Vec<String>,
    pub source_digest: String,
    pub score: ImpactScore,
    pub cycles: Vec<Cycle>,
    pub cycle_search_truncated: bool,
    pub affected_components: Vec<AffectedComponent>,
    pub risks: Vec<Risk>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_impact: Option<DatabaseImpact>,
    pub diagnostics: Vec<Diagnostic>,
    pub diagnostics_summary: DiagnosticsSummary,
}

pub struct ReportAssembler<'a> {
    graph: &'a DependencyGraph,
    config: &'a Config,
}

impl<'a> ReportAssembler<'a> {
    pub fn new(graph: &'a DependencyGraph, config: &'a Config) -> Self {
        Self { graph, config }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn assemble(
        &self,
        search: CycleSearch,
        score: ImpactScore,
        schema: Option<&SchemaGraph>,
        target_files: &[String],
        target_texts: &[(String, String)],
        change: ChangeType,
        change_description: &str,
    ) -> ImpactReport {
        let affected = self.affected_components(target_files);
        let database_impact = schema.and_then(|schema| {
            self.database_impact(schema, target_texts, change)
        });
        let risks = self.derive_risks(&search.cycles, &score, schema, &database_impact, change);

        let mut diagnostics = self.graph.diagnostics.clone();
        diagnostics.extend(search.diagnostics.clone());
        if let Some(schema) = schema {
            diagnostics.extend(schema.diagnostics.clone());
        }
        let diagnostics_summary = DiagnosticsSummary::from_diagnostics(&diagnostics);

        ImpactReport {
            change_description: change_description.to_string(),
            language: self.graph.language.clone(),
            change_type: change,
            target_files: target_files.to_vec(),
            source_digest: self.graph.source_digest.clone(),
            score,
            cycles: search.cycles,
            cycle_search_truncated: search.truncated,
            affected_components: affected,
            risks,
            database_impact,
            diagnostics,
            diagnostics_summary,
        }
    }

    /// Units reachable from any target unit within the hop limit, in either
    /// direction. Distance is the shortest path to a target; the reason is
    /// templated from the edge that first connected the unit.
    fn affected_components(&self, target_files: &[String]) -> Vec<AffectedComponent> {
        let forward = self.graph.adjacency();
        let reverse = self.graph.reverse_adjacency();
        let hop_limit = self.config.hop_limit;

        let mut found: BTreeMap<&str, (usize, String)> = BTreeMap::new();
        let mut queue: VecDeque<(&str, usize)> = VecDeque::new();

        // Seed with every unit declared in a target file, in id order.
        for unit in self.graph.units.values() {
            if target_files.iter().any(|path| *path == unit.file_path)
                && unit.kind != UnitKind::External
            {
                found.insert(unit.id.as_str(), (0, "changed directly".to_string()));
                queue.push_back((unit.id.as_str(), 0));
            }
        }

        while let Some((id, distance)) = queue.pop_front() {
            if distance >= hop_limit {
                continue;
            }
            // Callees: the changed code invokes them.
            if let Some(edges) = forward.get(id) {
                for edge in edges {
                    let to = edge.to_unit_id.as_str();
                    if !found.contains_key(to) {
                        let reason = match edge.edge_kind {
                            EdgeKind::Call => format!("called by `{id}`"),
                            EdgeKind::Import => format!("imported by `{id}`"),
                        };
                        found.insert(to, (distance + 1, reason));
                        queue.push_back((to, distance + 1));
                    }
                }
            }
            // Callers: they depend on the changed code.
            if let Some(edges) = reverse.get(id) {
                for edge in edges {
                    let from = edge.from_unit_id.as_str();
                    if !found.contains_key(from) {
                        let reason = match edge.edge_kind {
                            EdgeKind::Call => format!("calls `{id}`"),
                            EdgeKind::Import => format!("imports `{id}`"),
                        };
                        found.insert(from, (distance + 1, reason));
                        queue.push_back((from, distance + 1));
                    }
                }
            }
        }

        let mut components: Vec<AffectedComponent> = found
            .into_iter()
            .filter_map(|(id, (distance, reason))| {
                let unit = self.graph.unit(id)?;
                Some(AffectedComponent {
                    name: unit.qualified_name.clone(),
                    file_path: unit.file_path.clone(),
                    distance,
                    impact_level: impact_level_for_distance(distance),
                    reason,
                })
            })
            .collect();
        components.sort_by(|a, b| (a.distance, &a.name).cmp(&(b.distance, &b.name)));
        components
    }

    fn derive_risks(
        &self,
        found_cycles: &[Cycle],
        score: &ImpactScore,
        schema: Option<&SchemaGraph>,
        database_impact: &Option<DatabaseImpact>,
        change: ChangeType,
    ) -> Vec<Risk> {
        let mut risks = Vec::new();

        if !found_cycles.is_empty() {
            let longest = found_cycles.iter().map(|c| c.length).max().unwrap_or(0);
            risks.push(Risk {
                category: "circular-dependency".to_string(),
                description: format!(
                    "{} circular dependency chain(s) detected; the longest touches {} units",
                    found_cycles.len(),
                    longest
                ),
                severity: cycle_severity(longest),
            });
        }

        if let Some(coverage) = score.factors.get("test_coverage") {
            if coverage.normalized > self.config.test_gap_threshold {
                let severity = if coverage.normalized >= 1.0 {
                    RiskLevel::High
                } else {
                    RiskLevel::Medium
                };
                risks.push(Risk {
                    category: "test-gap".to_string(),
                    description: format!(
                        "test coverage factor is {:.2}; changed code has little or no test fan-in",
                        coverage.normalized
                    ),
                    severity,
                });
            }
        }

        if let (Some(schema), Some(impact)) = (schema, database_impact) {
            let referenced: Vec<&str> = impact
                .affected_tables
                .iter()
                .filter(|table| schema.inbound_fk_count(table) > 0)
                .map(|table| table.as_str())
                .collect();
            if !referenced.is_empty() {
                let severity = if change == ChangeType::Delete {
                    RiskLevel::High
                } else {
                    RiskLevel::Medium
                };
                risks.push(Risk {
                    category: "data-migration".to_string(),
                    description: format!(
                        "affected table(s) {} carry inbound foreign keys; dependent rows must migrate",
                        referenced.join(", ")
                    ),
                    severity,
                });
            }
        }

        risks
    }

    /// Affected tables are the schema tables whose names occur textually in
    /// a target file. A static proxy, like usage frequency.
    fn database_impact(
        &self,
        schema: &SchemaGraph,
        target_texts: &[(String, String)],
        change: ChangeType,
    ) -> Option<DatabaseImpact> {
        if schema.tables.is_empty() {
            return None;
        }
        let lowered: Vec<String> = target_texts
            .iter()
            .map(|(_, text)| text.to_ascii_lowercase())
            .collect();
        let mut affected: Vec<String> = schema
            .tables
            .keys()
            .filter(|table| lowered.iter().any(|text| contains_word(text, table)))
            .cloned()
            .collect();
        affected.sort();

        let touches_fk = affected.iter().any(|table| {
            schema.inbound_fk_count(table) > 0
                || schema
                    .tables
                    .get(table)
                    .map(|t| !t.foreign_keys.is_empty())
                    .unwrap_or(false)
        });
        let backup_recommended = matches!(change, ChangeType::Delete | ChangeType::Modify)
            && affected
                .iter()
                .any(|table| schema.inbound_fk_count(table) > 0);
        Some(DatabaseImpact {
            migration_required: touches_fk,
            backup_recommended,
            affected_tables: affected,
        })
    }
}

fn impact_level_for_distance(distance: usize) -> RiskLevel {
    match distance {
        0 | 1 => RiskLevel::High,
        2 => RiskLevel::Medium,
        _ => RiskLevel::Low,
    }
}

fn cycle_severity(longest: usize) -> RiskLevel {
    if longest >= 6 {
        RiskLevel::High
    } else if longest >= 3 {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}

fn contains_word(text: &str, word: &str) -> bool {
    let mut offset = 0;
    while let Some(pos) = text[offset..].find(word) {
        let start = offset + pos;
        let end = start + word.len();
        let before_ok = start == 0 || !is_ident_byte(text.as_bytes()[start - 1]);
        let after_ok = end >= text.len() || !is_ident_byte(text.as_bytes()[end]);
        if before_ok && after_ok {
            return true;
        }
        offset = end;
    }
    false
}

fn is_ident_byte(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'_'
}

/// Run the full detect → score → assemble pipeline over an already-built
/// graph. The engine drives this; it is exposed for callers that manage
/// their own graph construction.
#[allow(clippy::too_many_arguments)]
pub fn assemble_report(
    graph: &DependencyGraph,
    config: &Config,
    max_depth: usize,
    target_files: &[String],
    target_texts: &[(String, String)],
    change: ChangeType,
    schema: Option<&SchemaGraph>,
    change_description: &str,
) -> anyhow::Result<ImpactReport> {
    let search = cycles::detect(graph, max_depth);
    let score = crate::score::ImpactScorer::new(graph, config).score(target_files, change)?;
    Ok(ReportAssembler::new(graph, config).assemble(
        search,
        score,
        schema,
        target_files,
        target_texts,
        change,
        change_description,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DependencyEdge, SourceUnit};

    fn unit(id: &str, file: &str) -> SourceUnit {
        SourceUnit {
            id: id.to_string(),
            qualified_name: id.to_string(),
            file_path: file.to_string(),
            language: "python".to_string(),
            kind: UnitKind::Function,
            line_count: 10,
        }
    }

    fn chain_graph() -> DependencyGraph {
        // d -> c -> b -> a, target file is a.py
        let mut graph = DependencyGraph::default();
        for u in [
            unit("a.run", "a.py"),
            unit("b.mid", "b.py"),
            unit("c.far", "c.py"),
            unit("d.farther", "d.py"),
        ] {
            graph.units.insert(u.id.clone(), u);
        }
        for (from, to) in [("b.mid", "a.run"), ("c.far", "b.mid"), ("d.farther", "c.far")] {
            graph
                .edges
                .insert(DependencyEdge::new(from, to, EdgeKind::Call));
        }
        graph
    }

    #[test]
    fn affected_components_respect_the_hop_limit() {
        let graph = chain_graph();
        let config = Config::default(); // hop_limit 2
        let assembler = ReportAssembler::new(&graph, &config);
        let affected = assembler.affected_components(&["a.py".to_string()]);
        let names: Vec<&str> = affected.iter().map(|c| c.name.as_str()).collect();
        assert!(names.contains(&"a.run"));
        assert!(names.contains(&"b.mid"));
        assert!(names.contains(&"c.far"));
        assert!(!names.contains(&"d.farther"), "beyond hop limit");
    }

    #[test]
    fn impact_levels_derive_from_distance() {
        let graph = chain_graph();
        let config = Config::default();
        let assembler = ReportAssembler::new(&graph, &config);
        let affected = assembler.affected_components(&["a.py".to_string()]);
        let by_name: BTreeMap<&str, &AffectedComponent> =
            affected.iter().map(|c| (c.name.as_str(), c)).collect();
        assert_eq!(by_name["a.run"].impact_level, RiskLevel::High);
        assert_eq!(by_name["b.mid"].impact_level, RiskLevel::High);
        assert_eq!(by_name["c.far"].impact_level, RiskLevel::Medium);
        assert_eq!(by_name["b.mid"].reason, "calls `a.run`");
    }

    #[test]
    fn cycle_risk_severity_grows_with_length() {
        assert_eq!(cycle_severity(2), RiskLevel::Low);
        assert_eq!(cycle_severity(3), RiskLevel::Medium);
        assert_eq!(cycle_severity(6), RiskLevel::High);
    }

    #[test]
    fn table_word_match_needs_boundaries() {
        assert!(contains_word("select * from users where", "users"));
        assert!(!contains_word("select * from power_users;", "users"));
        assert!(contains_word("update \"users\" set", "users"));
    }
}
