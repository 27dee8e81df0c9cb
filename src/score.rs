//! Weighted impact scoring.
//!
//! For each target file the scorer takes five raw measurements against the
//! whole-project graph, min–max normalizes them project-relative, applies
//! the change-type multiplier to the dependency-count and complexity
//! sub-scores, and folds everything into a 0–100 overall with fixed weights:
//!
//! - dependency_count 0.30 — in-degree + out-degree of the file's units
//! - complexity       0.25 — line count × (1 + out-degree), a size/branching proxy
//! - usage_frequency  0.20 — static fan-in from outside the file
//! - file_size        0.15 — line count
//! - test_coverage    0.10 — inverse proxy; no coverage data at all means
//!                           maximal uncertainty (1.0), never zero risk
//!
//! With multiple target files the reported overall is the worst per-file
//! score; the per-file breakdown stays available for the report.

use crate::config::Config;
use crate::error::EngineError;
use crate::model::{DependencyGraph, UnitKind};
use anyhow::{Result, bail};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

pub const WEIGHT_DEPENDENCY_COUNT: f64 = 0.30;
pub const WEIGHT_COMPLEXITY: f64 = 0.25;
pub const WEIGHT_USAGE_FREQUENCY: f64 = 0.20;
pub const WEIGHT_FILE_SIZE: f64 = 0.15;
pub const WEIGHT_TEST_COVERAGE: f64 = 0.10;

const WEIGHT_SUM: f64 = WEIGHT_DEPENDENCY_COUNT
    + WEIGHT_COMPLEXITY
    + WEIGHT_USAGE_FREQUENCY
    + WEIGHT_FILE_SIZE
    + WEIGHT_TEST_COVERAGE;
const _: () = assert!(WEIGHT_SUM > 0.999_999 && WEIGHT_SUM < 1.000_001);

#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    Modify,
    Add,
    Delete,
    Refactor,
}

impl ChangeType {
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "modify" => Ok(ChangeType::Modify),
            "add" => Ok(ChangeType::Add),
            "delete" => Ok(ChangeType::Delete),
            "refactor" => Ok(ChangeType::Refactor),
            other => bail!(EngineError::UnknownChangeType(other.to_string())),
        }
    }

    /// Disruption multiplier applied to the dependency-count and complexity
    /// sub-scores. Deleting has the highest blast potential; new code has
    /// no existing callers yet.
    pub fn multiplier(&self) -> f64 {
        match self {
            ChangeType::Delete => 1.3,
            ChangeType::Refactor => 1.15,
            ChangeType::Modify => 1.0,
            ChangeType::Add => 0.7,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeType::Modify => "modify",
            ChangeType::Add => "add",
            ChangeType::Delete => "delete",
            ChangeType::Refactor => "refactor",
        }
    }
}

#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    /// Fixed tier contract: `< 50` Low, `50..=79` Medium, `>= 80` High.
    pub fn for_score(overall: u32, config: &Config) -> Self {
        if overall >= config.risk_high_threshold {
            RiskLevel::High
        } else if overall >= config.risk_medium_threshold {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }
}

#[derive(Debug, Serialize, Clone, Copy)]
pub struct FactorScore {
    pub raw: f64,
    pub normalized: f64,
}

#[derive(Debug, Serialize, Clone)]
pub struct FileScore {
    pub path: String,
    pub overall: u32,
    pub factors: BTreeMap<&'static str, FactorScore>,
}

#[derive(Debug, Serialize)]
pub struct ImpactScore {
    /// Worst per-file score; the worst case drives the risk conversation.
    pub overall: u32,
    pub risk_level: RiskLevel,
    pub change_type: ChangeType,
    pub factors: BTreeMap<&'static str, FactorScore>,
    pub per_file: Vec<FileScore>,
}

#[derive(Debug, Default, Clone, Copy)]
struct FileStats {
    dependency_count: f64,
    complexity: f64,
    usage_frequency: f64,
    file_size: f64,
    test_coverage: f64,
}

pub struct ImpactScorer<'a> {
    graph: &'a DependencyGraph,
    config: &'a Config,
}

impl<'a> ImpactScorer<'a> {
    pub fn new(graph: &'a DependencyGraph, config: &'a Config) -> Self {
        Self { graph, config }
    }

    pub fn score(&self, target_files: &[String], change: ChangeType) -> Result<ImpactScore> {
        let stats = self.collect_stats();
        if stats.is_empty() {
            bail!("graph contains no project files to score");
        }
        let has_coverage_data = self.has_any_test_units();

        let ranges = Ranges::over(stats.values());
        let mut per_file = Vec::new();
        for target in target_files {
            let Some(file_stats) = stats.get(target.as_str()) else {
                bail!("target file not found in project: {target}");
            };
            per_file.push(self.score_file(
                target,
                *file_stats,
                &ranges,
                change,
                has_coverage_data,
            ));
        }
        let worst = match per_file.iter().max_by_key(|file| file.overall) {
            Some(worst) => worst.clone(),
            None => bail!("no target files given"),
        };
        self.config.weights.validate()?;
        Ok(ImpactScore {
            overall: worst.overall,
            risk_level: RiskLevel::for_score(worst.overall, self.config),
            change_type: change,
            factors: worst.factors,
            per_file,
        })
    }

    fn score_file(
        &self,
        path: &str,
        stats: FileStats,
        ranges: &Ranges,
        change: ChangeType,
        has_coverage_data: bool,
    ) -> FileScore {
        let multiplier = change.multiplier();
        let dependency_count =
            clamp01(ranges.dependency_count.normalize(stats.dependency_count) * multiplier);
        let complexity = clamp01(ranges.complexity.normalize(stats.complexity) * multiplier);
        let usage_frequency = ranges.usage_frequency.normalize(stats.usage_frequency);
        let file_size = ranges.file_size.normalize(stats.file_size);
        // Inverse proxy: strong coverage lowers the factor. Without any
        // coverage signal in the project the factor pins to worst case.
        let test_coverage = if has_coverage_data {
            1.0 - ranges.test_coverage.normalize(stats.test_coverage)
        } else {
            1.0
        };

        let weights = &self.config.weights;
        let weighted = weights.dependency_count * dependency_count
            + weights.complexity * complexity
            + weights.usage_frequency * usage_frequency
            + weights.file_size * file_size
            + weights.test_coverage * test_coverage;
        let overall = (100.0 * weighted).round() as u32;

        let mut factors = BTreeMap::new();
        factors.insert(
            "dependency_count",
            FactorScore {
                raw: stats.dependency_count,
                normalized: dependency_count,
            },
        );
        factors.insert(
            "complexity",
            FactorScore {
                raw: stats.complexity,
                normalized: complexity,
            },
        );
        factors.insert(
            "usage_frequency",
            FactorScore {
                raw: stats.usage_frequency,
                normalized: usage_frequency,
            },
        );
        factors.insert(
            "file_size",
            FactorScore {
                raw: stats.file_size,
                normalized: file_size,
            },
        );
        factors.insert(
            "test_coverage",
            FactorScore {
                raw: stats.test_coverage,
                normalized: test_coverage,
            },
        );
        FileScore {
            path: path.to_string(),
            overall,
            factors,
        }
    }

    /// Raw measurements for every project file in the graph.
    fn collect_stats(&self) -> BTreeMap<&str, FileStats> {
        let mut stats: BTreeMap<&str, FileStats> = BTreeMap::new();
        let mut unit_file: BTreeMap<&str, &str> = BTreeMap::new();
        for unit in self.graph.units.values() {
            if unit.kind == UnitKind::External {
                continue;
            }
            unit_file.insert(unit.id.as_str(), unit.file_path.as_str());
            let entry = stats.entry(unit.file_path.as_str()).or_default();
            entry.file_size = entry.file_size.max(unit.line_count as f64);
        }

        let mut out_degree: BTreeMap<&str, f64> = BTreeMap::new();
        for edge in &self.graph.edges {
            let from_file = unit_file.get(edge.from_unit_id.as_str()).copied();
            let to_file = unit_file.get(edge.to_unit_id.as_str()).copied();
            if let Some(from_file) = from_file {
                if let Some(entry) = stats.get_mut(from_file) {
                    entry.dependency_count += 1.0;
                }
                *out_degree.entry(from_file).or_default() += 1.0;
            }
            if let Some(to_file) = to_file {
                if let Some(entry) = stats.get_mut(to_file) {
                    entry.dependency_count += 1.0;
                    if from_file != Some(to_file) {
                        entry.usage_frequency += 1.0;
                        if from_file
                            .map(crate::scan::is_test_path)
                            .unwrap_or(false)
                        {
                            entry.test_coverage += 1.0;
                        }
                    }
                }
            }
        }
        for (file, entry) in stats.iter_mut() {
            let out = out_degree.get(file).copied().unwrap_or(0.0);
            entry.complexity = entry.file_size * (1.0 + out);
        }
        stats
    }

    fn has_any_test_units(&self) -> bool {
        let mut files: BTreeSet<&str> = BTreeSet::new();
        for unit in self.graph.units.values() {
            if unit.kind != UnitKind::External {
                files.insert(unit.file_path.as_str());
            }
        }
        files.iter().any(|file| crate::scan::is_test_path(file))
    }
}

struct Range {
    min: f64,
    max: f64,
}

impl Range {
    /// Min–max scaling with the degenerate zero-range case pinned to 0.5.
    fn normalize(&self, value: f64) -> f64 {
        if (self.max - self.min).abs() < f64::EPSILON {
            0.5
        } else {
            clamp01((value - self.min) / (self.max - self.min))
        }
    }
}

struct Ranges {
    dependency_count: Range,
    complexity: Range,
    usage_frequency: Range,
    file_size: Range,
    test_coverage: Range,
}

impl Ranges {
    fn over<'s>(stats: impl Iterator<Item = &'s FileStats> + Clone) -> Self {
        let range_of = |pick: fn(&FileStats) -> f64| {
            let mut min = f64::INFINITY;
            let mut max = f64::NEG_INFINITY;
            for s in stats.clone() {
                let value = pick(s);
                min = min.min(value);
                max = max.max(value);
            }
            if !min.is_finite() || !max.is_finite() {
                Range { min: 0.0, max: 0.0 }
            } else {
                Range { min, max }
            }
        };
        Self {
            dependency_count: range_of(|s| s.dependency_count),
            complexity: range_of(|s| s.complexity),
            usage_frequency: range_of(|s| s.usage_frequency),
            file_size: range_of(|s| s.file_size),
            test_coverage: range_of(|s| s.test_coverage),
        }
    }
}

fn clamp01(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DependencyEdge, EdgeKind, SourceUnit};

    fn unit(id: &str, file: &str, lines: i64) -> SourceUnit {
        SourceUnit {
            id: id.to_string(),
            qualified_name: id.to_string(),
            file_path: file.to_string(),
            language: "python".to_string(),
            kind: UnitKind::Function,
            line_count: lines,
        }
    }

    fn test_graph() -> DependencyGraph {
        let mut graph = DependencyGraph::default();
        for u in [
            unit("a.one", "a.py", 100),
            unit("a.two", "a.py", 20),
            unit("b.main", "b.py", 40),
            unit("c.util", "c.py", 10),
            unit("tests.test_a.check", "tests/test_a.py", 15),
        ] {
            graph.units.insert(u.id.clone(), u);
        }
        for (from, to) in [
            ("b.main", "a.one"),
            ("c.util", "a.one"),
            ("a.one", "a.two"),
            ("tests.test_a.check", "a.one"),
        ] {
            graph
                .edges
                .insert(DependencyEdge::new(from, to, EdgeKind::Call));
        }
        graph
    }

    #[test]
    fn weights_sum_to_one() {
        assert!((WEIGHT_SUM - 1.0).abs() < 1e-9);
    }

    #[test]
    fn risk_tier_boundaries_are_exact() {
        let config = Config::default();
        assert_eq!(RiskLevel::for_score(49, &config), RiskLevel::Low);
        assert_eq!(RiskLevel::for_score(50, &config), RiskLevel::Medium);
        assert_eq!(RiskLevel::for_score(79, &config), RiskLevel::Medium);
        assert_eq!(RiskLevel::for_score(80, &config), RiskLevel::High);
    }

    #[test]
    fn change_type_parsing_and_multipliers() {
        assert_eq!(ChangeType::parse("delete").unwrap(), ChangeType::Delete);
        assert_eq!(ChangeType::parse("MODIFY").unwrap(), ChangeType::Modify);
        assert!(ChangeType::parse("rename").is_err());
        assert!(ChangeType::Delete.multiplier() > ChangeType::Refactor.multiplier());
        assert!(ChangeType::Add.multiplier() < 1.0);
    }

    #[test]
    fn delete_scores_at_least_as_high_as_modify() {
        let graph = test_graph();
        let config = Config::default();
        let scorer = ImpactScorer::new(&graph, &config);
        let targets = vec!["a.py".to_string()];
        let deleted = scorer.score(&targets, ChangeType::Delete).unwrap();
        let modified = scorer.score(&targets, ChangeType::Modify).unwrap();
        assert!(deleted.overall >= modified.overall);
    }

    #[test]
    fn dependency_growth_never_lowers_the_score() {
        let config = Config::default();
        let base = test_graph();
        let mut more = test_graph();
        // Extra inbound dependencies onto a.py.
        more.units
            .insert("d.extra".to_string(), unit("d.extra", "d.py", 30));
        more.edges
            .insert(DependencyEdge::new("d.extra", "a.one", EdgeKind::Call));
        more.edges
            .insert(DependencyEdge::new("d.extra", "a.two", EdgeKind::Call));

        let targets = vec!["a.py".to_string()];
        let before = ImpactScorer::new(&base, &config)
            .score(&targets, ChangeType::Modify)
            .unwrap();
        let after = ImpactScorer::new(&more, &config)
            .score(&targets, ChangeType::Modify)
            .unwrap();
        assert!(after.overall >= before.overall);
    }

    #[test]
    fn missing_coverage_data_pins_the_factor_to_worst_case() {
        let mut graph = DependencyGraph::default();
        for u in [unit("a.one", "a.py", 50), unit("b.one", "b.py", 10)] {
            graph.units.insert(u.id.clone(), u);
        }
        graph
            .edges
            .insert(DependencyEdge::new("b.one", "a.one", EdgeKind::Call));
        let config = Config::default();
        let scorer = ImpactScorer::new(&graph, &config);
        let score = scorer
            .score(&["a.py".to_string()], ChangeType::Modify)
            .unwrap();
        let coverage = score.factors.get("test_coverage").unwrap();
        assert_eq!(coverage.normalized, 1.0);
    }

    #[test]
    fn degenerate_distribution_normalizes_to_half() {
        let mut graph = DependencyGraph::default();
        for u in [unit("a.one", "a.py", 30), unit("b.one", "b.py", 30)] {
            graph.units.insert(u.id.clone(), u);
        }
        let config = Config::default();
        let scorer = ImpactScorer::new(&graph, &config);
        let score = scorer
            .score(&["a.py".to_string()], ChangeType::Modify)
            .unwrap();
        let size = score.factors.get("file_size").unwrap();
        assert_eq!(size.normalized, 0.5);
    }

    #[test]
    fn multi_target_overall_is_the_worst_file() {
        let graph = test_graph();
        let config = Config::default();
        let scorer = ImpactScorer::new(&graph, &config);
        let score = scorer
            .score(
                &["a.py".to_string(), "c.py".to_string()],
                ChangeType::Modify,
            )
            .unwrap();
        assert_eq!(score.per_file.len(), 2);
        let max = score.per_file.iter().map(|f| f.overall).max().unwrap();
        assert_eq!(score.overall, max);
    }

    #[test]
    fn unknown_target_file_is_a_clear_error() {
        let graph = test_graph();
        let config = Config::default();
        let scorer = ImpactScorer::new(&graph, &config);
        let err = scorer
            .score(&["nope.py".to_string()], ChangeType::Modify)
            .unwrap_err();
        assert!(err.to_string().contains("target file not found"));
    }

    #[test]
    fn delete_multiplier_raises_dependency_and_complexity_sub_scores() {
        let graph = test_graph();
        let config = Config::default();
        let scorer = ImpactScorer::new(&graph, &config);
        let targets = vec!["a.py".to_string()];
        let deleted = scorer.score(&targets, ChangeType::Delete).unwrap();
        let modified = scorer.score(&targets, ChangeType::Modify).unwrap();
        let dep_deleted = deleted.factors.get("dependency_count").unwrap().normalized;
        let dep_modified = modified.factors.get("dependency_count").unwrap().normalized;
        assert!(dep_deleted >= dep_modified);
        assert!(dep_deleted <= 1.0);
        // Factors untouched by the multiplier stay identical.
        let usage_deleted = deleted.factors.get("usage_frequency").unwrap().normalized;
        let usage_modified = modified.factors.get("usage_frequency").unwrap().normalized;
        assert_eq!(usage_deleted, usage_modified);
    }
}
