use crate::diagnostics::Diagnostic;
use crate::error::EngineError;
use anyhow::{Result, bail};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;

pub mod ddl;
pub mod live;

#[derive(Debug, Serialize, Clone)]
pub struct SchemaColumn {
    pub name: String,
    pub data_type: String,
}

#[derive(Debug, Serialize, Clone)]
pub struct ForeignKey {
    pub column: String,
    pub target_table: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_column: Option<String>,
}

#[derive(Debug, Serialize, Clone, Default)]
pub struct SchemaTable {
    pub name: String,
    pub columns: Vec<SchemaColumn>,
    pub primary_key: Vec<String>,
    pub foreign_keys: Vec<ForeignKey>,
}

/// Tables as nodes, foreign keys as edges. Identifiers are normalized to
/// lowercase with dialect quoting stripped, so `users`, `"Users"` and
/// `[Users]` all land on the same node.
#[derive(Debug, Serialize, Default)]
pub struct SchemaGraph {
    pub dialect: String,
    pub tables: BTreeMap<String, SchemaTable>,
    pub diagnostics: Vec<Diagnostic>,
}

impl SchemaGraph {
    /// (from_table, to_table) foreign-key edges in deterministic order.
    pub fn edges(&self) -> Vec<(&str, &str)> {
        let mut edges = Vec::new();
        for table in self.tables.values() {
            for fk in &table.foreign_keys {
                edges.push((table.name.as_str(), fk.target_table.as_str()));
            }
        }
        edges
    }

    /// Number of foreign keys pointing at `table` from other tables.
    pub fn inbound_fk_count(&self, table: &str) -> usize {
        self.edges()
            .iter()
            .filter(|(from, to)| *to == table && *from != table)
            .count()
    }

    /// Foreign keys must reference tables present in the graph; orphans are
    /// reported, not silently dropped.
    pub fn validate_foreign_keys(&mut self) {
        let mut orphans = Vec::new();
        for table in self.tables.values() {
            for fk in &table.foreign_keys {
                if !self.tables.contains_key(&fk.target_table) {
                    orphans.push((table.name.clone(), fk.target_table.clone()));
                }
            }
        }
        for (table, target) in orphans {
            self.diagnostics
                .push(Diagnostic::orphan_foreign_key(&table, &target));
        }
    }
}

#[derive(Debug, Clone)]
pub struct DialectSpec {
    pub name: &'static str,
    pub aliases: &'static [&'static str],
}

static DIALECT_SPECS: &[DialectSpec] = &[
    DialectSpec {
        name: "postgres",
        aliases: &["postgres", "postgresql", "psql", "pgsql"],
    },
    DialectSpec {
        name: "mysql",
        aliases: &["mysql", "mariadb"],
    },
    DialectSpec {
        name: "sqlite",
        aliases: &["sqlite", "sqlite3"],
    },
    DialectSpec {
        name: "sqlserver",
        aliases: &["sqlserver", "mssql", "tsql", "sql-server"],
    },
    DialectSpec {
        name: "oracle",
        aliases: &["oracle", "plsql"],
    },
];

pub fn dialect_specs() -> &'static [DialectSpec] {
    DIALECT_SPECS
}

pub fn canonical_dialect(raw: &str) -> Result<&'static str> {
    let key = raw.trim().to_ascii_lowercase();
    for spec in DIALECT_SPECS {
        if spec.aliases.iter().any(|alias| *alias == key) {
            return Ok(spec.name);
        }
    }
    bail!(EngineError::UnsupportedDialect(raw.to_string()))
}

/// Static DDL text or a live connection handle. The DDL path is fully
/// deterministic and supported for every dialect; the live path is an
/// optional enhancement (see `live`).
#[derive(Debug, Clone)]
pub enum SchemaSource {
    Ddl(String),
    Connection(String),
}

/// Extract a schema graph from either input mode. Never fails for
/// per-dialect capability gaps or timeouts; those degrade into diagnostics
/// so the caller can omit the database section with an explicit note.
pub fn extract(source: &SchemaSource, dialect: &str, timeout: Duration) -> Result<SchemaGraph> {
    let dialect = canonical_dialect(dialect)?;
    let mut graph = match source {
        SchemaSource::Ddl(text) => ddl::parse(dialect, text)?,
        SchemaSource::Connection(handle) => live::introspect(dialect, handle, timeout),
    };
    graph.validate_foreign_keys();
    Ok(graph)
}
