//! Live schema introspection.
//!
//! Optional enhancement to the DDL path. Only the sqlite dialect is
//! supported (the connection handle is a database file path, introspected
//! through rusqlite); every other dialect reports a capability gap and the
//! caller falls back to DDL input. Introspection runs on its own thread and
//! is abandoned on timeout, degrading to "schema impact unavailable" rather
//! than blocking the report.

use crate::diagnostics::Diagnostic;
use crate::schema::{ForeignKey, SchemaColumn, SchemaGraph, SchemaTable};
use anyhow::{Context, Result};
use rusqlite::{Connection, OpenFlags};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

pub fn introspect(dialect: &str, connection: &str, timeout: Duration) -> SchemaGraph {
    if dialect != "sqlite" {
        let mut graph = SchemaGraph {
            dialect: dialect.to_string(),
            ..Default::default()
        };
        graph.diagnostics.push(Diagnostic::capability_gap(format!(
            "live introspection is not supported for dialect '{dialect}'; provide DDL text instead"
        )));
        return graph;
    }

    let (tx, rx) = mpsc::channel();
    let path = connection.to_string();
    thread::spawn(move || {
        let result = introspect_sqlite(&path);
        let _ = tx.send(result);
    });

    match rx.recv_timeout(timeout) {
        Ok(Ok(graph)) => graph,
        Ok(Err(err)) => {
            let mut graph = SchemaGraph {
                dialect: dialect.to_string(),
                ..Default::default()
            };
            graph
                .diagnostics
                .push(Diagnostic::schema_unavailable(format!(
                    "sqlite introspection failed: {err}"
                )));
            graph
        }
        Err(_) => {
            tracing::warn!(timeout_secs = timeout.as_secs(), "schema introspection timed out");
            let mut graph = SchemaGraph {
                dialect: dialect.to_string(),
                ..Default::default()
            };
            graph
                .diagnostics
                .push(Diagnostic::schema_unavailable(format!(
                    "live introspection timed out after {}s",
                    timeout.as_secs()
                )));
            graph
        }
    }
}

fn introspect_sqlite(path: &str) -> Result<SchemaGraph> {
    let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)
        .with_context(|| format!("open sqlite database {path}"))?;
    let mut graph = SchemaGraph {
        dialect: "sqlite".to_string(),
        ..Default::default()
    };

    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
    )?;
    let names: Vec<String> = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<_>>()?;

    for name in names {
        let mut table = SchemaTable {
            name: name.to_ascii_lowercase(),
            ..Default::default()
        };
        let mut info = conn.prepare(&format!("PRAGMA table_info('{name}')"))?;
        let mut rows = info.query([])?;
        while let Some(row) = rows.next()? {
            let column: String = row.get(1)?;
            let data_type: String = row.get(2)?;
            let pk: i64 = row.get(5)?;
            if pk > 0 {
                table.primary_key.push(column.to_ascii_lowercase());
            }
            table.columns.push(SchemaColumn {
                name: column.to_ascii_lowercase(),
                data_type: data_type.to_ascii_lowercase(),
            });
        }

        let mut fks = conn.prepare(&format!("PRAGMA foreign_key_list('{name}')"))?;
        let mut rows = fks.query([])?;
        while let Some(row) = rows.next()? {
            let target_table: String = row.get(2)?;
            let column: String = row.get(3)?;
            let target_column: Option<String> = row.get(4)?;
            table.foreign_keys.push(ForeignKey {
                column: column.to_ascii_lowercase(),
                target_table: target_table.to_ascii_lowercase(),
                target_column: target_column.map(|c| c.to_ascii_lowercase()),
            });
        }
        graph.tables.insert(table.name.clone(), table);
    }
    Ok(graph)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_dialect_reports_capability_gap() {
        let graph = introspect("oracle", "host=nowhere", Duration::from_secs(1));
        assert!(graph.tables.is_empty());
        assert!(
            graph
                .diagnostics
                .iter()
                .any(|d| d.category == "capability-gap")
        );
    }

    #[test]
    fn sqlite_file_is_introspected() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("app.sqlite");
        let conn = Connection::open(&db_path).unwrap();
        conn.execute_batch(
            "CREATE TABLE users (id INTEGER PRIMARY KEY, email TEXT);
             CREATE TABLE orders (
                 id INTEGER PRIMARY KEY,
                 user_id INTEGER REFERENCES users(id)
             );",
        )
        .unwrap();
        drop(conn);

        let graph = introspect(
            "sqlite",
            db_path.to_str().unwrap(),
            Duration::from_secs(5),
        );
        assert_eq!(graph.tables.len(), 2);
        let orders = graph.tables.get("orders").unwrap();
        assert_eq!(orders.foreign_keys.len(), 1);
        assert_eq!(orders.foreign_keys[0].target_table, "users");
        let users = graph.tables.get("users").unwrap();
        assert_eq!(users.primary_key, vec!["id"]);
    }

    #[test]
    fn missing_sqlite_file_degrades_to_diagnostic() {
        let graph = introspect("sqlite", "/nonexistent/nope.sqlite", Duration::from_secs(5));
        assert!(graph.tables.is_empty());
        assert!(
            graph
                .diagnostics
                .iter()
                .any(|d| d.category == "schema-unavailable")
        );
    }
}
