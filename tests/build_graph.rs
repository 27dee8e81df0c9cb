use ripple::builder::{BuildOptions, CancelToken, GraphBuilder};
use ripple::model::{EdgeKind, UnitKind};
use std::fs;
use std::path::Path;

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

fn builder() -> GraphBuilder {
    GraphBuilder::new(BuildOptions::default(), CancelToken::new())
}

fn python_project(root: &Path) {
    write(
        root,
        "pkg/__init__.py",
        "",
    );
    write(
        root,
        "pkg/util.py",
        r#"
def helper(value):
    return value * 2
"#,
    );
    write(
        root,
        "pkg/core.py",
        r#"
from pkg.util import helper
import requests

class Greeter:
    def greet(self):
        return helper(1)

def main():
    requests.get("https://example.com")
    return helper(2)
"#,
    );
}

#[test]
fn python_project_builds_a_merged_graph() {
    let dir = tempfile::tempdir().unwrap();
    python_project(dir.path());
    let graph = builder().build(dir.path(), "python").unwrap();

    assert!(graph.units.contains_key("pkg.core"));
    assert!(graph.units.contains_key("pkg.core.Greeter"));
    assert!(graph.units.contains_key("pkg.core.Greeter.greet"));
    assert!(graph.units.contains_key("pkg.core.main"));
    assert!(graph.units.contains_key("pkg.util.helper"));

    // from-import edge resolves to the concrete unit.
    assert!(graph.edges.iter().any(|e| {
        e.edge_kind == EdgeKind::Import
            && e.from_unit_id == "pkg.core"
            && e.to_unit_id == "pkg.util.helper"
    }));
    graph.check_invariants().unwrap();
}

#[test]
fn bare_cross_file_calls_resolve_when_unique() {
    let dir = tempfile::tempdir().unwrap();
    python_project(dir.path());
    let graph = builder().build(dir.path(), "python").unwrap();

    // `helper(1)` inside Greeter.greet resolves to pkg.util.helper, the
    // only unit with that name anywhere in the project.
    assert!(graph.edges.iter().any(|e| {
        e.edge_kind == EdgeKind::Call
            && e.from_unit_id == "pkg.core.Greeter.greet"
            && e.to_unit_id == "pkg.util.helper"
    }));
}

#[test]
fn unresolved_targets_become_external_units() {
    let dir = tempfile::tempdir().unwrap();
    python_project(dir.path());
    let graph = builder().build(dir.path(), "python").unwrap();

    let external = graph
        .units
        .values()
        .find(|u| u.kind == UnitKind::External && u.qualified_name == "requests")
        .expect("external unit for unresolved import");
    assert!(external.id.starts_with("external:"));
    assert!(
        graph
            .edges
            .iter()
            .any(|e| e.from_unit_id == "pkg.core" && e.to_unit_id == external.id)
    );
}

#[test]
fn repeated_builds_are_byte_identical() {
    let dir = tempfile::tempdir().unwrap();
    python_project(dir.path());
    let first = builder().build(dir.path(), "python").unwrap();
    let second = builder().build(dir.path(), "python").unwrap();
    assert_eq!(
        serde_json::to_string(&first).unwrap(),
        serde_json::to_string(&second).unwrap()
    );
    assert_eq!(first.source_digest, second.source_digest);
}

#[test]
fn go_project_builds_with_receiver_methods() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "server/server.go",
        r#"
package server

import "fmt"

type Server struct{}

func (s *Server) Start() {
    s.listen()
}

func (s *Server) listen() {
    fmt.Println("listening")
}
"#,
    );
    let graph = builder().build(dir.path(), "go").unwrap();
    assert!(graph.units.contains_key("server/server.Server.Start"));
    // Receiver call resolves within the same file.
    assert!(graph.edges.iter().any(|e| {
        e.from_unit_id == "server/server.Server.Start"
            && e.to_unit_id == "server/server.Server.listen"
    }));
}

#[test]
fn typescript_relative_imports_link_modules() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "src/util.ts",
        "export function helper(): number { return 1; }\n",
    );
    write(
        dir.path(),
        "src/app.ts",
        "import { helper } from './util';\nexport function run() { return helper(); }\n",
    );
    let graph = builder().build(dir.path(), "typescript").unwrap();
    assert!(graph.units.contains_key("src/app.run"));
    assert!(graph.units.contains_key("src/util.helper"));
    assert!(graph.edges.iter().any(|e| {
        e.edge_kind == EdgeKind::Import
            && e.from_unit_id == "src/app"
            && e.to_unit_id == "src/util"
    }));
    assert!(graph.edges.iter().any(|e| {
        e.edge_kind == EdgeKind::Call
            && e.from_unit_id == "src/app.run"
            && e.to_unit_id == "src/util.helper"
    }));
}

#[test]
fn missing_project_path_is_a_clear_error() {
    let err = builder()
        .build(Path::new("/definitely/not/here"), "python")
        .unwrap_err();
    assert!(err.to_string().contains("project path"));
}

#[test]
fn empty_project_is_a_clear_error() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "README.md", "no code here");
    let err = builder().build(dir.path(), "python").unwrap_err();
    assert!(err.to_string().contains("source files"));
}

#[test]
fn unknown_language_is_a_clear_error() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "a.py", "x = 1\n");
    let err = builder().build(dir.path(), "fortran").unwrap_err();
    assert!(err.to_string().contains("unsupported language"));
}
