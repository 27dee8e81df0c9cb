use ripple::builder::CancelToken;
use ripple::engine::{self, AnalysisRequest, DatabaseRequest};
use ripple::schema::SchemaSource;
use ripple::score::{ChangeType, RiskLevel};
use std::fs;
use std::path::Path;

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

fn shop_project(root: &Path) {
    write(
        root,
        "shop/db.py",
        r#"
def query(sql):
    return []

def save_order(order):
    return query("insert into orders values (1)")
"#,
    );
    write(
        root,
        "shop/orders.py",
        r#"
from shop.db import save_order

def place_order(order):
    validate(order)
    return save_order(order)

def validate(order):
    return True
"#,
    );
    write(
        root,
        "shop/api.py",
        r#"
from shop.orders import place_order

def handle_request(payload):
    return place_order(payload)
"#,
    );
    write(
        root,
        "tests/test_orders.py",
        r#"
from shop.orders import place_order

def test_place_order():
    assert place_order({}) is not None
"#,
    );
}

const SHOP_DDL: &str = r#"
CREATE TABLE users (
    id SERIAL PRIMARY KEY,
    email VARCHAR(255)
);

CREATE TABLE orders (
    id SERIAL PRIMARY KEY,
    user_id INTEGER REFERENCES users(id)
);

CREATE TABLE order_lines (
    id SERIAL PRIMARY KEY,
    order_id INTEGER REFERENCES orders(id)
);
"#;

fn request(root: &Path, targets: &[&str], change: ChangeType) -> AnalysisRequest {
    AnalysisRequest {
        project_path: root.to_path_buf(),
        language: "python".to_string(),
        target_files: targets.iter().map(|t| t.to_string()).collect(),
        change_type: change,
        change_description: "rework order persistence".to_string(),
        max_depth: Some(15),
        no_ignore: false,
        database: None,
    }
}

#[test]
fn full_report_covers_score_components_and_diagnostics() {
    let dir = tempfile::tempdir().unwrap();
    shop_project(dir.path());
    let report = engine::analyze(
        &request(dir.path(), &["shop/orders.py"], ChangeType::Modify),
        CancelToken::new(),
    )
    .unwrap();

    assert!(report.score.overall <= 100);
    assert_eq!(report.score.per_file.len(), 1);
    assert_eq!(report.target_files, vec!["shop/orders.py"]);
    assert!(!report.source_digest.is_empty());

    // Direct neighbors of the target must be listed with distance 1.
    let api = report
        .affected_components
        .iter()
        .find(|c| c.name == "shop.api.handle_request")
        .expect("caller of place_order is affected");
    assert_eq!(api.impact_level, RiskLevel::High);
    assert!(api.reason.contains("calls"));

    assert_eq!(
        report.diagnostics_summary.total,
        report.diagnostics.len()
    );
    assert!(report.database_impact.is_none());
}

#[test]
fn repeated_analysis_is_byte_identical() {
    let dir = tempfile::tempdir().unwrap();
    shop_project(dir.path());
    let req = request(dir.path(), &["shop/orders.py"], ChangeType::Modify);
    let first = engine::analyze(&req, CancelToken::new()).unwrap();
    let second = engine::analyze(&req, CancelToken::new()).unwrap();
    assert_eq!(
        serde_json::to_string(&first).unwrap(),
        serde_json::to_string(&second).unwrap()
    );
}

#[test]
fn delete_never_scores_below_modify() {
    let dir = tempfile::tempdir().unwrap();
    shop_project(dir.path());
    let deleted = engine::analyze(
        &request(dir.path(), &["shop/db.py"], ChangeType::Delete),
        CancelToken::new(),
    )
    .unwrap();
    let modified = engine::analyze(
        &request(dir.path(), &["shop/db.py"], ChangeType::Modify),
        CancelToken::new(),
    )
    .unwrap();
    assert!(deleted.score.overall >= modified.score.overall);
}

#[test]
fn schema_ddl_adds_database_impact_and_migration_risk() {
    let dir = tempfile::tempdir().unwrap();
    shop_project(dir.path());
    let mut req = request(dir.path(), &["shop/db.py"], ChangeType::Delete);
    req.database = Some(DatabaseRequest {
        dialect: "postgres".to_string(),
        source: SchemaSource::Ddl(SHOP_DDL.to_string()),
    });
    let report = engine::analyze(&req, CancelToken::new()).unwrap();

    let impact = report.database_impact.expect("database impact present");
    // shop/db.py mentions the orders table textually.
    assert!(impact.affected_tables.contains(&"orders".to_string()));
    assert!(impact.migration_required);
    assert!(impact.backup_recommended);

    let migration = report
        .risks
        .iter()
        .find(|r| r.category == "data-migration")
        .expect("orders has inbound foreign keys");
    assert_eq!(migration.severity, RiskLevel::High);
}

#[test]
fn unknown_dialect_degrades_instead_of_aborting() {
    let dir = tempfile::tempdir().unwrap();
    shop_project(dir.path());
    let mut req = request(dir.path(), &["shop/db.py"], ChangeType::Modify);
    req.database = Some(DatabaseRequest {
        dialect: "mongodb".to_string(),
        source: SchemaSource::Ddl(SHOP_DDL.to_string()),
    });
    let report = engine::analyze(&req, CancelToken::new()).unwrap();
    assert!(report.database_impact.is_none());
    assert!(
        report
            .diagnostics
            .iter()
            .any(|d| d.category == "capability-gap")
    );
}

#[test]
fn one_unreadable_file_degrades_to_a_diagnostic() {
    let dir = tempfile::tempdir().unwrap();
    for idx in 0..10 {
        write(
            dir.path(),
            &format!("mod_{idx}.py"),
            &format!("def fn_{idx}():\n    return {idx}\n"),
        );
    }
    // Invalid UTF-8 keeps this file from ever reaching the parser.
    fs::write(dir.path().join("broken.py"), [0xff, 0xfe, 0x00, 0x81]).unwrap();

    let report = engine::analyze(
        &request(dir.path(), &["mod_0.py"], ChangeType::Modify),
        CancelToken::new(),
    )
    .unwrap();

    assert!(
        report
            .diagnostics
            .iter()
            .any(|d| d.category == "parse-failure" && d.path.as_deref() == Some("broken.py"))
    );

    // The other ten files are still fully represented in the graph.
    let graph = ripple::builder::GraphBuilder::new(
        ripple::builder::BuildOptions::default(),
        CancelToken::new(),
    )
    .build(dir.path(), "python")
    .unwrap();
    for idx in 0..10 {
        assert!(graph.units.contains_key(&format!("mod_{idx}.fn_{idx}")));
    }
    assert!(!graph.units.contains_key("broken"));
}

#[test]
fn cancelled_request_aborts() {
    let dir = tempfile::tempdir().unwrap();
    shop_project(dir.path());
    let cancel = CancelToken::new();
    cancel.cancel();
    let err = engine::analyze(
        &request(dir.path(), &["shop/orders.py"], ChangeType::Modify),
        cancel,
    )
    .unwrap_err();
    assert!(err.to_string().contains("cancelled"));
}

#[test]
fn no_coverage_signal_raises_a_test_gap_risk() {
    let dir = tempfile::tempdir().unwrap();
    // Same project minus the test file: no coverage data anywhere.
    write(
        dir.path(),
        "shop/orders.py",
        "def place_order(order):\n    return order\n",
    );
    write(
        dir.path(),
        "shop/api.py",
        "from shop.orders import place_order\n\ndef handle(p):\n    return place_order(p)\n",
    );
    let report = engine::analyze(
        &request(dir.path(), &["shop/orders.py"], ChangeType::Modify),
        CancelToken::new(),
    )
    .unwrap();
    let gap = report
        .risks
        .iter()
        .find(|r| r.category == "test-gap")
        .expect("missing coverage data is maximal uncertainty");
    assert_eq!(gap.severity, RiskLevel::High);
}
