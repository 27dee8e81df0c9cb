//! DDL parsing.
//!
//! CREATE TABLE statements are located with tree-sitter and their
//! parenthesized bodies parsed textually for columns, primary keys and
//! REFERENCES clauses. The textual layer is what absorbs dialect quirks:
//! backtick quoting (mysql), bracket quoting (sqlserver), inline vs
//! table-level constraints. When the grammar produces no statements at all
//! (heavily bracketed sqlserver scripts can do this) a plain-text statement
//! scan runs the same body parser, so a parse failure degrades instead of
//! dropping the whole schema.

use crate::schema::{ForeignKey, SchemaColumn, SchemaGraph, SchemaTable};
use crate::util::unquote_identifier;
use anyhow::Result;
use tree_sitter::{Node, Parser};

pub fn parse(dialect: &str, text: &str) -> Result<SchemaGraph> {
    let mut graph = SchemaGraph {
        dialect: dialect.to_string(),
        ..Default::default()
    };

    let mut parser = Parser::new();
    let language = tree_sitter_sequel::LANGUAGE;
    parser.set_language(&language.into())?;

    let mut found_any = false;
    if let Some(tree) = parser.parse(text, None) {
        collect_create_tables(tree.root_node(), text, &mut graph, &mut found_any);
    }
    if !found_any {
        scan_statements_textually(text, &mut graph);
    }
    Ok(graph)
}

fn collect_create_tables(node: Node<'_>, text: &str, graph: &mut SchemaGraph, found: &mut bool) {
    if node.kind() == "create_table" {
        let statement = node_text(node, text);
        if let Some(name) = find_object_reference(node)
            .and_then(|obj| object_reference_name(obj, text))
            .or_else(|| table_name_from_statement(&statement))
        {
            *found = true;
            insert_table(graph, &name, &statement);
        }
        return;
    }
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        collect_create_tables(child, text, graph, found);
    }
}

fn find_object_reference(node: Node<'_>) -> Option<Node<'_>> {
    if node.kind() == "object_reference" {
        return Some(node);
    }
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        if let Some(found) = find_object_reference(child) {
            return Some(found);
        }
    }
    None
}

fn object_reference_name(node: Node<'_>, text: &str) -> Option<String> {
    let raw = node_text(node, text);
    if raw.is_empty() {
        None
    } else {
        Some(normalize_table_name(&raw))
    }
}

fn node_text(node: Node<'_>, text: &str) -> String {
    text.get(node.start_byte()..node.end_byte())
        .unwrap_or("")
        .to_string()
}

/// Plain-text fallback: locate every CREATE TABLE statement by keyword and
/// feed the same body parser.
fn scan_statements_textually(text: &str, graph: &mut SchemaGraph) {
    let upper = text.to_ascii_uppercase();
    let mut offset = 0;
    while let Some(pos) = upper[offset..].find("CREATE TABLE") {
        let start = offset + pos;
        let rest = &text[start..];
        let end = statement_end(rest);
        let statement = &rest[..end];
        if let Some(name) = table_name_from_statement(statement) {
            insert_table(graph, &name, statement);
        }
        offset = start + end.max(12);
    }
}

/// Statement runs to the first semicolon outside parentheses, or to EOF.
fn statement_end(text: &str) -> usize {
    let mut depth = 0usize;
    for (idx, ch) in text.char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ';' if depth == 0 => return idx + 1,
            _ => {}
        }
    }
    text.len()
}

fn table_name_from_statement(statement: &str) -> Option<String> {
    let upper = statement.to_ascii_uppercase();
    let after = upper.find("CREATE TABLE")? + "CREATE TABLE".len();
    let mut rest = statement[after..].trim_start();
    let rest_upper = rest.to_ascii_uppercase();
    if rest_upper.starts_with("IF NOT EXISTS") {
        rest = rest["IF NOT EXISTS".len()..].trim_start();
    }
    let end = rest
        .find(|ch: char| ch == '(' || ch.is_whitespace())
        .unwrap_or(rest.len());
    let raw = rest[..end].trim();
    if raw.is_empty() {
        None
    } else {
        Some(normalize_table_name(raw))
    }
}

fn insert_table(graph: &mut SchemaGraph, name: &str, statement: &str) {
    let mut table = SchemaTable {
        name: name.to_string(),
        ..Default::default()
    };
    if let Some(body) = first_paren_group(statement) {
        parse_table_body(&mut table, &body);
    }
    graph.tables.entry(name.to_string()).or_insert(table);
}

fn parse_table_body(table: &mut SchemaTable, body: &str) {
    for item in split_top_level_commas(body) {
        let item = item.trim();
        if item.is_empty() {
            continue;
        }
        parse_body_item(table, item);
    }
}

fn parse_body_item(table: &mut SchemaTable, item: &str) {
    let upper = item.to_ascii_uppercase();
    if let Some(rest) = upper.strip_prefix("CONSTRAINT") {
        // CONSTRAINT <name> <definition> — skip the name, re-dispatch.
        let skip = item.len() - rest.len();
        let after_keyword = item[skip..].trim_start();
        let name_end = after_keyword
            .find(|ch: char| ch.is_whitespace())
            .unwrap_or(after_keyword.len());
        parse_body_item(table, after_keyword[name_end..].trim_start());
        return;
    }
    if upper.starts_with("PRIMARY KEY") {
        if let Some(group) = first_paren_group(item) {
            for col in split_top_level_commas(&group) {
                let col = normalize_column_name(col.trim());
                if !col.is_empty() {
                    table.primary_key.push(col);
                }
            }
        }
        return;
    }
    if upper.starts_with("FOREIGN KEY") {
        let columns: Vec<String> = first_paren_group(item)
            .map(|group| {
                split_top_level_commas(&group)
                    .iter()
                    .map(|col| normalize_column_name(col.trim()))
                    .filter(|col| !col.is_empty())
                    .collect()
            })
            .unwrap_or_default();
        if let Some((target_table, target_column)) = parse_references_clause(item) {
            let column = columns.first().cloned().unwrap_or_default();
            table.foreign_keys.push(ForeignKey {
                column,
                target_table,
                target_column,
            });
        }
        return;
    }
    if upper.starts_with("UNIQUE")
        || upper.starts_with("KEY")
        || upper.starts_with("INDEX")
        || upper.starts_with("CHECK")
        || upper.starts_with("EXCLUDE")
        || upper.starts_with("LIKE")
    {
        return;
    }

    // Plain column definition: <name> <type> [modifiers...]
    let name_end = item
        .find(|ch: char| ch.is_whitespace())
        .unwrap_or(item.len());
    let name = normalize_column_name(&item[..name_end]);
    if name.is_empty() {
        return;
    }
    let rest = item[name_end..].trim_start();
    let data_type = rest
        .split_whitespace()
        .next()
        .unwrap_or("")
        .to_ascii_lowercase();
    table.columns.push(SchemaColumn {
        name: name.clone(),
        data_type,
    });
    if upper.contains("PRIMARY KEY") {
        table.primary_key.push(name.clone());
    }
    if let Some((target_table, target_column)) = parse_references_clause(item) {
        table.foreign_keys.push(ForeignKey {
            column: name,
            target_table,
            target_column,
        });
    }
}

fn parse_references_clause(item: &str) -> Option<(String, Option<String>)> {
    let upper = item.to_ascii_uppercase();
    let pos = find_keyword(&upper, "REFERENCES")?;
    let rest = item[pos + "REFERENCES".len()..].trim_start();
    let end = rest
        .find(|ch: char| ch == '(' || ch.is_whitespace())
        .unwrap_or(rest.len());
    let table = normalize_table_name(rest[..end].trim());
    if table.is_empty() {
        return None;
    }
    let column = first_paren_group(&rest[end..])
        .map(|group| normalize_column_name(group.trim()))
        .filter(|col| !col.is_empty());
    Some((table, column))
}

/// Find a keyword at a word boundary, so a column named `preferences`
/// never reads as a REFERENCES clause.
fn find_keyword(upper: &str, keyword: &str) -> Option<usize> {
    let mut offset = 0;
    while let Some(pos) = upper[offset..].find(keyword) {
        let start = offset + pos;
        let end = start + keyword.len();
        let before_ok = start == 0
            || !upper.as_bytes()[start - 1].is_ascii_alphanumeric()
                && upper.as_bytes()[start - 1] != b'_';
        let after_ok = end >= upper.len()
            || !upper.as_bytes()[end].is_ascii_alphanumeric() && upper.as_bytes()[end] != b'_';
        if before_ok && after_ok {
            return Some(start);
        }
        offset = end;
    }
    None
}

fn first_paren_group(text: &str) -> Option<String> {
    let start = text.find('(')?;
    let mut depth = 0usize;
    for (idx, ch) in text[start..].char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(text[start + 1..start + idx].to_string());
                }
            }
            _ => {}
        }
    }
    None
}

fn split_top_level_commas(text: &str) -> Vec<String> {
    let mut items = Vec::new();
    let mut depth = 0usize;
    let mut current = String::new();
    for ch in text.chars() {
        match ch {
            '(' => {
                depth += 1;
                current.push(ch);
            }
            ')' => {
                depth = depth.saturating_sub(1);
                current.push(ch);
            }
            ',' if depth == 0 => {
                items.push(std::mem::take(&mut current));
            }
            _ => current.push(ch),
        }
    }
    if !current.trim().is_empty() {
        items.push(current);
    }
    items
}

fn normalize_table_name(raw: &str) -> String {
    // Split the schema qualifier off before unquoting, so `[dbo].[Users]`
    // reduces to `users` rather than a half-stripped bracket pair.
    let last = raw.trim().rsplit('.').next().unwrap_or(raw).trim();
    unquote_identifier(last).to_ascii_lowercase()
}

fn normalize_column_name(raw: &str) -> String {
    unquote_identifier(raw).to_ascii_lowercase()
}
