use crate::adapter::{EdgeInput, ExtractedFile, UnitInput};
use crate::model::{EdgeKind, UnitKind};
use anyhow::Result;
use std::path::Path;
use tree_sitter::{Node, Parser};

#[derive(Clone)]
struct Context {
    module: String,
    class_stack: Vec<String>,
    fn_depth: usize,
    current_scope: String,
}

pub struct PythonAdapter {
    parser: Parser,
}

impl PythonAdapter {
    pub fn new() -> Result<Self> {
        let mut parser = Parser::new();
        let language = tree_sitter_python::LANGUAGE;
        parser.set_language(&language.into())?;
        Ok(Self { parser })
    }
}

impl crate::adapter::LanguageAdapter for PythonAdapter {
    fn module_name_from_rel_path(&self, rel_path: &str) -> String {
        module_name_from_rel_path(rel_path)
    }

    fn extract(&mut self, source: &str, module_name: &str) -> Result<ExtractedFile> {
        let mut output = ExtractedFile::default();
        let tree = match self.parser.parse(source, None) {
            Some(tree) => tree,
            None => {
                output.units.push(module_unit_fallback(module_name, source));
                return Ok(output);
            }
        };
        let root = tree.root_node();
        output.units.push(module_unit(module_name, root));
        let ctx = Context {
            module: module_name.to_string(),
            class_stack: Vec::new(),
            fn_depth: 0,
            current_scope: module_name.to_string(),
        };
        walk_node(root, &ctx, source, &mut output);
        Ok(output)
    }
}

pub fn module_name_from_rel_path(rel_path: &str) -> String {
    let path = Path::new(rel_path);
    let mut parts: Vec<String> = path
        .components()
        .filter_map(|comp| comp.as_os_str().to_str().map(|s| s.to_string()))
        .collect();
    if parts.is_empty() {
        return "__init__".to_string();
    }
    let file = parts.pop().unwrap_or_default();
    let stem = Path::new(&file)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(&file)
        .to_string();
    if stem != "__init__" {
        parts.push(stem);
    }
    if parts.is_empty() {
        "__init__".to_string()
    } else {
        parts.join(".")
    }
}

fn module_unit(module_name: &str, root: Node<'_>) -> UnitInput {
    let name = module_name
        .rsplit('.')
        .next()
        .unwrap_or(module_name)
        .to_string();
    UnitInput {
        kind: UnitKind::Module,
        name,
        qualname: module_name.to_string(),
        start_line: root.start_position().row as i64 + 1,
        end_line: root.end_position().row as i64 + 1,
    }
}

fn module_unit_fallback(module_name: &str, source: &str) -> UnitInput {
    let name = module_name
        .rsplit('.')
        .next()
        .unwrap_or(module_name)
        .to_string();
    UnitInput {
        kind: UnitKind::Module,
        name,
        qualname: module_name.to_string(),
        start_line: 1,
        end_line: crate::util::line_count(source),
    }
}

fn walk_node(node: Node<'_>, ctx: &Context, source: &str, output: &mut ExtractedFile) {
    if node.kind() == "call" {
        handle_call(node, ctx, source, output);
    }
    match node.kind() {
        "class_definition" => {
            if ctx.fn_depth > 0 {
                return;
            }
            if let Some(name_node) = node.child_by_field_name("name") {
                let name = node_text(name_node, source);
                let qualname = build_qualname(&ctx.module, &ctx.class_stack, &name);
                output.units.push(UnitInput {
                    kind: UnitKind::Class,
                    name: name.clone(),
                    qualname: qualname.clone(),
                    start_line: node.start_position().row as i64 + 1,
                    end_line: node.end_position().row as i64 + 1,
                });
                let mut next_ctx = ctx.clone();
                next_ctx.class_stack.push(name);
                next_ctx.current_scope = qualname;
                if let Some(body) = node.child_by_field_name("body") {
                    walk_block(body, &next_ctx, source, output);
                }
            }
            return;
        }
        "function_definition" | "async_function_definition" => {
            if ctx.fn_depth > 0 {
                return;
            }
            if let Some(name_node) = node.child_by_field_name("name") {
                let name = node_text(name_node, source);
                let qualname = build_qualname(&ctx.module, &ctx.class_stack, &name);
                let kind = if ctx.class_stack.is_empty() {
                    UnitKind::Function
                } else {
                    UnitKind::Method
                };
                output.units.push(UnitInput {
                    kind,
                    name,
                    qualname: qualname.clone(),
                    start_line: node.start_position().row as i64 + 1,
                    end_line: node.end_position().row as i64 + 1,
                });
                let mut next_ctx = ctx.clone();
                next_ctx.fn_depth += 1;
                next_ctx.current_scope = qualname;
                if let Some(body) = node.child_by_field_name("body") {
                    walk_block(body, &next_ctx, source, output);
                }
            }
            return;
        }
        "import_statement" | "import_from_statement" => {
            if ctx.fn_depth == 0 {
                let text = node_text(node, source);
                for target in parse_imports(&text) {
                    output.edges.push(EdgeInput {
                        kind: EdgeKind::Import,
                        source_qualname: ctx.module.clone(),
                        target_qualname: target,
                    });
                }
            }
            return;
        }
        _ => {}
    }

    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        walk_node(child, ctx, source, output);
    }
}

fn walk_block(node: Node<'_>, ctx: &Context, source: &str, output: &mut ExtractedFile) {
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        walk_node(child, ctx, source, output);
    }
}

fn handle_call(node: Node<'_>, ctx: &Context, source: &str, output: &mut ExtractedFile) {
    let Some(function_node) = node.child_by_field_name("function") else {
        return;
    };
    let raw = node_text(function_node, source);
    if raw.is_empty() {
        return;
    }
    let Some(target) = resolve_call_target(&raw, ctx) else {
        return;
    };
    output.edges.push(EdgeInput {
        kind: EdgeKind::Call,
        source_qualname: ctx.current_scope.clone(),
        target_qualname: target,
    });
}

fn resolve_call_target(raw: &str, ctx: &Context) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() || !is_simple_call_target(raw) {
        return None;
    }
    let mut parts: Vec<&str> = raw.split('.').collect();
    if parts.is_empty() {
        return None;
    }
    if parts[0] == "self" || parts[0] == "cls" {
        parts.remove(0);
        if parts.is_empty() {
            return None;
        }
        let container = container_qualname(&ctx.module, &ctx.class_stack);
        return Some(format!("{container}.{}", parts.join(".")));
    }
    if parts.len() == 1 {
        let container = container_qualname(&ctx.module, &ctx.class_stack);
        return Some(format!("{container}.{raw}"));
    }
    Some(raw.to_string())
}

fn is_simple_call_target(raw: &str) -> bool {
    raw.chars()
        .all(|ch| ch.is_alphanumeric() || ch == '_' || ch == '.')
}

fn build_qualname(module: &str, class_stack: &[String], name: &str) -> String {
    if class_stack.is_empty() {
        format!("{module}.{name}")
    } else {
        format!("{module}.{}.{}", class_stack.join("."), name)
    }
}

fn container_qualname(module: &str, class_stack: &[String]) -> String {
    if class_stack.is_empty() {
        module.to_string()
    } else {
        format!("{module}.{}", class_stack.join("."))
    }
}

fn node_text(node: Node<'_>, source: &str) -> String {
    let start = node.start_byte();
    let end = node.end_byte();
    source.get(start..end).unwrap_or("").trim().to_string()
}

fn parse_imports(text: &str) -> Vec<String> {
    let cleaned = text.replace('\n', " ");
    let cleaned = cleaned.trim().trim_end_matches(';');
    if let Some(rest) = cleaned.strip_prefix("import ") {
        return rest
            .split(',')
            .filter_map(|part| {
                let mut name = part.trim().split_whitespace();
                name.next().map(|s| s.to_string())
            })
            .collect();
    }
    if let Some(rest) = cleaned.strip_prefix("from ") {
        if let Some((module, names)) = rest.split_once(" import ") {
            let base = module.trim();
            return names
                .split(',')
                .filter_map(|part| {
                    let mut name = part.trim().split_whitespace();
                    let item = name.next()?;
                    if item == "*" {
                        return Some(base.to_string());
                    }
                    if base.is_empty() {
                        Some(item.to_string())
                    } else if base == "." || base.ends_with('.') {
                        Some(format!("{base}{item}"))
                    } else {
                        Some(format!("{base}.{item}"))
                    }
                })
                .collect();
        }
    }
    Vec::new()
}
