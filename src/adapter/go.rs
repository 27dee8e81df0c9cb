use crate::adapter::{EdgeInput, ExtractedFile, UnitInput};
use crate::model::{EdgeKind, UnitKind};
use anyhow::Result;
use std::path::Path;
use tree_sitter::{Node, Parser};

#[derive(Clone)]
struct Context {
    module: String,
    current_scope: String,
}

pub struct GoAdapter {
    parser: Parser,
}

impl GoAdapter {
    pub fn new() -> Result<Self> {
        let mut parser = Parser::new();
        let language = tree_sitter_go::LANGUAGE;
        parser.set_language(&language.into())?;
        Ok(Self { parser })
    }
}

impl crate::adapter::LanguageAdapter for GoAdapter {
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
        output.units.push(UnitInput {
            kind: UnitKind::Module,
            name: module_short_name(module_name),
            qualname: module_name.to_string(),
            start_line: root.start_position().row as i64 + 1,
            end_line: root.end_position().row as i64 + 1,
        });
        let ctx = Context {
            module: module_name.to_string(),
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
        return "main".to_string();
    }
    let file = parts.pop().unwrap_or_default();
    let stem = Path::new(&file)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(&file)
        .to_string();
    if !stem.is_empty() {
        parts.push(stem);
    }
    if parts.is_empty() {
        "main".to_string()
    } else {
        parts.join("/")
    }
}

fn module_short_name(module_name: &str) -> String {
    module_name
        .rsplit('/')
        .next()
        .unwrap_or(module_name)
        .to_string()
}

fn module_unit_fallback(module_name: &str, source: &str) -> UnitInput {
    UnitInput {
        kind: UnitKind::Module,
        name: module_short_name(module_name),
        qualname: module_name.to_string(),
        start_line: 1,
        end_line: crate::util::line_count(source),
    }
}

fn walk_node(node: Node<'_>, ctx: &Context, source: &str, output: &mut ExtractedFile) {
    if node.kind() == "call_expression" {
        handle_call(node, ctx, source, output);
    }
    match node.kind() {
        "function_declaration" => {
            if let Some(name_node) = node.child_by_field_name("name") {
                let name = node_text(name_node, source);
                let qualname = format!("{}.{}", ctx.module, name);
                output.units.push(UnitInput {
                    kind: UnitKind::Function,
                    name,
                    qualname: qualname.clone(),
                    start_line: node.start_position().row as i64 + 1,
                    end_line: node.end_position().row as i64 + 1,
                });
                let next_ctx = Context {
                    module: ctx.module.clone(),
                    current_scope: qualname,
                };
                if let Some(body) = node.child_by_field_name("body") {
                    walk_children(body, &next_ctx, source, output);
                }
            }
            return;
        }
        "method_declaration" => {
            if let Some(name_node) = node.child_by_field_name("name") {
                let name = node_text(name_node, source);
                let receiver = receiver_type(node, source);
                let qualname = match &receiver {
                    Some(receiver) => format!("{}.{}.{}", ctx.module, receiver, name),
                    None => format!("{}.{}", ctx.module, name),
                };
                output.units.push(UnitInput {
                    kind: UnitKind::Method,
                    name,
                    qualname: qualname.clone(),
                    start_line: node.start_position().row as i64 + 1,
                    end_line: node.end_position().row as i64 + 1,
                });
                let next_ctx = Context {
                    module: ctx.module.clone(),
                    current_scope: qualname,
                };
                if let Some(body) = node.child_by_field_name("body") {
                    walk_children(body, &next_ctx, source, output);
                }
            }
            return;
        }
        "type_declaration" => {
            let mut cursor = node.walk();
            for spec in node.named_children(&mut cursor) {
                if spec.kind() != "type_spec" {
                    continue;
                }
                let is_container = spec
                    .child_by_field_name("type")
                    .map(|ty| matches!(ty.kind(), "struct_type" | "interface_type"))
                    .unwrap_or(false);
                if !is_container {
                    continue;
                }
                if let Some(name_node) = spec.child_by_field_name("name") {
                    let name = node_text(name_node, source);
                    output.units.push(UnitInput {
                        kind: UnitKind::Class,
                        name: name.clone(),
                        qualname: format!("{}.{}", ctx.module, name),
                        start_line: spec.start_position().row as i64 + 1,
                        end_line: spec.end_position().row as i64 + 1,
                    });
                }
            }
            return;
        }
        "import_declaration" => {
            collect_import_specs(node, ctx, source, output);
            return;
        }
        _ => {}
    }

    walk_children(node, ctx, source, output);
}

fn walk_children(node: Node<'_>, ctx: &Context, source: &str, output: &mut ExtractedFile) {
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        walk_node(child, ctx, source, output);
    }
}

fn handle_call(node: Node<'_>, ctx: &Context, source: &str, output: &mut ExtractedFile) {
    let Some(function_node) = node.child_by_field_name("function") else {
        return;
    };
    let target = match function_node.kind() {
        "identifier" => Some(format!("{}.{}", ctx.module, node_text(function_node, source))),
        "selector_expression" => {
            let operand = function_node
                .child_by_field_name("operand")
                .map(|n| node_text(n, source))
                .unwrap_or_default();
            let field = function_node
                .child_by_field_name("field")
                .map(|n| node_text(n, source))
                .unwrap_or_default();
            if field.is_empty() {
                None
            } else if operand.is_empty() || operand.contains('(') || operand.contains('.') {
                Some(field)
            } else {
                // Package-qualified or receiver-qualified; either way the
                // builder can suffix-match "operand.field".
                Some(format!("{operand}.{field}"))
            }
        }
        _ => None,
    };
    let Some(target) = target else { return };
    output.edges.push(EdgeInput {
        kind: EdgeKind::Call,
        source_qualname: ctx.current_scope.clone(),
        target_qualname: target,
    });
}

fn receiver_type(node: Node<'_>, source: &str) -> Option<String> {
    let receiver = node.child_by_field_name("receiver")?;
    let mut cursor = receiver.walk();
    for param in receiver.named_children(&mut cursor) {
        if param.kind() != "parameter_declaration" {
            continue;
        }
        if let Some(ty) = param.child_by_field_name("type") {
            let raw = node_text(ty, source);
            let cleaned = raw.trim_start_matches('*').trim();
            let base = cleaned.split('[').next().unwrap_or(cleaned);
            if !base.is_empty() {
                return Some(base.to_string());
            }
        }
    }
    None
}

fn collect_import_specs(node: Node<'_>, ctx: &Context, source: &str, output: &mut ExtractedFile) {
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        match child.kind() {
            "import_spec" => {
                if let Some(path_node) = child.child_by_field_name("path") {
                    push_import(&node_text(path_node, source), ctx, output);
                }
            }
            "import_spec_list" => {
                let mut inner = child.walk();
                for spec in child.named_children(&mut inner) {
                    if spec.kind() == "import_spec" {
                        if let Some(path_node) = spec.child_by_field_name("path") {
                            push_import(&node_text(path_node, source), ctx, output);
                        }
                    }
                }
            }
            _ => {}
        }
    }
}

fn push_import(raw: &str, ctx: &Context, output: &mut ExtractedFile) {
    let path = raw.trim_matches('"').trim();
    if path.is_empty() {
        return;
    }
    output.edges.push(EdgeInput {
        kind: EdgeKind::Import,
        source_qualname: ctx.module.clone(),
        target_qualname: path.to_string(),
    });
}

fn node_text(node: Node<'_>, source: &str) -> String {
    let start = node.start_byte();
    let end = node.end_byte();
    source.get(start..end).unwrap_or("").trim().to_string()
}
