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

pub struct JavascriptAdapter {
    parser: Parser,
}

impl JavascriptAdapter {
    pub fn new() -> Result<Self> {
        let mut parser = Parser::new();
        let language = tree_sitter_javascript::LANGUAGE;
        parser.set_language(&language.into())?;
        Ok(Self { parser })
    }
}

impl crate::adapter::LanguageAdapter for JavascriptAdapter {
    fn module_name_from_rel_path(&self, rel_path: &str) -> String {
        module_name_from_rel_path(rel_path)
    }

    fn extract(&mut self, source: &str, module_name: &str) -> Result<ExtractedFile> {
        extract_with(&mut self.parser, source, module_name)
    }
}

pub struct TypescriptAdapter {
    parser: Parser,
}

impl TypescriptAdapter {
    pub fn new() -> Result<Self> {
        let mut parser = Parser::new();
        let language = tree_sitter_typescript::LANGUAGE_TYPESCRIPT;
        parser.set_language(&language.into())?;
        Ok(Self { parser })
    }
}

impl crate::adapter::LanguageAdapter for TypescriptAdapter {
    fn module_name_from_rel_path(&self, rel_path: &str) -> String {
        module_name_from_rel_path(rel_path)
    }

    fn extract(&mut self, source: &str, module_name: &str) -> Result<ExtractedFile> {
        extract_with(&mut self.parser, source, module_name)
    }
}

pub struct TsxAdapter {
    parser: Parser,
}

impl TsxAdapter {
    pub fn new() -> Result<Self> {
        let mut parser = Parser::new();
        let language = tree_sitter_typescript::LANGUAGE_TSX;
        parser.set_language(&language.into())?;
        Ok(Self { parser })
    }
}

impl crate::adapter::LanguageAdapter for TsxAdapter {
    fn module_name_from_rel_path(&self, rel_path: &str) -> String {
        module_name_from_rel_path(rel_path)
    }

    fn extract(&mut self, source: &str, module_name: &str) -> Result<ExtractedFile> {
        extract_with(&mut self.parser, source, module_name)
    }
}

fn extract_with(parser: &mut Parser, source: &str, module_name: &str) -> Result<ExtractedFile> {
    let mut output = ExtractedFile::default();
    let tree = match parser.parse(source, None) {
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
        class_stack: Vec::new(),
        fn_depth: 0,
        current_scope: module_name.to_string(),
    };
    walk_node(root, &ctx, source, &mut output);
    Ok(output)
}

pub fn module_name_from_rel_path(rel_path: &str) -> String {
    let path = Path::new(rel_path);
    let mut parts: Vec<String> = path
        .components()
        .filter_map(|comp| comp.as_os_str().to_str().map(|s| s.to_string()))
        .collect();
    if parts.is_empty() {
        return "module".to_string();
    }
    let file = parts.pop().unwrap_or_default();
    let stem = Path::new(&file)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(&file)
        .to_string();
    if stem != "index" && !stem.is_empty() {
        parts.push(stem);
    }
    if parts.is_empty() {
        "module".to_string()
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
        "class_declaration" | "abstract_class_declaration" => {
            if let Some(name_node) = node.child_by_field_name("name") {
                let name = node_text(name_node, source);
                let qualname = format!("{}.{}", ctx.module, name);
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
                    walk_children(body, &next_ctx, source, output);
                }
            }
            return;
        }
        "method_definition" => {
            if let Some(name_node) = node.child_by_field_name("name") {
                let name = node_text(name_node, source);
                let qualname = build_qualname(&ctx.module, &ctx.class_stack, &name);
                output.units.push(UnitInput {
                    kind: UnitKind::Method,
                    name,
                    qualname: qualname.clone(),
                    start_line: node.start_position().row as i64 + 1,
                    end_line: node.end_position().row as i64 + 1,
                });
                let mut next_ctx = ctx.clone();
                next_ctx.fn_depth += 1;
                next_ctx.current_scope = qualname;
                if let Some(body) = node.child_by_field_name("body") {
                    walk_children(body, &next_ctx, source, output);
                }
            }
            return;
        }
        "function_declaration" | "generator_function_declaration" => {
            if ctx.fn_depth > 0 {
                return;
            }
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
                let mut next_ctx = ctx.clone();
                next_ctx.fn_depth += 1;
                next_ctx.current_scope = qualname;
                if let Some(body) = node.child_by_field_name("body") {
                    walk_children(body, &next_ctx, source, output);
                }
            }
            return;
        }
        "variable_declarator" => {
            // const handler = () => {} / const handler = function () {}
            let value_kind = node.child_by_field_name("value").map(|n| n.kind());
            if matches!(
                value_kind,
                Some("arrow_function") | Some("function_expression")
            ) && ctx.fn_depth == 0
            {
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
                    let mut next_ctx = ctx.clone();
                    next_ctx.fn_depth += 1;
                    next_ctx.current_scope = qualname;
                    if let Some(value) = node.child_by_field_name("value") {
                        walk_children(value, &next_ctx, source, output);
                    }
                    return;
                }
            }
        }
        "import_statement" => {
            if let Some(source_node) = node.child_by_field_name("source") {
                let raw = unquote(&node_text(source_node, source));
                if !raw.is_empty() {
                    output.edges.push(EdgeInput {
                        kind: EdgeKind::Import,
                        source_qualname: ctx.module.clone(),
                        target_qualname: resolve_module_specifier(&raw, &ctx.module),
                    });
                }
            }
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
    match function_node.kind() {
        "identifier" => {
            let name = node_text(function_node, source);
            if name == "require" {
                if let Some(raw) = first_string_argument(node, source) {
                    output.edges.push(EdgeInput {
                        kind: EdgeKind::Import,
                        source_qualname: ctx.module.clone(),
                        target_qualname: resolve_module_specifier(&raw, &ctx.module),
                    });
                }
                return;
            }
            output.edges.push(EdgeInput {
                kind: EdgeKind::Call,
                source_qualname: ctx.current_scope.clone(),
                target_qualname: format!("{}.{}", ctx.module, name),
            });
        }
        "member_expression" => {
            let object = function_node
                .child_by_field_name("object")
                .map(|n| node_text(n, source))
                .unwrap_or_default();
            let Some(property) = function_node
                .child_by_field_name("property")
                .map(|n| node_text(n, source))
            else {
                return;
            };
            if property.is_empty() {
                return;
            }
            let target = if object == "this" && !ctx.class_stack.is_empty() {
                build_qualname(&ctx.module, &ctx.class_stack, &property)
            } else {
                // Unknown receiver: keep the bare method name for a
                // unique-suffix match in the builder.
                property
            };
            output.edges.push(EdgeInput {
                kind: EdgeKind::Call,
                source_qualname: ctx.current_scope.clone(),
                target_qualname: target,
            });
        }
        _ => {}
    }
}

fn first_string_argument(call: Node<'_>, source: &str) -> Option<String> {
    let args = call.child_by_field_name("arguments")?;
    let mut cursor = args.walk();
    for child in args.named_children(&mut cursor) {
        if child.kind() == "string" || child.kind() == "template_string" {
            let raw = unquote(&node_text(child, source));
            if !raw.is_empty() {
                return Some(raw);
            }
        }
    }
    None
}

fn unquote(raw: &str) -> String {
    raw.trim_matches(|ch| ch == '"' || ch == '\'' || ch == '`')
        .to_string()
}

/// Resolve `./helper` and `../lib/x` against the importing module; bare
/// specifiers (packages) pass through for the builder to treat as external.
fn resolve_module_specifier(spec: &str, module: &str) -> String {
    if !spec.starts_with('.') {
        return spec.to_string();
    }
    let mut parts: Vec<&str> = module.split('/').collect();
    parts.pop();
    for segment in spec.split('/') {
        match segment {
            "." | "" => {}
            ".." => {
                parts.pop();
            }
            other => {
                let stem = other
                    .strip_suffix(".js")
                    .or_else(|| other.strip_suffix(".ts"))
                    .or_else(|| other.strip_suffix(".jsx"))
                    .or_else(|| other.strip_suffix(".tsx"))
                    .unwrap_or(other);
                parts.push(stem);
            }
        }
    }
    if parts.is_empty() {
        spec.to_string()
    } else {
        parts.join("/")
    }
}

fn build_qualname(module: &str, class_stack: &[String], name: &str) -> String {
    if class_stack.is_empty() {
        format!("{module}.{name}")
    } else {
        format!("{module}.{}.{}", class_stack.join("."), name)
    }
}

fn node_text(node: Node<'_>, source: &str) -> String {
    let start = node.start_byte();
    let end = node.end_byte();
    source.get(start..end).unwrap_or("").trim().to_string()
}
