use crate::adapter::{EdgeInput, ExtractedFile, UnitInput};
use crate::model::{EdgeKind, UnitKind};
use anyhow::Result;
use std::path::Path;
use tree_sitter::{Node, Parser};

#[derive(Clone)]
struct Context {
    module: String,
    namespace: Option<String>,
    class_stack: Vec<String>,
    current_scope: String,
}

impl Context {
    fn container_prefix(&self) -> String {
        match &self.namespace {
            Some(namespace) => namespace.clone(),
            None => self.module.clone(),
        }
    }
}

pub struct CSharpAdapter {
    parser: Parser,
}

impl CSharpAdapter {
    pub fn new() -> Result<Self> {
        let mut parser = Parser::new();
        let language = tree_sitter_c_sharp::LANGUAGE;
        parser.set_language(&language.into())?;
        Ok(Self { parser })
    }
}

impl crate::adapter::LanguageAdapter for CSharpAdapter {
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
            namespace: None,
            class_stack: Vec::new(),
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
        return "module".to_string();
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
    if node.kind() == "invocation_expression" {
        handle_invocation(node, ctx, source, output);
    }
    match node.kind() {
        "namespace_declaration" | "file_scoped_namespace_declaration" => {
            if let Some(name_node) = node.child_by_field_name("name") {
                let mut next_ctx = ctx.clone();
                next_ctx.namespace = Some(node_text(name_node, source));
                if let Some(body) = node.child_by_field_name("body") {
                    walk_children(body, &next_ctx, source, output);
                } else {
                    // File-scoped namespaces have no body node; the rest of
                    // the compilation unit belongs to them.
                    walk_children(node, &next_ctx, source, output);
                }
            }
            return;
        }
        "class_declaration"
        | "interface_declaration"
        | "struct_declaration"
        | "record_declaration" => {
            if let Some(name_node) = node.child_by_field_name("name") {
                let name = node_text(name_node, source);
                let qualname = build_qualname(&ctx.container_prefix(), &ctx.class_stack, &name);
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
        "method_declaration" | "constructor_declaration" => {
            if let Some(name_node) = node.child_by_field_name("name") {
                let name = node_text(name_node, source);
                let qualname = build_qualname(&ctx.container_prefix(), &ctx.class_stack, &name);
                output.units.push(UnitInput {
                    kind: UnitKind::Method,
                    name,
                    qualname: qualname.clone(),
                    start_line: node.start_position().row as i64 + 1,
                    end_line: node.end_position().row as i64 + 1,
                });
                let mut next_ctx = ctx.clone();
                next_ctx.current_scope = qualname;
                if let Some(body) = node.child_by_field_name("body") {
                    walk_children(body, &next_ctx, source, output);
                }
            }
            return;
        }
        "using_directive" => {
            let text = node_text(node, source);
            if let Some(target) = parse_using_target(&text) {
                output.edges.push(EdgeInput {
                    kind: EdgeKind::Import,
                    source_qualname: ctx.module.clone(),
                    target_qualname: target,
                });
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

fn handle_invocation(node: Node<'_>, ctx: &Context, source: &str, output: &mut ExtractedFile) {
    let Some(function_node) = node.child_by_field_name("function") else {
        return;
    };
    let target = match function_node.kind() {
        "identifier" => {
            let name = node_text(function_node, source);
            Some(build_qualname(
                &ctx.container_prefix(),
                &ctx.class_stack,
                &name,
            ))
        }
        "member_access_expression" => {
            let object = function_node
                .child_by_field_name("expression")
                .map(|n| node_text(n, source))
                .unwrap_or_default();
            let name = function_node
                .child_by_field_name("name")
                .map(|n| node_text(n, source))
                .unwrap_or_default();
            if name.is_empty() {
                None
            } else if object == "this" {
                Some(build_qualname(
                    &ctx.container_prefix(),
                    &ctx.class_stack,
                    &name,
                ))
            } else if object.is_empty() || object.contains('(') {
                Some(name)
            } else {
                Some(format!("{object}.{name}"))
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

fn parse_using_target(text: &str) -> Option<String> {
    let cleaned = text.trim().trim_end_matches(';').trim();
    let rest = cleaned.strip_prefix("using ")?;
    let rest = rest.strip_prefix("static ").unwrap_or(rest);
    // Alias form: using Foo = Some.Namespace;
    let target = match rest.split_once('=') {
        Some((_, aliased)) => aliased.trim(),
        None => rest.trim(),
    };
    if target.is_empty() {
        None
    } else {
        Some(target.to_string())
    }
}

fn build_qualname(prefix: &str, class_stack: &[String], name: &str) -> String {
    if class_stack.is_empty() {
        format!("{prefix}.{name}")
    } else {
        format!("{prefix}.{}.{}", class_stack.join("."), name)
    }
}

fn node_text(node: Node<'_>, source: &str) -> String {
    let start = node.start_byte();
    let end = node.end_byte();
    source.get(start..end).unwrap_or("").trim().to_string()
}
