use crate::adapter::{EdgeInput, ExtractedFile, UnitInput};
use crate::model::{EdgeKind, UnitKind};
use anyhow::Result;
use std::path::Path;
use tree_sitter::{Node, Parser};

#[derive(Clone)]
struct Context {
    module: String,
    container_stack: Vec<String>,
    fn_depth: usize,
    current_scope: String,
}

pub struct RustAdapter {
    parser: Parser,
}

impl RustAdapter {
    pub fn new() -> Result<Self> {
        let mut parser = Parser::new();
        let language = tree_sitter_rust::LANGUAGE;
        parser.set_language(&language.into())?;
        Ok(Self { parser })
    }
}

impl crate::adapter::LanguageAdapter for RustAdapter {
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
            container_stack: Vec::new(),
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
        return "crate".to_string();
    }
    let file = parts.pop().unwrap_or_default();
    let stem = Path::new(&file)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(&file)
        .to_string();
    if !matches!(stem.as_str(), "mod" | "lib" | "main") {
        parts.push(stem);
    }
    if parts.is_empty() {
        "crate".to_string()
    } else {
        parts.join("::")
    }
}

fn module_short_name(module_name: &str) -> String {
    module_name
        .rsplit("::")
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
        "function_item" => {
            if ctx.fn_depth > 0 {
                return;
            }
            if let Some(name_node) = node.child_by_field_name("name") {
                let name = node_text(name_node, source);
                let qualname = build_qualname(&ctx.module, &ctx.container_stack, &name);
                let kind = if ctx.container_stack.is_empty() {
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
                    walk_children(body, &next_ctx, source, output);
                }
            }
            return;
        }
        "struct_item" | "enum_item" | "trait_item" => {
            if let Some(name_node) = node.child_by_field_name("name") {
                let name = node_text(name_node, source);
                let qualname = build_qualname(&ctx.module, &ctx.container_stack, &name);
                output.units.push(UnitInput {
                    kind: UnitKind::Class,
                    name,
                    qualname,
                    start_line: node.start_position().row as i64 + 1,
                    end_line: node.end_position().row as i64 + 1,
                });
            }
            // Trait items may carry default method bodies.
            if node.kind() == "trait_item" {
                if let Some(name_node) = node.child_by_field_name("name") {
                    let mut next_ctx = ctx.clone();
                    next_ctx
                        .container_stack
                        .push(node_text(name_node, source));
                    if let Some(body) = node.child_by_field_name("body") {
                        walk_children(body, &next_ctx, source, output);
                    }
                }
            }
            return;
        }
        "impl_item" => {
            let type_name = node
                .child_by_field_name("type")
                .map(|n| base_type_name(&node_text(n, source)));
            let mut next_ctx = ctx.clone();
            if let Some(type_name) = type_name {
                next_ctx.container_stack.push(type_name);
            }
            if let Some(body) = node.child_by_field_name("body") {
                walk_children(body, &next_ctx, source, output);
            }
            return;
        }
        "mod_item" => {
            // Inline module: extend the container path and keep walking.
            if let Some(name_node) = node.child_by_field_name("name") {
                let mut next_ctx = ctx.clone();
                next_ctx.container_stack.push(node_text(name_node, source));
                if let Some(body) = node.child_by_field_name("body") {
                    walk_children(body, &next_ctx, source, output);
                }
            }
            return;
        }
        "use_declaration" => {
            if let Some(target) = parse_use_target(&node_text(node, source)) {
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

fn handle_call(node: Node<'_>, ctx: &Context, source: &str, output: &mut ExtractedFile) {
    let Some(function_node) = node.child_by_field_name("function") else {
        return;
    };
    let target = match function_node.kind() {
        "identifier" => Some(format!("{}::{}", ctx.module, node_text(function_node, source))),
        "scoped_identifier" => Some(normalize_scoped_path(
            &node_text(function_node, source),
            &ctx.module,
        )),
        // Method call on a receiver whose type we do not track; keep the
        // bare name so the builder can try a unique-suffix match.
        "field_expression" => function_node
            .child_by_field_name("field")
            .map(|field| node_text(field, source)),
        _ => None,
    };
    let Some(target) = target else { return };
    if target.is_empty() {
        return;
    }
    output.edges.push(EdgeInput {
        kind: EdgeKind::Call,
        source_qualname: ctx.current_scope.clone(),
        target_qualname: target,
    });
}

fn normalize_scoped_path(raw: &str, module: &str) -> String {
    let cleaned: String = raw.chars().filter(|ch| !ch.is_whitespace()).collect();
    if let Some(rest) = cleaned.strip_prefix("self::") {
        return format!("{module}::{rest}");
    }
    if let Some(rest) = cleaned.strip_prefix("crate::") {
        return rest.to_string();
    }
    cleaned
}

fn base_type_name(raw: &str) -> String {
    let trimmed = raw.trim();
    let no_generics = trimmed.split('<').next().unwrap_or(trimmed);
    no_generics
        .rsplit("::")
        .next()
        .unwrap_or(no_generics)
        .trim()
        .to_string()
}

fn parse_use_target(text: &str) -> Option<String> {
    let cleaned = text
        .trim()
        .strip_prefix("pub ")
        .unwrap_or(text.trim())
        .trim();
    let cleaned = cleaned.strip_prefix("use ")?.trim_end_matches(';').trim();
    let base = cleaned.split('{').next().unwrap_or(cleaned);
    let base = base.split(" as ").next().unwrap_or(base);
    let base = base.trim().trim_end_matches("::").trim();
    let base = base.strip_prefix("crate::").unwrap_or(base);
    if base.is_empty() || base == "crate" {
        return None;
    }
    Some(base.to_string())
}

fn build_qualname(module: &str, container_stack: &[String], name: &str) -> String {
    if container_stack.is_empty() {
        format!("{module}::{name}")
    } else {
        format!("{module}::{}::{}", container_stack.join("::"), name)
    }
}

fn node_text(node: Node<'_>, source: &str) -> String {
    let start = node.start_byte();
    let end = node.end_byte();
    source.get(start..end).unwrap_or("").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::RustAdapter;
    use crate::adapter::LanguageAdapter;
    use crate::model::{EdgeKind, UnitKind};

    #[test]
    fn extracts_functions_and_impl_methods() {
        let source = r#"
pub struct Engine;

impl Engine {
    pub fn run(&self) {
        helper();
    }
}

fn helper() {}
"#;
        let mut adapter = RustAdapter::new().unwrap();
        let file = adapter.extract(source, "core::engine").unwrap();
        let qualnames: Vec<&str> = file.units.iter().map(|u| u.qualname.as_str()).collect();
        assert!(qualnames.contains(&"core::engine"));
        assert!(qualnames.contains(&"core::engine::Engine"));
        assert!(qualnames.contains(&"core::engine::Engine::run"));
        assert!(qualnames.contains(&"core::engine::helper"));
        let run = file
            .units
            .iter()
            .find(|u| u.qualname == "core::engine::Engine::run")
            .unwrap();
        assert_eq!(run.kind, UnitKind::Method);
        assert!(file.edges.iter().any(|e| {
            e.kind == EdgeKind::Call
                && e.source_qualname == "core::engine::Engine::run"
                && e.target_qualname == "core::engine::helper"
        }));
    }

    #[test]
    fn use_declarations_become_import_edges() {
        let source = "use crate::util::normalize;\nuse serde::Serialize;\n";
        let mut adapter = RustAdapter::new().unwrap();
        let file = adapter.extract(source, "core::engine").unwrap();
        let targets: Vec<&str> = file
            .edges
            .iter()
            .filter(|e| e.kind == EdgeKind::Import)
            .map(|e| e.target_qualname.as_str())
            .collect();
        assert!(targets.contains(&"util::normalize"));
        assert!(targets.contains(&"serde::Serialize"));
    }

    #[test]
    fn module_name_drops_special_stems() {
        assert_eq!(super::module_name_from_rel_path("src/lib.rs"), "src");
        assert_eq!(
            super::module_name_from_rel_path("src/parser/mod.rs"),
            "src::parser"
        );
        assert_eq!(
            super::module_name_from_rel_path("src/parser/lexer.rs"),
            "src::parser::lexer"
        );
    }

    #[test]
    fn scoped_calls_keep_their_path() {
        let source = "fn run() { util::helper::fix(); }\n";
        let mut adapter = RustAdapter::new().unwrap();
        let file = adapter.extract(source, "core").unwrap();
        assert!(
            file.edges
                .iter()
                .any(|e| e.target_qualname == "util::helper::fix")
        );
    }
}
