//! Rust walker.
//!
//! `use` trees are flattened into one import per leaf path. Items without
//! a visibility modifier are private, except trait impl members whose
//! visibility follows the trait.

use super::{field_text, for_each_child, is_declared_name, line, text};
use crate::entity::{EntityScope, EntityType, RawEntity};
use tree_sitter::{Node, Tree};

#[derive(Debug, Clone, Copy)]
struct Context {
    scope: EntityScope,
    trait_impl: bool,
}

impl Context {
    fn module() -> Self {
        Self {
            scope: EntityScope::Module,
            trait_impl: false,
        }
    }

    fn local() -> Self {
        Self {
            scope: EntityScope::Local,
            trait_impl: false,
        }
    }
}

pub(super) fn extract(tree: &Tree, source: &[u8]) -> Vec<RawEntity> {
    let mut out = Vec::new();
    walk(tree.root_node(), source, Context::module(), &mut out);
    out
}

fn is_pub(node: Node) -> bool {
    let mut found = false;
    for_each_child(node, |child| found |= child.kind() == "visibility_modifier");
    found
}

fn join_path(prefix: &str, segment: &str) -> String {
    if prefix.is_empty() {
        segment.to_string()
    } else {
        format!("{}::{}", prefix, segment)
    }
}

/// Leaf paths of a use tree.
fn flatten_use(node: Node, source: &[u8], prefix: &str, paths: &mut Vec<String>) {
    match node.kind() {
        "use_as_clause" => {
            if let Some(path) = node.child_by_field_name("path") {
                flatten_use(path, source, prefix, paths);
            }
        }
        "scoped_use_list" => {
            let base = match field_text(node, "path", source) {
                Some(path) => join_path(prefix, path),
                None => prefix.to_string(),
            };
            if let Some(list) = node.child_by_field_name("list") {
                flatten_use(list, source, &base, paths);
            }
        }
        "use_list" => {
            let mut cursor = node.walk();
            for child in node.named_children(&mut cursor) {
                flatten_use(child, source, prefix, paths);
            }
        }
        "self" => paths.push(prefix.to_string()),
        _ => {
            let path = join_path(prefix, text(node, source));
            // `use a::{self}` and `use a::b::self` name the module itself.
            let path = path.strip_suffix("::self").map(String::from).unwrap_or(path);
            paths.push(path);
        }
    }
}

fn use_declaration(node: Node, source: &[u8], ctx: Context, out: &mut Vec<RawEntity>) {
    let Some(argument) = node.child_by_field_name("argument") else {
        return;
    };
    let mut paths = Vec::new();
    flatten_use(argument, source, "", &mut paths);
    let exported = is_pub(node);

    for path in paths.into_iter().filter(|p| !p.is_empty()) {
        let name = path.rsplit("::").next().unwrap_or(&path).to_string();
        if exported {
            let mut export = RawEntity::new(EntityType::Export, name.clone(), line(node)).with_scope(ctx.scope);
            export.source = Some(path.clone());
            out.push(export);
        }
        out.push(RawEntity::import(name, path, line(node)).with_scope(ctx.scope));
    }
}

fn declare(node: Node, source: &[u8], entity_type: EntityType, ctx: Context, out: &mut Vec<RawEntity>) {
    let Some(name) = field_text(node, "name", source) else {
        return;
    };
    let public = is_pub(node);
    let private = !public && !ctx.trait_impl && ctx.scope != EntityScope::Local;
    if public && ctx.scope == EntityScope::Module {
        out.push(RawEntity::new(EntityType::Export, name, line(node)));
    }
    out.push(
        RawEntity::new(entity_type, name, line(node))
            .with_scope(ctx.scope)
            .private(private),
    );
}

fn callee_name<'a>(node: Node, source: &'a [u8]) -> Option<&'a str> {
    match node.kind() {
        "identifier" => Some(text(node, source)),
        "scoped_identifier" => field_text(node, "name", source),
        "field_expression" => field_text(node, "field", source),
        "generic_function" => node
            .child_by_field_name("function")
            .and_then(|f| callee_name(f, source)),
        _ => None,
    }
}

fn walk(node: Node, source: &[u8], ctx: Context, out: &mut Vec<RawEntity>) {
    match node.kind() {
        "use_declaration" => use_declaration(node, source, ctx, out),
        "function_item" | "function_signature_item" => {
            declare(node, source, EntityType::Function, ctx, out);
            walk_children(node, source, Context::local(), out);
        }
        "struct_item" | "enum_item" | "union_item" | "trait_item" => {
            declare(node, source, EntityType::Class, ctx, out);
            let inner = match (node.kind(), ctx.scope) {
                (_, EntityScope::Local) => Context::local(),
                // Trait members are as visible as the trait.
                ("trait_item", _) => Context {
                    scope: EntityScope::Class,
                    trait_impl: true,
                },
                _ => Context {
                    scope: EntityScope::Class,
                    trait_impl: false,
                },
            };
            walk_children(node, source, inner, out);
        }
        "impl_item" => {
            let inner = if ctx.scope == EntityScope::Local {
                Context::local()
            } else {
                Context {
                    scope: EntityScope::Class,
                    trait_impl: node.child_by_field_name("trait").is_some(),
                }
            };
            walk_children(node, source, inner, out);
        }
        "const_item" | "static_item" => {
            declare(node, source, EntityType::Variable, ctx, out);
            walk_children(node, source, ctx, out);
        }
        "let_declaration" => {
            if let Some(pattern) = node.child_by_field_name("pattern").filter(|p| p.kind() == "identifier") {
                out.push(RawEntity::new(EntityType::Variable, text(pattern, source), line(node)).with_scope(EntityScope::Local));
            }
            for field in ["type", "value", "alternative"] {
                if let Some(child) = node.child_by_field_name(field) {
                    walk(child, source, ctx, out);
                }
            }
        }
        "call_expression" => {
            if let Some(callee) = node.child_by_field_name("function").and_then(|f| callee_name(f, source)) {
                out.push(RawEntity::new(EntityType::Call, callee, line(node)));
            }
            walk_children(node, source, ctx, out);
        }
        "type_identifier" if !is_declared_name(node) => {
            out.push(RawEntity::new(EntityType::TypeReference, text(node, source), line(node)));
        }
        "primitive_type" => {
            out.push(RawEntity::new(EntityType::TypeReference, text(node, source), line(node)));
        }
        "macro_invocation" | "attribute_item" | "inner_attribute_item" => {}
        _ => walk_children(node, source, ctx, out),
    }
}

fn walk_children(node: Node, source: &[u8], ctx: Context, out: &mut Vec<RawEntity>) {
    for_each_child(node, |child| walk(child, source, ctx, out));
}
