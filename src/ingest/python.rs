//! Python walker.

use super::{field_text, for_each_child, line, text};
use crate::entity::{EntityScope, EntityType, RawEntity};
use tree_sitter::{Node, Tree};

pub(super) fn extract(tree: &Tree, source: &[u8]) -> Vec<RawEntity> {
    let mut out = Vec::new();
    walk(tree.root_node(), source, EntityScope::Module, &mut out);
    out
}

/// `_name` is private; dunder names are not.
fn is_private(name: &str) -> bool {
    name.starts_with('_') && !(name.starts_with("__") && name.ends_with("__"))
}

fn walk(node: Node, source: &[u8], scope: EntityScope, out: &mut Vec<RawEntity>) {
    match node.kind() {
        "import_statement" => {
            let mut cursor = node.walk();
            for child in node.children_by_field_name("name", &mut cursor) {
                let module = match child.kind() {
                    "aliased_import" => field_text(child, "name", source).unwrap_or_default(),
                    _ => text(child, source),
                };
                if !module.is_empty() {
                    out.push(RawEntity::import(module, module, line(node)).with_scope(scope));
                }
            }
        }
        "import_from_statement" => {
            let Some(module) = field_text(node, "module_name", source) else {
                return;
            };
            let mut specifiers = Vec::new();
            let mut cursor = node.walk();
            for child in node.children_by_field_name("name", &mut cursor) {
                let name = match child.kind() {
                    "aliased_import" => field_text(child, "name", source).unwrap_or_default(),
                    _ => text(child, source),
                };
                specifiers.push(name.to_string());
            }
            for_each_child(node, |child| {
                if child.kind() == "wildcard_import" {
                    specifiers.push("*".to_string());
                }
            });
            out.push(
                RawEntity::import(module, module, line(node))
                    .with_specifiers(specifiers)
                    .with_scope(scope),
            );
        }
        "class_definition" => {
            if let Some(name) = field_text(node, "name", source) {
                out.push(
                    RawEntity::new(EntityType::Class, name, line(node))
                        .with_scope(scope)
                        .private(is_private(name)),
                );
            }
            if let Some(superclasses) = node.child_by_field_name("superclasses") {
                walk(superclasses, source, scope, out);
            }
            if let Some(body) = node.child_by_field_name("body") {
                let inner = if scope == EntityScope::Local {
                    EntityScope::Local
                } else {
                    EntityScope::Class
                };
                walk(body, source, inner, out);
            }
        }
        "function_definition" => {
            if let Some(name) = field_text(node, "name", source) {
                out.push(
                    RawEntity::new(EntityType::Function, name, line(node))
                        .with_scope(scope)
                        .private(is_private(name)),
                );
            }
            for field in ["parameters", "return_type", "body"] {
                if let Some(child) = node.child_by_field_name(field) {
                    walk(child, source, EntityScope::Local, out);
                }
            }
        }
        "call" => {
            let callee = node.child_by_field_name("function").and_then(|f| match f.kind() {
                "identifier" => Some(text(f, source)),
                "attribute" => field_text(f, "attribute", source),
                _ => None,
            });
            if let Some(callee) = callee {
                out.push(RawEntity::new(EntityType::Call, callee, line(node)));
            }
            walk_children(node, source, scope, out);
        }
        "assignment" => {
            if let Some(left) = node.child_by_field_name("left").filter(|l| l.kind() == "identifier") {
                let name = text(left, source);
                out.push(
                    RawEntity::new(EntityType::Variable, name, line(node))
                        .with_scope(scope)
                        .private(is_private(name)),
                );
            }
            for field in ["type", "right"] {
                if let Some(child) = node.child_by_field_name(field) {
                    walk(child, source, scope, out);
                }
            }
        }
        "type" => {
            let mut simple = None;
            for_each_child(node, |child| {
                if child.kind() == "identifier" {
                    simple = Some(text(child, source));
                }
            });
            match simple {
                Some(name) if node.named_child_count() == 1 => {
                    out.push(RawEntity::new(EntityType::TypeReference, name, line(node)));
                }
                _ => walk_children(node, source, scope, out),
            }
        }
        _ => walk_children(node, source, scope, out),
    }
}

fn walk_children(node: Node, source: &[u8], scope: EntityScope, out: &mut Vec<RawEntity>) {
    for_each_child(node, |child| walk(child, source, scope, out));
}
