//! JavaScript and TypeScript walker.
//!
//! Both grammars share node kinds for everything extracted here; the
//! TypeScript-only kinds simply never occur in JavaScript trees.

use super::{field_text, for_each_child, is_declared_name, line, text};
use crate::entity::{EntityScope, EntityType, RawEntity};
use tree_sitter::{Node, Tree};

pub(super) fn extract(tree: &Tree, source: &[u8]) -> Vec<RawEntity> {
    let mut out = Vec::new();
    walk(tree.root_node(), source, EntityScope::Module, &mut out);
    out
}

fn walk(node: Node, source: &[u8], scope: EntityScope, out: &mut Vec<RawEntity>) {
    match node.kind() {
        "import_statement" => import_statement(node, source, scope, out),
        "export_statement" => export_statement(node, source, scope, out),
        "class_declaration" | "abstract_class_declaration" | "class" => {
            if let Some(name) = field_text(node, "name", source) {
                out.push(
                    RawEntity::new(EntityType::Class, name, line(node)).with_scope(scope),
                );
            }
            walk_children(node, source, EntityScope::Class, out);
        }
        "interface_declaration" | "enum_declaration" => {
            if let Some(name) = field_text(node, "name", source) {
                out.push(
                    RawEntity::new(EntityType::Class, name, line(node)).with_scope(scope),
                );
            }
            walk_children(node, source, EntityScope::Class, out);
        }
        "function_declaration" | "generator_function_declaration" => {
            if let Some(name) = field_text(node, "name", source) {
                out.push(
                    RawEntity::new(EntityType::Function, name, line(node)).with_scope(scope),
                );
            }
            walk_children(node, source, EntityScope::Local, out);
        }
        "method_definition" => {
            if let Some(name) = field_text(node, "name", source) {
                let private = name.starts_with('#') || name.starts_with('_') || has_private_modifier(node, source);
                out.push(
                    RawEntity::new(EntityType::Function, name, line(node))
                        .with_scope(EntityScope::Class)
                        .private(private),
                );
            }
            walk_children(node, source, EntityScope::Local, out);
        }
        "arrow_function" | "function" | "function_expression" | "generator_function" => {
            walk_children(node, source, EntityScope::Local, out);
        }
        "variable_declarator" => variable_declarator(node, source, scope, out),
        "call_expression" => {
            if let Some(import) = require_call(node, source) {
                out.push(import.with_scope(scope));
                return;
            }
            if let Some(callee) = node.child_by_field_name("function").and_then(|f| callee_name(f, source)) {
                out.push(RawEntity::new(EntityType::Call, callee, line(node)));
            }
            walk_children(node, source, scope, out);
        }
        "new_expression" => {
            if let Some(callee) = node.child_by_field_name("constructor").and_then(|f| callee_name(f, source)) {
                out.push(RawEntity::new(EntityType::Call, callee, line(node)));
            }
            walk_children(node, source, scope, out);
        }
        "type_identifier" if !is_declared_name(node) => {
            out.push(RawEntity::new(EntityType::TypeReference, text(node, source), line(node)));
        }
        "predefined_type" => {
            out.push(RawEntity::new(EntityType::TypeReference, text(node, source), line(node)));
        }
        _ => walk_children(node, source, scope, out),
    }
}

fn walk_children(node: Node, source: &[u8], scope: EntityScope, out: &mut Vec<RawEntity>) {
    for_each_child(node, |child| walk(child, source, scope, out));
}

fn has_private_modifier(node: Node, source: &[u8]) -> bool {
    let mut private = false;
    for_each_child(node, |child| {
        if child.kind() == "accessibility_modifier" && text(child, source) == "private" {
            private = true;
        }
    });
    private
}

/// Contents of a string literal node.
fn string_value(node: Node, source: &[u8]) -> String {
    let mut fragments = String::new();
    for_each_child(node, |child| {
        if child.kind() == "string_fragment" {
            fragments.push_str(text(child, source));
        }
    });
    if fragments.is_empty() {
        text(node, source).trim_matches(|c| c == '"' || c == '\'' || c == '`').to_string()
    } else {
        fragments
    }
}

fn callee_name(node: Node, source: &[u8]) -> Option<String> {
    match node.kind() {
        "identifier" => Some(text(node, source).to_string()),
        "member_expression" => field_text(node, "property", source).map(String::from),
        _ => None,
    }
}

/// `require('x')` as an import of `x`.
fn require_call(node: Node, source: &[u8]) -> Option<RawEntity> {
    let function = node.child_by_field_name("function")?;
    if function.kind() != "identifier" || text(function, source) != "require" {
        return None;
    }
    let arguments = node.child_by_field_name("arguments")?;
    let first = arguments.named_child(0)?;
    if first.kind() != "string" {
        return None;
    }
    let module = string_value(first, source);
    Some(RawEntity::import(module.clone(), module, line(node)))
}

fn import_statement(node: Node, source: &[u8], scope: EntityScope, out: &mut Vec<RawEntity>) {
    let Some(module) = node.child_by_field_name("source").map(|s| string_value(s, source)) else {
        return;
    };
    let mut binding = None;
    let mut specifiers = Vec::new();

    for_each_child(node, |child| {
        if child.kind() != "import_clause" {
            return;
        }
        for_each_child(child, |part| match part.kind() {
            "identifier" => binding = Some(text(part, source).to_string()),
            "namespace_import" => {
                for_each_child(part, |name| {
                    if name.kind() == "identifier" {
                        binding = Some(text(name, source).to_string());
                    }
                });
            }
            "named_imports" => {
                for_each_child(part, |specifier| {
                    if specifier.kind() == "import_specifier" {
                        if let Some(name) = field_text(specifier, "name", source) {
                            specifiers.push(name.trim_matches(|c| c == '"' || c == '\'').to_string());
                        }
                    }
                });
            }
            _ => {}
        });
    });

    let name = binding.unwrap_or_else(|| module.clone());
    out.push(
        RawEntity::import(name, module, line(node))
            .with_specifiers(specifiers)
            .with_scope(scope),
    );
}

fn declared_names(node: Node, source: &[u8]) -> Vec<String> {
    match node.kind() {
        "lexical_declaration" | "variable_declaration" => {
            let mut names = Vec::new();
            for_each_child(node, |child| {
                if child.kind() == "variable_declarator" {
                    if let Some(name) = child.child_by_field_name("name").filter(|n| n.kind() == "identifier") {
                        names.push(text(name, source).to_string());
                    }
                }
            });
            names
        }
        _ => field_text(node, "name", source)
            .map(|name| vec![name.to_string()])
            .unwrap_or_default(),
    }
}

fn export_statement(node: Node, source: &[u8], scope: EntityScope, out: &mut Vec<RawEntity>) {
    let export_line = line(node);
    let from = node.child_by_field_name("source").map(|s| string_value(s, source));
    let is_default = {
        let mut found = false;
        for_each_child(node, |child| found |= child.kind() == "default");
        found
    };

    let mut exported = Vec::new();
    if let Some(declaration) = node.child_by_field_name("declaration") {
        exported.extend(declared_names(declaration, source));
    }
    for_each_child(node, |child| match child.kind() {
        "export_clause" => {
            for_each_child(child, |specifier| {
                if specifier.kind() == "export_specifier" {
                    let name = field_text(specifier, "alias", source).or_else(|| field_text(specifier, "name", source));
                    if let Some(name) = name {
                        exported.push(name.to_string());
                    }
                }
            });
        }
        "*" | "namespace_export" => exported.push("*".to_string()),
        _ => {}
    });
    if is_default && exported.is_empty() {
        exported.push("default".to_string());
    }

    for name in exported {
        let mut entity = RawEntity::new(EntityType::Export, name, export_line).with_scope(scope);
        entity.source = from.clone();
        out.push(entity);
    }

    if let Some(declaration) = node.child_by_field_name("declaration") {
        walk(declaration, source, scope, out);
    }
    if let Some(value) = node.child_by_field_name("value") {
        walk(value, source, scope, out);
    }
}

fn variable_declarator(node: Node, source: &[u8], scope: EntityScope, out: &mut Vec<RawEntity>) {
    let name_node = node.child_by_field_name("name");
    let value = node.child_by_field_name("value");

    if let Some(mut import) = value.filter(|v| v.kind() == "call_expression").and_then(|v| require_call(v, source)) {
        match name_node {
            Some(n) if n.kind() == "identifier" => import.name = text(n, source).to_string(),
            Some(n) if n.kind() == "object_pattern" => {
                let mut specifiers = Vec::new();
                for_each_child(n, |part| {
                    if part.kind() == "shorthand_property_identifier_pattern" {
                        specifiers.push(text(part, source).to_string());
                    }
                });
                import.specifiers = specifiers;
            }
            _ => {}
        }
        out.push(import.with_scope(scope));
        return;
    }

    if let Some(name) = name_node.filter(|n| n.kind() == "identifier") {
        let name = text(name, source);
        out.push(
            RawEntity::new(EntityType::Variable, name, line(node))
                .with_scope(scope)
                .private(name.starts_with('_')),
        );
    }
    if let Some(type_annotation) = node.child_by_field_name("type") {
        walk(type_annotation, source, scope, out);
    }
    if let Some(value) = value {
        walk(value, source, scope, out);
    }
}
