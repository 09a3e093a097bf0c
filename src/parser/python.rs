//! Python extraction via AST traversal.

use tree_sitter::Node;

use super::{field_text, is_constant_name, line_of, strip_quotes, Collector, Context};
use crate::graph::types::SymbolKind;

/// Extract nodes from a Python syntax tree.
pub(super) fn extract(root: Node, source: &[u8], out: &mut Collector) {
    walk_children(root, source, out, &Context::default());
}

fn walk_children(node: Node, source: &[u8], out: &mut Collector, ctx: &Context) {
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        walk(child, source, out, ctx);
    }
}

fn walk_field(node: Node, field: &str, source: &[u8], out: &mut Collector, ctx: &Context) {
    if let Some(child) = node.child_by_field_name(field) {
        walk(child, source, out, ctx);
    }
}

fn walk(node: Node, source: &[u8], out: &mut Collector, ctx: &Context) {
    match node.kind() {
        "function_definition" => {
            let Some(name) = field_text(&node, "name", source) else {
                return;
            };
            let kind = if ctx.in_class() {
                SymbolKind::Method
            } else {
                SymbolKind::Function
            };
            let def = out.def(line_of(&node), name, kind, ctx);
            // Default values are evaluated in the enclosing scope.
            walk_field(node, "parameters", source, out, ctx);
            walk_field(node, "body", source, out, &ctx.enter_function(name, def));
        }

        "class_definition" => {
            let Some(name) = field_text(&node, "name", source) else {
                return;
            };
            let def = out.def(line_of(&node), name, SymbolKind::Class, ctx);
            walk_field(node, "superclasses", source, out, ctx);
            walk_field(node, "body", source, out, &ctx.enter_class(name, def));
        }

        "assignment" => walk_assignment(node, source, out, ctx),

        "call" => {
            if let Some(function) = node.child_by_field_name("function") {
                match function.kind() {
                    "identifier" => {
                        if let Ok(name) = function.utf8_text(source) {
                            out.reference(line_of(&node), name, SymbolKind::Function, ctx);
                        }
                    }
                    "attribute" => {
                        if let Some(name) = field_text(&function, "attribute", source) {
                            out.reference(line_of(&function), name, SymbolKind::Method, ctx);
                        }
                        walk_field(function, "object", source, out, ctx);
                    }
                    _ => walk(function, source, out, ctx),
                }
            }
            walk_field(node, "arguments", source, out, ctx);
        }

        "attribute" => {
            if let Some(name) = field_text(&node, "attribute", source) {
                out.reference(line_of(&node), name, SymbolKind::Property, ctx);
            }
            walk_field(node, "object", source, out, ctx);
        }

        "import_statement" => {
            let mut cursor = node.walk();
            for name_node in node.children_by_field_name("name", &mut cursor) {
                let module_node = match name_node.kind() {
                    "aliased_import" => name_node.child_by_field_name("name"),
                    _ => Some(name_node),
                };
                if let Some(module) = module_node.and_then(|n| n.utf8_text(source).ok()) {
                    out.import(line_of(&name_node), module, module, ctx);
                }
            }
        }

        "import_from_statement" => walk_import_from(node, source, out, ctx),

        "lambda" => walk_field(node, "body", source, out, &ctx.enter_anonymous()),

        "comment" | "integer" | "float" => {}

        _ => walk_children(node, source, out, ctx),
    }
}

fn walk_assignment(node: Node, source: &[u8], out: &mut Collector, ctx: &Context) {
    let line = line_of(&node);
    let right = node.child_by_field_name("right");

    if let Some(left) = node.child_by_field_name("left") {
        match left.kind() {
            "identifier" => {
                if let Ok(name) = left.utf8_text(source) {
                    if name == "__all__" && !ctx.in_function() {
                        if let Some(right) = right {
                            export_all(right, source, out, ctx);
                        }
                        return;
                    }
                    define_target(line, name, out, ctx);
                }
            }
            "pattern_list" | "tuple_pattern" => {
                let mut cursor = left.walk();
                for target in left.named_children(&mut cursor) {
                    if target.kind() == "identifier" {
                        if let Ok(name) = target.utf8_text(source) {
                            define_target(line, name, out, ctx);
                        }
                    } else {
                        walk(target, source, out, ctx);
                    }
                }
            }
            _ => walk(left, source, out, ctx),
        }
    }

    if let Some(right) = right {
        walk(right, source, out, ctx);
    }
}

/// Module- and class-level assignment targets are definitions; locals are not.
fn define_target(line: usize, name: &str, out: &mut Collector, ctx: &Context) {
    if ctx.in_function() {
        return;
    }
    let kind = if ctx.in_class() {
        SymbolKind::Property
    } else if is_constant_name(name) {
        SymbolKind::Constant
    } else {
        SymbolKind::Variable
    };
    out.def(line, name, kind, ctx);
}

/// `__all__ = ["a", "b"]` exports each listed name.
fn export_all(value: Node, source: &[u8], out: &mut Collector, ctx: &Context) {
    let mut cursor = value.walk();
    for item in value.named_children(&mut cursor) {
        if item.kind() != "string" {
            continue;
        }
        if let Ok(text) = item.utf8_text(source) {
            let name = strip_quotes(text);
            if !name.is_empty() {
                out.export(line_of(&item), name, SymbolKind::Variable, None, ctx);
            }
        }
    }
}

fn walk_import_from(node: Node, source: &[u8], out: &mut Collector, ctx: &Context) {
    let Some(module) = field_text(&node, "module_name", source) else {
        return;
    };

    let mut bound = false;
    let mut cursor = node.walk();
    for name_node in node.children_by_field_name("name", &mut cursor) {
        let imported = match name_node.kind() {
            "aliased_import" => name_node.child_by_field_name("name"),
            _ => Some(name_node),
        };
        if let Some(name) = imported.and_then(|n| n.utf8_text(source).ok()) {
            out.import(line_of(&name_node), name, module, ctx);
            bound = true;
        }
    }

    if !bound {
        let mut cursor = node.walk();
        let wildcard = node
            .named_children(&mut cursor)
            .any(|c| c.kind() == "wildcard_import");
        if wildcard {
            out.import(line_of(&node), "*", module, ctx);
        }
    }
}
