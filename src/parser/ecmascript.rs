//! JavaScript / TypeScript extraction via AST traversal.
//!
//! One walker serves the JavaScript, TypeScript and TSX grammars; the
//! TypeScript-only constructs (interfaces, type aliases, enums, signatures)
//! simply never appear in JavaScript trees.

use tree_sitter::Node;

use super::{field_text, is_constant_name, line_of, strip_quotes, Collector, Context};
use crate::graph::types::SymbolKind;

/// Extract nodes from a JS/TS syntax tree.
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
        "function_declaration" | "generator_function_declaration" | "function_signature" => {
            if let Some(name) = field_text(&node, "name", source) {
                let def = out.def(line_of(&node), name, SymbolKind::Function, ctx);
                walk_field(node, "body", source, out, &ctx.enter_function(name, def));
            }
        }

        "class_declaration" | "abstract_class_declaration" | "class" => {
            match field_text(&node, "name", source) {
                Some(name) => {
                    let def = out.def(line_of(&node), name, SymbolKind::Class, ctx);
                    walk_field(node, "body", source, out, &ctx.enter_class(name, def));
                }
                None => walk_field(node, "body", source, out, &ctx.enter_anonymous()),
            }
        }

        "interface_declaration" => {
            if let Some(name) = field_text(&node, "name", source) {
                let def = out.def(line_of(&node), name, SymbolKind::Interface, ctx);
                walk_field(node, "body", source, out, &ctx.enter_class(name, def));
            }
        }

        "type_alias_declaration" | "enum_declaration" => {
            if let Some(name) = field_text(&node, "name", source) {
                out.def(line_of(&node), name, SymbolKind::Type, ctx);
            }
        }

        "method_definition" | "method_signature" | "abstract_method_signature" => {
            let Some(name_node) = node.child_by_field_name("name") else {
                return;
            };
            if name_node.kind() == "computed_property_name" {
                walk_field(node, "body", source, out, &ctx.enter_anonymous());
                return;
            }
            if let Ok(name) = name_node.utf8_text(source) {
                let def = out.def(line_of(&node), name, SymbolKind::Method, ctx);
                walk_field(node, "body", source, out, &ctx.enter_function(name, def));
            }
        }

        "field_definition" | "public_field_definition" | "property_signature" => {
            let name_node = node
                .child_by_field_name("name")
                .or_else(|| node.child_by_field_name("property"));
            let Some(name) = name_node.and_then(|n| n.utf8_text(source).ok()) else {
                return;
            };
            let value = node.child_by_field_name("value");
            let kind = if value.is_some_and(|v| is_function_value(&v)) {
                SymbolKind::Method
            } else {
                SymbolKind::Property
            };
            let def = out.def(line_of(&node), name, kind, ctx);
            if let Some(value) = value {
                if kind == SymbolKind::Method {
                    walk_function_value(value, source, out, &ctx.enter_function(name, def));
                } else {
                    walk(value, source, out, ctx);
                }
            }
        }

        "lexical_declaration" | "variable_declaration" => {
            let mut cursor = node.walk();
            for declarator in node.named_children(&mut cursor) {
                if declarator.kind() == "variable_declarator" {
                    walk_declarator(declarator, source, out, ctx);
                }
            }
        }

        "call_expression" => walk_call(node, source, out, ctx),

        "new_expression" => {
            if let Some(constructor) = node.child_by_field_name("constructor") {
                match constructor.kind() {
                    "identifier" => {
                        if let Ok(name) = constructor.utf8_text(source) {
                            out.reference(line_of(&node), name, SymbolKind::Class, ctx);
                        }
                    }
                    "member_expression" => {
                        if let Some(name) = field_text(&constructor, "property", source) {
                            out.reference(line_of(&constructor), name, SymbolKind::Class, ctx);
                        }
                        walk_field(constructor, "object", source, out, ctx);
                    }
                    _ => walk(constructor, source, out, ctx),
                }
            }
            walk_field(node, "arguments", source, out, ctx);
        }

        "member_expression" => {
            if let Some(property) = node.child_by_field_name("property") {
                if matches!(property.kind(), "property_identifier" | "private_property_identifier") {
                    if let Ok(name) = property.utf8_text(source) {
                        out.reference(line_of(&property), name, SymbolKind::Property, ctx);
                    }
                }
            }
            walk_field(node, "object", source, out, ctx);
        }

        "import_statement" => walk_import(node, source, out, ctx),

        "export_statement" => walk_export(node, source, out, ctx),

        "arrow_function" | "function_expression" | "function" | "generator_function" => {
            walk_function_value(node, source, out, &ctx.enter_anonymous());
        }

        "comment" | "string" | "regex" | "number" => {}

        _ => walk_children(node, source, out, ctx),
    }
}

fn is_function_value(node: &Node) -> bool {
    matches!(
        node.kind(),
        "arrow_function" | "function_expression" | "function" | "generator_function"
    )
}

/// Walk the parameters and body of a function-valued expression.
fn walk_function_value(node: Node, source: &[u8], out: &mut Collector, ctx: &Context) {
    walk_field(node, "parameters", source, out, ctx);
    walk_field(node, "body", source, out, ctx);
}

fn walk_declarator(node: Node, source: &[u8], out: &mut Collector, ctx: &Context) {
    let name_node = node.child_by_field_name("name");
    let value = node.child_by_field_name("value");

    let name = match name_node {
        Some(n) if n.kind() == "identifier" => n.utf8_text(source).ok(),
        _ => None,
    };
    let Some(name) = name else {
        if let Some(value) = value {
            walk(value, source, out, ctx);
        }
        return;
    };

    if let Some(value) = value {
        if let Some(module) = require_target(&value, source) {
            out.import(line_of(&node), name, module, ctx);
            return;
        }
        if is_function_value(&value) {
            let def = out.def(line_of(&node), name, SymbolKind::Function, ctx);
            walk_function_value(value, source, out, &ctx.enter_function(name, def));
            return;
        }
    }

    if !ctx.in_function() {
        let kind = if is_constant_name(name) {
            SymbolKind::Constant
        } else {
            SymbolKind::Variable
        };
        out.def(line_of(&node), name, kind, ctx);
    }
    if let Some(value) = value {
        walk(value, source, out, ctx);
    }
}

/// `require("x")` -> `Some("x")`.
fn require_target<'s>(node: &Node, source: &'s [u8]) -> Option<&'s str> {
    if node.kind() != "call_expression" {
        return None;
    }
    let function = node.child_by_field_name("function")?;
    if function.kind() != "identifier" || function.utf8_text(source).ok()? != "require" {
        return None;
    }
    first_string_argument(node, source)
}

fn first_string_argument<'s>(call: &Node, source: &'s [u8]) -> Option<&'s str> {
    let arguments = call.child_by_field_name("arguments")?;
    let mut cursor = arguments.walk();
    let first = arguments.named_children(&mut cursor).next()?;
    if first.kind() != "string" {
        return None;
    }
    Some(strip_quotes(first.utf8_text(source).ok()?))
}

fn walk_call(node: Node, source: &[u8], out: &mut Collector, ctx: &Context) {
    let line = line_of(&node);
    if let Some(function) = node.child_by_field_name("function") {
        match function.kind() {
            "identifier" => {
                if let Ok(name) = function.utf8_text(source) {
                    match (name, first_string_argument(&node, source)) {
                        ("require", Some(module)) => out.import(line, module, module, ctx),
                        _ => out.reference(line, name, SymbolKind::Function, ctx),
                    }
                }
            }
            "import" => {
                if let Some(module) = first_string_argument(&node, source) {
                    out.import(line, module, module, ctx);
                }
            }
            "member_expression" => {
                if let Some(name) = field_text(&function, "property", source) {
                    out.reference(line_of(&function), name, SymbolKind::Method, ctx);
                }
                walk_field(function, "object", source, out, ctx);
            }
            _ => walk(function, source, out, ctx),
        }
    }
    walk_field(node, "arguments", source, out, ctx);
}

fn walk_import(node: Node, source: &[u8], out: &mut Collector, ctx: &Context) {
    let Some(module) = field_text(&node, "source", source).map(strip_quotes) else {
        return;
    };
    let line = line_of(&node);

    let mut bound = false;
    let mut cursor = node.walk();
    for clause in node.named_children(&mut cursor) {
        if clause.kind() != "import_clause" {
            continue;
        }
        let mut clause_cursor = clause.walk();
        for part in clause.named_children(&mut clause_cursor) {
            match part.kind() {
                "identifier" => {
                    if let Ok(name) = part.utf8_text(source) {
                        out.import(line, name, module, ctx);
                        bound = true;
                    }
                }
                "namespace_import" => {
                    let mut ns_cursor = part.walk();
                    let alias = part
                        .named_children(&mut ns_cursor)
                        .find(|c| c.kind() == "identifier")
                        .and_then(|c| c.utf8_text(source).ok());
                    if let Some(alias) = alias {
                        out.import(line, alias, module, ctx);
                        bound = true;
                    }
                }
                "named_imports" => {
                    let mut spec_cursor = part.walk();
                    for spec in part.named_children(&mut spec_cursor) {
                        if spec.kind() != "import_specifier" {
                            continue;
                        }
                        if let Some(name) = field_text(&spec, "name", source) {
                            out.import(line_of(&spec), strip_quotes(name), module, ctx);
                            bound = true;
                        }
                    }
                }
                _ => {}
            }
        }
    }

    // Side-effect import: `import "./polyfills"`.
    if !bound {
        out.import(line, module, module, ctx);
    }
}

fn walk_export(node: Node, source: &[u8], out: &mut Collector, ctx: &Context) {
    let line = line_of(&node);

    if let Some(declaration) = node.child_by_field_name("declaration") {
        walk(declaration, source, out, ctx);
        for (name, kind) in declared_names(&declaration, source) {
            out.export(line_of(&declaration), name, kind, None, ctx);
        }
        return;
    }

    let module = field_text(&node, "source", source).map(strip_quotes);

    let mut clause_found = false;
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        match child.kind() {
            "export_clause" => {
                clause_found = true;
                let mut spec_cursor = child.walk();
                for spec in child.named_children(&mut spec_cursor) {
                    if spec.kind() != "export_specifier" {
                        continue;
                    }
                    if let Some(name) = field_text(&spec, "name", source) {
                        out.export(line_of(&spec), strip_quotes(name), SymbolKind::Variable, module, ctx);
                    }
                }
            }
            "namespace_export" => {
                clause_found = true;
                let mut ns_cursor = child.walk();
                let alias = child
                    .named_children(&mut ns_cursor)
                    .next()
                    .and_then(|c| c.utf8_text(source).ok())
                    .unwrap_or("*");
                out.export(line, strip_quotes(alias), SymbolKind::Variable, module, ctx);
            }
            _ => {}
        }
    }
    if clause_found {
        return;
    }

    if let Some(value) = node.child_by_field_name("value") {
        let value_name = field_text(&value, "name", source);
        match (value.kind(), value_name) {
            ("identifier", _) => {
                if let Ok(name) = value.utf8_text(source) {
                    out.export(line, name, SymbolKind::Variable, None, ctx);
                }
            }
            // `export default function named() {}` parsed as an expression.
            (_, Some(name)) if is_function_value(&value) => {
                let def = out.def(line_of(&value), name, SymbolKind::Function, ctx);
                walk_function_value(value, source, out, &ctx.enter_function(name, def));
                out.export(line, name, SymbolKind::Function, None, ctx);
            }
            ("class", Some(name)) => {
                walk(value, source, out, ctx);
                out.export(line, name, SymbolKind::Class, None, ctx);
            }
            _ => {
                walk(value, source, out, ctx);
                out.export(line, "default", SymbolKind::Variable, None, ctx);
            }
        }
        return;
    }

    // `export * from "./module"`
    if module.is_some() {
        out.export(line, "*", SymbolKind::Variable, module, ctx);
    }
}

/// Names (and kinds) introduced by an exported declaration.
fn declared_names<'s>(declaration: &Node, source: &'s [u8]) -> Vec<(&'s str, SymbolKind)> {
    let kind = match declaration.kind() {
        "function_declaration" | "generator_function_declaration" | "function_signature" => {
            SymbolKind::Function
        }
        "class_declaration" | "abstract_class_declaration" => SymbolKind::Class,
        "interface_declaration" => SymbolKind::Interface,
        "type_alias_declaration" | "enum_declaration" => SymbolKind::Type,
        "lexical_declaration" | "variable_declaration" => {
            let mut names = Vec::new();
            let mut cursor = declaration.walk();
            for declarator in declaration.named_children(&mut cursor) {
                if declarator.kind() != "variable_declarator" {
                    continue;
                }
                let Some(name_node) = declarator.child_by_field_name("name") else {
                    continue;
                };
                if name_node.kind() != "identifier" {
                    continue;
                }
                if let Ok(name) = name_node.utf8_text(source) {
                    let is_fn = declarator
                        .child_by_field_name("value")
                        .is_some_and(|v| is_function_value(&v));
                    let kind = if is_fn {
                        SymbolKind::Function
                    } else if is_constant_name(name) {
                        SymbolKind::Constant
                    } else {
                        SymbolKind::Variable
                    };
                    names.push((name, kind));
                }
            }
            return names;
        }
        _ => return Vec::new(),
    };
    field_text(declaration, "name", source)
        .map(|name| vec![(name, kind)])
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use crate::graph::types::{EdgeType, Node as GraphNode, NodeType, ParseResult, SymbolKind};
    use crate::parser::{parse_source, ParseConfig};
    use std::path::Path;

    fn parse(path: &str, source: &str) -> ParseResult {
        parse_source(Path::new(path), source, &ParseConfig::default()).unwrap()
    }

    fn find<'a>(result: &'a ParseResult, node_type: NodeType, name: &str) -> &'a GraphNode {
        result
            .nodes
            .iter()
            .find(|n| n.node_type == node_type && n.symbol_name == name)
            .unwrap_or_else(|| panic!("missing {node_type} {name}"))
    }

    #[test]
    fn test_javascript_definitions() {
        let source = r#"
import { useState } from 'react';
import axios from 'axios';

class ApiClient {
    constructor(baseUrl) {
        this.baseUrl = baseUrl;
    }

    async fetchData(endpoint) {
        return axios.get(`${this.baseUrl}/${endpoint}`);
    }
}

function App() {
    const [data, setData] = useState(null);
    return data;
}

const API_URL = "https://api.example.com";
let counter = 0;
const handler = (event) => process(event);
"#;
        let result = parse("src/api.js", source);

        let class = find(&result, NodeType::Def, "ApiClient");
        assert_eq!(class.symbol_kind, SymbolKind::Class);
        let method = find(&result, NodeType::Def, "fetchData");
        assert_eq!(method.symbol_kind, SymbolKind::Method);
        assert_eq!(method.scope.as_deref(), Some("ApiClient"));
        assert_eq!(find(&result, NodeType::Def, "App").symbol_kind, SymbolKind::Function);
        assert_eq!(find(&result, NodeType::Def, "API_URL").symbol_kind, SymbolKind::Constant);
        assert_eq!(find(&result, NodeType::Def, "counter").symbol_kind, SymbolKind::Variable);
        assert_eq!(find(&result, NodeType::Def, "handler").symbol_kind, SymbolKind::Function);

        // Destructured locals inside functions are not definitions.
        assert!(!result.nodes.iter().any(|n| n.symbol_name == "data" && n.node_type == NodeType::Def));

        // react and axios are both denylisted.
        assert!(!result.nodes.iter().any(|n| n.node_type == NodeType::Import));

        let get = find(&result, NodeType::Ref, "get");
        assert_eq!(get.symbol_kind, SymbolKind::Method);
        assert_eq!(get.scope.as_deref(), Some("ApiClient.fetchData"));
        assert_eq!(find(&result, NodeType::Ref, "baseUrl").symbol_kind, SymbolKind::Property);
        assert_eq!(find(&result, NodeType::Ref, "useState").symbol_kind, SymbolKind::Function);
        assert_eq!(find(&result, NodeType::Ref, "process").scope.as_deref(), Some("handler"));
    }

    #[test]
    fn test_typescript_definitions() {
        let source = r#"
import { Request, Response } from 'express';
import { UserRepo as Repo } from './repo';

export interface UserDTO {
    id: number;
    name: string;
    greet(): string;
}

type UserID = number;

enum Role {
    Admin,
    User,
}

export class UserController {
    private repo: Repo;

    async getUser(req: Request, res: Response): Promise<void> {
        const user = await this.repo.findUser(req.params.id);
        res.json(new UserView(user));
    }
}

export default function createApp(): void {
    console.log("starting");
}
"#;
        let result = parse("src/users.ts", source);

        assert_eq!(find(&result, NodeType::Def, "UserDTO").symbol_kind, SymbolKind::Interface);
        assert_eq!(find(&result, NodeType::Def, "greet").symbol_kind, SymbolKind::Method);
        assert_eq!(find(&result, NodeType::Def, "UserID").symbol_kind, SymbolKind::Type);
        assert_eq!(find(&result, NodeType::Def, "Role").symbol_kind, SymbolKind::Type);
        assert_eq!(find(&result, NodeType::Def, "repo").symbol_kind, SymbolKind::Property);
        assert_eq!(find(&result, NodeType::Def, "createApp").symbol_kind, SymbolKind::Function);

        let import = find(&result, NodeType::Import, "UserRepo");
        assert_eq!(import.module.as_deref(), Some("./repo"));

        assert_eq!(find(&result, NodeType::Ref, "UserView").symbol_kind, SymbolKind::Class);
        assert_eq!(find(&result, NodeType::Ref, "findUser").symbol_kind, SymbolKind::Method);

        let exported: Vec<&str> = result
            .nodes
            .iter()
            .filter(|n| n.node_type == NodeType::Export)
            .map(|n| n.symbol_name.as_str())
            .collect();
        assert_eq!(exported, vec!["UserDTO", "UserController", "createApp"]);

        // Exports are linked to the definitions on their line.
        let defines = result
            .edges
            .iter()
            .filter(|e| e.edge_type == EdgeType::Define)
            .count();
        assert_eq!(defines, 3);
    }

    #[test]
    fn test_export_forms() {
        let source = r#"
function a() {}
const b = 1;
export { a, b as renamed };
export * from './all';
export { c } from './c';
export default a;
"#;
        let result = parse("index.mjs", source);
        let exports: Vec<(&str, Option<&str>)> = result
            .nodes
            .iter()
            .filter(|n| n.node_type == NodeType::Export)
            .map(|n| (n.symbol_name.as_str(), n.module.as_deref()))
            .collect();
        assert_eq!(
            exports,
            vec![
                ("a", None),
                ("b", None),
                ("*", Some("./all")),
                ("c", Some("./c")),
                ("a", None),
            ]
        );
    }

    #[test]
    fn test_require_and_dynamic_import() {
        let source = "const util = require('./util');\nrequire('./side-effect');\nconst fs = require('fs');\nasync function load() { return import('./lazy'); }\n";
        let result = parse("main.cjs", source);
        let imports: Vec<(&str, &str)> = result
            .nodes
            .iter()
            .filter(|n| n.node_type == NodeType::Import)
            .map(|n| (n.symbol_name.as_str(), n.module.as_deref().unwrap()))
            .collect();
        assert_eq!(
            imports,
            vec![
                ("util", "./util"),
                ("./side-effect", "./side-effect"),
                ("./lazy", "./lazy")
            ]
        );
        assert!(!result.nodes.iter().any(|n| n.symbol_name == "require"));
    }

    #[test]
    fn test_tsx_component() {
        let source = "export const Button = (props: Props) => {\n  return <button onClick={props.onClick}>{label(props)}</button>;\n};\n";
        let result = parse("ui/Button.tsx", source);
        assert_eq!(find(&result, NodeType::Def, "Button").symbol_kind, SymbolKind::Function);
        assert_eq!(find(&result, NodeType::Ref, "label").scope.as_deref(), Some("Button"));
        assert_eq!(find(&result, NodeType::Ref, "onClick").symbol_kind, SymbolKind::Property);
    }
}
