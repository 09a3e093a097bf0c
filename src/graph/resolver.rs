//! Reference resolution: links refs, imports and exports to definitions.
//!
//! Resolution happens in two places. [`link_local`] runs inside the parser and
//! binds names to definitions of the same file. [`resolve_references`] runs once
//! per build over every parse result and produces only cross-file edges,
//! skipping any source the parser already resolved.

use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::debug;

use super::types::{Edge, EdgeType, Node, NodeType, ParseResult, SymbolKind};
use crate::parser::SupportedLanguage;

/// Most candidates a single reference is linked to.
pub const MAX_CANDIDATES: usize = 8;

// ─── Same-file resolution ───────────────────────────────────

/// Intra-file edges for one file: refs to compatible definitions and local
/// exports to the top-level definition they publish.
pub(crate) fn link_local(nodes: &[Node]) -> Vec<Edge> {
    let mut defs: HashMap<&str, Vec<&Node>> = HashMap::new();
    for node in nodes.iter().filter(|n| n.is_definition()) {
        defs.entry(node.symbol_name.as_str()).or_default().push(node);
    }

    let mut edges = Vec::new();
    for node in nodes {
        let Some(named) = defs.get(node.symbol_name.as_str()) else {
            continue;
        };
        match node.node_type {
            NodeType::Ref => {
                let candidates: Vec<&Node> = named
                    .iter()
                    .copied()
                    .filter(|def| is_compatible(node, def) && is_visible(def, node.scope.as_deref()))
                    .collect();
                let candidates = prefer_enclosing(candidates, node.scope.as_deref());
                link(&mut edges, node, &candidates, ref_edge_type(node));
            }
            NodeType::Export if node.module.is_none() => {
                let candidates: Vec<&Node> = named
                    .iter()
                    .copied()
                    .filter(|def| def.scope.is_none())
                    .collect();
                link(&mut edges, node, &candidates, EdgeType::Define);
            }
            _ => {}
        }
    }
    edges
}

// ─── Cross-file resolution ──────────────────────────────────

/// Cross-file edges for a whole build.
///
/// Imports and re-exports whose module resolves to an indexed file get
/// `define` edges to the definitions (or exports) they bind. Refs the parser
/// could not resolve in-file are matched against compatible definitions in
/// other files, preferring files the referencing file imports that name from.
pub fn resolve_references(results: &[ParseResult]) -> Vec<Edge> {
    let modules = ModuleResolver::new(results.iter().map(|r| r.file.as_str()));

    let mut defs_by_name: HashMap<&str, Vec<&Node>> = HashMap::new();
    let mut top_level: HashMap<(&str, &str), Vec<&Node>> = HashMap::new();
    let mut exports: HashMap<(&str, &str), Vec<&Node>> = HashMap::new();
    for node in results.iter().flat_map(|r| r.nodes.iter()) {
        let key = (node.file.as_str(), node.symbol_name.as_str());
        match node.node_type {
            NodeType::Def => {
                defs_by_name.entry(key.1).or_default().push(node);
                if node.scope.is_none() {
                    top_level.entry(key).or_default().push(node);
                }
            }
            NodeType::Export => exports.entry(key).or_default().push(node),
            _ => {}
        }
    }

    let mut edges = Vec::new();
    for result in results {
        let resolved: HashSet<&str> = result
            .edges
            .iter()
            .filter(|e| {
                matches!(
                    e.edge_type,
                    EdgeType::Invoke | EdgeType::Reference | EdgeType::Define
                )
            })
            .map(|e| e.source.as_str())
            .collect();

        // Name bound by an import -> files it was imported from.
        let mut imported: HashMap<&str, Vec<&str>> = HashMap::new();

        for node in &result.nodes {
            let binds = node.node_type == NodeType::Import
                || (node.node_type == NodeType::Export && node.module.is_some());
            if !binds || node.symbol_name == "*" || resolved.contains(node.id.as_str()) {
                continue;
            }
            let Some(module) = node.module.as_deref() else {
                continue;
            };
            let Some(target_file) = modules.resolve(&result.file, result.language, module) else {
                continue;
            };
            if target_file == result.file {
                continue;
            }
            imported
                .entry(node.symbol_name.as_str())
                .or_default()
                .push(target_file);

            let key = (target_file, node.symbol_name.as_str());
            let targets = top_level
                .get(&key)
                .or_else(|| exports.get(&key))
                .map(Vec::as_slice)
                .unwrap_or_default();
            link(&mut edges, node, targets, EdgeType::Define);
        }

        for node in result.nodes.iter().filter(|n| n.is_reference()) {
            if resolved.contains(node.id.as_str()) {
                continue;
            }
            let Some(named) = defs_by_name.get(node.symbol_name.as_str()) else {
                continue;
            };
            let mut candidates: Vec<&Node> = named
                .iter()
                .copied()
                .filter(|def| def.file != result.file && is_compatible(node, def) && !is_local(def))
                .collect();
            if let Some(files) = imported.get(node.symbol_name.as_str()) {
                let preferred: Vec<&Node> = candidates
                    .iter()
                    .copied()
                    .filter(|def| files.contains(&def.file.as_str()))
                    .collect();
                if !preferred.is_empty() {
                    candidates = preferred;
                }
            }
            candidates.sort_by(|a, b| (&a.file, a.line).cmp(&(&b.file, b.line)));
            link(&mut edges, node, &candidates, ref_edge_type(node));
        }
    }

    debug!(edges = edges.len(), files = results.len(), "resolved cross-file references");
    edges
}

// ─── Matching rules ─────────────────────────────────────────

/// Whether `def` is something `reference` could be naming.
fn is_compatible(reference: &Node, def: &Node) -> bool {
    use SymbolKind::*;
    match reference.symbol_kind {
        Function => matches!(def.symbol_kind, Function | Class | Variable | Constant),
        Method => matches!(def.symbol_kind, Method | Function | Property | Variable),
        Class => matches!(def.symbol_kind, Class | Function),
        Property => matches!(def.symbol_kind, Property | Variable | Constant | Method | Class),
        _ => false,
    }
}

/// Functions, variables and classes declared inside another construct are
/// only reachable from within it. Members (methods, properties) are not local.
fn is_local(def: &Node) -> bool {
    def.scope.is_some()
        && matches!(
            def.symbol_kind,
            SymbolKind::Function | SymbolKind::Variable | SymbolKind::Constant | SymbolKind::Class
        )
}

fn is_visible(def: &Node, from_scope: Option<&str>) -> bool {
    if !is_local(def) {
        return true;
    }
    match (def.scope.as_deref(), from_scope) {
        (Some(scope), Some(from)) => encloses(scope, from),
        _ => false,
    }
}

/// `outer` is `inner` or one of its ancestors.
fn encloses(outer: &str, inner: &str) -> bool {
    inner == outer
        || inner
            .strip_prefix(outer)
            .is_some_and(|rest| rest.starts_with('.'))
}

/// Narrow to candidates whose scope encloses the referencing scope, if any do.
fn prefer_enclosing<'n>(candidates: Vec<&'n Node>, from_scope: Option<&str>) -> Vec<&'n Node> {
    let Some(from) = from_scope else {
        return candidates;
    };
    let enclosing: Vec<&Node> = candidates
        .iter()
        .copied()
        .filter(|def| def.scope.as_deref().is_some_and(|s| encloses(s, from)))
        .collect();
    if enclosing.is_empty() {
        candidates
    } else {
        enclosing
    }
}

fn ref_edge_type(reference: &Node) -> EdgeType {
    if reference.symbol_kind == SymbolKind::Property {
        EdgeType::Reference
    } else {
        EdgeType::Invoke
    }
}

/// Emit one edge per candidate (capped), splitting confidence evenly.
fn link(edges: &mut Vec<Edge>, source: &Node, candidates: &[&Node], edge_type: EdgeType) {
    let candidates = &candidates[..candidates.len().min(MAX_CANDIDATES)];
    if candidates.is_empty() {
        return;
    }
    let confidence = 1.0 / candidates.len() as f64;
    for target in candidates {
        if target.id != source.id {
            edges.push(Edge::new(&source.id, &target.id, edge_type, confidence));
        }
    }
}

// ─── Module resolution ──────────────────────────────────────

/// Maps import specifiers to indexed files.
struct ModuleResolver<'a> {
    files: BTreeSet<&'a str>,
}

const ECMASCRIPT_PROBES: &[&str] = &[
    "", ".ts", ".tsx", ".js", ".jsx", ".mjs", ".cjs", "/index.ts", "/index.tsx", "/index.js",
    "/index.jsx",
];

const PYTHON_PROBES: &[&str] = &[".py", "/__init__.py", ".pyi"];

impl<'a> ModuleResolver<'a> {
    fn new(files: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            files: files.into_iter().collect(),
        }
    }

    fn resolve(&self, from_file: &str, language: SupportedLanguage, specifier: &str) -> Option<&'a str> {
        if language.is_ecmascript() {
            self.resolve_ecmascript(from_file, specifier)
        } else {
            self.resolve_python(from_file, specifier)
        }
    }

    fn probe(&self, base: &str, suffixes: &[&str]) -> Option<&'a str> {
        suffixes
            .iter()
            .find_map(|suffix| self.files.get(format!("{base}{suffix}").as_str()).copied())
    }

    /// Relative specifiers only; bare package names are external.
    fn resolve_ecmascript(&self, from_file: &str, specifier: &str) -> Option<&'a str> {
        if !specifier.starts_with('.') {
            return None;
        }
        let path = join(parent_dir(from_file), specifier)?;
        if let Some(found) = self.probe(&path, ECMASCRIPT_PROBES) {
            return Some(found);
        }
        // TypeScript ESM imports name the emitted `.js` file.
        let stem = path.strip_suffix(".js")?;
        self.probe(stem, &[".ts", ".tsx"])
    }

    fn resolve_python(&self, from_file: &str, specifier: &str) -> Option<&'a str> {
        let dots = specifier.chars().take_while(|&c| c == '.').count();
        let rest = specifier[dots..].replace('.', "/");

        if dots > 0 {
            let mut base = parent_dir(from_file).to_string();
            for _ in 1..dots {
                base = parent_dir(&base).to_string();
            }
            if rest.is_empty() {
                // `from . import x` names the package itself.
                let init = if base.is_empty() {
                    "__init__.py".to_string()
                } else {
                    format!("{base}/__init__.py")
                };
                return self.files.get(init.as_str()).copied();
            }
            let path = if base.is_empty() {
                rest
            } else {
                format!("{base}/{rest}")
            };
            return self.probe(&path, PYTHON_PROBES);
        }

        if rest.is_empty() {
            return None;
        }
        if let Some(found) = self.probe(&rest, PYTHON_PROBES) {
            return Some(found);
        }
        // Source roots such as `src/` are not known; match as a path suffix.
        PYTHON_PROBES.iter().find_map(|suffix| {
            let tail = format!("/{rest}{suffix}");
            self.files.iter().find(|f| f.ends_with(&tail)).copied()
        })
    }
}

fn parent_dir(path: &str) -> &str {
    path.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("")
}

/// Join a relative specifier onto a directory, normalising `.` and `..`.
/// Returns `None` when the path climbs above the root.
fn join(dir: &str, relative: &str) -> Option<String> {
    let mut parts: Vec<&str> = dir.split('/').filter(|p| !p.is_empty()).collect();
    for segment in relative.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop()?;
            }
            other => parts.push(other),
        }
    }
    Some(parts.join("/"))
}
