//! Source parsing: turns one file into graph nodes and intra-file edges.
//!
//! Each language module walks the tree-sitter AST and reports candidate
//! definitions, references, imports and exports to a [`Collector`]. The
//! collector assigns node ids, reads line text, and links containment,
//! sequential order and same-file resolutions.

pub mod denylist;
mod ecmascript;
pub mod language;
mod python;

pub use denylist::ModuleDenylist;
pub use language::SupportedLanguage;

use std::collections::{HashMap, HashSet};
use std::path::Path;
use tree_sitter::Parser;

use crate::error::{RepoGraphError, Result};
use crate::graph::builder::InclusionPolicy;
use crate::graph::resolver;
use crate::graph::types::{Edge, EdgeType, Node, NodeType, ParseResult, SymbolKind};

/// Longest line text kept on a node, in characters.
pub const MAX_LINE_TEXT: usize = 300;

/// Settings shared by every file of one build.
#[derive(Debug, Clone, Default)]
pub struct ParseConfig {
    pub denylist: ModuleDenylist,
    /// Candidates it rejects never become nodes, so they take no id.
    pub policy: InclusionPolicy,
}

/// Parse one file. `rel_path` is the path relative to the indexed root and
/// decides both the language and the node ids.
///
/// Files whose syntax tree contains errors are rejected with
/// [`RepoGraphError::Parse`] so the caller can skip them whole.
pub fn parse_source(rel_path: &Path, source: &str, config: &ParseConfig) -> Result<ParseResult> {
    let language = SupportedLanguage::from_path(rel_path).ok_or_else(|| {
        RepoGraphError::UnsupportedLanguage(rel_path.display().to_string())
    })?;
    let file = normalize_rel_path(rel_path);

    let mut parser = Parser::new();
    parser
        .set_language(&language.tree_sitter_language())
        .map_err(|e| RepoGraphError::Parse {
            file: file.clone(),
            message: format!("failed to load grammar: {e}"),
        })?;
    let tree = parser.parse(source, None).ok_or_else(|| RepoGraphError::Parse {
        file: file.clone(),
        message: "parser produced no tree".to_string(),
    })?;

    let root = tree.root_node();
    if root.has_error() {
        let line = first_error_line(root).unwrap_or(1);
        return Err(RepoGraphError::Parse {
            file,
            message: format!("syntax error near line {line}"),
        });
    }

    let mut collector = Collector::new(file, language, source, config);
    match language {
        SupportedLanguage::Python => python::extract(root, source.as_bytes(), &mut collector),
        _ => ecmascript::extract(root, source.as_bytes(), &mut collector),
    }
    Ok(collector.finish())
}

/// `/`-separated relative path used as the node file key.
pub fn normalize_rel_path(path: &Path) -> String {
    let text = path.to_string_lossy().replace('\\', "/");
    text.strip_prefix("./").unwrap_or(&text).to_string()
}

fn first_error_line(node: tree_sitter::Node) -> Option<usize> {
    if node.is_error() || node.is_missing() {
        return Some(node.start_position().row + 1);
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.has_error() {
            if let Some(line) = first_error_line(child) {
                return Some(line);
            }
        }
    }
    None
}

/// Enclosing-construct state threaded through the language walkers.
#[derive(Debug, Clone, Default)]
pub(crate) struct Context {
    scope: Vec<String>,
    /// Candidate index of the innermost enclosing definition.
    parent: Option<usize>,
    in_class: bool,
    in_function: bool,
}

impl Context {
    pub(crate) fn scope_path(&self) -> Option<String> {
        if self.scope.is_empty() {
            None
        } else {
            Some(self.scope.join("."))
        }
    }

    /// Context for the body of a named function or method.
    pub(crate) fn enter_function(&self, name: &str, def: usize) -> Self {
        let mut scope = self.scope.clone();
        scope.push(name.to_string());
        Self {
            scope,
            parent: Some(def),
            in_class: false,
            in_function: true,
        }
    }

    /// Context for the body of a class or interface.
    pub(crate) fn enter_class(&self, name: &str, def: usize) -> Self {
        let mut scope = self.scope.clone();
        scope.push(name.to_string());
        Self {
            scope,
            parent: Some(def),
            in_class: true,
            in_function: false,
        }
    }

    /// Context for an anonymous function body (callbacks, lambdas).
    pub(crate) fn enter_anonymous(&self) -> Self {
        Self {
            in_class: false,
            in_function: true,
            ..self.clone()
        }
    }

    pub(crate) fn in_class(&self) -> bool {
        self.in_class
    }

    pub(crate) fn in_function(&self) -> bool {
        self.in_function
    }
}

#[derive(Debug, Clone)]
struct Candidate {
    line: usize,
    node_type: NodeType,
    name: String,
    kind: SymbolKind,
    scope: Option<String>,
    module: Option<String>,
    parent: Option<usize>,
}

/// Accumulates candidates for one file and turns them into a [`ParseResult`].
pub(crate) struct Collector<'a> {
    file: String,
    language: SupportedLanguage,
    lines: Vec<&'a str>,
    denylist: &'a ModuleDenylist,
    policy: &'a InclusionPolicy,
    candidates: Vec<Candidate>,
}

impl<'a> Collector<'a> {
    fn new(
        file: String,
        language: SupportedLanguage,
        source: &'a str,
        config: &'a ParseConfig,
    ) -> Self {
        Self {
            file,
            language,
            lines: source.lines().collect(),
            denylist: &config.denylist,
            policy: &config.policy,
            candidates: Vec::new(),
        }
    }

    /// Record a definition and return its candidate index.
    pub(crate) fn def(&mut self, line: usize, name: &str, kind: SymbolKind, ctx: &Context) -> usize {
        self.push(Candidate {
            line,
            node_type: NodeType::Def,
            name: name.to_string(),
            kind,
            scope: ctx.scope_path(),
            module: None,
            parent: ctx.parent,
        })
    }

    pub(crate) fn reference(&mut self, line: usize, name: &str, kind: SymbolKind, ctx: &Context) {
        self.push(Candidate {
            line,
            node_type: NodeType::Ref,
            name: name.to_string(),
            kind,
            scope: ctx.scope_path(),
            module: None,
            parent: ctx.parent,
        });
    }

    /// Record an imported binding unless its module is denylisted.
    pub(crate) fn import(&mut self, line: usize, name: &str, module: &str, ctx: &Context) {
        if module.is_empty() || self.denylist.is_denied(module, self.language) {
            return;
        }
        self.push(Candidate {
            line,
            node_type: NodeType::Import,
            name: name.to_string(),
            kind: SymbolKind::Import,
            scope: ctx.scope_path(),
            module: Some(module.to_string()),
            parent: ctx.parent,
        });
    }

    /// Record an exported binding. `module` is set for re-exports.
    pub(crate) fn export(
        &mut self,
        line: usize,
        name: &str,
        kind: SymbolKind,
        module: Option<&str>,
        ctx: &Context,
    ) {
        if module.is_some_and(|m| self.denylist.is_denied(m, self.language)) {
            return;
        }
        self.push(Candidate {
            line,
            node_type: NodeType::Export,
            name: name.to_string(),
            kind,
            scope: ctx.scope_path(),
            module: module.map(str::to_string),
            parent: ctx.parent,
        });
    }

    fn push(&mut self, candidate: Candidate) -> usize {
        self.candidates.push(candidate);
        self.candidates.len() - 1
    }

    fn line_text(&self, line: usize) -> String {
        let raw = self
            .lines
            .get(line.saturating_sub(1))
            .copied()
            .unwrap_or_default()
            .trim_end();
        match raw.char_indices().nth(MAX_LINE_TEXT) {
            Some((cut, _)) => raw[..cut].to_string(),
            None => raw.to_string(),
        }
    }

    fn finish(self) -> ParseResult {
        let mut result = ParseResult::new(self.file.clone(), self.language);

        // Candidate index -> id of the node that represents it.
        let mut ids: Vec<Option<String>> = Vec::with_capacity(self.candidates.len());
        let mut seen: HashMap<(usize, NodeType, &str), String> = HashMap::new();
        let mut taken_lines: HashSet<usize> = HashSet::new();

        for candidate in &self.candidates {
            if candidate.name.is_empty() || candidate.line == 0 {
                ids.push(None);
                continue;
            }
            let key = (candidate.line, candidate.node_type, candidate.name.as_str());
            if let Some(existing) = seen.get(&key) {
                ids.push(Some(existing.clone()));
                continue;
            }
            let mut node = Node {
                id: String::new(),
                file: self.file.clone(),
                line: candidate.line,
                node_type: candidate.node_type,
                symbol_name: candidate.name.clone(),
                symbol_kind: candidate.kind,
                scope: candidate.scope.clone(),
                text: self.line_text(candidate.line),
                module: candidate.module.clone(),
            };
            if !self.policy.includes(&node) {
                ids.push(None);
                continue;
            }
            node.id = if taken_lines.insert(candidate.line) {
                Node::canonical_id(&self.file, candidate.line)
            } else {
                Node::qualified_id(&self.file, candidate.line, candidate.node_type, &candidate.name)
            };
            seen.insert(key, node.id.clone());
            ids.push(Some(node.id.clone()));
            result.nodes.push(node);
        }

        let mut contained: HashSet<&str> = HashSet::new();
        for (index, candidate) in self.candidates.iter().enumerate() {
            if candidate.node_type != NodeType::Def {
                continue;
            }
            let Some(id) = ids[index].as_deref() else {
                continue;
            };
            if !contained.insert(id) {
                continue;
            }
            let container = candidate
                .parent
                .and_then(|p| ids[p].clone())
                .unwrap_or_else(|| self.file.clone());
            if container != id {
                result.edges.push(Edge::certain(container, id, EdgeType::Contain));
            }
        }

        let local = resolver::link_local(&result.nodes);
        result.edges.extend(local);
        result.relink_sequential();
        result
    }
}

/// Strip matching quotes from a string literal.
pub(crate) fn strip_quotes(text: &str) -> &str {
    let text = text.trim();
    for quote in ["\"\"\"", "'''", "\"", "'", "`"] {
        if text.len() >= 2 * quote.len() && text.starts_with(quote) && text.ends_with(quote) {
            return &text[quote.len()..text.len() - quote.len()];
        }
    }
    text
}

/// UPPER_CASE names are treated as constants.
pub(crate) fn is_constant_name(name: &str) -> bool {
    name.chars().any(|c| c.is_alphabetic())
        && name
            .chars()
            .all(|c| c.is_uppercase() || c.is_ascii_digit() || c == '_' || c == '$')
}

/// 1-indexed start line of a syntax node.
pub(crate) fn line_of(node: &tree_sitter::Node) -> usize {
    node.start_position().row + 1
}

/// Source text of a named field of `node`.
pub(crate) fn field_text<'s>(node: &tree_sitter::Node, field: &str, source: &'s [u8]) -> Option<&'s str> {
    node.child_by_field_name(field)?.utf8_text(source).ok()
}
