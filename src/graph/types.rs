//! Core types for the RepoGraph index.
//!
//! Defines node types, edge types, symbol kinds, and the data structures
//! that make up a built index and the per-file parse results it is made from.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::parser::SupportedLanguage;

/// Index format version. Bump whenever a persisted field is added, removed or retyped.
pub const INDEX_FORMAT_VERSION: u32 = 2;

/// What role a source line plays in the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    /// The line defines a symbol.
    Def,
    /// The line calls or accesses a symbol defined elsewhere.
    Ref,
    /// The line imports a binding.
    Import,
    /// The line exports a binding.
    Export,
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeType::Def => f.pad("def"),
            NodeType::Ref => f.pad("ref"),
            NodeType::Import => f.pad("import"),
            NodeType::Export => f.pad("export"),
        }
    }
}

/// The kind of symbol a node names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SymbolKind {
    Function,
    Method,
    Class,
    Variable,
    Import,
    Constant,
    Interface,
    Type,
    Property,
}

impl fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SymbolKind::Function => f.pad("function"),
            SymbolKind::Method => f.pad("method"),
            SymbolKind::Class => f.pad("class"),
            SymbolKind::Variable => f.pad("variable"),
            SymbolKind::Import => f.pad("import"),
            SymbolKind::Constant => f.pad("constant"),
            SymbolKind::Interface => f.pad("interface"),
            SymbolKind::Type => f.pad("type"),
            SymbolKind::Property => f.pad("property"),
        }
    }
}

/// The kind of relation an edge expresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeType {
    /// A call site invokes a definition.
    Invoke,
    /// A file or definition lexically contains a nested definition.
    Contain,
    /// An import or export binds to the definition it names.
    Define,
    /// A member access refers to a definition.
    Reference,
    /// Consecutive graph-relevant lines of one file.
    Next,
}

impl EdgeType {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "invoke" => Some(EdgeType::Invoke),
            "contain" => Some(EdgeType::Contain),
            "define" => Some(EdgeType::Define),
            "reference" => Some(EdgeType::Reference),
            "next" => Some(EdgeType::Next),
            _ => None,
        }
    }
}

impl fmt::Display for EdgeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EdgeType::Invoke => f.pad("invoke"),
            EdgeType::Contain => f.pad("contain"),
            EdgeType::Define => f.pad("define"),
            EdgeType::Reference => f.pad("reference"),
            EdgeType::Next => f.pad("next"),
        }
    }
}

/// One graph-relevant source line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    /// `"<file>:<line>"`, or `"<file>:<line>#<type>:<name>"` for extra nodes on a line.
    pub id: String,
    /// Path relative to the indexed root, `/`-separated.
    pub file: String,
    /// 1-indexed line number.
    pub line: usize,
    pub node_type: NodeType,
    pub symbol_name: String,
    pub symbol_kind: SymbolKind,
    /// Dotted path of the enclosing construct.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// The raw source line.
    pub text: String,
    /// Module specifier of an import or re-export.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
}

impl Node {
    pub fn canonical_id(file: &str, line: usize) -> String {
        format!("{}:{}", file, line)
    }

    pub fn qualified_id(file: &str, line: usize, node_type: NodeType, name: &str) -> String {
        format!("{}:{}#{}:{}", file, line, node_type, name)
    }

    pub fn is_definition(&self) -> bool {
        self.node_type == NodeType::Def
    }

    pub fn is_reference(&self) -> bool {
        self.node_type == NodeType::Ref
    }
}

/// A typed, weighted relation between two node ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub source: String,
    pub target: String,
    #[serde(rename = "type")]
    pub edge_type: EdgeType,
    /// Certainty of the relation, in `[0.0, 1.0]`.
    pub confidence: f64,
}

impl Edge {
    /// Create an edge. Confidence is clamped into `[0.0, 1.0]`; NaN becomes 0.
    pub fn new(
        source: impl Into<String>,
        target: impl Into<String>,
        edge_type: EdgeType,
        confidence: f64,
    ) -> Self {
        let confidence = if confidence.is_nan() {
            0.0
        } else {
            confidence.clamp(0.0, 1.0)
        };
        Self {
            source: source.into(),
            target: target.into(),
            edge_type,
            confidence,
        }
    }

    /// An edge known with syntactic certainty.
    pub fn certain(source: impl Into<String>, target: impl Into<String>, edge_type: EdgeType) -> Self {
        Self::new(source, target, edge_type, 1.0)
    }

    pub fn touches(&self, id: &str) -> bool {
        self.source == id || self.target == id
    }

    /// The endpoint opposite `id`, if `id` is an endpoint.
    pub fn other_end(&self, id: &str) -> Option<&str> {
        if self.source == id {
            Some(&self.target)
        } else if self.target == id {
            Some(&self.source)
        } else {
            None
        }
    }
}

/// Summary facts recorded with every index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    /// Build time, epoch milliseconds.
    pub indexed_at: i64,
    pub file_count: usize,
    pub node_count: usize,
    pub edge_count: usize,
    /// `typescript`, `javascript`, `python`, `multi` when mixed, `none` when empty.
    pub language: String,
    pub version: u32,
}

/// A built graph. Never mutated after construction; rebuilds make a new one.
#[derive(Debug, Clone, PartialEq)]
pub struct Index {
    /// Nodes keyed by id. Ordered so iteration is deterministic.
    pub nodes: BTreeMap<String, Node>,
    /// Edges in build order.
    pub edges: Vec<Edge>,
    /// Every file that parsed, including those that produced no nodes.
    pub files: BTreeSet<String>,
    pub metadata: Metadata,
}

impl Index {
    /// An index with no files.
    pub fn empty() -> Self {
        Self {
            nodes: BTreeMap::new(),
            edges: Vec::new(),
            files: BTreeSet::new(),
            metadata: Metadata {
                indexed_at: chrono::Utc::now().timestamp_millis(),
                file_count: 0,
                node_count: 0,
                edge_count: 0,
                language: "none".to_string(),
                version: INDEX_FORMAT_VERSION,
            },
        }
    }
}

/// Everything the parser produced for one file: its nodes and intra-file edges.
#[derive(Debug, Clone)]
pub struct ParseResult {
    /// Path relative to the indexed root, `/`-separated.
    pub file: String,
    pub language: SupportedLanguage,
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

impl ParseResult {
    pub fn new(file: String, language: SupportedLanguage) -> Self {
        Self {
            file,
            language,
            nodes: Vec::new(),
            edges: Vec::new(),
        }
    }

    /// Rebuild `next` edges: one certain edge between the first node of each
    /// graph-relevant line and the first node of the following one.
    pub fn relink_sequential(&mut self) {
        self.edges.retain(|e| e.edge_type != EdgeType::Next);
        let mut first_on_line: BTreeMap<usize, &str> = BTreeMap::new();
        for node in &self.nodes {
            first_on_line.entry(node.line).or_insert(node.id.as_str());
        }
        let ids: Vec<&str> = first_on_line.into_values().collect();
        let next: Vec<Edge> = ids
            .windows(2)
            .map(|pair| Edge::certain(pair[0], pair[1], EdgeType::Next))
            .collect();
        self.edges.extend(next);
    }
}
