//! Read-only queries over a built [`Index`].
//!
//! All lookups are linear scans; the index is held in memory for the length
//! of a query session. Results follow node-id order or stored edge order, so
//! the same index always answers the same way.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use super::types::{Edge, EdgeType, Index, Node, NodeType};

/// Which edges of a node to follow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Edges whose source is the node.
    Outgoing,
    /// Edges whose target is the node.
    Incoming,
    #[default]
    Both,
}

impl Direction {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "outgoing" | "out" => Some(Direction::Outgoing),
            "incoming" | "in" => Some(Direction::Incoming),
            "both" => Some(Direction::Both),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RelatedOptions {
    pub direction: Direction,
    /// Only follow these edge types. `None` follows all.
    pub edge_types: Option<Vec<EdgeType>>,
    pub limit: Option<usize>,
    /// Report neighbours whose id has no node.
    pub include_dangling: bool,
}

/// A one-hop neighbour of a node.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelatedNode<'a> {
    pub id: &'a str,
    /// `None` for a dangling id.
    pub node: Option<&'a Node>,
    pub edge: &'a Edge,
    /// Direction of `edge` relative to the queried node.
    pub direction: Direction,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphStats {
    pub node_count: usize,
    pub edge_count: usize,
    pub file_count: usize,
    pub nodes_by_type: BTreeMap<NodeType, usize>,
    pub edges_by_type: BTreeMap<EdgeType, usize>,
    /// Edges with at least one endpoint that is not a node.
    pub dangling_edges: usize,
}

impl Index {
    pub fn get_node(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// Nodes of any type whose symbol name is exactly `name`.
    pub fn find_nodes_by_symbol(&self, name: &str) -> Vec<&Node> {
        self.nodes
            .values()
            .filter(|n| n.symbol_name == name)
            .collect()
    }

    /// Nodes of one file, ordered by line.
    pub fn find_nodes_by_file(&self, file: &str) -> Vec<&Node> {
        let file = file.trim_start_matches("./");
        let mut nodes: Vec<&Node> = self.nodes.values().filter(|n| n.file == file).collect();
        nodes.sort_by(|a, b| a.line.cmp(&b.line).then_with(|| a.id.cmp(&b.id)));
        nodes
    }

    pub fn find_definitions(&self) -> Vec<&Node> {
        self.find_nodes_by_type(NodeType::Def)
    }

    pub fn find_references(&self) -> Vec<&Node> {
        self.find_nodes_by_type(NodeType::Ref)
    }

    fn find_nodes_by_type(&self, node_type: NodeType) -> Vec<&Node> {
        self.nodes
            .values()
            .filter(|n| n.node_type == node_type)
            .collect()
    }

    /// One-hop neighbours of `id`, in stored edge order.
    ///
    /// A self-loop is reported once, as outgoing.
    pub fn find_related_nodes(&self, id: &str, options: &RelatedOptions) -> Vec<RelatedNode<'_>> {
        let mut related = Vec::new();
        for edge in &self.edges {
            if options.limit.is_some_and(|limit| related.len() >= limit) {
                break;
            }
            if let Some(types) = &options.edge_types {
                if !types.contains(&edge.edge_type) {
                    continue;
                }
            }
            let (other, direction) = if edge.source == id
                && options.direction != Direction::Incoming
            {
                (edge.target.as_str(), Direction::Outgoing)
            } else if edge.target == id && options.direction != Direction::Outgoing {
                (edge.source.as_str(), Direction::Incoming)
            } else {
                continue;
            };
            let node = self.nodes.get(other);
            if node.is_none() && !options.include_dangling {
                continue;
            }
            related.push(RelatedNode {
                id: other,
                node,
                edge,
                direction,
            });
        }
        related
    }

    /// Every edge touching `id`, in stored order.
    pub fn find_edges_for_node(&self, id: &str) -> Vec<&Edge> {
        self.edges.iter().filter(|e| e.touches(id)).collect()
    }

    pub fn find_call_edges(&self) -> Vec<&Edge> {
        self.edges
            .iter()
            .filter(|e| e.edge_type == EdgeType::Invoke)
            .collect()
    }

    pub fn get_graph_stats(&self) -> GraphStats {
        let mut nodes_by_type = BTreeMap::new();
        let mut files = BTreeSet::new();
        for node in self.nodes.values() {
            *nodes_by_type.entry(node.node_type).or_insert(0) += 1;
            files.insert(node.file.as_str());
        }

        let mut edges_by_type = BTreeMap::new();
        let mut dangling_edges = 0;
        for edge in &self.edges {
            *edges_by_type.entry(edge.edge_type).or_insert(0) += 1;
            if !self.nodes.contains_key(&edge.source) || !self.nodes.contains_key(&edge.target) {
                dangling_edges += 1;
            }
        }

        GraphStats {
            node_count: self.nodes.len(),
            edge_count: self.edges.len(),
            file_count: files.len(),
            nodes_by_type,
            edges_by_type,
            dangling_edges,
        }
    }
}
