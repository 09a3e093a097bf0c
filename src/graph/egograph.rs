//! Egograph extraction: the bounded k-hop neighbourhood around keyword seeds.
//!
//! Seeds are nodes whose symbol name or line text contains a keyword. From
//! all seeds at once, a breadth-first walk follows edges in stored order up to
//! depth `k`, collecting at most `maxNodes` nodes and `maxEdges` edges. The
//! first edge to reach a node is recorded as the edge that discovered it.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::fmt::Write as _;
use tracing::debug;

use super::types::{Edge, EdgeType, Index, Node, NodeType};
use crate::config::EgographDefaults;

/// Most definition names listed in a summary.
const SUMMARY_NAME_LIMIT: usize = 10;

/// Extraction parameters. Numeric knobs are signed so that out-of-range
/// values from callers are reported rather than rejected at deserialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EgographRequest {
    pub keywords: Vec<String>,
    pub k: i64,
    pub max_nodes: i64,
    pub max_edges: i64,
    /// Only follow these edge types. `None` follows all.
    pub edge_types: Option<Vec<EdgeType>>,
    /// Attach a plain-text rendering of the collected lines.
    pub flatten: bool,
    /// Attach a short prose summary.
    pub summarize: bool,
}

impl Default for EgographRequest {
    fn default() -> Self {
        Self::with_defaults(Vec::new(), &EgographDefaults::default())
    }
}

impl EgographRequest {
    pub fn new(keywords: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            keywords: keywords.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// A request using configured budgets.
    pub fn with_defaults(keywords: Vec<String>, defaults: &EgographDefaults) -> Self {
        Self {
            keywords,
            k: defaults.k as i64,
            max_nodes: defaults.max_nodes as i64,
            max_edges: defaults.max_edges as i64,
            edge_types: None,
            flatten: false,
            summarize: false,
        }
    }
}

/// A collected node with its BFS depth and discovering edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EgographNode {
    #[serde(flatten)]
    pub node: Node,
    /// 0 for seeds.
    pub depth: usize,
    /// The first edge that reached this node. `None` for seeds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub via: Option<Edge>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EgographMetadata {
    pub total_nodes: usize,
    pub total_edges: usize,
    pub seed_count: usize,
    pub depth_reached: usize,
    /// A node or edge budget cut the walk short.
    pub truncated: bool,
    pub k: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EgographResult {
    pub nodes: Vec<EgographNode>,
    pub edges: Vec<Edge>,
    pub root_node_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    pub metadata: EgographMetadata,
    /// Set when the request was invalid; everything else is then empty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl EgographResult {
    fn invalid(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Self::default()
        }
    }
}

/// Validated request limits.
struct Budget {
    k: usize,
    max_nodes: usize,
    max_edges: usize,
}

fn validate(request: &EgographRequest) -> std::result::Result<(Vec<String>, Budget), String> {
    let keywords: Vec<String> = request
        .keywords
        .iter()
        .map(|k| k.trim().to_lowercase())
        .filter(|k| !k.is_empty())
        .collect();
    if keywords.is_empty() {
        return Err("keywords must contain at least one non-empty keyword".to_string());
    }
    if request.k < 0 {
        return Err(format!("k must be >= 0, got {}", request.k));
    }
    if request.max_nodes <= 0 {
        return Err(format!("maxNodes must be > 0, got {}", request.max_nodes));
    }
    if request.max_edges <= 0 {
        return Err(format!("maxEdges must be > 0, got {}", request.max_edges));
    }
    Ok((
        keywords,
        Budget {
            k: request.k as usize,
            max_nodes: request.max_nodes as usize,
            max_edges: request.max_edges as usize,
        },
    ))
}

/// Extract the egograph of `request` from `index`.
///
/// Never fails: invalid parameters yield a result with `error` set, and no
/// matching seed yields an empty result.
pub fn extract_egograph(index: &Index, request: &EgographRequest) -> EgographResult {
    let (keywords, budget) = match validate(request) {
        Ok(valid) => valid,
        Err(message) => {
            debug!(error = %message, "rejected egograph request");
            return EgographResult::invalid(message);
        }
    };

    let mut truncated = false;

    // ─── Seeding ────────────────────────────────────────────
    let mut seeds: Vec<&Node> = Vec::new();
    for node in index.nodes.values() {
        let name = node.symbol_name.to_lowercase();
        let text = node.text.to_lowercase();
        if keywords
            .iter()
            .any(|kw| name.contains(kw.as_str()) || text.contains(kw.as_str()))
        {
            if seeds.len() == budget.max_nodes {
                truncated = true;
                break;
            }
            seeds.push(node);
        }
    }

    // ─── Expansion ──────────────────────────────────────────
    let mut adjacency: HashMap<&str, Vec<usize>> = HashMap::new();
    for (i, edge) in index.edges.iter().enumerate() {
        adjacency.entry(edge.source.as_str()).or_default().push(i);
        if edge.target != edge.source {
            adjacency.entry(edge.target.as_str()).or_default().push(i);
        }
    }

    let mut visited: HashSet<&str> = HashSet::new();
    let mut nodes: Vec<EgographNode> = Vec::new();
    let mut queue: VecDeque<(&str, usize)> = VecDeque::new();
    for seed in &seeds {
        visited.insert(seed.id.as_str());
        nodes.push(EgographNode {
            node: (*seed).clone(),
            depth: 0,
            via: None,
        });
        queue.push_back((seed.id.as_str(), 0));
    }

    let mut collected: HashSet<usize> = HashSet::new();
    let mut edge_order: Vec<usize> = Vec::new();

    while let Some((id, depth)) = queue.pop_front() {
        if depth >= budget.k {
            continue;
        }
        let Some(incident) = adjacency.get(id) else {
            continue;
        };
        for &i in incident {
            let edge = &index.edges[i];
            if let Some(types) = &request.edge_types {
                if !types.contains(&edge.edge_type) {
                    continue;
                }
            }
            let Some(other) = edge.other_end(id) else {
                continue;
            };
            let Some(other_node) = index.nodes.get(other) else {
                continue;
            };

            if !visited.contains(other) {
                if nodes.len() >= budget.max_nodes {
                    truncated = true;
                    continue;
                }
                visited.insert(other_node.id.as_str());
                nodes.push(EgographNode {
                    node: other_node.clone(),
                    depth: depth + 1,
                    via: Some(edge.clone()),
                });
                queue.push_back((other_node.id.as_str(), depth + 1));
            }

            if !collected.contains(&i) {
                if edge_order.len() >= budget.max_edges {
                    truncated = true;
                } else {
                    collected.insert(i);
                    edge_order.push(i);
                }
            }
        }
    }

    let edges: Vec<Edge> = edge_order.iter().map(|&i| index.edges[i].clone()).collect();
    let depth_reached = nodes.iter().map(|n| n.depth).max().unwrap_or(0);

    let mut result = EgographResult {
        root_node_ids: seeds.iter().map(|s| s.id.clone()).collect(),
        metadata: EgographMetadata {
            total_nodes: nodes.len(),
            total_edges: edges.len(),
            seed_count: seeds.len(),
            depth_reached,
            truncated,
            k: budget.k,
        },
        nodes,
        edges,
        summary: None,
        context: None,
        error: None,
    };
    if request.summarize {
        result.summary = Some(summarize(&result));
    }
    if request.flatten {
        result.context = Some(flatten_context(&result.nodes));
    }

    debug!(
        seeds = result.metadata.seed_count,
        nodes = result.metadata.total_nodes,
        edges = result.metadata.total_edges,
        truncated,
        "egograph extracted"
    );
    result
}

/// One to three sentences describing what an egograph contains.
pub fn summarize(result: &EgographResult) -> String {
    if result.nodes.is_empty() {
        return "No nodes matched the given keywords.".to_string();
    }

    let mut by_type: BTreeMap<NodeType, usize> = BTreeMap::new();
    let mut files = BTreeSet::new();
    let mut definitions: Vec<&str> = Vec::new();
    for entry in &result.nodes {
        *by_type.entry(entry.node.node_type).or_insert(0) += 1;
        files.insert(entry.node.file.as_str());
        let name = entry.node.symbol_name.as_str();
        if entry.node.is_definition()
            && definitions.len() < SUMMARY_NAME_LIMIT
            && !definitions.contains(&name)
        {
            definitions.push(name);
        }
    }

    let counts: Vec<String> = by_type
        .iter()
        .map(|(node_type, count)| format!("{count} {node_type}"))
        .collect();
    let mut summary = format!(
        "The egograph has {} nodes ({}) across {} {}.",
        result.nodes.len(),
        counts.join(", "),
        files.len(),
        if files.len() == 1 { "file" } else { "files" }
    );
    if !definitions.is_empty() {
        let _ = write!(summary, " Definitions include {}.", definitions.join(", "));
    }
    let invokes = result
        .edges
        .iter()
        .filter(|e| e.edge_type == EdgeType::Invoke)
        .count();
    let _ = write!(
        summary,
        " {invokes} invoke {} connect them.",
        if invokes == 1 { "edge" } else { "edges" }
    );
    summary
}

/// Collected lines grouped by file, each group sorted by line number.
pub fn flatten_context(nodes: &[EgographNode]) -> String {
    let mut by_file: BTreeMap<&str, BTreeMap<usize, &str>> = BTreeMap::new();
    for entry in nodes {
        by_file
            .entry(entry.node.file.as_str())
            .or_default()
            .entry(entry.node.line)
            .or_insert(entry.node.text.as_str());
    }

    let mut out = String::new();
    for (file, lines) in by_file {
        if !out.is_empty() {
            out.push('\n');
        }
        let _ = writeln!(out, "{file}");
        for (line, text) in lines {
            let _ = writeln!(out, "{line:>6} | {text}");
        }
    }
    out
}

/// Plain-text report for a calling tool.
pub fn render_report(result: &EgographResult) -> String {
    if let Some(error) = &result.error {
        return format!("Egograph request rejected: {error}\n");
    }
    if result.nodes.is_empty() {
        return "No nodes matched the given keywords.\n".to_string();
    }

    let mut out = String::new();
    let summary = result
        .summary
        .clone()
        .unwrap_or_else(|| summarize(result));
    let _ = writeln!(out, "{summary}");
    let _ = writeln!(out, "Seeds: {}", result.root_node_ids.join(", "));
    let _ = writeln!(
        out,
        "Depth reached: {} of {}",
        result.metadata.depth_reached, result.metadata.k
    );
    out.push('\n');
    match &result.context {
        Some(context) => out.push_str(context),
        None => out.push_str(&flatten_context(&result.nodes)),
    }
    if result.metadata.truncated {
        out.push_str("\n(truncated: node or edge budget reached)\n");
    }
    out
}
