//! RepoGraph module: the line-level dependency graph.
//!
//! Provides the graph data model, reference resolution, building from a
//! directory, read-only queries and egograph extraction.

pub mod builder;
pub mod egograph;
pub mod query;
pub mod resolver;
pub mod types;

pub use builder::{
    build_file_repo_graph, build_repo_graph, build_repo_graph_with, discover_files,
    index_repository, load_or_build, InclusionPolicy,
};
pub use egograph::{
    extract_egograph, flatten_context, render_report, summarize, EgographMetadata, EgographNode,
    EgographRequest, EgographResult,
};
pub use query::{Direction, GraphStats, RelatedNode, RelatedOptions};
pub use resolver::{resolve_references, MAX_CANDIDATES};
pub use types::{
    Edge, EdgeType, Index, Metadata, Node, NodeType, ParseResult, SymbolKind, INDEX_FORMAT_VERSION,
};
