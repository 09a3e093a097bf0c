//! # RepoGraph
//!
//! A line-level dependency graph of a source tree, for code search and
//! localization.
//!
//! Every definition, reference, import and export in a Python, JavaScript or
//! TypeScript file becomes a node keyed by `file:line`. Edges record containment,
//! line order, calls, member access and import bindings, each with a confidence
//! in `(0, 1]`. The graph is persisted under `.repograph/` and answers
//! neighbourhood queries and keyword-seeded egograph extraction.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use repograph::{extract_egograph, index_repository, EgographRequest};
//! use std::path::Path;
//!
//! let (index, _path) = index_repository(Path::new(".")).unwrap();
//! let result = extract_egograph(&index, &EgographRequest::new(["login"]));
//! println!("{} nodes around 'login'", result.metadata.total_nodes);
//! ```

pub mod cli;
pub mod config;
pub mod error;
pub mod graph;
pub mod parser;
pub mod storage;

// Re-exports for convenience
pub use config::RepoGraphConfig;
pub use error::{RepoGraphError, Result};

pub use graph::{
    build_file_repo_graph, build_repo_graph, build_repo_graph_with, extract_egograph,
    index_repository, load_or_build, Direction, Edge, EdgeType, EgographRequest, EgographResult,
    GraphStats, Index, Metadata, Node, NodeType, RelatedOptions, SymbolKind,
};
pub use parser::SupportedLanguage;
pub use storage::{delete_index, is_stale, load_index, save_index};

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, text: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, text).unwrap();
    }

    fn two_file_project() -> TempDir {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a.py", "def foo():\n    return 1\n");
        write(dir.path(), "b.py", "def main():\n    foo()\n");
        dir
    }

    #[test]
    fn test_cross_file_call() {
        let dir = two_file_project();
        let index = build_repo_graph(dir.path()).unwrap();

        let def = index.get_node("a.py:1").unwrap();
        assert_eq!(def.node_type, NodeType::Def);
        assert_eq!(def.symbol_name, "foo");

        let call = index.get_node("b.py:2").unwrap();
        assert_eq!(call.node_type, NodeType::Ref);
        assert_eq!(call.text, "    foo()");

        let invokes: Vec<&Edge> = index.find_call_edges();
        assert_eq!(invokes.len(), 1);
        assert_eq!(invokes[0].source, "b.py:2");
        assert_eq!(invokes[0].target, "a.py:1");
        assert_eq!(invokes[0].confidence, 1.0);

        assert_eq!(index.metadata.file_count, 2);
        assert_eq!(index.metadata.language, "python");
    }

    #[test]
    fn test_egograph_around_foo() {
        let dir = two_file_project();
        let index = build_repo_graph(dir.path()).unwrap();

        let mut request = EgographRequest::new(["foo"]);
        request.k = 1;
        let result = extract_egograph(&index, &request);
        assert!(result.error.is_none());
        assert!(result.root_node_ids.contains(&"a.py:1".to_string()));

        let ids: Vec<&str> = result.nodes.iter().map(|n| n.node.id.as_str()).collect();
        assert!(ids.contains(&"a.py:1"));
        assert!(ids.contains(&"b.py:2"));
        assert!(result
            .edges
            .iter()
            .any(|e| e.source == "b.py:2" && e.target == "a.py:1" && e.edge_type == EdgeType::Invoke));
    }

    #[test]
    fn test_egograph_depth() {
        let dir = two_file_project();
        let index = build_repo_graph(dir.path()).unwrap();

        let mut request = EgographRequest::new(["main"]);
        request.k = 1;
        let near = extract_egograph(&index, &request);
        assert!(near.error.is_none());
        assert_eq!(near.root_node_ids, vec!["b.py:1"]);
        let ids: Vec<(&str, usize)> = near
            .nodes
            .iter()
            .map(|n| (n.node.id.as_str(), n.depth))
            .collect();
        assert!(ids.contains(&("b.py:1", 0)));
        assert!(ids.contains(&("b.py:2", 1)));
        assert!(!ids.iter().any(|(id, _)| *id == "a.py:1"));

        request.k = 2;
        let far = extract_egograph(&index, &request);
        let foo = far.nodes.iter().find(|n| n.node.id == "a.py:1").unwrap();
        assert_eq!(foo.depth, 2);
        assert_eq!(foo.via.as_ref().unwrap().edge_type, EdgeType::Invoke);
    }

    #[test]
    fn test_staleness_lifecycle() {
        let dir = two_file_project();
        assert!(is_stale(dir.path(), None));

        let (index, path) = index_repository(dir.path()).unwrap();
        assert!(path.exists());
        assert!(!is_stale(dir.path(), None));

        let loaded = load_index(dir.path()).unwrap();
        assert_eq!(loaded.nodes, index.nodes);
        assert_eq!(loaded.edges, index.edges);

        delete_index(dir.path()).unwrap();
        assert!(is_stale(dir.path(), None));
        assert!(load_index(dir.path()).is_none());
    }

    #[test]
    fn test_syntax_error_file_skipped() {
        let dir = two_file_project();
        write(dir.path(), "c.py", "def broken(:\n    pass\n");

        let index = build_repo_graph(dir.path()).unwrap();
        assert!(index.find_nodes_by_file("c.py").is_empty());
        assert_eq!(index.metadata.file_count, 2);
        assert_eq!(index.find_call_edges().len(), 1);
    }

    #[test]
    fn test_graph_invariants() {
        let dir = two_file_project();
        write(
            dir.path(),
            "web/app.ts",
            "import { render } from './view';\n\nexport function start() {\n  render();\n  start();\n}\n",
        );
        write(
            dir.path(),
            "web/view.ts",
            "export function render() {\n  return 1;\n}\nfunction render2() {}\n",
        );

        let index = build_repo_graph(dir.path()).unwrap();
        assert_eq!(index.metadata.language, "multi");
        assert_eq!(index.metadata.node_count, index.nodes.len());
        assert_eq!(index.metadata.edge_count, index.edges.len());

        for (id, node) in &index.nodes {
            assert_eq!(id, &node.id);
            assert!(node.line >= 1);
            assert!(id.starts_with(&format!("{}:{}", node.file, node.line)));
        }
        for edge in &index.edges {
            assert!(edge.confidence > 0.0 && edge.confidence <= 1.0, "{edge:?}");
        }
        assert!(index
            .edges
            .iter()
            .any(|e| e.source == "web/app.ts:4" && e.target == "web/view.ts:1"));
    }

    #[test]
    fn test_missing_root_is_error() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope");
        assert!(matches!(
            build_repo_graph(&missing),
            Err(RepoGraphError::RootNotFound(_))
        ));
    }
}
