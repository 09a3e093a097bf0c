//! Graph builder: scans a directory and builds the RepoGraph index.
//!
//! Walks source files respecting .gitignore, parses each with tree-sitter in
//! parallel, applies the inclusion policy, resolves cross-file references
//! once, and assembles the immutable [`Index`].

use ignore::WalkBuilder;
use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

use super::resolver::resolve_references;
use super::types::{Index, Metadata, Node, NodeType, ParseResult, INDEX_FORMAT_VERSION};
use crate::config::RepoGraphConfig;
use crate::error::{RepoGraphError, Result};
use crate::parser::{normalize_rel_path, parse_source, ParseConfig, SupportedLanguage};
use crate::storage;

// ─── Inclusion policy ───────────────────────────────────────

/// Decides which parsed nodes make it into the index.
#[derive(Debug, Clone, Default)]
pub struct InclusionPolicy {
    exclude_prefixes: Vec<String>,
    noise_symbols: HashSet<String>,
}

impl InclusionPolicy {
    pub fn from_config(config: &RepoGraphConfig) -> Self {
        Self {
            exclude_prefixes: config
                .filter
                .exclude_prefixes
                .iter()
                .map(|p| p.trim_start_matches("./").to_string())
                .filter(|p| !p.is_empty())
                .collect(),
            noise_symbols: config.noise_symbols().into_iter().collect(),
        }
    }

    /// Drops nodes under excluded prefixes, `export *` re-exports, and refs
    /// to noise symbols such as `print` or `len`.
    pub fn includes(&self, node: &Node) -> bool {
        if self
            .exclude_prefixes
            .iter()
            .any(|prefix| node.file.starts_with(prefix.as_str()))
        {
            return false;
        }
        match node.node_type {
            NodeType::Export => node.symbol_name != "*",
            NodeType::Ref => !self.noise_symbols.contains(&node.symbol_name),
            NodeType::Def | NodeType::Import => true,
        }
    }
}

// ─── Full builds ────────────────────────────────────────────

/// Per-worker state of the parallel parse, merged once all files are done.
#[derive(Default)]
struct BuildAccumulator {
    results: Vec<ParseResult>,
    skipped: usize,
}

impl BuildAccumulator {
    fn record(mut self, file: &Path, outcome: Result<ParseResult>) -> Self {
        match outcome {
            Ok(result) => self.results.push(result),
            Err(RepoGraphError::UnsupportedLanguage(_)) => {
                debug!(file = %file.display(), "unsupported language, skipping");
                self.skipped += 1;
            }
            Err(e) => {
                warn!(file = %file.display(), error = %e, "skipping file");
                self.skipped += 1;
            }
        }
        self
    }

    fn merge(mut self, other: Self) -> Self {
        self.results.extend(other.results);
        self.skipped += other.skipped;
        self
    }
}

/// Build the index for `root` using `<root>/.repograph/config.toml`.
pub fn build_repo_graph(root: &Path) -> Result<Index> {
    let config = RepoGraphConfig::load_for_root(root);
    build_repo_graph_with(root, &config)
}

/// Build the index for `root` with an explicit configuration.
///
/// Files that fail to read or parse are logged and left out; only a missing
/// root is an error.
pub fn build_repo_graph_with(root: &Path, config: &RepoGraphConfig) -> Result<Index> {
    ensure_root(root)?;
    let started = Instant::now();

    let files = discover_files(root, config);
    debug!(root = %root.display(), files = files.len(), "discovered source files");

    let parse_config = parse_config(config);

    let accumulator = files
        .par_iter()
        .fold(BuildAccumulator::default, |acc, file| {
            acc.record(file, parse_file(root, file, &parse_config))
        })
        .reduce(BuildAccumulator::default, BuildAccumulator::merge);

    let mut results = accumulator.results;
    results.sort_by(|a, b| a.file.cmp(&b.file));
    let indexed: BTreeSet<String> = results.iter().map(|r| r.file.clone()).collect();
    let index = assemble(results, indexed);

    info!(
        root = %root.display(),
        files = index.metadata.file_count,
        skipped = accumulator.skipped,
        nodes = index.metadata.node_count,
        edges = index.metadata.edge_count,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "repo graph built"
    );
    Ok(index)
}

/// Build and persist the index for `root`. Returns the index and its path.
pub fn index_repository(root: &Path) -> Result<(Index, PathBuf)> {
    let index = build_repo_graph(root)?;
    let path = storage::save_index(&index, root)?;
    Ok((index, path))
}

/// Load the persisted index if it is fresh, otherwise rebuild and save it.
pub fn load_or_build(root: &Path) -> Result<Index> {
    ensure_root(root)?;
    let config = RepoGraphConfig::load_for_root(root);
    if !storage::is_stale_with_max_age(root, None, config.max_age()) {
        if let Some(index) = storage::load_index(root) {
            return Ok(index);
        }
    }
    info!(root = %root.display(), "index missing or stale, rebuilding");
    let index = build_repo_graph_with(root, &config)?;
    storage::save_index(&index, root)?;
    Ok(index)
}

// ─── Incremental rebuild ────────────────────────────────────

/// Rebuild `previous` after a change to a single `file`.
///
/// Intra-file nodes and edges of every other file are kept as they are; the
/// changed file is re-parsed (or dropped if it is gone or no longer parses)
/// and cross-file references are re-resolved over the whole node set.
pub fn build_file_repo_graph(previous: &Index, root: &Path, file: &Path) -> Result<Index> {
    ensure_root(root)?;
    let config = RepoGraphConfig::load_for_root(root);
    let rel = relative_to(root, file);
    let rel_key = normalize_rel_path(&rel);

    let mut per_file = decompose(previous);
    per_file.remove(&rel_key);
    let mut indexed = previous.files.clone();
    indexed.remove(&rel_key);

    let reparsed = if is_indexable(root, &rel, &config) {
        match parse_file(root, &rel, &parse_config(&config)) {
            Ok(result) => Some(result),
            Err(e) => {
                warn!(file = %rel_key, error = %e, "changed file no longer parses, removing it");
                None
            }
        }
    } else {
        debug!(file = %rel_key, "changed file is gone or excluded, removing it");
        None
    };

    if let Some(result) = reparsed {
        indexed.insert(result.file.clone());
        per_file.insert(result.file.clone(), result);
    }

    let index = assemble(per_file.into_values().collect(), indexed);

    info!(
        file = %rel_key,
        nodes = index.metadata.node_count,
        edges = index.metadata.edge_count,
        "repo graph updated"
    );
    Ok(index)
}

/// Split an index back into per-file parse results holding only the
/// parser-produced edges: those between two nodes of one file, and `contain`
/// edges from the file itself.
fn decompose(index: &Index) -> BTreeMap<String, ParseResult> {
    let mut per_file: BTreeMap<String, ParseResult> = BTreeMap::new();
    for node in index.nodes.values() {
        let Some(language) = SupportedLanguage::from_path(Path::new(&node.file)) else {
            continue;
        };
        per_file
            .entry(node.file.clone())
            .or_insert_with(|| ParseResult::new(node.file.clone(), language))
            .nodes
            .push(node.clone());
    }

    for edge in &index.edges {
        let Some(target) = index.nodes.get(&edge.target) else {
            continue;
        };
        let same_file = match index.nodes.get(&edge.source) {
            Some(source) => source.file == target.file,
            None => edge.source == target.file,
        };
        if !same_file {
            continue;
        }
        if let Some(result) = per_file.get_mut(&target.file) {
            result.edges.push(edge.clone());
        }
    }
    per_file
}

// ─── Shared helpers ─────────────────────────────────────────

fn ensure_root(root: &Path) -> Result<()> {
    if root.is_dir() {
        Ok(())
    } else {
        Err(RepoGraphError::RootNotFound(root.to_path_buf()))
    }
}

fn parse_config(config: &RepoGraphConfig) -> ParseConfig {
    ParseConfig {
        denylist: config.denylist(),
        policy: InclusionPolicy::from_config(config),
    }
}

/// Read and parse one file. `rel` is relative to `root`.
fn parse_file(root: &Path, rel: &Path, parse_config: &ParseConfig) -> Result<ParseResult> {
    let source = fs::read_to_string(root.join(rel))?;
    let result = parse_source(rel, &source, parse_config)?;
    debug!(
        file = %result.file,
        nodes = result.nodes.len(),
        edges = result.edges.len(),
        "parsed file"
    );
    Ok(result)
}

/// Merge parse results, resolve cross-file references and stamp metadata.
/// `files` is every indexed file, with or without nodes.
/// Edge order: each file's own edges in file order, then resolver edges.
fn assemble(results: Vec<ParseResult>, files: BTreeSet<String>) -> Index {
    let cross_file = resolve_references(&results);

    let mut nodes = BTreeMap::new();
    let mut edges = Vec::new();
    for result in results {
        for node in result.nodes {
            nodes.insert(node.id.clone(), node);
        }
        edges.extend(result.edges);
    }
    edges.extend(cross_file);

    let languages: BTreeSet<&'static str> = files
        .iter()
        .filter_map(|f| SupportedLanguage::from_path(Path::new(f)))
        .map(|l| l.tag())
        .collect();
    let language = match languages.len() {
        0 => "none".to_string(),
        1 => languages.iter().next().copied().unwrap_or("none").to_string(),
        _ => "multi".to_string(),
    };

    Index {
        metadata: Metadata {
            indexed_at: chrono::Utc::now().timestamp_millis(),
            file_count: files.len(),
            node_count: nodes.len(),
            edge_count: edges.len(),
            language,
            version: INDEX_FORMAT_VERSION,
        },
        nodes,
        edges,
        files,
    }
}

/// Source files under `root`, relative and sorted.
pub fn discover_files(root: &Path, config: &RepoGraphConfig) -> Vec<PathBuf> {
    let exclude: HashSet<String> = config.exclude_dirs().into_iter().collect();
    let languages = config.languages();
    let max_bytes = config.build.max_file_bytes;

    let mut files: Vec<PathBuf> = WalkBuilder::new(root)
        .hidden(true)
        .git_ignore(true)
        .git_global(true)
        .git_exclude(true)
        .require_git(false)
        .filter_entry(move |entry| {
            let is_dir = entry.file_type().is_some_and(|ft| ft.is_dir());
            !(is_dir
                && entry.depth() > 0
                && entry
                    .file_name()
                    .to_str()
                    .is_some_and(|name| exclude.contains(name)))
        })
        .build()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_some_and(|ft| ft.is_file()))
        .filter(|entry| {
            SupportedLanguage::from_path(entry.path()).is_some_and(|lang| {
                languages
                    .as_deref()
                    .map_or(true, |allowed| lang.is_allowed_by(allowed))
            })
        })
        .filter(|entry| {
            let size = entry.metadata().map(|m| m.len()).unwrap_or(u64::MAX);
            if size > max_bytes {
                debug!(file = %entry.path().display(), size, "file too large, skipping");
                return false;
            }
            true
        })
        .filter_map(|entry| entry.path().strip_prefix(root).ok().map(Path::to_path_buf))
        .collect();

    files.sort();
    files
}

/// Whether a single file would be picked up by [`discover_files`].
/// Ignore files are not consulted.
fn is_indexable(root: &Path, rel: &Path, config: &RepoGraphConfig) -> bool {
    let Some(lang) = SupportedLanguage::from_path(rel) else {
        return false;
    };
    if let Some(allowed) = config.languages() {
        if !lang.is_allowed_by(&allowed) {
            return false;
        }
    }
    let exclude = config.exclude_dirs();
    let excluded = rel
        .parent()
        .into_iter()
        .flat_map(|p| p.components())
        .any(|c| exclude.iter().any(|d| c.as_os_str() == d.as_str()));
    if excluded {
        return false;
    }
    fs::metadata(root.join(rel)).is_ok_and(|m| m.is_file() && m.len() <= config.build.max_file_bytes)
}

fn relative_to(root: &Path, file: &Path) -> PathBuf {
    if file.is_absolute() {
        if let Ok(rel) = file.strip_prefix(root) {
            return rel.to_path_buf();
        }
        if let (Ok(canonical_root), Ok(canonical_file)) = (root.canonicalize(), file.canonicalize()) {
            if let Ok(rel) = canonical_file.strip_prefix(&canonical_root) {
                return rel.to_path_buf();
            }
        }
    }
    file.to_path_buf()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::types::EdgeType;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn project() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "app/models.py",
            "class User:\n    def save(self):\n        print('saved')\n",
        );
        write(
            dir.path(),
            "app/views.py",
            "from .models import User\n\ndef create():\n    user = User()\n    user.save()\n",
        );
        write(dir.path(), "web/util.ts", "export function greet(name: string) {\n  return name;\n}\n");
        write(dir.path(), "web/main.ts", "import { greet } from \"./util\";\ngreet(\"hi\");\n");
        dir
    }

    #[test]
    fn test_missing_root() {
        let result = build_repo_graph(Path::new("/definitely/not/here"));
        assert!(matches!(result, Err(RepoGraphError::RootNotFound(_))));
    }

    #[test]
    fn test_empty_root() {
        let dir = tempfile::tempdir().unwrap();
        let index = build_repo_graph(dir.path()).unwrap();
        assert_eq!(index.metadata.file_count, 0);
        assert_eq!(index.metadata.language, "none");
        assert!(index.nodes.is_empty());
    }

    #[test]
    fn test_build_mixed_project() {
        let dir = project();
        let index = build_repo_graph(dir.path()).unwrap();

        assert_eq!(index.metadata.file_count, 4);
        assert_eq!(index.metadata.language, "multi");
        assert_eq!(index.metadata.node_count, index.nodes.len());
        assert_eq!(index.metadata.edge_count, index.edges.len());
        assert!(index.edges.iter().all(|e| (0.0..=1.0).contains(&e.confidence)));

        // `print` is noise.
        assert!(!index.nodes.values().any(|n| n.symbol_name == "print"));

        let has_edge = |source: &str, target: &str, edge_type: EdgeType| {
            index
                .edges
                .iter()
                .any(|e| e.source == source && e.target == target && e.edge_type == edge_type)
        };
        assert!(has_edge("app/views.py:1", "app/models.py:1", EdgeType::Define));
        assert!(has_edge("app/views.py:4", "app/models.py:1", EdgeType::Invoke));
        assert!(has_edge("app/views.py:5", "app/models.py:2", EdgeType::Invoke));
        assert!(has_edge("web/main.ts:1", "web/util.ts:1", EdgeType::Define));
        assert!(has_edge("web/main.ts:2", "web/util.ts:1", EdgeType::Invoke));
    }

    #[test]
    fn test_rebuild_is_idempotent() {
        let dir = project();
        let first = build_repo_graph(dir.path()).unwrap();
        let second = build_repo_graph(dir.path()).unwrap();
        assert_eq!(first.nodes, second.nodes);
        assert_eq!(first.edges, second.edges);
        assert_eq!(first.metadata.file_count, second.metadata.file_count);
    }

    #[test]
    fn test_syntax_error_file_skipped() {
        let dir = project();
        write(dir.path(), "app/broken.py", "def broken(:\n    pass\n");
        let index = build_repo_graph(dir.path()).unwrap();
        assert_eq!(index.metadata.file_count, 4);
        assert!(!index.nodes.values().any(|n| n.file == "app/broken.py"));
    }

    #[test]
    fn test_discovery_rules() {
        let dir = project();
        write(dir.path(), "node_modules/lib/index.js", "function lib() {}\n");
        write(dir.path(), ".hidden/secret.py", "def secret():\n    pass\n");
        write(dir.path(), "generated/out.py", "def gen():\n    pass\n");
        write(dir.path(), ".gitignore", "generated/\n");
        write(dir.path(), "README.md", "# readme\n");

        let files = discover_files(dir.path(), &RepoGraphConfig::default());
        let files: Vec<String> = files.iter().map(|f| normalize_rel_path(f)).collect();
        assert_eq!(
            files,
            vec!["app/models.py", "app/views.py", "web/main.ts", "web/util.ts"]
        );
    }

    #[test]
    fn test_language_restriction_and_size_limit() {
        let dir = project();
        let mut config = RepoGraphConfig::default();
        config.build.languages = Some(vec!["typescript".to_string()]);
        let index = build_repo_graph_with(dir.path(), &config).unwrap();
        assert_eq!(index.metadata.file_count, 2);
        assert_eq!(index.metadata.language, "typescript");

        let mut config = RepoGraphConfig::default();
        config.build.max_file_bytes = 60;
        let files = discover_files(dir.path(), &config);
        assert!(files.iter().all(|f| fs::metadata(dir.path().join(f)).unwrap().len() <= 60));
        assert!(files.len() < 4);
    }

    #[test]
    fn test_inclusion_policy() {
        let mut config = RepoGraphConfig::default();
        config.filter.exclude_prefixes = vec!["./scripts/".to_string()];
        let policy = InclusionPolicy::from_config(&config);

        let node = |file: &str, node_type: NodeType, name: &str| Node {
            id: format!("{file}:1"),
            file: file.to_string(),
            line: 1,
            node_type,
            symbol_name: name.to_string(),
            symbol_kind: crate::graph::types::SymbolKind::Function,
            scope: None,
            text: String::new(),
            module: None,
        };
        assert!(policy.includes(&node("src/a.ts", NodeType::Def, "print")));
        assert!(!policy.includes(&node("src/a.ts", NodeType::Ref, "print")));
        assert!(!policy.includes(&node("src/a.ts", NodeType::Export, "*")));
        assert!(!policy.includes(&node("scripts/run.py", NodeType::Def, "main")));
        assert!(policy.includes(&node("src/a.ts", NodeType::Ref, "greet")));
    }

    #[test]
    fn test_incremental_edit() {
        let dir = project();
        let before = build_repo_graph(dir.path()).unwrap();

        write(
            dir.path(),
            "web/util.ts",
            "// greeting helpers\nexport function greet(name: string) {\n  return name;\n}\n",
        );
        let after = build_file_repo_graph(&before, dir.path(), Path::new("web/util.ts")).unwrap();
        let full = build_repo_graph(dir.path()).unwrap();

        assert_eq!(after.nodes, full.nodes);
        assert_eq!(after.files, full.files);
        assert_eq!(after.metadata.file_count, full.metadata.file_count);
        assert_eq!(after.metadata.language, "multi");
        let mut incremental_edges: Vec<String> = after.edges.iter().map(|e| format!("{e:?}")).collect();
        let mut full_edges: Vec<String> = full.edges.iter().map(|e| format!("{e:?}")).collect();
        incremental_edges.sort();
        full_edges.sort();
        assert_eq!(incremental_edges, full_edges);
        assert!(after
            .edges
            .iter()
            .any(|e| e.source == "web/main.ts:2" && e.target == "web/util.ts:2"));
    }

    #[test]
    fn test_noise_first_on_line_keeps_canonical_id() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.py", "def foo():\n    return 1\n");
        write(dir.path(), "b.py", "def main():\n    print(foo())\n");
        write(dir.path(), "c.js", "function bar() {}\nconsole.log(bar());\n");
        let index = build_repo_graph(dir.path()).unwrap();

        let call = index.get_node("b.py:2").unwrap();
        assert_eq!(call.node_type, NodeType::Ref);
        assert_eq!(call.symbol_name, "foo");
        assert!(!index.nodes.keys().any(|id| id.contains('#')));

        let invokes: Vec<(&str, &str)> = index
            .find_call_edges()
            .iter()
            .map(|e| (e.source.as_str(), e.target.as_str()))
            .collect();
        assert!(invokes.contains(&("b.py:2", "a.py:1")));
        assert!(invokes.contains(&("c.js:2", "c.js:1")));
        assert_eq!(index.get_node("c.js:2").unwrap().symbol_name, "bar");
    }

    #[test]
    fn test_incremental_file_without_nodes() {
        let dir = project();
        write(dir.path(), "app/__init__.py", "# package\n");
        let full = build_repo_graph(dir.path()).unwrap();
        assert_eq!(full.metadata.file_count, 5);
        assert!(full.files.contains("app/__init__.py"));

        let mut index = full.clone();
        for _ in 0..3 {
            index = build_file_repo_graph(&index, dir.path(), Path::new("app/__init__.py")).unwrap();
            assert_eq!(index.metadata.file_count, full.metadata.file_count);
            assert_eq!(index.files, full.files);
        }

        fs::remove_file(dir.path().join("app/__init__.py")).unwrap();
        let removed = build_file_repo_graph(&index, dir.path(), Path::new("app/__init__.py")).unwrap();
        assert_eq!(removed.metadata.file_count, 4);
        assert!(!removed.files.contains("app/__init__.py"));
    }

    #[test]
    fn test_incremental_delete_and_break() {
        let dir = project();
        let before = build_repo_graph(dir.path()).unwrap();

        fs::remove_file(dir.path().join("web/util.ts")).unwrap();
        let absolute = dir.path().join("web/util.ts");
        let after = build_file_repo_graph(&before, dir.path(), &absolute).unwrap();
        assert_eq!(after.metadata.file_count, 3);
        assert!(!after.nodes.values().any(|n| n.file == "web/util.ts"));
        assert!(!after.edges.iter().any(|e| e.target.starts_with("web/util.ts")));

        write(dir.path(), "app/views.py", "def create(:\n");
        let broken = build_file_repo_graph(&after, dir.path(), Path::new("app/views.py")).unwrap();
        assert_eq!(broken.metadata.file_count, 2);
        assert!(!broken.nodes.values().any(|n| n.file == "app/views.py"));
    }

    #[test]
    fn test_index_repository_and_load_or_build() {
        let dir = project();
        let (index, path) = index_repository(dir.path()).unwrap();
        assert!(path.ends_with(".repograph/index.json"));

        let loaded = load_or_build(dir.path()).unwrap();
        assert_eq!(loaded, index);

        // The index directory is never indexed itself.
        let rebuilt = build_repo_graph(dir.path()).unwrap();
        assert_eq!(rebuilt.metadata.file_count, index.metadata.file_count);
    }
}
