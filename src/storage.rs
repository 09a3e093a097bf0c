//! Index persistence under `<root>/.repograph/index.json`.
//!
//! Writes go through a temporary file and a rename so a reader never sees a
//! half-written index. Reads never fail: a missing, corrupt or outdated file
//! is reported and treated as absent, which makes the caller rebuild.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};

use crate::config::REPOGRAPH_DIR;
use crate::error::Result;
use crate::graph::types::{Edge, Index, Metadata, Node, INDEX_FORMAT_VERSION};

pub const INDEX_FILE: &str = "index.json";

/// Indexes older than this are stale regardless of source changes.
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(24 * 60 * 60);

/// On-disk shape. The node map is flattened to `[id, node]` pairs.
#[derive(Serialize, Deserialize)]
struct PersistedIndex {
    nodes: Vec<(String, Node)>,
    edges: Vec<Edge>,
    files: BTreeSet<String>,
    metadata: Metadata,
}

/// Borrowing twin of [`PersistedIndex`] so saving does not clone the graph.
#[derive(Serialize)]
struct PersistedIndexRef<'a> {
    nodes: Vec<(&'a String, &'a Node)>,
    edges: &'a [Edge],
    files: &'a BTreeSet<String>,
    metadata: &'a Metadata,
}

pub fn index_path(root: &Path) -> PathBuf {
    root.join(REPOGRAPH_DIR).join(INDEX_FILE)
}

/// Persist `index` for `root` and return the written path.
pub fn save_index(index: &Index, root: &Path) -> Result<PathBuf> {
    let path = index_path(root);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let persisted = PersistedIndexRef {
        nodes: index.nodes.iter().collect(),
        edges: &index.edges,
        files: &index.files,
        metadata: &index.metadata,
    };
    let bytes = serde_json::to_vec(&persisted)?;

    let tmp = temp_path(&path);
    if let Err(e) = fs::write(&tmp, &bytes).and_then(|_| fs::rename(&tmp, &path)) {
        let _ = fs::remove_file(&tmp);
        return Err(e.into());
    }

    info!(
        path = %path.display(),
        nodes = index.metadata.node_count,
        edges = index.metadata.edge_count,
        bytes = bytes.len(),
        "index saved"
    );
    Ok(path)
}

/// A temp file next to `path`, unique per process and per call so concurrent
/// saves never write into each other's file.
fn temp_path(path: &Path) -> PathBuf {
    static SEQ: AtomicU64 = AtomicU64::new(0);
    let seq = SEQ.fetch_add(1, Ordering::Relaxed);
    path.with_extension(format!("json.{}.{}.tmp", std::process::id(), seq))
}

/// Load the persisted index for `root`, or `None` if there is no usable one.
pub fn load_index(root: &Path) -> Option<Index> {
    let path = index_path(root);
    let bytes = match fs::read(&path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!(path = %path.display(), "no index on disk");
            return None;
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to read index");
            return None;
        }
    };

    let persisted: PersistedIndex = match serde_json::from_slice(&bytes) {
        Ok(persisted) => persisted,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "corrupt index, ignoring");
            return None;
        }
    };

    if persisted.metadata.version != INDEX_FORMAT_VERSION {
        warn!(
            path = %path.display(),
            found = persisted.metadata.version,
            expected = INDEX_FORMAT_VERSION,
            "index format version mismatch, ignoring"
        );
        return None;
    }

    debug!(
        path = %path.display(),
        nodes = persisted.nodes.len(),
        edges = persisted.edges.len(),
        "index loaded"
    );
    Some(Index {
        nodes: persisted.nodes.into_iter().collect(),
        edges: persisted.edges,
        files: persisted.files,
        metadata: persisted.metadata,
    })
}

/// Remove the persisted index. An absent index is not an error.
pub fn delete_index(root: &Path) -> Result<()> {
    let path = index_path(root);
    match fs::remove_file(&path) {
        Ok(()) => {
            info!(path = %path.display(), "index deleted");
            Ok(())
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Whether the index for `root` should be rebuilt, using [`DEFAULT_MAX_AGE`].
///
/// See [`is_stale_with_max_age`].
pub fn is_stale(root: &Path, source_subpath: Option<&Path>) -> bool {
    is_stale_with_max_age(root, source_subpath, DEFAULT_MAX_AGE)
}

/// Stale when the index is missing, older than `max_age`, or when the
/// directory `root/source_subpath` was modified after the index was written.
///
/// Directory mtimes only move when entries are added, removed or renamed, so
/// in-place edits deeper in the tree are caught by the age limit instead.
pub fn is_stale_with_max_age(root: &Path, source_subpath: Option<&Path>, max_age: Duration) -> bool {
    let path = index_path(root);
    let written = match fs::metadata(&path).and_then(|m| m.modified()) {
        Ok(time) => time,
        Err(_) => return true,
    };

    let age = SystemTime::now()
        .duration_since(written)
        .unwrap_or(Duration::ZERO);
    if age > max_age {
        debug!(path = %path.display(), age_secs = age.as_secs(), "index expired");
        return true;
    }

    if let Some(subpath) = source_subpath {
        let source = root.join(subpath);
        match fs::metadata(&source).and_then(|m| m.modified()) {
            Ok(modified) if modified > written => {
                debug!(source = %source.display(), "sources changed since index was written");
                return true;
            }
            Ok(_) => {}
            Err(e) => debug!(source = %source.display(), error = %e, "cannot stat source path"),
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::types::{EdgeType, NodeType, SymbolKind};
    use std::collections::BTreeMap;

    fn sample_index() -> Index {
        let mut nodes = BTreeMap::new();
        for (id, line, node_type, name) in [
            ("a.py:1", 1, NodeType::Def, "foo"),
            ("b.py:2", 2, NodeType::Ref, "foo"),
        ] {
            nodes.insert(
                id.to_string(),
                Node {
                    id: id.to_string(),
                    file: id.split(':').next().unwrap().to_string(),
                    line,
                    node_type,
                    symbol_name: name.to_string(),
                    symbol_kind: SymbolKind::Function,
                    scope: None,
                    text: format!("{name}()"),
                    module: None,
                },
            );
        }
        let edges = vec![
            Edge::new("b.py:2", "a.py:1", EdgeType::Invoke, 0.5),
            Edge::certain("a.py", "a.py:1", EdgeType::Contain),
        ];
        let mut index = Index::empty();
        index.metadata.file_count = 2;
        index.metadata.node_count = nodes.len();
        index.metadata.edge_count = edges.len();
        index.metadata.language = "python".to_string();
        index.nodes = nodes;
        index.edges = edges;
        index.files = ["a.py", "b.py"].iter().map(|f| f.to_string()).collect();
        index
    }

    #[test]
    fn test_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let index = sample_index();
        let path = save_index(&index, dir.path()).unwrap();
        assert_eq!(path, index_path(dir.path()));
        let leftovers: Vec<_> = fs::read_dir(path.parent().unwrap())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .filter(|name| name != INDEX_FILE)
            .collect();
        assert!(leftovers.is_empty(), "{leftovers:?}");

        let loaded = load_index(dir.path()).unwrap();
        assert_eq!(loaded, index);
    }

    #[test]
    fn test_persisted_shape() {
        let dir = tempfile::tempdir().unwrap();
        let path = save_index(&sample_index(), dir.path()).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&fs::read(path).unwrap()).unwrap();
        assert_eq!(json["nodes"][0][0], "a.py:1");
        assert_eq!(json["nodes"][0][1]["symbolName"], "foo");
        assert_eq!(json["edges"][0]["type"], "invoke");
        assert_eq!(json["files"], serde_json::json!(["a.py", "b.py"]));
        assert_eq!(json["metadata"]["version"], INDEX_FORMAT_VERSION);
        assert_eq!(json["metadata"]["fileCount"], 2);
    }

    #[test]
    fn test_concurrent_saves() {
        let dir = tempfile::tempdir().unwrap();
        let index = sample_index();
        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| save_index(&index, dir.path()).unwrap());
            }
        });

        assert_eq!(load_index(dir.path()).unwrap(), index);
        let entries = fs::read_dir(index_path(dir.path()).parent().unwrap())
            .unwrap()
            .count();
        assert_eq!(entries, 1);
    }

    #[test]
    fn test_temp_paths_distinct() {
        let path = index_path(Path::new("/repo"));
        let a = temp_path(&path);
        let b = temp_path(&path);
        assert_ne!(a, b);
        assert_eq!(a.parent(), path.parent());
    }

    #[test]
    fn test_load_missing_or_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_index(dir.path()).is_none());

        let path = index_path(dir.path());
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, b"{ not json").unwrap();
        assert!(load_index(dir.path()).is_none());
    }

    #[test]
    fn test_load_version_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let mut index = sample_index();
        index.metadata.version = INDEX_FORMAT_VERSION + 1;
        save_index(&index, dir.path()).unwrap();
        assert!(load_index(dir.path()).is_none());
    }

    #[test]
    fn test_delete_index() {
        let dir = tempfile::tempdir().unwrap();
        delete_index(dir.path()).unwrap();
        save_index(&sample_index(), dir.path()).unwrap();
        delete_index(dir.path()).unwrap();
        assert!(!index_path(dir.path()).exists());
    }

    #[test]
    fn test_staleness() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("src")).unwrap();
        assert!(is_stale(dir.path(), None));

        save_index(&sample_index(), dir.path()).unwrap();
        assert!(!is_stale(dir.path(), None));
        assert!(!is_stale(dir.path(), Some(Path::new("src"))));
        std::thread::sleep(Duration::from_millis(20));
        assert!(is_stale_with_max_age(dir.path(), None, Duration::ZERO));

        delete_index(dir.path()).unwrap();
        assert!(is_stale(dir.path(), None));
    }

    #[test]
    fn test_stale_when_sources_newer() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        fs::create_dir_all(&src).unwrap();
        save_index(&sample_index(), dir.path()).unwrap();

        // Push the index mtime into the past, then touch the source dir.
        let past = SystemTime::now() - Duration::from_secs(3600);
        let file = fs::File::options()
            .write(true)
            .open(index_path(dir.path()))
            .unwrap();
        file.set_modified(past).unwrap();
        fs::write(src.join("new.py"), "x = 1\n").unwrap();

        assert!(is_stale(dir.path(), Some(Path::new("src"))));
        assert!(!is_stale(dir.path(), None));
    }
}
