use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use super::graph::EntityGraph;
use super::record::EntityRecord;
use crate::core::parser::CodeParser;
use crate::error::{MockBuilderError, Result};

/// Persisted form of an [`EntityGraph`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub roots_hash: String,
    pub created_at: DateTime<Utc>,
    pub records: BTreeMap<String, EntityRecord>,
}

/// Stable key for an ordered list of source roots
pub fn roots_hash(roots: &[PathBuf]) -> String {
    let mut hasher = Sha256::new();
    for root in roots {
        hasher.update(root.to_string_lossy().as_bytes());
        hasher.update([0u8]);
    }
    format!("{:x}", hasher.finalize())
}

/// Load the graph from `cache_file`, or scan the roots and write a fresh snapshot
///
/// `force` skips the snapshot unconditionally. A snapshot that cannot be
/// read back, or that belongs to other roots, is replaced.
pub fn load_or_build(
    roots: &[PathBuf],
    cache_file: Option<&Path>,
    force: bool,
    parser: &mut CodeParser,
    progress: bool,
) -> Result<EntityGraph> {
    let expected_hash = roots_hash(roots);

    if let Some(path) = cache_file.filter(|path| !force && path.is_file()) {
        match read_snapshot(path, &expected_hash) {
            Ok(snapshot) => {
                info!(
                    "Loaded {} declarations from {} (created {})",
                    snapshot.records.len(),
                    path.display(),
                    snapshot.created_at.to_rfc3339()
                );
                return Ok(EntityGraph::from_records(snapshot.records));
            }
            Err(e) => warn!("Ignoring graph cache {}: {}", path.display(), e),
        }
    }

    let graph = EntityGraph::scan(roots, parser, progress)?;

    if let Some(path) = cache_file {
        write_snapshot(path, &expected_hash, &graph)?;
        info!("Saved graph cache to {}", path.display());
    }

    Ok(graph)
}

fn read_snapshot(path: &Path, expected_hash: &str) -> Result<GraphSnapshot> {
    let content = std::fs::read_to_string(path)?;
    let snapshot: GraphSnapshot = serde_json::from_str(&content)?;
    if snapshot.roots_hash != expected_hash {
        return Err(MockBuilderError::Cache(format!(
            "snapshot was built for other source roots ({})",
            snapshot.roots_hash
        )));
    }
    Ok(snapshot)
}

fn write_snapshot(path: &Path, roots_hash: &str, graph: &EntityGraph) -> Result<()> {
    let snapshot = GraphSnapshot {
        roots_hash: roots_hash.to_string(),
        created_at: Utc::now(),
        records: graph.records().clone(),
    };
    let content = serde_json::to_string_pretty(&snapshot)?;

    if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(|source| MockBuilderError::Write {
            path: dir.to_path_buf(),
            source,
        })?;
    }
    std::fs::write(path, content).map_err(|source| MockBuilderError::Write {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source_tree() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("Shape.php"),
            "<?php\nnamespace Geo;\n\ninterface Shape\n{\n    public function area(): float;\n}\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("Square.php"),
            "<?php\nnamespace Geo;\n\nclass Square implements Shape\n{\n    public function area(): float { return 1.0; }\n}\n",
        )
        .unwrap();
        dir
    }

    #[test]
    fn test_roots_hash_is_order_sensitive() {
        let a = PathBuf::from("a");
        let b = PathBuf::from("b");
        assert_eq!(roots_hash(&[a.clone(), b.clone()]), roots_hash(&[a.clone(), b.clone()]));
        assert_ne!(roots_hash(&[a.clone(), b.clone()]), roots_hash(&[b, a]));
    }

    #[test]
    fn test_cached_graph_matches_fresh_scan() {
        let sources = source_tree();
        let cache = tempfile::tempdir().unwrap();
        let roots = vec![sources.path().to_path_buf()];
        let cache_file = cache.path().join("nested").join("graph.json");
        let mut parser = CodeParser::new().unwrap();

        let fresh = load_or_build(&roots, Some(&cache_file), false, &mut parser, false).unwrap();
        assert!(cache_file.is_file());
        assert_eq!(fresh.len(), 2);

        // remove the sources: only the snapshot can answer now
        std::fs::remove_file(sources.path().join("Square.php")).unwrap();
        let cached = load_or_build(&roots, Some(&cache_file), false, &mut parser, false).unwrap();
        assert_eq!(cached, fresh);

        let rescanned = load_or_build(&roots, Some(&cache_file), true, &mut parser, false).unwrap();
        assert_eq!(rescanned.len(), 1);
    }

    #[test]
    fn test_foreign_or_corrupt_snapshot_is_rebuilt() {
        let sources = source_tree();
        let cache = tempfile::tempdir().unwrap();
        let roots = vec![sources.path().to_path_buf()];
        let cache_file = cache.path().join("graph.json");
        let mut parser = CodeParser::new().unwrap();

        std::fs::write(&cache_file, "not json").unwrap();
        let graph = load_or_build(&roots, Some(&cache_file), false, &mut parser, false).unwrap();
        assert_eq!(graph.len(), 2);

        let snapshot = GraphSnapshot {
            roots_hash: "elsewhere".to_string(),
            created_at: Utc::now(),
            records: BTreeMap::new(),
        };
        std::fs::write(&cache_file, serde_json::to_string(&snapshot).unwrap()).unwrap();
        let graph = load_or_build(&roots, Some(&cache_file), false, &mut parser, false).unwrap();
        assert_eq!(graph.len(), 2);
    }
}
