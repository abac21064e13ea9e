use directories::ProjectDirs;
use std::fs;
use std::path::{Path, PathBuf};

use crate::model::NodePosition;

const CACHE_FILE: &str = "layout.json";

/// Locally remembered node positions. Never authoritative: it only overlays
/// whatever the backend returns on the next fetch.
#[derive(Debug, Clone)]
pub struct LayoutCache {
    path: Option<PathBuf>,
}

impl LayoutCache {
    pub fn open() -> Self {
        let path = ProjectDirs::from("", "", "aqueduct").map(|dirs| dirs.data_dir().join(CACHE_FILE));
        Self { path }
    }

    pub fn at(path: impl AsRef<Path>) -> Self {
        Self {
            path: Some(path.as_ref().to_path_buf()),
        }
    }

    /// A cache that never remembers anything.
    pub fn disabled() -> Self {
        Self { path: None }
    }

    pub fn load(&self) -> Vec<NodePosition> {
        let Some(path) = &self.path else {
            return Vec::new();
        };
        let Ok(contents) = fs::read_to_string(path) else {
            return Vec::new();
        };
        serde_json::from_str(&contents).unwrap_or_else(|err| {
            tracing::warn!(path = %path.display(), %err, "ignoring unreadable layout cache");
            Vec::new()
        })
    }

    /// Overwrite the cache with the full layout.
    pub fn store(&self, positions: &[NodePosition]) -> Option<()> {
        let path = self.path.as_ref()?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).ok()?;
        }
        let contents = serde_json::to_string(positions).ok()?;
        match fs::write(path, contents) {
            Ok(()) => Some(()),
            Err(err) => {
                tracing::warn!(path = %path.display(), %err, "could not write layout cache");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos(id: &str, x: f32, y: f32) -> NodePosition {
        NodePosition { id: id.into(), x, y }
    }

    #[test]
    fn store_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let cache = LayoutCache::at(dir.path().join("nested").join(CACHE_FILE));
        assert!(cache.load().is_empty());

        let positions = vec![pos("p1", 10.0, 20.0), pos("t1", 300.5, 80.0)];
        assert_eq!(cache.store(&positions), Some(()));
        assert_eq!(cache.load(), positions);

        cache.store(&positions[..1]).unwrap();
        assert_eq!(cache.load(), vec![pos("p1", 10.0, 20.0)]);
    }

    #[test]
    fn corrupt_file_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CACHE_FILE);
        fs::write(&path, "{not json").unwrap();
        assert!(LayoutCache::at(&path).load().is_empty());
    }

    #[test]
    fn disabled_cache_is_inert() {
        let cache = LayoutCache::disabled();
        assert_eq!(cache.store(&[pos("a", 2.0, 2.0)]), None);
        assert!(cache.load().is_empty());
    }
}
