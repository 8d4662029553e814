//! Removal of stale coverage artifacts.

use std::fs;
use std::path::Path;

use tracing::{debug, info};
use walkdir::WalkDir;

use crate::error::{RunnerError, RunnerResult};
use crate::locator;

/// Delete every coverage artifact below `root`, whether or not its source
/// still exists. Returns the number of files removed.
pub fn clean_artifacts(root: &Path) -> RunnerResult<usize> {
    if !root.exists() {
        return Ok(0);
    }

    let mut removed = 0;
    for entry in WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
        let path = entry.path();
        if !entry.file_type().is_file() || !locator::is_artifact(path) {
            continue;
        }
        fs::remove_file(path).map_err(|err| RunnerError::io(path, err))?;
        debug!(artifact = %path.display(), "removed coverage artifact");
        removed += 1;
    }

    info!(root = %root.display(), removed, "Coverage artifacts cleaned");
    Ok(removed)
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]

    use super::*;
    use tempfile::tempdir;

    #[test]
    fn clean_artifacts__mixed_tree__then_only_artifacts_removed() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("src/sub")).unwrap();
        fs::write(root.join("src/a.jl"), "x\n").unwrap();
        fs::write(root.join("src/a.jl.cov"), "        1 x\n").unwrap();
        fs::write(root.join("src/sub/b.jl.977.cov"), "        0 x\n").unwrap();
        fs::write(root.join("src/notes.txt"), "keep\n").unwrap();

        assert_eq!(clean_artifacts(root).unwrap(), 2);
        assert!(root.join("src/a.jl").exists());
        assert!(root.join("src/notes.txt").exists());
        assert!(!root.join("src/a.jl.cov").exists());
        assert!(!root.join("src/sub/b.jl.977.cov").exists());
    }

    #[test]
    fn clean_artifacts__missing_root__then_zero() {
        let dir = tempdir().unwrap();
        assert_eq!(clean_artifacts(&dir.path().join("absent")).unwrap(), 0);
    }
}
