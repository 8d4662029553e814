//! Discovery of per-line coverage artifacts.
//!
//! The runtime writes one artifact next to each source file it tracked:
//! `foo.jl.cov`, or `foo.jl.<pid>.cov` when several processes wrote coverage.
//! The artifact points back at its source only by name; an artifact whose
//! source has been deleted or moved is skipped.

use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

pub const ARTIFACT_SUFFIX: &str = ".cov";

/// One artifact paired with the source file it describes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverageArtifact {
    pub artifact: PathBuf,
    pub source: PathBuf,
    /// Source path relative to the scan root, `/`-separated.
    pub key: String,
}

/// Strip the artifact suffix (and the optional process id) from a file name,
/// yielding the source file name.
pub fn source_name(artifact_name: &str) -> Option<&str> {
    let stem = artifact_name.strip_suffix(ARTIFACT_SUFFIX)?;
    let stem = match stem.rsplit_once('.') {
        Some((base, pid)) if !pid.is_empty() && pid.bytes().all(|b| b.is_ascii_digit()) => base,
        _ => stem,
    };
    if stem.is_empty() {
        None
    } else {
        Some(stem)
    }
}

pub fn is_artifact(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .and_then(source_name)
        .is_some()
}

/// Start a scan of `root`. The returned iterator walks the tree lazily in
/// file-name order; start a new scan to see the directory again.
pub fn scan(root: impl AsRef<Path>) -> ArtifactScan {
    let root = root.as_ref().to_path_buf();
    let walker = WalkDir::new(&root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter();
    ArtifactScan { root, walker }
}

pub struct ArtifactScan {
    root: PathBuf,
    walker: walkdir::IntoIter,
}

impl ArtifactScan {
    fn pair(&self, path: &Path) -> Option<CoverageArtifact> {
        let name = path.file_name()?.to_str()?;
        let source_name = source_name(name)?;
        let source = path.with_file_name(source_name);
        if !source.is_file() {
            debug!(artifact = %path.display(), "skipping artifact without source file");
            return None;
        }
        Some(CoverageArtifact {
            artifact: path.to_path_buf(),
            key: relative_key(&self.root, &source),
            source,
        })
    }
}

impl Iterator for ArtifactScan {
    type Item = CoverageArtifact;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let entry = match self.walker.next()? {
                Ok(entry) => entry,
                Err(err) => {
                    debug!(error = %err, "skipping unreadable entry");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            if let Some(found) = self.pair(entry.path()) {
                return Some(found);
            }
        }
    }
}

fn relative_key(root: &Path, source: &Path) -> String {
    let relative = source.strip_prefix(root).unwrap_or(source);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
