use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

/// File name suffix of a loadable plugin archive (matched case-insensitively)
pub const ARTIFACT_SUFFIX: &str = ".zip";

/// Absolute location of one plugin archive found on disk
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArtifactLocation {
    path: PathBuf,
}

impl ArtifactLocation {
    /// Wrap an already-resolved absolute path
    pub(crate) fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default()
    }

    /// Name of the top-level module the archive provides: `tools.zip` provides `tools`
    pub fn module_name(&self) -> String {
        self.path
            .file_stem()
            .map(|stem| stem.to_string_lossy().to_string())
            .unwrap_or_default()
    }
}

/// Whether a file name selects a loadable artifact
pub fn is_loadable_artifact(file_name: &str) -> bool {
    file_name.len() > ARTIFACT_SUFFIX.len()
        && file_name
            .to_ascii_lowercase()
            .ends_with(ARTIFACT_SUFFIX)
}

/// Source of artifact locations for one directory
pub trait ArtifactScanner {
    fn scan(&self, directory: &Path) -> Vec<ArtifactLocation>;
}

/// Scans the real filesystem
#[derive(Debug, Default, Clone, Copy)]
pub struct DirectoryScanner;

impl ArtifactScanner for DirectoryScanner {
    fn scan(&self, directory: &Path) -> Vec<ArtifactLocation> {
        scan(directory)
    }
}

/// List the loadable artifacts directly inside `directory`
///
/// A directory that does not exist or cannot be listed yields nothing. Order of
/// the returned locations is unspecified.
pub fn scan(directory: &Path) -> Vec<ArtifactLocation> {
    let entries = match fs::read_dir(directory) {
        Ok(entries) => entries,
        Err(e) => {
            debug!(directory = %directory.display(), error = %e, "artifact directory not listable");
            return Vec::new();
        }
    };

    let mut found = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().to_string();
        if !is_loadable_artifact(&name) {
            continue;
        }

        // Follows symlinks, so a link to an archive counts as an archive
        match fs::metadata(&path) {
            Ok(metadata) if metadata.is_file() => {}
            Ok(_) => continue,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "skipping unreadable artifact");
                continue;
            }
        }

        match fs::canonicalize(&path) {
            Ok(absolute) => found.push(ArtifactLocation::new(absolute)),
            Err(e) => {
                debug!(path = %path.display(), error = %e, "skipping unresolvable artifact");
            }
        }
    }

    debug!(directory = %directory.display(), count = found.len(), "scanned artifact directory");
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use tempfile::TempDir;

    fn names(locations: &[ArtifactLocation]) -> BTreeSet<String> {
        locations.iter().map(|l| l.file_name()).collect()
    }

    #[test]
    fn predicate_matches_suffix_in_any_case() {
        assert!(is_loadable_artifact("tools.zip"));
        assert!(is_loadable_artifact("tools.ZIP"));
        assert!(is_loadable_artifact("tools.Zip"));
        assert!(!is_loadable_artifact("tools.zip.bak"));
        assert!(!is_loadable_artifact("tools.tar"));
        assert!(!is_loadable_artifact("zip"));
        assert!(!is_loadable_artifact(".zip"));
    }

    #[test]
    fn only_non_matching_files_scan_to_empty() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("README.md"), "docs").unwrap();
        fs::write(dir.path().join("tools.py"), "").unwrap();
        fs::write(dir.path().join("archive.tar.gz"), "").unwrap();

        assert!(scan(dir.path()).is_empty());
    }

    #[test]
    fn mixed_case_suffixes_are_included() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("upper.ZIP"), "").unwrap();
        fs::write(dir.path().join("title.Zip"), "").unwrap();
        fs::write(dir.path().join("lower.zip"), "").unwrap();

        let found = scan(dir.path());
        let expected: BTreeSet<String> = ["upper.ZIP", "title.Zip", "lower.zip"]
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(names(&found), expected);
    }

    #[test]
    fn missing_directory_scans_to_empty() {
        let dir = TempDir::new().unwrap();
        assert!(scan(&dir.path().join("does-not-exist")).is_empty());
    }

    #[test]
    fn directories_named_like_artifacts_are_excluded() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("nested.zip")).unwrap();
        fs::write(dir.path().join("real.zip"), "").unwrap();

        let found = scan(dir.path());
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].module_name(), "real");
    }

    #[test]
    fn locations_are_absolute() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("tools.zip"), "").unwrap();

        let found = scan(dir.path());
        assert!(found[0].path().is_absolute());
    }
}
