use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use tracing::debug;

/// A source file found under the scan root.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ScannedFile {
    /// Path relative to the root with `/` separators; used as the unit key.
    pub relative: String,
    pub absolute: PathBuf,
}

#[derive(Debug, Clone, Default)]
pub struct ScanOptions {
    pub include_tests: bool,
    pub exclude: Vec<String>,
}

/// Lists `.java` files under `root` in a stable order. Respects `.gitignore`.
pub fn scan_sources(root: &Path, options: &ScanOptions) -> Result<Vec<ScannedFile>> {
    anyhow::ensure!(root.is_dir(), "source directory not found: {}", root.display());
    let excludes = build_globset(&options.exclude)?;

    let mut files = Vec::new();
    let walker = WalkBuilder::new(root).hidden(false).build();

    for entry in walker.into_iter().filter_map(|e| e.ok()) {
        let path = entry.path();
        if path.is_dir() {
            continue;
        }
        if path.extension().and_then(|e| e.to_str()) != Some("java") {
            continue;
        }

        let relative = path
            .strip_prefix(root)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/");

        if !options.include_tests && is_test_path(&relative) {
            debug!("Skipping test source {relative}");
            continue;
        }
        if excludes.is_match(&relative) {
            debug!("Skipping excluded source {relative}");
            continue;
        }

        files.push(ScannedFile {
            relative,
            absolute: path.to_path_buf(),
        });
    }

    files.sort();
    Ok(files)
}

fn is_test_path(relative: &str) -> bool {
    relative.to_ascii_lowercase().contains("test")
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).with_context(|| format!("invalid exclude glob: {pattern}"))?;
        builder.add(glob);
    }
    builder.build().context("failed to build exclude globs")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "class X {}").unwrap();
    }

    #[test]
    fn test_scan_filters_and_orders() {
        let temp = tempdir().unwrap();
        let root = temp.path();
        touch(root, "src/main/java/b/Service.java");
        touch(root, "src/main/java/a/Controller.java");
        touch(root, "src/test/java/a/ControllerTest.java");
        touch(root, "src/main/resources/app.properties");
        touch(root, "src/main/java/gen/Generated.java");

        let options = ScanOptions {
            include_tests: false,
            exclude: vec!["**/gen/**".to_string()],
        };
        let files = scan_sources(root, &options).unwrap();
        let rels: Vec<&str> = files.iter().map(|f| f.relative.as_str()).collect();
        assert_eq!(
            rels,
            vec!["src/main/java/a/Controller.java", "src/main/java/b/Service.java"]
        );
    }

    #[test]
    fn test_scan_can_include_tests() {
        let temp = tempdir().unwrap();
        touch(temp.path(), "src/test/java/FooTest.java");
        let options = ScanOptions {
            include_tests: true,
            exclude: vec![],
        };
        assert_eq!(scan_sources(temp.path(), &options).unwrap().len(), 1);
    }

    #[test]
    fn test_scan_missing_root() {
        let temp = tempdir().unwrap();
        let missing = temp.path().join("nope");
        assert!(scan_sources(&missing, &ScanOptions::default()).is_err());
    }
}
