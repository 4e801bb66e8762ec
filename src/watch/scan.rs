//! Directory listing for the local watcher.

use std::fs;
use std::io;
use std::path::Path;

use jwalk::WalkDir;

use super::diff::Timestamps;
use crate::freshness::mtime_ms;
use crate::record::FileMap;

/// List source files under `root` with their modification times.
///
/// Paths are relative to `root` and always use `/`. Hidden, backup and
/// editor swap files are skipped.
pub fn list(root: &Path, extensions: &[String]) -> Timestamps {
    WalkDir::new(root)
        .sort(true)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| {
            let path = e.path();
            if is_temp_file(&path) || !has_extension(&path, extensions) {
                return None;
            }
            let rel = relative(root, &path)?;
            Some((rel, mtime_ms(&path)?))
        })
        .collect()
}

/// Read every listed file into a file map.
pub fn read_files<'a>(
    root: &Path,
    paths: impl IntoIterator<Item = &'a String>,
) -> Result<FileMap, (String, io::Error)> {
    paths
        .into_iter()
        .map(|rel| {
            fs::read_to_string(root.join(rel))
                .map(|content| (rel.clone(), content))
                .map_err(|e| (rel.clone(), e))
        })
        .collect()
}

fn relative(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let parts: Vec<_> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect();
    Some(parts.join("/"))
}

fn has_extension(path: &Path, extensions: &[String]) -> bool {
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return false;
    };
    extensions
        .iter()
        .any(|want| want.trim_start_matches('.').eq_ignore_ascii_case(ext))
}

fn is_temp_file(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

    matches!(ext, "bck" | "bak" | "backup" | "swp" | "swo" | "tmp")
        || name.ends_with('~')
        || name.starts_with('.')
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn exts() -> Vec<String> {
        vec!["ts".into(), ".js".into()]
    }

    #[test]
    fn test_list_filters_and_relativizes() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("lib/deep")).unwrap();
        fs::write(root.join("main.ts"), "1").unwrap();
        fs::write(root.join("lib/deep/util.js"), "2").unwrap();
        fs::write(root.join("readme.md"), "x").unwrap();
        fs::write(root.join(".hidden.ts"), "x").unwrap();
        fs::write(root.join("main.ts~"), "x").unwrap();

        let listing = list(root, &exts());
        let paths: Vec<_> = listing.keys().map(String::as_str).collect();
        assert_eq!(paths, vec!["lib/deep/util.js", "main.ts"]);
        assert!(listing.values().all(|t| *t > 0));
    }

    #[test]
    fn test_list_missing_dir_is_empty() {
        let dir = TempDir::new().unwrap();
        assert!(list(&dir.path().join("nope"), &exts()).is_empty());
    }

    #[test]
    fn test_read_files() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.ts"), "one").unwrap();
        let listing = list(dir.path(), &exts());

        let files = read_files(dir.path(), listing.keys()).unwrap();
        assert_eq!(files.get("a.ts").map(String::as_str), Some("one"));

        let missing = ["gone.ts".to_string()];
        let (path, _) = read_files(dir.path(), missing.iter()).unwrap_err();
        assert_eq!(path, "gone.ts");
    }

    #[test]
    fn test_extension_matching() {
        assert!(has_extension(Path::new("a.TS"), &exts()));
        assert!(has_extension(Path::new("a.js"), &exts()));
        assert!(!has_extension(Path::new("a.tsx"), &exts()));
        assert!(!has_extension(Path::new("Makefile"), &exts()));
    }
}
