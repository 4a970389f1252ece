//! Source reader: discovers Python files under the project root and maps
//! relative paths to dotted module names.

use crate::types::*;
use ignore::overrides::OverrideBuilder;
use ignore::WalkBuilder;
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, warn};

// ---------------------------------------------------------------------------
// Parallel file walking
// ---------------------------------------------------------------------------

/// Walk the project and return every source file that survives the skip list,
/// the exclusion file and the configured exclude patterns, sorted by path.
pub fn scan_files(config: &AnalysisConfig) -> Vec<ScannedFile> {
    let root = config.root.as_path();
    let results: Mutex<Vec<ScannedFile>> = Mutex::new(Vec::new());

    let mut builder = WalkBuilder::new(root);
    builder
        .hidden(true)
        .git_ignore(false)
        .git_global(false)
        .git_exclude(false)
        .add_custom_ignore_filename(&config.ignore_file)
        .threads(rayon::current_num_threads().min(12));

    if !config.exclude.is_empty() {
        let mut overrides = OverrideBuilder::new(root);
        for pattern in &config.exclude {
            // Overrides are whitelists; a leading '!' turns the glob into an exclusion.
            if let Err(e) = overrides.add(&format!("!{pattern}")) {
                warn!(pattern = pattern.as_str(), error = %e, "Invalid exclude pattern");
            }
        }
        match overrides.build() {
            Ok(ov) => {
                builder.overrides(ov);
            }
            Err(e) => warn!(error = %e, "Could not build exclude patterns"),
        }
    }

    let skip = config.skip_dirs.clone();
    builder.filter_entry(move |entry| {
        if entry.file_type().is_some_and(|ft| ft.is_dir()) {
            let name = entry.file_name().to_string_lossy();
            return !skip.contains(name.as_ref());
        }
        true
    });

    let exts = &config.extensions;
    builder.build_parallel().run(|| {
        Box::new(|entry| {
            let entry = match entry {
                Ok(e) => e,
                Err(_) => return ignore::WalkState::Continue,
            };
            if !entry.file_type().is_some_and(|ft| ft.is_file()) {
                return ignore::WalkState::Continue;
            }

            let abs_path = entry.path().to_path_buf();
            let ext = abs_path.extension().and_then(|e| e.to_str()).unwrap_or("");
            if !exts.contains(ext) {
                return ignore::WalkState::Continue;
            }

            let rel_path = abs_path
                .strip_prefix(root)
                .unwrap_or(&abs_path)
                .to_string_lossy()
                .replace('\\', "/");

            if let Ok(mut files) = results.lock() {
                files.push(ScannedFile { rel_path, abs_path });
            }
            ignore::WalkState::Continue
        })
    });

    let mut files = results.into_inner().unwrap_or_else(|poisoned| poisoned.into_inner());
    files.sort();
    debug!(files = files.len(), root = %root.display(), "Source files discovered");
    files
}

// ---------------------------------------------------------------------------
// Module naming
// ---------------------------------------------------------------------------

/// Dotted module name for a root-relative path.
///
/// `pkg/sub/mod.py` → `pkg.sub.mod`, `pkg/__init__.py` → `pkg`. A root-level
/// `__init__.py` keeps the name `__init__`.
pub fn module_name_for_path(rel_path: &str) -> String {
    let without_ext = rel_path.rsplit_once('.').map(|(s, _)| s).unwrap_or(rel_path);
    let mut parts: Vec<&str> = without_ext.split('/').filter(|p| !p.is_empty()).collect();
    if parts.len() > 1 && parts.last() == Some(&"__init__") {
        parts.pop();
    }
    parts.join(".")
}

/// True if the path is a package initializer (`__init__.py` / `__init__.pyi`).
pub fn is_package_init(rel_path: &str) -> bool {
    let file_name = rel_path.rsplit('/').next().unwrap_or(rel_path);
    file_name.rsplit_once('.').map(|(stem, _)| stem) == Some("__init__")
}

/// Package path used to anchor relative imports: a package `__init__` anchors at
/// itself, any other module at its parent package ("" for top-level modules).
/// A root-level `__init__` anchors at the root.
pub fn package_of(module: &str, is_package: bool) -> String {
    if module == "__init__" {
        return String::new();
    }
    if is_package {
        return module.to_string();
    }
    module.rsplit_once('.').map(|(p, _)| p.to_string()).unwrap_or_default()
}

/// True if `path` exists and is a directory.
pub fn is_project_root(path: &Path) -> bool {
    path.is_dir()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_module_names() {
        assert_eq!(module_name_for_path("a.py"), "a");
        assert_eq!(module_name_for_path("pkg/sub/mod.py"), "pkg.sub.mod");
        assert_eq!(module_name_for_path("pkg/__init__.py"), "pkg");
        assert_eq!(module_name_for_path("__init__.py"), "__init__");
        assert_eq!(module_name_for_path("stubs/api.pyi"), "stubs.api");
    }

    #[test]
    fn test_package_of() {
        assert_eq!(package_of("pkg.sub.mod", false), "pkg.sub");
        assert_eq!(package_of("pkg.sub", true), "pkg.sub");
        assert_eq!(package_of("top", false), "");
        assert_eq!(package_of("__init__", true), "");
        assert_eq!(package_of("pkg.__init__", false), "pkg");
        assert!(is_package_init("pkg/__init__.py"));
        assert!(!is_package_init("pkg/init.py"));
    }

    #[test]
    fn test_scan_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(root, "z.py", "");
        write(root, "a.py", "");
        write(root, "pkg/mod.py", "");
        write(root, "notes.txt", "not python");
        write(root, "__pycache__/cached.py", "");
        write(root, ".hidden/secret.py", "");

        let files = scan_files(&AnalysisConfig::new(root.to_path_buf()));
        let paths: Vec<&str> = files.iter().map(|f| f.rel_path.as_str()).collect();
        assert_eq!(paths, vec!["a.py", "pkg/mod.py", "z.py"]);
    }

    #[test]
    fn test_scan_honours_ignore_file_and_excludes() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(root, "keep.py", "");
        write(root, "generated/out.py", "");
        write(root, "legacy/old.py", "");
        write(root, ".pyscopeignore", "generated/\n");

        let mut config = AnalysisConfig::new(root.to_path_buf());
        config.exclude.push("legacy/**".to_string());
        let files = scan_files(&config);
        let paths: Vec<&str> = files.iter().map(|f| f.rel_path.as_str()).collect();
        assert_eq!(paths, vec!["keep.py"], "Expected ignored paths to be dropped: {paths:?}");
    }
}
