//! Test harness for end-to-end analysis runs.
//!
//! Builds a throwaway project in a temp dir (from a named fixture or inline
//! files), optionally commits it with git2, and runs `analyze()` directly.

#![allow(dead_code)]

use pyscope_core::{analyze, load_config, Analysis, AnalysisConfig, RelationKind};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub struct Project {
    _temp_dir: TempDir,
    root: PathBuf,
}

impl Project {
    /// Empty project directory.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let root = temp_dir.path().join("project");
        std::fs::create_dir_all(&root).expect("Failed to create project root");
        Project { _temp_dir: temp_dir, root }
    }

    /// Project with the given `(relative path, content)` files.
    pub fn with_files(files: &[(&str, &str)]) -> Self {
        let project = Project::new();
        for (path, content) in files {
            project.write(path, content);
        }
        project
    }

    /// Copy of `tests/fixtures/<name>`.
    pub fn from_fixture(name: &str) -> Self {
        let fixture_src = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures").join(name);
        assert!(fixture_src.exists(), "Fixture '{name}' not found at {}", fixture_src.display());
        let project = Project::new();
        copy_dir_recursive(&fixture_src, &project.root);
        project
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn write(&self, path: &str, content: &str) {
        let full = self.root.join(path);
        if let Some(parent) = full.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create dir");
        }
        std::fs::write(full, content).expect("Failed to write file");
    }

    /// `git init` plus one commit of everything currently on disk.
    pub fn commit_all(&self, message: &str) {
        let repo = git2::Repository::open(&self.root)
            .or_else(|_| git2::Repository::init(&self.root))
            .expect("git init failed");
        let mut index = repo.index().expect("index");
        index
            .add_all(["*"].iter(), git2::IndexAddOption::DEFAULT, None)
            .expect("git add failed");
        index.write().expect("index write");
        let tree_id = index.write_tree().expect("write tree");
        let tree = repo.find_tree(tree_id).expect("find tree");
        let sig = git2::Signature::now("Test", "test@test.com").expect("signature");
        let parents: Vec<git2::Commit> =
            repo.head().ok().and_then(|h| h.peel_to_commit().ok()).into_iter().collect();
        let parent_refs: Vec<&git2::Commit> = parents.iter().collect();
        repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &parent_refs)
            .expect("git commit failed");
    }

    pub fn config(&self) -> AnalysisConfig {
        load_config(&self.root)
    }

    pub fn analyze(&self) -> Analysis {
        self.analyze_with(|_| {})
    }

    pub fn analyze_with(&self, tweak: impl FnOnce(&mut AnalysisConfig)) -> Analysis {
        let mut config = self.config();
        tweak(&mut config);
        analyze(&config).expect("analysis failed")
    }
}

/// Recursively copy a directory tree. Preserves file contents but not metadata.
pub fn copy_dir_recursive(src: &Path, dst: &Path) {
    if !dst.exists() {
        std::fs::create_dir_all(dst).expect("Failed to create dir");
    }
    for entry in std::fs::read_dir(src).expect("Failed to read dir") {
        let entry = entry.expect("Failed to read entry");
        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());
        if src_path.is_dir() {
            copy_dir_recursive(&src_path, &dst_path);
        } else {
            std::fs::copy(&src_path, &dst_path).expect("Failed to copy file");
        }
    }
}

pub fn node_ids(analysis: &Analysis) -> BTreeSet<String> {
    analysis.get_graph().nodes().map(|n| n.id.clone()).collect()
}

/// `(source, target)` pairs of one edge kind in the presented graph.
pub fn edges_of(analysis: &Analysis, kind: RelationKind) -> BTreeSet<(String, String)> {
    analysis
        .get_graph()
        .edges()
        .filter(|e| e.kind == kind)
        .map(|e| (e.source_id.clone(), e.target_id.clone()))
        .collect()
}

pub fn pair(source: &str, target: &str) -> (String, String) {
    (source.to_string(), target.to_string())
}
