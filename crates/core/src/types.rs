//! Core types shared across the pipeline: analysis configuration and the
//! scanned-file records handed from the source reader to the extractor.

use std::collections::BTreeSet;
use std::path::PathBuf;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Maximum file size (in bytes) that will be read into memory.
pub const MAX_FILE_READ: u64 = 2 * 1024 * 1024;

/// Default name of the per-project exclusion file (gitignore syntax).
pub const DEFAULT_IGNORE_FILE: &str = ".pyscopeignore";

/// Name of the optional per-project config file.
pub const CONFIG_FILE: &str = ".pyscope.toml";

// ---------------------------------------------------------------------------
// Analysis configuration
// ---------------------------------------------------------------------------

/// Runtime configuration for one analysis run. Loaded from `.pyscope.toml` or defaults,
/// then overridden by CLI flags.
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    pub root: PathBuf,
    /// Directory names to skip during the walk.
    pub skip_dirs: BTreeSet<String>,
    /// File extensions that are treated as Python sources.
    pub extensions: BTreeSet<String>,
    /// Per-directory exclusion file name, read like `.gitignore`.
    pub ignore_file: String,
    /// Extra gitignore-style exclusion patterns, relative to the root.
    pub exclude: Vec<String>,
    /// Restrict the assembled graph to this module and its direct neighbours.
    pub module_focus: Option<String>,
    /// Where the diff overlay comes from. `None` disables the overlay.
    pub diff: Option<DiffSource>,
    /// Override for the layout store directory.
    pub layout_dir: Option<PathBuf>,
}

/// Source of the unified diff consumed by the overlay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiffSource {
    /// Diff the working tree against this revision using git.
    Baseline(String),
    /// Read a pre-computed unified diff from a file.
    File(PathBuf),
    /// Use this diff text as-is.
    Text(String),
}

impl AnalysisConfig {
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            skip_dirs: [
                ".git",
                "__pycache__",
                ".venv",
                "venv",
                ".tox",
                ".mypy_cache",
                ".pytest_cache",
                "node_modules",
                "build",
                "dist",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            extensions: ["py".to_string()].into_iter().collect(),
            ignore_file: DEFAULT_IGNORE_FILE.to_string(),
            exclude: Vec::new(),
            module_focus: None,
            diff: None,
            layout_dir: None,
        }
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self::new(PathBuf::from("."))
    }
}

// ---------------------------------------------------------------------------
// Scanned files
// ---------------------------------------------------------------------------

/// A Python source discovered by the source reader.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ScannedFile {
    /// Path relative to the project root, `/`-separated.
    pub rel_path: String,
    pub abs_path: PathBuf,
}
