//! pyscope-core: code structure graphs for Python projects.
//!
//! One analysis run walks a project root, extracts declarations from every
//! Python file in parallel, builds a project-wide symbol table, resolves
//! imports, inheritance and calls into typed edges, computes complexity and
//! maintainability metrics, optionally overlays a git diff, and assembles the
//! result into an immutable [`Graph`] behind the [`Analysis`] query surface.
//!
//! ```no_run
//! let config = pyscope_core::load_config(std::path::Path::new("."));
//! let analysis = pyscope_core::analyze(&config)?;
//! println!("{}", serde_json::to_string_pretty(analysis.get_graph())?);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod diff;
pub mod error;
pub mod extract;
pub mod git;
pub mod graph;
pub mod layout;
pub mod metrics;
pub mod query;
pub mod resolve;
pub mod scan;
pub mod search;
pub mod symbols;
pub mod types;

pub use error::{DiffUnavailable, Error, ParseError, Result};
pub use graph::{Entity, EntityKind, Graph, Relation, RelationKind};
pub use layout::{FileLayoutStore, LayoutStore, Position, Positions};
pub use query::{Analysis, AnalysisStatus, DiffStatus, SourceView};
pub use search::NodeSummary;
pub use types::{AnalysisConfig, DiffSource};

use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

use diff::DiffOverlay;
use search::SearchIndex;
use symbols::SymbolTable;
use types::CONFIG_FILE;

// ---------------------------------------------------------------------------
// Platform directories
// ---------------------------------------------------------------------------

/// Cross-platform home directory (`HOME` or `USERPROFILE`).
pub fn home_dir() -> Option<PathBuf> {
    std::env::var("HOME").or_else(|_| std::env::var("USERPROFILE")).ok().map(PathBuf::from)
}

/// Platform-aware cache directory: `$XDG_CACHE_HOME/pyscope` or `~/.cache/pyscope` on Unix,
/// `%LOCALAPPDATA%/pyscope/cache` on Windows.
pub fn cache_dir() -> Option<PathBuf> {
    if cfg!(target_os = "windows") {
        std::env::var("LOCALAPPDATA").ok().map(|a| PathBuf::from(a).join("pyscope").join("cache"))
    } else {
        std::env::var("XDG_CACHE_HOME")
            .ok()
            .map(PathBuf::from)
            .or_else(|| home_dir().map(|h| h.join(".cache")))
            .map(|c| c.join("pyscope"))
    }
}

// ---------------------------------------------------------------------------
// .pyscope.toml config loading
// ---------------------------------------------------------------------------

const KNOWN_CONFIG_KEYS: &[&str] =
    &["skip_dirs", "extensions", "exclude", "ignore_file", "baseline", "layout_dir"];

/// Levenshtein edit distance for typo suggestions.
fn edit_distance(a: &str, b: &str) -> usize {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];
    for (i, &ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, &cb) in b.iter().enumerate() {
            let cost = if ca == cb { 0 } else { 1 };
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

fn string_list(value: &toml::Value) -> Vec<String> {
    value
        .as_array()
        .map(|items| items.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default()
}

/// Load analysis configuration from `.pyscope.toml` in the project root.
///
/// Missing or unparsable files yield defaults (the latter with a warning).
/// Unknown keys warn with a typo suggestion.
pub fn load_config(project_root: &Path) -> AnalysisConfig {
    let mut config = AnalysisConfig::new(project_root.to_path_buf());
    let config_path = project_root.join(CONFIG_FILE);
    if !config_path.is_file() {
        return config;
    }

    debug!("Loading {CONFIG_FILE}");
    let table = match std::fs::read_to_string(&config_path)
        .map_err(|e| e.to_string())
        .and_then(|c| c.parse::<toml::Table>().map_err(|e| e.to_string()))
    {
        Ok(table) => table,
        Err(e) => {
            warn!(error = e.as_str(), "Failed to parse {CONFIG_FILE}, using defaults");
            return config;
        }
    };

    for key in table.keys() {
        if KNOWN_CONFIG_KEYS.contains(&key.as_str()) {
            continue;
        }
        let suggestion = KNOWN_CONFIG_KEYS
            .iter()
            .min_by_key(|k| edit_distance(key, k))
            .copied()
            .unwrap_or_default();
        if edit_distance(key, suggestion) <= 3 {
            warn!(
                key = key.as_str(),
                suggestion,
                "Unknown key in {CONFIG_FILE}; did you mean '{suggestion}'?"
            );
        } else {
            warn!(
                key = key.as_str(),
                "Unknown key in {CONFIG_FILE} (known keys: {})",
                KNOWN_CONFIG_KEYS.join(", ")
            );
        }
    }

    // skip_dirs merge with the defaults
    if let Some(dirs) = table.get("skip_dirs") {
        config.skip_dirs.extend(string_list(dirs));
    }
    if let Some(exts) = table.get("extensions") {
        config.extensions = string_list(exts)
            .into_iter()
            .map(|e| e.trim_start_matches('.').to_string())
            .collect();
    }
    if let Some(patterns) = table.get("exclude") {
        config.exclude = string_list(patterns);
    }
    if let Some(name) = table.get("ignore_file").and_then(|v| v.as_str()) {
        config.ignore_file = name.to_string();
    }
    if let Some(rev) = table.get("baseline").and_then(|v| v.as_str()) {
        config.diff = Some(DiffSource::Baseline(rev.to_string()));
    }
    if let Some(dir) = table.get("layout_dir").and_then(|v| v.as_str()) {
        let dir = PathBuf::from(dir);
        config.layout_dir = Some(if dir.is_absolute() { dir } else { project_root.join(dir) });
    }

    config
}

/// Layout store for a config: `layout_dir` when set, else the cache directory.
pub fn layout_store(config: &AnalysisConfig) -> Result<FileLayoutStore> {
    let dir = match &config.layout_dir {
        Some(dir) => dir.clone(),
        None => FileLayoutStore::default_dir()
            .ok_or_else(|| Error::Layout("no cache directory available".to_string()))?,
    };
    Ok(FileLayoutStore::new(dir))
}

// ---------------------------------------------------------------------------
// Analysis pipeline
// ---------------------------------------------------------------------------

fn load_overlay(config: &AnalysisConfig) -> (Option<DiffOverlay>, DiffStatus) {
    let parsed = match &config.diff {
        None => return (None, DiffStatus::Disabled),
        Some(DiffSource::Baseline(rev)) => git::diff_workdir(&config.root, rev)
            .map(|d| DiffOverlay::parse(&d.text).relative_to(&d.prefix)),
        Some(DiffSource::File(path)) => std::fs::read_to_string(path)
            .map(|text| DiffOverlay::parse(&text))
            .map_err(|e| DiffUnavailable::Io(format!("{}: {e}", path.display()))),
        Some(DiffSource::Text(text)) => Ok(DiffOverlay::parse(text)),
    };

    match parsed {
        Ok(overlay) => {
            let files = overlay.file_count();
            debug!(files, "Diff overlay applied");
            (Some(overlay), DiffStatus::Applied { files })
        }
        Err(reason) => {
            warn!(reason = %reason, "Diff overlay unavailable, continuing without diff info");
            (None, DiffStatus::Unavailable(reason))
        }
    }
}

/// Run the full pipeline once: scan, extract (parallel), build the symbol
/// table, resolve references, apply the diff overlay and assemble the graph.
pub fn analyze(config: &AnalysisConfig) -> Result<Analysis> {
    let start = Instant::now();
    if !scan::is_project_root(&config.root) {
        return Err(Error::RootNotFound(config.root.clone()));
    }
    info!(root = %config.root.display(), "Analysing project");

    let files = scan::scan_files(config);
    let (extracts, parse_errors) = extract::extract_all(&files);
    let table = SymbolTable::build(&extracts);
    let resolved = resolve::resolve(&extracts, &table);
    let (overlay, diff_status) = load_overlay(config);

    let graph = graph::assemble(&extracts, &resolved.relations, overlay.as_ref())?;
    let focused = match &config.module_focus {
        Some(module) => Some(graph.focus(module)?),
        None => None,
    };
    let search = SearchIndex::build(&graph);
    let sources = extracts.into_iter().map(|e| (e.path, e.text)).collect();

    info!(
        files = files.len(),
        nodes = graph.node_count(),
        edges = graph.edge_count(),
        parse_errors = parse_errors.len(),
        time_ms = start.elapsed().as_millis() as u64,
        "Analysis complete"
    );

    Ok(Analysis {
        root: config.root.clone(),
        graph,
        focused,
        search,
        sources,
        files_scanned: files.len(),
        parse_errors,
        diff_status,
    })
}
