//! Saved node positions for presentation layers.
//!
//! Layouts are opaque to the analysis: a map from node id to coordinates,
//! stored per project. Node ids are stable across runs, so a saved layout
//! still applies after re-analysis.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

pub type Positions = BTreeMap<String, Position>;

/// Pass-through storage for layouts, keyed by project.
pub trait LayoutStore {
    fn has_saved_layout(&self, project_key: &str) -> Result<bool>;
    fn save_layout(&self, project_key: &str, positions: &Positions) -> Result<()>;
    fn load_layout(&self, project_key: &str) -> Result<Option<Positions>>;
    /// Returns `true` if a layout existed.
    fn clear_layout(&self, project_key: &str) -> Result<bool>;
}

#[derive(Debug, Serialize, Deserialize)]
struct LayoutFile {
    project_key: String,
    positions: Positions,
}

/// One JSON file per project under a directory.
#[derive(Debug, Clone)]
pub struct FileLayoutStore {
    dir: PathBuf,
}

impl FileLayoutStore {
    pub fn new(dir: PathBuf) -> Self {
        FileLayoutStore { dir }
    }

    /// `<cache_dir>/layouts`, or `None` when no home directory is known.
    pub fn default_dir() -> Option<PathBuf> {
        crate::cache_dir().map(|c| c.join("layouts"))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, project_key: &str) -> Result<PathBuf> {
        let valid = !project_key.is_empty()
            && project_key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
            && !project_key.starts_with('.');
        if !valid {
            return Err(Error::Layout(format!("invalid project key '{project_key}'")));
        }
        Ok(self.dir.join(format!("{project_key}.json")))
    }
}

impl LayoutStore for FileLayoutStore {
    fn has_saved_layout(&self, project_key: &str) -> Result<bool> {
        Ok(self.path_for(project_key)?.is_file())
    }

    fn save_layout(&self, project_key: &str, positions: &Positions) -> Result<()> {
        let path = self.path_for(project_key)?;
        std::fs::create_dir_all(&self.dir)?;
        let file = LayoutFile {
            project_key: project_key.to_string(),
            positions: positions.clone(),
        };
        let json = serde_json::to_string_pretty(&file)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &path)?;
        debug!(project_key, nodes = positions.len(), path = %path.display(), "Layout saved");
        Ok(())
    }

    fn load_layout(&self, project_key: &str) -> Result<Option<Positions>> {
        let path = self.path_for(project_key)?;
        if !path.is_file() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path)?;
        let file: LayoutFile = serde_json::from_str(&content)
            .map_err(|e| Error::Layout(format!("corrupt layout {}: {e}", path.display())))?;
        Ok(Some(file.positions))
    }

    fn clear_layout(&self, project_key: &str) -> Result<bool> {
        let path = self.path_for(project_key)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

/// Stable key for a project root: its directory name plus a 64-bit FNV-1a
/// hash of the canonical path.
pub fn project_key(root: &Path) -> String {
    let canonical = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());
    let full = canonical.to_string_lossy();

    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for b in full.as_bytes() {
        hash ^= *b as u64;
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }

    let name: String = canonical
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "root".to_string())
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    let name = name.trim_start_matches('_');
    let name = if name.is_empty() { "root" } else { name };
    format!("{name}-{hash:016x}")
}
