//! Read-only query surface over one analysis run.

use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{DiffUnavailable, Error, ParseError, Result};
use crate::graph::{EntityKind, Graph, RelationKind};
use crate::layout::project_key;
use crate::search::{NodeSummary, SearchIndex};

/// What happened to the diff overlay in this run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DiffStatus {
    /// No baseline or diff was requested.
    Disabled,
    /// The overlay was applied; `files` changed files were in the diff.
    Applied { files: usize },
    /// The overlay could not be computed; no node carries diff info.
    Unavailable(DiffUnavailable),
}

/// Source text of one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceView {
    pub id: String,
    pub path: String,
    pub line_start: usize,
    pub line_end: usize,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diff_excerpt: Option<String>,
}

/// Run summary for status reporting.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisStatus {
    pub root: String,
    pub project_key: String,
    pub files_scanned: usize,
    pub files_analyzed: usize,
    pub nodes: BTreeMap<EntityKind, usize>,
    pub edges: BTreeMap<RelationKind, usize>,
    pub parse_errors: Vec<ParseError>,
    pub diff: DiffStatus,
}

/// The result of one analysis run. Immutable once built.
pub struct Analysis {
    pub(crate) root: PathBuf,
    /// Full project graph.
    pub(crate) graph: Graph,
    /// The graph restricted to the requested module focus, if any.
    pub(crate) focused: Option<Graph>,
    pub(crate) search: SearchIndex,
    /// File path -> text as analysed.
    pub(crate) sources: BTreeMap<String, String>,
    pub(crate) files_scanned: usize,
    pub(crate) parse_errors: Vec<ParseError>,
    pub(crate) diff_status: DiffStatus,
}

impl Analysis {
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The graph for presentation: focused when a module focus was requested.
    pub fn get_graph(&self) -> &Graph {
        self.focused.as_ref().unwrap_or(&self.graph)
    }

    /// The unfiltered project graph.
    pub fn full_graph(&self) -> &Graph {
        &self.graph
    }

    pub fn get_source(&self, node_id: &str) -> Result<SourceView> {
        let node = self
            .graph
            .node(node_id)
            .ok_or_else(|| Error::NotFound(node_id.to_string()))?;
        let text = self
            .sources
            .get(&node.path)
            .ok_or_else(|| Error::NotFound(format!("source for {node_id}")))?;

        let lines: Vec<&str> = text.lines().collect();
        let start = node.line_start.saturating_sub(1).min(lines.len());
        let end = node.line_end.min(lines.len()).max(start);

        Ok(SourceView {
            id: node.id.clone(),
            path: node.path.clone(),
            line_start: node.line_start,
            line_end: node.line_end,
            text: lines[start..end].join("\n"),
            diff_excerpt: node.diff_info.as_ref().and_then(|d| d.excerpt.clone()),
        })
    }

    pub fn search(&self, query: &str, limit: Option<usize>) -> Vec<NodeSummary> {
        self.search.search(query, limit)
    }

    pub fn parse_errors(&self) -> &[ParseError] {
        &self.parse_errors
    }

    pub fn diff_status(&self) -> &DiffStatus {
        &self.diff_status
    }

    pub fn project_key(&self) -> String {
        project_key(&self.root)
    }

    pub fn status(&self) -> AnalysisStatus {
        AnalysisStatus {
            root: self.root.display().to_string(),
            project_key: self.project_key(),
            files_scanned: self.files_scanned,
            files_analyzed: self.sources.len(),
            nodes: self.graph.node_counts(),
            edges: self.graph.edge_counts(),
            parse_errors: self.parse_errors.clone(),
            diff: self.diff_status.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AnalysisConfig, DiffSource};

    fn project(files: &[(&str, &str)]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for (path, content) in files {
            let full = dir.path().join(path);
            std::fs::create_dir_all(full.parent().unwrap()).unwrap();
            std::fs::write(full, content).unwrap();
        }
        dir
    }

    #[test]
    fn test_get_source_slices_entity_lines() {
        let dir = project(&[("m.py", "import os\n\n@wrap\ndef f():\n    return 1\n\nx = f()\n")]);
        let analysis = crate::analyze(&AnalysisConfig::new(dir.path().to_path_buf())).unwrap();

        let view = analysis.get_source("function:m.f").unwrap();
        assert_eq!(view.text, "@wrap\ndef f():\n    return 1");
        assert_eq!((view.line_start, view.line_end), (3, 5));
        assert!(view.diff_excerpt.is_none());

        let module = analysis.get_source("module:m").unwrap();
        assert_eq!(module.text.lines().count(), 7);

        assert!(matches!(analysis.get_source("function:m.nope"), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_diff_excerpt_and_status() {
        let dir = project(&[("m.py", "def f():\n    x = 1\n    return x\n")]);
        let mut config = AnalysisConfig::new(dir.path().to_path_buf());
        config.diff = Some(DiffSource::Text(
            "--- a/m.py\n+++ b/m.py\n@@ -1,2 +1,3 @@\n def f():\n+    x = 1\n     return x\n".to_string(),
        ));
        let analysis = crate::analyze(&config).unwrap();

        assert_eq!(analysis.diff_status(), &DiffStatus::Applied { files: 1 });
        let view = analysis.get_source("function:m.f").unwrap();
        let excerpt = view.diff_excerpt.expect("touched entity has an excerpt");
        assert!(excerpt.contains("+    x = 1"), "Unexpected excerpt:\n{excerpt}");

        let status = analysis.status();
        assert_eq!(status.files_analyzed, 1);
        assert_eq!(status.nodes.get(&EntityKind::Function), Some(&1));
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["diff"]["status"], "applied");
        assert_eq!(json["nodes"]["function"], 1);
    }

    #[test]
    fn test_unavailable_diff_status_serializes() {
        let status = DiffStatus::Unavailable(DiffUnavailable::NoRepository);
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["status"], "unavailable");
        assert_eq!(json["reason"], "no_repository");
    }
}
