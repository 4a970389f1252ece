//! Free-text node lookup: case-insensitive substring match over labels and
//! qualified names, with a 64-bit character bitmask pre-filter for cheap
//! rejection.

use rayon::prelude::*;
use serde::Serialize;

use crate::graph::{EntityKind, Graph};

/// Compact description of a node returned by searches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeSummary {
    pub id: String,
    pub kind: EntityKind,
    pub label: String,
    pub qualified_name: String,
    pub path: String,
    pub line_start: usize,
    pub line_end: usize,
}

// ---------------------------------------------------------------------------
// Bitmask pre-filter
// ---------------------------------------------------------------------------

/// a-z → bits 0-25, 0-9 → bits 26-35, `_` `-` `.` `/` → bits 36-39.
/// Case-folded, so a candidate can only match if it covers the query's mask.
pub fn char_bitmask(s: &str) -> u64 {
    let mut mask: u64 = 0;
    for &b in s.as_bytes() {
        let idx = match b {
            b'a'..=b'z' => (b - b'a') as u32,
            b'A'..=b'Z' => (b.to_ascii_lowercase() - b'a') as u32,
            b'0'..=b'9' => (b - b'0') as u32 + 26,
            b'_' => 36,
            b'-' => 37,
            b'.' => 38,
            b'/' => 39,
            _ => continue,
        };
        mask |= 1u64 << idx;
    }
    mask
}

// ---------------------------------------------------------------------------
// Index
// ---------------------------------------------------------------------------

struct SearchEntry {
    summary: NodeSummary,
    label_lower: String,
    qualified_lower: String,
    mask: u64,
}

/// Search surface built once from an assembled graph.
pub struct SearchIndex {
    entries: Vec<SearchEntry>,
}

impl SearchIndex {
    pub fn build(graph: &Graph) -> Self {
        let entries = graph
            .nodes()
            .map(|node| {
                let label_lower = node.label.to_lowercase();
                let qualified_lower = node.qualified_name.to_lowercase();
                SearchEntry {
                    mask: char_bitmask(&label_lower) | char_bitmask(&qualified_lower),
                    label_lower,
                    qualified_lower,
                    summary: NodeSummary {
                        id: node.id.clone(),
                        kind: node.kind,
                        label: node.label.clone(),
                        qualified_name: node.qualified_name.clone(),
                        path: node.path.clone(),
                        line_start: node.line_start,
                        line_end: node.line_end,
                    },
                }
            })
            .collect();
        SearchIndex { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Matches sorted by kind, then label, then qualified name. A blank query
    /// matches nothing.
    pub fn search(&self, query: &str, limit: Option<usize>) -> Vec<NodeSummary> {
        let query = query.trim();
        if query.is_empty() {
            return Vec::new();
        }
        let query = query.to_lowercase();
        let query_mask = char_bitmask(&query);

        let mut results: Vec<NodeSummary> = self
            .entries
            .par_iter()
            .filter(|e| e.mask & query_mask == query_mask)
            .filter(|e| e.label_lower.contains(&query) || e.qualified_lower.contains(&query))
            .map(|e| e.summary.clone())
            .collect();

        results.sort_by(|a, b| {
            (a.kind, &a.label, &a.qualified_name, &a.id).cmp(&(b.kind, &b.label, &b.qualified_name, &b.id))
        });
        if let Some(limit) = limit {
            results.truncate(limit);
        }
        results
    }
}
