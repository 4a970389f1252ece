//! Unified diff parsing and the per-entity diff overlay.
//!
//! Every hunk line is anchored at a line of the new file: added and context
//! lines at their own position, removed lines between the surviving lines
//! before and after them. An entity's counts are the added lines inside its
//! range plus the removed lines that follow one of its lines, or that precede
//! its first line when no other entity ends right above.

use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    Context,
    Added,
    Removed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffLine {
    pub kind: LineKind,
    pub text: String,
    /// Position in the old file (for added lines: the line they follow + 1).
    pub old_line: usize,
    /// Position in the new file (for removed lines: the next surviving line,
    /// so `new_line - 1` is the previous one).
    pub new_line: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hunk {
    pub old_start: usize,
    pub old_count: usize,
    pub new_start: usize,
    pub new_count: usize,
    pub lines: Vec<DiffLine>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileDiff {
    /// `None` for added files.
    pub old_path: Option<String>,
    /// `None` for deleted files.
    pub new_path: Option<String>,
    pub hunks: Vec<Hunk>,
}

/// Per-entity change annotation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiffInfo {
    pub added_lines: usize,
    pub removed_lines: usize,
    /// Minimal unified-diff fragment of the hunk lines in range.
    #[serde(skip)]
    pub excerpt: Option<String>,
}

/// Parsed diff, keyed by new-file path relative to the project root.
#[derive(Debug, Clone, Default)]
pub struct DiffOverlay {
    files: BTreeMap<String, FileDiff>,
}

fn hunk_header() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^@@ -(\d+)(?:,(\d+))? \+(\d+)(?:,(\d+))? @@").expect("hunk header pattern is valid")
    })
}

/// Path from a `---`/`+++` header: strips `a/` or `b/`, quotes and trailing
/// timestamps. `/dev/null` yields `None`.
fn header_path(raw: &str) -> Option<String> {
    let raw = raw.split('\t').next().unwrap_or(raw).trim();
    let raw = raw.trim_matches('"');
    if raw == "/dev/null" {
        return None;
    }
    let path = raw
        .strip_prefix("a/")
        .or_else(|| raw.strip_prefix("b/"))
        .unwrap_or(raw);
    Some(path.to_string())
}

/// Paths from a `diff --git a/x b/y` line, used when no `---`/`+++` headers
/// follow (pure renames, mode changes, binary files).
fn git_header_paths(rest: &str) -> (Option<String>, Option<String>) {
    match rest.split_once(" b/") {
        Some((old, new)) => (
            Some(old.trim_start_matches("a/").to_string()),
            Some(new.to_string()),
        ),
        None => (None, None),
    }
}

struct HunkCursor {
    old: usize,
    new: usize,
    old_left: usize,
    new_left: usize,
}

impl DiffOverlay {
    pub fn parse(text: &str) -> Self {
        let mut files: Vec<FileDiff> = Vec::new();
        let mut current: Option<FileDiff> = None;
        let mut cursor: Option<HunkCursor> = None;

        for line in text.lines() {
            let in_hunk = cursor
                .as_ref()
                .is_some_and(|c| c.old_left > 0 || c.new_left > 0);

            if in_hunk {
                let (Some(file), Some(c)) = (current.as_mut(), cursor.as_mut()) else {
                    continue;
                };
                let Some(hunk) = file.hunks.last_mut() else { continue };
                let (kind, body) = match line.chars().next() {
                    Some('+') => (LineKind::Added, &line[1..]),
                    Some('-') => (LineKind::Removed, &line[1..]),
                    Some(' ') => (LineKind::Context, &line[1..]),
                    Some('\\') => continue,
                    None => (LineKind::Context, ""),
                    Some(_) => {
                        cursor = None;
                        continue;
                    }
                };
                hunk.lines.push(DiffLine {
                    kind,
                    text: body.to_string(),
                    old_line: c.old,
                    new_line: c.new,
                });
                match kind {
                    LineKind::Context => {
                        c.old += 1;
                        c.new += 1;
                        c.old_left = c.old_left.saturating_sub(1);
                        c.new_left = c.new_left.saturating_sub(1);
                    }
                    LineKind::Added => {
                        c.new += 1;
                        c.new_left = c.new_left.saturating_sub(1);
                    }
                    LineKind::Removed => {
                        c.old += 1;
                        c.old_left = c.old_left.saturating_sub(1);
                    }
                }
                continue;
            }

            if let Some(rest) = line.strip_prefix("diff --git ") {
                files.extend(current.take());
                let (old_path, new_path) = git_header_paths(rest);
                current = Some(FileDiff { old_path, new_path, hunks: Vec::new() });
                cursor = None;
            } else if let Some(rest) = line.strip_prefix("--- ") {
                // A bare `---` pair without `diff --git` starts a new file too.
                if current.as_ref().is_some_and(|f| !f.hunks.is_empty()) {
                    files.extend(current.take());
                }
                let file = current.get_or_insert_with(FileDiff::default);
                file.old_path = header_path(rest);
            } else if let Some(rest) = line.strip_prefix("+++ ") {
                let file = current.get_or_insert_with(FileDiff::default);
                file.new_path = header_path(rest);
            } else if let Some(caps) = hunk_header().captures(line) {
                let num = |i: usize, default: usize| {
                    caps.get(i)
                        .and_then(|m| m.as_str().parse::<usize>().ok())
                        .unwrap_or(default)
                };
                let (old_start, old_count) = (num(1, 0), num(2, 1));
                let (new_start, new_count) = (num(3, 0), num(4, 1));
                let file = current.get_or_insert_with(FileDiff::default);
                file.hunks.push(Hunk { old_start, old_count, new_start, new_count, lines: Vec::new() });
                // A zero count means "after line n", so the first line is n + 1.
                cursor = Some(HunkCursor {
                    old: if old_count == 0 { old_start + 1 } else { old_start },
                    new: if new_count == 0 { new_start + 1 } else { new_start },
                    old_left: old_count,
                    new_left: new_count,
                });
            }
        }
        files.extend(current);

        let files = files
            .into_iter()
            .filter_map(|f| f.new_path.clone().map(|p| (p, f)))
            .collect();
        DiffOverlay { files }
    }

    /// Keep only files under `prefix` (a `/`-separated directory relative to the
    /// diff's root) and make their paths relative to it.
    pub fn relative_to(self, prefix: &str) -> Self {
        let prefix = prefix.trim_matches('/');
        if prefix.is_empty() {
            return self;
        }
        let dir = format!("{prefix}/");
        let files = self
            .files
            .into_iter()
            .filter_map(|(path, file)| path.strip_prefix(&dir).map(|p| (p.to_string(), file)))
            .collect();
        DiffOverlay { files }
    }

    pub fn file(&self, path: &str) -> Option<&FileDiff> {
        self.files.get(path)
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    /// Counts and excerpt for the new-file range `[start, end]` of `path`.
    /// `disjoint` holds the ranges of the other entities in the file that
    /// neither contain nor lie inside this one. Untouched ranges get zero
    /// counts and no excerpt.
    pub fn annotate(
        &self,
        path: &str,
        start: usize,
        end: usize,
        disjoint: &[(usize, usize)],
    ) -> DiffInfo {
        let Some(file) = self.files.get(path) else {
            return DiffInfo::default();
        };
        let mut info = DiffInfo::default();
        let mut fragments: Vec<String> = Vec::new();
        let in_range = |line: usize| line >= start && line <= end;
        let claimed_elsewhere = |line: usize| disjoint.iter().any(|&(s, e)| line >= s && line <= e);
        let selects = |l: &DiffLine| match l.kind {
            LineKind::Removed => {
                let previous = l.new_line.saturating_sub(1);
                in_range(previous) || (in_range(l.new_line) && !claimed_elsewhere(previous))
            }
            _ => in_range(l.new_line),
        };

        for hunk in &file.hunks {
            let selected: Vec<&DiffLine> = hunk.lines.iter().filter(|l| selects(l)).collect();
            let added = selected.iter().filter(|l| l.kind == LineKind::Added).count();
            let removed = selected.iter().filter(|l| l.kind == LineKind::Removed).count();
            if added + removed == 0 {
                continue;
            }
            info.added_lines += added;
            info.removed_lines += removed;
            fragments.push(render_fragment(&selected));
        }

        if !fragments.is_empty() {
            info.excerpt = Some(fragments.concat());
        }
        info
    }
}

fn render_fragment(lines: &[&DiffLine]) -> String {
    let old_count = lines.iter().filter(|l| l.kind != LineKind::Added).count();
    let new_count = lines.iter().filter(|l| l.kind != LineKind::Removed).count();
    let first = lines[0];
    let old_start = if old_count == 0 { first.old_line.saturating_sub(1) } else { first.old_line };
    let new_start = if new_count == 0 { first.new_line.saturating_sub(1) } else { first.new_line };

    let mut out = format!("@@ -{old_start},{old_count} +{new_start},{new_count} @@\n");
    for line in lines {
        let marker = match line.kind {
            LineKind::Context => ' ',
            LineKind::Added => '+',
            LineKind::Removed => '-',
        };
        out.push(marker);
        out.push_str(&line.text);
        out.push('\n');
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
