//! Quality metrics computed from tree-sitter syntax trees.
//!
//! Cyclomatic complexity is counted per callable by one structural walk of its
//! sub-tree. The maintainability index is computed per module from a Halstead
//! volume proxy, source lines, summed callable complexity and comment density:
//!
//! ```text
//! MI = (171 - 5.2 ln V - 0.23 G - 16.2 ln L + 50 sin(sqrt(2.4 C))) * 100 / 171
//! ```
//!
//! clipped to `[0, 100]`, with `C` the comment fraction in `[0, 1]`.

use serde::Serialize;
use std::collections::BTreeSet;
use tree_sitter::Node;

// ---------------------------------------------------------------------------
// Ratings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ComplexityRating {
    Low,
    Medium,
    High,
    VeryHigh,
}

impl ComplexityRating {
    pub fn from_complexity(complexity: u32) -> Self {
        match complexity {
            0..=5 => ComplexityRating::Low,
            6..=10 => ComplexityRating::Medium,
            11..=20 => ComplexityRating::High,
            _ => ComplexityRating::VeryHigh,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum MaintainabilityRating {
    High,
    MediumHigh,
    MediumLow,
    Low,
}

impl MaintainabilityRating {
    pub fn from_index(mi: f64) -> Self {
        if mi >= 75.0 {
            MaintainabilityRating::High
        } else if mi >= 65.0 {
            MaintainabilityRating::MediumHigh
        } else if mi >= 40.0 {
            MaintainabilityRating::MediumLow
        } else {
            MaintainabilityRating::Low
        }
    }
}

// ---------------------------------------------------------------------------
// Cyclomatic complexity
// ---------------------------------------------------------------------------

/// Node kinds that add one independent path.
const DECISION_KINDS: &[&str] = &[
    "if_statement",
    "elif_clause",
    "for_statement",
    "while_statement",
    "except_clause",
    "except_group_clause",
    "with_statement",
    "assert_statement",
    "conditional_expression",
    "if_clause",
    "case_clause",
    "boolean_operator",
];

/// Cyclomatic complexity of a callable: 1 plus one per decision point found
/// anywhere under `node`.
pub fn cyclomatic_complexity(node: &Node) -> u32 {
    let mut complexity = 1;
    let mut cursor = node.walk();
    let mut stack = vec![*node];
    while let Some(current) = stack.pop() {
        if DECISION_KINDS.contains(&current.kind()) {
            complexity += 1;
        }
        for child in current.children(&mut cursor) {
            stack.push(child);
        }
    }
    complexity
}

// ---------------------------------------------------------------------------
// Halstead volume
// ---------------------------------------------------------------------------

/// Operand-like leaf kinds. Strings are taken whole.
const OPERAND_KINDS: &[&str] = &["identifier", "integer", "float", "string", "true", "false", "none"];

/// Punctuation that carries no operator meaning.
const PUNCTUATION: &[&str] = &["(", ")", "[", "]", "{", "}", ",", ":", ".", ";"];

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct HalsteadCounts {
    pub distinct_operators: usize,
    pub distinct_operands: usize,
    pub total_operators: usize,
    pub total_operands: usize,
}

impl HalsteadCounts {
    /// `N * log2(n)` or 0 for a vocabulary of fewer than two tokens.
    pub fn volume(&self) -> f64 {
        let vocabulary = self.distinct_operators + self.distinct_operands;
        let length = self.total_operators + self.total_operands;
        if vocabulary < 2 || length == 0 {
            return 0.0;
        }
        length as f64 * (vocabulary as f64).log2()
    }
}

pub fn halstead_counts(root: &Node, source: &[u8]) -> HalsteadCounts {
    let mut operators: BTreeSet<&str> = BTreeSet::new();
    let mut operands: BTreeSet<&[u8]> = BTreeSet::new();
    let mut counts = HalsteadCounts::default();

    let mut cursor = root.walk();
    let mut stack = vec![*root];
    while let Some(node) = stack.pop() {
        let kind = node.kind();
        if kind == "comment" {
            continue;
        }
        if OPERAND_KINDS.contains(&kind) {
            operands.insert(&source[node.byte_range()]);
            counts.total_operands += 1;
            continue;
        }
        if node.child_count() == 0 {
            if !node.is_named() && !PUNCTUATION.contains(&kind) {
                operators.insert(kind);
                counts.total_operators += 1;
            }
            continue;
        }
        for child in node.children(&mut cursor) {
            stack.push(child);
        }
    }

    counts.distinct_operators = operators.len();
    counts.distinct_operands = operands.len();
    counts
}

// ---------------------------------------------------------------------------
// Line statistics
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LineStats {
    /// Lines with any non-whitespace content.
    pub non_blank: usize,
    /// Non-blank lines that hold only a comment.
    pub comment_only: usize,
    /// Lines carrying a comment or belonging to a docstring.
    pub commentary: usize,
}

impl LineStats {
    /// Source lines of code: non-blank lines that are not comment-only.
    pub fn sloc(&self) -> usize {
        self.non_blank.saturating_sub(self.comment_only)
    }

    /// Fraction of non-blank lines that are commentary, in `[0, 1]`.
    pub fn comment_fraction(&self) -> f64 {
        if self.non_blank == 0 {
            return 0.0;
        }
        (self.commentary as f64 / self.non_blank as f64).min(1.0)
    }
}

/// Count line statistics. `docstring_lines` are 1-based inclusive ranges.
pub fn line_stats(root: &Node, text: &str, docstring_lines: &[(usize, usize)]) -> LineStats {
    let lines: Vec<&str> = text.lines().collect();
    let mut comment_rows: BTreeSet<usize> = BTreeSet::new();

    let mut cursor = root.walk();
    let mut stack = vec![*root];
    while let Some(node) = stack.pop() {
        if node.kind() == "comment" {
            comment_rows.insert(node.start_position().row);
            continue;
        }
        for child in node.children(&mut cursor) {
            stack.push(child);
        }
    }

    let mut stats = LineStats::default();
    for (row, line) in lines.iter().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        stats.non_blank += 1;
        let lineno = row + 1;
        let in_docstring = docstring_lines
            .iter()
            .any(|&(start, end)| lineno >= start && lineno <= end);
        if comment_rows.contains(&row) {
            stats.commentary += 1;
            if trimmed.starts_with('#') {
                stats.comment_only += 1;
            }
        } else if in_docstring {
            stats.commentary += 1;
        }
    }
    stats
}

// ---------------------------------------------------------------------------
// Maintainability index
// ---------------------------------------------------------------------------

/// Combine the module measures into a 0-100 score, rounded to two decimals.
/// `complexity` is the summed complexity of the module's callables.
pub fn maintainability_index(volume: f64, complexity: u32, sloc: usize, comment_fraction: f64) -> f64 {
    if volume <= 0.0 || sloc == 0 {
        return 100.0;
    }
    let c = comment_fraction.clamp(0.0, 1.0);
    let raw = 171.0 - 5.2 * volume.ln() - 0.23 * complexity.max(1) as f64 - 16.2 * (sloc as f64).ln()
        + 50.0 * (2.4 * c).sqrt().sin();
    let normalized = (raw * 100.0 / 171.0).clamp(0.0, 100.0);
    (normalized * 100.0).round() / 100.0
}

/// Maintainability index for a parsed module.
pub fn module_maintainability(
    root: &Node,
    text: &str,
    docstring_lines: &[(usize, usize)],
    complexity: u32,
) -> f64 {
    let volume = halstead_counts(root, text.as_bytes()).volume();
    let stats = line_stats(root, text, docstring_lines);
    maintainability_index(volume, complexity, stats.sloc(), stats.comment_fraction())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tree_sitter::{Parser, Tree};

    fn parse(src: &str) -> Tree {
        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_python::LANGUAGE.into())
            .unwrap();
        parser.parse(src, None).unwrap()
    }

    fn complexity_of(src: &str) -> u32 {
        let tree = parse(src);
        let root = tree.root_node();
        let func = root.named_child(0).unwrap();
        assert_eq!(func.kind(), "function_definition");
        cyclomatic_complexity(&func.child_by_field_name("body").unwrap())
    }

    #[test]
    fn test_straight_line_function_is_one() {
        assert_eq!(complexity_of("def f():\n    x = 1\n    return x\n"), 1);
    }

    #[test]
    fn test_single_if_adds_one() {
        assert_eq!(complexity_of("def f(a):\n    if a:\n        return 1\n    return 0\n"), 2);
    }

    #[test]
    fn test_if_with_and_adds_two() {
        let src = "def f(a, b):\n    if a and b:\n        return 1\n    return 0\n";
        assert_eq!(complexity_of(src), 3);
    }

    #[test]
    fn test_decision_points_counted() {
        let src = r#"
def f(items):
    for x in items:
        if x > 1:
            pass
        elif x < 0 or x == -5:
            pass
    while False:
        break
    try:
        pass
    except ValueError:
        pass
    with open("p") as fh:
        pass
    assert items
    y = 1 if items else 2
    return [i for i in items if i]
"#;
        // for, if, elif, or, while, except, with, assert, ternary, comprehension filter
        assert_eq!(complexity_of(src.trim_start()), 11);
    }

    #[test]
    fn test_except_star_counted() {
        let src = "def f():\n    try:\n        pass\n    except* ValueError:\n        pass\n    except* (TypeError, KeyError):\n        pass\n";
        assert_eq!(complexity_of(src), 3);
    }

    #[test]
    fn test_match_cases_counted() {
        let src = "def f(v):\n    match v:\n        case 1:\n            pass\n        case _:\n            pass\n";
        assert_eq!(complexity_of(src), 3);
    }

    #[test]
    fn test_complexity_ratings() {
        assert_eq!(ComplexityRating::from_complexity(1), ComplexityRating::Low);
        assert_eq!(ComplexityRating::from_complexity(5), ComplexityRating::Low);
        assert_eq!(ComplexityRating::from_complexity(6), ComplexityRating::Medium);
        assert_eq!(ComplexityRating::from_complexity(20), ComplexityRating::High);
        assert_eq!(ComplexityRating::from_complexity(21), ComplexityRating::VeryHigh);
        let json = serde_json::to_string(&ComplexityRating::VeryHigh).unwrap();
        assert_eq!(json, "\"very-high\"");
    }

    #[test]
    fn test_maintainability_ratings() {
        assert_eq!(MaintainabilityRating::from_index(100.0), MaintainabilityRating::High);
        assert_eq!(MaintainabilityRating::from_index(75.0), MaintainabilityRating::High);
        assert_eq!(MaintainabilityRating::from_index(70.0), MaintainabilityRating::MediumHigh);
        assert_eq!(MaintainabilityRating::from_index(40.0), MaintainabilityRating::MediumLow);
        assert_eq!(MaintainabilityRating::from_index(39.9), MaintainabilityRating::Low);
        let json = serde_json::to_string(&MaintainabilityRating::MediumHigh).unwrap();
        assert_eq!(json, "\"medium-high\"");
    }

    #[test]
    fn test_maintainability_is_monotonic() {
        let base = maintainability_index(500.0, 5, 60, 0.2);
        assert!(maintainability_index(500.0, 15, 60, 0.2) <= base, "More complexity must not raise MI");
        assert!(maintainability_index(500.0, 5, 60, 0.05) <= base, "Fewer comments must not raise MI");
        assert!(maintainability_index(500.0, 5, 60, 1.0) >= base);
        for step in 0..=10 {
            let mi = maintainability_index(1e9, 500, 100_000, step as f64 / 10.0);
            assert!((0.0..=100.0).contains(&mi), "MI out of bounds: {mi}");
        }
    }

    #[test]
    fn test_empty_module_scores_full() {
        assert_eq!(maintainability_index(0.0, 1, 0, 0.0), 100.0);
    }

    #[test]
    fn test_halstead_counts() {
        let src = "x = a + b\ny = a + 1\n";
        let tree = parse(src);
        let counts = halstead_counts(&tree.root_node(), src.as_bytes());
        // operators: = + ; operands: x a b y 1
        assert_eq!(counts.distinct_operators, 2);
        assert_eq!(counts.total_operators, 4);
        assert_eq!(counts.distinct_operands, 5);
        assert_eq!(counts.total_operands, 6);
        assert!(counts.volume() > 0.0);
    }

    #[test]
    fn test_line_stats() {
        let src = "\"\"\"Doc.\n\nMore.\"\"\"\n# comment\nx = 1  # trailing\n\ny = 2\n";
        let tree = parse(src);
        let stats = line_stats(&tree.root_node(), src, &[(1, 3)]);
        assert_eq!(stats.non_blank, 5);
        assert_eq!(stats.comment_only, 1);
        assert_eq!(stats.commentary, 4);
        assert_eq!(stats.sloc(), 4);
    }
}
