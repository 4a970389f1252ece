//! The assembled code graph: entities connected by containment, import,
//! inheritance and call relations.
//!
//! A [`Graph`] is built once per run by [`assemble`] and never mutated. Node
//! ids are derived from kind and qualified name only, so they are stable
//! across runs and independent of extraction order.

use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use tracing::debug;

use crate::diff::{DiffInfo, DiffOverlay};
use crate::error::{Error, Result};
use crate::extract::FileExtract;
use crate::metrics::{ComplexityRating, MaintainabilityRating};

// ---------------------------------------------------------------------------
// Core types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Module,
    Class,
    Function,
    Method,
}

impl EntityKind {
    pub fn label(&self) -> &'static str {
        match self {
            EntityKind::Module => "module",
            EntityKind::Class => "class",
            EntityKind::Function => "function",
            EntityKind::Method => "method",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    Contains,
    Imports,
    Inherits,
    Calls,
}

impl RelationKind {
    pub fn label(&self) -> &'static str {
        match self {
            RelationKind::Contains => "contains",
            RelationKind::Imports => "imports",
            RelationKind::Inherits => "inherits",
            RelationKind::Calls => "calls",
        }
    }
}

/// `<kind>:<qualified_name>`, with `#n` appended for the n-th duplicate.
pub fn node_id(kind: EntityKind, qualified_name: &str, ordinal: usize) -> String {
    if ordinal > 1 {
        format!("{}:{}#{}", kind.label(), qualified_name, ordinal)
    } else {
        format!("{}:{}", kind.label(), qualified_name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Entity {
    pub id: String,
    pub kind: EntityKind,
    /// Short display name. Modules use their dotted name.
    pub label: String,
    pub qualified_name: String,
    pub path: String,
    pub line_start: usize,
    pub line_end: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docstring: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub complexity: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub complexity_rating: Option<ComplexityRating>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maintainability: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maintainability_rating: Option<MaintainabilityRating>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diff_info: Option<DiffInfo>,
    /// Parameter names of functions and methods.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<String>,
    /// Class-body attribute names.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attributes: Vec<String>,
}

/// A directed, typed edge. Ordering is `(source_id, target_id, kind)`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Relation {
    pub source_id: String,
    pub target_id: String,
    pub kind: RelationKind,
}

impl Relation {
    pub fn new(source_id: &str, target_id: &str, kind: RelationKind) -> Self {
        Relation {
            source_id: source_id.to_string(),
            target_id: target_id.to_string(),
            kind,
        }
    }
}

// ---------------------------------------------------------------------------
// Graph
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct Graph {
    nodes: BTreeMap<String, Entity>,
    edges: BTreeSet<Relation>,
}

/// Serialises as `{ "nodes": [...], "edges": [...] }`, nodes sorted by id.
impl Serialize for Graph {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Graph", 2)?;
        let nodes: Vec<&Entity> = self.nodes.values().collect();
        state.serialize_field("nodes", &nodes)?;
        state.serialize_field("edges", &self.edges)?;
        state.end()
    }
}

impl Graph {
    pub fn node(&self, id: &str) -> Option<&Entity> {
        self.nodes.get(id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Entity> {
        self.nodes.values()
    }

    pub fn edges(&self) -> impl Iterator<Item = &Relation> {
        self.edges.iter()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn node_counts(&self) -> BTreeMap<EntityKind, usize> {
        let mut counts = BTreeMap::new();
        for node in self.nodes.values() {
            *counts.entry(node.kind).or_insert(0) += 1;
        }
        counts
    }

    pub fn edge_counts(&self) -> BTreeMap<RelationKind, usize> {
        let mut counts = BTreeMap::new();
        for edge in &self.edges {
            *counts.entry(edge.kind).or_insert(0) += 1;
        }
        counts
    }

    /// The `Contains` parent of a node (`None` for modules).
    pub fn parent_of(&self, id: &str) -> Option<&str> {
        self.edges
            .iter()
            .find(|e| e.kind == RelationKind::Contains && e.target_id == id)
            .map(|e| e.source_id.as_str())
    }

    /// Find a module by exact dotted name or by a unique dotted suffix.
    pub fn find_module(&self, name: &str) -> Result<&Entity> {
        let modules = || self.nodes.values().filter(|n| n.kind == EntityKind::Module);
        if let Some(exact) = modules().find(|m| m.qualified_name == name) {
            return Ok(exact);
        }
        let suffix = format!(".{name}");
        let matches: Vec<&Entity> = modules().filter(|m| m.qualified_name.ends_with(&suffix)).collect();
        match matches.as_slice() {
            [only] => Ok(*only),
            [] => Err(Error::NotFound(format!("module {name}"))),
            many => Err(Error::NotFound(format!(
                "module {name} is ambiguous ({})",
                many.iter().map(|m| m.qualified_name.as_str()).collect::<Vec<_>>().join(", ")
            ))),
        }
    }

    /// Restrict the graph to one module and its one-hop neighbourhood: the
    /// module's own subtree, every direct import/call/inheritance target of
    /// that subtree with the target's containers, and the methods of every
    /// included class.
    pub fn focus(&self, module: &str) -> Result<Graph> {
        let root = self.find_module(module)?.id.clone();

        let mut children: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        let mut parents: BTreeMap<&str, &str> = BTreeMap::new();
        let mut outgoing: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for edge in &self.edges {
            if edge.kind == RelationKind::Contains {
                children.entry(edge.source_id.as_str()).or_default().push(edge.target_id.as_str());
                parents.insert(edge.target_id.as_str(), edge.source_id.as_str());
            } else {
                outgoing.entry(edge.source_id.as_str()).or_default().push(edge.target_id.as_str());
            }
        }

        let mut keep: BTreeSet<&str> = BTreeSet::new();
        let mut queue: VecDeque<&str> = VecDeque::from([root.as_str()]);
        while let Some(id) = queue.pop_front() {
            if keep.insert(id) {
                queue.extend(children.get(id).into_iter().flatten().copied());
            }
        }

        let subtree: Vec<&str> = keep.iter().copied().collect();
        for id in subtree {
            for &target in outgoing.get(id).into_iter().flatten() {
                let mut current = Some(target);
                while let Some(node) = current {
                    if !keep.insert(node) {
                        break;
                    }
                    current = parents.get(node).copied();
                }
            }
        }

        let classes: Vec<&str> = keep
            .iter()
            .copied()
            .filter(|id| self.nodes.get(*id).is_some_and(|n| n.kind == EntityKind::Class))
            .collect();
        for class in classes {
            for &child in children.get(class).into_iter().flatten() {
                keep.insert(child);
            }
        }

        let nodes: BTreeMap<String, Entity> = keep
            .iter()
            .filter_map(|id| self.nodes.get(*id).map(|n| (n.id.clone(), n.clone())))
            .collect();
        let edges: BTreeSet<Relation> = self
            .edges
            .iter()
            .filter(|e| nodes.contains_key(&e.source_id) && nodes.contains_key(&e.target_id))
            .cloned()
            .collect();

        debug!(module = %root, nodes = nodes.len(), edges = edges.len(), "Graph focused");
        Ok(Graph { nodes, edges })
    }
}

// ---------------------------------------------------------------------------
// Assembly
// ---------------------------------------------------------------------------

fn insert_unique(nodes: &mut BTreeMap<String, Entity>, entity: Entity) -> Result<()> {
    if let Some(existing) = nodes.get(&entity.id) {
        return Err(Error::InvariantViolation(format!(
            "duplicate node id {} ({} and {})",
            entity.id, existing.path, entity.path
        )));
    }
    nodes.insert(entity.id.clone(), entity);
    Ok(())
}

/// Merge declarations, metrics, resolved edges and the optional diff overlay
/// into one graph. Fails only when an edge points outside the node set or two
/// entities share an id.
pub fn assemble(
    extracts: &[FileExtract],
    resolved: &BTreeSet<Relation>,
    overlay: Option<&DiffOverlay>,
) -> Result<Graph> {
    let start = std::time::Instant::now();
    let mut nodes: BTreeMap<String, Entity> = BTreeMap::new();
    let mut edges: BTreeSet<Relation> = BTreeSet::new();

    for file in extracts {
        let module_id = file.module_id();
        let diff_for = |line_start: usize, line_end: usize, disjoint: &[(usize, usize)]| {
            overlay.map(|o| o.annotate(&file.path, line_start, line_end, disjoint))
        };
        let ranges: Vec<(usize, usize)> =
            file.declarations.iter().map(|d| (d.line_start, d.line_end)).collect();

        insert_unique(
            &mut nodes,
            Entity {
                id: module_id.clone(),
                kind: EntityKind::Module,
                label: file.module.clone(),
                qualified_name: file.module.clone(),
                path: file.path.clone(),
                line_start: 1,
                line_end: file.line_count,
                docstring: file.docstring.clone(),
                complexity: None,
                complexity_rating: None,
                maintainability: Some(file.maintainability),
                maintainability_rating: Some(MaintainabilityRating::from_index(file.maintainability)),
                // Whole-file range, so deletions at end of file still count.
                diff_info: diff_for(1, usize::MAX, &[]),
                parameters: Vec::new(),
                attributes: Vec::new(),
            },
        )?;

        let ids: Vec<String> = file.declarations.iter().map(|d| d.id()).collect();
        for (decl, id) in file.declarations.iter().zip(&ids) {
            if decl.line_start > decl.line_end {
                return Err(Error::InvariantViolation(format!("inverted line range on {id}")));
            }
            let disjoint: Vec<(usize, usize)> = ranges
                .iter()
                .copied()
                .filter(|&(s, e)| e < decl.line_start || s > decl.line_end)
                .collect();
            insert_unique(
                &mut nodes,
                Entity {
                    id: id.clone(),
                    kind: decl.kind,
                    label: decl.name.clone(),
                    qualified_name: decl.qualified_name.clone(),
                    path: file.path.clone(),
                    line_start: decl.line_start,
                    line_end: decl.line_end,
                    docstring: decl.docstring.clone(),
                    complexity: decl.complexity,
                    complexity_rating: decl.complexity.map(ComplexityRating::from_complexity),
                    maintainability: None,
                    maintainability_rating: None,
                    diff_info: diff_for(decl.line_start, decl.line_end, &disjoint),
                    parameters: decl.parameters.clone(),
                    attributes: decl.attributes.clone(),
                },
            )?;
            let parent = match decl.parent {
                Some(p) => &ids[p],
                None => &module_id,
            };
            edges.insert(Relation::new(parent, id, RelationKind::Contains));
        }
    }

    for relation in resolved {
        for endpoint in [&relation.source_id, &relation.target_id] {
            if !nodes.contains_key(endpoint) {
                return Err(Error::InvariantViolation(format!(
                    "{} edge {} -> {} references unknown node {}",
                    relation.kind.label(),
                    relation.source_id,
                    relation.target_id,
                    endpoint
                )));
            }
        }
        edges.insert(relation.clone());
    }

    debug!(
        nodes = nodes.len(),
        edges = edges.len(),
        time_ms = start.elapsed().as_millis() as u64,
        "Graph assembled"
    );
    Ok(Graph { nodes, edges })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::parse_source;
    use crate::resolve::resolve;
    use crate::symbols::SymbolTable;

    fn build(files: &[(&str, &str)]) -> Graph {
        let extracts: Vec<FileExtract> = files
            .iter()
            .map(|(path, src)| parse_source(path, src.to_string()).unwrap())
            .collect();
        let table = SymbolTable::build(&extracts);
        let resolved = resolve(&extracts, &table);
        assemble(&extracts, &resolved.relations, None).unwrap()
    }

    fn ids(graph: &Graph) -> Vec<&str> {
        graph.nodes().map(|n| n.id.as_str()).collect()
    }

    #[test]
    fn test_node_ids() {
        assert_eq!(node_id(EntityKind::Function, "a.f", 1), "function:a.f");
        assert_eq!(node_id(EntityKind::Method, "a.C.m", 2), "method:a.C.m#2");
    }

    #[test]
    fn test_contains_edges() {
        let g = build(&[(
            "m.py",
            "class C:\n    def a(self):\n        pass\n\ndef f():\n    pass\n",
        )]);
        assert_eq!(ids(&g), vec!["class:m.C", "function:m.f", "method:m.C.a", "module:m"]);
        let contains: Vec<(&str, &str)> = g
            .edges()
            .filter(|e| e.kind == RelationKind::Contains)
            .map(|e| (e.source_id.as_str(), e.target_id.as_str()))
            .collect();
        assert_eq!(
            contains,
            vec![("class:m.C", "method:m.C.a"), ("module:m", "class:m.C"), ("module:m", "function:m.f")]
        );
        assert_eq!(g.parent_of("method:m.C.a"), Some("class:m.C"));
        assert_eq!(g.parent_of("module:m"), None);
    }

    #[test]
    fn test_edge_to_unknown_node_is_invariant_violation() {
        let extract = parse_source("m.py", "def f():\n    pass\n".to_string()).unwrap();
        let bogus: BTreeSet<Relation> =
            [Relation::new("function:m.f", "function:ghost.g", RelationKind::Calls)].into();
        let err = assemble(&[extract], &bogus, None).unwrap_err();
        assert!(matches!(err, Error::InvariantViolation(_)), "Unexpected error: {err}");
    }

    #[test]
    fn test_metrics_attached() {
        let g = build(&[("m.py", "def f(x):\n    if x:\n        return 1\n    return 2\n")]);
        let f = g.node("function:m.f").unwrap();
        assert_eq!(f.complexity, Some(2));
        assert_eq!(f.complexity_rating, Some(ComplexityRating::Low));
        assert!(f.maintainability.is_none());
        let m = g.node("module:m").unwrap();
        assert!(m.maintainability.is_some_and(|mi| (0.0..=100.0).contains(&mi)));
        assert!(m.complexity.is_none());
        assert!(m.diff_info.is_none());
    }

    #[test]
    fn test_json_shape() {
        let g = build(&[("m.py", "def f():\n    pass\n")]);
        let json = serde_json::to_value(&g).unwrap();
        let nodes = json["nodes"].as_array().unwrap();
        assert_eq!(nodes[0]["id"], "function:m.f");
        assert_eq!(nodes[0]["kind"], "function");
        assert_eq!(nodes[0]["label"], "f");
        assert_eq!(nodes[0]["complexity_rating"], "low");
        assert!(nodes[0].get("diff_info").is_none());
        assert!(nodes[0].get("parameters").is_none());
        assert!(nodes[1].get("attributes").is_none());
        assert_eq!(nodes[1]["label"], "m");
        let edge = &json["edges"][0];
        assert_eq!(edge["source_id"], "module:m");
        assert_eq!(edge["target_id"], "function:m.f");
        assert_eq!(edge["kind"], "contains");
    }

    #[test]
    fn test_parameters_and_attributes_serialized() {
        let g = build(&[(
            "m.py",
            "class C:\n    size = 3\n\n    def grow(self, by=1):\n        pass\n",
        )]);
        let class = g.node("class:m.C").unwrap();
        assert_eq!(class.attributes, vec!["size"]);
        let json = serde_json::to_value(class).unwrap();
        assert_eq!(json["attributes"], serde_json::json!(["size"]));
        assert!(json.get("parameters").is_none());

        let grow = serde_json::to_value(g.node("method:m.C.grow").unwrap()).unwrap();
        assert_eq!(grow["parameters"], serde_json::json!(["self", "by"]));
        assert!(grow.get("attributes").is_none());
    }

    #[test]
    fn test_overlay_counts_removed_tail_on_function() {
        let src = "def f(x):\n    x += 1\n\ndef g():\n    pass\n";
        let patch = "\
--- a/m.py
+++ b/m.py
@@ -1,6 +1,5 @@
 def f(x):
     x += 1
-    return x

 def g():
     pass
";
        let extract = parse_source("m.py", src.to_string()).unwrap();
        let overlay = DiffOverlay::parse(patch);
        let g = assemble(&[extract], &BTreeSet::new(), Some(&overlay)).unwrap();

        let f = g.node("function:m.f").unwrap().diff_info.clone().unwrap();
        assert_eq!((f.added_lines, f.removed_lines), (0, 1));
        let other = g.node("function:m.g").unwrap().diff_info.clone().unwrap();
        assert_eq!((other.added_lines, other.removed_lines), (0, 0));
        let module = g.node("module:m").unwrap().diff_info.clone().unwrap();
        assert_eq!(module.removed_lines, 1);
    }

    #[test]
    fn test_focus_one_hop() {
        let g = build(&[
            ("a.py", "def f():\n    pass\n\ndef unrelated():\n    pass\n"),
            ("b.py", "from a import f\n\ndef g():\n    f()\n"),
            ("c.py", "def h():\n    pass\n"),
        ]);
        let focused = g.focus("b").unwrap();
        assert_eq!(ids(&focused), vec!["function:a.f", "function:b.g", "module:a", "module:b"]);
        assert!(focused.edges().all(|e| focused.node(&e.source_id).is_some()
            && focused.node(&e.target_id).is_some()));
    }

    #[test]
    fn test_focus_includes_methods_of_target_class() {
        let g = build(&[
            ("shapes.py", "class Sq:\n    def area(self):\n        pass\n"),
            ("app.py", "from shapes import Sq\n\ndef main():\n    Sq()\n"),
        ]);
        let focused = g.focus("app").unwrap();
        assert!(focused.node("method:shapes.Sq.area").is_some());
        assert!(focused.node("module:shapes").is_some());
    }

    #[test]
    fn test_find_module_by_suffix() {
        let g = build(&[
            ("pkg/__init__.py", ""),
            ("pkg/sub/mod.py", ""),
            ("other/mod.py", ""),
        ]);
        assert_eq!(g.find_module("sub.mod").unwrap().qualified_name, "pkg.sub.mod");
        assert!(matches!(g.find_module("mod"), Err(Error::NotFound(_))));
        assert!(matches!(g.focus("nope"), Err(Error::NotFound(_))));
    }
}
