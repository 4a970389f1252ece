//! Per-file extraction with tree-sitter.
//!
//! Turns one Python source into its declarations (classes, functions,
//! methods with line ranges), raw references (imports, call names, base-class
//! expressions) and per-entity metrics. Each file is handled in isolation so
//! the whole pass fans out over rayon without shared state.

use rayon::prelude::*;
use std::collections::BTreeMap;
use tracing::{debug, warn};
use tree_sitter::{Node, Parser};

use crate::error::ParseError;
use crate::graph::{node_id, EntityKind};
use crate::metrics;
use crate::scan::{is_package_init, module_name_for_path};
use crate::types::{ScannedFile, MAX_FILE_READ};

// ---------------------------------------------------------------------------
// Core types
// ---------------------------------------------------------------------------

/// A name referenced in call position, as written.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum RawCall {
    /// `f()` or a dotted chain of identifiers such as `mod.Cls.f()`.
    Path(String),
    /// `self.m()` or `cls.m()` inside a method body.
    SelfMethod(String),
}

/// One import binding as written in the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawImport {
    /// Number of leading dots (0 for absolute imports).
    pub level: usize,
    /// Dotted module path after the dots. Empty for `from . import x`.
    pub module: String,
    /// Imported name for `from` imports, `*` for wildcards, `None` for `import m`.
    pub name: Option<String>,
    pub alias: Option<String>,
    pub line: usize,
}

impl RawImport {
    pub fn is_wildcard(&self) -> bool {
        self.name.as_deref() == Some("*")
    }

    /// The name this import binds in the importing module.
    /// `import a.b` binds the full dotted path `a.b`.
    pub fn local_name(&self) -> String {
        if let Some(alias) = &self.alias {
            return alias.clone();
        }
        match &self.name {
            Some(name) => name.clone(),
            None => self.module.clone(),
        }
    }
}

/// A class, function or method declared in a file.
#[derive(Debug, Clone)]
pub struct Declaration {
    pub kind: EntityKind,
    pub name: String,
    /// Fully qualified dotted name, including the module.
    pub qualified_name: String,
    /// 1 for the first definition of this name and kind in the file.
    pub ordinal: usize,
    /// Index of the enclosing class declaration (methods only).
    pub parent: Option<usize>,
    pub line_start: usize,
    pub line_end: usize,
    pub docstring: Option<String>,
    /// Literal base-class expressions (classes only).
    pub bases: Vec<String>,
    /// Names called anywhere in the body (callables only).
    pub calls: Vec<RawCall>,
    pub complexity: Option<u32>,
    /// Parameter names in declaration order, without `*`/`**` (callables only).
    pub parameters: Vec<String>,
    /// Names assigned directly in the class body (classes only).
    pub attributes: Vec<String>,
}

impl Declaration {
    pub fn id(&self) -> String {
        node_id(self.kind, &self.qualified_name, self.ordinal)
    }
}

/// Everything extracted from one source file.
#[derive(Debug, Clone)]
pub struct FileExtract {
    /// Root-relative `/`-separated path.
    pub path: String,
    pub module: String,
    pub is_package: bool,
    /// File content exactly as analysed.
    pub text: String,
    pub line_count: usize,
    pub docstring: Option<String>,
    pub maintainability: f64,
    pub declarations: Vec<Declaration>,
    pub imports: Vec<RawImport>,
}

impl FileExtract {
    pub fn module_id(&self) -> String {
        node_id(EntityKind::Module, &self.module, 1)
    }
}

// ---------------------------------------------------------------------------
// Node helpers
// ---------------------------------------------------------------------------

fn text_of<'a>(node: &Node, source: &'a [u8]) -> &'a str {
    node.utf8_text(source).unwrap_or("")
}

/// `a.b.c` for an identifier or a chain of attribute accesses on identifiers.
fn dotted_segments(node: &Node, source: &[u8]) -> Option<Vec<String>> {
    let mut segments = Vec::new();
    let mut current = *node;
    loop {
        match current.kind() {
            "identifier" => {
                segments.push(text_of(&current, source).to_string());
                break;
            }
            "attribute" => {
                let attr = current.child_by_field_name("attribute")?;
                segments.push(text_of(&attr, source).to_string());
                current = current.child_by_field_name("object")?;
            }
            _ => return None,
        }
    }
    segments.reverse();
    Some(segments)
}

/// Leading whitespace, counted in chars.
fn leading_whitespace(line: &str) -> usize {
    line.chars().take_while(|c| c.is_whitespace()).count()
}

/// Drop up to `indent` leading whitespace chars.
fn strip_indent(line: &str, indent: usize) -> &str {
    let cut = line
        .char_indices()
        .take(indent)
        .take_while(|(_, c)| c.is_whitespace())
        .last()
        .map_or(0, |(i, c)| i + c.len_utf8());
    &line[cut..]
}

/// Strip prefix, quotes and common indentation from a string literal.
fn clean_docstring(raw: &str) -> Option<String> {
    let body = raw.trim_start_matches(|c: char| "rRuUbBfF".contains(c));
    let inner = ["\"\"\"", "'''", "\"", "'"]
        .iter()
        .find_map(|q| body.strip_prefix(q).and_then(|s| s.strip_suffix(q)))?;

    let mut lines = inner.lines();
    let first = lines.next().unwrap_or("").trim();
    let rest: Vec<&str> = lines.collect();
    let indent = rest
        .iter()
        .filter(|l| !l.trim().is_empty())
        .map(|l| leading_whitespace(l))
        .min()
        .unwrap_or(0);

    let mut out: Vec<&str> = vec![first];
    for line in &rest {
        out.push(strip_indent(line, indent).trim_end());
    }
    while out.last().is_some_and(|l| l.is_empty()) {
        out.pop();
    }
    while out.first().is_some_and(|l| l.is_empty()) {
        out.remove(0);
    }
    let doc = out.join("\n");
    if doc.is_empty() {
        None
    } else {
        Some(doc)
    }
}

/// Docstring of a module root or a definition body, with its 1-based line range.
fn docstring_of(body: &Node, source: &[u8]) -> Option<(String, (usize, usize))> {
    let mut cursor = body.walk();
    let first = body
        .named_children(&mut cursor)
        .find(|n| n.kind() != "comment")?;
    if first.kind() != "expression_statement" || first.named_child_count() != 1 {
        return None;
    }
    let string = first.named_child(0)?;
    if string.kind() != "string" {
        return None;
    }
    let range = (string.start_position().row + 1, string.end_position().row + 1);
    clean_docstring(text_of(&string, source)).map(|doc| (doc, range))
}

fn first_error_line(root: &Node) -> Option<(usize, bool)> {
    let mut cursor = root.walk();
    let mut stack = vec![*root];
    let mut best: Option<(usize, bool)> = None;
    while let Some(node) = stack.pop() {
        if node.is_error() || node.is_missing() {
            let line = node.start_position().row + 1;
            if best.map_or(true, |(l, _)| line < l) {
                best = Some((line, node.is_missing()));
            }
            continue;
        }
        if node.has_error() {
            for child in node.children(&mut cursor) {
                stack.push(child);
            }
        }
    }
    best
}

// ---------------------------------------------------------------------------
// Reference collection
// ---------------------------------------------------------------------------

fn collect_calls(body: &Node, source: &[u8], in_method: bool) -> Vec<RawCall> {
    let mut calls = Vec::new();
    let mut cursor = body.walk();
    let mut stack = vec![*body];
    while let Some(node) = stack.pop() {
        if node.kind() == "call" {
            if let Some(call) = node
                .child_by_field_name("function")
                .and_then(|f| classify_call(&f, source, in_method))
            {
                calls.push(call);
            }
        }
        for child in node.children(&mut cursor) {
            stack.push(child);
        }
    }
    calls.sort();
    calls.dedup();
    calls
}

fn classify_call(function: &Node, source: &[u8], in_method: bool) -> Option<RawCall> {
    let segments = dotted_segments(function, source)?;
    let receiver_is_self = in_method && matches!(segments[0].as_str(), "self" | "cls");
    match (receiver_is_self, segments.len()) {
        (true, 2) => Some(RawCall::SelfMethod(segments[1].clone())),
        (true, _) => None,
        (false, _) => Some(RawCall::Path(segments.join("."))),
    }
}

fn collect_bases(class: &Node, source: &[u8]) -> Vec<String> {
    let Some(args) = class.child_by_field_name("superclasses") else {
        return Vec::new();
    };
    let mut bases = Vec::new();
    let mut cursor = args.walk();
    for child in args.named_children(&mut cursor) {
        let expr = match child.kind() {
            "subscript" => match child.child_by_field_name("value") {
                Some(value) => value,
                None => continue,
            },
            _ => child,
        };
        if let Some(segments) = dotted_segments(&expr, source) {
            bases.push(segments.join("."));
        }
    }
    bases
}

fn parameter_name(node: &Node, source: &[u8]) -> Option<String> {
    match node.kind() {
        "identifier" => Some(text_of(node, source).to_string()),
        "default_parameter" | "typed_default_parameter" => node
            .child_by_field_name("name")
            .and_then(|name| parameter_name(&name, source)),
        "typed_parameter" | "list_splat_pattern" | "dictionary_splat_pattern" => node
            .named_child(0)
            .and_then(|inner| parameter_name(&inner, source)),
        _ => None,
    }
}

fn collect_parameters(def: &Node, source: &[u8]) -> Vec<String> {
    let Some(params) = def.child_by_field_name("parameters") else {
        return Vec::new();
    };
    let mut cursor = params.walk();
    params
        .named_children(&mut cursor)
        .filter_map(|p| parameter_name(&p, source))
        .collect()
}

fn push_targets(target: &Node, source: &[u8], out: &mut Vec<String>) {
    match target.kind() {
        "identifier" => {
            let name = text_of(target, source).to_string();
            if !out.contains(&name) {
                out.push(name);
            }
        }
        "pattern_list" | "tuple_pattern" | "list_pattern" => {
            let mut cursor = target.walk();
            for child in target.named_children(&mut cursor) {
                push_targets(&child, source, out);
            }
        }
        _ => {}
    }
}

/// Names bound by plain or annotated assignments at class-body level.
fn collect_attributes(body: &Node, source: &[u8]) -> Vec<String> {
    let mut attributes = Vec::new();
    let mut cursor = body.walk();
    for statement in body.named_children(&mut cursor) {
        if statement.kind() != "expression_statement" {
            continue;
        }
        let mut next = statement.named_child(0);
        while let Some(assignment) = next.filter(|n| n.kind() == "assignment") {
            if let Some(left) = assignment.child_by_field_name("left") {
                push_targets(&left, source, &mut attributes);
            }
            next = assignment.child_by_field_name("right");
        }
    }
    attributes
}

fn collect_imports(root: &Node, source: &[u8]) -> Vec<RawImport> {
    let mut imports = Vec::new();
    let mut cursor = root.walk();
    let mut stack = vec![*root];
    while let Some(node) = stack.pop() {
        match node.kind() {
            "import_statement" => imports.extend(plain_imports(&node, source)),
            "import_from_statement" => imports.extend(from_imports(&node, source)),
            _ => {
                for child in node.children(&mut cursor) {
                    stack.push(child);
                }
            }
        }
    }
    imports.sort_by_key(|i| i.line);
    imports
}

/// Name and optional alias of a `dotted_name` or `aliased_import` node.
fn name_and_alias(node: &Node, source: &[u8]) -> Option<(String, Option<String>)> {
    match node.kind() {
        "dotted_name" => Some((text_of(node, source).to_string(), None)),
        "aliased_import" => {
            let name = node.child_by_field_name("name")?;
            let alias = node
                .child_by_field_name("alias")
                .map(|a| text_of(&a, source).to_string());
            Some((text_of(&name, source).to_string(), alias))
        }
        _ => None,
    }
}

fn plain_imports(node: &Node, source: &[u8]) -> Vec<RawImport> {
    let line = node.start_position().row + 1;
    let mut cursor = node.walk();
    node.children_by_field_name("name", &mut cursor)
        .filter_map(|child| name_and_alias(&child, source))
        .map(|(module, alias)| RawImport { level: 0, module, name: None, alias, line })
        .collect()
}

fn from_imports(node: &Node, source: &[u8]) -> Vec<RawImport> {
    let line = node.start_position().row + 1;
    let Some(module_node) = node.child_by_field_name("module_name") else {
        return Vec::new();
    };

    let (level, module) = if module_node.kind() == "relative_import" {
        let mut level = 0;
        let mut module = String::new();
        let mut cursor = module_node.walk();
        for child in module_node.children(&mut cursor) {
            match child.kind() {
                "import_prefix" => level = text_of(&child, source).matches('.').count(),
                "dotted_name" => module = text_of(&child, source).to_string(),
                _ => {}
            }
        }
        (level, module)
    } else {
        (0, text_of(&module_node, source).to_string())
    };

    let mut cursor = node.walk();
    let is_wildcard = node.children(&mut cursor).any(|c| c.kind() == "wildcard_import");
    if is_wildcard {
        return vec![RawImport { level, module, name: Some("*".to_string()), alias: None, line }];
    }

    let mut cursor = node.walk();
    node.children_by_field_name("name", &mut cursor)
        .filter_map(|child| name_and_alias(&child, source))
        .map(|(name, alias)| RawImport {
            level,
            module: module.clone(),
            name: Some(name),
            alias,
            line,
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Declaration walk
// ---------------------------------------------------------------------------

struct DeclWalker<'a> {
    source: &'a [u8],
    module: &'a str,
    declarations: Vec<Declaration>,
    ordinals: BTreeMap<(EntityKind, String), usize>,
    docstring_lines: Vec<(usize, usize)>,
}

impl<'a> DeclWalker<'a> {
    /// Unwrap `decorated_definition`. Returns the definition and the node whose
    /// range the entity covers.
    fn definition_of<'t>(node: Node<'t>) -> Option<(Node<'t>, Node<'t>)> {
        match node.kind() {
            "class_definition" | "function_definition" => Some((node, node)),
            "decorated_definition" => node.child_by_field_name("definition").map(|d| (d, node)),
            _ => None,
        }
    }

    fn next_ordinal(&mut self, kind: EntityKind, qualified_name: &str) -> usize {
        let slot = self
            .ordinals
            .entry((kind, qualified_name.to_string()))
            .or_insert(0);
        *slot += 1;
        *slot
    }

    fn walk_module(&mut self, root: &Node) {
        let mut cursor = root.walk();
        let children: Vec<Node> = root.named_children(&mut cursor).collect();
        for child in children {
            let Some((def, outer)) = Self::definition_of(child) else {
                continue;
            };
            match def.kind() {
                "class_definition" => self.push_class(&def, &outer),
                _ => {
                    self.push_callable(&def, &outer, None);
                }
            }
        }
    }

    fn push_class(&mut self, def: &Node, outer: &Node) {
        let Some(name_node) = def.child_by_field_name("name") else {
            return;
        };
        let name = text_of(&name_node, self.source).to_string();
        let qualified_name = format!("{}.{}", self.module, name);
        let ordinal = self.next_ordinal(EntityKind::Class, &qualified_name);
        let body = def.child_by_field_name("body");
        let docstring = body.and_then(|b| docstring_of(&b, self.source)).map(|(doc, range)| {
            self.docstring_lines.push(range);
            doc
        });

        let idx = self.declarations.len();
        self.declarations.push(Declaration {
            kind: EntityKind::Class,
            name,
            qualified_name,
            ordinal,
            parent: None,
            line_start: outer.start_position().row + 1,
            line_end: outer.end_position().row + 1,
            docstring,
            bases: collect_bases(def, self.source),
            calls: Vec::new(),
            complexity: None,
            parameters: Vec::new(),
            attributes: body.map(|b| collect_attributes(&b, self.source)).unwrap_or_default(),
        });

        let Some(body) = body else { return };
        let mut cursor = body.walk();
        let members: Vec<Node> = body.named_children(&mut cursor).collect();
        for member in members {
            if let Some((mdef, mouter)) = Self::definition_of(member) {
                if mdef.kind() == "function_definition" {
                    self.push_callable(&mdef, &mouter, Some(idx));
                }
            }
        }
    }

    fn push_callable(&mut self, def: &Node, outer: &Node, parent: Option<usize>) -> Option<usize> {
        let name_node = def.child_by_field_name("name")?;
        let name = text_of(&name_node, self.source).to_string();
        let (kind, qualified_name) = match parent {
            Some(p) => (
                EntityKind::Method,
                format!("{}.{}", self.declarations[p].qualified_name, name),
            ),
            None => (EntityKind::Function, format!("{}.{}", self.module, name)),
        };
        let ordinal = self.next_ordinal(kind, &qualified_name);

        let (docstring, calls, complexity) = match def.child_by_field_name("body") {
            Some(body) => {
                let docstring = docstring_of(&body, self.source).map(|(doc, range)| {
                    self.docstring_lines.push(range);
                    doc
                });
                (
                    docstring,
                    collect_calls(&body, self.source, parent.is_some()),
                    metrics::cyclomatic_complexity(&body),
                )
            }
            None => (None, Vec::new(), 1),
        };

        let idx = self.declarations.len();
        self.declarations.push(Declaration {
            kind,
            name,
            qualified_name,
            ordinal,
            parent,
            line_start: outer.start_position().row + 1,
            line_end: outer.end_position().row + 1,
            docstring,
            bases: Vec::new(),
            calls,
            complexity: Some(complexity),
            parameters: collect_parameters(def, self.source),
            attributes: Vec::new(),
        });
        Some(idx)
    }
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Parse one source text. Any syntax error makes the whole file a
/// [`ParseError`]; it then contributes no declarations.
pub fn parse_source(rel_path: &str, text: String) -> Result<FileExtract, ParseError> {
    let fail = |line: Option<usize>, message: String| ParseError {
        path: rel_path.to_string(),
        line,
        message,
    };

    let mut parser = Parser::new();
    parser
        .set_language(&tree_sitter_python::LANGUAGE.into())
        .map_err(|e| fail(None, format!("cannot load Python grammar: {e}")))?;
    let tree = parser
        .parse(&text, None)
        .ok_or_else(|| fail(None, "parser produced no tree".to_string()))?;
    let root = tree.root_node();

    if root.has_error() {
        let (line, missing) = first_error_line(&root).unwrap_or((1, false));
        let message = if missing { "incomplete syntax" } else { "invalid syntax" };
        return Err(fail(Some(line), message.to_string()));
    }

    let module = module_name_for_path(rel_path);
    let source = text.as_bytes();

    let mut docstring_lines = Vec::new();
    let docstring = docstring_of(&root, source).map(|(doc, range)| {
        docstring_lines.push(range);
        doc
    });

    let mut walker = DeclWalker {
        source,
        module: &module,
        declarations: Vec::new(),
        ordinals: BTreeMap::new(),
        docstring_lines,
    };
    walker.walk_module(&root);
    let DeclWalker { declarations, docstring_lines, .. } = walker;

    let complexity: u32 = declarations.iter().filter_map(|d| d.complexity).sum();
    let maintainability = metrics::module_maintainability(&root, &text, &docstring_lines, complexity);
    let imports = collect_imports(&root, source);
    let line_count = text.lines().count().max(1);

    Ok(FileExtract {
        path: rel_path.to_string(),
        is_package: is_package_init(rel_path),
        module,
        line_count,
        docstring,
        maintainability,
        declarations,
        imports,
        text,
    })
}

/// Read and parse one scanned file.
pub fn extract_file(file: &ScannedFile) -> Result<FileExtract, ParseError> {
    let fail = |message: String| ParseError {
        path: file.rel_path.clone(),
        line: None,
        message,
    };

    let meta = std::fs::metadata(&file.abs_path).map_err(|e| fail(e.to_string()))?;
    if meta.len() > MAX_FILE_READ {
        return Err(fail(format!("file exceeds {MAX_FILE_READ} bytes")));
    }
    let bytes = std::fs::read(&file.abs_path).map_err(|e| fail(e.to_string()))?;
    let text = String::from_utf8(bytes).map_err(|_| fail("file is not valid UTF-8".to_string()))?;
    parse_source(&file.rel_path, text)
}

/// Extract every file in parallel. Output order follows `files`.
pub fn extract_all(files: &[ScannedFile]) -> (Vec<FileExtract>, Vec<ParseError>) {
    let start = std::time::Instant::now();

    let results: Vec<Result<FileExtract, ParseError>> = files.par_iter().map(extract_file).collect();

    let mut extracts = Vec::with_capacity(results.len());
    let mut errors = Vec::new();
    for result in results {
        match result {
            Ok(extract) => extracts.push(extract),
            Err(err) => {
                warn!(path = %err.path, line = ?err.line, "Skipping file: {}", err.message);
                errors.push(err);
            }
        }
    }

    let extracts = drop_shadowed_modules(extracts, &mut errors);
    errors.sort_by(|a, b| a.path.cmp(&b.path));

    debug!(
        files = extracts.len(),
        declarations = extracts.iter().map(|e| e.declarations.len()).sum::<usize>(),
        parse_errors = errors.len(),
        time_ms = start.elapsed().as_millis() as u64,
        "Extraction complete"
    );
    (extracts, errors)
}

/// Two files can claim one module name (`pkg.py` next to `pkg/__init__.py`).
/// The package wins, otherwise the first path; the others become errors.
fn drop_shadowed_modules(extracts: Vec<FileExtract>, errors: &mut Vec<ParseError>) -> Vec<FileExtract> {
    let mut winners: BTreeMap<String, usize> = BTreeMap::new();
    for (i, file) in extracts.iter().enumerate() {
        match winners.get(&file.module) {
            Some(&j) if extracts[j].is_package || !file.is_package => {}
            _ => {
                winners.insert(file.module.clone(), i);
            }
        }
    }

    let mut kept = Vec::with_capacity(winners.len());
    let winner_paths: BTreeMap<String, String> = winners
        .iter()
        .map(|(module, &i)| (module.clone(), extracts[i].path.clone()))
        .collect();
    for (i, file) in extracts.into_iter().enumerate() {
        if winners.get(&file.module) == Some(&i) {
            kept.push(file);
            continue;
        }
        let winner = winner_paths.get(&file.module).cloned().unwrap_or_default();
        warn!(path = %file.path, module = %file.module, shadowed_by = %winner, "Skipping shadowed module");
        errors.push(ParseError {
            path: file.path,
            line: None,
            message: format!("module '{}' is already provided by {}", file.module, winner),
        });
    }
    kept
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(path: &str, src: &str) -> FileExtract {
        parse_source(path, src.to_string()).expect("source should parse")
    }

    fn decl<'a>(file: &'a FileExtract, qualified_name: &str) -> &'a Declaration {
        file.declarations
            .iter()
            .find(|d| d.qualified_name == qualified_name)
            .unwrap_or_else(|| panic!("missing declaration {qualified_name}"))
    }

    #[test]
    fn test_declarations_and_ranges() {
        let src = r#""""Shapes."""

class Shape:
    """Base."""

    def area(self):
        return 0


def total(shapes):
    return sum(s.area() for s in shapes)
"#;
        let file = extract("shapes.py", src);
        assert_eq!(file.module, "shapes");
        assert_eq!(file.docstring.as_deref(), Some("Shapes."));
        assert_eq!(file.declarations.len(), 3);

        let shape = decl(&file, "shapes.Shape");
        assert_eq!(shape.kind, EntityKind::Class);
        assert_eq!((shape.line_start, shape.line_end), (3, 7));
        assert_eq!(shape.docstring.as_deref(), Some("Base."));

        let area = decl(&file, "shapes.Shape.area");
        assert_eq!(area.kind, EntityKind::Method);
        assert_eq!(area.parent, Some(0));
        assert_eq!((area.line_start, area.line_end), (6, 7));
        assert_eq!(area.id(), "method:shapes.Shape.area");

        let total = decl(&file, "shapes.total");
        assert_eq!(total.kind, EntityKind::Function);
        assert_eq!(total.complexity, Some(1));
        assert_eq!(
            total.calls,
            vec![RawCall::Path("s.area".into()), RawCall::Path("sum".into())]
        );
    }

    #[test]
    fn test_decorated_range_starts_at_decorator() {
        let src = "@decorator\n@other(1)\ndef f():\n    pass\n";
        let file = extract("m.py", src);
        let f = decl(&file, "m.f");
        assert_eq!((f.line_start, f.line_end), (1, 4));
    }

    #[test]
    fn test_duplicate_definitions_get_ordinals() {
        let src = r#"
class C:
    @property
    def value(self):
        return self._v

    @value.setter
    def value(self, v):
        self._v = v
"#;
        let file = extract("m.py", src);
        let ids: Vec<String> = file.declarations.iter().map(|d| d.id()).collect();
        assert_eq!(ids, vec!["class:m.C", "method:m.C.value", "method:m.C.value#2"]);
    }

    #[test]
    fn test_bases_extraction() {
        let src = "class A(Base, pkg.Mixin, Generic[T], metaclass=Meta, *extra):\n    pass\n";
        let file = extract("m.py", src);
        assert_eq!(decl(&file, "m.A").bases, vec!["Base", "pkg.Mixin", "Generic"]);
    }

    #[test]
    fn test_call_forms() {
        let src = r#"
class C:
    def run(self):
        self.helper()
        cls.other()
        self.attr.deep()
        mod.sub.fn()
        make()().chained()
        items[0]()
"#;
        let file = extract("m.py", src);
        let run = decl(&file, "m.C.run");
        assert_eq!(
            run.calls,
            vec![
                RawCall::Path("make".into()),
                RawCall::Path("mod.sub.fn".into()),
                RawCall::SelfMethod("helper".into()),
                RawCall::SelfMethod("other".into()),
            ]
        );
    }

    #[test]
    fn test_self_outside_method_is_plain_path() {
        let file = extract("m.py", "def f(self):\n    self.go()\n");
        assert_eq!(decl(&file, "m.f").calls, vec![RawCall::Path("self.go".into())]);
    }

    #[test]
    fn test_import_forms() {
        let src = r#"
import os
import pkg.sub as ps
from a import f, g as h
from ..base import Thing
from . import sibling
from x import *
"#;
        let file = extract("pkg/mod.py", src);
        let summary: Vec<(usize, &str, Option<&str>, String)> = file
            .imports
            .iter()
            .map(|i| (i.level, i.module.as_str(), i.name.as_deref(), i.local_name()))
            .collect();
        assert_eq!(
            summary,
            vec![
                (0, "os", None, "os".to_string()),
                (0, "pkg.sub", None, "ps".to_string()),
                (0, "a", Some("f"), "f".to_string()),
                (0, "a", Some("g"), "h".to_string()),
                (2, "base", Some("Thing"), "Thing".to_string()),
                (1, "", Some("sibling"), "sibling".to_string()),
                (0, "x", Some("*"), "*".to_string()),
            ]
        );
        assert!(file.imports[6].is_wildcard());
    }

    #[test]
    fn test_syntax_error_is_parse_error() {
        let err = parse_source("broken.py", "def f(:\n    pass\n".to_string()).unwrap_err();
        assert_eq!(err.path, "broken.py");
        assert_eq!(err.line, Some(1));
    }

    #[test]
    fn test_package_module() {
        let file = extract("pkg/__init__.py", "");
        assert_eq!(file.module, "pkg");
        assert!(file.is_package);
        assert_eq!(file.line_count, 1);
        assert_eq!(file.maintainability, 100.0);
    }

    #[test]
    fn test_clean_docstring() {
        assert_eq!(clean_docstring("\"\"\"\n    Title.\n\n    Body\n    \"\"\"").as_deref(), Some("Title.\n\nBody"));
        assert_eq!(clean_docstring("r'raw'").as_deref(), Some("raw"));
        assert_eq!(clean_docstring("\"\"").as_deref(), None);
    }

    #[test]
    fn test_docstring_with_non_ascii_indent() {
        let raw = "\"\"\"Title.\n\n\u{a0}x\n a\n    \"\"\"";
        assert_eq!(clean_docstring(raw).as_deref(), Some("Title.\n\nx\na"));

        let src = "def f():\n    \"\"\"Title.\n\n\u{a0}x\n a\n    \"\"\"\n";
        let file = extract("m.py", src);
        assert_eq!(decl(&file, "m.f").docstring.as_deref(), Some("Title.\n\nx\na"));
    }

    #[test]
    fn test_non_ascii_docstring_does_not_stop_extraction() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("m.py"),
            "def f():\n    \"\"\"Title.\n\n\u{a0}x\n a\n    \"\"\"\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("ok.py"), "def g():\n    pass\n").unwrap();
        let files: Vec<ScannedFile> = ["m.py", "ok.py"]
            .iter()
            .map(|p| ScannedFile { rel_path: p.to_string(), abs_path: dir.path().join(p) })
            .collect();

        let (extracts, errors) = extract_all(&files);
        assert!(errors.is_empty(), "unexpected errors: {errors:?}");
        let mut modules: Vec<&str> = extracts.iter().map(|e| e.module.as_str()).collect();
        modules.sort();
        assert_eq!(modules, vec!["m", "ok"]);
    }

    #[test]
    fn test_parameters_and_attributes() {
        let src = r#"class Point:
    """Doc."""
    x: int = 0
    y = z = 1
    a, b = 1, 2
    label: str
    x = 5

    def move(self, dx, dy=0, *rest, scale: float = 1.0, **opts):
        self.moved = True


def plain(a, /, b, *, c, d: int):
    pass


def empty():
    pass
"#;
        let file = extract("geo.py", src);
        let point = decl(&file, "geo.Point");
        assert_eq!(point.attributes, vec!["x", "y", "z", "a", "b", "label"]);
        assert!(point.parameters.is_empty());

        let mv = decl(&file, "geo.Point.move");
        assert_eq!(mv.parameters, vec!["self", "dx", "dy", "rest", "scale", "opts"]);
        assert!(mv.attributes.is_empty());

        assert_eq!(decl(&file, "geo.plain").parameters, vec!["a", "b", "c", "d"]);
        assert!(decl(&file, "geo.empty").parameters.is_empty());
    }

    #[test]
    fn test_extract_all_keeps_going_after_errors() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("good.py"), "def ok():\n    pass\n").unwrap();
        std::fs::write(dir.path().join("bad.py"), "class :\n").unwrap();
        std::fs::write(dir.path().join("bin.py"), [0xff, 0xfe, 0x00]).unwrap();
        let files: Vec<ScannedFile> = ["bad.py", "bin.py", "good.py"]
            .iter()
            .map(|p| ScannedFile { rel_path: p.to_string(), abs_path: dir.path().join(p) })
            .collect();

        let (extracts, errors) = extract_all(&files);
        assert_eq!(extracts.len(), 1);
        assert_eq!(extracts[0].module, "good");
        let failed: Vec<&str> = errors.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(failed, vec!["bad.py", "bin.py"]);
    }

    #[test]
    fn test_package_shadows_module_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("pkg")).unwrap();
        std::fs::write(dir.path().join("pkg.py"), "").unwrap();
        std::fs::write(dir.path().join("pkg/__init__.py"), "").unwrap();
        let files: Vec<ScannedFile> = ["pkg.py", "pkg/__init__.py"]
            .iter()
            .map(|p| ScannedFile { rel_path: p.to_string(), abs_path: dir.path().join(p) })
            .collect();

        let (extracts, errors) = extract_all(&files);
        assert_eq!(extracts.len(), 1);
        assert_eq!(extracts[0].path, "pkg/__init__.py");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].path, "pkg.py");
    }
}
