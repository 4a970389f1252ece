//! Reference resolution: raw imports, base classes and call names become
//! typed edges. Names that do not resolve are dropped.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use tracing::debug;

use crate::extract::{Declaration, FileExtract, RawCall};
use crate::graph::{EntityKind, Relation, RelationKind};
use crate::symbols::{SymbolTable, Unresolved};

/// Outcome of resolving one reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Resolved(String),
    Unresolved(Unresolved),
}

impl Resolution {
    pub fn resolved(&self) -> Option<&str> {
        match self {
            Resolution::Resolved(id) => Some(id),
            Resolution::Unresolved(_) => None,
        }
    }
}

/// Resolved edges, sorted by `(source_id, target_id, kind)`.
#[derive(Debug, Default)]
pub struct ResolvedEdges {
    pub relations: BTreeSet<Relation>,
    /// References that did not resolve, by reason.
    pub unresolved: BTreeMap<&'static str, usize>,
}

impl ResolvedEdges {
    fn record(&mut self, source: &str, resolution: Resolution, kind: RelationKind) {
        match resolution {
            Resolution::Resolved(target) => {
                self.relations.insert(Relation::new(source, &target, kind));
            }
            Resolution::Unresolved(reason) => {
                let key = match reason {
                    Unresolved::Unbound => "unbound",
                    Unresolved::External(_) => "external",
                    Unresolved::WrongKind(_) => "wrong_kind",
                };
                *self.unresolved.entry(key).or_insert(0) += 1;
            }
        }
    }

    pub fn count(&self, kind: RelationKind) -> usize {
        self.relations.iter().filter(|r| r.kind == kind).count()
    }
}

struct Resolver<'a> {
    table: &'a SymbolTable,
    /// Class qualified name -> resolved base class qualified names.
    bases: BTreeMap<String, Vec<String>>,
}

impl<'a> Resolver<'a> {
    fn lookup_as(&self, module: &str, name: &str, kinds: &[EntityKind]) -> Resolution {
        match self.table.lookup(module, name) {
            Ok(symbol) if kinds.contains(&symbol.kind) => Resolution::Resolved(symbol.id.clone()),
            Ok(symbol) => Resolution::Unresolved(Unresolved::WrongKind(symbol.kind)),
            Err(reason) => Resolution::Unresolved(reason),
        }
    }

    fn lookup_imported_as(&self, module: &str, name: &str, kinds: &[EntityKind]) -> Resolution {
        match self.table.lookup_imported(module, name) {
            Ok(symbol) if kinds.contains(&symbol.kind) => Resolution::Resolved(symbol.id.clone()),
            Ok(symbol) => Resolution::Unresolved(Unresolved::WrongKind(symbol.kind)),
            Err(reason) => Resolution::Unresolved(reason),
        }
    }

    /// `self.name`: the enclosing class, then its bases breadth-first, then the
    /// module scope.
    fn lookup_self_method(&self, module: &str, class: &str, name: &str) -> Resolution {
        let mut queue: VecDeque<&str> = VecDeque::from([class]);
        let mut visited: BTreeSet<&str> = BTreeSet::new();
        while let Some(current) = queue.pop_front() {
            if !visited.insert(current) {
                continue;
            }
            let candidate = format!("{current}.{name}");
            if let Some(symbol) = self.table.symbol(&candidate) {
                if symbol.kind == EntityKind::Method {
                    return Resolution::Resolved(symbol.id.clone());
                }
            }
            if let Some(bases) = self.bases.get(current) {
                queue.extend(bases.iter().map(String::as_str));
            }
        }
        self.lookup_as(module, name, CALLABLE_KINDS)
    }

    fn resolve_call(&self, file: &FileExtract, decl: &Declaration, call: &RawCall) -> Resolution {
        match call {
            RawCall::Path(path) => self.lookup_as(&file.module, path, CALLABLE_KINDS),
            RawCall::SelfMethod(name) => match decl.parent {
                Some(parent) => {
                    let class = &file.declarations[parent].qualified_name;
                    self.lookup_self_method(&file.module, class, name)
                }
                None => self.lookup_as(&file.module, name, CALLABLE_KINDS),
            },
        }
    }
}

/// Entities a call may target. Calling a class instantiates it.
const CALLABLE_KINDS: &[EntityKind] = &[EntityKind::Function, EntityKind::Method, EntityKind::Class];

/// Resolve every raw reference against the symbol table.
pub fn resolve(extracts: &[FileExtract], table: &SymbolTable) -> ResolvedEdges {
    let start = std::time::Instant::now();
    let mut edges = ResolvedEdges::default();

    // Imports: one edge per imported target, to the module defining it.
    for scope in table.scopes() {
        let Some(source) = table.symbol(&scope.module) else {
            continue;
        };
        let targets = scope.import_targets.iter().chain(scope.wildcards.iter());
        for target in targets {
            match table.module_of_target(target) {
                Some(module) if module.id != source.id => {
                    edges.record(&source.id, Resolution::Resolved(module.id.clone()), RelationKind::Imports);
                }
                Some(_) => {}
                None => edges.record(
                    &source.id,
                    Resolution::Unresolved(Unresolved::External(target.clone())),
                    RelationKind::Imports,
                ),
            }
        }
    }

    // Inherits: bases resolve in the class's module scope. A base naming the
    // class itself (`class A(A)`) refers to the binding the class replaces.
    let mut resolver = Resolver { table, bases: BTreeMap::new() };
    for file in extracts {
        for decl in file.declarations.iter().filter(|d| d.kind == EntityKind::Class) {
            let id = decl.id();
            for base in &decl.bases {
                let mut resolution = resolver.lookup_as(&file.module, base, &[EntityKind::Class]);
                if resolution.resolved() == Some(id.as_str()) {
                    resolution = resolver.lookup_imported_as(&file.module, base, &[EntityKind::Class]);
                }
                if resolution.resolved() == Some(id.as_str()) {
                    continue;
                }
                if let Some(target) = resolution.resolved().and_then(|t| qualified_of(table, t)) {
                    resolver
                        .bases
                        .entry(decl.qualified_name.clone())
                        .or_default()
                        .push(target);
                }
                edges.record(&id, resolution, RelationKind::Inherits);
            }
        }
    }

    // Calls.
    for file in extracts {
        for decl in file.declarations.iter().filter(|d| d.complexity.is_some()) {
            let id = decl.id();
            for call in &decl.calls {
                let resolution = resolver.resolve_call(file, decl, call);
                edges.record(&id, resolution, RelationKind::Calls);
            }
        }
    }

    debug!(
        imports = edges.count(RelationKind::Imports),
        inherits = edges.count(RelationKind::Inherits),
        calls = edges.count(RelationKind::Calls),
        unresolved = edges.unresolved.values().sum::<usize>(),
        time_ms = start.elapsed().as_millis() as u64,
        "References resolved"
    );
    edges
}

/// Qualified name for a node id, via the symbol it was resolved from.
fn qualified_of(table: &SymbolTable, id: &str) -> Option<String> {
    let (_, rest) = id.split_once(':')?;
    let qualified = rest.split_once('#').map(|(q, _)| q).unwrap_or(rest);
    table.symbol(qualified).map(|s| s.qualified_name.clone())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
