//! Project-wide symbol table.
//!
//! Built once, after every file has been extracted, and read-only afterwards.
//! Maps each qualified name to the entity that defines it and gives every
//! module a scope of local definitions plus resolved import bindings.

use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use crate::extract::{FileExtract, RawImport};
use crate::graph::EntityKind;
use crate::scan::package_of;

/// An entity the namespace can resolve to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub id: String,
    pub kind: EntityKind,
    pub qualified_name: String,
    /// Qualified name of the defining module.
    pub module: String,
}

/// Why a name did not resolve.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Unresolved {
    /// Nothing in the module's local scope or imports binds the name.
    Unbound,
    /// Bound to a qualified name outside the analysed project.
    External(String),
    /// Resolved to an entity that cannot play this role.
    WrongKind(EntityKind),
}

/// Names visible at the top level of one module.
#[derive(Debug, Clone, Default)]
pub struct ModuleScope {
    pub module: String,
    /// Anchor for relative imports.
    pub package: String,
    /// Top-level definitions: local name -> qualified name.
    pub locals: BTreeMap<String, String>,
    /// Import bindings: local name -> target qualified name. A later binding
    /// of the same name replaces the earlier one.
    pub imports: BTreeMap<String, String>,
    /// Every explicit import target, including ones a later binding replaced.
    pub import_targets: BTreeSet<String>,
    /// Modules pulled in with `from m import *`.
    pub wildcards: BTreeSet<String>,
}

#[derive(Debug, Default)]
pub struct SymbolTable {
    symbols: BTreeMap<String, Symbol>,
    scopes: BTreeMap<String, ModuleScope>,
}

/// Absolute dotted path of the module named by a possibly relative import.
/// Returns `None` when the dots climb above the project root.
pub fn resolve_import_base(package: &str, level: usize, module: &str) -> Option<String> {
    if level == 0 {
        return Some(module.to_string());
    }
    let mut parts: Vec<&str> = package.split('.').filter(|p| !p.is_empty()).collect();
    for _ in 1..level {
        parts.pop()?;
    }
    if !module.is_empty() {
        parts.push(module);
    }
    Some(parts.join("."))
}

fn join_name(base: &str, name: &str) -> String {
    if base.is_empty() {
        name.to_string()
    } else {
        format!("{base}.{name}")
    }
}

impl SymbolTable {
    pub fn build(extracts: &[FileExtract]) -> Self {
        let start = std::time::Instant::now();
        let mut table = SymbolTable::default();

        for file in extracts {
            table.insert(Symbol {
                id: file.module_id(),
                kind: EntityKind::Module,
                qualified_name: file.module.clone(),
                module: file.module.clone(),
            });
            let mut scope = ModuleScope {
                module: file.module.clone(),
                package: package_of(&file.module, file.is_package),
                ..Default::default()
            };
            // Later definitions rebind earlier ones.
            for decl in &file.declarations {
                table.insert(Symbol {
                    id: decl.id(),
                    kind: decl.kind,
                    qualified_name: decl.qualified_name.clone(),
                    module: file.module.clone(),
                });
                if decl.parent.is_none() {
                    scope.locals.insert(decl.name.clone(), decl.qualified_name.clone());
                }
            }
            table.scopes.insert(file.module.clone(), scope);
        }

        let mut wildcard_sources: Vec<(String, String)> = Vec::new();
        for file in extracts {
            let Some(package) = table.scopes.get(&file.module).map(|s| s.package.clone()) else {
                continue;
            };
            let mut bindings: Vec<(String, String)> = Vec::new();
            let mut targets: BTreeSet<String> = BTreeSet::new();
            for import in &file.imports {
                let Some(target) = import_target(&package, import) else {
                    continue;
                };
                if import.is_wildcard() {
                    wildcard_sources.push((file.module.clone(), target));
                    continue;
                }
                // `import a.b` also binds the top-level package `a`.
                if import.name.is_none() && import.alias.is_none() {
                    if let Some((top, _)) = import.module.split_once('.') {
                        bindings.push((top.to_string(), top.to_string()));
                    }
                }
                bindings.push((import.local_name(), target.clone()));
                targets.insert(target);
            }
            if let Some(scope) = table.scopes.get_mut(&file.module) {
                scope.imports.extend(bindings);
                scope.import_targets = targets;
            }
        }

        // Wildcards expand to the target's public top-level names, without
        // overriding explicit bindings.
        for (module, target) in wildcard_sources {
            let exported: Vec<(String, String)> = match table.scopes.get(&target) {
                Some(target_scope) => target_scope
                    .locals
                    .iter()
                    .filter(|(name, _)| !name.starts_with('_'))
                    .map(|(n, q)| (n.clone(), q.clone()))
                    .collect(),
                None => Vec::new(),
            };
            if let Some(scope) = table.scopes.get_mut(&module) {
                for (name, qualified) in exported {
                    scope.imports.entry(name).or_insert(qualified);
                }
                scope.wildcards.insert(target);
            }
        }

        debug!(
            symbols = table.symbols.len(),
            modules = table.scopes.len(),
            time_ms = start.elapsed().as_millis() as u64,
            "Symbol table built"
        );
        table
    }

    fn insert(&mut self, symbol: Symbol) {
        self.symbols.insert(symbol.qualified_name.clone(), symbol);
    }

    pub fn symbol(&self, qualified_name: &str) -> Option<&Symbol> {
        self.symbols.get(qualified_name)
    }

    pub fn scope(&self, module: &str) -> Option<&ModuleScope> {
        self.scopes.get(module)
    }

    pub fn scopes(&self) -> impl Iterator<Item = &ModuleScope> {
        self.scopes.values()
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Module an import target belongs to: the defining module of an entity,
    /// the module itself, or the parent module of an unknown attribute.
    pub fn module_of_target(&self, target: &str) -> Option<&Symbol> {
        if let Some(symbol) = self.symbols.get(target) {
            return match symbol.kind {
                EntityKind::Module => Some(symbol),
                _ => self.symbols.get(&symbol.module),
            };
        }
        let (parent, _) = target.rsplit_once('.')?;
        self.symbols
            .get(parent)
            .filter(|s| s.kind == EntityKind::Module)
    }

    /// Resolve a dotted name as written in `module`. The longest bound prefix
    /// wins; locals shadow imports at each prefix length.
    pub fn lookup(&self, module: &str, dotted: &str) -> Result<&Symbol, Unresolved> {
        self.lookup_in(module, dotted, true)
    }

    /// Like [`lookup`](Self::lookup), ignoring local definitions.
    pub fn lookup_imported(&self, module: &str, dotted: &str) -> Result<&Symbol, Unresolved> {
        self.lookup_in(module, dotted, false)
    }

    fn lookup_in(&self, module: &str, dotted: &str, with_locals: bool) -> Result<&Symbol, Unresolved> {
        let scope = self.scopes.get(module).ok_or(Unresolved::Unbound)?;
        let segments: Vec<&str> = dotted.split('.').collect();

        for k in (1..=segments.len()).rev() {
            let prefix = segments[..k].join(".");
            let base = scope
                .locals
                .get(&prefix)
                .filter(|_| with_locals)
                .or_else(|| scope.imports.get(&prefix));
            let Some(base) = base else { continue };

            let mut candidate = base.clone();
            for rest in &segments[k..] {
                candidate.push('.');
                candidate.push_str(rest);
            }
            return self
                .symbols
                .get(&candidate)
                .ok_or(Unresolved::External(candidate));
        }
        Err(Unresolved::Unbound)
    }
}

/// Target qualified name of one import, relative dots resolved.
fn import_target(package: &str, import: &RawImport) -> Option<String> {
    let base = resolve_import_base(package, import.level, &import.module)?;
    match &import.name {
        None => Some(base),
        Some(_) if import.is_wildcard() => Some(base),
        Some(name) => Some(join_name(&base, name)),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
