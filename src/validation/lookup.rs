//! Type lookups shared by the validators.
//!
//! Same-file declarations are always visible; the symbol manager is only
//! consulted when the run is `Thorough`.

use super::ValidationOptions;
use super::builtins;
use crate::symbol::{Symbol, SymbolTable};
use std::collections::{HashSet, VecDeque};

const MAX_HIERARCHY_DEPTH: usize = 32;

/// Answer of a supertype walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Hierarchy {
    Reaches,
    DoesNotReach,
    /// Some link in the chain could not be resolved.
    Unknown,
}

pub(crate) fn simple_name(name: &str) -> &str {
    name.rsplit('.').next().unwrap_or(name)
}

pub(crate) struct TypeLookup<'a> {
    table: &'a SymbolTable,
    options: &'a ValidationOptions,
}

impl<'a> TypeLookup<'a> {
    pub fn new(table: &'a SymbolTable, options: &'a ValidationOptions) -> Self {
        Self { table, options }
    }

    pub fn table(&self) -> &'a SymbolTable {
        self.table
    }

    /// Type declared in the file being validated. `Outer.Inner` prefers an
    /// inner type whose parent is `Outer`.
    pub fn same_file(&self, name: &str) -> Option<Symbol> {
        let simple = simple_name(name);
        let candidates: Vec<&Symbol> = self
            .table
            .lookup(simple)
            .into_iter()
            .filter(|s| s.kind.is_type())
            .collect();

        if let Some((outer, _)) = name.rsplit_once('.') {
            let outer = simple_name(outer);
            let nested = candidates.iter().find(|s| {
                s.parent_id
                    .as_ref()
                    .and_then(|p| self.table.get(p))
                    .is_some_and(|parent| parent.is_named(outer))
            });
            if let Some(found) = nested {
                return Some((*found).clone());
            }
        }
        candidates.first().map(|s| (*s).clone())
    }

    pub fn cross_file(&self, name: &str) -> Option<Symbol> {
        let manager = self.options.cross_file()?;
        manager
            .find_type(name)
            .or_else(|| manager.find_type(simple_name(name)))
    }

    pub fn find(&self, name: &str) -> Option<Symbol> {
        self.same_file(name).or_else(|| self.cross_file(name))
    }

    /// Declared members of a type, wherever it lives.
    pub fn members(&self, owner: &Symbol) -> Vec<Symbol> {
        if self.table.get(&owner.id).is_some() {
            return self.table.children_of(&owner.id).cloned().collect();
        }
        match self.options.cross_file() {
            Some(manager) => manager
                .find_symbols_in_file(&owner.file_uri)
                .into_iter()
                .filter(|s| s.parent_id.as_ref() == Some(&owner.id))
                .collect(),
            None => Vec::new(),
        }
    }

    pub fn member_named(
        &self,
        owner: &Symbol,
        name: &str,
        accept: impl Fn(&Symbol) -> bool,
    ) -> Option<Symbol> {
        self.members(owner)
            .into_iter()
            .find(|m| m.is_named(name) && accept(m))
    }

    /// Walk superclass and interface links of `start` looking for `target`.
    /// Runtime exceptions are all taken to extend `Exception`.
    pub fn inherits_from(&self, start: &Symbol, target: &str) -> Hierarchy {
        let target = simple_name(target);
        let mut queue: VecDeque<String> = parents(start).collect();
        let mut seen = HashSet::new();
        let mut unknown = false;

        while let Some(name) = queue.pop_front() {
            if seen.len() >= MAX_HIERARCHY_DEPTH {
                unknown = true;
                break;
            }
            if !seen.insert(name.to_lowercase()) {
                continue;
            }
            if simple_name(&name).eq_ignore_ascii_case(target) {
                return Hierarchy::Reaches;
            }
            if builtins::is_builtin(&name) {
                if target.eq_ignore_ascii_case("exception") && builtins::is_builtin_exception(&name) {
                    return Hierarchy::Reaches;
                }
                continue;
            }
            match self.find(&name) {
                Some(parent) => queue.extend(parents(&parent)),
                None => unknown = true,
            }
        }

        if unknown {
            Hierarchy::Unknown
        } else {
            Hierarchy::DoesNotReach
        }
    }
}

fn parents(symbol: &Symbol) -> impl Iterator<Item = String> + '_ {
    symbol
        .super_class
        .iter()
        .chain(symbol.interfaces.iter())
        .cloned()
}
