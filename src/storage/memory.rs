//! In-memory symbol store: the graph plus name, FQN and file indexes.

use super::case_map::CaseInsensitiveMap;
use super::graph::SymbolGraph;
use crate::relationship::ReferenceType;
use crate::symbol::Symbol;
use crate::types::{FileUri, SymbolId};
use std::collections::HashMap;

/// Ids sharing one case-insensitive name. `name` keeps the first spelling seen.
#[derive(Debug, Clone)]
struct NameEntry {
    name: String,
    ids: Vec<SymbolId>,
}

#[derive(Debug, Default)]
pub struct SymbolStore {
    graph: SymbolGraph,
    by_name: CaseInsensitiveMap<NameEntry>,
    by_fqn: CaseInsensitiveMap<SymbolId>,
    by_file: HashMap<FileUri, Vec<SymbolId>>,
}

impl SymbolStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a symbol. Returns `false` if the id was already present, in
    /// which case the stored value is replaced and indexes are left as is.
    pub fn insert(&mut self, symbol: Symbol) -> bool {
        let id = symbol.id.clone();
        let name = symbol.name.clone();
        let fqn = symbol.fqn.clone();
        let file_uri = symbol.file_uri.clone();

        if !self.graph.add_vertex(symbol) {
            return false;
        }

        self.by_name
            .get_or_insert_with(&name, || NameEntry {
                name: name.clone(),
                ids: Vec::new(),
            })
            .ids
            .push(id.clone());
        if let Some(fqn) = fqn {
            self.by_fqn.insert(&fqn, id.clone());
        }
        self.by_file.entry(file_uri).or_default().push(id);
        true
    }

    pub fn get(&self, id: &SymbolId) -> Option<&Symbol> {
        self.graph.get_vertex(id).map(|v| &v.symbol)
    }

    pub fn get_mut(&mut self, id: &SymbolId) -> Option<&mut Symbol> {
        self.graph.get_vertex_mut(id).map(|v| &mut v.symbol)
    }

    pub fn contains(&self, id: &SymbolId) -> bool {
        self.graph.contains(id)
    }

    /// Symbols named `name` in any case, in insertion order.
    pub fn find_by_name(&self, name: &str) -> Vec<&Symbol> {
        self.by_name
            .get(name)
            .map(|entry| entry.ids.iter().filter_map(|id| self.get(id)).collect())
            .unwrap_or_default()
    }

    /// First symbol named `name` that can satisfy `reference_type`.
    pub fn find_target(&self, name: &str, reference_type: ReferenceType) -> Option<&Symbol> {
        self.find_by_name(name)
            .into_iter()
            .find(|s| reference_type.accepts(s.kind))
    }

    /// Symbol named `name`, preferring one declared in `file_uri`.
    pub fn find_preferring_file(&self, name: &str, file_uri: Option<&FileUri>) -> Option<&Symbol> {
        let candidates = self.find_by_name(name);
        file_uri
            .and_then(|uri| candidates.iter().find(|s| &s.file_uri == uri).copied())
            .or_else(|| candidates.first().copied())
    }

    pub fn find_by_fqn(&self, fqn: &str) -> Option<&Symbol> {
        self.by_fqn.get(fqn).and_then(|id| self.get(id))
    }

    /// Original spelling of an indexed name.
    pub fn display_name(&self, name: &str) -> Option<&str> {
        self.by_name.get(name).map(|entry| entry.name.as_str())
    }

    pub fn symbols_in_file(&self, file_uri: &FileUri) -> Vec<&Symbol> {
        self.by_file
            .get(file_uri)
            .map(|ids| ids.iter().filter_map(|id| self.get(id)).collect())
            .unwrap_or_default()
    }

    pub fn files(&self) -> impl Iterator<Item = &FileUri> {
        self.by_file.keys()
    }

    /// Drop every symbol of a file from the graph and all indexes.
    pub fn remove_file(&mut self, file_uri: &FileUri) -> Vec<Symbol> {
        let Some(ids) = self.by_file.remove(file_uri) else {
            return Vec::new();
        };

        let mut removed = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(symbol) = self.graph.remove_vertex(&id) {
                if let Some(entry) = self.by_name.get_mut(&symbol.name) {
                    entry.ids.retain(|other| other != &id);
                    if entry.ids.is_empty() {
                        self.by_name.remove(&symbol.name);
                    }
                }
                if let Some(fqn) = &symbol.fqn
                    && self.by_fqn.get(fqn) == Some(&id)
                {
                    self.by_fqn.remove(fqn);
                }
                removed.push(symbol);
            }
        }
        removed
    }

    pub fn graph(&self) -> &SymbolGraph {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut SymbolGraph {
        &mut self.graph
    }

    pub fn len(&self) -> usize {
        self.graph.vertex_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.vertex_count() == 0
    }
}
