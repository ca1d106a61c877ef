//! Directed symbol graph.
//!
//! Vertices hold the ingested [`Symbol`] plus a running reference count;
//! edges are typed [`ReferenceEdge`]s. Cycles are allowed (mutual type
//! references are normal) and only detected on request.

use super::error::{GraphError, GraphResult};
use crate::relationship::{ReferenceEdge, ReferenceType};
use crate::symbol::Symbol;
use crate::types::{FileUri, SymbolId};
use petgraph::Direction;
use petgraph::algo::tarjan_scc;
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::visit::EdgeRef;
use std::collections::{HashMap, HashSet, VecDeque};

/// Vertex payload.
#[derive(Debug, Clone)]
pub struct SymbolVertex {
    pub symbol: Symbol,
    /// Number of resolved edges pointing at this symbol.
    pub reference_count: usize,
}

#[derive(Debug, Clone)]
pub struct GraphEdge {
    pub weight: u32,
    pub edge: ReferenceEdge,
}

/// Identity of an edge for de-duplication: endpoints plus the call site.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct EdgeKey {
    source: SymbolId,
    target: SymbolId,
    reference_type: ReferenceType,
    line: u32,
    column: u32,
}

impl EdgeKey {
    fn new(source: &SymbolId, target: &SymbolId, edge: &ReferenceEdge) -> Self {
        Self {
            source: source.clone(),
            target: target.clone(),
            reference_type: edge.reference_type,
            line: edge.location.start_line,
            column: edge.location.start_column,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GraphStats {
    pub vertices: usize,
    pub edges: usize,
    pub cross_file_edges: usize,
}

#[derive(Debug, Default)]
pub struct SymbolGraph {
    graph: StableDiGraph<SymbolVertex, GraphEdge>,
    node_map: HashMap<SymbolId, NodeIndex>,
    edge_keys: HashSet<EdgeKey>,
}

impl SymbolGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the vertex for `symbol.id`.
    ///
    /// Returns `true` when a new vertex was created. Replacing keeps the
    /// vertex's edges and reference count.
    pub fn add_vertex(&mut self, symbol: Symbol) -> bool {
        if let Some(&idx) = self.node_map.get(&symbol.id) {
            if let Some(vertex) = self.graph.node_weight_mut(idx) {
                vertex.symbol = symbol;
            }
            return false;
        }

        let id = symbol.id.clone();
        let idx = self.graph.add_node(SymbolVertex {
            symbol,
            reference_count: 0,
        });
        self.node_map.insert(id, idx);
        true
    }

    pub fn get_vertex(&self, id: &SymbolId) -> Option<&SymbolVertex> {
        let idx = self.node_map.get(id)?;
        self.graph.node_weight(*idx)
    }

    pub fn get_vertex_mut(&mut self, id: &SymbolId) -> Option<&mut SymbolVertex> {
        let idx = self.node_map.get(id)?;
        self.graph.node_weight_mut(*idx)
    }

    pub fn contains(&self, id: &SymbolId) -> bool {
        self.node_map.contains_key(id)
    }

    /// Add an edge. `false` when either vertex is missing or the edge exists.
    pub fn add_edge(
        &mut self,
        source: &SymbolId,
        target: &SymbolId,
        weight: u32,
        edge: ReferenceEdge,
    ) -> bool {
        self.try_add_edge(source, target, weight, edge).is_ok()
    }

    /// Same as [`add_edge`](Self::add_edge) but reports why the edge was rejected.
    pub fn try_add_edge(
        &mut self,
        source: &SymbolId,
        target: &SymbolId,
        weight: u32,
        edge: ReferenceEdge,
    ) -> GraphResult<()> {
        let &from = self
            .node_map
            .get(source)
            .ok_or_else(|| GraphError::VertexNotFound(source.clone()))?;
        let &to = self
            .node_map
            .get(target)
            .ok_or_else(|| GraphError::VertexNotFound(target.clone()))?;

        let key = EdgeKey::new(source, target, &edge);
        if self.edge_keys.contains(&key) {
            return Err(GraphError::DuplicateEdge {
                source_id: source.clone(),
                target_id: target.clone(),
            });
        }

        self.graph.add_edge(from, to, GraphEdge { weight, edge });
        self.edge_keys.insert(key);
        Ok(())
    }

    /// Bump the running reference count of a vertex. Returns the new count.
    pub fn increment_reference_count(&mut self, id: &SymbolId) -> Option<usize> {
        let vertex = self.get_vertex_mut(id)?;
        vertex.reference_count += 1;
        Some(vertex.reference_count)
    }

    /// Remove a vertex and every incident edge.
    ///
    /// Reference counts of former targets are decremented for each dropped
    /// incoming-to-them edge.
    pub fn remove_vertex(&mut self, id: &SymbolId) -> Option<Symbol> {
        let idx = self.node_map.remove(id)?;

        // Only this vertex's incident edges carry keys that mention it
        let mut stale = Vec::new();
        let mut former_targets = Vec::new();
        for direction in [Direction::Outgoing, Direction::Incoming] {
            for edge in self.graph.edges_directed(idx, direction) {
                let (source, target) = (edge.source(), edge.target());
                stale.push(EdgeKey::new(
                    &self.graph[source].symbol.id,
                    &self.graph[target].symbol.id,
                    &edge.weight().edge,
                ));
                if direction == Direction::Outgoing && target != idx {
                    former_targets.push(target);
                }
            }
        }

        for target in former_targets {
            if let Some(vertex) = self.graph.node_weight_mut(target) {
                vertex.reference_count = vertex.reference_count.saturating_sub(1);
            }
        }
        for key in &stale {
            self.edge_keys.remove(key);
        }
        self.graph.remove_node(idx).map(|v| v.symbol)
    }

    /// Remove every vertex owned by `file_uri`. Returns the removed ids.
    pub fn remove_file(&mut self, file_uri: &FileUri) -> Vec<SymbolId> {
        let ids: Vec<SymbolId> = self
            .vertices()
            .filter(|v| &v.symbol.file_uri == file_uri)
            .map(|v| v.symbol.id.clone())
            .collect();

        for id in &ids {
            self.remove_vertex(id);
        }
        ids
    }

    /// Outgoing edges of `id` with their target ids.
    pub fn outgoing(&self, id: &SymbolId) -> Vec<(SymbolId, &ReferenceEdge)> {
        self.edges(id, Direction::Outgoing)
    }

    /// Incoming edges of `id` with their source ids.
    pub fn incoming(&self, id: &SymbolId) -> Vec<(SymbolId, &ReferenceEdge)> {
        self.edges(id, Direction::Incoming)
    }

    fn edges(&self, id: &SymbolId, direction: Direction) -> Vec<(SymbolId, &ReferenceEdge)> {
        let Some(&idx) = self.node_map.get(id) else {
            return Vec::new();
        };

        self.graph
            .edges_directed(idx, direction)
            .filter_map(|e| {
                let other = match direction {
                    Direction::Outgoing => e.target(),
                    Direction::Incoming => e.source(),
                };
                self.graph
                    .node_weight(other)
                    .map(|v| (v.symbol.id.clone(), &e.weight().edge))
            })
            .collect()
    }

    /// Distinct symbols `id` references directly.
    pub fn dependencies(&self, id: &SymbolId) -> Vec<SymbolId> {
        dedup(self.outgoing(id).into_iter().map(|(other, _)| other))
    }

    /// Distinct symbols that reference `id` directly.
    pub fn dependents(&self, id: &SymbolId) -> Vec<SymbolId> {
        dedup(self.incoming(id).into_iter().map(|(other, _)| other))
    }

    /// Number of symbols that transitively depend on `id`.
    pub fn impact_score(&self, id: &SymbolId) -> usize {
        let Some(&start) = self.node_map.get(id) else {
            return 0;
        };

        let mut visited = HashSet::new();
        visited.insert(start);
        let mut queue = VecDeque::from([start]);

        while let Some(current) = queue.pop_front() {
            for neighbor in self.graph.neighbors_directed(current, Direction::Incoming) {
                if visited.insert(neighbor) {
                    queue.push_back(neighbor);
                }
            }
        }

        visited.len() - 1
    }

    /// Strongly connected components that form a cycle: more than one
    /// member, or a single member with a self edge.
    pub fn detect_cycles(&self) -> Vec<Vec<SymbolId>> {
        tarjan_scc(&self.graph)
            .into_iter()
            .filter(|component| {
                component.len() > 1
                    || component
                        .first()
                        .is_some_and(|&n| self.graph.find_edge(n, n).is_some())
            })
            .map(|component| {
                let mut ids: Vec<SymbolId> = component
                    .into_iter()
                    .filter_map(|n| self.graph.node_weight(n).map(|v| v.symbol.id.clone()))
                    .collect();
                ids.sort();
                ids
            })
            .collect()
    }

    pub fn vertices(&self) -> impl Iterator<Item = &SymbolVertex> {
        self.graph
            .node_indices()
            .filter_map(|idx| self.graph.node_weight(idx))
    }

    pub fn vertex_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn stats(&self) -> GraphStats {
        GraphStats {
            vertices: self.graph.node_count(),
            edges: self.graph.edge_count(),
            cross_file_edges: self
                .graph
                .edge_indices()
                .filter_map(|idx| self.graph.edge_weight(idx))
                .filter(|e| e.edge.is_cross_file())
                .count(),
        }
    }

    pub fn clear(&mut self) {
        self.graph.clear();
        self.node_map.clear();
        self.edge_keys.clear();
    }
}

fn dedup(ids: impl Iterator<Item = SymbolId>) -> Vec<SymbolId> {
    let mut seen = HashSet::new();
    ids.filter(|id| seen.insert(id.clone())).collect()
}
