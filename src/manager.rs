//! Symbol manager facade.
//!
//! Entry point for the ingestion layer and for request handlers. Owns the
//! symbol store, the per-file tables and detail levels, and feeds unresolved
//! references to the deferred reference processor.

use crate::config::{ResolutionConfig, Settings};
use crate::enrichment::DetailLevel;
use crate::relationship::{CallSiteContext, ReferenceEdge, ReferenceType};
use crate::resolution::{
    DeferredReference, DeferredReferenceProcessor, MetricsSnapshot, ReferenceStore,
    ResolutionOutcome,
};
use crate::scheduler::{Priority, Scheduler, SharedClock, SystemClock, yield_now};
use crate::storage::{GraphStats, SymbolStore};
use crate::symbol::{Symbol, SymbolRef, SymbolReference, SymbolTable};
use crate::types::{FileUri, Position, SymbolId, SymbolKind};
use serde::Serialize;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// Where and what to resolve a bare or dotted name for.
#[derive(Debug, Clone, Default)]
pub struct ResolutionContext {
    pub file_uri: Option<FileUri>,
    /// Innermost enclosing declaration. Derived from `position` when unset.
    pub scope: Option<SymbolId>,
    pub position: Option<Position>,
    pub namespace: Option<String>,
    pub expected_kind: Option<SymbolKind>,
}

impl ResolutionContext {
    pub fn in_file(file_uri: FileUri) -> Self {
        Self {
            file_uri: Some(file_uri),
            ..Self::default()
        }
    }

    pub fn at(mut self, position: Position) -> Self {
        self.position = Some(position);
        self
    }

    pub fn within(mut self, scope: &SymbolId) -> Self {
        self.scope = Some(scope.clone());
        self
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn expecting(mut self, kind: SymbolKind) -> Self {
        self.expected_kind = Some(kind);
        self
    }
}

/// Summary of one ingestion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub symbols: usize,
    pub resolved: usize,
    pub deferred: usize,
    /// The file was already indexed and got replaced
    pub replaced: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DependencyAnalysis {
    pub dependencies: Vec<SymbolId>,
    pub dependents: Vec<SymbolId>,
    pub impact_score: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ManagerStats {
    pub symbols: usize,
    pub files: usize,
    pub edges: usize,
    pub cross_file_edges: usize,
    pub deferred: usize,
    pub pending: usize,
    pub resolution: MetricsSnapshot,
}

/// Handle to the symbol model. Clones share state.
#[derive(Clone)]
pub struct SymbolManager {
    store: Rc<RefCell<SymbolStore>>,
    tables: Rc<RefCell<HashMap<FileUri, SymbolTable>>>,
    detail_levels: Rc<RefCell<HashMap<FileUri, DetailLevel>>>,
    processor: DeferredReferenceProcessor,
    scheduler: Scheduler,
}

impl SymbolManager {
    /// Manager with default settings and the system clock.
    pub fn new(scheduler: Scheduler) -> Self {
        Self::with_config(scheduler, Rc::new(SystemClock), ResolutionConfig::default())
    }

    pub fn from_settings(scheduler: Scheduler, settings: &Settings) -> Self {
        Self::with_config(scheduler, Rc::new(SystemClock), settings.resolution.clone())
    }

    pub fn with_config(scheduler: Scheduler, clock: SharedClock, config: ResolutionConfig) -> Self {
        let store = Rc::new(RefCell::new(SymbolStore::new()));
        let processor = DeferredReferenceProcessor::new(
            Rc::clone(&store),
            Rc::new(RefCell::new(ReferenceStore::new())),
            scheduler.clone(),
            clock,
            config,
        );
        Self {
            store,
            tables: Rc::new(RefCell::new(HashMap::new())),
            detail_levels: Rc::new(RefCell::new(HashMap::new())),
            processor,
            scheduler,
        }
    }

    pub fn processor(&self) -> &DeferredReferenceProcessor {
        &self.processor
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Add a single symbol and wake anything waiting for its name.
    pub fn add_symbol(&self, symbol: Symbol) -> bool {
        let name = symbol.name.clone();
        let added = self.store.borrow_mut().insert(symbol);
        if added {
            self.schedule_resolution(vec![name], Priority::Normal);
        }
        added
    }

    pub fn get_symbol(&self, id: &SymbolId) -> Option<Symbol> {
        self.store.borrow().get(id).cloned()
    }

    /// Every symbol named `name`, in any case.
    pub fn find_symbol_by_name(&self, name: &str) -> Vec<Symbol> {
        self.store
            .borrow()
            .find_by_name(name)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn find_symbol_by_fqn(&self, fqn: &str) -> Option<Symbol> {
        self.store.borrow().find_by_fqn(fqn).cloned()
    }

    /// First type declaration (class, interface, enum) named `name`.
    pub fn find_type(&self, name: &str) -> Option<Symbol> {
        let store = self.store.borrow();
        store
            .find_by_fqn(name)
            .filter(|s| s.kind.is_type())
            .or_else(|| store.find_by_name(name).into_iter().find(|s| s.kind.is_type()))
            .cloned()
    }

    pub fn find_symbols_in_file(&self, file_uri: &FileUri) -> Vec<Symbol> {
        self.store
            .borrow()
            .symbols_in_file(file_uri)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn files(&self) -> Vec<FileUri> {
        self.store.borrow().files().cloned().collect()
    }

    /// Replace everything known about the table's file with its contents.
    ///
    /// References that resolve right away become edges; the rest are parked
    /// as deferred references and resolution is scheduled for every newly
    /// declared name that something is waiting on.
    pub fn add_symbol_table(&self, table: SymbolTable) -> IngestReport {
        let Some(file_uri) = table_file(&table) else {
            return IngestReport::default();
        };

        let replaced = self.tables.borrow().contains_key(&file_uri);
        if replaced {
            self.remove_file(&file_uri);
        }

        let mut report = self.ingest(&file_uri, table.symbols(), table.references());
        report.replaced = replaced;
        self.tables.borrow_mut().insert(file_uri.clone(), table);

        tracing::debug!(
            target: "graph",
            "{file_uri}: {} symbols, {} resolved, {} deferred",
            report.symbols,
            report.resolved,
            report.deferred
        );
        report
    }

    /// Add the symbols and references of `table` to what is already known
    /// about its file. Symbols already present are kept as they are.
    pub fn merge_symbol_table(&self, table: SymbolTable) -> IngestReport {
        let Some(file_uri) = table_file(&table) else {
            return IngestReport::default();
        };

        let new_symbols: Vec<Symbol> = {
            let store = self.store.borrow();
            table
                .symbols()
                .iter()
                .filter(|s| !store.contains(&s.id))
                .cloned()
                .collect()
        };
        let new_references: Vec<SymbolReference> = {
            let tables = self.tables.borrow();
            let known = tables.get(&file_uri).map(SymbolTable::references);
            table
                .references()
                .iter()
                .filter(|r| !known.is_some_and(|known| known.contains(r)))
                .cloned()
                .collect()
        };

        let report = self.ingest(&file_uri, &new_symbols, &new_references);

        let mut tables = self.tables.borrow_mut();
        let stored = tables
            .entry(file_uri.clone())
            .or_insert_with(|| SymbolTable::new(file_uri));
        for symbol in new_symbols {
            stored.add_symbol(symbol);
        }
        for reference in new_references {
            stored.add_reference(reference);
        }
        report
    }

    fn ingest(
        &self,
        file_uri: &FileUri,
        symbols: &[Symbol],
        references: &[SymbolReference],
    ) -> IngestReport {
        let mut report = IngestReport::default();
        let mut new_names = Vec::new();

        {
            let mut store = self.store.borrow_mut();
            for symbol in symbols {
                if store.insert(symbol.clone()) {
                    report.symbols += 1;
                    new_names.push(symbol.name.clone());
                }
            }
        }

        let fallback_source = symbols
            .iter()
            .find(|s| s.parent_id.is_none() && s.kind.is_type())
            .map(|s| s.id.clone());

        for reference in references {
            let Some(reference_type) = reference.context.reference_type() else {
                continue;
            };
            let Some(source_id) = reference
                .enclosing_symbol_id
                .clone()
                .or_else(|| fallback_source.clone())
            else {
                continue;
            };
            let Some(source) = self.store.borrow().get(&source_id).map(SymbolRef::from) else {
                continue;
            };

            let mut deferred = DeferredReference {
                source_symbol: source,
                reference_type,
                location: reference.location,
                context: Some(call_site(reference, reference_type, file_uri, symbols)),
            };
            match self.processor.resolve_deferred(&reference.name, &mut deferred) {
                ResolutionOutcome::Resolved => report.resolved += 1,
                ResolutionOutcome::TargetNotFound => {
                    self.processor.defer(&reference.name, deferred);
                    report.deferred += 1;
                }
                ResolutionOutcome::SourceNotFound | ResolutionOutcome::EdgeRejected(_) => {}
            }
        }

        self.schedule_resolution(new_names, Priority::Normal);
        report
    }

    /// Queue deferred and pending work for names that now have a symbol.
    fn schedule_resolution(&self, names: Vec<String>, priority: Priority) {
        let waiting: Vec<String> = {
            let references = self.processor.references();
            let mut waiting: Vec<String> = names
                .into_iter()
                .filter(|name| {
                    references.deferred.contains(name) || references.pending.contains(name)
                })
                .collect();
            waiting.sort_by_key(|name| name.to_lowercase());
            waiting.dedup_by(|a, b| a.eq_ignore_ascii_case(b));
            waiting
        };
        if waiting.is_empty() {
            return;
        }

        let processor = self.processor.clone();
        let label = format!("resolve-waiting ({} names)", waiting.len());
        self.scheduler.offer(priority, label, async move {
            for name in waiting {
                processor
                    .queue_deferred_references_for_symbol(&name, priority)
                    .await;
                processor
                    .queue_pending_references_for_symbol(&name, priority)
                    .await;
                yield_now().await;
            }
        });
    }

    /// Drop a file's symbols, table and detail level.
    ///
    /// Edges from other files into the removed symbols are turned back into
    /// deferred references, so they come back when the file is reparsed.
    pub fn remove_file(&self, file_uri: &FileUri) -> usize {
        let removed = {
            let mut store = self.store.borrow_mut();
            let mut orphaned = Vec::new();
            for symbol in store.symbols_in_file(file_uri) {
                for (source_id, edge) in store.graph().incoming(&symbol.id) {
                    if &edge.source_file_uri == file_uri {
                        continue;
                    }
                    if let Some(source) = store.get(&source_id) {
                        orphaned.push((
                            symbol.name.clone(),
                            DeferredReference {
                                source_symbol: SymbolRef::from(source),
                                reference_type: edge.reference_type,
                                location: edge.location,
                                context: edge.context.clone(),
                            },
                        ));
                    }
                }
            }

            let removed = store.remove_file(file_uri);
            drop(store);

            for (target_name, reference) in orphaned {
                self.processor.defer(&target_name, reference);
            }
            removed.len()
        };

        self.processor.remove_source_file(file_uri);
        self.tables.borrow_mut().remove(file_uri);
        self.detail_levels.borrow_mut().remove(file_uri);

        if removed > 0 {
            tracing::debug!(target: "graph", "{file_uri}: removed {removed} symbols");
        }
        removed
    }

    /// Resolve `name` as seen from `context`.
    ///
    /// Dotted names are tried as FQNs first, then as `Owner.member`. Bare
    /// names prefer, in order: the nearest enclosing scope, the same file,
    /// the context namespace, then any non-local declaration.
    pub fn resolve_symbol(&self, name: &str, context: &ResolutionContext) -> Option<Symbol> {
        let kind_ok = |s: &Symbol| context.expected_kind.is_none_or(|kind| s.kind == kind);

        if let Some((qualifier, member)) = name.rsplit_once('.') {
            if let Some(found) = self.find_symbol_by_fqn(name).filter(|s| kind_ok(s)) {
                return Some(found);
            }
            let owner_context = ResolutionContext {
                expected_kind: None,
                ..context.clone()
            };
            let owner = self.resolve_symbol(qualifier, &owner_context)?;
            return self
                .store
                .borrow()
                .find_by_name(member)
                .into_iter()
                .find(|s| s.parent_id.as_ref() == Some(&owner.id) && kind_ok(s))
                .cloned();
        }

        if let Some(namespace) = &context.namespace
            && let Some(found) = self
                .find_symbol_by_fqn(&format!("{namespace}.{name}"))
                .filter(|s| kind_ok(s))
        {
            return Some(found);
        }

        let scope = context.scope.clone().or_else(|| {
            let file_uri = context.file_uri.as_ref()?;
            let position = context.position?;
            self.get_symbol_at_position(file_uri, position)
                .map(|s| s.id)
        });

        let store = self.store.borrow();
        let candidates: Vec<&Symbol> = store
            .find_by_name(name)
            .into_iter()
            .filter(|s| kind_ok(s))
            .collect();
        if candidates.is_empty() {
            return None;
        }

        let mut current = scope;
        let mut depth = 0;
        while let Some(scope_id) = current {
            if let Some(found) = candidates
                .iter()
                .find(|c| c.parent_id.as_ref() == Some(&scope_id) || c.id == scope_id)
            {
                return Some((*found).clone());
            }
            depth += 1;
            if depth > store.len() {
                break;
            }
            current = store.get(&scope_id).and_then(|s| s.parent_id.clone());
        }

        let non_local = || candidates.iter().filter(|c| !c.kind.is_local());
        context
            .file_uri
            .as_ref()
            .and_then(|uri| non_local().find(|c| &c.file_uri == uri))
            .or_else(|| {
                let namespace = context.namespace.as_deref()?;
                non_local().find(|c| {
                    c.namespace
                        .as_deref()
                        .is_some_and(|ns| ns.eq_ignore_ascii_case(namespace))
                })
            })
            .or_else(|| non_local().next())
            .map(|found| (*found).clone())
    }

    /// Innermost declaration containing `position`.
    pub fn get_symbol_at_position(&self, file_uri: &FileUri, position: Position) -> Option<Symbol> {
        self.tables
            .borrow()
            .get(file_uri)
            .and_then(|table| table.symbol_at(position).cloned())
    }

    /// References covering `position`, innermost first.
    pub fn get_references_at_position(
        &self,
        file_uri: &FileUri,
        position: Position,
    ) -> Vec<SymbolReference> {
        self.tables
            .borrow()
            .get(file_uri)
            .map(|table| table.references_at(position).into_iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Run `f` against the stored table of a file.
    pub fn with_table<R>(&self, file_uri: &FileUri, f: impl FnOnce(&SymbolTable) -> R) -> Option<R> {
        self.tables.borrow().get(file_uri).map(f)
    }

    /// Dotted name from the namespace down through every enclosing
    /// declaration, e.g. `acme.Outer.Inner.run`.
    pub fn construct_fqn(&self, symbol: &Symbol) -> String {
        let store = self.store.borrow();
        let mut parts = vec![symbol.name.clone()];
        let mut parent = symbol.parent_id.clone();
        let mut namespace = symbol.namespace.clone();

        while let Some(parent_id) = parent {
            let Some(owner) = store.get(&parent_id) else {
                break;
            };
            parts.push(owner.name.clone());
            if namespace.is_none() {
                namespace = owner.namespace.clone();
            }
            parent = owner.parent_id.clone();
            if parts.len() > store.len() + 1 {
                break;
            }
        }

        if let Some(namespace) = namespace.filter(|ns| !ns.is_empty()) {
            parts.push(namespace);
        }
        parts.reverse();
        parts.join(".")
    }

    pub fn analyze_dependencies(&self, id: &SymbolId) -> DependencyAnalysis {
        let store = self.store.borrow();
        let graph = store.graph();
        DependencyAnalysis {
            dependencies: graph.dependencies(id),
            dependents: graph.dependents(id),
            impact_score: graph.impact_score(id),
        }
    }

    /// Edges pointing at `id`, with the id of each referencing symbol.
    pub fn incoming_references(&self, id: &SymbolId) -> Vec<(SymbolId, ReferenceEdge)> {
        self.store
            .borrow()
            .graph()
            .incoming(id)
            .into_iter()
            .map(|(source, edge)| (source, edge.clone()))
            .collect()
    }

    pub fn detect_circular_dependencies(&self) -> Vec<Vec<SymbolId>> {
        self.store.borrow().graph().detect_cycles()
    }

    pub fn detail_level(&self, file_uri: &FileUri) -> Option<DetailLevel> {
        self.detail_levels.borrow().get(file_uri).copied()
    }

    /// Raise the recorded level of a file. Lower levels are ignored.
    /// Returns the level in effect afterwards.
    pub fn set_detail_level(&self, file_uri: &FileUri, level: DetailLevel) -> DetailLevel {
        let mut levels = self.detail_levels.borrow_mut();
        let current = levels.entry(file_uri.clone()).or_insert(level);
        if level > *current {
            *current = level;
        }
        *current
    }

    pub fn reset_detail_level(&self, file_uri: &FileUri) {
        self.detail_levels.borrow_mut().remove(file_uri);
    }

    pub fn graph_stats(&self) -> GraphStats {
        self.store.borrow().graph().stats()
    }

    pub fn stats(&self) -> ManagerStats {
        let graph = self.graph_stats();
        let references = self.processor.references();
        ManagerStats {
            symbols: graph.vertices,
            files: self.store.borrow().files().count(),
            edges: graph.edges,
            cross_file_edges: graph.cross_file_edges,
            deferred: references.deferred.total(),
            pending: references.pending.total(),
            resolution: self.processor.metrics(),
        }
    }
}

fn table_file(table: &SymbolTable) -> Option<FileUri> {
    table
        .file_uri()
        .cloned()
        .or_else(|| table.symbols().first().map(|s| s.file_uri.clone()))
}

fn call_site(
    reference: &SymbolReference,
    reference_type: ReferenceType,
    file_uri: &FileUri,
    symbols: &[Symbol],
) -> CallSiteContext {
    let method_name = reference
        .enclosing_symbol_id
        .as_ref()
        .and_then(|id| symbols.iter().find(|s| &s.id == id))
        .filter(|s| s.kind.is_callable())
        .map(|s| s.name.clone());
    let namespace = symbols
        .iter()
        .find(|s| &s.file_uri == file_uri && s.namespace.is_some())
        .and_then(|s| s.namespace.clone());

    CallSiteContext {
        method_name,
        parameter_index: reference.parameter_index,
        is_static: reference_type == ReferenceType::StaticAccess,
        namespace,
    }
}
