//! Deferred/pending reference processor.
//!
//! A deferred reference waits for its target, a pending one for its source.
//! Resolution moves entries between the two collections until both endpoints
//! are in the graph, at which point exactly one edge is added.

use super::deferred::{DeferredReference, PendingDeferredReference, ReferenceStore};
use super::metrics::{BatchMetrics, BatchReport, MetricsSnapshot, ResolutionCounters};
use super::task::{BatchTask, TaskMeta};
use crate::config::ResolutionConfig;
use crate::relationship::{CallSiteContext, ReferenceEdge, ReferenceType};
use crate::scheduler::{Priority, Scheduler, SharedClock, sleep, yield_now};
use crate::storage::{GraphError, SymbolStore};
use crate::symbol::{Symbol, SymbolRef};
use crate::types::{FileUri, Range, SymbolId};
use std::cell::{Cell, Ref, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Instant;

/// Result of one resolution attempt. None of these are errors to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionOutcome {
    /// Edge added and target reference count bumped
    Resolved,
    /// No symbol with the target name yet
    TargetNotFound,
    /// Target found but the source is not indexed; entry moved to pending
    SourceNotFound,
    /// Both endpoints found but the graph refused the edge
    EdgeRejected(GraphError),
}

impl ResolutionOutcome {
    pub fn is_resolved(&self) -> bool {
        matches!(self, ResolutionOutcome::Resolved)
    }

    pub fn needs_retry(&self) -> bool {
        matches!(
            self,
            ResolutionOutcome::TargetNotFound | ResolutionOutcome::SourceNotFound
        )
    }
}

/// A located graph endpoint.
#[derive(Debug, Clone)]
struct Endpoint {
    id: SymbolId,
    name: String,
    file_uri: FileUri,
}

impl From<&Symbol> for Endpoint {
    fn from(symbol: &Symbol) -> Self {
        Self {
            id: symbol.id.clone(),
            name: symbol.name.clone(),
            file_uri: symbol.file_uri.clone(),
        }
    }
}

impl From<&Endpoint> for SymbolRef {
    fn from(endpoint: &Endpoint) -> Self {
        SymbolRef {
            id: endpoint.id.clone(),
            name: endpoint.name.clone(),
            file_uri: Some(endpoint.file_uri.clone()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ListKind {
    Deferred,
    Pending,
}

/// Handle to the processor. Clones share state.
#[derive(Clone)]
pub struct DeferredReferenceProcessor {
    store: Rc<RefCell<SymbolStore>>,
    references: Rc<RefCell<ReferenceStore>>,
    metrics: Rc<RefCell<BatchMetrics>>,
    scheduler: Scheduler,
    clock: SharedClock,
    config: ResolutionConfig,
    next_batch_id: Rc<Cell<u64>>,
}

impl DeferredReferenceProcessor {
    pub fn new(
        store: Rc<RefCell<SymbolStore>>,
        references: Rc<RefCell<ReferenceStore>>,
        scheduler: Scheduler,
        clock: SharedClock,
        config: ResolutionConfig,
    ) -> Self {
        Self {
            store,
            references,
            metrics: Rc::new(RefCell::new(BatchMetrics::new(&config))),
            scheduler,
            clock,
            config,
            next_batch_id: Rc::new(Cell::new(1)),
        }
    }

    pub fn config(&self) -> &ResolutionConfig {
        &self.config
    }

    pub fn references(&self) -> Ref<'_, ReferenceStore> {
        self.references.borrow()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.borrow().snapshot()
    }

    pub fn counters(&self) -> ResolutionCounters {
        self.metrics.borrow().counters()
    }

    /// Record a reference waiting for a symbol named `target_name`.
    pub fn defer(&self, target_name: &str, reference: DeferredReference) -> usize {
        self.references.borrow_mut().deferred.push(target_name, reference)
    }

    /// Record a reference waiting for its source symbol `source_name`.
    pub fn add_pending(&self, source_name: &str, reference: PendingDeferredReference) -> usize {
        self.references.borrow_mut().pending.push(source_name, reference)
    }

    /// Drop waiting references recorded on behalf of sources in `file_uri`.
    pub fn remove_source_file(&self, file_uri: &FileUri) -> usize {
        let dropped = self.references.borrow_mut().remove_source_file(file_uri);
        if dropped > 0 {
            tracing::trace!(target: "resolution", "{file_uri}: dropped {dropped} waiting references");
        }
        dropped
    }

    /// Resolve one deferred reference.
    ///
    /// The entry is not touched in the deferred collection; callers own its
    /// removal. A missing source moves the entry to pending.
    pub fn resolve_deferred(
        &self,
        target_name: &str,
        reference: &mut DeferredReference,
    ) -> ResolutionOutcome {
        let outcome = {
            let mut store = self.store.borrow_mut();
            match store
                .find_target(target_name, reference.reference_type)
                .map(Endpoint::from)
            {
                Some(target) => {
                    let mut references = self.references.borrow_mut();
                    link_deferred(&mut store, &mut references, &target, reference)
                }
                None => ResolutionOutcome::TargetNotFound,
            }
        };
        self.metrics.borrow_mut().record_outcome(&outcome);
        outcome
    }

    /// Resolve one pending reference. A missing target moves the entry back
    /// to the deferred collection.
    pub fn resolve_pending(
        &self,
        source_name: &str,
        reference: &PendingDeferredReference,
    ) -> ResolutionOutcome {
        let outcome = {
            let mut store = self.store.borrow_mut();
            match store
                .find_preferring_file(source_name, reference.source_file_uri.as_ref())
                .map(Endpoint::from)
            {
                Some(source) => {
                    let mut references = self.references.borrow_mut();
                    link_pending(&mut store, &mut references, &source, reference)
                }
                None => ResolutionOutcome::SourceNotFound,
            }
        };
        self.metrics.borrow_mut().record_outcome(&outcome);
        outcome
    }

    /// Process `[start, end)` of the deferred list for `target_name`.
    pub async fn process_deferred_batch(
        &self,
        target_name: &str,
        start: usize,
        end: usize,
        batch_id: u64,
    ) -> BatchReport {
        let started = self.clock.now();
        let mut report = empty_report(batch_id, target_name);

        if self.store.borrow().find_by_name(target_name).is_empty() {
            tracing::debug!(
                target: "resolution",
                "batch #{batch_id}: no symbol named '{target_name}' yet, leaving entries"
            );
            return self.finish_batch(report, started);
        }

        let entries = self
            .references
            .borrow()
            .deferred
            .slice(target_name, start, end);
        let total = entries.len();
        let mut pacer = YieldPacer::new(total, &self.config);
        let mut anchors: HashMap<ReferenceType, Option<Endpoint>> = HashMap::new();

        for (n, (index, snapshot)) in entries.into_iter().enumerate() {
            let outcome = {
                let mut store = self.store.borrow_mut();
                let anchor = anchors
                    .entry(snapshot.reference_type)
                    .or_insert_with(|| {
                        store
                            .find_target(target_name, snapshot.reference_type)
                            .map(Endpoint::from)
                    })
                    .clone();
                let mut references = self.references.borrow_mut();
                match anchor {
                    // Taken before linking so an overlapping batch finds a tombstone
                    Some(target) => match references.deferred.take_if_eq(target_name, index, &snapshot) {
                        Some(mut reference) => Some(link_deferred(
                            &mut store,
                            &mut references,
                            &target,
                            &mut reference,
                        )),
                        None => None,
                    },
                    None if references.deferred.get(target_name, index) == Some(&snapshot) => {
                        Some(ResolutionOutcome::TargetNotFound)
                    }
                    None => None,
                }
            };

            match outcome {
                Some(outcome) => self.tally(&mut report, &outcome),
                None => report.skipped += 1,
            }

            if pacer.should_yield(self.clock.elapsed_since(started), n + 1 < total) {
                report.yields += 1;
                yield_now().await;
            }
        }

        self.finish_batch(report, started)
    }

    /// Process `[start, end)` of the pending list for `source_name`.
    pub async fn process_pending_batch(
        &self,
        source_name: &str,
        start: usize,
        end: usize,
        batch_id: u64,
    ) -> BatchReport {
        let started = self.clock.now();
        let mut report = empty_report(batch_id, source_name);

        let sources: Vec<Endpoint> = self
            .store
            .borrow()
            .find_by_name(source_name)
            .into_iter()
            .map(Endpoint::from)
            .collect();
        if sources.is_empty() {
            tracing::debug!(
                target: "resolution",
                "batch #{batch_id}: source '{source_name}' not indexed yet, leaving entries"
            );
            return self.finish_batch(report, started);
        }

        let entries = self
            .references
            .borrow()
            .pending
            .slice(source_name, start, end);
        let total = entries.len();
        let mut pacer = YieldPacer::new(total, &self.config);

        for (n, (index, snapshot)) in entries.into_iter().enumerate() {
            let source = snapshot
                .source_file_uri
                .as_ref()
                .and_then(|uri| sources.iter().find(|s| &s.file_uri == uri))
                .unwrap_or(&sources[0]);
            let outcome = {
                let mut store = self.store.borrow_mut();
                let mut references = self.references.borrow_mut();
                references
                    .pending
                    .take_if_eq(source_name, index, &snapshot)
                    .map(|reference| link_pending(&mut store, &mut references, source, &reference))
            };

            match outcome {
                Some(outcome) => self.tally(&mut report, &outcome),
                None => report.skipped += 1,
            }

            if pacer.should_yield(self.clock.elapsed_since(started), n + 1 < total) {
                report.yields += 1;
                yield_now().await;
            }
        }

        self.finish_batch(report, started)
    }

    /// Split the deferred list for `target_name` into batch tasks. The first
    /// batch runs at `priority`, the rest at background. Returns the number
    /// of batches queued.
    pub async fn queue_deferred_references_for_symbol(
        &self,
        target_name: &str,
        priority: Priority,
    ) -> usize {
        let slots = self.references.borrow().deferred.slots(target_name);
        self.queue_batches(ListKind::Deferred, target_name, slots, priority)
            .await
    }

    /// Pending counterpart of
    /// [`queue_deferred_references_for_symbol`](Self::queue_deferred_references_for_symbol),
    /// keyed by source name.
    pub async fn queue_pending_references_for_symbol(
        &self,
        source_name: &str,
        priority: Priority,
    ) -> usize {
        let slots = self.references.borrow().pending.slots(source_name);
        self.queue_batches(ListKind::Pending, source_name, slots, priority)
            .await
    }

    async fn queue_batches(
        &self,
        kind: ListKind,
        name: &str,
        slots: usize,
        priority: Priority,
    ) -> usize {
        if slots == 0 {
            return 0;
        }

        let batch_size = self.config.batch_size.max(1);
        let num_batches = slots.div_ceil(batch_size);
        let yield_every = if num_batches > 20 {
            1
        } else {
            (num_batches / 5).max(1)
        };
        let now = self.clock.now();

        tracing::debug!(
            target: "resolution",
            "queueing {num_batches} {kind:?} batches for '{name}' ({slots} slots)"
        );

        for batch in 0..num_batches {
            let start = batch * batch_size;
            let end = (start + batch_size).min(slots);
            let batch_priority = if batch == 0 {
                priority
            } else {
                Priority::Background
            };
            let meta = TaskMeta::new(batch_priority, now);
            let batch_id = self.next_batch_id();

            self.submit(match kind {
                ListKind::Deferred => BatchTask::DeferredBatch {
                    target_name: name.to_string(),
                    start,
                    end,
                    batch_id,
                    meta,
                },
                ListKind::Pending => BatchTask::PendingDeferredBatch {
                    source_name: name.to_string(),
                    start,
                    end,
                    batch_id,
                    meta,
                },
            });

            if (batch + 1) % yield_every == 0 && batch + 1 < num_batches {
                yield_now().await;
            }
        }
        num_batches
    }

    /// Take one deferred entry out of its list and queue it as a single task.
    pub fn submit_deferred_entry(&self, target_name: &str, index: usize, priority: Priority) -> bool {
        let Some(reference) = self.references.borrow_mut().deferred.take(target_name, index) else {
            return false;
        };
        self.submit(BatchTask::Deferred {
            target_name: target_name.to_string(),
            reference,
            meta: TaskMeta::new(priority, self.clock.now()),
        });
        true
    }

    /// Take one pending entry out of its list and queue it as a single task.
    pub fn submit_pending_entry(&self, source_name: &str, index: usize, priority: Priority) -> bool {
        let Some(reference) = self.references.borrow_mut().pending.take(source_name, index) else {
            return false;
        };
        self.submit(BatchTask::PendingDeferred {
            source_name: source_name.to_string(),
            reference,
            meta: TaskMeta::new(priority, self.clock.now()),
        });
        true
    }

    /// Hand a task to the scheduler at its own priority.
    pub fn submit(&self, task: BatchTask) {
        let priority = task.priority();
        let label = task.label();
        let processor = self.clone();
        self.scheduler
            .offer(priority, label, async move { processor.run(task).await });
    }

    async fn run(&self, task: BatchTask) {
        match task {
            BatchTask::Deferred {
                target_name,
                reference,
                meta,
            } => {
                self.back_off(&meta).await;
                self.run_single_deferred(target_name, reference, meta);
            }
            BatchTask::PendingDeferred {
                source_name,
                reference,
                meta,
            } => {
                self.back_off(&meta).await;
                self.run_single_pending(source_name, reference, meta);
            }
            BatchTask::DeferredBatch {
                target_name,
                start,
                end,
                batch_id,
                ..
            } => {
                self.process_deferred_batch(&target_name, start, end, batch_id)
                    .await;
            }
            BatchTask::PendingDeferredBatch {
                source_name,
                start,
                end,
                batch_id,
                ..
            } => {
                self.process_pending_batch(&source_name, start, end, batch_id)
                    .await;
            }
        }
    }

    /// Retried tasks wait longer on each attempt before resolving again.
    async fn back_off(&self, meta: &TaskMeta) {
        if meta.retry_count > 0 {
            sleep(&self.clock, self.config.retry_delay(meta.retry_count)).await;
        }
    }

    fn run_single_deferred(&self, target_name: String, mut reference: DeferredReference, meta: TaskMeta) {
        if self.resolve_deferred(&target_name, &mut reference) != ResolutionOutcome::TargetNotFound {
            return;
        }

        if meta.retry_count < self.config.max_retries {
            self.submit(BatchTask::Deferred {
                target_name,
                reference,
                meta: meta.retried(),
            });
        } else {
            tracing::debug!(
                target: "resolution",
                "'{target_name}' still missing after {} retries, back to deferred",
                meta.retry_count
            );
            self.defer(&target_name, reference);
        }
    }

    fn run_single_pending(&self, source_name: String, reference: PendingDeferredReference, meta: TaskMeta) {
        if self.resolve_pending(&source_name, &reference) != ResolutionOutcome::SourceNotFound {
            return;
        }

        if meta.retry_count < self.config.max_retries {
            self.submit(BatchTask::PendingDeferred {
                source_name,
                reference,
                meta: meta.retried(),
            });
        } else {
            tracing::debug!(
                target: "resolution",
                "source '{source_name}' still missing after {} retries, back to pending",
                meta.retry_count
            );
            self.add_pending(&source_name, reference);
        }
    }

    fn next_batch_id(&self) -> u64 {
        let id = self.next_batch_id.get();
        self.next_batch_id.set(id + 1);
        id
    }

    fn tally(&self, report: &mut BatchReport, outcome: &ResolutionOutcome) {
        report.items += 1;
        if outcome.is_resolved() {
            report.successes += 1;
        } else {
            report.failures += 1;
        }
        self.metrics.borrow_mut().record_outcome(outcome);
    }

    fn finish_batch(&self, mut report: BatchReport, started: Instant) -> BatchReport {
        report.duration = self.clock.elapsed_since(started);
        report.queue_depth = self.scheduler.queue_depth();
        self.metrics
            .borrow_mut()
            .record_batch(&report, self.clock.now());
        report
    }
}

/// Decides when a batch gives control back.
///
/// Base interval is one yield per `max(1, size / 20)` items. Once the batch
/// has run longer than the configured threshold the interval is halved.
struct YieldPacer {
    interval: usize,
    threshold: std::time::Duration,
    halved: bool,
    since_yield: usize,
}

impl YieldPacer {
    fn new(batch_len: usize, config: &ResolutionConfig) -> Self {
        Self {
            interval: (batch_len / 20).max(1),
            threshold: config.yield_time_threshold(),
            halved: false,
            since_yield: 0,
        }
    }

    fn should_yield(&mut self, elapsed: std::time::Duration, more_items: bool) -> bool {
        if !self.halved && elapsed > self.threshold {
            self.interval = (self.interval / 2).max(1);
            self.halved = true;
        }
        self.since_yield += 1;
        if more_items && self.since_yield >= self.interval {
            self.since_yield = 0;
            return true;
        }
        false
    }
}

fn empty_report(batch_id: u64, name: &str) -> BatchReport {
    BatchReport {
        batch_id,
        name: name.to_string(),
        items: 0,
        successes: 0,
        failures: 0,
        skipped: 0,
        yields: 0,
        duration: std::time::Duration::ZERO,
        queue_depth: 0,
    }
}

/// Second half of the deferred algorithm once the target is known.
fn link_deferred(
    store: &mut SymbolStore,
    references: &mut ReferenceStore,
    target: &Endpoint,
    reference: &mut DeferredReference,
) -> ResolutionOutcome {
    let source = store
        .get(&reference.source_symbol.id)
        .or_else(|| {
            store.find_preferring_file(
                &reference.source_symbol.name,
                reference.source_symbol.file_uri.as_ref(),
            )
        })
        .map(Endpoint::from);

    let Some(source) = source else {
        references.pending.push(
            &reference.source_symbol.name,
            PendingDeferredReference {
                target_symbol_name: target.name.clone(),
                reference_type: reference.reference_type,
                location: reference.location,
                context: reference.context.clone(),
                source_file_uri: reference.source_symbol.file_uri.clone(),
            },
        );
        return ResolutionOutcome::SourceNotFound;
    };

    if reference.source_symbol.file_uri.is_none() {
        reference.source_symbol.file_uri = Some(source.file_uri.clone());
    }

    add_edge(
        store,
        &source,
        target,
        reference.reference_type,
        reference.location,
        reference.context.clone(),
    )
}

/// Second half of the pending algorithm once the source is known.
fn link_pending(
    store: &mut SymbolStore,
    references: &mut ReferenceStore,
    source: &Endpoint,
    reference: &PendingDeferredReference,
) -> ResolutionOutcome {
    let Some(target) = store
        .find_target(&reference.target_symbol_name, reference.reference_type)
        .map(Endpoint::from)
    else {
        references.deferred.push(
            &reference.target_symbol_name,
            DeferredReference {
                source_symbol: SymbolRef::from(source),
                reference_type: reference.reference_type,
                location: reference.location,
                context: reference.context.clone(),
            },
        );
        return ResolutionOutcome::TargetNotFound;
    };

    add_edge(
        store,
        source,
        &target,
        reference.reference_type,
        reference.location,
        reference.context.clone(),
    )
}

fn add_edge(
    store: &mut SymbolStore,
    source: &Endpoint,
    target: &Endpoint,
    reference_type: ReferenceType,
    location: Range,
    context: Option<CallSiteContext>,
) -> ResolutionOutcome {
    let mut edge = ReferenceEdge::new(
        reference_type,
        source.file_uri.clone(),
        target.file_uri.clone(),
        location,
    );
    if let Some(context) = context {
        edge = edge.with_context(context);
    }

    let graph = store.graph_mut();
    match graph.try_add_edge(&source.id, &target.id, 1, edge) {
        Ok(()) => {
            graph.increment_reference_count(&target.id);
            tracing::trace!(
                target: "resolution",
                "{} -[{reference_type}]-> {}",
                source.name,
                target.name
            );
            ResolutionOutcome::Resolved
        }
        Err(error @ GraphError::DuplicateEdge { .. }) => {
            tracing::debug!(target: "resolution", "{error}");
            ResolutionOutcome::EdgeRejected(error)
        }
        Err(error) => {
            tracing::warn!(target: "resolution", "edge rejected: {error}");
            ResolutionOutcome::EdgeRejected(error)
        }
    }
}
