//! Cross-file resolution through the public symbol manager API.

use stratum::relationship::ReferenceType;
use stratum::resolution::DeferredReference;
use stratum::symbol::SymbolRef;
use stratum::{
    FileUri, Priority, Range, ReferenceContext, Scheduler, Symbol, SymbolKind, SymbolManager,
    SymbolReference, SymbolTable,
};

fn class_table(path: &str, name: &str) -> SymbolTable {
    let uri = FileUri::new(format!("file:///src/classes/{path}"));
    let mut table = SymbolTable::new(uri.clone());
    table.add_symbol(Symbol::new(SymbolKind::Class, name, uri, Range::new(0, 0, 40, 1)));
    table
}

fn deferred_from(source: &Symbol, line: u32) -> DeferredReference {
    DeferredReference {
        source_symbol: SymbolRef::from(source),
        reference_type: ReferenceType::TypeReference,
        location: Range::new(line, 4, line, 10),
        context: None,
    }
}

#[test]
fn test_lookup_ignores_case() {
    let manager = SymbolManager::new(Scheduler::new());
    manager.add_symbol_table(class_table("AccountService.cls", "AccountService"));

    for variant in ["AccountService", "accountservice", "ACCOUNTSERVICE", "aCCOUNTsERVICE"] {
        let found = manager.find_symbol_by_name(variant);
        assert_eq!(found.len(), 1, "lookup by {variant}");
        assert_eq!(found[0].name, "AccountService");
    }
}

#[test]
fn test_files_arrive_in_any_order() {
    let manager = SymbolManager::new(Scheduler::new());

    // Caller first: its references wait for their targets
    let mut caller = class_table("Invoice.cls", "Invoice");
    let invoice_id = caller.symbols()[0].id.clone();
    caller.add_reference(
        SymbolReference::new("Customer", ReferenceContext::TypeDeclaration, Range::new(3, 4, 3, 12))
            .within(&invoice_id),
    );
    caller.add_reference(
        SymbolReference::new("LineItem", ReferenceContext::ConstructorCall, Range::new(5, 20, 5, 28))
            .within(&invoice_id),
    );
    let report = manager.add_symbol_table(caller);
    assert_eq!(report.deferred, 2);

    manager.add_symbol_table(class_table("LineItem.cls", "LineItem"));
    manager.add_symbol_table(class_table("Customer.cls", "Customer"));
    manager.scheduler().run_until_idle();

    let stats = manager.stats();
    assert_eq!(stats.deferred, 0);
    assert_eq!(stats.pending, 0);
    assert_eq!(stats.edges, 2);
    assert_eq!(stats.cross_file_edges, 2);

    let customer = manager.find_type("customer").unwrap();
    let incoming = manager.incoming_references(&customer.id);
    assert_eq!(incoming.len(), 1);
    assert_eq!(incoming[0].0, invoice_id);
}

#[test]
fn test_missing_source_moves_entry_to_pending() {
    let manager = SymbolManager::new(Scheduler::new());
    let ghost = Symbol::new(
        SymbolKind::Class,
        "Ghost",
        FileUri::new("file:///src/classes/Ghost.cls"),
        Range::new(0, 0, 10, 1),
    );
    manager.processor().defer("Target", deferred_from(&ghost, 2));

    manager.add_symbol_table(class_table("Target.cls", "Target"));
    manager.scheduler().run_until_idle();

    let stats = manager.stats();
    assert_eq!(stats.deferred, 0);
    assert_eq!(stats.pending, 1);
    assert_eq!(stats.edges, 0);

    manager.add_symbol(ghost);
    manager.scheduler().run_until_idle();

    let stats = manager.stats();
    assert_eq!(stats.pending, 0);
    assert_eq!(stats.edges, 1);
}

#[test]
fn test_same_reference_twice_adds_one_edge() {
    let manager = SymbolManager::new(Scheduler::new());
    let source_table = class_table("Batch.cls", "Batch");
    let source = source_table.symbols()[0].clone();
    manager.add_symbol_table(source_table);
    manager.add_symbol_table(class_table("Target.cls", "Target"));

    let mut first = deferred_from(&source, 7);
    let mut retry = first.clone();
    assert!(manager.processor().resolve_deferred("Target", &mut first).is_resolved());
    let second = manager.processor().resolve_deferred("target", &mut retry);
    assert!(!second.is_resolved());
    assert!(!second.needs_retry());

    // Queued twice through the deferred list as well
    manager.processor().defer("Target", deferred_from(&source, 7));
    manager.processor().defer("Target", deferred_from(&source, 7));
    futures::executor::block_on(
        manager
            .processor()
            .queue_deferred_references_for_symbol("Target", Priority::Normal),
    );
    manager.scheduler().run_until_idle();

    assert_eq!(manager.stats().edges, 1);
    assert_eq!(manager.stats().deferred, 0);
}

#[test]
fn test_backlog_batches_after_first_run_in_background() {
    let manager = SymbolManager::new(Scheduler::new());
    let source_table = class_table("Importer.cls", "Importer");
    let source = source_table.symbols()[0].clone();
    manager.add_symbol_table(source_table);
    manager.add_symbol_table(class_table("Record.cls", "Record"));
    manager.scheduler().run_until_idle();

    for line in 0..25 {
        manager.processor().defer("Record", deferred_from(&source, line + 1));
    }

    let batches = futures::executor::block_on(
        manager
            .processor()
            .queue_deferred_references_for_symbol("Record", Priority::High),
    );
    assert_eq!(batches, 3);

    let scheduler = manager.scheduler();
    assert_eq!(scheduler.depth(Priority::High), 1);
    assert_eq!(scheduler.depth(Priority::Background), 2);

    scheduler.run_until_idle();
    assert_eq!(manager.stats().edges, 25);
    assert_eq!(manager.stats().deferred, 0);
    assert_eq!(manager.stats().resolution.batches_processed, 3);
}

#[test]
fn test_mutual_references_are_reported_as_cycle() {
    let manager = SymbolManager::new(Scheduler::new());

    let mut parent = class_table("Parent.cls", "Parent");
    let parent_id = parent.symbols()[0].id.clone();
    parent.add_reference(
        SymbolReference::new("Child", ReferenceContext::TypeDeclaration, Range::new(2, 4, 2, 9))
            .within(&parent_id),
    );
    let mut child = class_table("Child.cls", "Child");
    let child_id = child.symbols()[0].id.clone();
    child.add_reference(
        SymbolReference::new("Parent", ReferenceContext::TypeDeclaration, Range::new(2, 4, 2, 10))
            .within(&child_id),
    );

    manager.add_symbol_table(parent);
    manager.add_symbol_table(child);
    manager.scheduler().run_until_idle();

    let cycles = manager.detect_circular_dependencies();
    assert_eq!(cycles.len(), 1);
    assert!(cycles[0].contains(&parent_id));
    assert!(cycles[0].contains(&child_id));
}

#[test]
fn test_name_scheduled_twice_moves_each_reference_once() {
    let manager = SymbolManager::new(Scheduler::new());
    for (name, path) in [("Checkout", "Checkout.cls"), ("Refund", "Refund.cls")] {
        let orphan = Symbol::new(
            SymbolKind::Class,
            name,
            FileUri::new(format!("file:///src/classes/{path}")),
            Range::new(0, 0, 10, 1),
        );
        manager.processor().defer("Order", deferred_from(&orphan, 3));
    }

    // Adding the target schedules resolution; an explicit request overlaps it
    manager.add_symbol_table(class_table("Order.cls", "Order"));
    futures::executor::block_on(
        manager
            .processor()
            .queue_deferred_references_for_symbol("order", Priority::Normal),
    );
    manager.scheduler().run_until_idle();

    let stats = manager.stats();
    assert_eq!(stats.deferred, 0);
    assert_eq!(stats.pending, 2);
    assert_eq!(manager.processor().counters().source_not_found, 2);
}

#[test]
fn test_reparse_while_resolution_queued_keeps_one_edge() {
    let manager = SymbolManager::new(Scheduler::new());
    let invoice = || {
        let mut table = class_table("Invoice.cls", "Invoice");
        let id = table.symbols()[0].id.clone();
        table.add_reference(
            SymbolReference::new("Customer", ReferenceContext::TypeDeclaration, Range::new(3, 4, 3, 12))
                .within(&id),
        );
        table
    };

    assert_eq!(manager.add_symbol_table(invoice()).deferred, 1);
    manager.add_symbol_table(class_table("Customer.cls", "Customer"));
    // Reparsed before the queued batch runs; the reference now resolves directly
    let report = manager.add_symbol_table(invoice());
    assert!(report.replaced);
    manager.scheduler().run_until_idle();

    let stats = manager.stats();
    assert_eq!(stats.edges, 1);
    assert_eq!(stats.deferred, 0);
    assert_eq!(stats.pending, 0);
}
