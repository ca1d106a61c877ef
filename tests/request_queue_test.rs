//! Protocol-facing requests answered through a server context.

use serde_json::{Value, json};
use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;
use stratum::queue::{QueueError, WorkspaceLoader};
use stratum::scheduler::ManualClock;
use stratum::{
    FileUri, Range, ReferenceContext, ServerContext, Settings, Symbol, SymbolKind,
    SymbolManager, SymbolReference, SymbolTable,
};

const ACCOUNT: &str = "file:///src/classes/Account.cls";
const BILLING: &str = "file:///src/classes/Billing.cls";

fn account_table() -> SymbolTable {
    let uri = FileUri::new(ACCOUNT);
    let mut table = SymbolTable::new(uri.clone());
    table.add_symbol(Symbol::new(SymbolKind::Class, "Account", uri, Range::new(0, 0, 30, 1)));
    table
}

/// `class Billing { void charge() { Account a = new Account(); Ledger l; } }`
fn billing_table() -> SymbolTable {
    let uri = FileUri::new(BILLING);
    let mut table = SymbolTable::new(uri.clone());
    let class = table.add_symbol(Symbol::new(SymbolKind::Class, "Billing", uri.clone(), Range::new(0, 0, 20, 1)));
    let charge = table.add_symbol(
        Symbol::new(SymbolKind::Method, "charge", uri, Range::new(2, 4, 8, 5)).with_parent(&class),
    );
    table.add_reference(
        SymbolReference::new("Account", ReferenceContext::ConstructorCall, Range::new(3, 24, 3, 31))
            .within(&charge),
    );
    table.add_reference(
        SymbolReference::new("Ledger", ReferenceContext::TypeDeclaration, Range::new(4, 8, 4, 14))
            .within(&charge),
    );
    table
}

fn context() -> ServerContext {
    let clock = Rc::new(ManualClock::ticking(Duration::from_millis(1)));
    ServerContext::with_clock(Settings::default(), clock)
}

fn answer(context: &ServerContext, handle: stratum::queue::RequestHandle) -> Value {
    context.scheduler().run_until_idle();
    futures::executor::block_on(handle).unwrap()
}

#[test]
fn test_open_documents_then_navigate() {
    let context = context();
    let queue = context.queue();

    for table in [billing_table(), account_table()] {
        let uri = table.file_uri().unwrap().as_str().to_string();
        let handle = queue
            .submit_document_open_request(json!({ "uri": uri, "table": table }))
            .unwrap();
        answer(&context, handle);
    }
    assert_eq!(context.symbol_manager().stats().edges, 1);

    let hover = queue
        .submit_hover_request(json!({ "uri": BILLING, "line": 3, "character": 26 }))
        .unwrap();
    let hover = answer(&context, hover);
    assert_eq!(hover["name"], "Account");
    assert_eq!(hover["uri"], ACCOUNT);

    let references = queue
        .submit_references_request(json!({
            "uri": ACCOUNT, "line": 0, "character": 2, "includeDeclaration": true
        }))
        .unwrap();
    let references = answer(&context, references);
    let uris: Vec<&str> = references
        .as_array()
        .unwrap()
        .iter()
        .map(|l| l["uri"].as_str().unwrap())
        .collect();
    assert_eq!(uris, vec![ACCOUNT, BILLING]);
}

#[test]
fn test_diagnostics_report_unknown_types() {
    let context = context();
    let queue = context.queue();
    context.symbol_manager().add_symbol_table(account_table());
    context.symbol_manager().add_symbol_table(billing_table());

    let handle = queue.submit_diagnostics_request(json!({ "uri": BILLING })).unwrap();
    let report = answer(&context, handle);

    assert_eq!(report["isValid"], false);
    let errors = report["errors"].as_array().unwrap();
    assert_eq!(errors.len(), 1);
    assert!(errors[0]["message"].as_str().unwrap().contains("Ledger"));
}

#[test]
fn test_interactive_request_overtakes_queued_rename() {
    let context = context();
    let queue = context.queue();
    context.symbol_manager().add_symbol_table(account_table());

    let mut rename = queue
        .submit_rename_request(json!({ "uri": ACCOUNT, "line": 0, "character": 2, "newName": "Client" }))
        .unwrap();
    let mut hover = queue
        .submit_hover_request(json!({ "uri": ACCOUNT, "line": 0, "character": 2 }))
        .unwrap();

    assert!(context.scheduler().step());
    assert!(hover.try_result().is_some());
    assert!(rename.try_result().is_none());

    context.scheduler().run_until_idle();
    let edits = rename.try_result().unwrap().unwrap();
    assert_eq!(edits["changes"][ACCOUNT][0]["newText"], "Client");
}

#[test]
fn test_shutdown_rejects_then_fresh_queue_accepts() {
    let context = context();
    let queue = context.queue();

    assert!(context.shutdown());
    assert_eq!(
        queue.submit_completion_request(json!({})).err(),
        Some(QueueError::Shutdown)
    );
    assert!(!queue.shutdown());

    let fresh = context.queue();
    let handle = fresh
        .submit_workspace_symbol_request(json!({ "query": "acc" }))
        .unwrap();
    assert_eq!(answer(&context, handle), json!([]));
}

struct SlowWorkspace {
    triggers: Cell<u32>,
}

impl WorkspaceLoader for SlowWorkspace {
    fn trigger(&self, manager: &SymbolManager) -> anyhow::Result<()> {
        self.triggers.set(self.triggers.get() + 1);
        manager.add_symbol_table(account_table());
        manager.add_symbol_table(billing_table());
        Ok(())
    }

    fn is_loaded(&self, manager: &SymbolManager) -> bool {
        manager.files().len() == 2
    }
}

#[test]
fn test_workspace_load_requested_from_many_handlers() {
    let context = context();
    let loader = Rc::new(SlowWorkspace { triggers: Cell::new(0) });
    let coordinator = context.workspace_coordinator(loader.clone());

    let started: Vec<bool> = (0..5).map(|_| coordinator.ensure_workspace_loaded()).collect();
    assert_eq!(started, vec![true, false, false, false, false]);
    assert_eq!(coordinator.active_monitors(), 1);

    context.scheduler().run_until_idle();

    assert_eq!(loader.triggers.get(), 1);
    assert!(coordinator.is_loaded());
    assert_eq!(coordinator.stats().max_active_monitors, 1);
    assert_eq!(context.symbol_manager().files().len(), 2);
}
