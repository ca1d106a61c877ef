//! Layered enrichment driven by a full parse sliced into visibility layers.

use std::cell::Cell;
use std::rc::Rc;
use stratum::enrichment::{EnrichmentResult, VisibilityLayers};
use stratum::{
    DetailLevel, FileUri, LayeredEnrichmentService, Modifiers, Range, ResolutionContext,
    Scheduler, Symbol, SymbolKind, SymbolManager, SymbolTable, Visibility,
};

const SOURCE: &str = "public class Ledger { public void post() {} private void audit() {} }";

fn parse_ledger(file_uri: &FileUri, _text: &str) -> EnrichmentResult<SymbolTable> {
    let mut table = SymbolTable::new(file_uri.clone());
    let class = table.add_symbol(Symbol::new(SymbolKind::Class, "Ledger", file_uri.clone(), Range::new(0, 0, 12, 1)));
    for (line, name, visibility) in [
        (2, "post", Visibility::Public),
        (6, "reconcile", Visibility::Protected),
        (9, "audit", Visibility::Private),
    ] {
        table.add_symbol(
            Symbol::new(SymbolKind::Method, name, file_uri.clone(), Range::new(line, 4, line + 2, 5))
                .with_parent(&class)
                .with_modifiers(Modifiers::default().with_visibility(visibility)),
        );
    }
    Ok(table)
}

fn service() -> (LayeredEnrichmentService, SymbolManager, Rc<Cell<u32>>) {
    let parses = Rc::new(Cell::new(0));
    let counter = Rc::clone(&parses);
    let layers = VisibilityLayers::new(move |uri: &FileUri, text: &str| {
        counter.set(counter.get() + 1);
        parse_ledger(uri, text)
    });
    let manager = SymbolManager::new(Scheduler::new());
    let service = LayeredEnrichmentService::new(manager.clone(), Rc::new(layers));
    (service, manager, parses)
}

#[test]
fn test_layers_add_symbols_without_dropping_earlier_ones() {
    let (service, manager, _) = service();
    let uri = FileUri::new("file:///src/classes/Ledger.cls");

    service.enrich_to_level(&uri, DetailLevel::PublicApi, SOURCE).unwrap();
    let names = |manager: &SymbolManager| {
        let mut names: Vec<String> = manager.find_symbols_in_file(&uri).into_iter().map(|s| s.name).collect();
        names.sort();
        names
    };
    assert_eq!(names(&manager), vec!["Ledger", "post"]);

    service.enrich_to_level(&uri, DetailLevel::Private, SOURCE).unwrap();
    assert_eq!(names(&manager), vec!["Ledger", "audit", "post", "reconcile"]);
    assert_eq!(service.get_detail_level_for_file(&uri), Some(DetailLevel::Private));
}

#[test]
fn test_detail_level_never_decreases() {
    let (service, _, parses) = service();
    let uri = FileUri::new("file:///src/classes/Ledger.cls");

    service.enrich_to_level(&uri, DetailLevel::Full, SOURCE).unwrap();
    let after_full = parses.get();

    let level = service.enrich_to_level(&uri, DetailLevel::Protected, SOURCE).unwrap();
    assert_eq!(level, DetailLevel::Full);
    assert_eq!(parses.get(), after_full);
    assert_eq!(service.get_detail_level_for_file(&uri), Some(DetailLevel::Full));

    service.reset_file(&uri);
    assert_eq!(service.get_detail_level_for_file(&uri), None);
}

#[test]
fn test_resolution_enriches_until_found() {
    let (service, manager, _) = service();
    let uri = FileUri::new("file:///src/classes/Ledger.cls");

    let found = service
        .resolve_with_enrichment(&uri, SOURCE, |manager| {
            manager.resolve_symbol("Ledger.audit", &ResolutionContext::in_file(uri.clone()))
        })
        .unwrap();

    assert_eq!(found.map(|s| s.name), Some("audit".to_string()));
    assert_eq!(manager.detail_level(&uri), Some(DetailLevel::Private));

    let missing = service
        .resolve_with_enrichment(&uri, SOURCE, |manager| {
            manager.resolve_symbol("Ledger.rollback", &ResolutionContext::in_file(uri.clone()))
        })
        .unwrap();
    assert!(missing.is_none());
    assert_eq!(manager.detail_level(&uri), Some(DetailLevel::Full));
}
