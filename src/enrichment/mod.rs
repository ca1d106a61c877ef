//! Layered enrichment of per-file symbol detail.
//!
//! A file is indexed in layers of increasing detail. Each layer only adds
//! symbols and references; nothing computed by an earlier layer is thrown
//! away. The recorded level only goes up until the file is reparsed.

mod layers;

pub use layers::VisibilityLayers;

use crate::manager::SymbolManager;
use crate::symbol::SymbolTable;
use crate::types::FileUri;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::rc::Rc;
use thiserror::Error;

/// How much of a file's symbol table has been populated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DetailLevel {
    PublicApi,
    Protected,
    Private,
    Full,
}

impl DetailLevel {
    pub const ALL: [DetailLevel; 4] = [
        DetailLevel::PublicApi,
        DetailLevel::Protected,
        DetailLevel::Private,
        DetailLevel::Full,
    ];

    /// The next deeper level, `None` at `Full`.
    pub fn next(self) -> Option<DetailLevel> {
        match self {
            DetailLevel::PublicApi => Some(DetailLevel::Protected),
            DetailLevel::Protected => Some(DetailLevel::Private),
            DetailLevel::Private => Some(DetailLevel::Full),
            DetailLevel::Full => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DetailLevel::PublicApi => "public-api",
            DetailLevel::Protected => "protected",
            DetailLevel::Private => "private",
            DetailLevel::Full => "full",
        }
    }
}

impl fmt::Display for DetailLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EnrichmentError {
    #[error("Failed to extract {level} layer of {file_uri}: {reason}")]
    Extraction {
        file_uri: FileUri,
        level: DetailLevel,
        reason: String,
    },
}

pub type EnrichmentResult<T> = Result<T, EnrichmentError>;

/// Parser boundary: produces the symbols one layer adds.
pub trait LayerExtractor {
    /// Symbols and references that `level` adds on top of all shallower
    /// levels. Returning symbols from earlier layers is harmless; they are
    /// merged by id.
    fn extract_layer(
        &self,
        file_uri: &FileUri,
        text: &str,
        level: DetailLevel,
    ) -> EnrichmentResult<SymbolTable>;
}

pub struct LayeredEnrichmentService {
    manager: SymbolManager,
    extractor: Rc<dyn LayerExtractor>,
}

impl LayeredEnrichmentService {
    pub fn new(manager: SymbolManager, extractor: Rc<dyn LayerExtractor>) -> Self {
        Self { manager, extractor }
    }

    /// Current level, `None` if the file has not been indexed.
    pub fn get_detail_level_for_file(&self, file_uri: &FileUri) -> Option<DetailLevel> {
        self.manager.detail_level(file_uri)
    }

    /// Apply the missing layers up to `target`, shallowest first.
    ///
    /// Returns immediately if `target` is already reached. If a layer fails
    /// the file stays at the last layer that was applied.
    pub fn enrich_to_level(
        &self,
        file_uri: &FileUri,
        target: DetailLevel,
        text: &str,
    ) -> EnrichmentResult<DetailLevel> {
        let current = self.get_detail_level_for_file(file_uri);
        if let Some(level) = current
            && level >= target
        {
            return Ok(level);
        }

        let mut next = current.map_or(Some(DetailLevel::PublicApi), DetailLevel::next);
        let mut reached = current;
        while let Some(level) = next.filter(|&level| level <= target) {
            let layer = self.extractor.extract_layer(file_uri, text, level)?;
            let added = self.manager.merge_symbol_table(layer);
            reached = Some(self.manager.set_detail_level(file_uri, level));

            tracing::debug!(
                target: "enrichment",
                "{file_uri}: applied {level} layer (+{} symbols)",
                added.symbols
            );
            next = level.next();
        }

        Ok(reached.unwrap_or(target))
    }

    /// Call `resolver` until it yields a value, enriching one layer deeper
    /// between attempts. `Ok(None)` once `Full` is reached without a result.
    pub fn resolve_with_enrichment<T>(
        &self,
        file_uri: &FileUri,
        text: &str,
        mut resolver: impl FnMut(&SymbolManager) -> Option<T>,
    ) -> EnrichmentResult<Option<T>> {
        loop {
            if let Some(found) = resolver(&self.manager) {
                return Ok(Some(found));
            }

            let next = match self.get_detail_level_for_file(file_uri) {
                None => DetailLevel::PublicApi,
                Some(level) => match level.next() {
                    Some(next) => next,
                    None => return Ok(None),
                },
            };
            self.enrich_to_level(file_uri, next, text)?;
        }
    }

    /// Forget the level of a file that is being reparsed from scratch.
    pub fn reset_file(&self, file_uri: &FileUri) {
        self.manager.reset_detail_level(file_uri);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::Scheduler;
    use crate::symbol::Symbol;
    use crate::types::{Modifiers, Range, SymbolKind, Visibility};
    use std::cell::RefCell;

    /// Records which layers were requested and returns one symbol per layer.
    #[derive(Default)]
    struct CountingExtractor {
        calls: RefCell<Vec<DetailLevel>>,
    }

    impl LayerExtractor for CountingExtractor {
        fn extract_layer(
            &self,
            file_uri: &FileUri,
            _text: &str,
            level: DetailLevel,
        ) -> EnrichmentResult<SymbolTable> {
            self.calls.borrow_mut().push(level);
            let mut table = SymbolTable::new(file_uri.clone());
            let line = level as u32;
            let visibility = match level {
                DetailLevel::PublicApi => Visibility::Public,
                DetailLevel::Protected => Visibility::Protected,
                DetailLevel::Private | DetailLevel::Full => Visibility::Private,
            };
            table.add_symbol(
                Symbol::new(
                    SymbolKind::Method,
                    format!("m_{}", level.as_str()),
                    file_uri.clone(),
                    Range::at(line, 0),
                )
                .with_modifiers(Modifiers::default().with_visibility(visibility)),
            );
            Ok(table)
        }
    }

    fn service() -> (LayeredEnrichmentService, Rc<CountingExtractor>) {
        let extractor = Rc::new(CountingExtractor::default());
        let manager = SymbolManager::new(Scheduler::new());
        let service = LayeredEnrichmentService::new(manager, extractor.clone());
        (service, extractor)
    }

    #[test]
    fn test_enrich_applies_missing_layers_in_order() {
        let (service, extractor) = service();
        let uri = FileUri::new("file:///Foo.cls");

        assert_eq!(service.get_detail_level_for_file(&uri), None);
        let level = service.enrich_to_level(&uri, DetailLevel::Protected, "").unwrap();
        assert_eq!(level, DetailLevel::Protected);

        service.enrich_to_level(&uri, DetailLevel::Full, "").unwrap();
        assert_eq!(
            *extractor.calls.borrow(),
            vec![
                DetailLevel::PublicApi,
                DetailLevel::Protected,
                DetailLevel::Private,
                DetailLevel::Full
            ]
        );
        // Earlier layers are kept
        assert_eq!(service.manager.find_symbols_in_file(&uri).len(), 4);
    }

    #[test]
    fn test_enrich_to_reached_level_is_noop() {
        let (service, extractor) = service();
        let uri = FileUri::new("file:///Foo.cls");
        service.enrich_to_level(&uri, DetailLevel::Private, "").unwrap();
        let calls = extractor.calls.borrow().len();

        let level = service.enrich_to_level(&uri, DetailLevel::PublicApi, "").unwrap();

        assert_eq!(level, DetailLevel::Private);
        assert_eq!(extractor.calls.borrow().len(), calls);
        assert_eq!(service.get_detail_level_for_file(&uri), Some(DetailLevel::Private));
    }

    #[test]
    fn test_resolve_with_enrichment_stops_at_first_hit() {
        let (service, extractor) = service();
        let uri = FileUri::new("file:///Foo.cls");

        let found = service
            .resolve_with_enrichment(&uri, "", |manager| {
                manager.find_symbol_by_name("m_protected").into_iter().next()
            })
            .unwrap();

        assert_eq!(found.map(|s| s.name), Some("m_protected".to_string()));
        assert_eq!(extractor.calls.borrow().len(), 2);
    }

    #[test]
    fn test_resolve_with_enrichment_gives_up_at_full() {
        let (service, _) = service();
        let uri = FileUri::new("file:///Foo.cls");

        let found = service
            .resolve_with_enrichment(&uri, "", |manager| {
                manager.find_symbol_by_name("missing").into_iter().next()
            })
            .unwrap();

        assert!(found.is_none());
        assert_eq!(service.get_detail_level_for_file(&uri), Some(DetailLevel::Full));
    }

    #[test]
    fn test_reset_clears_level() {
        let (service, _) = service();
        let uri = FileUri::new("file:///Foo.cls");
        service.enrich_to_level(&uri, DetailLevel::Full, "").unwrap();

        service.reset_file(&uri);
        assert_eq!(service.get_detail_level_for_file(&uri), None);
    }
}
