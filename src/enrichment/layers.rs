use super::{DetailLevel, EnrichmentResult, LayerExtractor};
use crate::symbol::{Symbol, SymbolTable};
use crate::types::{FileUri, Visibility};
use std::collections::HashMap;

impl DetailLevel {
    /// Shallowest layer a symbol belongs to.
    ///
    /// Top-level types are always part of the public API; locals only show
    /// up at `Full`. Members follow their declared visibility.
    pub fn of_symbol(symbol: &Symbol) -> DetailLevel {
        if symbol.kind.is_local() {
            return DetailLevel::Full;
        }
        if symbol.parent_id.is_none() {
            return DetailLevel::PublicApi;
        }
        match symbol.modifiers.visibility {
            Visibility::Public | Visibility::Global => DetailLevel::PublicApi,
            Visibility::Protected => DetailLevel::Protected,
            Visibility::Private | Visibility::Default => DetailLevel::Private,
        }
    }
}

/// Extractor that slices a complete parse into visibility layers.
///
/// `parse` turns document text into a full symbol table; each layer keeps
/// the symbols of exactly that level, plus the references made from them.
pub struct VisibilityLayers<F> {
    parse: F,
}

impl<F> VisibilityLayers<F>
where
    F: Fn(&FileUri, &str) -> EnrichmentResult<SymbolTable>,
{
    pub fn new(parse: F) -> Self {
        Self { parse }
    }
}

impl<F> LayerExtractor for VisibilityLayers<F>
where
    F: Fn(&FileUri, &str) -> EnrichmentResult<SymbolTable>,
{
    fn extract_layer(
        &self,
        file_uri: &FileUri,
        text: &str,
        level: DetailLevel,
    ) -> EnrichmentResult<SymbolTable> {
        let full = (self.parse)(file_uri, text)?;
        let levels: HashMap<_, _> = full
            .symbols()
            .iter()
            .map(|s| (s.id.clone(), DetailLevel::of_symbol(s)))
            .collect();

        let mut layer = SymbolTable::new(file_uri.clone());
        for symbol in full.symbols() {
            if levels.get(&symbol.id) == Some(&level) {
                layer.add_symbol(symbol.clone());
            }
        }
        for reference in full.references() {
            let owner_level = reference
                .enclosing_symbol_id
                .as_ref()
                .and_then(|id| levels.get(id).copied())
                .unwrap_or(DetailLevel::PublicApi);
            if owner_level == level {
                layer.add_reference(reference.clone());
            }
        }
        Ok(layer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::{ReferenceContext, SymbolReference};
    use crate::types::{Modifiers, Range, SymbolKind};

    fn parse(file_uri: &FileUri, _text: &str) -> EnrichmentResult<SymbolTable> {
        let mut table = SymbolTable::new(file_uri.clone());
        let class_id = table.add_symbol(Symbol::new(
            SymbolKind::Class,
            "Foo",
            file_uri.clone(),
            Range::new(0, 0, 20, 1),
        ));
        for (line, name, visibility) in [
            (1, "open", Visibility::Global),
            (2, "guarded", Visibility::Protected),
            (3, "hidden", Visibility::Private),
        ] {
            let id = table.add_symbol(
                Symbol::new(SymbolKind::Method, name, file_uri.clone(), Range::new(line, 2, line, 30))
                    .with_parent(&class_id)
                    .with_modifiers(Modifiers::default().with_visibility(visibility)),
            );
            table.add_reference(
                SymbolReference::new("Account", ReferenceContext::ReturnType, Range::at(line, 4))
                    .within(&id),
            );
        }
        let hidden = table.lookup("hidden")[0].id.clone();
        table.add_symbol(
            Symbol::new(SymbolKind::Variable, "count", file_uri.clone(), Range::at(3, 10))
                .with_parent(&hidden),
        );
        Ok(table)
    }

    #[test]
    fn test_layers_partition_the_parse() {
        let layers = VisibilityLayers::new(parse);
        let uri = FileUri::new("file:///Foo.cls");

        let names = |level| -> Vec<String> {
            layers
                .extract_layer(&uri, "", level)
                .unwrap()
                .symbols()
                .iter()
                .map(|s| s.name.clone())
                .collect()
        };

        assert_eq!(names(DetailLevel::PublicApi), vec!["Foo", "open"]);
        assert_eq!(names(DetailLevel::Protected), vec!["guarded"]);
        assert_eq!(names(DetailLevel::Private), vec!["hidden"]);
        assert_eq!(names(DetailLevel::Full), vec!["count"]);
    }

    #[test]
    fn test_references_follow_their_owner() {
        let layers = VisibilityLayers::new(parse);
        let uri = FileUri::new("file:///Foo.cls");

        let protected = layers
            .extract_layer(&uri, "", DetailLevel::Protected)
            .unwrap();
        assert_eq!(protected.references().len(), 1);
        assert_eq!(protected.references()[0].location, Range::at(2, 4));
    }
}
