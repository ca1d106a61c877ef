//! Request handlers.
//!
//! Parameters and answers are plain JSON at this boundary. The default
//! [`ManagerHandler`] answers every request type from the symbol manager.

use super::RequestType;
use crate::manager::{ResolutionContext, SymbolManager};
use crate::symbol::{Symbol, SymbolTable};
use crate::types::{FileUri, Position, Range};
use crate::validation::{ValidationOptions, ValidatorRegistry};
use anyhow::Context as _;
use futures::future::LocalBoxFuture;
use indexmap::IndexMap;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::collections::HashSet;
use std::future::Future;

const MAX_COMPLETION_ITEMS: usize = 200;

pub trait RequestHandler {
    fn handle(&self, params: Value, manager: SymbolManager)
    -> LocalBoxFuture<'static, anyhow::Result<Value>>;
}

impl<F, Fut> RequestHandler for F
where
    F: Fn(Value, SymbolManager) -> Fut,
    Fut: Future<Output = anyhow::Result<Value>> + 'static,
{
    fn handle(
        &self,
        params: Value,
        manager: SymbolManager,
    ) -> LocalBoxFuture<'static, anyhow::Result<Value>> {
        Box::pin(self(params, manager))
    }
}

/// Answers a request type from the symbol graph.
#[derive(Clone)]
pub struct ManagerHandler {
    request: RequestType,
    validators: ValidatorRegistry,
}

impl ManagerHandler {
    pub fn new(request: RequestType) -> Self {
        Self {
            request,
            validators: ValidatorRegistry::with_builtins(),
        }
    }

    pub fn with_validators(mut self, validators: ValidatorRegistry) -> Self {
        self.validators = validators;
        self
    }
}

impl RequestHandler for ManagerHandler {
    fn handle(
        &self,
        params: Value,
        manager: SymbolManager,
    ) -> LocalBoxFuture<'static, anyhow::Result<Value>> {
        let request = self.request;
        let validators = self.validators.clone();
        Box::pin(async move {
            match request {
                RequestType::Hover => hover(&manager, parse(params)?),
                RequestType::Completion => completion(&manager, parse(params)?),
                RequestType::Definition => definition(&manager, parse(params)?),
                RequestType::References => references(&manager, parse(params)?),
                RequestType::DocumentSymbol => document_symbols(&manager, parse(params)?),
                RequestType::WorkspaceSymbol => workspace_symbols(&manager, parse(params)?),
                RequestType::Diagnostics => {
                    diagnostics(&manager, &validators, parse(params)?).await
                }
                RequestType::CodeAction => Ok(json!([])),
                RequestType::Rename => rename(&manager, parse(params)?),
                RequestType::DocumentOpen
                | RequestType::DocumentSave
                | RequestType::DocumentChange => sync_document(&manager, parse(params)?),
                RequestType::DocumentClose => Ok(Value::Null),
            }
        })
    }
}

#[derive(Debug, Deserialize)]
struct DocumentParams {
    uri: String,
}

#[derive(Debug, Deserialize)]
struct PositionParams {
    uri: String,
    line: u32,
    character: u32,
}

impl PositionParams {
    fn file_uri(&self) -> FileUri {
        FileUri::new(self.uri.as_str())
    }

    fn position(&self) -> Position {
        Position::new(self.line, self.character)
    }
}

#[derive(Debug, Deserialize)]
struct CompletionParams {
    #[serde(flatten)]
    at: PositionParams,
    #[serde(default)]
    prefix: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReferenceParams {
    #[serde(flatten)]
    at: PositionParams,
    #[serde(default)]
    include_declaration: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RenameParams {
    #[serde(flatten)]
    at: PositionParams,
    new_name: String,
}

#[derive(Debug, Deserialize)]
struct QueryParams {
    #[serde(default)]
    query: String,
}

/// Document sync carries the parser's table for the new text, if any.
#[derive(Debug, Deserialize)]
struct SyncParams {
    uri: String,
    #[serde(default)]
    table: Option<SymbolTable>,
}

fn parse<T: DeserializeOwned>(params: Value) -> anyhow::Result<T> {
    serde_json::from_value(params).context("invalid request parameters")
}

fn lsp_range(range: &Range) -> Value {
    json!({
        "start": { "line": range.start_line, "character": range.start_column },
        "end": { "line": range.end_line, "character": range.end_column },
    })
}

fn location(uri: &FileUri, range: &Range) -> Value {
    json!({ "uri": uri.as_str(), "range": lsp_range(range) })
}

fn describe(manager: &SymbolManager, symbol: &Symbol) -> Value {
    json!({
        "name": symbol.name,
        "kind": format!("{:?}", symbol.kind),
        "fqn": manager.construct_fqn(symbol),
        "uri": symbol.file_uri.as_str(),
        "range": lsp_range(&symbol.location),
    })
}

/// The declaration a cursor points at: the resolved target of the reference
/// under the cursor, else the declaration containing it.
fn symbol_under_cursor(manager: &SymbolManager, at: &PositionParams) -> Option<Symbol> {
    let file_uri = at.file_uri();
    let position = at.position();

    if let Some(reference) = manager.get_references_at_position(&file_uri, position).into_iter().next() {
        if let Some(found) = reference.resolved_symbol_id.as_ref().and_then(|id| manager.get_symbol(id)) {
            return Some(found);
        }
        let mut context = ResolutionContext::in_file(file_uri.clone()).at(position);
        if let Some(scope) = &reference.enclosing_symbol_id {
            context = context.within(scope);
        }
        if let Some(found) = manager.resolve_symbol(&reference.name, &context) {
            return Some(found);
        }
    }

    manager.get_symbol_at_position(&file_uri, position)
}

fn hover(manager: &SymbolManager, at: PositionParams) -> anyhow::Result<Value> {
    Ok(symbol_under_cursor(manager, &at)
        .map(|symbol| {
            let mut answer = describe(manager, &symbol);
            if symbol.kind.is_callable() {
                answer["signature"] = json!(symbol.signature());
            }
            if let Some(type_ref) = &symbol.type_ref {
                answer["type"] = json!(type_ref.display());
            }
            answer
        })
        .unwrap_or(Value::Null))
}

fn definition(manager: &SymbolManager, at: PositionParams) -> anyhow::Result<Value> {
    Ok(symbol_under_cursor(manager, &at)
        .map(|symbol| location(&symbol.file_uri, &symbol.location))
        .unwrap_or(Value::Null))
}

fn references(manager: &SymbolManager, params: ReferenceParams) -> anyhow::Result<Value> {
    let Some(symbol) = symbol_under_cursor(manager, &params.at) else {
        return Ok(json!([]));
    };

    let mut locations = Vec::new();
    if params.include_declaration {
        locations.push(location(&symbol.file_uri, &symbol.location));
    }
    locations.extend(
        manager
            .incoming_references(&symbol.id)
            .iter()
            .map(|(_, edge)| location(&edge.source_file_uri, &edge.location)),
    );
    Ok(Value::Array(locations))
}

fn document_symbols(manager: &SymbolManager, params: DocumentParams) -> anyhow::Result<Value> {
    let file_uri = FileUri::new(params.uri.as_str());
    let symbols: Vec<Value> = manager
        .find_symbols_in_file(&file_uri)
        .iter()
        .filter(|s| !s.kind.is_local())
        .map(|s| {
            json!({
                "name": s.name,
                "kind": format!("{:?}", s.kind),
                "range": lsp_range(&s.location),
                "parent": s.parent_id.as_ref().map(|p| p.as_str().to_string()),
            })
        })
        .collect();
    Ok(Value::Array(symbols))
}

fn workspace_symbols(manager: &SymbolManager, params: QueryParams) -> anyhow::Result<Value> {
    let query = params.query.to_lowercase();
    let symbols: Vec<Value> = manager
        .files()
        .iter()
        .flat_map(|uri| manager.find_symbols_in_file(uri))
        .filter(|s| !s.kind.is_local() && s.name.to_lowercase().contains(&query))
        .map(|s| describe(manager, &s))
        .collect();
    Ok(Value::Array(symbols))
}

fn completion(manager: &SymbolManager, params: CompletionParams) -> anyhow::Result<Value> {
    let prefix = params.prefix.to_lowercase();
    let file_uri = params.at.file_uri();
    let mut seen = HashSet::new();

    let same_file = manager.find_symbols_in_file(&file_uri);
    let types = manager
        .files()
        .into_iter()
        .filter(|uri| uri != &file_uri)
        .flat_map(|uri| manager.find_symbols_in_file(&uri))
        .filter(|s| s.kind.is_type());

    let items: Vec<Value> = same_file
        .into_iter()
        .chain(types)
        .filter(|s| s.name.to_lowercase().starts_with(&prefix))
        .filter(|s| seen.insert(s.name.to_lowercase()))
        .take(MAX_COMPLETION_ITEMS)
        .map(|s| json!({ "label": s.name, "kind": format!("{:?}", s.kind) }))
        .collect();
    Ok(Value::Array(items))
}

async fn diagnostics(
    manager: &SymbolManager,
    validators: &ValidatorRegistry,
    params: DocumentParams,
) -> anyhow::Result<Value> {
    let file_uri = FileUri::new(params.uri.as_str());
    let Some(table) = manager.with_table(&file_uri, SymbolTable::clone) else {
        return Ok(json!({ "uri": params.uri, "isValid": true, "errors": [], "warnings": [] }));
    };

    let options = ValidationOptions::thorough(manager.clone());
    let result = validators.run_cooperative(&table, &options).await;
    Ok(json!({
        "uri": params.uri,
        "isValid": result.is_valid,
        "errors": result.errors,
        "warnings": result.warnings,
    }))
}

fn rename(manager: &SymbolManager, params: RenameParams) -> anyhow::Result<Value> {
    let Some(symbol) = symbol_under_cursor(manager, &params.at) else {
        return Ok(Value::Null);
    };

    let mut changes: IndexMap<String, Vec<Value>> = IndexMap::new();
    let edit = |range: &Range| json!({ "range": lsp_range(range), "newText": params.new_name });
    changes
        .entry(symbol.file_uri.as_str().to_string())
        .or_default()
        .push(edit(&symbol.location));
    for (_, edge) in manager.incoming_references(&symbol.id) {
        changes
            .entry(edge.source_file_uri.as_str().to_string())
            .or_default()
            .push(edit(&edge.location));
    }
    Ok(json!({ "changes": changes }))
}

fn sync_document(manager: &SymbolManager, params: SyncParams) -> anyhow::Result<Value> {
    match params.table {
        Some(table) => Ok(serde_json::to_value(manager.add_symbol_table(table))?),
        None => {
            tracing::debug!(target: "queue", "{}: no symbol table supplied", params.uri);
            Ok(Value::Null)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::Scheduler;
    use crate::symbol::{ReferenceContext, SymbolReference};
    use crate::types::SymbolKind;
    use futures::executor::block_on;

    fn workspace() -> SymbolManager {
        let manager = SymbolManager::new(Scheduler::new());

        let account_uri = FileUri::new("file:///Account.cls");
        let mut account = SymbolTable::new(account_uri.clone());
        let class = account.add_symbol(Symbol::new(SymbolKind::Class, "Account", account_uri.clone(), Range::new(0, 0, 20, 1)));
        account.add_symbol(
            Symbol::new(SymbolKind::Method, "close", account_uri, Range::new(2, 4, 4, 5))
                .with_parent(&class),
        );
        manager.add_symbol_table(account);

        let svc_uri = FileUri::new("file:///Service.cls");
        let mut svc = SymbolTable::new(svc_uri.clone());
        let class = svc.add_symbol(Symbol::new(SymbolKind::Class, "Service", svc_uri.clone(), Range::new(0, 0, 20, 1)));
        let run = svc.add_symbol(
            Symbol::new(SymbolKind::Method, "run", svc_uri, Range::new(2, 4, 8, 5)).with_parent(&class),
        );
        svc.add_reference(
            SymbolReference::new("Account", ReferenceContext::ConstructorCall, Range::new(3, 16, 3, 23))
                .within(&run),
        );
        manager.add_symbol_table(svc);
        manager.scheduler().run_until_idle();
        manager
    }

    fn call(request: RequestType, params: Value) -> Value {
        let manager = workspace();
        block_on(ManagerHandler::new(request).handle(params, manager)).unwrap()
    }

    #[test]
    fn test_definition_follows_reference() {
        let answer = call(
            RequestType::Definition,
            json!({ "uri": "file:///Service.cls", "line": 3, "character": 18 }),
        );
        assert_eq!(answer["uri"], "file:///Account.cls");
        assert_eq!(answer["range"]["start"]["line"], 0);
    }

    #[test]
    fn test_hover_outside_any_symbol_is_null() {
        let answer = call(
            RequestType::Hover,
            json!({ "uri": "file:///Service.cls", "line": 50, "character": 0 }),
        );
        assert!(answer.is_null());
    }

    #[test]
    fn test_references_and_rename() {
        let refs = call(
            RequestType::References,
            json!({ "uri": "file:///Account.cls", "line": 0, "character": 2, "includeDeclaration": true }),
        );
        assert_eq!(refs.as_array().map(Vec::len), Some(2));

        let rename = call(
            RequestType::Rename,
            json!({ "uri": "file:///Account.cls", "line": 0, "character": 2, "newName": "Customer" }),
        );
        assert!(rename["changes"]["file:///Service.cls"].is_array());
        assert_eq!(rename["changes"]["file:///Account.cls"][0]["newText"], "Customer");
    }

    #[test]
    fn test_workspace_symbols_and_completion() {
        let found = call(RequestType::WorkspaceSymbol, json!({ "query": "acc" }));
        assert_eq!(found.as_array().map(Vec::len), Some(1));

        let items = call(
            RequestType::Completion,
            json!({ "uri": "file:///Service.cls", "line": 3, "character": 0, "prefix": "a" }),
        );
        assert_eq!(items[0]["label"], "Account");
    }

    #[test]
    fn test_diagnostics_for_unknown_file_are_empty() {
        let answer = call(RequestType::Diagnostics, json!({ "uri": "file:///Nope.cls" }));
        assert_eq!(answer["isValid"], true);
    }

    #[test]
    fn test_bad_params_are_an_error() {
        let manager = workspace();
        let result = block_on(ManagerHandler::new(RequestType::Hover).handle(json!({}), manager));
        assert!(result.is_err());
    }
}
