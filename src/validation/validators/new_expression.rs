use super::written_name;
use crate::symbol::{ReferenceContext, Symbol, SymbolReference, SymbolTable};
use crate::types::{SymbolId, SymbolKind};
use crate::validation::lookup::{Hierarchy, TypeLookup, simple_name};
use crate::validation::{
    Prerequisites, ValidationError, ValidationOptions, ValidationResult, ValidationTier,
    Validator, builtins, codes,
};

/// Checks on `new T(...)` expressions and the type names they rely on:
///
/// - exception classes must be named `...Exception`, and only exception
///   classes may be; only checked once the hierarchy is fully known
/// - inner types must not reuse the name of their enclosing type, its
///   superclass or interfaces, a sibling inner type, or a member
/// - the constructed name must not be shadowed by a local variable declared
///   earlier in scope
pub struct NewExpressionValidator;

impl Validator for NewExpressionValidator {
    fn id(&self) -> &'static str {
        "new-expression"
    }

    fn name(&self) -> &'static str {
        "Constructor expressions"
    }

    fn tier(&self) -> ValidationTier {
        ValidationTier::Immediate
    }

    fn priority(&self) -> u32 {
        30
    }

    fn prerequisites(&self) -> Prerequisites {
        Prerequisites {
            requires_references: true,
            ..Prerequisites::default()
        }
    }

    fn validate(&self, table: &SymbolTable, options: &ValidationOptions) -> ValidationResult {
        let lookup = TypeLookup::new(table, options);
        let mut result = ValidationResult::ok();

        check_inner_types(table, &mut result);

        for reference in table
            .references()
            .iter()
            .filter(|r| r.context == ReferenceContext::ConstructorCall)
        {
            let name = written_name(reference);
            if let Some(error) = shadowed_by_local(table, reference, &name) {
                result.error(error);
            }
            if let Some(error) = exception_naming(&lookup, reference, &name) {
                result.error(error);
            }
        }

        result
    }
}

fn exception_naming(
    lookup: &TypeLookup<'_>,
    reference: &SymbolReference,
    name: &str,
) -> Option<ValidationError> {
    if builtins::is_builtin(name) {
        return None;
    }
    let class = lookup.find(name).filter(|s| s.kind == SymbolKind::Class)?;
    let named_exception = class.name.to_lowercase().ends_with("exception");

    match (lookup.inherits_from(&class, "Exception"), named_exception) {
        (Hierarchy::Reaches, false) => Some(ValidationError::new(
            codes::EXCEPTION_NAME_MISSING_SUFFIX,
            format!("Exception class '{}' must have a name ending in 'Exception'", class.name),
            reference.location,
        )),
        (Hierarchy::DoesNotReach, true) => Some(ValidationError::new(
            codes::NON_EXCEPTION_NAME_HAS_SUFFIX,
            format!("Class '{}' ends in 'Exception' but does not extend Exception", class.name),
            reference.location,
        )),
        _ => None,
    }
}

/// A local or parameter with the constructed name, declared at or before the
/// call line in an enclosing scope. A variable whose own initializer contains
/// the call does not count.
fn shadowed_by_local(
    table: &SymbolTable,
    reference: &SymbolReference,
    name: &str,
) -> Option<ValidationError> {
    if name.contains('.') {
        return None;
    }
    let scope = reference.enclosing_symbol_id.as_ref()?;
    let scopes: Vec<&SymbolId> = table.ancestors(scope).into_iter().map(|s| &s.id).collect();
    let call = reference.location.start();

    let local = table.symbols().iter().find(|s| {
        s.kind.is_local()
            && s.is_named(name)
            && s.location.start_line <= call.line
            && s.parent_id.as_ref().is_some_and(|p| scopes.contains(&p))
            && !s.initializer_range.is_some_and(|r| r.contains_position(call))
    })?;

    Some(ValidationError::new(
        codes::TYPE_SHADOWED_BY_VARIABLE,
        format!(
            "Type '{name}' is shadowed by variable '{}' declared on line {}",
            local.name,
            local.location.start_line + 1
        ),
        reference.location,
    ))
}

fn check_inner_types(table: &SymbolTable, result: &mut ValidationResult) {
    for inner in table.symbols().iter().filter(|s| s.kind.is_type()) {
        let Some(outer) = inner
            .parent_id
            .as_ref()
            .and_then(|p| table.get(p))
            .filter(|p| p.kind.is_type())
        else {
            continue;
        };

        if let Some(reason) = inner_conflict(table, outer, inner) {
            result.error(ValidationError::new(
                codes::INNER_TYPE_NAME_CONFLICT,
                format!("Inner type '{}' {reason}", inner.name),
                inner.location,
            ));
        }
    }
}

fn inner_conflict(table: &SymbolTable, outer: &Symbol, inner: &Symbol) -> Option<String> {
    let same = |other: &str| simple_name(other).eq_ignore_ascii_case(&inner.name);

    if outer.is_named(&inner.name) {
        return Some("has the same name as its enclosing type".to_string());
    }
    if outer.super_class.as_deref().is_some_and(same) {
        return Some(format!("has the same name as the superclass of '{}'", outer.name));
    }
    if outer.interfaces.iter().any(|i| same(i)) {
        return Some(format!("has the same name as an interface of '{}'", outer.name));
    }

    let earlier = |s: &&Symbol| s.id != inner.id && s.location.start() < inner.location.start();
    let mut siblings = table.children_of(&outer.id).filter(|s| s.is_named(&inner.name));
    if siblings.clone().any(|s| s.kind.is_type() && earlier(&s)) {
        return Some(format!("is already declared in '{}'", outer.name));
    }
    if siblings.any(|s| !s.kind.is_type()) {
        return Some(format!("has the same name as a member of '{}'", outer.name));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::SymbolManager;
    use crate::scheduler::Scheduler;
    use crate::symbol::{Initializer, TypeReference};
    use crate::types::Range;
    use crate::validation::validators::fixtures::Fixture;

    fn validate(f: &Fixture) -> ValidationResult {
        NewExpressionValidator.validate(&f.table, &ValidationOptions::immediate())
    }

    #[test]
    fn test_exception_suffix_rules() {
        let mut f = Fixture::new("Errors.cls");
        let outer = f.class("Errors", 0);
        let bad = f
            .symbol(SymbolKind::Class, "Oops", 1)
            .with_parent(&outer)
            .with_super_class("Exception");
        let misnamed = f.symbol(SymbolKind::Class, "NotAnException", 2).with_parent(&outer);
        let good = f
            .symbol(SymbolKind::Class, "OopsException", 3)
            .with_parent(&outer)
            .with_super_class("Exception");
        f.add(bad);
        f.add(misnamed);
        f.add(good);
        let method = f.symbol(SymbolKind::Method, "run", 10).with_parent(&outer);
        let method = f.add(method);
        f.reference("Oops", ReferenceContext::ConstructorCall, 11, 10, &method);
        f.reference("NotAnException", ReferenceContext::ConstructorCall, 12, 10, &method);
        f.reference("OopsException", ReferenceContext::ConstructorCall, 13, 10, &method);

        let result = validate(&f);
        let found: Vec<&str> = result.errors.iter().map(|e| e.code.as_str()).collect();
        assert_eq!(
            found,
            vec![codes::EXCEPTION_NAME_MISSING_SUFFIX, codes::NON_EXCEPTION_NAME_HAS_SUFFIX]
        );
    }

    #[test]
    fn test_unresolved_or_unknown_hierarchy_is_silent() {
        let mut f = Fixture::new("Errors.cls");
        let outer = f.class("Errors", 0);
        let unknown_parent = f
            .symbol(SymbolKind::Class, "ThingException", 1)
            .with_parent(&outer)
            .with_super_class("VendorBase");
        f.add(unknown_parent);
        let method = f.symbol(SymbolKind::Method, "run", 10).with_parent(&outer);
        let method = f.add(method);
        f.reference("ThingException", ReferenceContext::ConstructorCall, 11, 10, &method);
        f.reference("ElsewhereException", ReferenceContext::ConstructorCall, 12, 10, &method);

        assert!(validate(&f).is_valid);
    }

    #[test]
    fn test_inner_type_conflicts() {
        let mut f = Fixture::new("Outer.cls");
        let outer = Symbol::new(SymbolKind::Class, "Outer", f.uri.clone(), Range::new(0, 0, 100, 1))
            .with_super_class("Base");
        let outer = f.add(outer);
        let field = f.symbol(SymbolKind::Field, "Helper", 1).with_parent(&outer);
        f.add(field);
        for (name, line) in [("Outer", 2), ("Base", 3), ("Helper", 4), ("Twin", 5), ("twin", 6)] {
            let inner = f.symbol(SymbolKind::Class, name, line).with_parent(&outer);
            f.add(inner);
        }

        let result = validate(&f);
        let lines: Vec<u32> = result
            .errors_with_code(codes::INNER_TYPE_NAME_CONFLICT)
            .map(|e| e.location.start_line)
            .collect();
        assert_eq!(lines, vec![2, 3, 4, 6]);
    }

    #[test]
    fn test_shadowing_local_declared_before_call() {
        let mut f = Fixture::new("Svc.cls");
        let class = f.class("Svc", 0);
        let widget = f.symbol(SymbolKind::Class, "Widget", 50).with_parent(&class);
        f.add(widget);
        let method = Symbol::new(SymbolKind::Method, "run", f.uri.clone(), Range::new(2, 4, 20, 5))
            .with_parent(&class);
        let method = f.add(method);
        let local = f
            .symbol(SymbolKind::Variable, "widget", 3)
            .with_parent(&method)
            .with_type(TypeReference::parse("Integer"));
        f.add(local);
        f.reference("Widget", ReferenceContext::ConstructorCall, 5, 12, &method);

        let result = validate(&f);
        assert_eq!(result.errors_with_code(codes::TYPE_SHADOWED_BY_VARIABLE).count(), 1);
    }

    #[test]
    fn test_variable_initialised_with_its_own_type_is_not_shadowing() {
        let mut f = Fixture::new("Svc.cls");
        let class = f.class("Svc", 0);
        let widget = f.symbol(SymbolKind::Class, "Widget", 50).with_parent(&class);
        f.add(widget);
        let method = Symbol::new(SymbolKind::Method, "run", f.uri.clone(), Range::new(2, 4, 20, 5))
            .with_parent(&class);
        let method = f.add(method);
        // Widget widget = new Widget();
        let local = f
            .symbol(SymbolKind::Variable, "widget", 3)
            .with_parent(&method)
            .with_type(TypeReference::parse("Widget"))
            .with_initializer(
                Initializer::New(TypeReference::parse("Widget")),
                Range::new(3, 24, 3, 38),
            );
        f.add(local);
        f.reference("Widget", ReferenceContext::ConstructorCall, 3, 28, &method);
        // a later call is shadowed
        f.reference("Widget", ReferenceContext::ConstructorCall, 9, 12, &method);

        let result = validate(&f);
        let lines: Vec<u32> = result
            .errors_with_code(codes::TYPE_SHADOWED_BY_VARIABLE)
            .map(|e| e.location.start_line)
            .collect();
        assert_eq!(lines, vec![9]);
    }

    #[test]
    fn test_cross_file_exception_hierarchy_when_thorough() {
        let manager = SymbolManager::new(Scheduler::new());
        let mut base = Fixture::new("AppException.cls");
        let app = base
            .symbol(SymbolKind::Class, "AppBase", 0)
            .with_super_class("Exception");
        base.add(app);
        manager.add_symbol_table(base.table);

        let mut f = Fixture::new("Svc.cls");
        let class = f.class("Svc", 0);
        let failure = f
            .symbol(SymbolKind::Class, "Failure", 50)
            .with_parent(&class)
            .with_super_class("AppBase");
        f.add(failure);
        let method = f.symbol(SymbolKind::Method, "run", 2).with_parent(&class);
        let method = f.add(method);
        f.reference("Failure", ReferenceContext::ConstructorCall, 3, 12, &method);

        // hierarchy unknown without the manager
        assert!(validate(&f).is_valid);

        let thorough = NewExpressionValidator.validate(&f.table, &ValidationOptions::thorough(manager));
        assert_eq!(
            thorough.errors_with_code(codes::EXCEPTION_NAME_MISSING_SUFFIX).count(),
            1
        );
    }
}
