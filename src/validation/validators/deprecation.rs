use crate::symbol::{Symbol, SymbolTable};
use crate::types::SymbolKind;
use crate::validation::lookup::TypeLookup;
use crate::validation::{
    ValidationError, ValidationOptions, ValidationResult, ValidationTier, Validator, builtins,
    codes,
};

/// Global and webservice members whose signature mentions a deprecated type
/// must be deprecated themselves.
///
/// Deprecated types are looked up in the same file, and also across files
/// when the run is thorough.
pub struct DeprecationValidator;

impl Validator for DeprecationValidator {
    fn id(&self) -> &'static str {
        "deprecation"
    }

    fn name(&self) -> &'static str {
        "Deprecation propagation"
    }

    fn tier(&self) -> ValidationTier {
        ValidationTier::Immediate
    }

    fn priority(&self) -> u32 {
        20
    }

    fn validate(&self, table: &SymbolTable, options: &ValidationOptions) -> ValidationResult {
        let lookup = TypeLookup::new(table, options);
        let mut result = ValidationResult::ok();

        for member in table.symbols().iter().filter(|s| is_exposed(s)) {
            let deprecated = signature_types(member).into_iter().find(|name| {
                !builtins::is_builtin(name)
                    && lookup.find(name).is_some_and(|t| t.modifiers.is_deprecated())
            });

            if let Some(type_name) = deprecated {
                result.error(ValidationError::new(
                    codes::GLOBAL_DEPRECATED_TYPE,
                    format!(
                        "Global {} '{}' uses deprecated type '{type_name}' and must be deprecated",
                        kind_label(member.kind),
                        member.name
                    ),
                    member.location,
                ));
            }
        }

        result
    }
}

fn is_exposed(symbol: &Symbol) -> bool {
    matches!(
        symbol.kind,
        SymbolKind::Method | SymbolKind::Constructor | SymbolKind::Field | SymbolKind::Property
    ) && (symbol.modifiers.is_global() || symbol.modifiers.is_webservice)
        && !symbol.modifiers.is_deprecated()
}

/// Every type name in the declared type and parameter types, generics included.
fn signature_types(member: &Symbol) -> Vec<&str> {
    member
        .type_ref
        .iter()
        .chain(member.parameters.iter().map(|p| &p.type_ref))
        .flat_map(|t| t.walk())
        .map(|t| t.name.as_str())
        .collect()
}

fn kind_label(kind: SymbolKind) -> &'static str {
    match kind {
        SymbolKind::Method => "method",
        SymbolKind::Constructor => "constructor",
        SymbolKind::Field => "field",
        SymbolKind::Property => "property",
        _ => "member",
    }
}
