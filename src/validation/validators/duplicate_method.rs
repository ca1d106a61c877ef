use crate::symbol::{Symbol, SymbolTable};
use crate::validation::{
    ValidationError, ValidationOptions, ValidationResult, ValidationTier, Validator, codes,
};

/// Flags methods declared twice in the same type with the same signature
/// (case-insensitive name and parameter types).
///
/// Every duplicate pair produces one error on the later declaration.
pub struct DuplicateMethodValidator;

impl Validator for DuplicateMethodValidator {
    fn id(&self) -> &'static str {
        "duplicate-method"
    }

    fn name(&self) -> &'static str {
        "Duplicate method"
    }

    fn tier(&self) -> ValidationTier {
        ValidationTier::Immediate
    }

    fn priority(&self) -> u32 {
        10
    }

    fn validate(&self, table: &SymbolTable, _options: &ValidationOptions) -> ValidationResult {
        let mut result = ValidationResult::ok();

        for owner in table.symbols().iter().filter(|s| s.kind.is_type()) {
            let mut callables: Vec<&Symbol> =
                table.children_of(&owner.id).filter(|s| s.kind.is_callable()).collect();
            callables.sort_by_key(|s| s.location.start());

            for (i, later) in callables.iter().enumerate() {
                for earlier in &callables[..i] {
                    if earlier.kind != later.kind || earlier.signature() != later.signature() {
                        continue;
                    }
                    result.error(ValidationError::new(
                        codes::DUPLICATE_METHOD,
                        format!(
                            "Method already defined: {} in {}",
                            display_signature(later),
                            owner.name
                        ),
                        later.location,
                    ));
                }
            }
        }

        result
    }
}

fn display_signature(method: &Symbol) -> String {
    let params: Vec<String> = method.parameters.iter().map(|p| p.type_ref.display()).collect();
    format!("{}({})", method.name, params.join(", "))
}
