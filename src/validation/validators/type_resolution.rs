use super::written_name;
use crate::symbol::{ReferenceContext, SymbolTable};
use crate::types::SymbolKind;
use crate::validation::lookup::TypeLookup;
use crate::validation::{
    ArtifactStatus, Prerequisites, ValidationError, ValidationOptions, ValidationResult,
    ValidationTier, Validator, builtins, codes,
};
use std::collections::HashSet;

/// Every name used as a type must resolve.
///
/// Lookup order: runtime built-ins, same-file declarations, the symbol
/// manager, then a bounded artifact load. Unresolved names are only reported
/// at `Thorough`, and never when the artifact for the name could not be
/// loaded.
pub struct TypeResolutionValidator;

impl Validator for TypeResolutionValidator {
    fn id(&self) -> &'static str {
        "type-resolution"
    }

    fn name(&self) -> &'static str {
        "Type resolution"
    }

    fn tier(&self) -> ValidationTier {
        ValidationTier::Thorough
    }

    fn priority(&self) -> u32 {
        50
    }

    fn prerequisites(&self) -> Prerequisites {
        Prerequisites {
            requires_references: true,
            requires_cross_file_resolution: true,
            ..Prerequisites::default()
        }
    }

    fn validate(&self, table: &SymbolTable, options: &ValidationOptions) -> ValidationResult {
        let lookup = TypeLookup::new(table, options);
        let mut result = ValidationResult::ok();
        let mut seen = HashSet::new();

        for reference in table.references().iter().filter(|r| r.context.is_type_context()) {
            let name = written_name(reference);
            if name.trim().is_empty() || builtins::is_builtin(&name) {
                continue;
            }
            let key = (name.to_lowercase(), reference.location.start());
            if !seen.insert(key) {
                continue;
            }

            let resolved = lookup.find(&name).or_else(|| {
                let helper = options.artifact_loading()?;
                match helper.ensure_loaded(&name) {
                    ArtifactStatus::Loaded => lookup.cross_file(&name),
                    _ => None,
                }
            });

            match resolved {
                Some(symbol) => {
                    if reference.context == ReferenceContext::ConstructorCall
                        && matches!(symbol.kind, SymbolKind::Interface | SymbolKind::Enum)
                    {
                        let what = if symbol.kind == SymbolKind::Interface {
                            "interface"
                        } else {
                            "enum"
                        };
                        result.error(ValidationError::new(
                            codes::INVALID_CLASS,
                            format!("Cannot construct {what} '{}'", symbol.name),
                            reference.location,
                        ));
                    }
                }
                None => {
                    if !options.is_thorough() {
                        continue;
                    }
                    let suppressed = options
                        .artifacts
                        .as_ref()
                        .is_some_and(|helper| helper.should_suppress(&name));
                    if suppressed {
                        tracing::trace!(target: "validation", "suppressed unresolved type '{name}'");
                        continue;
                    }
                    result.error(ValidationError::new(
                        codes::UNRESOLVED_TYPE,
                        format!("Type '{name}' cannot be resolved"),
                        reference.location,
                    ));
                }
            }
        }

        result
    }
}
