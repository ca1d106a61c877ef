//! Built-in validators.

mod deprecation;
mod duplicate_method;
mod new_expression;
mod type_assignment;
mod type_resolution;

pub use deprecation::DeprecationValidator;
pub use duplicate_method::DuplicateMethodValidator;
pub use new_expression::NewExpressionValidator;
pub use type_assignment::TypeAssignmentValidator;
pub use type_resolution::TypeResolutionValidator;

use super::Validator;
use crate::symbol::SymbolReference;
use std::rc::Rc;

pub fn builtin_validators() -> Vec<Rc<dyn Validator>> {
    vec![
        Rc::new(DuplicateMethodValidator),
        Rc::new(DeprecationValidator),
        Rc::new(NewExpressionValidator),
        Rc::new(TypeAssignmentValidator),
        Rc::new(TypeResolutionValidator),
    ]
}

/// Name as written including any qualifier, e.g. `Outer.Inner`.
pub(crate) fn written_name(reference: &SymbolReference) -> String {
    match &reference.qualifier {
        Some(qualifier) if !qualifier.is_empty() => format!("{qualifier}.{}", reference.name),
        _ => reference.name.clone(),
    }
}
